//! Place-type names, static classification tables and the taxonomy seam.
//!
//! The engine never hardcodes which place-types may parent which: it asks a
//! [`PlacetypeGraph`]. [`Taxonomy`] is a data-driven implementation built from
//! caller-supplied rows.

use crate::{PlacegraphError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Placetype(String);

impl Placetype {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ancestry key for this place-type, e.g. `county_id`.
    pub fn key(&self) -> String {
        format!("{}_id", self.0)
    }

    pub fn ambiguity_class(&self) -> Option<AmbiguityClass> {
        AMBIGUITY_CLASSES.get(self.as_str()).copied()
    }
}

impl From<&str> for Placetype {
    fn from(s: &str) -> Self {
        Placetype::new(s)
    }
}

impl From<String> for Placetype {
    fn from(s: String) -> Self {
        Placetype::new(s)
    }
}

impl fmt::Display for Placetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which sentinel a record gets when several parents match at one level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmbiguityClass {
    /// Fine-grained and sub-locality types: parent becomes `-3`.
    A,
    /// Localities spanning several counties: parent becomes `-4`.
    B,
}

static AMBIGUITY_CLASSES: Lazy<HashMap<&'static str, AmbiguityClass>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for pt in [
        "microhood",
        "campus",
        "address",
        "building",
        "venue",
        "intersection",
        "neighbourhood",
        "macrohood",
        "borough",
    ] {
        m.insert(pt, AmbiguityClass::A);
    }
    m.insert("locality", AmbiguityClass::B);
    m
});

/// How commonly a place-type appears in a lineage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacetypeRole {
    Common,
    CommonOptional,
    Optional,
}

impl PlacetypeRole {
    /// Search priority used when walking ancestors or descendants.
    pub const ALL: [PlacetypeRole; 3] = [
        PlacetypeRole::Common,
        PlacetypeRole::CommonOptional,
        PlacetypeRole::Optional,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PlacetypeRole::Common => "common",
            PlacetypeRole::CommonOptional => "common_optional",
            PlacetypeRole::Optional => "optional",
        }
    }
}

impl FromStr for PlacetypeRole {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "common" => Ok(PlacetypeRole::Common),
            "common_optional" => Ok(PlacetypeRole::CommonOptional),
            "optional" => Ok(PlacetypeRole::Optional),
            other => Err(format!("unknown placetype role {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacetypeInfo {
    pub id: i64,
    pub name: Placetype,
    pub role: PlacetypeRole,
}

/// Parent/ancestor/descendant lookups over the place-type taxonomy.
pub trait PlacetypeGraph: Send + Sync {
    fn lookup(&self, name: &Placetype) -> Result<PlacetypeInfo>;
    /// Direct parents, in preference order.
    fn parents(&self, name: &Placetype) -> Result<Vec<Placetype>>;
    /// Transitive ancestors grouped by `roles` order.
    fn ancestors(&self, name: &Placetype, roles: &[PlacetypeRole]) -> Result<Vec<Placetype>>;
    /// Transitive descendants grouped by `roles` order.
    fn descendants(&self, name: &Placetype, roles: &[PlacetypeRole]) -> Result<Vec<Placetype>>;
}

/// One row of a taxonomy definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacetypeSpec {
    pub id: i64,
    pub name: String,
    pub role: PlacetypeRole,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl PlacetypeSpec {
    pub fn new(id: i64, name: &str, role: PlacetypeRole, parents: &[&str]) -> Self {
        Self {
            id,
            name: name.to_string(),
            role,
            parents: parents.iter().map(|p| p.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
struct TaxonomyNode {
    info: PlacetypeInfo,
    parents: Vec<Placetype>,
}

/// In-memory [`PlacetypeGraph`] built from [`PlacetypeSpec`] rows.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    nodes: HashMap<Placetype, TaxonomyNode>,
    /// Definition order, used to make descendant listings deterministic.
    order: Vec<Placetype>,
}

impl Taxonomy {
    pub fn from_specs(specs: Vec<PlacetypeSpec>) -> Result<Self> {
        let mut taxonomy = Taxonomy::default();
        for spec in specs {
            let name = Placetype::new(spec.name);
            if taxonomy.nodes.contains_key(&name) {
                return Err(PlacegraphError::Taxonomy(format!(
                    "placetype {} defined twice",
                    name
                )));
            }
            let node = TaxonomyNode {
                info: PlacetypeInfo {
                    id: spec.id,
                    name: name.clone(),
                    role: spec.role,
                },
                parents: spec.parents.into_iter().map(Placetype::new).collect(),
            };
            taxonomy.order.push(name.clone());
            taxonomy.nodes.insert(name, node);
        }

        for node in taxonomy.nodes.values() {
            for parent in &node.parents {
                if !taxonomy.nodes.contains_key(parent) {
                    return Err(PlacegraphError::Taxonomy(format!(
                        "placetype {} names unknown parent {}",
                        node.info.name, parent
                    )));
                }
            }
        }
        Ok(taxonomy)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let specs: Vec<PlacetypeSpec> = serde_json::from_str(json)?;
        Self::from_specs(specs)
    }

    fn node(&self, name: &Placetype) -> Result<&TaxonomyNode> {
        self.nodes
            .get(name)
            .ok_or_else(|| PlacegraphError::Taxonomy(format!("unknown placetype {}", name)))
    }

    /// Breadth-first walk up the parent edges, excluding `name` itself.
    fn walk_ancestors(&self, name: &Placetype) -> Result<Vec<Placetype>> {
        let mut seen: HashSet<Placetype> = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<Placetype> = self.node(name)?.parents.iter().cloned().collect();
        seen.insert(name.clone());

        while let Some(pt) = queue.pop_front() {
            if !seen.insert(pt.clone()) {
                continue;
            }
            queue.extend(self.node(&pt)?.parents.iter().cloned());
            out.push(pt);
        }
        Ok(out)
    }

    fn group_by_role(&self, found: Vec<Placetype>, roles: &[PlacetypeRole]) -> Vec<Placetype> {
        let mut grouped = Vec::with_capacity(found.len());
        for role in roles {
            for pt in &found {
                if self.nodes.get(pt).map(|n| n.info.role) == Some(*role) && !grouped.contains(pt) {
                    grouped.push(pt.clone());
                }
            }
        }
        grouped
    }
}

impl PlacetypeGraph for Taxonomy {
    fn lookup(&self, name: &Placetype) -> Result<PlacetypeInfo> {
        Ok(self.node(name)?.info.clone())
    }

    fn parents(&self, name: &Placetype) -> Result<Vec<Placetype>> {
        Ok(self.node(name)?.parents.clone())
    }

    fn ancestors(&self, name: &Placetype, roles: &[PlacetypeRole]) -> Result<Vec<Placetype>> {
        let found = self.walk_ancestors(name)?;
        Ok(self.group_by_role(found, roles))
    }

    fn descendants(&self, name: &Placetype, roles: &[PlacetypeRole]) -> Result<Vec<Placetype>> {
        self.node(name)?;
        let mut found = Vec::new();
        for candidate in &self.order {
            if candidate == name {
                continue;
            }
            if self.walk_ancestors(candidate)?.contains(name) {
                found.push(candidate.clone());
            }
        }
        Ok(self.group_by_role(found, roles))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PlacetypeRole::*;

    fn taxonomy() -> Taxonomy {
        Taxonomy::from_specs(vec![
            PlacetypeSpec::new(1, "country", Common, &[]),
            PlacetypeSpec::new(2, "region", Common, &["country"]),
            PlacetypeSpec::new(3, "county", CommonOptional, &["region"]),
            PlacetypeSpec::new(4, "locality", Common, &["county", "region"]),
            PlacetypeSpec::new(5, "neighbourhood", Common, &["locality"]),
            PlacetypeSpec::new(6, "building", Optional, &["neighbourhood", "locality"]),
            PlacetypeSpec::new(7, "venue", Common, &["building", "neighbourhood"]),
        ])
        .unwrap()
    }

    #[test]
    fn ambiguity_classes_come_from_static_table() {
        assert_eq!(Placetype::new("venue").ambiguity_class(), Some(AmbiguityClass::A));
        assert_eq!(Placetype::new("Borough").ambiguity_class(), Some(AmbiguityClass::A));
        assert_eq!(Placetype::new("locality").ambiguity_class(), Some(AmbiguityClass::B));
        assert_eq!(Placetype::new("county").ambiguity_class(), None);
    }

    #[test]
    fn ancestors_are_grouped_by_role_priority() {
        let t = taxonomy();
        let got = t.ancestors(&"venue".into(), &PlacetypeRole::ALL).unwrap();
        let names: Vec<&str> = got.iter().map(|p| p.as_str()).collect();
        assert_eq!(
            names,
            vec!["neighbourhood", "locality", "region", "country", "county", "building"]
        );

        let common_only = t.ancestors(&"venue".into(), &[Common]).unwrap();
        assert!(!common_only.contains(&"county".into()));
    }

    #[test]
    fn descendants_cover_transitive_children() {
        let t = taxonomy();
        let got = t.descendants(&"county".into(), &PlacetypeRole::ALL).unwrap();
        let names: Vec<&str> = got.iter().map(|p| p.as_str()).collect();
        assert_eq!(names, vec!["locality", "neighbourhood", "venue", "building"]);
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let err = Taxonomy::from_specs(vec![PlacetypeSpec::new(1, "venue", Common, &["nowhere"])]);
        assert!(err.is_err());
        assert!(taxonomy().lookup(&"planet".into()).is_err());
    }

    #[test]
    fn taxonomy_loads_from_json() {
        let t = Taxonomy::from_json(
            r#"[{"id": 1, "name": "country", "role": "common"},
                {"id": 2, "name": "region", "role": "common", "parents": ["country"]}]"#,
        )
        .unwrap();
        assert_eq!(t.parents(&"region".into()).unwrap(), vec![Placetype::new("country")]);
        assert_eq!(t.lookup(&"region".into()).unwrap().id, 2);
    }
}
