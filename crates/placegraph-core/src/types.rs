use crate::{PlacegraphError, Placetype, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub type RecordId = i64;

/// Value of a record's parent reference.
///
/// Serialised as a bare integer: positive ids, `-1` for "no parent found",
/// `-3` and `-4` for the two ambiguity classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ParentId {
    Resolved(RecordId),
    Unresolved,
    AmbiguousA,
    AmbiguousB,
}

impl ParentId {
    pub const UNRESOLVED: i64 = -1;
    pub const AMBIGUOUS_A: i64 = -3;
    pub const AMBIGUOUS_B: i64 = -4;

    pub fn as_i64(self) -> i64 {
        match self {
            ParentId::Resolved(id) => id,
            ParentId::Unresolved => Self::UNRESOLVED,
            ParentId::AmbiguousA => Self::AMBIGUOUS_A,
            ParentId::AmbiguousB => Self::AMBIGUOUS_B,
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, ParentId::Resolved(_))
    }

    pub fn is_ambiguous(self) -> bool {
        matches!(self, ParentId::AmbiguousA | ParentId::AmbiguousB)
    }
}

impl TryFrom<i64> for ParentId {
    type Error = PlacegraphError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            v if v > 0 => Ok(ParentId::Resolved(v)),
            Self::UNRESOLVED => Ok(ParentId::Unresolved),
            Self::AMBIGUOUS_A => Ok(ParentId::AmbiguousA),
            Self::AMBIGUOUS_B => Ok(ParentId::AmbiguousB),
            other => Err(PlacegraphError::InvalidRecord(format!(
                "unsupported parent id sentinel {}",
                other
            ))),
        }
    }
}

impl From<ParentId> for i64 {
    fn from(p: ParentId) -> Self {
        p.as_i64()
    }
}

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i64())
    }
}

/// One lineage branch: `"<placetype>_id"` -> ancestor id.
///
/// Backed by an ordered map so equality ignores insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AncestryEntry(BTreeMap<String, RecordId>);

impl AncestryEntry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry holding only `placetype`'s own key.
    pub fn self_only(placetype: &Placetype, id: RecordId) -> Self {
        let mut entry = Self::new();
        entry.set(placetype, id);
        entry
    }

    pub fn with(mut self, placetype: &Placetype, id: RecordId) -> Self {
        self.set(placetype, id);
        self
    }

    pub fn set(&mut self, placetype: &Placetype, id: RecordId) {
        self.0.insert(placetype.key(), id);
    }

    pub fn get(&self, placetype: &Placetype) -> Option<RecordId> {
        self.0.get(&placetype.key()).copied()
    }

    pub fn get_key(&self, key: &str) -> Option<RecordId> {
        self.0.get(key).copied()
    }

    pub fn contains(&self, placetype: &Placetype) -> bool {
        self.0.contains_key(&placetype.key())
    }

    /// Insert `placetype`'s key with `id` only if the key is missing.
    pub fn set_default(&mut self, placetype: &Placetype, id: RecordId) -> bool {
        let key = placetype.key();
        if self.0.contains_key(&key) {
            return false;
        }
        self.0.insert(key, id);
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RecordId)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, RecordId)> for AncestryEntry {
    fn from_iter<T: IntoIterator<Item = (String, RecordId)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

impl Coord {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Handle on geometry owned by the spatial service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryRef {
    /// Opaque key understood by the spatial backend.
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub centroid: Option<Coord>,
    /// Preferred point for reverse geocoding.
    #[serde(default)]
    pub label: Option<Coord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    #[serde(default)]
    pub superseded: bool,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default)]
    pub ceased: bool,
}

/// Fields a caller can lock against engine writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlledField {
    Parent,
    Ancestry,
}

impl ControlledField {
    pub fn canonical_name(self) -> &'static str {
        match self {
            ControlledField::Parent => "wof:parent_id",
            ControlledField::Ancestry => "wof:hierarchy",
        }
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            ControlledField::Parent => &["wof:parent_id", "parent_id"],
            ControlledField::Ancestry => &["wof:hierarchy", "hierarchy", "ancestry"],
        }
    }
}

impl FromStr for ControlledField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        [ControlledField::Parent, ControlledField::Ancestry]
            .into_iter()
            .find(|f| f.aliases().contains(&s))
            .ok_or_else(|| format!("unknown controlled field {}", s))
    }
}

/// A gazetteer record with its resolved containment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RecordWire", into = "RecordWire")]
pub struct Record {
    pub id: RecordId,
    pub placetype: Placetype,
    pub name: String,
    pub geometry: GeometryRef,
    pub parent_id: Option<ParentId>,
    pub hierarchy: Vec<AncestryEntry>,
    pub controlled: BTreeSet<String>,
    pub repo: Option<String>,
    pub status: Lifecycle,
}

impl Record {
    pub fn new(id: RecordId, placetype: impl Into<Placetype>, name: impl Into<String>) -> Self {
        Self {
            id,
            placetype: placetype.into(),
            name: name.into(),
            geometry: GeometryRef::default(),
            parent_id: None,
            hierarchy: Vec::new(),
            controlled: BTreeSet::new(),
            repo: None,
            status: Lifecycle::default(),
        }
    }

    pub fn with_centroid(mut self, lat: f64, lon: f64) -> Self {
        self.geometry.centroid = Some(Coord::new(lat, lon));
        self
    }

    pub fn with_label(mut self, lat: f64, lon: f64) -> Self {
        self.geometry.label = Some(Coord::new(lat, lon));
        self
    }

    pub fn with_parent(mut self, parent: ParentId) -> Self {
        self.parent_id = Some(parent);
        self
    }

    pub fn with_hierarchy(mut self, hierarchy: Vec<AncestryEntry>) -> Self {
        self.hierarchy = hierarchy;
        self
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn with_controlled(mut self, field: ControlledField) -> Self {
        self.controlled.insert(field.canonical_name().to_string());
        self
    }

    pub fn is_controlled(&self, field: ControlledField) -> bool {
        self.controlled
            .iter()
            .any(|name| name.parse::<ControlledField>().ok() == Some(field))
    }

    /// Parent as stored, treating a missing value as unresolved.
    pub fn parent_or_unresolved(&self) -> ParentId {
        self.parent_id.unwrap_or(ParentId::Unresolved)
    }

    /// Point used for containment queries: label point first, centroid second.
    pub fn reverse_geocoordinates(&self) -> Result<Coord> {
        self.geometry
            .label
            .or(self.geometry.centroid)
            .ok_or_else(|| {
                PlacegraphError::InvalidRecord(format!(
                    "record {} ({}) has no label point or centroid",
                    self.id, self.name
                ))
            })
    }
}

/// Loosely-typed storage form of a record, validated into [`Record`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordWire {
    #[serde(alias = "wof:id")]
    pub id: Option<RecordId>,
    #[serde(alias = "wof:placetype")]
    pub placetype: Option<String>,
    #[serde(default, alias = "wof:name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, alias = "wof:parent_id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<i64>,
    #[serde(default, alias = "wof:hierarchy", alias = "hierarchy")]
    pub ancestry: Vec<BTreeMap<String, i64>>,
    #[serde(default, alias = "wof:controlled")]
    pub controlled: Vec<String>,
    #[serde(default, alias = "wof:repo", skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default)]
    pub geometry: GeometryRef,
    #[serde(default)]
    pub status: Lifecycle,
}

impl TryFrom<RecordWire> for Record {
    type Error = PlacegraphError;

    fn try_from(wire: RecordWire) -> Result<Self> {
        let id = wire
            .id
            .ok_or_else(|| PlacegraphError::InvalidRecord("missing id".to_string()))?;
        if id <= 0 {
            return Err(PlacegraphError::InvalidRecord(format!(
                "record id must be positive, got {}",
                id
            )));
        }
        let placetype = wire
            .placetype
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| PlacegraphError::InvalidRecord(format!("record {} has no placetype", id)))?;
        let parent_id = wire.parent_id.map(ParentId::try_from).transpose()?;
        for name in &wire.controlled {
            if name.parse::<ControlledField>().is_err() {
                tracing::debug!("record {} lists unmanaged controlled field {}", id, name);
            }
        }

        Ok(Record {
            id,
            placetype: Placetype::new(placetype),
            name: wire.name.unwrap_or_default(),
            geometry: wire.geometry,
            parent_id,
            hierarchy: wire
                .ancestry
                .into_iter()
                .map(|m| m.into_iter().collect())
                .collect(),
            controlled: wire.controlled.into_iter().collect(),
            repo: wire.repo.filter(|r| !r.is_empty()),
            status: wire.status,
        })
    }
}

impl From<Record> for RecordWire {
    fn from(r: Record) -> Self {
        RecordWire {
            id: Some(r.id),
            placetype: Some(r.placetype.as_str().to_string()),
            name: Some(r.name),
            parent_id: r.parent_id.map(i64::from),
            ancestry: r
                .hierarchy
                .into_iter()
                .map(|e| e.0)
                .collect(),
            controlled: r.controlled.into_iter().collect(),
            repo: r.repo,
            geometry: r.geometry,
            status: r.status,
        }
    }
}

/// Conventional relative storage path for a record id,
/// e.g. `101736545` -> `101/736/545/101736545.geojson`.
pub fn record_relpath(id: RecordId) -> PathBuf {
    let digits = id.to_string();
    let mut path = PathBuf::new();
    let bytes = digits.as_bytes();
    for chunk in bytes.chunks(3) {
        path.push(String::from_utf8_lossy(chunk).as_ref());
    }
    path.push(format!("{}.geojson", digits));
    path
}
