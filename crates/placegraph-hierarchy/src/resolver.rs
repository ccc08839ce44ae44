use crate::candidates::{apply_candidates, CandidateOutcome, CandidatePolicy};
use crate::ensure::AncestorEnsurer;
use placegraph_core::{
    ActiveFilters, Coord, ParentId, Placetype, PlacetypeGraph, PlacetypeRole, PointQuery, Record,
    RecordId, ResolverConfig, Result, SpatialQueryClient,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-call knobs for [`HierarchyResolver::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub filters: ActiveFilters,
    pub ensure_hierarchy: bool,
}

impl ResolveOptions {
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            filters: config.active,
            ensure_hierarchy: config.ensure_hierarchy,
        }
    }
}

/// Computes a record's direct parent and ancestry from containment queries.
#[derive(Clone)]
pub struct HierarchyResolver {
    spatial: Arc<dyn SpatialQueryClient>,
    graph: Arc<dyn PlacetypeGraph>,
    config: Arc<ResolverConfig>,
    ensurer: AncestorEnsurer,
}

impl HierarchyResolver {
    pub fn new(
        spatial: Arc<dyn SpatialQueryClient>,
        graph: Arc<dyn PlacetypeGraph>,
        config: ResolverConfig,
    ) -> Self {
        let config = Arc::new(config);
        let ensurer = AncestorEnsurer::new(spatial.clone(), graph.clone(), config.clone());
        Self {
            spatial,
            graph,
            config,
            ensurer,
        }
    }

    pub fn ensurer(&self) -> &AncestorEnsurer {
        &self.ensurer
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Candidate parent place-types for `placetype`, minus the skip-set.
    pub fn parent_placetypes(&self, placetype: &Placetype) -> Result<Vec<Placetype>> {
        let skip: HashSet<&Placetype> = self.config.skip_placetypes.iter().collect();
        Ok(self
            .graph
            .parents(placetype)?
            .into_iter()
            .filter(|p| !skip.contains(p))
            .collect())
    }

    /// Resolve `record`'s parent and ancestry in place.
    ///
    /// Returns whether any direct-parent level produced a candidate.
    pub async fn resolve(&self, record: &mut Record, options: &ResolveOptions) -> Result<bool> {
        let coord = record.reverse_geocoordinates()?;
        debug!(
            "reverse geocoordinates for {}: {}, {}",
            record.id, coord.lat, coord.lon
        );

        let policy = CandidatePolicy {
            assign_parent: true,
            ensure_fallback: options.ensure_hierarchy,
        };
        let mut attempted: Vec<Placetype> = Vec::new();
        let mut last: Option<CandidateOutcome> = None;

        for placetype in self.parent_placetypes(&record.placetype)? {
            let candidates = self
                .spatial
                .point_in_polygon(&PointQuery {
                    coord,
                    placetype: placetype.clone(),
                    filters: options.filters,
                })
                .await?;
            debug!(
                "find parent ({}) for {} at {}, {}: {}",
                placetype,
                record.id,
                coord.lat,
                coord.lon,
                candidates.len()
            );
            attempted.push(placetype);

            let outcome = apply_candidates(record, &candidates, policy);
            last = Some(outcome);
            if outcome.found {
                break;
            }
        }

        let found = last.map(|o| o.found).unwrap_or(false);
        if found && self.config.prune_placetypes.contains(&record.placetype) {
            self.prune_unconfirmed_branches(record, coord, &options.filters)
                .await?;
        }

        let wants_fallback = last
            .map(|o| o.wants_fallback)
            .unwrap_or(options.ensure_hierarchy);
        if wants_fallback {
            self.ensurer
                .ensure(record, &attempted, &options.filters)
                .await?;
        }

        self.finalize(record)?;
        Ok(found)
    }

    /// Drop ancestry branches whose disambiguating ancestor (a county by
    /// default) does not itself contain the record's point.
    async fn prune_unconfirmed_branches(
        &self,
        record: &mut Record,
        coord: Coord,
        filters: &ActiveFilters,
    ) -> Result<()> {
        if record.hierarchy.len() < 2 {
            return Ok(());
        }
        let pivot = &self.config.disambiguating_placetype;

        let mut referenced: Vec<RecordId> = Vec::new();
        for id in record.hierarchy.iter().filter_map(|e| e.get(pivot)) {
            if !referenced.contains(&id) {
                referenced.push(id);
            }
        }
        if referenced.len() < 2 {
            return Ok(());
        }

        let confirmed: HashSet<RecordId> = self
            .spatial
            .point_in_polygon(&PointQuery {
                coord,
                placetype: pivot.clone(),
                filters: *filters,
            })
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();
        if confirmed.is_empty() {
            debug!(
                "no {} contains {}; keeping all {} branches",
                pivot,
                record.id,
                record.hierarchy.len()
            );
            return Ok(());
        }

        let before = record.hierarchy.len();
        record
            .hierarchy
            .retain(|e| e.get(pivot).map_or(true, |id| confirmed.contains(&id)));
        debug!(
            "pruned {} of {} ancestry branches for {} against {} {:?}",
            before - record.hierarchy.len(),
            before,
            record.id,
            pivot,
            confirmed
        );
        Ok(())
    }

    fn finalize(&self, record: &mut Record) -> Result<()> {
        match record.parent_id {
            None => {
                warn!(
                    target: "placegraph::integrity",
                    "no parent assigned to {} ({}), defaulting to -1", record.id, record.name
                );
                record.parent_id = Some(ParentId::Unresolved);
            }
            Some(ParentId::Unresolved) => {
                warn!(
                    target: "placegraph::integrity",
                    "parent of {} ({}) is unresolved after resolution", record.id, record.name
                );
            }
            Some(parent) if parent.is_ambiguous() => self.backfill_always_present(record)?,
            Some(_) => {}
        }
        Ok(())
    }

    /// Give every ancestry entry the always-present keys above the record's
    /// place-type, defaulting missing ones to `-1`.
    pub(crate) fn backfill_always_present(&self, record: &mut Record) -> Result<()> {
        let ancestors = self
            .graph
            .ancestors(&record.placetype, &PlacetypeRole::ALL)?;
        let keys: Vec<&Placetype> = self
            .config
            .always_present
            .iter()
            .filter(|pt| ancestors.contains(pt))
            .collect();
        for entry in record.hierarchy.iter_mut() {
            for pt in &keys {
                entry.set_default(pt, ParentId::UNRESOLVED);
            }
        }
        Ok(())
    }
}
