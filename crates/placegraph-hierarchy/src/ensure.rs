use crate::candidates::{apply_candidates, CandidatePolicy};
use placegraph_core::{
    ActiveFilters, AncestryEntry, Placetype, PlacetypeGraph, PointQuery, Record, ResolverConfig,
    Result, SpatialQueryClient,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Fills ancestry from the nearest containing ancestor when no direct parent
/// could be found. Never writes the parent field.
#[derive(Clone)]
pub struct AncestorEnsurer {
    spatial: Arc<dyn SpatialQueryClient>,
    graph: Arc<dyn PlacetypeGraph>,
    config: Arc<ResolverConfig>,
}

impl AncestorEnsurer {
    pub fn new(
        spatial: Arc<dyn SpatialQueryClient>,
        graph: Arc<dyn PlacetypeGraph>,
        config: Arc<ResolverConfig>,
    ) -> Self {
        Self {
            spatial,
            graph,
            config,
        }
    }

    fn skip_set(&self, attempted: &[Placetype]) -> HashSet<Placetype> {
        self.config
            .skip_placetypes
            .iter()
            .chain(attempted)
            .cloned()
            .collect()
    }

    /// Returns `true` when the record already had, or now has, ancestry
    /// derived from a real ancestor. `attempted` lists place-types already
    /// queried as direct parents.
    pub async fn ensure(
        &self,
        record: &mut Record,
        attempted: &[Placetype],
        filters: &ActiveFilters,
    ) -> Result<bool> {
        if record.parent_or_unresolved().is_resolved() || record.hierarchy.len() > 1 {
            return Ok(true);
        }

        let skip = self.skip_set(attempted);
        let coord = record.reverse_geocoordinates()?;
        let policy = CandidatePolicy {
            assign_parent: false,
            ensure_fallback: false,
        };

        let mut matched = false;
        for placetype in self
            .graph
            .ancestors(&record.placetype, &self.config.ensure_roles)?
        {
            if skip.contains(&placetype) {
                continue;
            }
            let candidates = self
                .spatial
                .point_in_polygon(&PointQuery {
                    coord,
                    placetype: placetype.clone(),
                    filters: *filters,
                })
                .await?;
            debug!(
                "ensure ancestry ({}) for {} at {}, {}: {} candidates",
                placetype,
                record.id,
                coord.lat,
                coord.lon,
                candidates.len()
            );
            if apply_candidates(record, &candidates, policy).found {
                matched = true;
                break;
            }
        }

        if matched && !record.hierarchy.is_empty() {
            let (own, id) = (record.placetype.clone(), record.id);
            for entry in record.hierarchy.iter_mut() {
                entry.set_default(&own, id);
            }
        } else {
            debug!("no ancestor lineage for {}, recording self only", record.id);
            record.hierarchy = vec![AncestryEntry::self_only(&record.placetype, record.id)];
        }
        Ok(matched)
    }
}
