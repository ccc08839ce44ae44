use crate::apply::{ApplyUpdate, DryRunUpdate, PersistAndReindex, TouchedRepos};
use crate::cascade::{CascadeOptions, CascadeRebuilder};
use crate::change::{ChangeDetector, ChangeReport};
use crate::resolver::{HierarchyResolver, ResolveOptions};
use placegraph_core::{
    FeatureStore, PlacegraphConfig, PlacegraphError, PlacetypeGraph, Record, RecordId, Result,
    SpatialQueryClient,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Which steps a propagation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagateFlags {
    #[serde(default = "default_true")]
    pub recompute_self: bool,
    #[serde(default = "default_true")]
    pub recompute_descendants: bool,
    #[serde(default = "default_true")]
    pub export: bool,
    #[serde(default = "default_true")]
    pub reindex: bool,
    #[serde(default)]
    pub dry_run: bool,
}

fn default_true() -> bool {
    true
}

impl Default for PropagateFlags {
    fn default() -> Self {
        Self {
            recompute_self: true,
            recompute_descendants: true,
            export: true,
            reindex: true,
            dry_run: false,
        }
    }
}

impl PropagateFlags {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationReport {
    /// `None` when self recomputation was switched off.
    pub self_report: Option<ChangeReport>,
    /// Sorted, distinct repository labels that received an update.
    pub repos: Vec<String>,
}

/// Recomputes a record and then everything spatially below it.
pub struct UpdatePropagator {
    spatial: Arc<dyn SpatialQueryClient>,
    store: Arc<dyn FeatureStore>,
    detector: Arc<ChangeDetector>,
    cascade: CascadeRebuilder,
    config: PlacegraphConfig,
}

impl UpdatePropagator {
    pub fn new(
        spatial: Arc<dyn SpatialQueryClient>,
        store: Arc<dyn FeatureStore>,
        graph: Arc<dyn PlacetypeGraph>,
        config: PlacegraphConfig,
    ) -> Self {
        let resolver = HierarchyResolver::new(spatial.clone(), graph.clone(), config.resolver.clone());
        let detector = Arc::new(ChangeDetector::new(Arc::new(resolver)));
        let cascade = CascadeRebuilder::new(
            spatial.clone(),
            store.clone(),
            graph,
            detector.clone(),
            &config,
        );
        Self {
            spatial,
            store,
            detector,
            cascade,
            config,
        }
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    pub fn cascade(&self) -> &CascadeRebuilder {
        &self.cascade
    }

    pub fn config(&self) -> &PlacegraphConfig {
        &self.config
    }

    /// The update capability matching `flags`.
    pub fn applier(&self, flags: &PropagateFlags) -> Box<dyn ApplyUpdate> {
        if flags.dry_run || !flags.export {
            Box::new(DryRunUpdate)
        } else {
            Box::new(PersistAndReindex::new(
                self.store.clone(),
                self.spatial.clone(),
                flags.reindex,
            ))
        }
    }

    pub async fn propagate(
        &self,
        record: &mut Record,
        flags: &PropagateFlags,
    ) -> Result<PropagationReport> {
        let options = CascadeOptions::from_config(&self.config);
        self.propagate_with(record, flags, &options).await
    }

    /// Like [`propagate`](Self::propagate) with explicit cascade options.
    pub async fn propagate_with(
        &self,
        record: &mut Record,
        flags: &PropagateFlags,
        options: &CascadeOptions,
    ) -> Result<PropagationReport> {
        let applier = self.applier(flags);
        let touched = TouchedRepos::new();

        let mut self_report = None;
        if flags.recompute_self {
            let resolve = ResolveOptions::from_config(&self.config.resolver);
            let report = self.detector.rebuild(record, &resolve).await?;
            if report.is_changed() {
                touched.insert(applier.apply(record).await?);
            }
            self_report = Some(report);
        }

        if flags.recompute_descendants {
            let descendants = self
                .cascade
                .rebuild_descendants(record, applier.as_ref(), options)
                .await?;
            touched.merge(descendants);
        }

        let repos = touched.into_sorted();
        info!(
            "propagated {} ({}): {} repositories updated",
            record.id,
            record.placetype,
            repos.len()
        );
        Ok(PropagationReport { self_report, repos })
    }

    /// Load `id` from the configured data root and propagate it.
    pub async fn propagate_id(
        &self,
        id: RecordId,
        flags: &PropagateFlags,
    ) -> Result<(Record, PropagationReport)> {
        let root = self.config.storage.data_root.as_deref().ok_or_else(|| {
            PlacegraphError::Configuration(format!("no data root configured, cannot load {}", id))
        })?;
        let mut record = self.store.load(root, id).await?;
        let report = self.propagate(&mut record, flags).await?;
        Ok((record, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_default_to_full_propagation() {
        let flags = PropagateFlags::default();
        assert!(flags.recompute_self && flags.recompute_descendants);
        assert!(flags.export && flags.reindex);
        assert!(!flags.dry_run);
        assert!(PropagateFlags::dry_run().dry_run);
    }

    #[test]
    fn flags_deserialize_with_defaults() {
        let flags: PropagateFlags = serde_json::from_str(r#"{"reindex": false}"#).unwrap();
        assert!(!flags.reindex);
        assert!(flags.export);
        assert!(!flags.dry_run);
    }
}
