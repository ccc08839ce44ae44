use crate::apply::{ApplyUpdate, TouchedRepos};
use crate::change::ChangeDetector;
use crate::resolver::ResolveOptions;
use dashmap::DashSet;
use futures::future;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use placegraph_core::{
    ActiveFilters, CascadeConfig, FeatureStore, IntersectsQuery, PageRequest, PlacegraphConfig,
    PlacegraphError, Placetype, PlacetypeGraph, PlacetypeRole, Record, RecordId, Result,
    SpatialQueryClient,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Per-call cascade settings, seeded from [`CascadeConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeOptions {
    /// Only rebuild these descendant place-types.
    #[serde(default)]
    pub include: Option<Vec<Placetype>>,
    /// Never rebuild these, on top of the configured exclusions.
    #[serde(default)]
    pub exclude: Vec<Placetype>,
    #[serde(default)]
    pub buffer: Option<f64>,
    #[serde(default)]
    pub strict: bool,
    pub concurrency: usize,
    pub per_page: usize,
    #[serde(default)]
    pub filters: ActiveFilters,
}

impl CascadeOptions {
    pub fn from_config(config: &PlacegraphConfig) -> Self {
        Self {
            include: None,
            exclude: Vec::new(),
            buffer: config.cascade.buffer,
            strict: config.cascade.strict,
            concurrency: config.cascade.concurrency,
            per_page: config.cascade.per_page,
            filters: config.resolver.active,
        }
    }
}

/// Every record matching `query`, fetched one page at a time.
pub fn paginate<'a>(
    spatial: &'a dyn SpatialQueryClient,
    query: IntersectsQuery,
    per_page: usize,
) -> impl Stream<Item = Result<Record>> + Send + 'a {
    stream::try_unfold(Some(PageRequest::first(per_page)), move |next| {
        let query = query.clone();
        async move {
            let Some(request) = next else {
                return Ok::<_, PlacegraphError>(None);
            };
            let page = spatial.intersects(&query, request).await?;
            debug!(
                "intersects {} ({}) page {}: {} records",
                query.subject,
                query.placetype,
                request.page,
                page.items.len()
            );
            let following = (page.has_more && !page.items.is_empty()).then(|| request.next());
            let items = stream::iter(page.items.into_iter().map(Ok::<_, PlacegraphError>));
            Ok(Some((items, following)))
        }
    })
    .try_flatten()
}

/// Re-resolves the records spatially below a changed record.
pub struct CascadeRebuilder {
    spatial: Arc<dyn SpatialQueryClient>,
    store: Arc<dyn FeatureStore>,
    graph: Arc<dyn PlacetypeGraph>,
    detector: Arc<ChangeDetector>,
    config: CascadeConfig,
    ensure_hierarchy: bool,
    data_root: Option<PathBuf>,
}

impl CascadeRebuilder {
    pub fn new(
        spatial: Arc<dyn SpatialQueryClient>,
        store: Arc<dyn FeatureStore>,
        graph: Arc<dyn PlacetypeGraph>,
        detector: Arc<ChangeDetector>,
        config: &PlacegraphConfig,
    ) -> Self {
        Self {
            spatial,
            store,
            graph,
            detector,
            config: config.cascade.clone(),
            ensure_hierarchy: config.resolver.ensure_hierarchy,
            data_root: config.storage.data_root.clone(),
        }
    }

    pub fn with_data_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.data_root = Some(root.into());
        self
    }

    /// Descendant place-types of `placetype` that a cascade visits.
    pub fn target_placetypes(
        &self,
        placetype: &Placetype,
        options: &CascadeOptions,
    ) -> Result<Vec<Placetype>> {
        let targets = self
            .graph
            .descendants(placetype, &PlacetypeRole::ALL)?
            .into_iter()
            .filter(|pt| !self.config.excluded_placetypes.contains(pt))
            .filter(|pt| !options.exclude.contains(pt))
            .filter(|pt| options.include.as_ref().map_or(true, |inc| inc.contains(pt)))
            .collect();
        Ok(targets)
    }

    fn intersects_query(
        &self,
        record: &Record,
        placetype: Placetype,
        options: &CascadeOptions,
    ) -> IntersectsQuery {
        IntersectsQuery {
            subject: record.id,
            geometry: record.geometry.clone(),
            use_centroid: self.config.point_placetypes.contains(&placetype),
            placetype,
            filters: options.filters,
            buffer: options.buffer,
        }
    }

    /// Rebuild every descendant of `record` and apply the ones that changed.
    ///
    /// Returns the repositories holding at least one updated descendant.
    pub async fn rebuild_descendants(
        &self,
        record: &Record,
        applier: &dyn ApplyUpdate,
        options: &CascadeOptions,
    ) -> Result<TouchedRepos> {
        let root = self.data_root.as_deref().ok_or_else(|| {
            PlacegraphError::Configuration(format!(
                "no data root configured, cannot load descendants of {}",
                record.id
            ))
        })?;

        let targets = self.target_placetypes(&record.placetype, options)?;
        info!(
            "rebuilding descendants of {} ({}): {:?}",
            record.id,
            record.placetype,
            targets.iter().map(|pt| pt.as_str()).collect::<Vec<_>>()
        );

        let claimed: DashSet<RecordId> = DashSet::new();
        claimed.insert(record.id);
        let touched = TouchedRepos::new();

        let queries: Vec<IntersectsQuery> = targets
            .into_iter()
            .map(|pt| self.intersects_query(record, pt, options))
            .collect();

        let updates = stream::iter(queries)
            .map(|query| {
                Ok::<_, PlacegraphError>(paginate(self.spatial.as_ref(), query, options.per_page))
            })
            .try_flatten()
            .try_filter(|candidate| future::ready(claimed.insert(candidate.id)))
            .map_ok(|candidate| self.rebuild_one(candidate, root, applier, options))
            .try_buffer_unordered(options.concurrency.max(1));
        futures::pin_mut!(updates);

        while let Some(repo) = updates.try_next().await? {
            if let Some(repo) = repo {
                touched.insert(repo);
            }
        }

        info!(
            "cascade from {} touched {} repositories",
            record.id,
            touched.len()
        );
        Ok(touched)
    }

    /// Load, re-resolve and (if changed) apply one descendant.
    async fn rebuild_one(
        &self,
        candidate: Record,
        root: &Path,
        applier: &dyn ApplyUpdate,
        options: &CascadeOptions,
    ) -> Result<Option<String>> {
        let mut descendant = self.store.load(root, candidate.id).await?;
        if descendant.placetype != candidate.placetype {
            debug!(
                "skipping {}: stored as {} but matched as {}",
                descendant.id, descendant.placetype, candidate.placetype
            );
            return Ok(None);
        }

        let resolve = ResolveOptions {
            filters: options.filters,
            ensure_hierarchy: self.ensure_hierarchy,
        };
        let report = self.detector.rebuild(&mut descendant, &resolve).await?;
        if !report.is_changed() {
            return Ok(None);
        }

        match applier.apply(&descendant).await {
            Ok(repo) => Ok(Some(repo)),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                error!("failed to apply update for {}: {}", descendant.id, err);
                if options.strict {
                    Err(err)
                } else {
                    Ok(None)
                }
            }
        }
    }
}
