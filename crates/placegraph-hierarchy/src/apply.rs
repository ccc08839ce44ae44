//! The "apply update" capability handed to a cascade, and the aggregator
//! of repositories it touched.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use placegraph_core::{FeatureStore, PlacegraphError, Record, RecordId, Result, SpatialQueryClient};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Persists one changed record. Returns the repository label it lives in.
///
/// A failed write is reported as [`PlacegraphError::Callback`]; any other
/// error is fatal to the caller.
#[async_trait]
pub trait ApplyUpdate: Send + Sync {
    async fn apply(&self, record: &Record) -> Result<String>;
}

/// Repository label of `record`; never guessed.
pub fn repository_label(record: &Record) -> Result<String> {
    match record.repo.as_deref().map(str::trim) {
        Some(repo) if !repo.is_empty() => Ok(repo.to_string()),
        _ => Err(PlacegraphError::Configuration(format!(
            "failed to determine repository for {} ({})",
            record.id, record.name
        ))),
    }
}

/// Exports the record, then reindexes it unless told not to.
///
/// Writes to the same record id are serialized; a lock entry is dropped
/// once no writer holds or waits on it.
pub struct PersistAndReindex {
    store: Arc<dyn FeatureStore>,
    spatial: Arc<dyn SpatialQueryClient>,
    reindex: bool,
    locks: DashMap<RecordId, Arc<Mutex<()>>>,
}

impl PersistAndReindex {
    pub fn new(
        store: Arc<dyn FeatureStore>,
        spatial: Arc<dyn SpatialQueryClient>,
        reindex: bool,
    ) -> Self {
        Self {
            store,
            spatial,
            reindex,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, id: RecordId) -> Arc<Mutex<()>> {
        self.locks
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn write(&self, record: &Record) -> Result<()> {
        let path = self.store.export(record).await.map_err(|e| {
            PlacegraphError::callback(record.id, format!("export failed: {}", e))
        })?;
        debug!("exported {} to {}", record.id, path.display());

        if self.reindex {
            self.spatial.index(record).await.map_err(|e| {
                PlacegraphError::callback(record.id, format!("reindex failed: {}", e))
            })?;
            debug!("reindexed {}", record.id);
        }
        Ok(())
    }
}

#[async_trait]
impl ApplyUpdate for PersistAndReindex {
    async fn apply(&self, record: &Record) -> Result<String> {
        let repo = repository_label(record)?;

        let lock = self.lock_for(record.id);
        let written = {
            let _guard = lock.lock().await;
            self.write(record).await
        };
        self.locks
            .remove_if(&record.id, |_, held| Arc::strong_count(held) == 2);
        written.map(|()| repo)
    }
}

/// Logs what would be written and reports the repository.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunUpdate;

#[async_trait]
impl ApplyUpdate for DryRunUpdate {
    async fn apply(&self, record: &Record) -> Result<String> {
        let repo = repository_label(record)?;
        info!(
            "dry run: would update {} ({}) in {}, parent {}",
            record.id,
            record.name,
            repo,
            record.parent_or_unresolved()
        );
        Ok(repo)
    }
}

/// Distinct repository labels touched during one propagation.
#[derive(Debug, Default)]
pub struct TouchedRepos {
    repos: DashSet<String>,
}

impl TouchedRepos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the label was not seen before.
    pub fn insert(&self, repo: impl Into<String>) -> bool {
        self.repos.insert(repo.into())
    }

    pub fn merge(&self, other: TouchedRepos) {
        for repo in other.repos {
            self.repos.insert(repo);
        }
    }

    pub fn contains(&self, repo: &str) -> bool {
        self.repos.contains(repo)
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    pub fn into_sorted(self) -> Vec<String> {
        let mut repos: Vec<String> = self.repos.into_iter().collect();
        repos.sort();
        repos
    }
}
