use crate::{Coord, GeometryRef, Lifecycle, Placetype, Record, RecordId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle filters applied to every spatial query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFilters {
    #[serde(default = "default_true")]
    pub exclude_superseded: bool,
    #[serde(default = "default_true")]
    pub exclude_deprecated: bool,
    #[serde(default = "default_true")]
    pub exclude_ceased: bool,
}

impl Default for ActiveFilters {
    fn default() -> Self {
        Self {
            exclude_superseded: true,
            exclude_deprecated: true,
            exclude_ceased: true,
        }
    }
}

impl ActiveFilters {
    pub fn admits(&self, status: &Lifecycle) -> bool {
        !(self.exclude_superseded && status.superseded
            || self.exclude_deprecated && status.deprecated
            || self.exclude_ceased && status.ceased)
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointQuery {
    pub coord: Coord,
    pub placetype: Placetype,
    pub filters: ActiveFilters,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntersectsQuery {
    /// Record whose geometry is the query shape.
    pub subject: RecordId,
    pub geometry: GeometryRef,
    pub placetype: Placetype,
    pub filters: ActiveFilters,
    /// Grow the query shape by this many degrees before matching.
    pub buffer: Option<f64>,
    /// Match candidates by their centroid instead of their full geometry.
    pub use_centroid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub page: usize,
    pub per_page: usize,
}

impl PageRequest {
    pub fn first(per_page: usize) -> Self {
        Self {
            page: 1,
            per_page: per_page.max(1),
        }
    }

    pub fn next(self) -> Self {
        Self {
            page: self.page + 1,
            ..self
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub has_more: bool,
}

/// Point-in-polygon and intersection queries plus index maintenance.
///
/// Retry policy, if any, belongs to the implementation.
#[async_trait]
pub trait SpatialQueryClient: Send + Sync {
    async fn point_in_polygon(&self, query: &PointQuery) -> Result<Vec<Record>>;
    async fn intersects(&self, query: &IntersectsQuery, page: PageRequest) -> Result<Page<Record>>;
    async fn index(&self, record: &Record) -> Result<()>;
}

/// Loads and persists individual records.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    async fn load(&self, root: &Path, id: RecordId) -> Result<Record>;
    /// Persist a record, returning where it was written.
    async fn export(&self, record: &Record) -> Result<PathBuf>;
}
