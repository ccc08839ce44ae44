//! In-memory collaborators.
//!
//! Shapes are axis-aligned boxes registered by the caller; containment is a
//! box test. Good enough for fixtures and offline dry runs, not a geometry
//! engine.

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use placegraph_core::{
    record_relpath, Coord, FeatureStore, IntersectsQuery, Page, PageRequest, PlacegraphError,
    PointQuery, Record, RecordId, Result, SpatialQueryClient,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BBox {
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat: min_lat.min(max_lat),
            min_lon: min_lon.min(max_lon),
            max_lat: min_lat.max(max_lat),
            max_lon: min_lon.max(max_lon),
        }
    }

    pub fn point(coord: Coord) -> Self {
        Self::new(coord.lat, coord.lon, coord.lat, coord.lon)
    }

    pub fn contains(&self, coord: Coord) -> bool {
        coord.lat >= self.min_lat
            && coord.lat <= self.max_lat
            && coord.lon >= self.min_lon
            && coord.lon <= self.max_lon
    }

    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_lat <= other.max_lat
            && other.min_lat <= self.max_lat
            && self.min_lon <= other.max_lon
            && other.min_lon <= self.max_lon
    }

    pub fn buffered(&self, degrees: f64) -> Self {
        Self::new(
            self.min_lat - degrees,
            self.min_lon - degrees,
            self.max_lat + degrees,
            self.max_lon + degrees,
        )
    }

    fn center(&self) -> Coord {
        Coord::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}

#[derive(Debug, Clone)]
struct IndexedRecord {
    record: Record,
    shape: BBox,
}

/// Box-based [`SpatialQueryClient`].
#[derive(Debug, Default)]
pub struct MemorySpatialIndex {
    entries: RwLock<HashMap<RecordId, IndexedRecord>>,
    index_calls: AtomicUsize,
}

impl MemorySpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `record` with an explicit shape.
    pub fn insert(&self, record: Record, shape: BBox) {
        self.entries
            .write()
            .insert(record.id, IndexedRecord { record, shape });
    }

    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.entries.read().get(&id).map(|e| e.record.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Number of `index` calls served so far.
    pub fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpatialQueryClient for MemorySpatialIndex {
    async fn point_in_polygon(&self, query: &PointQuery) -> Result<Vec<Record>> {
        let entries = self.entries.read();
        let mut hits: Vec<Record> = entries
            .values()
            .filter(|e| e.record.placetype == query.placetype)
            .filter(|e| query.filters.admits(&e.record.status))
            .filter(|e| e.shape.contains(query.coord))
            .map(|e| e.record.clone())
            .collect();
        hits.sort_by_key(|r| r.id);
        Ok(hits)
    }

    async fn intersects(&self, query: &IntersectsQuery, page: PageRequest) -> Result<Page<Record>> {
        let entries = self.entries.read();
        let subject = entries.get(&query.subject).ok_or_else(|| {
            PlacegraphError::Spatial(format!("record {} is not indexed", query.subject))
        })?;
        let shape = match query.buffer {
            Some(b) => subject.shape.buffered(b),
            None => subject.shape,
        };

        let mut hits: Vec<&IndexedRecord> = entries
            .values()
            .filter(|e| e.record.id != query.subject)
            .filter(|e| e.record.placetype == query.placetype)
            .filter(|e| query.filters.admits(&e.record.status))
            .filter(|e| {
                if query.use_centroid {
                    let point = e
                        .record
                        .reverse_geocoordinates()
                        .unwrap_or_else(|_| e.shape.center());
                    shape.contains(point)
                } else {
                    shape.intersects(&e.shape)
                }
            })
            .collect();
        hits.sort_by_key(|e| e.record.id);

        let per_page = page.per_page.max(1);
        let start = page.page.saturating_sub(1) * per_page;
        let items: Vec<Record> = hits
            .iter()
            .skip(start)
            .take(per_page)
            .map(|e| e.record.clone())
            .collect();
        Ok(Page {
            has_more: start + items.len() < hits.len(),
            items,
        })
    }

    async fn index(&self, record: &Record) -> Result<()> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.write();
        let shape = match entries.get(&record.id) {
            Some(existing) => existing.shape,
            None => BBox::point(record.reverse_geocoordinates()?),
        };
        entries.insert(
            record.id,
            IndexedRecord {
                record: record.clone(),
                shape,
            },
        );
        Ok(())
    }
}

/// [`FeatureStore`] keeping records and exported documents in memory.
#[derive(Debug)]
pub struct MemoryFeatureStore {
    root: PathBuf,
    records: DashMap<RecordId, Record>,
    exported: DashMap<PathBuf, String>,
    failing: DashSet<RecordId>,
}

impl MemoryFeatureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            records: DashMap::new(),
            exported: DashMap::new(),
            failing: DashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn insert(&self, record: Record) {
        self.records.insert(record.id, record);
    }

    pub fn get(&self, id: RecordId) -> Option<Record> {
        self.records.get(&id).map(|e| e.clone())
    }

    /// Make every later export of `id` fail.
    pub fn fail_exports_for(&self, id: RecordId) {
        self.failing.insert(id);
    }

    pub fn export_count(&self) -> usize {
        self.exported.len()
    }

    pub fn exported_document(&self, path: &Path) -> Option<String> {
        self.exported.get(path).map(|e| e.clone())
    }

    pub fn path_for(&self, repo: &str, id: RecordId) -> PathBuf {
        self.root.join(repo).join("data").join(record_relpath(id))
    }
}

#[async_trait]
impl FeatureStore for MemoryFeatureStore {
    async fn load(&self, root: &Path, id: RecordId) -> Result<Record> {
        if root != self.root {
            return Err(PlacegraphError::Store(format!(
                "unknown data root {}",
                root.display()
            )));
        }
        self.get(id).ok_or(PlacegraphError::NotFound(id))
    }

    async fn export(&self, record: &Record) -> Result<PathBuf> {
        if self.failing.contains(&record.id) {
            return Err(PlacegraphError::Store(format!(
                "refusing to write record {}",
                record.id
            )));
        }
        let repo = record.repo.as_deref().ok_or_else(|| {
            PlacegraphError::Store(format!("record {} has no repository", record.id))
        })?;
        let path = self.path_for(repo, record.id);
        let document = serde_json::to_string_pretty(record)?;
        self.exported.insert(path.clone(), document);
        self.records.insert(record.id, record.clone());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use placegraph_core::{ActiveFilters, GeometryRef, Lifecycle, Placetype};

    fn locality(id: RecordId) -> Record {
        Record::new(id, "locality", format!("locality {}", id)).with_centroid(0.5, 0.5)
    }

    #[tokio::test]
    async fn point_in_polygon_respects_placetype_and_lifecycle() {
        let index = MemorySpatialIndex::new();
        index.insert(locality(1), BBox::new(0.0, 0.0, 1.0, 1.0));
        let mut retired = locality(2);
        retired.status = Lifecycle {
            deprecated: true,
            ..Default::default()
        };
        index.insert(retired, BBox::new(0.0, 0.0, 1.0, 1.0));
        index.insert(
            Record::new(3, "county", "county").with_centroid(0.5, 0.5),
            BBox::new(0.0, 0.0, 1.0, 1.0),
        );

        let hits = index
            .point_in_polygon(&PointQuery {
                coord: Coord::new(0.2, 0.2),
                placetype: Placetype::new("locality"),
                filters: ActiveFilters::default(),
            })
            .await
            .unwrap();
        assert_eq!(hits.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn intersects_pages_through_results() {
        let index = MemorySpatialIndex::new();
        index.insert(
            Record::new(100, "county", "c").with_centroid(0.5, 0.5),
            BBox::new(0.0, 0.0, 1.0, 1.0),
        );
        for id in 1..=5 {
            index.insert(locality(id), BBox::new(0.1, 0.1, 0.2, 0.2));
        }
        let query = IntersectsQuery {
            subject: 100,
            geometry: GeometryRef::default(),
            placetype: Placetype::new("locality"),
            filters: ActiveFilters::default(),
            buffer: None,
            use_centroid: false,
        };

        let first = index.intersects(&query, PageRequest::first(2)).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.has_more);
        let last = index
            .intersects(&query, PageRequest { page: 3, per_page: 2 })
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(!last.has_more);
    }

    #[tokio::test]
    async fn export_writes_document_under_repo_path() {
        let store = MemoryFeatureStore::new("/data");
        let record = Record::new(101736545, "venue", "cafe").with_repo("whosonfirst-data-venue-us");
        let path = store.export(&record).await.unwrap();
        assert_eq!(
            path,
            PathBuf::from("/data/whosonfirst-data-venue-us/data/101/736/545/101736545.geojson")
        );
        let doc = store.exported_document(&path).unwrap();
        assert!(doc.contains("\"placetype\": \"venue\""));

        let loaded = store.load(Path::new("/data"), 101736545).await.unwrap();
        assert_eq!(loaded, record);
        assert!(store.load(Path::new("/elsewhere"), 101736545).await.is_err());
    }
}
