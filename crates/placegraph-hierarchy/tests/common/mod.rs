#![allow(dead_code)]

use placegraph_core::{
    AncestryEntry, ParentId, PlacegraphConfig, Placetype, PlacetypeRole, PlacetypeSpec, Record,
    RecordId, ResolverConfig, Taxonomy,
};
use placegraph_hierarchy::{
    BBox, ChangeDetector, HierarchyResolver, MemoryFeatureStore, MemorySpatialIndex,
    UpdatePropagator,
};
use std::sync::Arc;

pub const DATA_ROOT: &str = "/data/whosonfirst";
pub const ADMIN_REPO: &str = "whosonfirst-data-admin-xy";
pub const VENUE_REPO: &str = "whosonfirst-data-venue-xy";

pub const CONTINENT: RecordId = 1;
pub const COUNTRY: RecordId = 2;
pub const REGION: RecordId = 3;
pub const COUNTY_WEST: RecordId = 10;
pub const COUNTY_EAST: RecordId = 11;
pub const LOCALITY: RecordId = 20;
pub const BOROUGH: RecordId = 30;
pub const NEIGHBOURHOOD: RecordId = 40;

pub fn taxonomy() -> Taxonomy {
    use PlacetypeRole::{Common, CommonOptional, Optional};
    Taxonomy::from_specs(vec![
        PlacetypeSpec::new(1, "continent", Common, &[]),
        PlacetypeSpec::new(2, "country", Common, &["continent"]),
        PlacetypeSpec::new(3, "region", Common, &["country"]),
        PlacetypeSpec::new(4, "county", CommonOptional, &["region"]),
        PlacetypeSpec::new(5, "locality", Common, &["county", "region"]),
        PlacetypeSpec::new(6, "borough", CommonOptional, &["locality"]),
        PlacetypeSpec::new(7, "macrohood", Optional, &["borough", "locality"]),
        PlacetypeSpec::new(8, "neighbourhood", Common, &["macrohood", "borough", "locality"]),
        PlacetypeSpec::new(9, "microhood", Optional, &["neighbourhood"]),
        PlacetypeSpec::new(10, "campus", CommonOptional, &["microhood", "neighbourhood", "locality"]),
        PlacetypeSpec::new(
            11,
            "building",
            Optional,
            &["campus", "microhood", "neighbourhood", "locality"],
        ),
        PlacetypeSpec::new(
            12,
            "address",
            Optional,
            &["building", "campus", "microhood", "neighbourhood", "locality"],
        ),
        PlacetypeSpec::new(
            13,
            "venue",
            Common,
            &["building", "address", "campus", "microhood", "neighbourhood"],
        ),
        PlacetypeSpec::new(14, "constituency", Optional, &["region", "country"]),
        PlacetypeSpec::new(15, "intersection", Optional, &["locality"]),
    ])
    .expect("test taxonomy is valid")
}

pub fn lineage(pairs: &[(&str, RecordId)]) -> AncestryEntry {
    pairs
        .iter()
        .fold(AncestryEntry::new(), |entry, (pt, id)| entry.with(&Placetype::new(*pt), *id))
}

fn admin_lineage<'a>(county: RecordId) -> Vec<(&'a str, RecordId)> {
    vec![
        ("continent", CONTINENT),
        ("country", COUNTRY),
        ("region", REGION),
        ("county", county),
    ]
}

/// Lineage of a record below the locality, through the given county.
pub fn urban_lineage(county: RecordId, extra: &[(&str, RecordId)]) -> AncestryEntry {
    let mut pairs = admin_lineage(county);
    pairs.push(("locality", LOCALITY));
    pairs.push(("borough", BOROUGH));
    pairs.extend_from_slice(extra);
    lineage(&pairs)
}

/// A venue with no parent or ancestry yet.
pub fn stale_venue(id: RecordId, lat: f64, lon: f64, repo: &str) -> Record {
    Record::new(id, "venue", format!("venue {}", id))
        .with_centroid(lat, lon)
        .with_repo(repo)
}

pub struct World {
    pub index: Arc<MemorySpatialIndex>,
    pub store: Arc<MemoryFeatureStore>,
    pub graph: Arc<Taxonomy>,
}

impl World {
    pub fn empty() -> Self {
        Self {
            index: Arc::new(MemorySpatialIndex::new()),
            store: Arc::new(MemoryFeatureStore::new(DATA_ROOT)),
            graph: Arc::new(taxonomy()),
        }
    }

    /// Continent down to one neighbourhood. The locality and borough
    /// straddle both counties; the neighbourhood sits in the western one.
    pub fn admin() -> Self {
        let world = Self::empty();

        world.place(
            Record::new(CONTINENT, "continent", "continent")
                .with_centroid(0.0, 0.0)
                .with_parent(ParentId::Unresolved)
                .with_hierarchy(vec![lineage(&[("continent", CONTINENT)])]),
            BBox::new(-90.0, -180.0, 90.0, 180.0),
        );
        world.place(
            Record::new(COUNTRY, "country", "country")
                .with_centroid(0.0, 0.0)
                .with_parent(ParentId::Resolved(CONTINENT))
                .with_hierarchy(vec![lineage(&[("continent", CONTINENT), ("country", COUNTRY)])]),
            BBox::new(-50.0, -50.0, 50.0, 50.0),
        );
        world.place(
            Record::new(REGION, "region", "region")
                .with_centroid(0.0, 0.0)
                .with_parent(ParentId::Resolved(COUNTRY))
                .with_hierarchy(vec![lineage(&[
                    ("continent", CONTINENT),
                    ("country", COUNTRY),
                    ("region", REGION),
                ])]),
            BBox::new(-20.0, -20.0, 20.0, 20.0),
        );
        for (county, lon, shape) in [
            (COUNTY_WEST, 2.5, BBox::new(0.0, 0.0, 10.0, 5.0)),
            (COUNTY_EAST, 7.5, BBox::new(0.0, 5.0, 10.0, 10.0)),
        ] {
            world.place(
                Record::new(county, "county", format!("county {}", county))
                    .with_centroid(5.0, lon)
                    .with_parent(ParentId::Resolved(REGION))
                    .with_hierarchy(vec![lineage(&admin_lineage(county))]),
                shape,
            );
        }

        let locality_lineage = |county| {
            let mut pairs = admin_lineage(county);
            pairs.push(("locality", LOCALITY));
            lineage(&pairs)
        };
        world.place(
            Record::new(LOCALITY, "locality", "locality")
                .with_centroid(5.0, 5.0)
                .with_parent(ParentId::AmbiguousB)
                .with_hierarchy(vec![
                    locality_lineage(COUNTY_WEST),
                    locality_lineage(COUNTY_EAST),
                ]),
            BBox::new(0.0, 0.0, 10.0, 10.0),
        );
        world.place(
            Record::new(BOROUGH, "borough", "borough")
                .with_centroid(5.0, 5.0)
                .with_parent(ParentId::Resolved(LOCALITY))
                .with_hierarchy(vec![
                    urban_lineage(COUNTY_WEST, &[]),
                    urban_lineage(COUNTY_EAST, &[]),
                ]),
            BBox::new(0.0, 3.0, 10.0, 7.0),
        );
        world.place(
            Record::new(NEIGHBOURHOOD, "neighbourhood", "neighbourhood")
                .with_centroid(1.5, 4.0)
                .with_parent(ParentId::Resolved(BOROUGH))
                .with_hierarchy(vec![urban_lineage(
                    COUNTY_WEST,
                    &[("neighbourhood", NEIGHBOURHOOD)],
                )]),
            BBox::new(1.0, 3.5, 2.0, 4.5),
        );
        world
    }

    /// Register `record` with both the spatial index and the store.
    pub fn place(&self, record: Record, shape: BBox) -> Record {
        let record = if record.repo.is_none() {
            record.with_repo(ADMIN_REPO)
        } else {
            record
        };
        self.index.insert(record.clone(), shape);
        self.store.insert(record.clone());
        record
    }

    /// Register a point record (venues and the like).
    pub fn place_point(&self, record: Record) -> Record {
        let shape = BBox::point(
            record
                .reverse_geocoordinates()
                .expect("point records carry a centroid"),
        );
        self.place(record, shape)
    }

    pub fn resolver(&self, config: ResolverConfig) -> HierarchyResolver {
        HierarchyResolver::new(self.index.clone(), self.graph.clone(), config)
    }

    pub fn detector(&self, config: ResolverConfig) -> ChangeDetector {
        ChangeDetector::new(Arc::new(self.resolver(config)))
    }

    pub fn config(&self) -> PlacegraphConfig {
        let mut config = PlacegraphConfig::default();
        config.storage.data_root = Some(DATA_ROOT.into());
        config.cascade.concurrency = 4;
        config.cascade.per_page = 2;
        config
    }

    pub fn propagator(&self, config: PlacegraphConfig) -> UpdatePropagator {
        UpdatePropagator::new(
            self.index.clone(),
            self.store.clone(),
            self.graph.clone(),
            config,
        )
    }
}
