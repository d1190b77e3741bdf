//! POI lookup collaborator
//!
//! The planner only depends on the `PoiLookup` trait. `PoiCatalog` is the
//! in-process implementation: a set of POIs held behind a read-write lock,
//! optionally loaded from a JSON file. Network-backed lookups live outside
//! this crate and implement the same trait.

use crate::domain::geo;
use crate::domain::types::{Coordinate, Poi, PoiCategory};
use crate::services::route_optimizer::closest_first;
use anyhow::{bail, Context};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fs;
use std::path::Path;
use tracing::debug;

#[async_trait]
pub trait PoiLookup: Send + Sync {
    /// POIs within `radius_miles` of `center`, nearest first
    async fn search(
        &self,
        center: Coordinate,
        radius_miles: f64,
        category: Option<PoiCategory>,
    ) -> anyhow::Result<Vec<Poi>>;
}

/// In-memory POI catalogue
#[derive(Debug, Default)]
pub struct PoiCatalog {
    pois: RwLock<Vec<Poi>>,
}

impl PoiCatalog {
    pub fn new(pois: Vec<Poi>) -> Self {
        Self { pois: RwLock::new(pois) }
    }

    /// Load a JSON array of POIs
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read POI catalogue {}", path.display()))?;
        let pois: Vec<Poi> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse POI catalogue {}", path.display()))?;
        debug!(path = %path.display(), pois = %pois.len(), "poi_catalog_loaded");
        Ok(Self::new(pois))
    }

    /// Add or replace a POI (matched by id)
    pub fn insert(&self, poi: Poi) {
        let mut pois = self.pois.write();
        match pois.iter_mut().find(|p| p.id == poi.id) {
            Some(existing) => *existing = poi,
            None => pois.push(poi),
        }
    }

    pub fn len(&self) -> usize {
        self.pois.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pois.read().is_empty()
    }

    fn search_sync(
        &self,
        center: Coordinate,
        radius_miles: f64,
        category: Option<PoiCategory>,
    ) -> Vec<Poi> {
        let pois = self.pois.read();
        let mut hits: Vec<(f64, &Poi)> = pois
            .iter()
            .filter(|p| category.map_or(true, |c| p.category == c))
            .map(|p| (geo::distance_miles(center, p.location), p))
            .filter(|(d, _)| *d <= radius_miles)
            .collect();
        hits.sort_by(|a, b| closest_first(*a, *b));
        hits.into_iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl PoiLookup for PoiCatalog {
    async fn search(
        &self,
        center: Coordinate,
        radius_miles: f64,
        category: Option<PoiCategory>,
    ) -> anyhow::Result<Vec<Poi>> {
        if !radius_miles.is_finite() || radius_miles < 0.0 {
            bail!("search radius must be a non-negative number of miles, got {radius_miles}");
        }
        let hits = self.search_sync(center, radius_miles, category);
        debug!(
            center = %center,
            radius_miles = %radius_miles,
            category = ?category.map(|c| c.as_str()),
            hits = %hits.len(),
            "poi_search"
        );
        Ok(hits)
    }
}
