//! JSON trip requests read by the command-line tool

use crate::domain::types::{Coordinate, DrivingConditions, Poi, Vehicle};
use anyhow::{ensure, Context};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Everything needed to plan (or just range-check) one trip
#[derive(Debug, Clone, Deserialize)]
pub struct TripRequest {
    pub vehicle: Vehicle,
    pub start: Coordinate,
    /// Starting charge as a fraction (0..=1)
    pub battery: f64,
    #[serde(default)]
    pub conditions: DrivingConditions,
    /// Stops to visit, in any order
    #[serde(default)]
    pub pois: Vec<Poi>,
    /// Charging stations the planner may insert
    #[serde(default)]
    pub chargers: Vec<Poi>,
    /// Listener interests used to pick narration details
    #[serde(default)]
    pub interests: Vec<String>,
    /// Optional leg length for range checks
    #[serde(default)]
    pub distance_miles: Option<f64>,
}

impl TripRequest {
    pub fn from_json_str(content: &str, origin: &str) -> anyhow::Result<Self> {
        let request: TripRequest = serde_json::from_str(content)
            .with_context(|| format!("Failed to parse trip request {origin}"))?;
        ensure!(
            request.chargers.iter().all(Poi::is_charger),
            "trip request {origin}: every entry in `chargers` must have category ev_charger"
        );
        debug!(
            origin = %origin,
            vehicle_id = %request.vehicle.id(),
            pois = %request.pois.len(),
            chargers = %request.chargers.len(),
            "trip_request_loaded"
        );
        Ok(request)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read trip request {}", path.display()))?;
        Self::from_json_str(&content, &path.display().to_string())
    }
}
