//! Tour data model: an ordered list of waypoints driven by one vehicle

use crate::domain::geo;
use crate::domain::types::{Coordinate, DomainError, DrivingConditions, Poi, PoiId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// Newtype wrapper for tour IDs (UUIDv7, time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TourId(pub Uuid);

impl TourId {
    pub fn new() -> Self {
        TourId(Uuid::now_v7())
    }
}

impl Default for TourId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TourId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tour lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TourStatus {
    Draft,
    Planned,
    Active,
    Completed,
}

impl TourStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            TourStatus::Draft => "draft",
            TourStatus::Planned => "planned",
            TourStatus::Active => "active",
            TourStatus::Completed => "completed",
        }
    }

    /// The only status this one may move to
    fn successor(&self) -> Option<TourStatus> {
        match self {
            TourStatus::Draft => Some(TourStatus::Planned),
            TourStatus::Planned => Some(TourStatus::Active),
            TourStatus::Active => Some(TourStatus::Completed),
            TourStatus::Completed => None,
        }
    }
}

/// A single stop in a tour
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    pub location: Coordinate,
    pub name: String,
    /// 0-based, contiguous within the owning tour
    pub sequence: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poi_id: Option<PoiId>,
    pub is_charging_stop: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dwell_seconds: Option<u64>,
}

impl Waypoint {
    /// Free-standing waypoint (e.g. the departure point)
    pub fn at(location: Coordinate, name: &str) -> Self {
        Self {
            location,
            name: name.to_string(),
            sequence: 0,
            poi_id: None,
            is_charging_stop: false,
            dwell_seconds: None,
        }
    }

    /// Waypoint visiting a POI. Chargers become charging stops.
    pub fn for_poi(poi: &Poi) -> Self {
        Self {
            location: poi.location,
            name: poi.name.clone(),
            sequence: 0,
            poi_id: Some(poi.id.clone()),
            is_charging_stop: poi.is_charger(),
            dwell_seconds: None,
        }
    }

    pub fn dwell(&self) -> Option<Duration> {
        self.dwell_seconds.map(Duration::from_secs)
    }
}

/// A planned road trip
#[derive(Debug, Clone, Serialize)]
pub struct Tour {
    id: TourId,
    status: TourStatus,
    vehicle_id: String,
    conditions: DrivingConditions,
    created_at: DateTime<Utc>,
    waypoints: Vec<Waypoint>,
}

impl Tour {
    /// Create an empty draft tour
    pub fn new(vehicle_id: &str, conditions: DrivingConditions) -> Self {
        Self {
            id: TourId::new(),
            status: TourStatus::Draft,
            vehicle_id: vehicle_id.to_string(),
            conditions,
            created_at: Utc::now(),
            waypoints: Vec::with_capacity(16),
        }
    }

    pub fn id(&self) -> TourId {
        self.id
    }

    pub fn status(&self) -> TourStatus {
        self.status
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn conditions(&self) -> &DrivingConditions {
        &self.conditions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Append a waypoint, assigning the next sequence number
    pub fn push_waypoint(&mut self, mut waypoint: Waypoint) {
        waypoint.sequence = self.waypoints.len();
        self.waypoints.push(waypoint);
    }

    /// Insert a waypoint at `index` and renumber everything after it
    pub fn insert_waypoint(&mut self, index: usize, waypoint: Waypoint) {
        let index = index.min(self.waypoints.len());
        self.waypoints.insert(index, waypoint);
        self.renumber_from(index);
    }

    /// Remove the waypoint at `index`, renumbering the remainder
    pub fn remove_waypoint(&mut self, index: usize) -> Option<Waypoint> {
        if index >= self.waypoints.len() {
            return None;
        }
        let removed = self.waypoints.remove(index);
        self.renumber_from(index);
        Some(removed)
    }

    /// Set the dwell time of the waypoint at `index`
    pub fn set_dwell(&mut self, index: usize, dwell: Duration) -> bool {
        match self.waypoints.get_mut(index) {
            Some(waypoint) => {
                waypoint.dwell_seconds = Some(dwell.as_secs());
                true
            }
            None => false,
        }
    }

    fn renumber_from(&mut self, start: usize) {
        for (seq, waypoint) in self.waypoints.iter_mut().enumerate().skip(start) {
            waypoint.sequence = seq;
        }
    }

    /// True if sequence numbers are exactly 0..n in order
    pub fn has_contiguous_sequence(&self) -> bool {
        self.waypoints.iter().enumerate().all(|(i, w)| w.sequence == i)
    }

    pub fn charging_stops(&self) -> impl Iterator<Item = &Waypoint> {
        self.waypoints.iter().filter(|w| w.is_charging_stop)
    }

    /// Length of consecutive segment `from → from + 1`
    pub fn segment_miles(&self, from: usize) -> Option<f64> {
        let a = self.waypoints.get(from)?;
        let b = self.waypoints.get(from + 1)?;
        Some(geo::distance_miles(a.location, b.location))
    }

    pub fn total_distance_miles(&self) -> f64 {
        geo::path_length_miles(self.waypoints.iter().map(|w| w.location))
    }

    /// Move to the next lifecycle status
    pub fn transition_to(&mut self, next: TourStatus) -> Result<(), DomainError> {
        if self.status.successor() != Some(next) {
            return Err(DomainError::InvalidTourTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }
        self.status = next;
        Ok(())
    }
}
