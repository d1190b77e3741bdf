//! Connects a planned tour to the narration queue
//!
//! `prepare` turns the tour's POI stops into queued narrations. After that the
//! location provider feeds `on_position`, which decides on each update whether
//! the next narration should start now, wait, or be skipped because the
//! vehicle has already reached its subject.

use crate::domain::geo;
use crate::domain::narration::{Narration, NarrationId, NarrationStatus, NarrationTiming};
use crate::domain::tour::Tour;
use crate::domain::types::{Coordinate, Poi, PoiId};
use crate::infra::config::NarrationConfig;
use crate::io::content::ContentGenerator;
use crate::services::narration_queue::{NarrationQueue, QueueError};
use crate::services::narration_timing::{NarrationTimingCalculator, TimingError};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::ops::RangeInclusive;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DirectorError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Timing(#[from] TimingError),
}

/// What `prepare` put on the queue
#[derive(Debug, Clone, Default, Serialize)]
pub struct PreparedNarrations {
    pub enqueued: usize,
    pub failed: Vec<NarrationId>,
    pub pending: usize,
}

/// Outcome of one position update
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DirectorAction {
    /// Something is playing or nothing is queued
    Idle,
    Waiting { narration_id: NarrationId, distance_miles: f64, timing: NarrationTiming },
    Started { narration: Narration, distance_miles: f64 },
    Skipped { narration_id: NarrationId },
    /// The narration cannot be placed on the route and was marked failed
    Failed { narration_id: NarrationId },
}

pub struct NarrationDirector {
    queue: NarrationQueue,
    calculator: NarrationTimingCalculator,
    arrival_window: RangeInclusive<f64>,
    target_duration_seconds: f64,
    /// Where each narrated POI is, for distance checks
    locations: RwLock<FxHashMap<PoiId, Coordinate>>,
}

impl NarrationDirector {
    pub fn new(queue: NarrationQueue, config: &NarrationConfig) -> Self {
        Self {
            queue,
            calculator: NarrationTimingCalculator::from_config(config),
            arrival_window: config.arrival_window(),
            target_duration_seconds: config.target_duration_seconds,
            locations: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn queue(&self) -> &NarrationQueue {
        &self.queue
    }

    /// Generate and enqueue narrations for every POI stop of `tour`, in tour order.
    ///
    /// Charging stops are not narrated. A POI whose content cannot be produced
    /// is enqueued already failed so playback moves past it.
    pub async fn prepare(
        &self,
        tour: &Tour,
        pois: &[Poi],
        generator: &dyn ContentGenerator,
        interests: &[String],
    ) -> Result<PreparedNarrations, DirectorError> {
        let by_id: FxHashMap<&PoiId, &Poi> = pois.iter().map(|p| (&p.id, p)).collect();

        let mut batch = Vec::new();
        let mut failed = Vec::new();
        for waypoint in tour.waypoints().iter().filter(|w| !w.is_charging_stop) {
            let Some(poi_id) = &waypoint.poi_id else {
                continue;
            };
            let narration = match by_id.get(poi_id) {
                Some(poi) => match generator.generate(poi, self.target_duration_seconds, interests).await {
                    Ok(narration) => narration,
                    Err(e) => {
                        warn!(poi_id = %poi_id, error = %e, "narration_generation_failed");
                        Narration::failed(poi_id.clone(), &waypoint.name, &e.to_string())
                    }
                },
                None => {
                    warn!(poi_id = %poi_id, "narration_poi_missing");
                    Narration::failed(poi_id.clone(), &waypoint.name, "POI details unavailable")
                }
            };
            if narration.failure_reason.is_some() {
                failed.push(narration.id);
            }
            self.locations.write().insert(poi_id.clone(), waypoint.location);
            batch.push(narration);
        }

        let enqueued = batch.len();
        let pending = self.queue.enqueue(batch).await?;

        info!(
            tour_id = %tour.id(),
            enqueued = %enqueued,
            failed = %failed.len(),
            pending = %pending,
            "narrations_prepared"
        );
        Ok(PreparedNarrations { enqueued, failed, pending })
    }

    /// React to a location update from the vehicle
    pub async fn on_position(
        &self,
        position: Coordinate,
        speed_mph: f64,
    ) -> Result<DirectorAction, DirectorError> {
        if self.queue.current().await?.is_some() {
            return Ok(DirectorAction::Idle);
        }
        let Some(narration) = self.queue.peek_next().await? else {
            return Ok(DirectorAction::Idle);
        };

        let location = self.locations.read().get(&narration.poi_id).copied();
        let Some(location) = location else {
            warn!(narration_id = %narration.id, poi_id = %narration.poi_id, "narration_location_unknown");
            self.queue.update_status(narration.id, NarrationStatus::Failed).await?;
            return Ok(DirectorAction::Failed { narration_id: narration.id });
        };

        let distance = geo::distance_miles(position, location);
        if distance <= self.calculator.min_trigger_distance_miles() {
            info!(
                narration_id = %narration.id,
                poi_id = %narration.poi_id,
                distance_miles = %format!("{distance:.2}"),
                "narration_passed"
            );
            self.queue.update_status(narration.id, NarrationStatus::Skipped).await?;
            return Ok(DirectorAction::Skipped { narration_id: narration.id });
        }

        let timing =
            self.calculator.calculate_timing(&narration, distance, speed_mph, &self.arrival_window)?;
        if !timing.is_valid {
            debug!(
                narration_id = %narration.id,
                distance_miles = %format!("{distance:.2}"),
                arrival_lead_secs = %format!("{:.0}", timing.arrival_lead_seconds),
                "narration_waiting"
            );
            return Ok(DirectorAction::Waiting { narration_id: narration.id, distance_miles: distance, timing });
        }

        // Only the narration whose timing was checked may start
        match self.queue.start_if_next(narration.id).await {
            Ok(started) => Ok(DirectorAction::Started { narration: started, distance_miles: distance }),
            Err(QueueError::Busy(_) | QueueError::HeadChanged { .. }) => {
                debug!(narration_id = %narration.id, "narration_start_superseded");
                Ok(DirectorAction::Idle)
            }
            Err(e) => Err(e.into()),
        }
    }
}
