//! Tour assembly with automatic charging-stop insertion
//!
//! Planning runs in three phases:
//! - order the POIs with the nearest-neighbour optimizer, prefixed by a
//!   "Start" waypoint at the departure location
//! - walk the tour segment by segment, tracking battery (chargers top it up)
//! - on the first unsafe segment ask the POI lookup for a charger near the
//!   segment origin, insert it, renumber, and walk again from the start
//!
//! The search radius widens geometrically up to a cap; when it is exhausted,
//! or too many chargers have been inserted, the trip is reported as unsafe.
//! An unsafe trip is a normal outcome carrying the partial tour, not an error.

#[cfg(test)]
mod tests;

use crate::domain::geo;
use crate::domain::tour::{Tour, TourStatus, Waypoint};
use crate::domain::types::{Coordinate, DrivingConditions, Poi, PoiCategory, PoiId, Vehicle};
use crate::infra::config::PlannerConfig;
use crate::infra::metrics::Metrics;
use crate::io::poi_lookup::PoiLookup;
use crate::services::range_estimator::{RangeError, RangeEstimator};
use crate::services::route_optimizer::{closest_first, optimize_route, route_length_miles};
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no route: the tour has no points of interest")]
    NoRouteFound,

    #[error("POI lookup failed")]
    Lookup(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<RangeError> for PlannerError {
    fn from(e: RangeError) -> Self {
        match e {
            RangeError::InvalidInput(msg) => PlannerError::InvalidInput(msg),
        }
    }
}

/// A tour that validates safely end to end
#[derive(Debug, Clone, Serialize)]
pub struct TourPlan {
    pub tour: Tour,
    pub was_safe_without_chargers: bool,
    pub chargers_added: usize,
}

/// No charger sequence could make the tour safe
#[derive(Debug, Clone, Serialize)]
pub struct UnsafeTrip {
    /// The tour as far as planning got, inserted chargers included
    pub tour: Tour,
    /// Sequence number of the segment origin that cannot be left safely
    pub from_sequence: usize,
    pub to_sequence: usize,
    pub battery_at_origin: f64,
    pub required_battery: f64,
    pub chargers_added: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PlanOutcome {
    Planned(TourPlan),
    Unsafe(UnsafeTrip),
}

impl PlanOutcome {
    pub fn tour(&self) -> &Tour {
        match self {
            PlanOutcome::Planned(plan) => &plan.tour,
            PlanOutcome::Unsafe(trip) => &trip.tour,
        }
    }

    pub fn is_safe(&self) -> bool {
        matches!(self, PlanOutcome::Planned(_))
    }
}

/// First segment that fails the safety check
#[derive(Debug, Clone, Copy)]
struct Violation {
    from: usize,
    battery_at_origin: f64,
    required: f64,
}

enum Walk {
    /// Battery on arrival at each waypoint (index-aligned, before charging)
    Safe(Vec<f64>),
    Unsafe(Violation),
}

fn check_battery(battery: f64) -> Result<(), PlannerError> {
    if !battery.is_finite() || !(0.0..=1.0).contains(&battery) {
        return Err(PlannerError::InvalidInput(format!(
            "starting battery must be within [0, 1], got {battery}"
        )));
    }
    Ok(())
}

/// Builds safe tours. Holds no per-call state; one instance serves many calls.
pub struct TourPlanner {
    config: PlannerConfig,
    estimator: Arc<dyn RangeEstimator>,
    metrics: Option<Arc<Metrics>>,
}

impl TourPlanner {
    pub fn new(config: PlannerConfig, estimator: Arc<dyn RangeEstimator>) -> Self {
        Self { config, estimator, metrics: None }
    }

    /// Create a planner that records outcomes to metrics
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan a tour from `start` through every POI, inserting chargers as needed
    pub async fn create_tour(
        &self,
        start: Coordinate,
        pois: &[Poi],
        vehicle: &Vehicle,
        starting_battery: f64,
        conditions: &DrivingConditions,
        lookup: &dyn PoiLookup,
    ) -> Result<PlanOutcome, PlannerError> {
        if pois.is_empty() {
            return Err(PlannerError::NoRouteFound);
        }
        check_battery(starting_battery)?;
        let started = Instant::now();

        let ordered = optimize_route(start, pois);
        let mut tour = Tour::new(vehicle.id(), *conditions);
        tour.push_waypoint(Waypoint::at(start, "Start"));
        for poi in &ordered {
            tour.push_waypoint(Waypoint::for_poi(poi));
        }

        info!(
            tour_id = %tour.id(),
            vehicle_id = %vehicle.id(),
            pois = %ordered.len(),
            route_miles = %format!("{:.1}", route_length_miles(start, &ordered)),
            starting_battery = %starting_battery,
            "tour_route_ordered"
        );

        // Charger power by POI id, for dwell estimates
        let mut charger_power: FxHashMap<PoiId, f64> = ordered
            .iter()
            .filter_map(|p| p.charger_power_kw().map(|kw| (p.id.clone(), kw)))
            .collect();

        let mut chargers_added = 0usize;

        loop {
            let violation = match self.walk(&tour, vehicle, starting_battery, conditions)? {
                Walk::Safe(arrivals) => {
                    self.assign_charging_dwell(&mut tour, vehicle, &arrivals, &charger_power);
                    tour.transition_to(TourStatus::Planned)
                        .map_err(|e| PlannerError::InvalidInput(e.to_string()))?;
                    let plan = TourPlan {
                        tour,
                        was_safe_without_chargers: chargers_added == 0,
                        chargers_added,
                    };
                    info!(
                        tour_id = %plan.tour.id(),
                        waypoints = %plan.tour.len(),
                        chargers_added = %chargers_added,
                        total_miles = %format!("{:.1}", plan.tour.total_distance_miles()),
                        "tour_planned"
                    );
                    self.record(true, chargers_added, started);
                    return Ok(PlanOutcome::Planned(plan));
                }
                Walk::Unsafe(violation) => violation,
            };
            debug!(
                tour_id = %tour.id(),
                from_sequence = %violation.from,
                battery_at_origin = %format!("{:.3}", violation.battery_at_origin),
                required = %format!("{:.3}", violation.required),
                "tour_segment_unsafe"
            );

            let charger = if chargers_added < self.config.max_charger_insertions {
                self.find_charger(&tour, violation, vehicle, conditions, lookup).await?
            } else {
                None
            };

            let Some(charger) = charger else {
                warn!(
                    tour_id = %tour.id(),
                    from_sequence = %violation.from,
                    chargers_added = %chargers_added,
                    "tour_unsafe"
                );
                self.record(false, chargers_added, started);
                return Ok(PlanOutcome::Unsafe(UnsafeTrip {
                    tour,
                    from_sequence: violation.from,
                    to_sequence: violation.from + 1,
                    battery_at_origin: violation.battery_at_origin,
                    required_battery: violation.required,
                    chargers_added,
                }));
            };

            info!(
                tour_id = %tour.id(),
                charger_id = %charger.id,
                charger_name = %charger.name,
                at_sequence = %(violation.from + 1),
                "charger_inserted"
            );
            if let Some(kw) = charger.charger_power_kw() {
                charger_power.insert(charger.id.clone(), kw);
            }
            tour.insert_waypoint(violation.from + 1, Waypoint::for_poi(&charger));
            chargers_added += 1;
        }
    }

    /// Re-check a tour, e.g. after manual edits
    pub fn validate_tour_safety(
        &self,
        tour: &Tour,
        vehicle: &Vehicle,
        starting_battery: f64,
        conditions: &DrivingConditions,
    ) -> Result<bool, PlannerError> {
        check_battery(starting_battery)?;
        let safe = matches!(self.walk(tour, vehicle, starting_battery, conditions)?, Walk::Safe(_));
        debug!(tour_id = %tour.id(), safe = %safe, "tour_validated");
        Ok(safe)
    }

    fn walk(
        &self,
        tour: &Tour,
        vehicle: &Vehicle,
        starting_battery: f64,
        conditions: &DrivingConditions,
    ) -> Result<Walk, PlannerError> {
        let waypoints = tour.waypoints();
        let mut arrivals = Vec::with_capacity(waypoints.len());
        let mut battery = starting_battery;
        arrivals.push(battery);

        for (i, waypoint) in waypoints.iter().enumerate().take(waypoints.len().saturating_sub(1)) {
            if waypoint.is_charging_stop && battery < self.config.charge_target {
                battery = self.config.charge_target;
            }

            let leg_conditions = leg_conditions(conditions, i);
            let distance = tour.segment_miles(i).unwrap_or(0.0);

            if !self.estimator.is_trip_safe(vehicle, battery, distance, &leg_conditions)? {
                let required =
                    self.estimator.required_battery_for_trip(vehicle, distance, &leg_conditions)?;
                return Ok(Walk::Unsafe(Violation { from: i, battery_at_origin: battery, required }));
            }

            let used = self.estimator.energy_fraction_for(vehicle, distance, &leg_conditions)?;
            battery = (battery - used).max(0.0);
            arrivals.push(battery);
        }

        Ok(Walk::Safe(arrivals))
    }

    /// Closest usable charger around the violation origin, widening the radius
    async fn find_charger(
        &self,
        tour: &Tour,
        violation: Violation,
        vehicle: &Vehicle,
        conditions: &DrivingConditions,
        lookup: &dyn PoiLookup,
    ) -> Result<Option<Poi>, PlannerError> {
        let origin = &tour.waypoints()[violation.from];
        let destination = tour.waypoints()[violation.from + 1].location;
        let origin_to_destination = geo::distance_miles(origin.location, destination);
        let leg_conditions = leg_conditions(conditions, violation.from);

        let mut radius = self.config.initial_search_radius_miles;
        loop {
            if let Some(metrics) = &self.metrics {
                metrics.record_poi_lookup();
            }
            let candidates = lookup
                .search(origin.location, radius, Some(PoiCategory::EvCharger))
                .await
                .map_err(|e| PlannerError::Lookup(e.into()))?;

            let mut best: Option<(f64, &Poi)> = None;
            for candidate in &candidates {
                if !candidate.is_compatible_with(vehicle) || in_tour(tour, &candidate.id) {
                    continue;
                }
                // From a non-charging origin a charger behind us still helps;
                // from a charger it must bring us closer to the destination.
                let remaining = geo::distance_miles(candidate.location, destination);
                if origin.is_charging_stop && remaining >= origin_to_destination {
                    continue;
                }
                let reach = geo::distance_miles(origin.location, candidate.location);
                if !self.estimator.is_trip_safe(
                    vehicle,
                    violation.battery_at_origin,
                    reach,
                    &leg_conditions,
                )? {
                    continue;
                }
                let better = match best {
                    Some(current) => closest_first((reach, candidate), current).is_lt(),
                    None => true,
                };
                if better {
                    best = Some((reach, candidate));
                }
            }

            debug!(
                from_sequence = %violation.from,
                radius_miles = %radius,
                candidates = %candidates.len(),
                found = %best.is_some(),
                "charger_search"
            );

            if let Some((_, charger)) = best {
                return Ok(Some(charger.clone()));
            }
            if radius >= self.config.max_search_radius_miles {
                return Ok(None);
            }
            radius = (radius * self.config.radius_growth_factor)
                .min(self.config.max_search_radius_miles);
        }
    }

    /// Estimate how long each charging stop takes to reach the charge target
    fn assign_charging_dwell(
        &self,
        tour: &mut Tour,
        vehicle: &Vehicle,
        arrivals: &[f64],
        charger_power: &FxHashMap<PoiId, f64>,
    ) {
        let target = self.config.charge_target;
        let overhead_secs = self.config.charging_overhead_minutes * 60.0;

        let dwells: Vec<(usize, Duration)> = tour
            .waypoints()
            .iter()
            .zip(arrivals)
            .filter(|(w, arrival)| w.is_charging_stop && **arrival < target)
            .map(|(w, arrival)| {
                let power_kw = w
                    .poi_id
                    .as_ref()
                    .and_then(|id| charger_power.get(id).copied())
                    .unwrap_or(self.config.default_charger_power_kw);
                let energy_kwh = (target - arrival) * vehicle.battery_capacity_kwh();
                let secs = energy_kwh / power_kw * 3600.0 + overhead_secs;
                (w.sequence, Duration::from_secs_f64(secs.max(0.0)))
            })
            .collect();

        for (index, dwell) in dwells {
            tour.set_dwell(index, dwell);
        }
    }

    fn record(&self, safe: bool, chargers_added: usize, started: Instant) {
        if let Some(metrics) = &self.metrics {
            metrics.record_plan(safe, chargers_added, started.elapsed().as_micros() as u64);
        }
    }
}

/// Cold soak only affects the first departure
#[inline]
fn leg_conditions(conditions: &DrivingConditions, from: usize) -> DrivingConditions {
    if from == 0 {
        *conditions
    } else {
        conditions.departed()
    }
}

fn in_tour(tour: &Tour, id: &PoiId) -> bool {
    tour.waypoints().iter().any(|w| w.poi_id.as_ref() == Some(id))
}
