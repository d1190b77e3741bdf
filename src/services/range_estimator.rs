//! Battery-to-distance conversion under driving conditions
//!
//! Range is `epa_range × battery × multiplier − soak_loss`, where the
//! multiplier folds in cold, climb and highway-speed penalties and never drops
//! below `min_condition_multiplier`. The inverse gives the battery fraction a
//! trip needs, which is then padded by the safety buffer.

use crate::domain::types::{DrivingConditions, Vehicle};
use crate::infra::config::RangeConfig;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RangeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

fn check_battery(battery_percent: f64) -> Result<(), RangeError> {
    if !battery_percent.is_finite() || !(0.0..=1.0).contains(&battery_percent) {
        return Err(RangeError::InvalidInput(format!(
            "battery fraction must be within [0, 1], got {battery_percent}"
        )));
    }
    Ok(())
}

fn check_distance(distance_miles: f64) -> Result<(), RangeError> {
    if !distance_miles.is_finite() || distance_miles < 0.0 {
        return Err(RangeError::InvalidInput(format!(
            "distance must be a non-negative number of miles, got {distance_miles}"
        )));
    }
    Ok(())
}

fn check_conditions(conditions: &DrivingConditions) -> Result<(), RangeError> {
    if !conditions.temperature_f.is_finite() || !conditions.elevation_change_ft.is_finite() {
        return Err(RangeError::InvalidInput("temperature and elevation must be finite".into()));
    }
    if !conditions.average_speed_mph.is_finite() || conditions.average_speed_mph < 0.0 {
        return Err(RangeError::InvalidInput(format!(
            "average speed must be >= 0, got {}",
            conditions.average_speed_mph
        )));
    }
    let soak = conditions.soak_hours();
    if !soak.is_finite() || soak < 0.0 {
        return Err(RangeError::InvalidInput(format!("cold soak hours must be >= 0, got {soak}")));
    }
    Ok(())
}

/// Range model seam. The planner only sees this trait.
pub trait RangeEstimator: Send + Sync {
    /// Miles available from `battery_percent` (0..=1) of charge
    fn estimate_range(
        &self,
        vehicle: &Vehicle,
        battery_percent: f64,
        conditions: &DrivingConditions,
    ) -> Result<f64, RangeError>;

    /// Battery fraction physically consumed by `distance_miles`, without buffer
    fn energy_fraction_for(
        &self,
        vehicle: &Vehicle,
        distance_miles: f64,
        conditions: &DrivingConditions,
    ) -> Result<f64, RangeError>;

    /// Multiplicative reserve applied on top of the physics requirement
    fn safety_buffer(&self) -> f64;

    /// Battery fraction to reserve for the trip, buffer included.
    ///
    /// Not clamped: a value above 1.0 means one charge cannot cover the trip.
    fn required_battery_for_trip(
        &self,
        vehicle: &Vehicle,
        distance_miles: f64,
        conditions: &DrivingConditions,
    ) -> Result<f64, RangeError> {
        let raw = self.energy_fraction_for(vehicle, distance_miles, conditions)?;
        Ok(raw * (1.0 + self.safety_buffer()))
    }

    fn is_trip_safe(
        &self,
        vehicle: &Vehicle,
        battery_percent: f64,
        distance_miles: f64,
        conditions: &DrivingConditions,
    ) -> Result<bool, RangeError> {
        check_battery(battery_percent)?;
        let required = self.required_battery_for_trip(vehicle, distance_miles, conditions)?;
        Ok(battery_percent >= required)
    }
}

/// Production range model driven by `[range]` configuration
#[derive(Debug, Clone)]
pub struct ConditionRangeEstimator {
    config: RangeConfig,
}

impl Default for ConditionRangeEstimator {
    fn default() -> Self {
        Self::new(RangeConfig::default())
    }
}

impl ConditionRangeEstimator {
    pub fn new(config: RangeConfig) -> Self {
        Self { config }
    }

    /// Same model with a different reserve (0.0 gives the raw physics)
    pub fn with_safety_buffer(mut self, buffer: f64) -> Self {
        self.config.safety_buffer = buffer.max(0.0);
        self
    }

    pub fn config(&self) -> &RangeConfig {
        &self.config
    }

    /// Combined condition multiplier in `[min_condition_multiplier, 1]`
    pub fn condition_multiplier(&self, conditions: &DrivingConditions) -> f64 {
        let c = &self.config;

        let cold_degrees = (c.reference_temperature_f - conditions.temperature_f).max(0.0);
        let temperature_penalty =
            (cold_degrees * c.temperature_penalty_per_degree).min(c.max_temperature_penalty);

        let climb_ft = conditions.elevation_change_ft.max(0.0);
        let elevation_penalty = climb_ft / 1000.0 * c.elevation_penalty_per_1000ft;

        let over_mph = (conditions.average_speed_mph - c.highway_speed_threshold_mph).max(0.0);
        let speed_penalty = over_mph * c.speed_penalty_per_mph;

        let multiplier = 1.0 - temperature_penalty - elevation_penalty - speed_penalty;
        multiplier.clamp(c.min_condition_multiplier, 1.0)
    }

    /// Miles lost to battery conditioning while parked in the cold
    pub fn soak_loss_miles(&self, conditions: &DrivingConditions) -> f64 {
        let hours = conditions.soak_hours();
        if hours <= 0.0 {
            return 0.0;
        }
        hours.min(self.config.max_cold_soak_hours) * self.config.cold_soak_miles_per_hour
    }
}

impl RangeEstimator for ConditionRangeEstimator {
    fn estimate_range(
        &self,
        vehicle: &Vehicle,
        battery_percent: f64,
        conditions: &DrivingConditions,
    ) -> Result<f64, RangeError> {
        check_battery(battery_percent)?;
        check_conditions(conditions)?;

        let base = vehicle.epa_range_miles() * battery_percent;
        let range = base * self.condition_multiplier(conditions) - self.soak_loss_miles(conditions);
        Ok(range.max(0.0))
    }

    fn energy_fraction_for(
        &self,
        vehicle: &Vehicle,
        distance_miles: f64,
        conditions: &DrivingConditions,
    ) -> Result<f64, RangeError> {
        check_distance(distance_miles)?;
        check_conditions(conditions)?;
        // Staying put draws nothing, cold soak included
        if distance_miles == 0.0 {
            return Ok(0.0);
        }

        let effective_full_range = vehicle.epa_range_miles() * self.condition_multiplier(conditions);
        Ok((distance_miles + self.soak_loss_miles(conditions)) / effective_full_range)
    }

    fn safety_buffer(&self) -> f64 {
        self.config.safety_buffer
    }
}
