//! When to start a narration so it finishes before the vehicle reaches the POI
//!
//! The narration plays while driving, covering `speed × duration` miles. It
//! must start at least that far out, and never closer than the minimum
//! trigger distance. A timing is usable only when the narration fits in the
//! remaining distance and ends inside the arrival window.

use crate::domain::narration::{Narration, NarrationTiming};
use crate::infra::config::NarrationConfig;
use std::ops::RangeInclusive;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TimingError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Stateless trigger-point calculator
#[derive(Debug, Clone, Copy)]
pub struct NarrationTimingCalculator {
    min_trigger_distance_miles: f64,
}

impl Default for NarrationTimingCalculator {
    fn default() -> Self {
        Self::new(NarrationConfig::default().min_trigger_distance_miles)
    }
}

impl NarrationTimingCalculator {
    pub fn new(min_trigger_distance_miles: f64) -> Self {
        Self { min_trigger_distance_miles: min_trigger_distance_miles.max(0.0) }
    }

    pub fn from_config(config: &NarrationConfig) -> Self {
        Self::new(config.min_trigger_distance_miles)
    }

    pub fn min_trigger_distance_miles(&self) -> f64 {
        self.min_trigger_distance_miles
    }

    /// Trigger point for `narration` given the current approach.
    ///
    /// Stopped or receding vehicles and POIs already reached yield a timing
    /// with `is_valid == false` rather than an error.
    ///
    /// The trigger lies in `[min_trigger_distance, distance]` whenever the
    /// vehicle is at least the minimum distance out. Closer than that the
    /// trigger stays at the minimum and the timing is invalid.
    pub fn calculate_timing(
        &self,
        narration: &Narration,
        distance_from_poi_miles: f64,
        current_speed_mph: f64,
        arrival_window: &RangeInclusive<f64>,
    ) -> Result<NarrationTiming, TimingError> {
        self.timing_for_duration(
            narration.duration_seconds,
            distance_from_poi_miles,
            current_speed_mph,
            arrival_window,
        )
    }

    /// Same calculation from a raw duration
    pub fn timing_for_duration(
        &self,
        duration_seconds: f64,
        distance_from_poi_miles: f64,
        current_speed_mph: f64,
        arrival_window: &RangeInclusive<f64>,
    ) -> Result<NarrationTiming, TimingError> {
        check_inputs(duration_seconds, distance_from_poi_miles, current_speed_mph)?;
        check_window(arrival_window)?;

        let distance = distance_from_poi_miles;
        let moving = current_speed_mph > 0.0;

        let travel = if moving { current_speed_mph * duration_seconds / 3600.0 } else { 0.0 };
        let trigger = (distance - travel).max(self.min_trigger_distance_miles);
        let time_to_trigger = if moving {
            ((distance - trigger) / current_speed_mph * 3600.0).max(0.0)
        } else {
            0.0
        };
        let arrival_lead = if moving { (distance - travel) / current_speed_mph * 3600.0 } else { 0.0 };

        let is_valid = moving
            && distance > self.min_trigger_distance_miles
            && distance - travel >= 0.0
            && arrival_lead <= *arrival_window.end();

        Ok(NarrationTiming {
            trigger_distance_miles: trigger,
            time_to_trigger_seconds: time_to_trigger,
            narration_travel_distance_miles: travel,
            arrival_lead_seconds: arrival_lead,
            is_valid,
        })
    }
}

fn check_inputs(duration: f64, distance: f64, speed: f64) -> Result<(), TimingError> {
    if !duration.is_finite() || duration < 0.0 {
        return Err(TimingError::InvalidInput(format!(
            "narration duration must be >= 0 seconds, got {duration}"
        )));
    }
    if !distance.is_finite() {
        return Err(TimingError::InvalidInput(format!("distance must be finite, got {distance}")));
    }
    if !speed.is_finite() {
        return Err(TimingError::InvalidInput(format!("speed must be finite, got {speed}")));
    }
    Ok(())
}

fn check_window(window: &RangeInclusive<f64>) -> Result<(), TimingError> {
    let (start, end) = (*window.start(), *window.end());
    if !start.is_finite() || !end.is_finite() || start < 0.0 || start > end {
        return Err(TimingError::InvalidInput(format!(
            "arrival window must satisfy 0 <= start <= end, got {start}..={end}"
        )));
    }
    Ok(())
}
