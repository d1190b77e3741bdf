//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. EV_TOUR_CONFIG environment variable
//! 3. Default: config/default.toml
//!
//! Every section is optional; missing keys fall back to the defaults below.

use anyhow::{ensure, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::ops::RangeInclusive;
use std::path::Path;
use tracing::warn;

/// Range model coefficients
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RangeConfig {
    /// Temperature (°F) at which no cold penalty applies
    pub reference_temperature_f: f64,
    /// Fractional range loss per °F below the reference
    pub temperature_penalty_per_degree: f64,
    /// Upper bound on the temperature penalty
    pub max_temperature_penalty: f64,
    /// Fractional range loss per 1000 ft of net climb
    pub elevation_penalty_per_1000ft: f64,
    /// Speed above which aerodynamic losses are modelled
    pub highway_speed_threshold_mph: f64,
    /// Fractional range loss per mph above the threshold
    pub speed_penalty_per_mph: f64,
    /// The condition multiplier never drops below this
    pub min_condition_multiplier: f64,
    /// Miles of range lost per hour of cold soak
    pub cold_soak_miles_per_hour: f64,
    /// Soak hours beyond this add no further loss
    pub max_cold_soak_hours: f64,
    /// Extra battery fraction reserved on top of the physics requirement
    pub safety_buffer: f64,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            reference_temperature_f: 70.0,
            temperature_penalty_per_degree: 0.008,
            max_temperature_penalty: 0.5,
            elevation_penalty_per_1000ft: 0.02,
            highway_speed_threshold_mph: 65.0,
            speed_penalty_per_mph: 0.01,
            min_condition_multiplier: 0.1,
            cold_soak_miles_per_hour: 1.5,
            max_cold_soak_hours: 12.0,
            safety_buffer: 0.15,
        }
    }
}

/// Tour planner bounds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Battery fraction reached at every charging stop
    pub charge_target: f64,
    pub initial_search_radius_miles: f64,
    pub radius_growth_factor: f64,
    pub max_search_radius_miles: f64,
    /// Give up after inserting this many chargers
    pub max_charger_insertions: usize,
    /// Assumed charger power when the POI doesn't say
    pub default_charger_power_kw: f64,
    /// Fixed time added to each charging stop (parking, plugging in)
    pub charging_overhead_minutes: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            charge_target: 1.0,
            initial_search_radius_miles: 10.0,
            radius_growth_factor: 2.0,
            max_search_radius_miles: 80.0,
            max_charger_insertions: 12,
            default_charger_power_kw: 50.0,
            charging_overhead_minutes: 5.0,
        }
    }
}

/// Narration timing and generation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NarrationConfig {
    /// Never trigger closer to the POI than this
    pub min_trigger_distance_miles: f64,
    pub arrival_window_min_seconds: f64,
    pub arrival_window_max_seconds: f64,
    pub words_per_minute: f64,
    pub target_duration_seconds: f64,
}

impl Default for NarrationConfig {
    fn default() -> Self {
        Self {
            min_trigger_distance_miles: 0.5,
            arrival_window_min_seconds: 0.0,
            arrival_window_max_seconds: 600.0,
            words_per_minute: 150.0,
            target_duration_seconds: 120.0,
        }
    }
}

impl NarrationConfig {
    pub fn arrival_window(&self) -> RangeInclusive<f64> {
        self.arrival_window_min_seconds..=self.arrival_window_max_seconds
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of the queue worker's command channel
    pub command_buffer: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { command_buffer: 64 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Interval for logging metrics summaries (0 to disable)
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TomlConfig {
    pub range: RangeConfig,
    pub planner: PlannerConfig,
    pub narration: NarrationConfig,
    pub queue: QueueConfig,
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the crate
#[derive(Debug, Clone)]
pub struct Config {
    range: RangeConfig,
    planner: PlannerConfig,
    narration: NarrationConfig,
    queue_command_buffer: usize,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        Self {
            range: toml_config.range,
            planner: toml_config.planner,
            narration: toml_config.narration,
            queue_command_buffer: toml_config.queue.command_buffer,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("EV_TOUR_CONFIG") {
            return path;
        }

        "config/default.toml".to_string()
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, origin: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig =
            toml::from_str(content).with_context(|| format!("Failed to parse config {origin}"))?;
        let config = Self::from_toml(toml_config, origin.to_string());
        config.validate().with_context(|| format!("Invalid config {origin}"))?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration from a path, falling back to defaults on any error
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    /// Load configuration - resolves the path from args/env, then as `load_from_path`
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(Self::resolve_config_path(args))
    }

    fn validate(&self) -> anyhow::Result<()> {
        let r = &self.range;
        ensure!(r.safety_buffer >= 0.0, "range.safety_buffer must be >= 0");
        ensure!(
            (0.0..=1.0).contains(&r.max_temperature_penalty),
            "range.max_temperature_penalty must be within [0, 1]"
        );
        ensure!(
            r.min_condition_multiplier > 0.0 && r.min_condition_multiplier <= 1.0,
            "range.min_condition_multiplier must be within (0, 1]"
        );
        ensure!(
            r.temperature_penalty_per_degree >= 0.0
                && r.elevation_penalty_per_1000ft >= 0.0
                && r.speed_penalty_per_mph >= 0.0
                && r.cold_soak_miles_per_hour >= 0.0,
            "range penalties must be >= 0"
        );

        let p = &self.planner;
        ensure!(
            p.charge_target > 0.0 && p.charge_target <= 1.0,
            "planner.charge_target must be within (0, 1]"
        );
        ensure!(p.initial_search_radius_miles > 0.0, "planner.initial_search_radius_miles must be > 0");
        ensure!(p.radius_growth_factor > 1.0, "planner.radius_growth_factor must be > 1");
        ensure!(
            p.max_search_radius_miles >= p.initial_search_radius_miles,
            "planner.max_search_radius_miles must be >= initial radius"
        );
        ensure!(p.default_charger_power_kw > 0.0, "planner.default_charger_power_kw must be > 0");

        let n = &self.narration;
        ensure!(n.min_trigger_distance_miles >= 0.0, "narration.min_trigger_distance_miles must be >= 0");
        ensure!(
            n.arrival_window_min_seconds >= 0.0
                && n.arrival_window_min_seconds <= n.arrival_window_max_seconds,
            "narration arrival window must satisfy 0 <= min <= max"
        );
        ensure!(n.words_per_minute > 0.0, "narration.words_per_minute must be > 0");

        ensure!(self.queue_command_buffer > 0, "queue.command_buffer must be > 0");
        Ok(())
    }

    pub fn range(&self) -> &RangeConfig {
        &self.range
    }

    pub fn planner(&self) -> &PlannerConfig {
        &self.planner
    }

    pub fn narration(&self) -> &NarrationConfig {
        &self.narration
    }

    pub fn queue_command_buffer(&self) -> usize {
        self.queue_command_buffer
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to override the safety buffer
    #[cfg(test)]
    pub fn with_safety_buffer(mut self, buffer: f64) -> Self {
        self.range.safety_buffer = buffer;
        self
    }
}
