//! ev-tour - EV road-trip planning and narration scheduling
//!
//! Thin command-line front end over the library:
//! - `plan` - order POIs, insert charging stops, report the tour as JSON
//! - `range` - estimate range (and optionally leg safety) for a vehicle
//! - `timing` - compute the trigger point for one narration
//! - `simulate` - plan, prepare narrations, and drive the tour step by step
//!
//! Logs go to stderr; command output is JSON on stdout.

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use ev_tour_core::domain::narration::NarrationStatus;
use ev_tour_core::domain::tour::TourStatus;
use ev_tour_core::domain::types::Coordinate;
use ev_tour_core::infra::{Config, Metrics};
use ev_tour_core::io::{PoiCatalog, TemplateContentGenerator, TripRequest};
use ev_tour_core::services::{
    ConditionRangeEstimator, DirectorAction, NarrationDirector, NarrationQueue,
    NarrationTimingCalculator, RangeEstimator, TourPlanner,
};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// EV road-trip tour planner
#[derive(Parser, Debug)]
#[command(name = "ev-tour", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $EV_TOUR_CONFIG, then config/default.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan a tour from a JSON trip request
    Plan {
        request: PathBuf,
        /// Extra charging stations, as a JSON array of POIs
        #[arg(long)]
        chargers: Option<PathBuf>,
    },
    /// Estimate range for the request's vehicle, battery and conditions
    Range { request: PathBuf },
    /// Narration trigger timing for one approach
    Timing {
        /// Narration length in seconds
        #[arg(long)]
        duration: f64,
        /// Current speed in mph
        #[arg(long)]
        speed: f64,
        /// Remaining distance to the POI in miles
        #[arg(long)]
        distance: f64,
    },
    /// Plan a tour, then drive it at constant speed and report narration playback
    Simulate {
        request: PathBuf,
        /// Extra charging stations, as a JSON array of POIs
        #[arg(long)]
        chargers: Option<PathBuf>,
        /// Driving speed in mph
        #[arg(long, default_value_t = 55.0)]
        speed: f64,
        /// Distance between position updates in miles
        #[arg(long, default_value_t = 0.25)]
        step_miles: f64,
    },
}

fn init_logging(format: LogFormat) {
    // Default: INFO, use RUST_LOG=debug for planner and queue detail
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to encode output")?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_format);

    let config_path = args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[]));
    let config = Config::load_from_path(&config_path);
    info!(
        config_file = %config.config_file(),
        safety_buffer = %config.range().safety_buffer,
        max_charger_insertions = %config.planner().max_charger_insertions,
        min_trigger_distance_miles = %config.narration().min_trigger_distance_miles,
        "config_loaded"
    );

    let metrics = Arc::new(Metrics::new());

    match args.command {
        Command::Plan { request, chargers } => {
            plan(&config, metrics.clone(), &request, chargers.as_deref()).await?
        }
        Command::Range { request } => range(&config, &request)?,
        Command::Timing { duration, speed, distance } => {
            let calculator = NarrationTimingCalculator::from_config(config.narration());
            let timing = calculator.timing_for_duration(
                duration,
                distance,
                speed,
                &config.narration().arrival_window(),
            )?;
            print_json(&timing)?;
        }
        Command::Simulate { request, chargers, speed, step_miles } => {
            simulate(&config, metrics.clone(), &request, chargers.as_deref(), speed, step_miles).await?
        }
    }

    metrics.report().log();
    Ok(())
}

fn planner_for(config: &Config, metrics: Arc<Metrics>) -> TourPlanner {
    let estimator = Arc::new(ConditionRangeEstimator::new(config.range().clone()));
    TourPlanner::new(config.planner().clone(), estimator).with_metrics(metrics)
}

/// Chargers from the request, plus any catalogue file (request entries win on id)
fn charger_catalog(request: &TripRequest, catalog_path: Option<&Path>) -> anyhow::Result<PoiCatalog> {
    let catalog = match catalog_path {
        Some(path) => PoiCatalog::from_json_file(path)?,
        None => PoiCatalog::default(),
    };
    for charger in &request.chargers {
        catalog.insert(charger.clone());
    }
    Ok(catalog)
}

async fn plan(
    config: &Config,
    metrics: Arc<Metrics>,
    path: &Path,
    chargers: Option<&Path>,
) -> anyhow::Result<()> {
    let request = TripRequest::from_json_file(path)?;
    let catalog = charger_catalog(&request, chargers)?;
    let outcome = planner_for(config, metrics)
        .create_tour(
            request.start,
            &request.pois,
            &request.vehicle,
            request.battery,
            &request.conditions,
            &catalog,
        )
        .await?;
    print_json(&outcome)
}

fn range(config: &Config, path: &Path) -> anyhow::Result<()> {
    let request = TripRequest::from_json_file(path)?;
    let estimator = ConditionRangeEstimator::new(config.range().clone());
    let (vehicle, conditions) = (&request.vehicle, &request.conditions);

    let range_miles = estimator.estimate_range(vehicle, request.battery, conditions)?;
    let mut output = json!({
        "vehicle_id": vehicle.id(),
        "battery": request.battery,
        "condition_multiplier": estimator.condition_multiplier(conditions),
        "range_miles": range_miles,
    });
    if let Some(distance) = request.distance_miles {
        output["distance_miles"] = json!(distance);
        output["required_battery"] =
            json!(estimator.required_battery_for_trip(vehicle, distance, conditions)?);
        output["is_trip_safe"] =
            json!(estimator.is_trip_safe(vehicle, request.battery, distance, conditions)?);
    }
    print_json(&output)
}

#[derive(Debug, Serialize)]
struct SimEvent {
    elapsed_secs: u64,
    leg: usize,
    #[serde(flatten)]
    action: DirectorAction,
}

async fn simulate(
    config: &Config,
    metrics: Arc<Metrics>,
    path: &Path,
    chargers: Option<&Path>,
    speed_mph: f64,
    step_miles: f64,
) -> anyhow::Result<()> {
    anyhow::ensure!(speed_mph > 0.0, "simulation speed must be > 0 mph");
    anyhow::ensure!(step_miles > 0.0, "simulation step must be > 0 miles");

    let request = TripRequest::from_json_file(path)?;
    let catalog = charger_catalog(&request, chargers)?;
    let outcome = planner_for(config, metrics.clone())
        .create_tour(
            request.start,
            &request.pois,
            &request.vehicle,
            request.battery,
            &request.conditions,
            &catalog,
        )
        .await?;
    let mut tour = outcome.tour().clone();
    let safe = outcome.is_safe();
    if safe {
        tour.transition_to(TourStatus::Active)?;
    }

    let (queue, queue_task) = NarrationQueue::spawn(config.queue_command_buffer(), Some(metrics.clone()));
    let director = NarrationDirector::new(queue.clone(), config.narration());
    let generator = TemplateContentGenerator::new(config.narration().words_per_minute);
    let prepared = director.prepare(&tour, &request.pois, &generator, &request.interests).await?;

    let reporter = spawn_metrics_reporter(metrics.clone(), config.metrics_interval_secs());

    // Simulated clock; narrations finish once their duration has elapsed
    let mut elapsed = 0.0f64;
    let mut playing_until: Option<f64> = None;
    let mut events = Vec::new();
    let step_secs = step_miles / speed_mph * 3600.0;

    for (leg, pair) in tour.waypoints().windows(2).enumerate() {
        let (from, to) = (pair[0].location, pair[1].location);
        let leg_miles = tour.segment_miles(leg).unwrap_or(0.0);
        let steps = (leg_miles / step_miles).ceil().max(1.0) as usize;
        for step in 1..=steps {
            elapsed += step_secs;
            if let Some(end) = playing_until {
                if elapsed >= end {
                    finish_current(&queue).await?;
                    playing_until = None;
                }
            }

            let position = interpolate(from, to, step as f64 / steps as f64)?;
            let action = director.on_position(position, speed_mph).await?;
            match &action {
                DirectorAction::Idle | DirectorAction::Waiting { .. } => continue,
                DirectorAction::Started { narration, .. } => {
                    playing_until = Some(elapsed + narration.duration_seconds);
                }
                DirectorAction::Skipped { .. } | DirectorAction::Failed { .. } => {}
            }
            events.push(SimEvent { elapsed_secs: elapsed as u64, leg, action });
        }
        if let Some(dwell) = pair[1].dwell() {
            elapsed += dwell.as_secs_f64();
        }
    }
    finish_current(&queue).await?;
    reporter.abort();
    if safe {
        tour.transition_to(TourStatus::Completed)?;
    }

    let narrations = queue.snapshot().await?;
    drop(director);
    drop(queue);
    queue_task.await.context("narration queue worker panicked")?;

    print_json(&json!({
        "safe": safe,
        "tour": tour,
        "prepared": prepared,
        "events": events,
        "narrations": narrations,
    }))
}

async fn finish_current(queue: &NarrationQueue) -> anyhow::Result<()> {
    if let Some(current) = queue.current().await? {
        queue.update_status(current.id, NarrationStatus::Completed).await?;
    }
    Ok(())
}

/// Straight-line interpolation; adequate for the short steps the simulator takes
fn interpolate(a: Coordinate, b: Coordinate, t: f64) -> anyhow::Result<Coordinate> {
    let lat = a.latitude() + (b.latitude() - a.latitude()) * t;
    let lon = a.longitude() + (b.longitude() - a.longitude()) * t;
    Ok(Coordinate::new(lat, lon)?)
}

fn spawn_metrics_reporter(metrics: Arc<Metrics>, interval_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics.report().log();
        }
    })
}
