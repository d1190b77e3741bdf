//! Lock-free metrics collection and periodic reporting
//!
//! Counters are plain atomics so the planner and the narration queue worker
//! can record without contention. `report()` swaps the interval counters and
//! leaves the lifetime totals in place.
//!
//! NOTE: All atomics use Relaxed ordering intentionally. These are statistical
//! counters only and must not be used for coordination.

use crate::domain::narration::NarrationStatus;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

pub struct Metrics {
    // Lifetime totals
    tours_planned: AtomicU64,
    tours_unsafe: AtomicU64,
    chargers_inserted: AtomicU64,
    poi_lookups: AtomicU64,
    narrations_enqueued: AtomicU64,
    narrations_started: AtomicU64,
    narrations_completed: AtomicU64,
    narrations_skipped: AtomicU64,
    narrations_cancelled: AtomicU64,
    narrations_failed: AtomicU64,
    // Per-interval planning latency, reset on report
    plan_latency_sum_us: AtomicU64,
    plan_latency_count: AtomicU64,
    plan_latency_max_us: AtomicU64,
    last_report_time: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            tours_planned: AtomicU64::new(0),
            tours_unsafe: AtomicU64::new(0),
            chargers_inserted: AtomicU64::new(0),
            poi_lookups: AtomicU64::new(0),
            narrations_enqueued: AtomicU64::new(0),
            narrations_started: AtomicU64::new(0),
            narrations_completed: AtomicU64::new(0),
            narrations_skipped: AtomicU64::new(0),
            narrations_cancelled: AtomicU64::new(0),
            narrations_failed: AtomicU64::new(0),
            plan_latency_sum_us: AtomicU64::new(0),
            plan_latency_count: AtomicU64::new(0),
            plan_latency_max_us: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    /// Record a finished planning call
    #[inline]
    pub fn record_plan(&self, safe: bool, chargers_added: usize, latency_us: u64) {
        if safe {
            self.tours_planned.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tours_unsafe.fetch_add(1, Ordering::Relaxed);
        }
        self.chargers_inserted.fetch_add(chargers_added as u64, Ordering::Relaxed);
        self.plan_latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.plan_latency_count.fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.plan_latency_max_us, latency_us);
    }

    #[inline]
    pub fn record_poi_lookup(&self) {
        self.poi_lookups.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_enqueued(&self, count: usize) {
        self.narrations_enqueued.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Count a narration entering `status`
    #[inline]
    pub fn record_narration_status(&self, status: NarrationStatus) {
        let counter = match status {
            NarrationStatus::Queued => return,
            NarrationStatus::Playing => &self.narrations_started,
            NarrationStatus::Completed => &self.narrations_completed,
            NarrationStatus::Skipped => &self.narrations_skipped,
            NarrationStatus::Cancelled => &self.narrations_cancelled,
            NarrationStatus::Failed => &self.narrations_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot, resetting the per-interval latency figures
    pub fn report(&self) -> MetricsSummary {
        let now = Instant::now();
        let interval_secs = {
            let mut last = self.last_report_time.lock();
            let elapsed = now.duration_since(*last).as_secs_f64();
            *last = now;
            elapsed
        };

        let latency_sum = self.plan_latency_sum_us.swap(0, Ordering::Relaxed);
        let latency_count = self.plan_latency_count.swap(0, Ordering::Relaxed);
        let latency_max = self.plan_latency_max_us.swap(0, Ordering::Relaxed);

        MetricsSummary {
            interval_secs,
            tours_planned: self.tours_planned.load(Ordering::Relaxed),
            tours_unsafe: self.tours_unsafe.load(Ordering::Relaxed),
            chargers_inserted: self.chargers_inserted.load(Ordering::Relaxed),
            poi_lookups: self.poi_lookups.load(Ordering::Relaxed),
            narrations_enqueued: self.narrations_enqueued.load(Ordering::Relaxed),
            narrations_started: self.narrations_started.load(Ordering::Relaxed),
            narrations_completed: self.narrations_completed.load(Ordering::Relaxed),
            narrations_skipped: self.narrations_skipped.load(Ordering::Relaxed),
            narrations_cancelled: self.narrations_cancelled.load(Ordering::Relaxed),
            narrations_failed: self.narrations_failed.load(Ordering::Relaxed),
            plans_in_interval: latency_count,
            avg_plan_latency_us: if latency_count > 0 { latency_sum / latency_count } else { 0 },
            max_plan_latency_us: latency_max,
        }
    }
}

/// Point-in-time metrics snapshot
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub interval_secs: f64,
    pub tours_planned: u64,
    pub tours_unsafe: u64,
    pub chargers_inserted: u64,
    pub poi_lookups: u64,
    pub narrations_enqueued: u64,
    pub narrations_started: u64,
    pub narrations_completed: u64,
    pub narrations_skipped: u64,
    pub narrations_cancelled: u64,
    pub narrations_failed: u64,
    pub plans_in_interval: u64,
    pub avg_plan_latency_us: u64,
    pub max_plan_latency_us: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            interval_secs = %format!("{:.1}", self.interval_secs),
            tours_planned = %self.tours_planned,
            tours_unsafe = %self.tours_unsafe,
            chargers_inserted = %self.chargers_inserted,
            poi_lookups = %self.poi_lookups,
            narrations_enqueued = %self.narrations_enqueued,
            narrations_started = %self.narrations_started,
            narrations_completed = %self.narrations_completed,
            narrations_skipped = %self.narrations_skipped,
            narrations_cancelled = %self.narrations_cancelled,
            narrations_failed = %self.narrations_failed,
            plans_in_interval = %self.plans_in_interval,
            avg_plan_latency_us = %self.avg_plan_latency_us,
            max_plan_latency_us = %self.max_plan_latency_us,
            "metrics"
        );
    }
}
