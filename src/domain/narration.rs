//! Narration data model and its playback lifecycle

use crate::domain::types::PoiId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Newtype wrapper for narration IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct NarrationId(pub Uuid);

impl NarrationId {
    pub fn new() -> Self {
        NarrationId(Uuid::now_v7())
    }
}

impl Default for NarrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NarrationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Narration lifecycle
///
/// `Queued → Playing → {Completed | Skipped | Cancelled | Failed}`. A queued
/// narration may also be skipped, cancelled or failed without ever playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrationStatus {
    Queued,
    Playing,
    Completed,
    Skipped,
    Cancelled,
    Failed,
}

impl NarrationStatus {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            NarrationStatus::Queued => "queued",
            NarrationStatus::Playing => "playing",
            NarrationStatus::Completed => "completed",
            NarrationStatus::Skipped => "skipped",
            NarrationStatus::Cancelled => "cancelled",
            NarrationStatus::Failed => "failed",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, NarrationStatus::Queued | NarrationStatus::Playing)
    }

    /// Whether `self → next` is a legal lifecycle step
    pub fn can_transition_to(&self, next: NarrationStatus) -> bool {
        match self {
            NarrationStatus::Queued => next != NarrationStatus::Queued,
            NarrationStatus::Playing => next.is_terminal(),
            _ => false,
        }
    }
}

/// Spoken content about one POI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narration {
    pub id: NarrationId,
    pub poi_id: PoiId,
    pub poi_name: String,
    pub title: String,
    pub content: String,
    /// Target spoken duration in seconds
    pub duration_seconds: f64,
    pub status: NarrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl Narration {
    pub fn new(
        poi_id: PoiId,
        poi_name: &str,
        title: &str,
        content: &str,
        duration_seconds: f64,
    ) -> Self {
        Self {
            id: NarrationId::new(),
            poi_id,
            poi_name: poi_name.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            duration_seconds,
            status: NarrationStatus::Queued,
            started_at: None,
            completed_at: None,
            failure_reason: None,
        }
    }

    /// Placeholder for a POI whose content could not be produced; the queue stores it as failed
    pub fn failed(poi_id: PoiId, poi_name: &str, reason: &str) -> Self {
        let mut narration = Self::new(poi_id, poi_name, poi_name, "", 0.0);
        narration.failure_reason = Some(reason.to_string());
        narration
    }

    /// Apply a status change and stamp timestamps. Caller validates legality.
    pub(crate) fn apply_status(&mut self, status: NarrationStatus, now: DateTime<Utc>) {
        if status == NarrationStatus::Playing && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        self.status = status;
    }
}

/// Result of a trigger-timing calculation. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NarrationTiming {
    /// Distance from the POI at which to start the narration
    pub trigger_distance_miles: f64,
    /// Seconds from now until the trigger distance is reached
    pub time_to_trigger_seconds: f64,
    /// Miles driven while the narration plays
    pub narration_travel_distance_miles: f64,
    /// Seconds between narration end and arrival if started now
    pub arrival_lead_seconds: f64,
    pub is_valid: bool,
}
