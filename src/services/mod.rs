//! Services - planning and narration logic
//!
//! This module contains the core business logic services:
//! - `range_estimator` - Battery-to-distance conversion under driving conditions
//! - `route_optimizer` - Nearest-neighbour POI ordering
//! - `tour_planner` - Tour assembly with charging-stop insertion
//! - `narration_timing` - Narration trigger-point calculation
//! - `narration_queue` - Single-owner narration playback queue
//! - `narration_director` - Feeds tours and position updates into the queue

pub mod narration_director;
pub mod narration_queue;
pub mod narration_timing;
pub mod range_estimator;
pub mod route_optimizer;
pub mod tour_planner;

// Re-export commonly used types
pub use narration_director::{DirectorAction, DirectorError, NarrationDirector, PreparedNarrations};
pub use narration_queue::{create_narration_queue, NarrationQueue, NarrationQueueWorker, QueueError};
pub use narration_timing::{NarrationTimingCalculator, TimingError};
pub use range_estimator::{ConditionRangeEstimator, RangeError, RangeEstimator};
pub use route_optimizer::{optimize_route, route_length_miles};
pub use tour_planner::{PlanOutcome, PlannerError, TourPlan, TourPlanner, UnsafeTrip};
