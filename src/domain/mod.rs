//! Domain models - core value types and the tour/narration model
//!
//! This module contains the canonical data types used throughout the crate:
//! - `Vehicle` - immutable EV description (capacity, range, ports)
//! - `DrivingConditions` - environmental inputs to range estimation
//! - `Poi` - point of interest, including charging stations
//! - `Tour` / `Waypoint` - an ordered trip with contiguous sequence numbers
//! - `Narration` / `NarrationTiming` - spoken content and its trigger timing
//! - `geo` - great-circle distance and bearing

pub mod geo;
pub mod narration;
pub mod tour;
pub mod types;

// Re-export commonly used types at module level
pub use narration::{Narration, NarrationId, NarrationStatus, NarrationTiming};
pub use tour::{Tour, TourId, TourStatus, Waypoint};
pub use types::{
    ChargerInfo, ChargingPort, Coordinate, DomainError, DrivingConditions, Poi, PoiCategory,
    PoiId, Vehicle,
};
