//! IO modules - collaborator interfaces and file inputs
//!
//! This module contains the crate's edges:
//! - `poi_lookup` - POI search trait and the in-memory catalogue
//! - `content` - Narration content generation trait and template generator
//! - `trip_request` - JSON trip requests for the command-line tool

pub mod content;
pub mod poi_lookup;
pub mod trip_request;

// Re-export commonly used types
pub use content::{ContentError, ContentGenerator, TemplateContentGenerator};
pub use poi_lookup::{PoiCatalog, PoiLookup};
pub use trip_request::TripRequest;
