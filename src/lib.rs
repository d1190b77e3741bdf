//! EV tour core library
//!
//! Range estimation, tour planning with charging stops, and narration
//! scheduling. Exposes modules for integration testing and binary reuse.

pub mod domain;
pub mod infra;
pub mod io;
pub mod services;
