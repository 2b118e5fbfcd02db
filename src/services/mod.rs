//! Services Layer
//!
//! Operations spanning several tables, kept out of the HTTP handlers so
//! tests and the seeder can call them directly.

pub mod borrowing_service;
pub mod statistics_service;

pub use statistics_service::load_snapshot;
