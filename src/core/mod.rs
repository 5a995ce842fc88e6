//! Core types and constants for the flight-data subsystem

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
