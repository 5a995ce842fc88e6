//! GPS data validation: physical ranges, receiver quality and continuity

pub mod data;
pub mod error;

pub use data::{haversine_distance, DataValidator, ValidationConfig};
pub use error::ValidationError;
