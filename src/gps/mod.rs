//! GPS acquisition: transport bytes in, validated fixes out

pub mod module;

pub use module::{decode_chunk, DecodeError, GpsModule, GpsModuleHandle, GpsModuleSettings, GpsStopHandle};
