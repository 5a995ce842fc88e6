//! Shared subsystem state and GPS history

pub mod manager;

pub use manager::StateManager;
