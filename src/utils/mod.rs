//! Utility modules for the simulator

pub mod logger;

pub use logger::setup_logging;
