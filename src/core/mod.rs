//! Core orchestration for the simulator

pub mod simulator;

pub use simulator::{Simulator, SimulatorEvent, SimulatorStatus};
