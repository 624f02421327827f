//! Device layer: per-device agents, the lazy pool, and UDP listeners

pub mod agent;
pub mod listener;
pub mod pool;

pub use agent::{DeviceAgent, DeviceInfo};
pub use listener::PortListener;
pub use pool::{DevicePool, PoolStats};
