//! SnmpSim - SNMP device fleet simulator
//!
//! Simulates large fleets of SNMP-manageable network devices (cable
//! modems, CMTSes, switches, routers, servers) by serving SNMPv1/v2c
//! GET / GETNEXT / GETBULK over UDP on per-device ports, with MIB values
//! that evolve realistically over time.

pub mod config;
pub mod core;
pub mod device;
pub mod error;
pub mod mib;
pub mod sim;
pub mod snmp;
pub mod utils;

pub use error::{Error, Result};

/// Simulator version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
