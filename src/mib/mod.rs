//! MIB layer: profile store, walk-file loader, built-in profiles

pub mod builder;
pub mod profile;
pub mod walk;

pub use profile::{
    Behavior, DeviceProfile, EndOfMib, LoadPattern, MibEntry, ProfileStore, Variance,
};
