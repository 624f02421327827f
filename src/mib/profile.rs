//! MIB profile store: per-device-type sorted OID maps
//!
//! Profiles are immutable after load and shared between agents through an
//! `Arc`, so GETNEXT/GETBULK walks never take a lock.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::config::DeviceType;
use crate::snmp::oid::Oid;
use crate::snmp::SnmpValue;
use crate::{Error, Result};

/// Rate variance applied to simulated counters.
#[derive(Debug, Clone, PartialEq)]
pub enum Variance {
    Uniform,
    Gaussian { sigma: f64 },
    /// Stable per device, derived from the device seed.
    DeviceSpecific,
}

/// Curve shape for utilization gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPattern {
    /// Time-of-day factors apply unchanged.
    Diurnal,
    /// Flattened curve for always-busy links.
    Flat,
}

/// How a stored base value evolves over time.
#[derive(Debug, Clone, PartialEq)]
pub enum Behavior {
    Static,
    UptimeTicks,
    TrafficCounter {
        rate_range: (u64, u64),
        variance: Variance,
        burst_probability: f64,
    },
    UtilizationGauge {
        range: (u32, u32),
        pattern: LoadPattern,
    },
    SignalGauge {
        range: (i32, i32),
        weather_sensitive: bool,
    },
    ErrorCounter {
        rate_range: (u64, u64),
    },
    StatusEnum {
        /// `(value, weight)` pairs; weights need not sum to 1.
        states: Vec<(i32, f64)>,
    },
    CpuGauge,
}

/// One loaded MIB object: base value plus its simulation behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct MibEntry {
    pub oid: Oid,
    pub value: SnmpValue,
    pub behavior: Behavior,
}

impl MibEntry {
    pub fn new(oid: Oid, value: SnmpValue, behavior: Behavior) -> Self {
        Self {
            oid,
            value,
            behavior,
        }
    }

    /// Checks that the stored type and behavior agree. Exception variants
    /// and Null are response-only and never stored.
    fn validate(&self) -> Result<()> {
        if self.value.is_exception() || self.value == SnmpValue::Null {
            return Err(Error::parse(format!(
                "{}: {} is not storable in a profile",
                self.oid,
                self.value.type_name()
            )));
        }
        let consistent = match &self.behavior {
            Behavior::Static => true,
            Behavior::UptimeTicks => matches!(self.value, SnmpValue::TimeTicks(_)),
            Behavior::TrafficCounter { .. } | Behavior::ErrorCounter { .. } => matches!(
                self.value,
                SnmpValue::Counter32(_) | SnmpValue::Counter64(_)
            ),
            Behavior::UtilizationGauge { .. } | Behavior::CpuGauge => {
                matches!(self.value, SnmpValue::Gauge32(_))
            }
            Behavior::SignalGauge { .. } => {
                matches!(self.value, SnmpValue::Integer(_) | SnmpValue::Gauge32(_))
            }
            Behavior::StatusEnum { .. } => matches!(self.value, SnmpValue::Integer(_)),
        };
        if !consistent {
            return Err(Error::parse(format!(
                "{}: behavior {:?} does not fit value type {}",
                self.oid,
                self.behavior,
                self.value.type_name()
            )));
        }
        Ok(())
    }
}

/// End-of-MIB marker returned by `get_next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndOfMib;

/// An immutable, lexicographically sorted MIB for one device type.
#[derive(Debug)]
pub struct DeviceProfile {
    device_type: DeviceType,
    entries: Vec<MibEntry>,
}

impl DeviceProfile {
    /// Builds a profile from loader records. Entries are sorted, later
    /// duplicates shadow earlier ones, and inconsistent entries are
    /// rejected.
    pub fn from_records(device_type: DeviceType, records: Vec<MibEntry>) -> Result<Self> {
        let mut by_oid: HashMap<Oid, MibEntry> = HashMap::with_capacity(records.len());
        for entry in records {
            entry.validate()?;
            by_oid.insert(entry.oid.clone(), entry);
        }
        let mut entries: Vec<MibEntry> = by_oid.into_values().collect();
        entries.sort_by(|a, b| a.oid.cmp(&b.oid));
        Ok(Self {
            device_type,
            entries,
        })
    }

    pub fn device_type(&self) -> &DeviceType {
        &self.device_type
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MibEntry] {
        &self.entries
    }

    pub fn first_oid(&self) -> Option<&Oid> {
        self.entries.first().map(|e| &e.oid)
    }

    pub fn last_oid(&self) -> Option<&Oid> {
        self.entries.last().map(|e| &e.oid)
    }

    /// Exact-match lookup.
    pub fn get(&self, oid: &Oid) -> Option<&MibEntry> {
        self.entries
            .binary_search_by(|entry| entry.oid.cmp(oid))
            .ok()
            .map(|idx| &self.entries[idx])
    }

    /// First entry strictly greater than `oid`. Never returns `oid` itself.
    pub fn get_next(&self, oid: &Oid) -> std::result::Result<&MibEntry, EndOfMib> {
        let idx = self.entries.partition_point(|entry| entry.oid <= *oid);
        self.entries.get(idx).ok_or(EndOfMib)
    }

    /// Up to `max_repetitions` entries strictly greater than `start_oid`,
    /// in lexicographic order. `start_oid` never appears in the result.
    pub fn get_bulk(&self, start_oid: &Oid, max_repetitions: usize) -> &[MibEntry] {
        let start = self.entries.partition_point(|entry| entry.oid <= *start_oid);
        let end = (start + max_repetitions).min(self.entries.len());
        &self.entries[start..end]
    }
}

/// Shared, read-mostly registry of profiles keyed by device type.
///
/// Loading replaces a device type's profile atomically; agents created
/// before a reload keep the `Arc` they were constructed with.
#[derive(Debug, Default)]
pub struct ProfileStore {
    profiles: RwLock<HashMap<DeviceType, Arc<DeviceProfile>>>,
}

impl ProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn install(&self, profile: DeviceProfile) {
        let device_type = profile.device_type().clone();
        let oid_count = profile.len();
        let mut profiles = self.profiles.write().await;
        profiles.insert(device_type.clone(), Arc::new(profile));
        info!(%device_type, oid_count, "installed MIB profile");
    }

    pub async fn get(&self, device_type: &DeviceType) -> Result<Arc<DeviceProfile>> {
        let profiles = self.profiles.read().await;
        profiles
            .get(device_type)
            .cloned()
            .ok_or_else(|| Error::ProfileNotLoaded(device_type.to_string()))
    }

    pub async fn contains(&self, device_type: &DeviceType) -> bool {
        self.profiles.read().await.contains_key(device_type)
    }

    pub async fn loaded_types(&self) -> Vec<DeviceType> {
        self.profiles.read().await.keys().cloned().collect()
    }
}
