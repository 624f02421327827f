//! Per-device agent state and request operations
//!
//! One agent per simulated device. The state mutex serializes operations,
//! so at most one request is in flight per device; the pool's eviction
//! scan uses `try_lock` to avoid touching a busy agent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Mutex;

use crate::config::DeviceType;
use crate::mib::{DeviceProfile, EndOfMib};
use crate::sim::clock::Clock;
use crate::sim::correlation::{CorrelationEngine, MetricName};
use crate::sim::patterns;
use crate::sim::value::{device_seed, SimContext, ValueSimulator};
use crate::snmp::oid::Oid;
use crate::snmp::{SnmpValue, VarBind};

/// Administrative snapshot of one device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub device_id: String,
    pub device_type: DeviceType,
    pub port: u16,
    pub community: String,
    pub uptime: Duration,
    pub oid_count: usize,
}

#[derive(Debug)]
struct DeviceState {
    boot_time: DateTime<Utc>,
    last_access: DateTime<Utc>,
    metrics: HashMap<MetricName, f64>,
    rng: StdRng,
}

#[derive(Debug)]
pub struct DeviceAgent {
    device_id: String,
    device_type: DeviceType,
    port: u16,
    community: String,
    seed: u64,
    profile: Arc<DeviceProfile>,
    simulator: Arc<ValueSimulator>,
    correlations: Arc<CorrelationEngine>,
    clock: Arc<dyn Clock>,
    state: Mutex<DeviceState>,
    dead: AtomicBool,
}

impl DeviceAgent {
    pub fn new(
        device_type: DeviceType,
        port: u16,
        community: String,
        profile: Arc<DeviceProfile>,
        simulator: Arc<ValueSimulator>,
        correlations: Arc<CorrelationEngine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let device_id = format!("{device_type}-{port}");
        let seed = device_seed(&device_id);
        let now = clock.now();
        Self {
            device_id,
            device_type,
            port,
            community,
            seed,
            profile,
            simulator,
            correlations,
            clock,
            state: Mutex::new(DeviceState {
                boot_time: now,
                last_access: now,
                metrics: HashMap::new(),
                rng: StdRng::seed_from_u64(seed),
            }),
            dead: AtomicBool::new(false),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_type(&self) -> &DeviceType {
        &self.device_type
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn community_matches(&self, community: &[u8]) -> bool {
        self.community.as_bytes() == community
    }

    /// Marks the agent unusable after a crashed request handler. The pool
    /// replaces dead agents on the next access.
    pub fn mark_dead(&self) {
        self.dead.store(true, Ordering::Release);
    }

    pub fn is_dead(&self) -> bool {
        self.dead.load(Ordering::Acquire)
    }

    /// Last access time, or `None` while a request is in flight.
    pub fn try_idle_since(&self) -> Option<DateTime<Utc>> {
        self.state.try_lock().ok().map(|state| state.last_access)
    }

    /// GET: exact lookup; unknown OIDs come back as `NoSuchObject` and the
    /// pipeline converts for v1.
    pub async fn get(&self, oid: &Oid) -> VarBind {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        self.touch(&mut state, now);
        match self.profile.get(oid) {
            Some(entry) => VarBind::new(oid.clone(), self.simulate(entry, &state, now)),
            None => VarBind::new(oid.clone(), SnmpValue::NoSuchObject),
        }
    }

    /// GETNEXT: strictly-next entry, or `EndOfMibView` at the end of the
    /// MIB.
    pub async fn get_next(&self, oid: &Oid) -> VarBind {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        self.touch(&mut state, now);
        match self.profile.get_next(oid) {
            Ok(entry) => VarBind::new(entry.oid.clone(), self.simulate(entry, &state, now)),
            Err(EndOfMib) => VarBind::new(oid.clone(), SnmpValue::EndOfMibView),
        }
    }

    /// GETBULK repeater slice: up to `max_repetitions` entries after
    /// `start`, simulated.
    pub async fn get_bulk_slice(&self, start: &Oid, max_repetitions: usize) -> Vec<VarBind> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        self.touch(&mut state, now);
        self.profile
            .get_bulk(start, max_repetitions)
            .iter()
            .map(|entry| VarBind::new(entry.oid.clone(), self.simulate(entry, &state, now)))
            .collect()
    }

    pub async fn info(&self) -> DeviceInfo {
        let state = self.state.lock().await;
        DeviceInfo {
            device_id: self.device_id.clone(),
            device_type: self.device_type.clone(),
            port: self.port,
            community: self.community.clone(),
            uptime: self.clock.now() - state.boot_time,
            oid_count: self.profile.len(),
        }
    }

    /// Resets the boot instant and clears accumulated metrics.
    pub async fn reboot(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        state.boot_time = now;
        state.last_access = now;
        state.metrics.clear();
    }

    fn touch(&self, state: &mut DeviceState, now: DateTime<Utc>) {
        state.last_access = now;
        self.refresh_metrics(state, now);
    }

    /// Drives the ambient metrics that feed correlations: temperature
    /// follows the season, interface utilization follows the traffic
    /// curve; the correlation rules fan both out to their targets.
    fn refresh_metrics(&self, state: &mut DeviceState, now: DateTime<Utc>) {
        let temperature = 22.0 + patterns::seasonal_temperature_offset(now);
        let utilization = (40.0
            * patterns::daily_factor(now)
            * patterns::weekly_factor(now, &self.device_type))
        .clamp(0.0, 100.0);

        let DeviceState { metrics, rng, .. } = state;
        self.correlations
            .apply(MetricName::Temperature, temperature, metrics, rng);
        self.correlations
            .apply(MetricName::InterfaceUtilization, utilization, metrics, rng);
    }

    fn simulate(&self, entry: &crate::mib::MibEntry, state: &DeviceState, now: DateTime<Utc>) -> SnmpValue {
        let ctx = SimContext {
            device_type: &self.device_type,
            device_seed: self.seed,
            boot_time: state.boot_time,
            metrics: &state.metrics,
        };
        self.simulator.simulate(entry, &ctx, now)
    }
}
