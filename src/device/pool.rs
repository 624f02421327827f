//! Lazy device pool: port → agent registry with bounded capacity
//!
//! Agent state is created on the first datagram to a port and reclaimed by
//! the idle sweep. The UDP socket for a port outlives its agent, so an
//! evicted device transparently reappears with a fresh boot time.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{DeviceType, PoolConfig, PortAssignment};
use crate::core::simulator::SimulatorEvent;
use crate::device::agent::DeviceAgent;
use crate::mib::ProfileStore;
use crate::sim::clock::Clock;
use crate::sim::correlation::CorrelationEngine;
use crate::sim::value::ValueSimulator;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    pub active: usize,
    pub peak: usize,
    pub created: u64,
    pub cleaned_up: u64,
}

#[derive(Debug, Default)]
struct Counters {
    peak: usize,
    created: u64,
    cleaned_up: u64,
}

pub struct DevicePool {
    config: PoolConfig,
    assignments: Vec<PortAssignment>,
    community: String,
    profiles: Arc<ProfileStore>,
    simulator: Arc<ValueSimulator>,
    correlations: Arc<CorrelationEngine>,
    clock: Arc<dyn Clock>,
    registry: DashMap<u16, Arc<DeviceAgent>>,
    counters: Mutex<Counters>,
    event_tx: mpsc::UnboundedSender<SimulatorEvent>,
}

impl DevicePool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PoolConfig,
        assignments: Vec<PortAssignment>,
        community: String,
        profiles: Arc<ProfileStore>,
        simulator: Arc<ValueSimulator>,
        correlations: Arc<CorrelationEngine>,
        clock: Arc<dyn Clock>,
        event_tx: mpsc::UnboundedSender<SimulatorEvent>,
    ) -> Self {
        Self {
            config,
            assignments,
            community,
            profiles,
            simulator,
            correlations,
            clock,
            registry: DashMap::new(),
            counters: Mutex::new(Counters::default()),
            event_tx,
        }
    }

    pub fn device_type_for(&self, port: u16) -> Option<&DeviceType> {
        self.assignments
            .iter()
            .find(|a| a.range.contains(port))
            .map(|a| &a.device_type)
    }

    pub fn assignments(&self) -> &[PortAssignment] {
        &self.assignments
    }

    pub fn community(&self) -> &str {
        &self.community
    }

    /// Returns the agent for `port`, creating it on first access. Dead
    /// agents are replaced with a fresh boot time.
    pub async fn get_or_create(&self, port: u16) -> Result<Arc<DeviceAgent>> {
        if let Some(existing) = self.registry.get(&port) {
            if existing.is_dead() {
                drop(existing);
                self.remove(port, "crashed agent replaced");
            } else {
                return Ok(existing.clone());
            }
        }

        let device_type = self
            .device_type_for(port)
            .ok_or(Error::UnknownPortRange(port))?
            .clone();

        if self.registry.len() >= self.config.max_devices && !self.evict_lru_idle() {
            return Err(Error::PoolAtCapacity(self.config.max_devices));
        }

        let profile = self.profiles.get(&device_type).await?;
        let agent = Arc::new(DeviceAgent::new(
            device_type.clone(),
            port,
            self.community.clone(),
            profile,
            self.simulator.clone(),
            self.correlations.clone(),
            self.clock.clone(),
        ));

        // a concurrent creator may have won the race; keep whichever agent
        // landed in the registry
        let agent = match self.registry.entry(port) {
            dashmap::mapref::entry::Entry::Occupied(entry) => entry.get().clone(),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(agent.clone());
                {
                    let mut counters = self.counters.lock().expect("pool counters poisoned");
                    counters.created += 1;
                    counters.peak = counters.peak.max(self.registry.len());
                }
                debug!(port, %device_type, "created device agent");
                let _ = self.event_tx.send(SimulatorEvent::DeviceCreated {
                    port,
                    device_type: device_type.clone(),
                });
                agent
            }
        };
        Ok(agent)
    }

    /// Evicts the least-recently-used idle agent. Agents currently handling
    /// a request are never evicted.
    fn evict_lru_idle(&self) -> bool {
        let mut oldest: Option<(u16, DateTime<Utc>)> = None;
        for entry in self.registry.iter() {
            if let Some(idle_since) = entry.value().try_idle_since() {
                if oldest.map_or(true, |(_, t)| idle_since < t) {
                    oldest = Some((*entry.key(), idle_since));
                }
            }
        }
        match oldest {
            Some((port, _)) => {
                self.remove(port, "evicted for capacity");
                let _ = self.event_tx.send(SimulatorEvent::DeviceEvicted { port });
                true
            }
            None => false,
        }
    }

    /// Marks the agent on `port` dead and removes it; the next access
    /// rebuilds it.
    pub fn mark_dead(&self, port: u16) {
        if let Some((_, agent)) = self.registry.remove(&port) {
            agent.mark_dead();
            let mut counters = self.counters.lock().expect("pool counters poisoned");
            counters.cleaned_up += 1;
            warn!(port, "device agent crashed; removed from pool");
            let _ = self.event_tx.send(SimulatorEvent::DeviceCrashed { port });
        }
    }

    pub fn shutdown(&self, port: u16) {
        self.remove(port, "shutdown");
    }

    pub fn shutdown_all(&self) {
        let ports: Vec<u16> = self.registry.iter().map(|e| *e.key()).collect();
        for port in ports {
            self.remove(port, "shutdown");
        }
        info!("device pool shut down");
    }

    fn remove(&self, port: u16, reason: &str) {
        if self.registry.remove(&port).is_some() {
            let mut counters = self.counters.lock().expect("pool counters poisoned");
            counters.cleaned_up += 1;
            debug!(port, reason, "removed device agent");
        }
    }

    pub fn stats(&self) -> PoolStats {
        let counters = self.counters.lock().expect("pool counters poisoned");
        PoolStats {
            active: self.registry.len(),
            peak: counters.peak,
            created: counters.created,
            cleaned_up: counters.cleaned_up,
        }
    }

    /// Removes agents idle past the configured timeout. Busy agents are
    /// skipped and picked up on a later cycle.
    pub fn sweep_idle(&self) {
        let now = self.clock.now();
        let timeout = chrono::Duration::seconds(self.config.idle_timeout_secs as i64);
        let expired: Vec<u16> = self
            .registry
            .iter()
            .filter_map(|entry| {
                let idle_since = entry.value().try_idle_since()?;
                (now - idle_since > timeout).then(|| *entry.key())
            })
            .collect();
        for port in expired {
            self.remove(port, "idle timeout");
            let _ = self.event_tx.send(SimulatorEvent::DeviceEvicted { port });
        }
    }

    /// Runs the periodic idle sweep until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(pool.config.sweep_interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => pool.sweep_idle(),
                }
            }
            debug!("idle sweeper stopped");
        })
    }
}

impl std::fmt::Debug for DevicePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DevicePool")
            .field("active", &self.registry.len())
            .field("max_devices", &self.config.max_devices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CorrelationConfig, PortRange};
    use crate::mib::builder::builtin_profile;
    use crate::sim::clock::ManualClock;
    use crate::snmp::SnmpValue;
    use chrono::TimeZone;

    async fn test_pool(max_devices: usize) -> (Arc<ManualClock>, Arc<DevicePool>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 5, 9, 0, 0).unwrap(),
        ));
        let profiles = Arc::new(ProfileStore::new());
        profiles
            .install(builtin_profile(&DeviceType::CableModem).unwrap())
            .await;
        profiles
            .install(builtin_profile(&DeviceType::Switch).unwrap())
            .await;

        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(DevicePool::new(
            PoolConfig {
                max_devices,
                idle_timeout_secs: 300,
                sweep_interval_secs: 1,
            },
            vec![
                PortAssignment {
                    device_type: DeviceType::CableModem,
                    range: PortRange::new(30_000, 30_099),
                },
                PortAssignment {
                    device_type: DeviceType::Switch,
                    range: PortRange::new(30_100, 30_149),
                },
            ],
            "public".to_string(),
            profiles,
            Arc::new(ValueSimulator::new()),
            Arc::new(CorrelationEngine::from_config(&CorrelationConfig::default()).unwrap()),
            clock.clone(),
            event_tx,
        ));
        (clock, pool)
    }

    #[tokio::test]
    async fn test_create_and_reuse_agent() {
        let (_clock, pool) = test_pool(100).await;
        let first = pool.get_or_create(30_005).await.unwrap();
        assert_eq!(first.device_type(), &DeviceType::CableModem);
        assert_eq!(first.port(), 30_005);

        let second = pool.get_or_create(30_005).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let stats = pool.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.created, 1);
    }

    #[tokio::test]
    async fn test_port_type_routing() {
        let (_clock, pool) = test_pool(100).await;
        let cm = pool.get_or_create(30_099).await.unwrap();
        let sw = pool.get_or_create(30_100).await.unwrap();
        assert_eq!(cm.device_type(), &DeviceType::CableModem);
        assert_eq!(sw.device_type(), &DeviceType::Switch);
    }

    #[tokio::test]
    async fn test_unknown_port_range() {
        let (_clock, pool) = test_pool(100).await;
        let err = pool.get_or_create(40_000).await.unwrap_err();
        assert!(matches!(err, Error::UnknownPortRange(40_000)));
    }

    #[tokio::test]
    async fn test_profile_not_loaded() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 5, 9, 0, 0).unwrap(),
        ));
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let pool = DevicePool::new(
            PoolConfig::default(),
            vec![PortAssignment {
                device_type: DeviceType::Router,
                range: PortRange::new(31_000, 31_009),
            }],
            "public".to_string(),
            Arc::new(ProfileStore::new()),
            Arc::new(ValueSimulator::new()),
            Arc::new(CorrelationEngine::default()),
            clock,
            event_tx,
        );
        let err = pool.get_or_create(31_000).await.unwrap_err();
        assert!(matches!(err, Error::ProfileNotLoaded(_)));
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recently_used() {
        let (clock, pool) = test_pool(2).await;

        let a = pool.get_or_create(30_001).await.unwrap();
        clock.advance(chrono::Duration::seconds(10));
        let b = pool.get_or_create(30_002).await.unwrap();

        // touch the first so the second becomes LRU
        clock.advance(chrono::Duration::seconds(10));
        let _ = a.get(&"1.3.6.1.2.1.1.1.0".parse().unwrap()).await;
        drop(a);
        drop(b);

        clock.advance(chrono::Duration::seconds(10));
        let _c = pool.get_or_create(30_003).await.unwrap();

        let stats = pool.stats();
        assert_eq!(stats.active, 2);
        assert!(pool.registry.contains_key(&30_001));
        assert!(!pool.registry.contains_key(&30_002));
        assert!(pool.registry.contains_key(&30_003));
    }

    #[tokio::test]
    async fn test_dead_agent_replaced_with_fresh_boot() {
        let (clock, pool) = test_pool(100).await;
        let agent = pool.get_or_create(30_010).await.unwrap();

        clock.advance(chrono::Duration::hours(1));
        let SnmpValue::TimeTicks(uptime) = agent
            .get(&"1.3.6.1.2.1.1.3.0".parse().unwrap())
            .await
            .value
        else {
            panic!()
        };
        assert!(uptime > 0);

        pool.mark_dead(30_010);
        assert!(agent.is_dead());

        let replacement = pool.get_or_create(30_010).await.unwrap();
        assert!(!Arc::ptr_eq(&agent, &replacement));
        let SnmpValue::TimeTicks(uptime) = replacement
            .get(&"1.3.6.1.2.1.1.3.0".parse().unwrap())
            .await
            .value
        else {
            panic!()
        };
        assert_eq!(uptime, 0);
    }

    #[tokio::test]
    async fn test_shutdown_and_stats() {
        let (_clock, pool) = test_pool(100).await;
        for port in 30_000..30_010 {
            pool.get_or_create(port).await.unwrap();
        }
        let stats = pool.stats();
        assert_eq!(stats.active, 10);
        assert_eq!(stats.peak, 10);
        assert_eq!(stats.created, 10);

        pool.shutdown(30_000);
        assert_eq!(pool.stats().active, 9);

        pool.shutdown_all();
        let stats = pool.stats();
        assert_eq!(stats.active, 0);
        assert_eq!(stats.cleaned_up, 10);
        // peak survives shutdown
        assert_eq!(stats.peak, 10);
    }

    #[tokio::test]
    async fn test_sweep_removes_idle_agents() {
        let (clock, pool) = test_pool(100).await;
        pool.get_or_create(30_001).await.unwrap();
        pool.get_or_create(30_002).await.unwrap();

        // first device goes stale; second stays fresh
        clock.advance(chrono::Duration::seconds(400));
        let fresh = pool.get_or_create(30_002).await.unwrap();
        let _ = fresh.get(&"1.3.6.1.2.1.1.1.0".parse().unwrap()).await;

        pool.sweep_idle();
        assert!(!pool.registry.contains_key(&30_001));
        assert!(pool.registry.contains_key(&30_002));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_task_runs_and_cancels() {
        let (clock, pool) = test_pool(100).await;
        pool.get_or_create(30_020).await.unwrap();

        let cancel = CancellationToken::new();
        let handle = pool.spawn_sweeper(cancel.clone());

        clock.advance(chrono::Duration::seconds(400));
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(pool.stats().active, 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
