//! Simulator orchestrator
//!
//! Wires config → profiles → pool → per-port listeners: installs a MIB
//! profile per configured device type (walk file or built-in), binds every
//! assigned port in warmup batches, runs the idle sweeper, and fans
//! component events out to one channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{DeviceType, SimulatorConfig};
use crate::device::listener::PortListener;
use crate::device::pool::{DevicePool, PoolStats};
use crate::mib::builder::builtin_profile;
use crate::mib::walk::load_walk_file;
use crate::mib::{DeviceProfile, ProfileStore};
use crate::sim::clock::{Clock, SystemClock};
use crate::sim::correlation::CorrelationEngine;
use crate::sim::value::ValueSimulator;
use crate::{Error, Result};

/// Grace period for in-flight requests during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Simulator lifecycle and security events.
#[derive(Debug, Clone)]
pub enum SimulatorEvent {
    Started,
    Stopped,
    DeviceCreated {
        port: u16,
        device_type: DeviceType,
    },
    DeviceEvicted {
        port: u16,
    },
    DeviceCrashed {
        port: u16,
    },
    SecurityEvent {
        port: u16,
        source: SocketAddr,
        community: String,
    },
    Error {
        message: String,
    },
}

/// Point-in-time view of the running simulator.
#[derive(Debug, Clone)]
pub struct SimulatorStatus {
    pub run_id: Uuid,
    pub running: bool,
    pub uptime: Duration,
    pub ports_bound: usize,
    pub pool: PoolStats,
}

pub struct Simulator {
    config: SimulatorConfig,
    run_id: Uuid,
    clock: Arc<dyn Clock>,
    profiles: Arc<ProfileStore>,
    pool: Option<Arc<DevicePool>>,
    event_tx: mpsc::UnboundedSender<SimulatorEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<SimulatorEvent>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    ports_bound: usize,
    is_running: bool,
    start_time: Option<Instant>,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Constructor with an injected clock; tests pin time with a
    /// `ManualClock`.
    pub fn with_clock(config: SimulatorConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Ok(Self {
            config,
            run_id: Uuid::new_v4(),
            clock,
            profiles: Arc::new(ProfileStore::new()),
            pool: None,
            event_tx,
            event_rx: Some(event_rx),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            ports_bound: 0,
            is_running: false,
            start_time: None,
        })
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SimulatorEvent>> {
        self.event_rx.take()
    }

    pub fn pool(&self) -> Option<Arc<DevicePool>> {
        self.pool.clone()
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.is_running {
            return Err(Error::invalid_state("simulator is already running"));
        }
        info!(run_id = %self.run_id, node = %self.config.general.node_id, "starting simulator");

        let assignments = self.config.devices.resolved_assignments()?;
        self.install_profiles(&assignments).await?;

        let correlations = Arc::new(CorrelationEngine::from_config(&self.config.correlation)?);
        let pool = Arc::new(DevicePool::new(
            self.config.pool.clone(),
            assignments.clone(),
            self.config.agent.community.clone(),
            self.profiles.clone(),
            Arc::new(ValueSimulator::new()),
            correlations,
            self.clock.clone(),
            self.event_tx.clone(),
        ));
        self.tasks.push(pool.spawn_sweeper(self.cancel.clone()));
        self.pool = Some(pool.clone());

        self.bind_listeners(&pool, &assignments).await?;

        self.is_running = true;
        self.start_time = Some(Instant::now());
        let _ = self.event_tx.send(SimulatorEvent::Started);
        info!(
            ports = self.ports_bound,
            device_types = assignments.len(),
            "simulator started"
        );
        Ok(())
    }

    /// Installs one profile per device type in the assignments: a
    /// configured walk file when present, the built-in profile otherwise.
    async fn install_profiles(&self, assignments: &[crate::config::PortAssignment]) -> Result<()> {
        let mut device_types: Vec<DeviceType> = Vec::new();
        for assignment in assignments {
            if !device_types.contains(&assignment.device_type) {
                device_types.push(assignment.device_type.clone());
            }
        }

        for device_type in device_types {
            if self.profiles.contains(&device_type).await {
                continue;
            }
            let walk_path = self
                .config
                .devices
                .walk_files
                .iter()
                .find(|w| w.device_type == device_type)
                .map(|w| w.path.clone());

            let profile = match walk_path {
                Some(path) => {
                    let records = load_walk_file(&path)?;
                    if records.is_empty() {
                        return Err(Error::parse(format!("walk file {path} yielded no entries")));
                    }
                    DeviceProfile::from_records(device_type.clone(), records)?
                }
                None => builtin_profile(&device_type)?,
            };
            self.profiles.install(profile).await;
        }
        Ok(())
    }

    /// Binds every assigned port in warmup batches so that huge fleets
    /// start predictably.
    async fn bind_listeners(
        &mut self,
        pool: &Arc<DevicePool>,
        assignments: &[crate::config::PortAssignment],
    ) -> Result<()> {
        let batch_size = self.config.network.warmup_batch_size;
        let bind_address = self.config.network.bind_address.clone();
        let recv_buffer = self.config.network.recv_buffer_size;

        let all_ports: Vec<u16> = assignments
            .iter()
            .flat_map(|a| a.range.ports())
            .collect();
        let total = all_ports.len();

        for (batch_index, batch) in all_ports.chunks(batch_size).enumerate() {
            for &port in batch {
                let listener = PortListener::bind(
                    &bind_address,
                    port,
                    recv_buffer,
                    pool.clone(),
                    self.event_tx.clone(),
                )?;
                self.tasks.push(listener.spawn(self.cancel.clone()));
                self.ports_bound += 1;
            }
            info!(
                batch = batch_index + 1,
                bound = self.ports_bound,
                total,
                "warmup batch bound"
            );
            // let the runtime breathe between large batches
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        info!("stopping simulator");
        self.cancel.cancel();

        // in-flight requests drain within the grace period; stragglers are
        // aborted
        for task in self.tasks.drain(..) {
            match timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => error!("task panicked during shutdown"),
                Ok(Err(_)) => {}
                Err(_elapsed) => warn!("task did not stop within grace period"),
            }
        }

        if let Some(pool) = &self.pool {
            pool.shutdown_all();
        }
        self.is_running = false;
        let _ = self.event_tx.send(SimulatorEvent::Stopped);
        info!("simulator stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    pub fn status(&self) -> SimulatorStatus {
        SimulatorStatus {
            run_id: self.run_id,
            running: self.is_running,
            uptime: self
                .start_time
                .map(|start| start.elapsed())
                .unwrap_or_default(),
            ports_bound: self.ports_bound,
            pool: self
                .pool
                .as_ref()
                .map(|pool| pool.stats())
                .unwrap_or_default(),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceMix, PortAssignment, PortRange};
    use crate::snmp::ber;
    use crate::snmp::message::{
        ErrorStatus, PduType, SnmpMessage, SnmpPdu, SnmpVersion, VarBind,
    };
    use crate::snmp::pipeline::{MAX_UDP_DATAGRAM, REQUEST_TIMEOUT};
    use crate::snmp::SnmpValue;
    use tokio::net::UdpSocket;

    fn test_config(base_port: u16, device_count: usize) -> SimulatorConfig {
        let mut config = SimulatorConfig::default_config();
        config.network.bind_address = "127.0.0.1".to_string();
        config.devices.base_port = base_port;
        config.devices.device_count = device_count;
        config.devices.mix = Some(DeviceMix::SmallTest);
        config
    }

    async fn query(port: u16, oid: &str) -> Option<SnmpMessage> {
        let message = SnmpMessage::new(
            SnmpVersion::V2c,
            b"public".to_vec(),
            SnmpPdu::request(
                PduType::GetRequest,
                77,
                vec![VarBind::null(oid.parse().unwrap())],
            ),
        );
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(&ber::encode_message(&message), ("127.0.0.1", port))
            .await
            .unwrap();
        let mut buffer = vec![0u8; MAX_UDP_DATAGRAM];
        match tokio::time::timeout(REQUEST_TIMEOUT, client.recv(&mut buffer)).await {
            Ok(Ok(len)) => Some(ber::decode_message(&buffer[..len]).unwrap()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_start_serve_and_stop() {
        let mut simulator = Simulator::new(test_config(44_200, 10)).unwrap();
        let mut events = simulator.take_event_receiver().unwrap();
        simulator.start().await.unwrap();

        assert!(simulator.is_running());
        assert!(matches!(events.recv().await, Some(SimulatorEvent::Started)));

        let status = simulator.status();
        assert_eq!(status.ports_bound, 10);
        assert_eq!(status.pool.active, 0);

        // first datagram creates the device lazily
        let response = query(44_200, "1.3.6.1.2.1.1.1.0").await.expect("response");
        assert_eq!(response.pdu.status(), ErrorStatus::NoError);
        assert!(matches!(
            response.pdu.varbinds[0].value,
            SnmpValue::OctetString(_)
        ));

        let status = simulator.status();
        assert_eq!(status.pool.active, 1);
        assert_eq!(status.pool.created, 1);
        assert!(matches!(
            events.recv().await,
            Some(SimulatorEvent::DeviceCreated { port: 44_200, .. })
        ));

        simulator.stop().await.unwrap();
        assert!(!simulator.is_running());
        assert_eq!(simulator.status().pool.active, 0);
    }

    #[tokio::test]
    async fn test_two_independent_simulators() {
        // no global registries: two simulators coexist in one process
        let mut first = Simulator::new(test_config(44_300, 5)).unwrap();
        let mut second = Simulator::new(test_config(44_400, 5)).unwrap();
        first.start().await.unwrap();
        second.start().await.unwrap();

        assert!(query(44_300, "1.3.6.1.2.1.1.1.0").await.is_some());
        assert!(query(44_400, "1.3.6.1.2.1.1.1.0").await.is_some());

        first.stop().await.unwrap();
        // the second keeps serving after the first stops
        assert!(query(44_400, "1.3.6.1.2.1.1.5.0").await.is_some());
        second.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_fails_start() {
        let blocker = UdpSocket::bind(("127.0.0.1", 44_510)).await.unwrap();
        let mut config = test_config(44_510, 3);
        config.devices.mix = None;
        config.devices.assignments = vec![PortAssignment {
            device_type: crate::config::DeviceType::CableModem,
            range: PortRange::new(44_510, 44_512),
        }];

        let mut simulator = Simulator::new(config).unwrap();
        let err = simulator.start().await.unwrap_err();
        assert!(matches!(err, Error::PortBindFailed { port: 44_510, .. }));
        drop(blocker);
    }

    #[tokio::test]
    async fn test_custom_type_without_walk_file_fails() {
        let mut config = test_config(44_600, 2);
        config.devices.mix = None;
        config.devices.assignments = vec![PortAssignment {
            device_type: crate::config::DeviceType::Custom("lab-sensor".to_string()),
            range: PortRange::new(44_600, 44_601),
        }];
        let mut simulator = Simulator::new(config).unwrap();
        let err = simulator.start().await.unwrap_err();
        assert!(matches!(err, Error::InvalidDeviceType(_)));
    }
}
