//! Per-port UDP listener
//!
//! One socket per simulated device port. The receive loop decodes, checks
//! the community, runs the pipeline with a timeout, and replies to the
//! datagram source. Malformed datagrams and community mismatches are
//! dropped without a response.

use std::net::SocketAddr;
use std::sync::Arc;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::core::simulator::SimulatorEvent;
use crate::device::pool::DevicePool;
use crate::snmp::ber;
use crate::snmp::pipeline::{self, MAX_UDP_DATAGRAM, REQUEST_TIMEOUT};
use crate::{Error, Result};

pub struct PortListener {
    port: u16,
    socket: Arc<UdpSocket>,
    pool: Arc<DevicePool>,
    event_tx: mpsc::UnboundedSender<SimulatorEvent>,
}

impl PortListener {
    /// Binds the device port. Address conflicts surface as
    /// `PortBindFailed`, never a panic.
    pub fn bind(
        bind_address: &str,
        port: u16,
        recv_buffer_size: Option<usize>,
        pool: Arc<DevicePool>,
        event_tx: mpsc::UnboundedSender<SimulatorEvent>,
    ) -> Result<Self> {
        let addr: SocketAddr = format!("{bind_address}:{port}")
            .parse()
            .map_err(|e| Error::network(format!("bad bind address: {e}")))?;

        let domain = if addr.is_ipv6() {
            Domain::IPV6
        } else {
            Domain::IPV4
        };
        let bind_err = |e: std::io::Error| Error::PortBindFailed {
            port,
            reason: e.to_string(),
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
        if let Some(size) = recv_buffer_size {
            socket.set_recv_buffer_size(size).map_err(bind_err)?;
        }
        socket.set_nonblocking(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;

        let socket = UdpSocket::from_std(socket.into()).map_err(bind_err)?;
        Ok(Self {
            port,
            socket: Arc::new(socket),
            pool,
            event_tx,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Runs the receive loop until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_UDP_DATAGRAM];
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = self.socket.recv_from(&mut buffer) => {
                        match received {
                            Ok((len, source)) => {
                                self.handle_datagram(&buffer[..len], source).await;
                            }
                            Err(e) => {
                                warn!(port = self.port, error = %e, "socket receive error");
                            }
                        }
                    }
                }
            }
            trace!(port = self.port, "listener stopped");
        })
    }

    async fn handle_datagram(&self, data: &[u8], source: SocketAddr) {
        let request = match ber::decode_message(data) {
            Ok(message) => message,
            Err(e) => {
                trace!(port = self.port, %source, error = %e, "dropping undecodable datagram");
                return;
            }
        };

        // community check happens before any device state is touched;
        // mismatches get no response at all
        if request.community != self.pool.community().as_bytes() {
            warn!(
                port = self.port,
                %source,
                community = %request.community_str(),
                "community mismatch; dropping request"
            );
            let _ = self.event_tx.send(SimulatorEvent::SecurityEvent {
                port: self.port,
                source,
                community: request.community_str(),
            });
            return;
        }

        let agent = match self.pool.get_or_create(self.port).await {
            Ok(agent) => agent,
            Err(e) => {
                debug!(port = self.port, error = %e, "dropping datagram; no agent");
                return;
            }
        };

        // the handler runs in its own task so a panicking agent only
        // poisons this one request
        let request_id = request.pdu.request_id;
        let mut handler = tokio::spawn(async move {
            let response = pipeline::process(&agent, &request).await;
            (request, response)
        });

        let (request, response) = match timeout(REQUEST_TIMEOUT, &mut handler).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    self.pool.mark_dead(self.port);
                }
                warn!(port = self.port, request_id, "request handler died; no response");
                return;
            }
            Err(_elapsed) => {
                handler.abort();
                warn!(port = self.port, request_id, "request timed out; dropping response");
                return;
            }
        };

        let mut encoded = ber::encode_message(&response);
        if encoded.len() > MAX_UDP_DATAGRAM {
            // oversized responses fall back to tooBig with the request
            // varbinds echoed
            encoded = ber::encode_message(&pipeline::too_big_reply(&request));
        }

        if let Err(e) = self.socket.send_to(&encoded, source).await {
            warn!(port = self.port, %source, error = %e, "failed to send response");
        }
    }
}

impl std::fmt::Debug for PortListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortListener")
            .field("port", &self.port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CorrelationConfig, DeviceType, PoolConfig, PortAssignment, PortRange,
    };
    use crate::mib::builder::builtin_profile;
    use crate::mib::ProfileStore;
    use crate::sim::clock::SystemClock;
    use crate::sim::correlation::CorrelationEngine;
    use crate::sim::value::ValueSimulator;
    use crate::snmp::message::{
        ErrorStatus, PduType, SnmpMessage, SnmpPdu, SnmpVersion, VarBind,
    };
    use crate::snmp::SnmpValue;

    async fn start_listener(port: u16) -> (CancellationToken, JoinHandle<()>) {
        let profiles = Arc::new(ProfileStore::new());
        profiles
            .install(builtin_profile(&DeviceType::CableModem).unwrap())
            .await;

        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(DevicePool::new(
            PoolConfig::default(),
            vec![PortAssignment {
                device_type: DeviceType::CableModem,
                range: PortRange::new(port, port),
            }],
            "public".to_string(),
            profiles,
            Arc::new(ValueSimulator::new()),
            Arc::new(CorrelationEngine::from_config(&CorrelationConfig::default()).unwrap()),
            Arc::new(SystemClock),
            event_tx.clone(),
        ));

        let listener =
            PortListener::bind("127.0.0.1", port, None, pool, event_tx).expect("bind listener");
        let cancel = CancellationToken::new();
        let handle = listener.spawn(cancel.clone());
        (cancel, handle)
    }

    fn get_sys_descr(community: &[u8]) -> Vec<u8> {
        let message = SnmpMessage::new(
            SnmpVersion::V2c,
            community.to_vec(),
            SnmpPdu::request(
                PduType::GetRequest,
                421,
                vec![VarBind::null("1.3.6.1.2.1.1.1.0".parse().unwrap())],
            ),
        );
        ber::encode_message(&message)
    }

    async fn exchange(port: u16, datagram: &[u8]) -> Option<SnmpMessage> {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(datagram, ("127.0.0.1", port))
            .await
            .unwrap();
        let mut buffer = vec![0u8; MAX_UDP_DATAGRAM];
        match timeout(REQUEST_TIMEOUT, client.recv(&mut buffer)).await {
            Ok(Ok(len)) => Some(ber::decode_message(&buffer[..len]).unwrap()),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_end_to_end_get() {
        let port = 43_811;
        let (cancel, handle) = start_listener(port).await;

        let response = exchange(port, &get_sys_descr(b"public"))
            .await
            .expect("response expected");
        assert_eq!(response.pdu.pdu_type, PduType::GetResponse);
        assert_eq!(response.pdu.request_id, 421);
        assert_eq!(response.pdu.status(), ErrorStatus::NoError);
        let SnmpValue::OctetString(descr) = &response.pdu.varbinds[0].value else {
            panic!("expected sysDescr string");
        };
        assert!(String::from_utf8_lossy(descr).contains("Cable Modem"));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_community_times_out() {
        let port = 43_812;
        let (cancel, handle) = start_listener(port).await;

        let response = exchange(port, &get_sys_descr(b"private")).await;
        assert!(response.is_none(), "must not answer a bad community");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_datagram_dropped() {
        let port = 43_813;
        let (cancel, handle) = start_listener(port).await;

        let response = exchange(port, b"\x30\x05not-snmp").await;
        assert!(response.is_none());

        // the listener keeps serving afterwards
        let response = exchange(port, &get_sys_descr(b"public")).await;
        assert!(response.is_some());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_v1_getbulk_gen_err_over_wire() {
        let port = 43_814;
        let (cancel, handle) = start_listener(port).await;

        let message = SnmpMessage::new(
            SnmpVersion::V1,
            b"public".to_vec(),
            SnmpPdu {
                pdu_type: PduType::GetBulkRequest,
                request_id: 9,
                error_status: 0,
                error_index: 10,
                varbinds: vec![VarBind::null("1.3.6.1.2.1.1".parse().unwrap())],
            },
        );
        let response = exchange(port, &ber::encode_message(&message))
            .await
            .expect("genErr response expected");
        assert_eq!(response.pdu.status(), ErrorStatus::GenErr);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_structured_error() {
        let port = 43_815;
        let (cancel, handle) = start_listener(port).await;

        let profiles = Arc::new(ProfileStore::new());
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(DevicePool::new(
            PoolConfig::default(),
            vec![],
            "public".to_string(),
            profiles,
            Arc::new(ValueSimulator::new()),
            Arc::new(CorrelationEngine::default()),
            Arc::new(SystemClock),
            event_tx.clone(),
        ));
        let err = PortListener::bind("127.0.0.1", port, None, pool, event_tx).unwrap_err();
        assert!(matches!(err, Error::PortBindFailed { port: p, .. } if p == port));

        cancel.cancel();
        handle.await.unwrap();
    }
}
