//! Production broadcast transport over UDP.
//!
//! Each truck binds `port_base + id` and addresses every other truck of the
//! fleet at `peer_host:port_base + i`. A copy of each broadcast can be
//! mirrored to a monitor port for an external viewer.

use crate::error::EnvError;
use crate::network::BroadcastTransport;
use crate::types::{AgentId, AgentState};
use crate::wire::{self, WIRE_SIZE};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Addressing plan for one truck's UDP socket.
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// This truck's id (determines the bound port)
    pub agent_id: AgentId,

    /// Number of trucks in the fleet (ids `0..fleet_size`)
    pub fleet_size: u32,

    /// Port of truck 0; truck `i` listens on `port_base + i`
    pub port_base: u16,

    /// Destination host for peer traffic (broadcast address by default)
    pub peer_host: IpAddr,

    /// Local interface to bind
    pub bind_host: IpAddr,

    /// Optional monitor port on `peer_host` that receives a copy of every broadcast
    pub monitor_port: Option<u16>,
}

impl UdpConfig {
    /// Creates the default plan for a truck: broadcast address, port base 5000,
    /// monitor on 4999.
    pub fn new(agent_id: AgentId, fleet_size: u32) -> Self {
        Self {
            agent_id,
            fleet_size,
            port_base: 5000,
            peer_host: IpAddr::V4(Ipv4Addr::BROADCAST),
            bind_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            monitor_port: Some(4999),
        }
    }

    fn port_of(&self, id: u32) -> Option<u16> {
        u16::try_from(id).ok().and_then(|id| self.port_base.checked_add(id))
    }

    /// Address this truck binds.
    pub fn bind_addr(&self) -> Result<SocketAddr, EnvError> {
        let port = self
            .port_of(self.agent_id.0)
            .ok_or_else(|| EnvError::network(format!("no port for {}", self.agent_id)))?;
        Ok(SocketAddr::new(self.bind_host, port))
    }

    /// Addresses of every other truck in the fleet.
    pub fn peer_addrs(&self) -> Vec<SocketAddr> {
        (0..self.fleet_size)
            .filter(|&i| i != self.agent_id.0)
            .filter_map(|i| self.port_of(i))
            .map(|port| SocketAddr::new(self.peer_host, port))
            .collect()
    }
}

/// UDP implementation of [`BroadcastTransport`].
pub struct UdpTransport {
    local_id: AgentId,
    socket: UdpSocket,
    peers: Vec<SocketAddr>,
    monitor: Option<SocketAddr>,
}

impl UdpTransport {
    /// Binds the truck's socket and enables broadcast.
    pub async fn bind(config: &UdpConfig) -> Result<Self, EnvError> {
        let addr = config.bind_addr()?;
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| EnvError::Bind { addr, source })?;
        socket
            .set_broadcast(true)
            .map_err(|e| EnvError::network(format!("SO_BROADCAST: {}", e)))?;

        Ok(Self {
            local_id: config.agent_id,
            socket,
            peers: config.peer_addrs(),
            monitor: config
                .monitor_port
                .map(|port| SocketAddr::new(config.peer_host, port)),
        })
    }

    /// Discards datagrams queued before this truck started.
    ///
    /// Returns the number of datagrams dropped.
    pub fn flush(&self) -> usize {
        let mut buf = [0u8; 1024];
        let mut dropped = 0;
        while self.socket.try_recv_from(&mut buf).is_ok() {
            dropped += 1;
        }
        dropped
    }

    /// Peer addresses this truck sends to.
    pub fn peers(&self) -> &[SocketAddr] {
        &self.peers
    }

    /// Locally bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, EnvError> {
        self.socket
            .local_addr()
            .map_err(|e| EnvError::network(e.to_string()))
    }
}

#[async_trait]
impl BroadcastTransport for UdpTransport {
    async fn broadcast(&self, state: &AgentState) -> Result<usize, EnvError> {
        let datagram = wire::encode(state);
        let mut sent = 0;
        let mut last_error = None;

        for addr in &self.peers {
            match self.socket.send_to(&datagram, addr).await {
                Ok(_) => sent += 1,
                Err(e) => {
                    debug!("send to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        if let Some(monitor) = self.monitor {
            // The monitor is a passive observer; losing it never matters.
            let _ = self.socket.send_to(&datagram, monitor).await;
        }

        match last_error {
            Some(e) if sent == 0 => Err(EnvError::network(e.to_string())),
            _ => Ok(sent),
        }
    }

    fn try_recv(&self) -> Option<AgentState> {
        let mut buf = [0u8; 64];
        loop {
            match self.socket.try_recv_from(&mut buf) {
                Ok((len, from)) => match wire::decode(&buf[..len]) {
                    Ok(state) if state.agent_id == self.local_id => continue,
                    Ok(state) => return Some(state),
                    Err(e) => {
                        warn!("dropping malformed datagram from {}: {}", from, e);
                        continue;
                    }
                },
                Err(e) if e.kind() == ErrorKind::WouldBlock => return None,
                Err(e) => {
                    warn!("receive failed: {}", e);
                    return None;
                }
            }
        }
    }

    fn local_id(&self) -> AgentId {
        self.local_id
    }
}

// Every datagram we accept must fit the receive buffer above.
const _: () = assert!(WIRE_SIZE <= 64);

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn loopback(id: u32, port_base: u16) -> UdpConfig {
        UdpConfig {
            port_base,
            peer_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            bind_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            monitor_port: None,
            ..UdpConfig::new(AgentId(id), 3)
        }
    }

    #[test]
    fn test_peer_addrs_exclude_self() {
        let config = UdpConfig::new(AgentId(1), 4);
        let ports: Vec<u16> = config.peer_addrs().iter().map(|a| a.port()).collect();
        assert_eq!(ports, vec![5000, 5002, 5003]);
        assert_eq!(config.bind_addr().unwrap().port(), 5001);
    }

    #[test]
    fn test_port_overflow_is_skipped() {
        let config = UdpConfig {
            port_base: u16::MAX - 1,
            ..UdpConfig::new(AgentId(0), 4)
        };
        assert_eq!(config.peer_addrs().len(), 1);
    }

    #[tokio::test]
    async fn test_loopback_delivery() {
        let a = UdpTransport::bind(&loopback(0, 46_310)).await.unwrap();
        let b = UdpTransport::bind(&loopback(1, 46_310)).await.unwrap();
        assert_eq!(b.try_recv(), None);

        let state = AgentState::new(AgentId(0), 12.0, 3.0, 99).with_emergency(true);
        let sent = a.broadcast(&state).await.unwrap();
        // Truck 2 is not bound, but UDP send still succeeds locally.
        assert_eq!(sent, 2);

        let mut received = None;
        for _ in 0..50 {
            if let Some(s) = b.try_recv() {
                received = Some(s);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received, Some(state));
    }
}
