//! Broadcast server configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Broadcast server configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on
    pub bind_ip: IpAddr,

    /// Port used by the binary; `start` takes the port explicitly
    pub port: u16,

    /// Encoded frames buffered per connection before new ones are dropped
    pub queue_depth: usize,

    /// JPEG quality, 1-100
    pub jpeg_quality: u8,

    /// WebSocket handshake must complete within this time
    pub handshake_timeout_ms: u64,

    /// A single outbound message must be written within this time
    pub write_timeout_ms: u64,

    /// Time `stop` grants connections to flush before forcing them closed
    pub shutdown_grace_ms: u64,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Worker threads of the network runtime
    pub worker_threads: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 9001,
            queue_depth: 4,
            jpeg_quality: 50,
            handshake_timeout_ms: 5_000,
            write_timeout_ms: 2_000,
            shutdown_grace_ms: 2_000,
            max_connections: 0, // Unlimited
            worker_threads: 2,
            tcp_nodelay: true, // Important for low latency
        }
    }
}

impl ServerConfig {
    /// Socket address for the given port on the configured interface
    pub fn addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind_ip, port)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Set the listening interface
    pub fn bind(mut self, ip: IpAddr) -> Self {
        self.bind_ip = ip;
        self
    }

    /// Set per-connection queue depth (at least 1)
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    /// Set JPEG quality, clamped to 1-100
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Set handshake timeout
    pub fn handshake_timeout_after(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set write timeout
    pub fn write_timeout_after(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set shutdown grace period
    pub fn shutdown_grace_after(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = grace.as_millis() as u64;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}
