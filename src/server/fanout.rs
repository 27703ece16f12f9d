//! The set of live connections and the encode-once, offer-to-all step

use std::collections::BTreeMap;
use std::net::SocketAddr;

use crate::server::connection::{CloseReason, Connection, ConnectionId, ConnectionState, Delivery};
use crate::server::encoder::EncodedFrame;

/// Counts from one fan-out pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub enqueued: usize,
    pub dropped: usize,
    pub unavailable: usize,
}

/// All connections known to the server loop.
///
/// Only the server loop touches this; producers and the renderer never do.
#[derive(Debug, Default)]
pub struct FanoutSet {
    connections: BTreeMap<ConnectionId, Connection>,
}

impl FanoutSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly accepted socket
    pub fn accept(&mut self, id: ConnectionId, peer: SocketAddr) {
        self.connections.insert(id, Connection::new(id, peer));
    }

    /// Handshake completed. Returns false (and the queue is dropped) if the
    /// connection is unknown or no longer allowed to open.
    pub fn open(&mut self, id: ConnectionId, queue: flume::Sender<EncodedFrame>) -> bool {
        match self.connections.get_mut(&id) {
            Some(conn) if conn.state() == ConnectionState::Connecting => conn.open(queue),
            // Closed while the handshake was in flight, e.g. during shutdown
            Some(conn) => {
                tracing::debug!(connection = %id, state = ?conn.state(), "Not opening connection");
                false
            }
            None => false,
        }
    }

    pub fn begin_close(&mut self, id: ConnectionId) {
        if let Some(conn) = self.connections.get_mut(&id) {
            conn.begin_close();
        }
    }

    /// Stop feeding every connection
    pub fn begin_close_all(&mut self) {
        for conn in self.connections.values_mut() {
            conn.begin_close();
        }
    }

    /// Writer is gone; remove and return the final record
    pub fn finish(&mut self, id: ConnectionId, reason: CloseReason) -> Option<Connection> {
        let mut conn = self.connections.remove(&id)?;
        conn.finish(reason);
        Some(conn)
    }

    /// Offer one encoded frame to every open connection; never blocks
    pub fn fan_out(&mut self, frame: &EncodedFrame) -> FanoutReport {
        let mut report = FanoutReport::default();

        for conn in self.connections.values_mut() {
            match conn.offer(frame) {
                Delivery::Enqueued => report.enqueued += 1,
                Delivery::Dropped => {
                    report.dropped += 1;
                    tracing::trace!(
                        connection = %conn.id(),
                        sequence = frame.sequence,
                        "Outbound queue full, frame dropped"
                    );
                }
                Delivery::Stale => {}
                Delivery::Unavailable => report.unavailable += 1,
            }
        }

        report
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Connections that count against the connection limit: handshaking or open
    pub fn live_count(&self) -> usize {
        self.connections
            .values()
            .filter(|conn| {
                matches!(
                    conn.state(),
                    ConnectionState::Connecting | ConnectionState::Open
                )
            })
            .count()
    }

    pub fn open_count(&self) -> usize {
        self.connections
            .values()
            .filter(|conn| conn.state() == ConnectionState::Open)
            .count()
    }
}
