//! The server's network loop.
//!
//! A single task owns the listener, the connection set and the fan-out. It
//! wakes on socket accepts, session events, new-frame notifications and the
//! shutdown signal; nothing outside this task mutates the connection set.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

use crate::pipeline::LatestFrameSlot;
use crate::server::connection::ConnectionId;
use crate::server::encoder;
use crate::server::fanout::FanoutSet;
use crate::server::session::{self, HubEvent};
use crate::server::ServerConfig;

/// Counters the loop publishes for the host
#[derive(Debug, Default)]
pub(crate) struct ServerShared {
    pub open_connections: AtomicUsize,
    pub frames_broadcast: AtomicU64,
    pub frames_enqueued: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub encode_failures: AtomicU64,
}

pub(crate) struct Hub {
    config: Arc<ServerConfig>,
    slot: Arc<LatestFrameSlot>,
    frames: watch::Receiver<u64>,
    shutdown: watch::Receiver<bool>,
    events_tx: flume::Sender<HubEvent>,
    events_rx: flume::Receiver<HubEvent>,
    connections: FanoutSet,
    sessions: JoinSet<()>,
    shared: Arc<ServerShared>,
    next_id: u64,
    last_broadcast: Option<u64>,
}

impl Hub {
    pub fn new(
        config: Arc<ServerConfig>,
        slot: Arc<LatestFrameSlot>,
        frames: watch::Receiver<u64>,
        shutdown: watch::Receiver<bool>,
        shared: Arc<ServerShared>,
    ) -> Self {
        let (events_tx, events_rx) = flume::unbounded();

        Self {
            config,
            slot,
            frames,
            shutdown,
            events_tx,
            events_rx,
            connections: FanoutSet::new(),
            sessions: JoinSet::new(),
            shared,
            next_id: 0,
            last_broadcast: None,
        }
    }

    /// Serve until shutdown is signalled, then close every connection
    pub async fn run(mut self, listener: TcpListener) {
        let mut frames_open = true;

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => break,

                Ok(event) = self.events_rx.recv_async() => self.handle_event(event),

                accepted = listener.accept() => match accepted {
                    Ok((socket, peer)) => self.accept(socket, peer),
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },

                changed = self.frames.changed(), if frames_open => match changed {
                    Ok(()) => self.broadcast_latest().await,
                    Err(_) => {
                        debug!("Frame producer dropped");
                        frames_open = false;
                    }
                },

                Some(joined) = self.sessions.join_next(), if !self.sessions.is_empty() => {
                    self.reap(joined);
                }
            }
        }

        // Closes the listening endpoint
        drop(listener);
        self.drain().await;
    }

    fn accept(&mut self, socket: TcpStream, peer: SocketAddr) {
        if self.config.max_connections > 0
            && self.connections.live_count() >= self.config.max_connections
        {
            warn!(peer = %peer, "Connection rejected: limit reached");
            return;
        }

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                warn!(peer = %peer, error = %e, "Failed to configure socket");
            }
        }

        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.connections.accept(id, peer);
        debug!(connection = %id, peer = %peer, "New connection");

        self.sessions.spawn(session::run_session(
            id,
            socket,
            Arc::clone(&self.config),
            self.events_tx.clone(),
        ));
    }

    fn handle_event(&mut self, event: HubEvent) {
        match event {
            HubEvent::Opened { id, queue } => {
                if self.connections.open(id, queue) {
                    metrics::counter!("connections_opened").increment(1);
                    if let Some(conn) = self.connections.get(id) {
                        info!(connection = %id, peer = %conn.peer(), "Subscriber joined broadcast");
                    }
                } else {
                    // Dropping the queue makes the session close straight away
                    debug!(connection = %id, "Handshake finished after close, dropping");
                }
            }
            HubEvent::PeerClosing { id } => {
                debug!(connection = %id, "Client closing");
                self.connections.begin_close(id);
            }
            HubEvent::Finished { id, reason } => {
                if let Some(conn) = self.connections.finish(id, reason) {
                    metrics::counter!("connections_closed").increment(1);
                    let age_ms = conn.age().as_millis() as u64;
                    match conn.error() {
                        Some(err) => info!(
                            connection = %id,
                            peer = %conn.peer(),
                            age_ms,
                            error = err,
                            "Connection failed"
                        ),
                        None => info!(
                            connection = %id,
                            peer = %conn.peer(),
                            age_ms,
                            enqueued = conn.frames_enqueued(),
                            dropped = conn.frames_dropped(),
                            "Connection closed"
                        ),
                    }
                }
            }
        }

        self.shared
            .open_connections
            .store(self.connections.open_count(), Ordering::Relaxed);
    }

    fn reap(&mut self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!(error = %e, "Connection task panicked");
            }
        }
    }

    /// Encode the latest frame once and offer it to every open connection
    async fn broadcast_latest(&mut self) {
        let Some(frame) = self.slot.read() else {
            return;
        };

        let sequence = frame.sequence();
        if self.last_broadcast.is_some_and(|last| sequence <= last) {
            return;
        }
        self.last_broadcast = Some(sequence);

        if self.connections.open_count() == 0 {
            return;
        }

        let quality = self.config.jpeg_quality;
        let encoded =
            match tokio::task::spawn_blocking(move || encoder::encode_frame(&frame, quality)).await {
                Ok(Ok(encoded)) => encoded,
                Ok(Err(e)) => {
                    self.shared.encode_failures.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("broadcast_encode_failures").increment(1);
                    warn!(sequence, error = %e, "Failed to encode frame");
                    return;
                }
                Err(e) => {
                    error!(sequence, error = %e, "Encoder task failed");
                    return;
                }
            };

        let report = self.connections.fan_out(&encoded);

        self.shared.frames_broadcast.fetch_add(1, Ordering::Relaxed);
        self.shared
            .frames_enqueued
            .fetch_add(report.enqueued as u64, Ordering::Relaxed);
        self.shared
            .frames_dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
        metrics::counter!("broadcast_frames_enqueued").increment(report.enqueued as u64);
        metrics::counter!("broadcast_frames_dropped").increment(report.dropped as u64);

        trace!(
            sequence,
            enqueued = report.enqueued,
            dropped = report.dropped,
            "Frame broadcast"
        );
    }

    /// Close every connection, allowing queued frames to flush within the grace period
    async fn drain(&mut self) {
        info!(connections = self.connections.len(), "Closing connections");
        self.connections.begin_close_all();

        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace();
        while !self.sessions.is_empty() {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        remaining = self.sessions.len(),
                        "Shutdown grace expired, forcing connections closed"
                    );
                    self.sessions.abort_all();
                    while let Some(joined) = self.sessions.join_next().await {
                        self.reap(joined);
                    }
                }
                Ok(event) = self.events_rx.recv_async() => self.handle_event(event),
                Some(joined) = self.sessions.join_next() => self.reap(joined),
            }
        }

        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
        self.shared.open_connections.store(0, Ordering::Relaxed);
    }
}
