//! Per-subscriber bookkeeping owned by the server loop

use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use crate::server::encoder::EncodedFrame;

/// Unique identifier of one accepted socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, handshake in progress
    Connecting,
    /// Handshake done, receiving frames
    Open,
    /// No new frames; flushing and closing
    Closing,
    /// Resources released
    Closed,
}

impl ConnectionState {
    /// Valid transitions; only a failure may jump straight to `Closed`
    pub fn can_transition_to(self, next: ConnectionState, failed: bool) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Connecting, Open) | (Connecting, Closing) | (Open, Closing) | (Closing, Closed) => true,
            (Connecting, Closed) | (Open, Closed) => failed,
            _ => false,
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Close handshake or server shutdown
    Normal,
    /// Write timeout or protocol error; the connection passes through `Closing`
    Error(String),
    /// The network went away underneath us (reset, EOF, abort)
    Abrupt(String),
}

/// Result of offering a frame to a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Enqueued,
    /// Queue full, frame dropped for this connection only
    Dropped,
    /// Already sent this sequence or a newer one
    Stale,
    /// Not open, or the writer has gone away
    Unavailable,
}

/// One subscriber as seen by the server loop
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    state: ConnectionState,
    queue: Option<flume::Sender<EncodedFrame>>,
    last_sequence: Option<u64>,
    frames_enqueued: u64,
    frames_dropped: u64,
    accepted_at: Instant,
    error: Option<String>,
}

impl Connection {
    pub fn new(id: ConnectionId, peer: SocketAddr) -> Self {
        Self {
            id,
            peer,
            state: ConnectionState::Connecting,
            queue: None,
            last_sequence: None,
            frames_enqueued: 0,
            frames_dropped: 0,
            accepted_at: Instant::now(),
            error: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Sequence of the newest frame handed to the writer
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn frames_enqueued(&self) -> u64 {
        self.frames_enqueued
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    /// Time since the socket was accepted
    pub fn age(&self) -> std::time::Duration {
        self.accepted_at.elapsed()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Handshake finished; frames now go to `queue`
    pub fn open(&mut self, queue: flume::Sender<EncodedFrame>) -> bool {
        if !self.transition(ConnectionState::Open, false) {
            return false;
        }
        self.queue = Some(queue);
        true
    }

    /// Stop feeding frames. Dropping the queue sender lets the writer drain
    /// what is already queued and then close the socket.
    pub fn begin_close(&mut self) {
        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            self.transition(ConnectionState::Closing, false);
        }
        self.queue = None;
    }

    /// Writer finished. Only an abrupt network failure skips `Closing`.
    pub fn finish(&mut self, reason: CloseReason) {
        let abrupt = matches!(reason, CloseReason::Abrupt(_));
        if !abrupt {
            self.begin_close();
        }
        self.queue = None;
        self.error = match reason {
            CloseReason::Normal => None,
            CloseReason::Error(error) | CloseReason::Abrupt(error) => Some(error),
        };
        if self.state != ConnectionState::Closed {
            self.transition(ConnectionState::Closed, abrupt);
        }
    }

    /// Offer a frame without ever blocking
    pub fn offer(&mut self, frame: &EncodedFrame) -> Delivery {
        if self.state != ConnectionState::Open {
            return Delivery::Unavailable;
        }
        if self.last_sequence.is_some_and(|last| frame.sequence <= last) {
            return Delivery::Stale;
        }
        let Some(queue) = self.queue.as_ref() else {
            return Delivery::Unavailable;
        };

        match queue.try_send(frame.clone()) {
            Ok(()) => {
                self.last_sequence = Some(frame.sequence);
                self.frames_enqueued += 1;
                Delivery::Enqueued
            }
            Err(flume::TrySendError::Full(_)) => {
                self.frames_dropped += 1;
                Delivery::Dropped
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                self.begin_close();
                Delivery::Unavailable
            }
        }
    }

    fn transition(&mut self, next: ConnectionState, failed: bool) -> bool {
        if !self.state.can_transition_to(next, failed) {
            tracing::warn!(
                connection = %self.id,
                from = ?self.state,
                to = ?next,
                "Ignoring invalid state transition"
            );
            return false;
        }

        tracing::trace!(connection = %self.id, from = ?self.state, to = ?next, "State change");
        self.state = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::Utf8Bytes;

    fn conn() -> Connection {
        Connection::new(ConnectionId(1), "127.0.0.1:5000".parse().unwrap())
    }

    fn frame(sequence: u64) -> EncodedFrame {
        EncodedFrame {
            sequence,
            payload: Utf8Bytes::from_static("AAAA"),
        }
    }

    #[test]
    fn test_transition_table() {
        use ConnectionState::*;

        assert!(Connecting.can_transition_to(Open, false));
        assert!(Open.can_transition_to(Closing, false));
        assert!(Closing.can_transition_to(Closed, false));
        assert!(!Open.can_transition_to(Closed, false));
        assert!(Open.can_transition_to(Closed, true));
        assert!(!Closed.can_transition_to(Open, false));
        assert!(!Closing.can_transition_to(Open, false));
    }

    #[test]
    fn test_offer_before_open_is_unavailable() {
        let mut conn = conn();

        assert_eq!(conn.offer(&frame(1)), Delivery::Unavailable);
    }

    #[test]
    fn test_offer_drops_newest_when_full() {
        let (tx, rx) = flume::bounded(1);
        let mut conn = conn();
        assert!(conn.open(tx));

        assert_eq!(conn.offer(&frame(1)), Delivery::Enqueued);
        assert_eq!(conn.offer(&frame(2)), Delivery::Dropped);
        assert_eq!(conn.frames_dropped(), 1);

        assert_eq!(rx.recv().unwrap().sequence, 1);
        assert_eq!(conn.offer(&frame(3)), Delivery::Enqueued);
        assert_eq!(rx.recv().unwrap().sequence, 3);
    }

    #[test]
    fn test_offer_rejects_duplicates_and_older() {
        let (tx, _rx) = flume::bounded(8);
        let mut conn = conn();
        conn.open(tx);

        assert_eq!(conn.offer(&frame(5)), Delivery::Enqueued);
        assert_eq!(conn.offer(&frame(5)), Delivery::Stale);
        assert_eq!(conn.offer(&frame(4)), Delivery::Stale);
        assert_eq!(conn.last_sequence(), Some(5));
    }

    #[test]
    fn test_disconnected_writer_moves_to_closing() {
        let (tx, rx) = flume::bounded(1);
        let mut conn = conn();
        conn.open(tx);
        drop(rx);

        assert_eq!(conn.offer(&frame(1)), Delivery::Unavailable);
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[test]
    fn test_clean_finish_passes_through_closing() {
        let (tx, _rx) = flume::bounded(1);
        let mut conn = conn();
        conn.open(tx);

        conn.finish(CloseReason::Normal);

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert!(conn.error().is_none());
    }

    #[test]
    fn test_abrupt_finish_records_error() {
        let (tx, _rx) = flume::bounded(1);
        let mut conn = conn();
        conn.open(tx);

        conn.finish(CloseReason::Abrupt("connection reset".into()));

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.error(), Some("connection reset"));
    }

    #[test]
    fn test_write_error_passes_through_closing() {
        let (tx, rx) = flume::bounded(1);
        let mut conn = conn();
        conn.open(tx);

        conn.finish(CloseReason::Error("outbound write timed out".into()));

        assert_eq!(conn.state(), ConnectionState::Closed);
        assert_eq!(conn.error(), Some("outbound write timed out"));
        // Closing dropped the queue on the way
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_finish_while_closing() {
        let (tx, _rx) = flume::bounded(1);
        let mut conn = conn();
        conn.open(tx);
        conn.begin_close();

        conn.finish(CloseReason::Abrupt("connection reset".into()));

        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_age_grows() {
        let conn = conn();
        let first = conn.age();
        std::thread::sleep(std::time::Duration::from_millis(2));

        assert!(conn.age() > first);
    }

    #[test]
    fn test_begin_close_drops_queue_so_writer_drains() {
        let (tx, rx) = flume::bounded(2);
        let mut conn = conn();
        conn.open(tx);
        conn.offer(&frame(1));

        conn.begin_close();

        assert_eq!(rx.recv().unwrap().sequence, 1);
        assert!(rx.recv().is_err());
    }
}
