//! One task per socket: handshake, then drain its bounded queue to the wire

use std::io;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::ServerError;
use crate::server::connection::{CloseReason, ConnectionId};
use crate::server::encoder::EncodedFrame;
use crate::server::ServerConfig;

/// Messages from session tasks back to the server loop
#[derive(Debug)]
pub(crate) enum HubEvent {
    /// Handshake done; the loop may start feeding `queue`
    Opened {
        id: ConnectionId,
        queue: flume::Sender<EncodedFrame>,
    },
    /// The client sent a close frame
    PeerClosing { id: ConnectionId },
    /// The task is over
    Finished { id: ConnectionId, reason: CloseReason },
}

/// Reports `Finished` however the task ends, including abort and panic
struct FinishGuard {
    id: ConnectionId,
    events: flume::Sender<HubEvent>,
    reason: CloseReason,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        let reason = std::mem::replace(&mut self.reason, CloseReason::Normal);
        let _ = self.events.send(HubEvent::Finished {
            id: self.id,
            reason,
        });
    }
}

pub(crate) async fn run_session(
    id: ConnectionId,
    stream: TcpStream,
    config: Arc<ServerConfig>,
    events: flume::Sender<HubEvent>,
) {
    let mut guard = FinishGuard {
        id,
        events: events.clone(),
        reason: CloseReason::Abrupt("session aborted".into()),
    };

    guard.reason = match serve(id, stream, &config, &events).await {
        Ok(()) => CloseReason::Normal,
        Err(e) => {
            debug!(connection = %id, error = %e, "Session ended with error");
            if e.is_network_failure() {
                CloseReason::Abrupt(e.to_string())
            } else {
                CloseReason::Error(e.to_string())
            }
        }
    };
}

async fn serve(
    id: ConnectionId,
    stream: TcpStream,
    config: &ServerConfig,
    events: &flume::Sender<HubEvent>,
) -> Result<(), ServerError> {
    let ws = timeout(
        config.handshake_timeout(),
        tokio_tungstenite::accept_async(stream),
    )
    .await
    .map_err(|_| ServerError::HandshakeTimeout)??;

    let (queue_tx, queue_rx) = flume::bounded::<EncodedFrame>(config.queue_depth.max(1));
    if events.send(HubEvent::Opened { id, queue: queue_tx }).is_err() {
        // Server loop is gone
        return Ok(());
    }

    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            outbound = queue_rx.recv_async() => match outbound {
                Ok(frame) => {
                    timeout(config.write_timeout(), sink.send(Message::Text(frame.payload)))
                        .await
                        .map_err(|_| ServerError::WriteTimeout)??;
                    metrics::counter!("broadcast_frames_sent").increment(1);
                }
                // Sender dropped and queue drained: the server is closing us
                Err(_) => break,
            },
            inbound = source.next() => match inbound {
                Some(Ok(Message::Close(_))) => {
                    let _ = events.send(HubEvent::PeerClosing { id });
                    break;
                }
                // Clients have nothing to say on this channel
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into()),
            },
        }
    }

    // Best effort close frame; the socket is dropped either way
    let _ = timeout(config.write_timeout(), sink.close()).await;
    Ok(())
}
