//! Host-facing handle of the broadcast server

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::error::ServerError;
use crate::pipeline::LatestFrameSlot;
use crate::server::hub::{Hub, ServerShared};
use crate::server::ServerConfig;

/// Point-in-time copy of the server counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub open_connections: usize,
    /// Frames encoded and offered to connections
    pub frames_broadcast: u64,
    /// Per-connection enqueues, summed
    pub frames_enqueued: u64,
    /// Per-connection drops because a queue was full, summed
    pub frames_dropped: u64,
    pub encode_failures: u64,
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    thread: JoinHandle<()>,
}

/// WebSocket broadcast of the latest processed frame.
///
/// The network loop runs on its own thread with its own runtime. `start`
/// binds synchronously so failures reach the caller; `stop` returns only
/// after that thread has exited.
pub struct BroadcastServer {
    config: Arc<ServerConfig>,
    slot: Arc<LatestFrameSlot>,
    frames: watch::Receiver<u64>,
    shared: Arc<ServerShared>,
    running: Mutex<Option<RunningServer>>,
}

impl BroadcastServer {
    pub fn new(
        config: ServerConfig,
        slot: Arc<LatestFrameSlot>,
        frames: watch::Receiver<u64>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            slot,
            frames,
            shared: Arc::new(ServerShared::default()),
            running: Mutex::new(None),
        }
    }

    /// Bind `port` on the configured interface and start accepting clients.
    ///
    /// Returns the bound address (useful with port 0).
    #[instrument(skip(self))]
    pub fn start(&self, port: u16) -> Result<SocketAddr, ServerError> {
        let mut running = self.running.lock();
        if let Some(server) = running.as_ref() {
            return Err(ServerError::AlreadyRunning(server.local_addr));
        }

        let addr = self.config.addr(port);
        let listener =
            std::net::TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut frames = self.frames.clone();
        // Only frames published from now on are broadcast
        frames.borrow_and_update();

        let hub = Hub::new(
            Arc::clone(&self.config),
            Arc::clone(&self.slot),
            frames,
            shutdown_rx,
            Arc::clone(&self.shared),
        );

        let (ready_tx, ready_rx) = flume::bounded::<Result<(), ServerError>>(1);
        let worker_threads = self.config.worker_threads.max(1);
        let grace = self.config.shutdown_grace();

        let thread = std::thread::Builder::new()
            .name("framecast-server".into())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(worker_threads)
                    .thread_name("framecast-net")
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(ServerError::Runtime(e)));
                        return;
                    }
                };

                runtime.block_on(async move {
                    match TcpListener::from_std(listener) {
                        Ok(listener) => {
                            let _ = ready_tx.send(Ok(()));
                            hub.run(listener).await;
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(ServerError::Io(e)));
                        }
                    }
                });

                // Nothing spawned on this runtime outlives the thread
                runtime.shutdown_timeout(grace);
                debug!("Network thread exited");
            })
            .map_err(ServerError::Thread)?;

        let started = ready_rx.recv().unwrap_or_else(|_| {
            Err(ServerError::Thread(io::Error::other(
                "network thread exited during startup",
            )))
        });
        if let Err(e) = started {
            if thread.join().is_err() {
                error!("Network thread panicked during startup");
            }
            return Err(e);
        }

        info!(addr = %local_addr, "Broadcast server listening");
        *running = Some(RunningServer {
            local_addr,
            shutdown: shutdown_tx,
            thread,
        });

        Ok(local_addr)
    }

    /// Close all connections and the listener, then wait for the network
    /// thread to exit. A no-op when not running.
    pub fn stop(&self) {
        let mut running = self.running.lock();
        let Some(server) = running.take() else {
            return;
        };

        info!(addr = %server.local_addr, "Stopping broadcast server");
        server.shutdown.send_replace(true);

        if server.thread.join().is_err() {
            error!("Network thread panicked");
        }
        info!("Broadcast server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|server| server.local_addr)
    }

    /// Connections that completed the handshake and are receiving frames
    pub fn connection_count(&self) -> usize {
        self.shared.open_connections.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            open_connections: self.shared.open_connections.load(Ordering::Relaxed),
            frames_broadcast: self.shared.frames_broadcast.load(Ordering::Relaxed),
            frames_enqueued: self.shared.frames_enqueued.load(Ordering::Relaxed),
            frames_dropped: self.shared.frames_dropped.load(Ordering::Relaxed),
            encode_failures: self.shared.encode_failures.load(Ordering::Relaxed),
        }
    }
}

impl Drop for BroadcastServer {
    fn drop(&mut self) {
        self.stop();
    }
}
