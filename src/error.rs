//! Error types for every stage of the pipeline

use std::net::SocketAddr;

use thiserror::Error;

use crate::capture::PixelFormat;

/// A frame buffer that does not match its declared geometry
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame dimensions must be non-zero, got {width}x{height}")]
    EmptyDimensions { width: u32, height: u32 },

    #[error("{format:?} frame of {width}x{height} needs {expected} bytes, got {actual}")]
    LengthMismatch {
        format: PixelFormat,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Malformed capture input handed to the transform stage
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("NV21 frames need non-zero even dimensions, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("NV21 frame of {width}x{height} needs {expected} bytes, got {actual}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// A frame that was consumed by the driver but never published
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("frame {sequence} dropped: {source}")]
    FrameDropped {
        sequence: u64,
        #[source]
        source: TransformError,
    },
}

impl PipelineError {
    /// Sequence number that was consumed by the dropped frame
    pub fn sequence(&self) -> u64 {
        match self {
            PipelineError::FrameDropped { sequence, .. } => *sequence,
        }
    }
}

/// Compressing a frame for the network failed
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("jpeg encoding failed: {0}")]
    Jpeg(#[from] image::ImageError),
}

/// Render backend failures
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to create render resources: {0}")]
    Resources(String),

    #[error("draw failed: {0}")]
    Draw(String),
}

/// Broadcast server failures
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("broadcast server is already running on {0}")]
    AlreadyRunning(SocketAddr),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build network runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to spawn network thread: {0}")]
    Thread(#[source] std::io::Error),

    #[error("websocket handshake timed out")]
    HandshakeTimeout,

    #[error("outbound write timed out")]
    WriteTimeout,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// The peer or the network dropped the connection, as opposed to a
    /// timeout or protocol error on a working socket
    pub fn is_network_failure(&self) -> bool {
        use tokio_tungstenite::tungstenite::error::ProtocolError;
        use tokio_tungstenite::tungstenite::Error as WsError;

        match self {
            ServerError::Io(e) => is_disconnect(e.kind()),
            ServerError::WebSocket(WsError::Io(e)) => is_disconnect(e.kind()),
            ServerError::WebSocket(WsError::Protocol(
                ProtocolError::ResetWithoutClosingHandshake,
            )) => true,
            _ => false,
        }
    }
}

fn is_disconnect(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind;

    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
    )
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
