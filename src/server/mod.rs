//! WebSocket broadcast of processed frames to remote viewers
//!
//! Frames are JPEG-compressed once per sequence and offered to every open
//! connection through a small bounded queue. A full queue drops the new frame
//! for that connection only, so a slow viewer never stalls capture, rendering
//! or other viewers.

mod broadcast;
pub mod config;
pub mod connection;
pub mod encoder;
pub mod fanout;
mod hub;
mod session;

pub use broadcast::{BroadcastServer, ServerStats};
pub use config::ServerConfig;
pub use connection::{CloseReason, Connection, ConnectionId, ConnectionState, Delivery};
pub use encoder::{encode_frame, EncodedFrame};
pub use fanout::{FanoutReport, FanoutSet};
