use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Immutable processed frame, shared read-only once published
#[derive(Clone)]
pub struct Frame {
    /// Pixel data - can be shared across threads without copying
    data: Bytes,

    /// Frame metadata
    meta: FrameMetadata,

    /// Creation timestamp for latency tracking
    timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Pixel formats a processed frame can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Gray8,
    Rgb24,
    Rgba32,
}

impl PixelFormat {
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba32 => 4,
        }
    }

    /// Buffer length required for a frame of the given size
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

impl Frame {
    /// Build a frame, checking that the buffer matches the declared geometry
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        format: PixelFormat,
        sequence: u64,
    ) -> Result<Self, FrameError> {
        let data = data.into();

        if width == 0 || height == 0 {
            return Err(FrameError::EmptyDimensions { width, height });
        }

        let expected = format.frame_len(width, height);
        if data.len() != expected {
            return Err(FrameError::LengthMismatch {
                format,
                width,
                height,
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            data,
            meta: FrameMetadata {
                sequence,
                width,
                height,
                format,
            },
            timestamp: Instant::now(),
        })
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn meta(&self) -> &FrameMetadata {
        &self.meta
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn format(&self) -> PixelFormat {
        self.meta.format
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("meta", &self.meta)
            .field("len", &self.data.len())
            .finish()
    }
}
