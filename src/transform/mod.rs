//! Per-frame image transform: NV21 capture buffer in, RGBA frame out.
//!
//! Pure and deterministic; holds no state between calls, so the driver can
//! invoke it on the capture thread without synchronization.

pub mod color;
pub mod edges;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capture::{Frame, PixelFormat, RawFrame};
use crate::error::TransformError;

pub use edges::EdgeThresholds;

/// What the transform stage does with each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    EdgeDetect,
    Passthrough,
}

impl ProcessingMode {
    /// Host-facing integer encoding: 1 selects edge detection, 0 passthrough
    pub fn from_raw(mode: i32) -> Self {
        match mode {
            1 => ProcessingMode::EdgeDetect,
            0 => ProcessingMode::Passthrough,
            other => {
                warn!(mode = other, "Unknown processing mode, using passthrough");
                ProcessingMode::Passthrough
            }
        }
    }

    pub fn as_raw(self) -> i32 {
        match self {
            ProcessingMode::EdgeDetect => 1,
            ProcessingMode::Passthrough => 0,
        }
    }
}

/// Transform one NV21 buffer into an RGBA frame tagged with `sequence`
pub fn transform(
    raw: &RawFrame<'_>,
    mode: ProcessingMode,
    thresholds: EdgeThresholds,
    sequence: u64,
) -> Result<Frame, TransformError> {
    let rgba = color::nv21_to_rgba(raw);

    let rgba = match mode {
        ProcessingMode::Passthrough => rgba,
        ProcessingMode::EdgeDetect => {
            let gray = color::rgba_to_gray(&rgba);
            let mask = edges::canny(
                &gray,
                raw.width() as usize,
                raw.height() as usize,
                thresholds,
            );
            mask.iter().flat_map(|&v| [v, v, v, 255]).collect()
        }
    };

    Ok(Frame::new(
        rgba,
        raw.width(),
        raw.height(),
        PixelFormat::Rgba32,
        sequence,
    )?)
}
