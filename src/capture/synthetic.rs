//! Synthetic NV21 camera used when no platform capture source is attached

use std::time::{Duration, Instant};

use tracing::{info, instrument};

use crate::capture::RawFrame;
use crate::CaptureConfig;

/// Generates a moving test pattern in NV21 layout at a fixed frame rate
pub struct TestPatternSource {
    config: CaptureConfig,
    buffer: Vec<u8>,
    tick: u64,
    next_deadline: Option<Instant>,
}

impl TestPatternSource {
    pub fn new(config: CaptureConfig) -> Self {
        info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            "Initializing synthetic NV21 capture"
        );

        let buffer = vec![0u8; RawFrame::expected_len(config.width, config.height)];

        Self {
            config,
            buffer,
            tick: 0,
            next_deadline: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    /// Time between two frames at the configured rate
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.config.fps.max(1)))
    }

    /// Render the next pattern frame without pacing
    pub fn next_frame(&mut self) -> &[u8] {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let offset = self.tick as usize;

        let (luma, chroma) = self.buffer.split_at_mut(width * height);

        // Diagonal luma ramp with a bright vertical bar sweeping across
        let bar = (offset * 4) % width.max(1);
        for (y, row) in luma.chunks_exact_mut(width).enumerate() {
            for (x, px) in row.iter_mut().enumerate() {
                *px = if x.abs_diff(bar) < 8 {
                    235
                } else {
                    (16 + (x + y + offset) % 220) as u8
                };
            }
        }

        // Slowly cycling hue, V first then U
        for (i, pair) in chroma.chunks_exact_mut(2).enumerate() {
            let phase = (i / (width / 2).max(1) + offset) % 256;
            pair[0] = (64 + phase / 2) as u8;
            pair[1] = (192 - phase / 2) as u8;
        }

        self.tick += 1;
        &self.buffer
    }

    /// Block until the next frame is due, then render it
    #[instrument(skip(self))]
    pub fn capture_frame(&mut self) -> &[u8] {
        let interval = self.frame_interval();
        let now = Instant::now();
        let deadline = self.next_deadline.unwrap_or(now);

        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Do not try to catch up after a stall
        self.next_deadline = Some(deadline.max(now) + interval);

        self.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CaptureConfig {
        CaptureConfig {
            width: 16,
            height: 8,
            fps: 30,
        }
    }

    #[test]
    fn test_frames_are_valid_nv21() {
        let mut source = TestPatternSource::new(config());
        let frame = source.next_frame().to_vec();

        let raw = RawFrame::new(&frame, 16, 8).unwrap();
        assert!(raw.luma().iter().all(|&y| (16..=235).contains(&y)));
    }

    #[test]
    fn test_pattern_moves_between_frames() {
        let mut source = TestPatternSource::new(config());
        let first = source.next_frame().to_vec();
        let second = source.next_frame().to_vec();

        assert_ne!(first, second);
    }

    #[test]
    fn test_frame_interval_from_fps() {
        let source = TestPatternSource::new(config());

        let interval = source.frame_interval();
        assert!(interval > Duration::from_millis(33) && interval < Duration::from_millis(34));
    }
}
