//! Refresh-driven consumer of the latest-frame slot

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, instrument};

use crate::error::RenderError;
use crate::pipeline::LatestFrameSlot;
use crate::{Frame, PixelFormat};

/// GPU/window side of the renderer: owns the texture and program
pub trait RenderBackend {
    /// Create texture, program and any other draw resources
    fn create_resources(&mut self) -> Result<(), RenderError>;

    /// Viewport size changed
    fn resize(&mut self, width: u32, height: u32);

    /// Upload a tightly packed RGBA image and draw it
    fn draw_rgba(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<(), RenderError>;

    /// Release whatever `create_resources` created; may be called repeatedly
    fn release_resources(&mut self);
}

/// What a single refresh did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// Resources not created (before `init` or after `teardown`)
    NotInitialized,
    /// Nothing published yet
    Empty,
    Drawn { sequence: u64 },
}

/// Draws the most recent processed frame once per display refresh.
///
/// Only ever reads the slot: never transforms, never touches the network,
/// never waits for a new frame.
pub struct RenderConsumer<B: RenderBackend> {
    backend: B,
    slot: Arc<LatestFrameSlot>,
    initialized: bool,
    last_sequence: Option<u64>,
}

impl<B: RenderBackend> RenderConsumer<B> {
    pub fn new(slot: Arc<LatestFrameSlot>, backend: B) -> Self {
        Self {
            backend,
            slot,
            initialized: false,
            last_sequence: None,
        }
    }

    /// Create draw resources; failures are returned to the host while the
    /// rest of the pipeline keeps running
    #[instrument(skip(self))]
    pub fn init(&mut self) -> Result<(), RenderError> {
        if self.initialized {
            return Ok(());
        }

        self.backend.create_resources()?;
        self.initialized = true;
        info!("Render resources created");
        Ok(())
    }

    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        debug!(width, height, "Surface changed");
        self.backend.resize(width, height);
    }

    /// Draw whatever is latest; a missing frame is not an error
    pub fn on_draw_frame(&mut self) -> Result<DrawOutcome, RenderError> {
        if !self.initialized {
            return Ok(DrawOutcome::NotInitialized);
        }

        let Some(frame) = self.slot.read() else {
            return Ok(DrawOutcome::Empty);
        };

        let render_start = Instant::now();

        let rgba = to_rgba(&frame);
        self.backend
            .draw_rgba(&rgba, frame.width(), frame.height())?;

        if self.last_sequence != Some(frame.sequence()) {
            metrics::histogram!("frame_latency_ms")
                .record(frame.timestamp().elapsed().as_secs_f64() * 1000.0);
            self.last_sequence = Some(frame.sequence());
        }
        metrics::histogram!("render_time_us").record(render_start.elapsed().as_micros() as f64);

        Ok(DrawOutcome::Drawn {
            sequence: frame.sequence(),
        })
    }

    /// Release draw resources; safe without a prior `init`
    pub fn teardown(&mut self) {
        if self.initialized {
            info!("Releasing render resources");
        }
        self.backend.release_resources();
        self.initialized = false;
        self.last_sequence = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Sequence of the frame drawn most recently
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// Frame pixels as RGBA, borrowing when no conversion is needed
pub fn to_rgba(frame: &Frame) -> Cow<'_, [u8]> {
    match frame.format() {
        PixelFormat::Rgba32 => Cow::Borrowed(&frame.data()[..]),
        PixelFormat::Rgb24 => {
            let mut rgba = Vec::with_capacity(frame.data().len() / 3 * 4);
            for chunk in frame.data().chunks_exact(3) {
                rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
            }
            Cow::Owned(rgba)
        }
        PixelFormat::Gray8 => {
            let mut rgba = Vec::with_capacity(frame.data().len() * 4);
            for &v in frame.data().iter() {
                rgba.extend_from_slice(&[v, v, v, 255]);
            }
            Cow::Owned(rgba)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingBackend {
        fail_create: bool,
        created: usize,
        released: usize,
        viewport: Option<(u32, u32)>,
        draws: Vec<(usize, u32, u32)>,
    }

    impl RenderBackend for RecordingBackend {
        fn create_resources(&mut self) -> Result<(), RenderError> {
            if self.fail_create {
                return Err(RenderError::Resources("no gpu".into()));
            }
            self.created += 1;
            Ok(())
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.viewport = Some((width, height));
        }

        fn draw_rgba(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<(), RenderError> {
            self.draws.push((pixels.len(), width, height));
            Ok(())
        }

        fn release_resources(&mut self) {
            self.released += 1;
        }
    }

    fn publish(slot: &LatestFrameSlot, sequence: u64, format: PixelFormat) {
        let data = vec![9u8; format.frame_len(4, 2)];
        slot.publish(Frame::new(data, 4, 2, format, sequence).unwrap());
    }

    #[test]
    fn test_draw_before_init_is_noop() {
        let slot = Arc::new(LatestFrameSlot::new());
        publish(&slot, 1, PixelFormat::Rgba32);
        let mut consumer = RenderConsumer::new(slot, RecordingBackend::default());

        assert_eq!(consumer.on_draw_frame().unwrap(), DrawOutcome::NotInitialized);
        assert!(consumer.backend().draws.is_empty());
    }

    #[test]
    fn test_empty_slot_is_noop() {
        let slot = Arc::new(LatestFrameSlot::new());
        let mut consumer = RenderConsumer::new(slot, RecordingBackend::default());
        consumer.init().unwrap();

        assert_eq!(consumer.on_draw_frame().unwrap(), DrawOutcome::Empty);
        assert!(consumer.backend().draws.is_empty());
    }

    #[test]
    fn test_draws_latest_each_refresh() {
        let slot = Arc::new(LatestFrameSlot::new());
        let mut consumer = RenderConsumer::new(slot.clone(), RecordingBackend::default());
        consumer.init().unwrap();

        publish(&slot, 1, PixelFormat::Rgba32);
        publish(&slot, 2, PixelFormat::Rgba32);
        assert_eq!(consumer.on_draw_frame().unwrap(), DrawOutcome::Drawn { sequence: 2 });
        // No new frame: redraw the same one
        assert_eq!(consumer.on_draw_frame().unwrap(), DrawOutcome::Drawn { sequence: 2 });

        assert_eq!(consumer.backend().draws, vec![(32, 4, 2), (32, 4, 2)]);
        assert_eq!(consumer.last_sequence(), Some(2));
    }

    #[test]
    fn test_gray_and_rgb_are_expanded_to_rgba() {
        let slot = Arc::new(LatestFrameSlot::new());
        let mut consumer = RenderConsumer::new(slot.clone(), RecordingBackend::default());
        consumer.init().unwrap();

        publish(&slot, 1, PixelFormat::Gray8);
        consumer.on_draw_frame().unwrap();
        publish(&slot, 2, PixelFormat::Rgb24);
        consumer.on_draw_frame().unwrap();

        assert_eq!(consumer.backend().draws, vec![(32, 4, 2), (32, 4, 2)]);
    }

    #[test]
    fn test_to_rgba_gray_values() {
        let frame = Frame::new(vec![7u8, 200], 2, 1, PixelFormat::Gray8, 1).unwrap();

        assert_eq!(&*to_rgba(&frame), &[7, 7, 7, 255, 200, 200, 200, 255]);
    }

    #[test]
    fn test_init_failure_is_reported_and_leaves_consumer_idle() {
        let slot = Arc::new(LatestFrameSlot::new());
        publish(&slot, 1, PixelFormat::Rgba32);
        let backend = RecordingBackend {
            fail_create: true,
            ..Default::default()
        };
        let mut consumer = RenderConsumer::new(slot, backend);

        assert!(matches!(consumer.init(), Err(RenderError::Resources(_))));
        assert!(!consumer.is_initialized());
        assert_eq!(consumer.on_draw_frame().unwrap(), DrawOutcome::NotInitialized);
    }

    #[test]
    fn test_teardown_without_init_is_safe() {
        let slot = Arc::new(LatestFrameSlot::new());
        let mut consumer = RenderConsumer::new(slot, RecordingBackend::default());

        consumer.teardown();
        consumer.teardown();

        assert_eq!(consumer.backend().released, 2);
        assert!(!consumer.is_initialized());
    }

    #[test]
    fn test_surface_changed_reaches_backend() {
        let slot = Arc::new(LatestFrameSlot::new());
        let mut consumer = RenderConsumer::new(slot, RecordingBackend::default());

        consumer.on_surface_changed(1280, 720);

        assert_eq!(consumer.backend().viewport, Some((1280, 720)));
    }
}
