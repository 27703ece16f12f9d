//! Host-owned pipeline context.
//!
//! Everything the host's lifecycle callbacks touch lives here: the mode flag,
//! the latest-frame slot, the driver and the broadcast server. The context is
//! created by [`PipelineContext::new`] and released by
//! [`PipelineContext::teardown`] (or on drop); there is no process-global state.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::display::{RenderBackend, RenderConsumer};
use crate::error::{PipelineError, ServerError};
use crate::pipeline::{DriverStats, LatestFrameSlot, ModeSwitch, PipelineDriver};
use crate::server::{BroadcastServer, ServerStats};
use crate::transform::ProcessingMode;
use crate::Config;

pub struct PipelineContext {
    config: Config,
    mode: Arc<ModeSwitch>,
    slot: Arc<LatestFrameSlot>,
    driver: PipelineDriver,
    server: BroadcastServer,
    torn_down: AtomicBool,
}

impl PipelineContext {
    pub fn new(config: Config) -> Self {
        let mode = Arc::new(ModeSwitch::new(config.pipeline.initial_mode));
        let slot = Arc::new(LatestFrameSlot::new());
        let driver = PipelineDriver::new(
            Arc::clone(&slot),
            Arc::clone(&mode),
            config.pipeline.thresholds(),
        );
        let server = BroadcastServer::new(
            config.server.clone(),
            Arc::clone(&slot),
            driver.subscribe(),
        );

        info!(mode = ?config.pipeline.initial_mode, "Pipeline context created");

        Self {
            config,
            mode,
            slot,
            driver,
            server,
            torn_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Host entry point: `1` selects edge detection, anything else passthrough
    pub fn set_processing_mode(&self, mode: i32) {
        self.mode.set(ProcessingMode::from_raw(mode));
    }

    pub fn set_mode(&self, mode: ProcessingMode) {
        self.mode.set(mode);
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode.get()
    }

    pub fn mode_switch(&self) -> &Arc<ModeSwitch> {
        &self.mode
    }

    /// Capture callback; see [`PipelineDriver::on_raw_frame`]
    pub fn on_raw_frame(&self, buffer: &[u8], width: u32, height: u32) -> Result<u64, PipelineError> {
        self.driver.on_raw_frame(buffer, width, height)
    }

    /// A renderer reading this context's slot through `backend`
    pub fn render_consumer<B: RenderBackend>(&self, backend: B) -> RenderConsumer<B> {
        RenderConsumer::new(Arc::clone(&self.slot), backend)
    }

    /// Start the broadcast server; bind errors are returned here
    pub fn start(&self, port: u16) -> Result<SocketAddr, ServerError> {
        self.server.start(port)
    }

    /// Stop the broadcast server; a no-op when it is not running
    pub fn stop(&self) {
        self.server.stop();
    }

    pub fn slot(&self) -> &Arc<LatestFrameSlot> {
        &self.slot
    }

    pub fn server(&self) -> &BroadcastServer {
        &self.server
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.server.connection_count()
    }

    pub fn driver_stats(&self) -> DriverStats {
        self.driver.stats()
    }

    pub fn server_stats(&self) -> ServerStats {
        self.server.stats()
    }

    /// Stop the server and release the held frame. Idempotent.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.server.stop();
        self.slot.clear();

        let stats = self.driver.stats();
        info!(
            received = stats.frames_received,
            published = stats.frames_published,
            dropped = stats.frames_dropped,
            "Pipeline context torn down"
        );
    }
}

impl Drop for PipelineContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RawFrame;
    use crate::display::HeadlessBackend;
    use crate::display::DrawOutcome;
    use std::net::{IpAddr, Ipv4Addr};

    fn context() -> PipelineContext {
        let mut config = Config::default();
        config.server = config.server.bind(IpAddr::V4(Ipv4Addr::LOCALHOST));
        PipelineContext::new(config)
    }

    fn nv21(width: u32, height: u32) -> Vec<u8> {
        let mut data: Vec<u8> = (0..width * height).map(|i| (i % 200 + 16) as u8).collect();
        data.resize(RawFrame::expected_len(width, height), 128);
        data
    }

    #[test]
    fn test_starts_in_configured_mode() {
        let ctx = context();

        assert_eq!(ctx.mode(), ProcessingMode::EdgeDetect);
    }

    #[test]
    fn test_raw_mode_values() {
        let ctx = context();

        ctx.set_processing_mode(0);
        assert_eq!(ctx.mode(), ProcessingMode::Passthrough);
        ctx.set_processing_mode(1);
        assert_eq!(ctx.mode(), ProcessingMode::EdgeDetect);
        ctx.set_processing_mode(7);
        assert_eq!(ctx.mode(), ProcessingMode::Passthrough);
    }

    #[test]
    fn test_frames_reach_renderer() {
        let ctx = context();
        let mut renderer = ctx.render_consumer(HeadlessBackend::new());
        renderer.init().unwrap();

        assert_eq!(renderer.on_draw_frame().unwrap(), DrawOutcome::Empty);

        let sequence = ctx.on_raw_frame(&nv21(8, 8), 8, 8).unwrap();
        assert_eq!(
            renderer.on_draw_frame().unwrap(),
            DrawOutcome::Drawn { sequence }
        );
        assert_eq!(renderer.backend().frames_drawn(), 1);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let ctx = context();
        ctx.start(0).unwrap();
        ctx.on_raw_frame(&nv21(8, 8), 8, 8).unwrap();

        ctx.teardown();
        ctx.teardown();

        assert!(!ctx.server().is_running());
        assert!(ctx.slot().read().is_none());
    }

    #[test]
    fn test_stop_without_start() {
        let ctx = context();

        ctx.stop();
        ctx.stop();

        assert!(ctx.local_addr().is_none());
        assert_eq!(ctx.connection_count(), 0);
    }
}
