//! Producer side of the pipeline: raw frame in, published frame out

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam::utils::CachePadded;
use tokio::sync::watch;
use tracing::{instrument, trace, warn};

use crate::capture::RawFrame;
use crate::error::PipelineError;
use crate::pipeline::{LatestFrameSlot, ModeSwitch};
use crate::transform::{self, EdgeThresholds};

/// Runs the transform on every captured frame and publishes the result.
///
/// The capture source calls [`PipelineDriver::on_raw_frame`] sequentially.
/// Nothing here waits on a consumer: publishing is an atomic swap and the
/// broadcast notification is a non-blocking watch update.
pub struct PipelineDriver {
    slot: Arc<LatestFrameSlot>,
    mode: Arc<ModeSwitch>,
    thresholds: EdgeThresholds,
    next_sequence: AtomicU64,
    notify: watch::Sender<u64>,
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_received: AtomicU64,
    frames_published: AtomicU64,
    frames_dropped: AtomicU64,
}

/// Point-in-time copy of the driver counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub frames_received: u64,
    pub frames_published: u64,
    pub frames_dropped: u64,
}

impl PipelineDriver {
    pub fn new(
        slot: Arc<LatestFrameSlot>,
        mode: Arc<ModeSwitch>,
        thresholds: EdgeThresholds,
    ) -> Self {
        let (notify, _) = watch::channel(0);

        Self {
            slot,
            mode,
            thresholds,
            next_sequence: AtomicU64::new(1),
            notify,
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Process one NV21 buffer; returns the sequence number it was published under.
    ///
    /// A malformed buffer is dropped, but its sequence number is still consumed.
    #[instrument(skip(self, buffer), fields(len = buffer.len()))]
    pub fn on_raw_frame(&self, buffer: &[u8], width: u32, height: u32) -> Result<u64, PipelineError> {
        let started = Instant::now();
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        // Read once so the whole frame sees a single mode
        let mode = self.mode.get();

        self.stats.frames_received.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_received").increment(1);

        let frame = RawFrame::new(buffer, width, height)
            .and_then(|raw| transform::transform(&raw, mode, self.thresholds, sequence));

        let frame = match frame {
            Ok(frame) => frame,
            Err(source) => {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("frames_dropped").increment(1);
                warn!(sequence, width, height, error = %source, "Dropping malformed frame");
                return Err(PipelineError::FrameDropped { sequence, source });
            }
        };

        self.slot.publish(frame);
        self.notify.send_replace(sequence);

        self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("frames_published").increment(1);

        let elapsed = started.elapsed();
        metrics::histogram!("frame_process_time_us").record(elapsed.as_micros() as f64);
        trace!(sequence, ?mode, elapsed_us = elapsed.as_micros() as u64, "Frame processed");

        Ok(sequence)
    }

    /// Notification channel carrying the sequence of the latest published frame
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    pub fn slot(&self) -> &Arc<LatestFrameSlot> {
        &self.slot
    }

    pub fn stats(&self) -> DriverStats {
        DriverStats {
            frames_received: self.stats.frames_received.load(Ordering::Relaxed),
            frames_published: self.stats.frames_published.load(Ordering::Relaxed),
            frames_dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
        }
    }
}
