//! Lock-free latest-frame slot shared between the producer and all consumers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam::utils::CachePadded;

use crate::Frame;

/// Single-writer, multi-reader holder of the most recent processed frame.
///
/// Publishing swaps in a new immutable `Arc<Frame>`; readers get their own
/// reference, so a frame they hold is never touched by a later publish.
/// Frames nobody read before the next publish are simply dropped.
pub struct LatestFrameSlot {
    current: ArcSwapOption<Frame>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_published: AtomicU64,
    frames_superseded: AtomicU64,
    reads: AtomicU64,
}

/// Point-in-time copy of the slot counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub frames_published: u64,
    /// Frames replaced before any reader fetched them
    pub frames_superseded: u64,
    pub reads: u64,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::empty(),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: replace the held frame; never waits on readers
    pub fn publish(&self, frame: Frame) {
        let previous = self.current.swap(Some(Arc::new(frame)));

        self.stats.frames_published.fetch_add(1, Ordering::Relaxed);
        // Only the slot itself holds an unread frame
        if previous.is_some_and(|prev| Arc::strong_count(&prev) == 1) {
            self.stats.frames_superseded.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Consumer: most recently published frame, if any
    pub fn read(&self) -> Option<Arc<Frame>> {
        let frame = self.current.load_full();
        if frame.is_some() {
            self.stats.reads.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Sequence number of the held frame without taking a reference
    pub fn latest_sequence(&self) -> Option<u64> {
        (*self.current.load()).as_ref().map(|frame| frame.sequence())
    }

    pub fn is_empty(&self) -> bool {
        self.current.load().is_none()
    }

    /// Drop the held frame; readers keep whatever they already hold
    pub fn clear(&self) {
        self.current.store(None);
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            frames_published: self.stats.frames_published.load(Ordering::Relaxed),
            frames_superseded: self.stats.frames_superseded.load(Ordering::Relaxed),
            reads: self.stats.reads.load(Ordering::Relaxed),
        }
    }
}

impl Default for LatestFrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PixelFormat;

    fn frame(sequence: u64, fill: u8) -> Frame {
        Frame::new(vec![fill; 2 * 2 * 4], 2, 2, PixelFormat::Rgba32, sequence).unwrap()
    }

    #[test]
    fn test_empty_until_first_publish() {
        let slot = LatestFrameSlot::new();

        assert!(slot.read().is_none());
        assert!(slot.is_empty());
        assert_eq!(slot.latest_sequence(), None);
    }

    #[test]
    fn test_read_returns_latest() {
        let slot = LatestFrameSlot::new();
        slot.publish(frame(1, 1));
        slot.publish(frame(2, 2));

        let latest = slot.read().unwrap();
        assert_eq!(latest.sequence(), 2);
        assert_eq!(slot.latest_sequence(), Some(2));
    }

    #[test]
    fn test_held_reference_survives_publish() {
        let slot = LatestFrameSlot::new();
        slot.publish(frame(1, 0xAA));

        let held = slot.read().unwrap();
        slot.publish(frame(2, 0xBB));

        assert_eq!(held.sequence(), 1);
        assert!(held.data().iter().all(|&b| b == 0xAA));
        assert_eq!(slot.read().unwrap().sequence(), 2);
    }

    #[test]
    fn test_superseded_counts_unread_frames() {
        let slot = LatestFrameSlot::new();
        slot.publish(frame(1, 0));
        slot.publish(frame(2, 0)); // frame 1 never read
        let _held = slot.read();
        slot.publish(frame(3, 0)); // frame 2 still held by a reader

        let stats = slot.stats();
        assert_eq!(stats.frames_published, 3);
        assert_eq!(stats.frames_superseded, 1);
        assert_eq!(stats.reads, 1);
    }

    #[test]
    fn test_clear_keeps_reader_copy() {
        let slot = LatestFrameSlot::new();
        slot.publish(frame(5, 5));
        let held = slot.read().unwrap();

        slot.clear();

        assert!(slot.read().is_none());
        assert_eq!(held.sequence(), 5);
    }
}
