use std::sync::atomic::{AtomicU8, Ordering};

use tracing::info;

use crate::transform::ProcessingMode;

/// Process-wide processing mode flag.
///
/// Written by the host from any thread, read once by the driver at the start
/// of each frame, so a change lands on the next frame boundary.
#[derive(Debug)]
pub struct ModeSwitch {
    mode: AtomicU8,
}

const EDGE_DETECT: u8 = 1;
const PASSTHROUGH: u8 = 0;

impl ModeSwitch {
    pub fn new(initial: ProcessingMode) -> Self {
        Self {
            mode: AtomicU8::new(encode(initial)),
        }
    }

    pub fn set(&self, mode: ProcessingMode) {
        let previous = self.mode.swap(encode(mode), Ordering::Release);
        if previous != encode(mode) {
            info!(?mode, "Processing mode changed");
        }
    }

    pub fn get(&self) -> ProcessingMode {
        match self.mode.load(Ordering::Acquire) {
            EDGE_DETECT => ProcessingMode::EdgeDetect,
            _ => ProcessingMode::Passthrough,
        }
    }
}

fn encode(mode: ProcessingMode) -> u8 {
    match mode {
        ProcessingMode::EdgeDetect => EDGE_DETECT,
        ProcessingMode::Passthrough => PASSTHROUGH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let switch = ModeSwitch::new(ProcessingMode::EdgeDetect);
        assert_eq!(switch.get(), ProcessingMode::EdgeDetect);

        switch.set(ProcessingMode::Passthrough);
        assert_eq!(switch.get(), ProcessingMode::Passthrough);
    }
}
