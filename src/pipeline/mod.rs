pub mod driver;
pub mod mode;
pub mod slot;

pub use driver::{DriverStats, PipelineDriver};
pub use mode::ModeSwitch;
pub use slot::{LatestFrameSlot, SlotStats};
