pub mod frame;
pub mod raw;
pub mod synthetic;

pub use frame::Frame;
pub use frame::FrameMetadata;
pub use frame::PixelFormat;
pub use raw::RawFrame;
pub use synthetic::TestPatternSource;
