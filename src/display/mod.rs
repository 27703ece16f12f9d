pub mod headless;
pub mod renderer;

#[cfg(feature = "sdl-display")]
pub mod sdl;

pub use headless::HeadlessBackend;
pub use renderer::{DrawOutcome, RenderBackend, RenderConsumer};

#[cfg(feature = "sdl-display")]
pub use sdl::SdlBackend;
