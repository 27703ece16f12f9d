//! SDL2 Window Display
//! Provides an SDL2 window as a render backend for the local preview.
//! Uses the sdl2 crate for window management and rendering, with vsync
//! pacing the refresh loop.

use std::time::Duration;

use sdl2::event::{Event, WindowEvent};
use sdl2::keyboard::Keycode;
use sdl2::pixels::PixelFormatEnum;
use sdl2::rect::Rect;
use sdl2::render::{Canvas, TextureCreator};
use sdl2::video::{Window, WindowContext};
use tracing::{error, info};

use crate::display::{DrawOutcome, RenderBackend, RenderConsumer};
use crate::error::RenderError;
use crate::pipeline::ModeSwitch;
use crate::transform::ProcessingMode;
use crate::DisplayConfig;

/// SDL2 window backend
/// Handles window creation and texture upload; the canvas presents with vsync.
pub struct SdlBackend {
    canvas: Canvas<Window>,
    texture_creator: TextureCreator<WindowContext>,
    ready: bool,
}

impl SdlBackend {
    pub fn new(sdl_context: &sdl2::Sdl, config: &DisplayConfig) -> Result<Self, RenderError> {
        let video_subsystem = sdl_context.video().map_err(RenderError::Resources)?;

        let window = video_subsystem
            .window("Framecast", config.width, config.height)
            .position_centered()
            .resizable()
            .build()
            .map_err(|e| RenderError::Resources(e.to_string()))?;

        let canvas = window
            .into_canvas()
            .present_vsync()
            .build()
            .map_err(|e| RenderError::Resources(e.to_string()))?;
        let texture_creator = canvas.texture_creator();

        Ok(Self {
            canvas,
            texture_creator,
            ready: false,
        })
    }
}

impl RenderBackend for SdlBackend {
    fn create_resources(&mut self) -> Result<(), RenderError> {
        self.ready = true;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.canvas.set_viewport(Rect::new(0, 0, width, height));
    }

    fn draw_rgba(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<(), RenderError> {
        if !self.ready {
            return Err(RenderError::Draw("resources not created".into()));
        }

        let mut texture = self
            .texture_creator
            .create_texture_streaming(PixelFormatEnum::RGBA32, width, height)
            .map_err(|e| RenderError::Draw(e.to_string()))?;

        texture
            .update(None, pixels, (width * 4) as usize)
            .map_err(|e| RenderError::Draw(e.to_string()))?;

        self.canvas.clear();
        self.canvas
            .copy(&texture, None, None)
            .map_err(RenderError::Draw)?;

        self.canvas.present();
        Ok(())
    }

    fn release_resources(&mut self) {
        self.ready = false;
    }
}

/// Run the window event loop until the window is closed.
///
/// `E` switches to edge detection, `P` to passthrough.
pub fn run_window(
    sdl_context: &sdl2::Sdl,
    consumer: &mut RenderConsumer<SdlBackend>,
    mode: &ModeSwitch,
) -> Result<(), RenderError> {
    let mut event_pump = sdl_context.event_pump().map_err(RenderError::Resources)?;

    'running: loop {
        for event in event_pump.poll_iter() {
            match event {
                Event::Quit { .. } => {
                    info!("Quit event received");
                    break 'running;
                }
                Event::KeyDown {
                    keycode: Some(key), ..
                } => {
                    if key == Keycode::E {
                        mode.set(ProcessingMode::EdgeDetect);
                    } else if key == Keycode::P {
                        mode.set(ProcessingMode::Passthrough);
                    } else if key == Keycode::Escape {
                        break 'running;
                    }
                }
                Event::Window {
                    win_event: WindowEvent::SizeChanged(width, height),
                    ..
                } => {
                    consumer.on_surface_changed(width.max(0) as u32, height.max(0) as u32);
                }
                _ => {}
            }
        }

        // present() blocks on vsync, which paces this loop once frames flow
        match consumer.on_draw_frame() {
            Ok(DrawOutcome::Drawn { .. }) => {}
            Ok(_) => std::thread::sleep(Duration::from_millis(5)),
            Err(e) => error!("Draw failed: {}", e),
        }
    }

    Ok(())
}
