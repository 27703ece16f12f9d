//! Framecast: camera frames to a local preview and a WebSocket broadcast

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use color_eyre::Result;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use framecast::capture::TestPatternSource;
use framecast::{Config, PipelineContext};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framecast=debug")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Framecast launching...");

    // Load configuration
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    let port = config.server.port;

    let ctx = Arc::new(PipelineContext::new(config.clone()));
    let addr = ctx.start(port)?;
    info!("Broadcasting on ws://{}", addr);

    let shutdown = Arc::new(AtomicBool::new(false));

    // Spawn capture thread
    let capture_handle = {
        let ctx = Arc::clone(&ctx);
        let shutdown = Arc::clone(&shutdown);
        let mut source = TestPatternSource::new(config.capture.clone());

        thread::Builder::new()
            .name("framecast-capture".into())
            .spawn(move || {
                let (width, height) = (source.width(), source.height());
                while !shutdown.load(Ordering::Relaxed) {
                    let buffer = source.capture_frame();
                    if let Err(e) = ctx.on_raw_frame(buffer, width, height) {
                        warn!("Capture frame rejected: {}", e);
                    }
                }
            })?
    };

    run_display(&ctx, &config, &shutdown).await?;

    shutdown.store(true, Ordering::Relaxed);
    if capture_handle.join().is_err() {
        error!("Capture thread panicked");
    }

    let stats = ctx.server_stats();
    info!(
        broadcast = stats.frames_broadcast,
        enqueued = stats.frames_enqueued,
        dropped = stats.frames_dropped,
        "Broadcast totals"
    );
    ctx.teardown();

    info!("Framecast shutting down");
    Ok(())
}

/// SDL2 preview window on the main thread; closing it (or Ctrl-C) ends the run
#[cfg(feature = "sdl-display")]
async fn run_display(
    ctx: &PipelineContext,
    config: &Config,
    _shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    use color_eyre::eyre::eyre;
    use framecast::display::{sdl, SdlBackend};

    let sdl_context = sdl2::init().map_err(|e| eyre!(e))?;
    let backend = SdlBackend::new(&sdl_context, &config.display)?;

    let mut renderer = ctx.render_consumer(backend);
    renderer.init()?;
    renderer.on_surface_changed(config.display.width, config.display.height);

    info!("Press E for edge detection, P for passthrough");
    let result = sdl::run_window(&sdl_context, &mut renderer, ctx.mode_switch());
    renderer.teardown();

    Ok(result?)
}

/// Headless render loop at the display refresh rate until Ctrl-C
#[cfg(not(feature = "sdl-display"))]
async fn run_display(
    ctx: &PipelineContext,
    config: &Config,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    use framecast::display::{DrawOutcome, HeadlessBackend};

    let mut renderer = ctx.render_consumer(HeadlessBackend::new());
    renderer.init()?;
    renderer.on_surface_changed(config.display.width, config.display.height);

    let interval = Duration::from_secs_f64(1.0 / f64::from(config.display.refresh_hz.max(1)));
    let render_shutdown = Arc::clone(shutdown);

    let render_handle = thread::Builder::new()
        .name("framecast-render".into())
        .spawn(move || {
            let mut report_start = Instant::now();
            let mut new_frames = 0u64;
            let mut last_drawn = None;

            while !render_shutdown.load(Ordering::Relaxed) {
                let refresh_start = Instant::now();

                match renderer.on_draw_frame() {
                    Ok(DrawOutcome::Drawn { sequence }) => {
                        if last_drawn != Some(sequence) {
                            new_frames += 1;
                            last_drawn = Some(sequence);
                        }
                    }
                    Ok(_) => {}
                    Err(e) => error!("Draw failed: {}", e),
                }

                let elapsed = report_start.elapsed();
                if elapsed > Duration::from_secs(1) {
                    info!("render: {:.1}fps", new_frames as f64 / elapsed.as_secs_f64());
                    report_start = Instant::now();
                    new_frames = 0;
                }

                if let Some(remaining) = interval.checked_sub(refresh_start.elapsed()) {
                    thread::sleep(remaining);
                }
            }

            renderer.teardown();
        })?;

    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received");

    shutdown.store(true, Ordering::Relaxed);
    if render_handle.join().is_err() {
        error!("Render thread panicked");
    }

    Ok(())
}
