//! # FRAMEBRIDGE
//!
//! Windowed host: the reference engine renders into its own linear memory
//! and the session presents each new frame as a full-window quad.
//!
//! ```text
//! winit ──Resized──────────► session.resize()
//!       ──Occluded(bool)───► session.set_visible()
//!       ──RedrawRequested──► session.tick(now)
//!       ──AboutToWait──────► window.request_redraw()
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use winit::dpi::LogicalSize;
use winit::event::{Event, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::WindowBuilder;

use framebridge_core::{
    FrameBridgeConfig, FrameRenderer, ReferenceEngine, RenderSession, SessionError, SurfaceSize, TickOutcome,
};
use framebridge_rendering::WgpuFrameBackend;

/// Command line.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `framebridge_core=trace`.
    #[arg(short, long)]
    log: Option<String>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => FrameBridgeConfig::load(path)?,
        None => FrameBridgeConfig::default(),
    };

    let filter = match &args.log {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log.filter))?,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    tracing::info!(config = ?args.config, "starting framebridge");

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(&config.window.title)
            .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
            .build(&event_loop)?,
    );

    let inner = window.inner_size();
    let size = SurfaceSize::new(inner.width, inner.height);
    let backend = WgpuFrameBackend::new(window.clone(), size, &config.render)?;
    let engine = ReferenceEngine::new(config.engine.initial_pages, config.engine.maximum_pages);
    let mut session = RenderSession::start(engine, FrameRenderer::new(backend), size, &config.timing)?;

    let mut fatal: Option<SessionError> = None;
    event_loop.run(|event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);

        match event {
            Event::WindowEvent { event, window_id } if window_id == window.id() => match event {
                WindowEvent::CloseRequested => elwt.exit(),
                WindowEvent::Resized(new_size) => {
                    if let Err(err) = session.resize(SurfaceSize::new(new_size.width, new_size.height)) {
                        tracing::error!(%err, "resize failed");
                        fatal = Some(err);
                        elwt.exit();
                    }
                }
                WindowEvent::Occluded(occluded) => session.set_visible(!occluded),
                WindowEvent::RedrawRequested => match session.tick(Instant::now()) {
                    Ok(TickOutcome::Rendered(report)) => {
                        tracing::trace!(version = report.version, upload = ?report.upload, "tick");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::error!(%err, "tick failed");
                        fatal = Some(err);
                        elwt.exit();
                    }
                },
                _ => {}
            },
            Event::Suspended => session.set_visible(false),
            Event::Resumed => session.set_visible(true),
            Event::AboutToWait => window.request_redraw(),
            _ => {}
        }
    })?;

    let stats = session.renderer().stats();
    tracing::info!(
        ticks = stats.ticks,
        uploads = stats.uploads,
        skipped_mismatch = stats.skipped_mismatch,
        skipped_invalid = stats.skipped_invalid,
        rebinds = stats.rebinds,
        upload_ratio = stats.upload_ratio(),
        "framebridge stopped"
    );

    match fatal {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}
