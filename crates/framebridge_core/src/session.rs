//! # Render Session
//!
//! Owns the foreign module and the renderer and drives them once per
//! display refresh.
//!
//! ```text
//! tick(now)
//!   ├─ first call ─────────────► Primed (timestamp only)
//!   ├─ hidden ─────────────────► Suspended
//!   ├─ first tick after show ──► SkippedAfterResume
//!   └─ otherwise
//!        module.update(dt) ─► module.render() ─► renderer.render_from(module)
//! ```
//!
//! `dt` is the wall-clock gap since the previous tick, clamped to
//! `max_frame_delta`. The timestamp advances on every tick, including
//! suspended and skipped ones, so the first simulated step after a long
//! pause is short.

use std::time::{Duration, Instant};

use thiserror::Error;

use crate::config::{ConfigError, TimingConfig};
use crate::foreign::{ForeignError, ForeignModule};
use crate::header::BindError;
use crate::renderer::{FrameBackend, FrameRenderer, SurfaceSize, TickReport};

/// Fatal session failures.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The foreign module failed.
    #[error(transparent)]
    Foreign(#[from] ForeignError),

    /// The timing configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The frame header could not be bound at startup.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// The GPU backend failed.
    #[error("render backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SessionError {
    fn backend<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// What one [`RenderSession::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// First tick: only the timestamp was recorded.
    Primed,
    /// The surface is hidden.
    Suspended,
    /// First visible tick after a hide; nothing ran.
    SkippedAfterResume,
    /// The module stepped and the renderer ran.
    Rendered(TickReport),
}

/// Host-loop state for one module and one renderer.
pub struct RenderSession<M: ForeignModule, B: FrameBackend> {
    module: M,
    renderer: FrameRenderer<B>,
    max_frame_delta: Duration,
    previous: Option<Instant>,
    visible: bool,
    skip_next_update: bool,
    last_dt: f32,
}

impl<M: ForeignModule, B: FrameBackend> RenderSession<M, B> {
    /// Brings up the module against a surface of `size`.
    ///
    /// Order: renderer resize, module init, module display size, header
    /// view bind.
    ///
    /// # Errors
    ///
    /// Any failure here is fatal.
    pub fn start(
        mut module: M,
        mut renderer: FrameRenderer<B>,
        size: SurfaceSize,
        timing: &TimingConfig,
    ) -> Result<Self, SessionError> {
        let max_frame_delta = timing.max_delta()?;
        renderer.resize(size).map_err(SessionError::backend)?;
        module.init()?;
        module.set_display_size(size.width, size.height)?;
        renderer.bind_view(&module.memory(), module.frame_addr())?;

        tracing::info!(
            width = size.width,
            height = size.height,
            frame_addr = module.frame_addr(),
            max_frame_delta = timing.max_frame_delta,
            "render session started"
        );

        Ok(Self {
            module,
            renderer,
            max_frame_delta,
            previous: None,
            visible: true,
            skip_next_update: false,
            last_dt: 0.0,
        })
    }

    /// Runs one host-loop iteration at `now`.
    ///
    /// # Errors
    ///
    /// Foreign or backend failures; the loop should stop.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome, SessionError> {
        let Some(previous) = self.previous.replace(now) else {
            return Ok(TickOutcome::Primed);
        };
        self.last_dt = now
            .saturating_duration_since(previous)
            .min(self.max_frame_delta)
            .as_secs_f32();

        if !self.visible {
            return Ok(TickOutcome::Suspended);
        }
        if self.skip_next_update {
            self.skip_next_update = false;
            tracing::debug!("skipping first tick after resume");
            return Ok(TickOutcome::SkippedAfterResume);
        }

        self.module.update(self.last_dt)?;
        self.module.render()?;
        let report = self
            .renderer
            .render_from(&self.module)
            .map_err(SessionError::backend)?;
        if report.rebound {
            tracing::debug!(version = report.version, "header view rebound after memory replacement");
        }
        Ok(TickOutcome::Rendered(report))
    }

    /// Marks the surface shown or hidden. Hiding arms a one-tick skip for
    /// the resume.
    pub fn set_visible(&mut self, visible: bool) {
        if visible == self.visible {
            return;
        }
        self.visible = visible;
        if !visible {
            self.skip_next_update = true;
        }
        tracing::info!(visible, "surface visibility changed");
    }

    /// Propagates a surface resize: renderer first, then module.
    ///
    /// Zero-sized requests (minimized windows) are ignored.
    ///
    /// # Errors
    ///
    /// Backend or foreign failures.
    pub fn resize(&mut self, size: SurfaceSize) -> Result<(), SessionError> {
        if size.is_empty() {
            return Ok(());
        }
        self.renderer.resize(size).map_err(SessionError::backend)?;
        self.module.set_display_size(size.width, size.height)?;
        Ok(())
    }

    /// Whether the surface is currently shown.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Step size used by the last tick, in seconds.
    #[must_use]
    pub const fn last_dt(&self) -> f32 {
        self.last_dt
    }

    /// The foreign module.
    #[must_use]
    pub const fn module(&self) -> &M {
        &self.module
    }

    /// The renderer.
    #[must_use]
    pub const fn renderer(&self) -> &FrameRenderer<B> {
        &self.renderer
    }

    /// The renderer, mutably.
    pub fn renderer_mut(&mut self) -> &mut FrameRenderer<B> {
        &mut self.renderer
    }
}
