//! # FRAMEBRIDGE Core
//!
//! Headless half of the frame bridge: a foreign simulation module writes
//! RGBA8 frames into its own linear memory and publishes a 24-byte header;
//! this crate decides, once per display refresh, whether that frame may be
//! handed to the GPU.
//!
//! ## Architecture Rules
//!
//! 1. **Never hold foreign memory across ticks** - regions are borrows
//! 2. **Rebind on replacement** - memory identity, not contents, decides
//! 3. **No GPU types** - the GPU lives behind [`FrameBackend`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use framebridge_core::{FrameRenderer, ReferenceEngine, RenderSession, SurfaceSize};
//!
//! let engine = ReferenceEngine::new(2, 16_384);
//! let renderer = FrameRenderer::new(backend);
//! let mut session = RenderSession::start(engine, renderer, SurfaceSize::new(1280, 720), &timing)?;
//! session.tick(std::time::Instant::now())?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod engine;
pub mod foreign;
pub mod header;
pub mod memory;
pub mod renderer;
pub mod session;

pub use config::{ConfigError, FrameBridgeConfig, PowerPreference};
pub use engine::ReferenceEngine;
pub use foreign::{ForeignError, ForeignModule};
pub use header::{BindError, FrameHeader, FrameHeaderView, HEADER_LEN};
pub use memory::{LinearMemory, MemoryError, MemoryIdentity, MemoryRegion, PAGE_SIZE};
pub use renderer::{
    FrameBackend, FrameRenderer, InvalidFrame, QuadGeometry, QuadVertex, RenderStats, SurfaceSize,
    TextureUpload, TickReport, UploadOutcome, QUAD_INDICES,
};
pub use session::{RenderSession, SessionError, TickOutcome};
