//! # FRAMEBRIDGE Rendering
//!
//! Presents the foreign frame as one textured quad covering the window.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   QUAD PIPELINE                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  WGSL ─► naga (compile, link, resolve) ─► LinkedProgram     │
//! │                                              ↓               │
//! │  wgpu device ─► GpuPipeline (buffers, texture, bind group)  │
//! │                                              ↓               │
//! │  FrameRenderer ─► WgpuFrameBackend ─► upload + draw + present│
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod backend;
pub mod error;
pub mod pipeline;
pub mod program;
pub mod shaders;

pub use backend::WgpuFrameBackend;
pub use error::{BackendError, PipelineError};
pub use pipeline::{BufferSlot, FrameTexture, GpuPipeline, Resource, FRAME_TEXTURE_FORMAT};
pub use program::{Attribute, CompiledShader, LinkedProgram, ProgramBuilder, ShaderStage, Uniform, UniformBinding};
