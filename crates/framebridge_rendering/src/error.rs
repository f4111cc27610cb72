//! Rendering errors.

use thiserror::Error;

use crate::pipeline::Resource;
use crate::program::ShaderStage;

/// Failures while building or using the quad pipeline.
///
/// Every variant is fatal: the pipeline is built once at startup and there
/// is no fallback program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A shader failed to parse or validate.
    #[error("{stage} shader failed to compile:\n{diagnostic}")]
    Compile {
        /// Stage that failed.
        stage: ShaderStage,
        /// Compiler output.
        diagnostic: String,
    },

    /// `link` was called without both stages.
    #[error("cannot link: no {0} shader")]
    MissingShader(ShaderStage),

    /// The stages do not fit together, or the device rejected the pipeline.
    #[error("program failed to link:\n{diagnostic}")]
    Link {
        /// Linker or device output.
        diagnostic: String,
    },

    /// A required uniform is not declared by either stage.
    #[error("uniform `{0}` is not declared by the program")]
    UnknownUniform(&'static str),

    /// A required attribute is not an input of the vertex stage.
    #[error("attribute `{0}` is not declared by the vertex stage")]
    UnknownAttribute(&'static str),

    /// A resource was used before its creation step.
    #[error("{0} has not been created yet")]
    NotCreated(Resource),

    /// The requested texture size is empty or beyond the device limit.
    #[error("texture of {requested:?} is outside the device limit of {max} per side")]
    TextureSize {
        /// Requested size.
        requested: (u32, u32),
        /// `max_texture_dimension_2d` of the device.
        max: u32,
    },

    /// Pixel rows do not match the texture's storage.
    #[error("upload of {upload:?} does not match texture of {texture:?}")]
    UploadMismatch {
        /// Upload size.
        upload: (u32, u32),
        /// Texture size.
        texture: (u32, u32),
    },
}

/// Fatal failures of the wgpu backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The window could not back a surface.
    #[error("failed to create surface: {0}")]
    SurfaceCreation(#[from] wgpu::CreateSurfaceError),

    /// No adapter can present to the surface.
    #[error("no compatible GPU adapter found")]
    AdapterNotFound,

    /// The adapter refused to open a device.
    #[error("failed to open device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    /// The surface reports no usable format.
    #[error("surface has no supported texture format")]
    UnsupportedSurface,

    /// Pipeline construction or use failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The swapchain ran out of memory.
    #[error("out of GPU memory")]
    OutOfMemory,
}
