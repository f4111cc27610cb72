//! Contract of the foreign simulation module.
//!
//! The renderer only ever reads the module's memory. Everything else
//! (stepping the simulation, producing pixels, choosing where the frame
//! header lives) belongs to the module.

use thiserror::Error;

use crate::memory::MemoryRegion;

/// Failures reported by the foreign module.
///
/// These are not recoverable from the renderer's side; the host loop stops
/// when one surfaces.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ForeignError {
    /// The module could not allocate memory.
    #[error("foreign module is out of memory (requested {requested} bytes)")]
    OutOfMemory {
        /// Size of the failed allocation.
        requested: u64,
    },

    /// A display size with a zero dimension was requested.
    #[error("invalid display size {width}x{height}")]
    InvalidDisplaySize {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },

    /// A call that requires `init` was made first.
    #[error("foreign module used before init")]
    NotInitialized,

    /// The module aborted.
    #[error("foreign module trapped: {0}")]
    Trap(String),
}

/// The simulation/engine side of the shared-memory link.
pub trait ForeignModule {
    /// One-time initialization.
    ///
    /// # Errors
    ///
    /// Any [`ForeignError`] aborts startup.
    fn init(&mut self) -> Result<(), ForeignError>;

    /// Tells the module the drawable size it should produce frames at.
    ///
    /// The module may reallocate (and grow its memory) in response.
    ///
    /// # Errors
    ///
    /// Allocation failures or invalid sizes.
    fn set_display_size(&mut self, width: u32, height: u32) -> Result<(), ForeignError>;

    /// Base address of the 24-byte frame header.
    fn frame_addr(&self) -> u32;

    /// Advances the simulation by `dt` seconds.
    ///
    /// # Errors
    ///
    /// Module-defined.
    fn update(&mut self, dt: f32) -> Result<(), ForeignError>;

    /// Produces the next frame into shared memory.
    ///
    /// # Errors
    ///
    /// Module-defined.
    fn render(&mut self) -> Result<(), ForeignError>;

    /// The module's memory as of now.
    fn memory(&self) -> MemoryRegion<'_>;
}
