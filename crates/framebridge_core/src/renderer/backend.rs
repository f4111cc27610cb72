//! The GPU seam of the renderer.

use super::geometry::{QuadGeometry, SurfaceSize};

/// Pixel rows to copy into the frame texture.
///
/// `bytes` spans exactly `stride * height` bytes starting at the first row.
#[derive(Debug, Clone, Copy)]
pub struct TextureUpload<'a> {
    /// Source bytes.
    pub bytes: &'a [u8],
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes between the starts of consecutive rows.
    pub stride: u32,
}

/// Operations the renderer needs from a GPU.
///
/// Implementations own the program, buffers and texture. Conditions that
/// only affect one frame (a lost or outdated swapchain image) are handled
/// inside the implementation; errors returned here are fatal.
pub trait FrameBackend {
    /// Fatal backend failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Re-uploads `geometry` and reallocates texture storage to `size`.
    ///
    /// Both happen before the next draw.
    ///
    /// # Errors
    ///
    /// Fatal backend failures.
    fn resize(&mut self, size: SurfaceSize, geometry: &QuadGeometry) -> Result<(), Self::Error>;

    /// Writes pixel rows into the texture as a sub-image update.
    ///
    /// # Errors
    ///
    /// Fatal backend failures.
    fn upload(&mut self, upload: &TextureUpload<'_>) -> Result<(), Self::Error>;

    /// Clears, binds, sets the resolution uniform and draws the quad.
    ///
    /// # Errors
    ///
    /// Fatal backend failures.
    fn draw(&mut self, size: SurfaceSize) -> Result<(), Self::Error>;
}
