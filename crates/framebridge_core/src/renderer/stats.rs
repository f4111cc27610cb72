//! Renderer statistics.

/// Counters accumulated over the renderer's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    /// Calls to `render`.
    pub ticks: u64,
    /// Draw calls issued.
    pub draws: u64,
    /// Texture uploads performed.
    pub uploads: u64,
    /// Total bytes handed to texture uploads.
    pub uploaded_bytes: u64,
    /// New frames skipped because their size did not match the surface.
    pub skipped_mismatch: u64,
    /// New frames skipped because their header was unusable.
    pub skipped_invalid: u64,
    /// Header view binds, including rebinds after memory replacement.
    pub rebinds: u64,
    /// Surface resizes applied.
    pub resizes: u64,
}

impl RenderStats {
    /// Fraction of new frames that reached the texture.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn upload_ratio(&self) -> f64 {
        let seen = self.uploads + self.skipped_mismatch + self.skipped_invalid;
        if seen == 0 {
            0.0
        } else {
            self.uploads as f64 / seen as f64
        }
    }
}
