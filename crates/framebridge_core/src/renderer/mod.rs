//! Per-tick frame transfer.
//!
//! [`FrameRenderer`] reconciles three things that change independently:
//!
//! ```text
//!   host surface size ──► resize()      ──► quad + texture storage
//!   memory identity   ──► render_from() ──► header view rebind
//!   frame version     ──► render()      ──► conditional texture upload ──► draw
//! ```
//!
//! A new frame is uploaded only when its dimensions equal the surface's and
//! its pixel block lies inside the foreign region. Otherwise the upload is
//! skipped for this tick, the version is still consumed, and the previous
//! texture contents are drawn again.

mod backend;
mod geometry;
mod stats;

pub use backend::{FrameBackend, TextureUpload};
pub use geometry::{QuadGeometry, QuadVertex, SurfaceSize, QUAD_INDICES};
pub use stats::RenderStats;

use crate::foreign::ForeignModule;
use crate::header::{BindError, FrameHeader, FrameHeaderView, RGBA8_BPP};
use crate::memory::MemoryRegion;

/// Why a new frame could not be uploaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidFrame {
    /// Zero width or height.
    Empty,
    /// Pixel format other than 4 bytes per pixel.
    UnsupportedBpp(u32),
    /// Rows overlap: `stride < width * 4`.
    StrideTooSmall {
        /// Reported stride.
        stride: u32,
        /// Bytes one row of pixels needs.
        row_bytes: u64,
    },
    /// Pixel pointer is negative.
    NegativePointer(i64),
    /// `[ptr, ptr + stride * height)` leaves the region.
    OutOfBounds {
        /// Start of the pixel block.
        ptr: i64,
        /// Length of the pixel block.
        len: u64,
        /// Region length.
        region_len: usize,
    },
}

/// What happened to the texture this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The header view had nothing to offer.
    NoFrame,
    /// Same version as last tick.
    Unchanged,
    /// Pixels were uploaded.
    Uploaded {
        /// Bytes handed to the GPU.
        bytes: u64,
    },
    /// The frame was produced for a different surface size.
    SkippedMismatch {
        /// Frame dimensions.
        frame: (u32, u32),
        /// Surface dimensions.
        surface: SurfaceSize,
    },
    /// The frame header was unusable.
    SkippedInvalid(InvalidFrame),
}

/// Result of one `render` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Version read from the header (`-1` if none).
    pub version: i64,
    /// Texture decision.
    pub upload: UploadOutcome,
    /// Whether the quad was drawn.
    pub drawn: bool,
    /// Whether the header view was rebound before reading.
    pub rebound: bool,
}

/// Frame-transfer state machine over a [`FrameBackend`].
pub struct FrameRenderer<B: FrameBackend> {
    backend: B,
    view: FrameHeaderView,
    surface: SurfaceSize,
    geometry: Option<QuadGeometry>,
    last_seen_version: i64,
    stats: RenderStats,
}

impl<B: FrameBackend> FrameRenderer<B> {
    /// Wraps an initialized backend. Nothing is drawn until the first
    /// [`resize`](Self::resize).
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            view: FrameHeaderView::new(),
            surface: SurfaceSize::default(),
            geometry: None,
            last_seen_version: -1,
            stats: RenderStats::default(),
        }
    }

    /// Rebuilds the quad for `size` and reallocates texture storage.
    ///
    /// Zero-sized requests are ignored.
    ///
    /// # Errors
    ///
    /// Fatal backend failures.
    pub fn resize(&mut self, size: SurfaceSize) -> Result<(), B::Error> {
        if size.is_empty() {
            tracing::debug!(width = size.width, height = size.height, "ignoring zero-size resize");
            return Ok(());
        }
        let geometry = QuadGeometry::covering(size);
        self.backend.resize(size, &geometry)?;
        self.surface = size;
        self.geometry = Some(geometry);
        self.stats.resizes += 1;
        tracing::info!(width = size.width, height = size.height, "surface resized");
        Ok(())
    }

    /// Binds the header view to `base` in `region`.
    ///
    /// # Errors
    ///
    /// [`BindError`] if the header does not fit; the view is left unbound.
    pub fn bind_view(&mut self, region: &MemoryRegion<'_>, base: u32) -> Result<(), BindError> {
        self.view.bind(region, base)?;
        self.stats.rebinds += 1;
        tracing::debug!(
            base,
            identity = region.identity().raw(),
            region_len = region.len(),
            "frame header view bound"
        );
        Ok(())
    }

    /// Like [`bind_view`](Self::bind_view), but reports failure as `false`;
    /// subsequent ticks then see [`UploadOutcome::NoFrame`].
    pub fn update_view(&mut self, region: &MemoryRegion<'_>, base: u32) -> bool {
        match self.bind_view(region, base) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(%err, "frame header view left unbound");
                false
            }
        }
    }

    /// True if `region` is not the store the view was bound against.
    #[must_use]
    pub fn needs_rebind(&self, region: &MemoryRegion<'_>) -> bool {
        !self.view.is_bound_to(region.identity())
    }

    /// Rebinds if the module's memory was replaced, then renders.
    ///
    /// # Errors
    ///
    /// Fatal backend failures.
    pub fn render_from<M: ForeignModule + ?Sized>(&mut self, module: &M) -> Result<TickReport, B::Error> {
        let region = module.memory();
        let rebound = self.needs_rebind(&region) && self.update_view(&region, module.frame_addr());
        let mut report = self.render(&region)?;
        report.rebound = rebound;
        Ok(report)
    }

    /// Reads the header, uploads a new frame if it is safe to, and draws.
    ///
    /// # Errors
    ///
    /// Fatal backend failures. Everything frame-related is resolved by
    /// skipping work.
    pub fn render(&mut self, region: &MemoryRegion<'_>) -> Result<TickReport, B::Error> {
        self.stats.ticks += 1;
        let header = self.view.read(region);
        let (outcome, upload) = self.decide(&header, region);

        let drawn = if self.geometry.is_some() {
            if let Some(upload) = upload {
                self.backend.upload(&upload)?;
                self.stats.uploads += 1;
                self.stats.uploaded_bytes += upload.bytes.len() as u64;
            }
            self.backend.draw(self.surface)?;
            self.stats.draws += 1;
            true
        } else {
            false
        };

        Ok(TickReport {
            version: header.version,
            upload: outcome,
            drawn,
            rebound: false,
        })
    }

    fn decide<'a>(
        &mut self,
        header: &FrameHeader,
        region: &MemoryRegion<'a>,
    ) -> (UploadOutcome, Option<TextureUpload<'a>>) {
        if !header.is_available() {
            return (UploadOutcome::NoFrame, None);
        }
        if header.version == self.last_seen_version {
            return (UploadOutcome::Unchanged, None);
        }
        // Consumed even if skipped below; a mismatched frame is never retried.
        self.last_seen_version = header.version;

        if header.dimensions() != (self.surface.width, self.surface.height) {
            self.stats.skipped_mismatch += 1;
            tracing::debug!(
                version = header.version,
                frame_width = header.width,
                frame_height = header.height,
                surface_width = self.surface.width,
                surface_height = self.surface.height,
                "frame size does not match surface, upload skipped"
            );
            return (
                UploadOutcome::SkippedMismatch {
                    frame: header.dimensions(),
                    surface: self.surface,
                },
                None,
            );
        }

        match validate_frame(header, region) {
            Ok(upload) => (
                UploadOutcome::Uploaded {
                    bytes: upload.bytes.len() as u64,
                },
                Some(upload),
            ),
            Err(reason) => {
                self.stats.skipped_invalid += 1;
                tracing::warn!(version = header.version, ?reason, "invalid frame header, upload skipped");
                (UploadOutcome::SkippedInvalid(reason), None)
            }
        }
    }

    /// Current surface size (zero before the first resize).
    #[must_use]
    pub const fn surface(&self) -> SurfaceSize {
        self.surface
    }

    /// Current quad, if a resize has happened.
    #[must_use]
    pub const fn geometry(&self) -> Option<&QuadGeometry> {
        self.geometry.as_ref()
    }

    /// Last frame version consumed (`-1` before the first frame).
    #[must_use]
    pub const fn last_seen_version(&self) -> i64 {
        self.last_seen_version
    }

    /// Lifetime counters.
    #[must_use]
    pub const fn stats(&self) -> RenderStats {
        self.stats
    }

    /// The header view.
    #[must_use]
    pub const fn view(&self) -> &FrameHeaderView {
        &self.view
    }

    /// The backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The backend, mutably.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

/// Checks that `header` describes an uploadable RGBA8 block inside `region`.
///
/// # Errors
///
/// The first [`InvalidFrame`] condition found.
pub fn validate_frame<'a>(
    header: &FrameHeader,
    region: &MemoryRegion<'a>,
) -> Result<TextureUpload<'a>, InvalidFrame> {
    if header.width == 0 || header.height == 0 {
        return Err(InvalidFrame::Empty);
    }
    if header.bpp != RGBA8_BPP {
        return Err(InvalidFrame::UnsupportedBpp(header.bpp));
    }
    let row_bytes = header.row_bytes();
    if u64::from(header.stride) < row_bytes {
        return Err(InvalidFrame::StrideTooSmall {
            stride: header.stride,
            row_bytes,
        });
    }
    let ptr = u64::try_from(header.ptr).map_err(|_| InvalidFrame::NegativePointer(header.ptr))?;
    let len = header.byte_len();
    let bytes = region.slice(ptr, len).ok_or(InvalidFrame::OutOfBounds {
        ptr: header.ptr,
        len,
        region_len: region.len(),
    })?;

    Ok(TextureUpload {
        bytes,
        width: header.width,
        height: header.height,
        stride: header.stride,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::LinearMemory;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Resize(SurfaceSize),
        Upload { len: usize, first: u8, stride: u32 },
        Draw(SurfaceSize),
    }

    #[derive(Default)]
    struct RecordingBackend {
        calls: Vec<Call>,
    }

    impl FrameBackend for RecordingBackend {
        type Error = std::convert::Infallible;

        fn resize(&mut self, size: SurfaceSize, _geometry: &QuadGeometry) -> Result<(), Self::Error> {
            self.calls.push(Call::Resize(size));
            Ok(())
        }

        fn upload(&mut self, upload: &TextureUpload<'_>) -> Result<(), Self::Error> {
            self.calls.push(Call::Upload {
                len: upload.bytes.len(),
                first: upload.bytes[0],
                stride: upload.stride,
            });
            Ok(())
        }

        fn draw(&mut self, size: SurfaceSize) -> Result<(), Self::Error> {
            self.calls.push(Call::Draw(size));
            Ok(())
        }
    }

    const HEADER_BASE: u32 = 16;

    fn publish(memory: &mut LinearMemory, header: FrameHeader) {
        memory.write(u64::from(HEADER_BASE), &header.encode()).unwrap();
    }

    fn header(width: u32, height: u32, version: i64) -> FrameHeader {
        FrameHeader {
            ptr: 1024,
            stride: width * 4,
            width,
            height,
            bpp: 4,
            version,
        }
    }

    fn setup(size: SurfaceSize) -> (LinearMemory, FrameRenderer<RecordingBackend>) {
        let memory = LinearMemory::new(2, 8);
        let mut renderer = FrameRenderer::new(RecordingBackend::default());
        renderer.resize(size).unwrap();
        assert!(renderer.update_view(&memory.as_region(), HEADER_BASE));
        renderer.backend_mut().calls.clear();
        (memory, renderer)
    }

    #[test]
    fn test_unbound_view_draws_without_upload() {
        let memory = LinearMemory::new(1, 1);
        let mut renderer = FrameRenderer::new(RecordingBackend::default());
        renderer.resize(SurfaceSize::new(2, 2)).unwrap();

        let report = renderer.render(&memory.as_region()).unwrap();
        assert_eq!(report.upload, UploadOutcome::NoFrame);
        assert_eq!(report.version, -1);
        assert!(report.drawn);
        assert_eq!(renderer.last_seen_version(), -1);
        assert_eq!(renderer.stats().uploads, 0);
    }

    #[test]
    fn test_matching_frame_uploads_exact_range() {
        let (mut memory, mut renderer) = setup(SurfaceSize::new(100, 100));
        memory.bytes_mut()[1024] = 0xAB;
        publish(&mut memory, header(100, 100, 1));

        let report = renderer.render(&memory.as_region()).unwrap();

        assert_eq!(report.upload, UploadOutcome::Uploaded { bytes: 40_000 });
        assert_eq!(renderer.last_seen_version(), 1);
        assert_eq!(
            renderer.backend().calls,
            vec![
                Call::Upload { len: 40_000, first: 0xAB, stride: 400 },
                Call::Draw(SurfaceSize::new(100, 100)),
            ]
        );
    }

    #[test]
    fn test_unchanged_version_uploads_once() {
        let (mut memory, mut renderer) = setup(SurfaceSize::new(8, 8));
        publish(&mut memory, header(8, 8, 5));

        renderer.render(&memory.as_region()).unwrap();
        let second = renderer.render(&memory.as_region()).unwrap();

        assert_eq!(second.upload, UploadOutcome::Unchanged);
        assert!(second.drawn);
        assert_eq!(renderer.stats().uploads, 1);
        assert_eq!(renderer.stats().draws, 2);
    }

    #[test]
    fn test_mismatch_skips_upload_but_consumes_version() {
        let (mut memory, mut renderer) = setup(SurfaceSize::new(100, 100));
        publish(&mut memory, header(100, 100, 1));
        renderer.render(&memory.as_region()).unwrap();

        renderer.resize(SurfaceSize::new(200, 200)).unwrap();
        publish(&mut memory, header(100, 100, 2));
        renderer.backend_mut().calls.clear();

        let report = renderer.render(&memory.as_region()).unwrap();

        assert_eq!(
            report.upload,
            UploadOutcome::SkippedMismatch {
                frame: (100, 100),
                surface: SurfaceSize::new(200, 200),
            }
        );
        assert_eq!(renderer.last_seen_version(), 2);
        assert_eq!(renderer.backend().calls, vec![Call::Draw(SurfaceSize::new(200, 200))]);

        // Same mismatched frame is not retried.
        let again = renderer.render(&memory.as_region()).unwrap();
        assert_eq!(again.upload, UploadOutcome::Unchanged);
        assert_eq!(renderer.stats().skipped_mismatch, 1);
    }

    #[test]
    fn test_next_matching_frame_uploads_after_mismatch() {
        let (mut memory, mut renderer) = setup(SurfaceSize::new(16, 16));
        publish(&mut memory, header(8, 8, 1));
        renderer.render(&memory.as_region()).unwrap();

        publish(&mut memory, header(16, 16, 2));
        let report = renderer.render(&memory.as_region()).unwrap();
        assert_eq!(report.upload, UploadOutcome::Uploaded { bytes: 16 * 16 * 4 });
    }

    #[test]
    fn test_padded_stride_is_uploaded_whole() {
        let (mut memory, mut renderer) = setup(SurfaceSize::new(10, 3));
        let mut padded = header(10, 3, 1);
        padded.stride = 64;
        publish(&mut memory, padded);

        let report = renderer.render(&memory.as_region()).unwrap();
        assert_eq!(report.upload, UploadOutcome::Uploaded { bytes: 192 });
    }

    #[test]
    fn test_out_of_bounds_frame_is_skipped() {
        let (mut memory, mut renderer) = setup(SurfaceSize::new(512, 512));
        let mut oob = header(512, 512, 1);
        oob.ptr = i64::try_from(memory.len()).unwrap() - 100;
        publish(&mut memory, oob);

        let report = renderer.render(&memory.as_region()).unwrap();
        assert!(matches!(
            report.upload,
            UploadOutcome::SkippedInvalid(InvalidFrame::OutOfBounds { .. })
        ));
        assert!(report.drawn);
        assert_eq!(renderer.last_seen_version(), 1);
        assert_eq!(renderer.stats().uploads, 0);
    }

    #[test]
    fn test_unsupported_bpp_and_short_stride_are_skipped() {
        let (mut memory, mut renderer) = setup(SurfaceSize::new(4, 4));
        let mut rgb = header(4, 4, 1);
        rgb.bpp = 3;
        publish(&mut memory, rgb);
        let report = renderer.render(&memory.as_region()).unwrap();
        assert_eq!(report.upload, UploadOutcome::SkippedInvalid(InvalidFrame::UnsupportedBpp(3)));

        let mut short = header(4, 4, 2);
        short.stride = 8;
        publish(&mut memory, short);
        let report = renderer.render(&memory.as_region()).unwrap();
        assert_eq!(
            report.upload,
            UploadOutcome::SkippedInvalid(InvalidFrame::StrideTooSmall { stride: 8, row_bytes: 16 })
        );
    }

    #[test]
    fn test_no_draw_before_first_resize() {
        let memory = LinearMemory::new(1, 1);
        let mut renderer = FrameRenderer::new(RecordingBackend::default());
        renderer.update_view(&memory.as_region(), 0);

        let report = renderer.render(&memory.as_region()).unwrap();
        assert!(!report.drawn);
        assert!(renderer.backend().calls.is_empty());
    }

    #[test]
    fn test_zero_size_resize_is_ignored() {
        let (_memory, mut renderer) = setup(SurfaceSize::new(32, 32));
        renderer.resize(SurfaceSize::new(0, 32)).unwrap();
        assert_eq!(renderer.surface(), SurfaceSize::new(32, 32));
        assert!(renderer.backend().calls.is_empty());
    }

    #[test]
    fn test_resize_rebuilds_geometry() {
        let (_memory, mut renderer) = setup(SurfaceSize::new(32, 32));
        renderer.resize(SurfaceSize::new(300, 200)).unwrap();

        assert_eq!(
            renderer.geometry().unwrap().positions(),
            [[0.0, 0.0], [300.0, 0.0], [0.0, 200.0], [300.0, 200.0]]
        );
        assert_eq!(renderer.backend().calls, vec![Call::Resize(SurfaceSize::new(300, 200))]);
    }

    #[test]
    fn test_stale_region_needs_rebind() {
        let (mut memory, mut renderer) = setup(SurfaceSize::new(4, 4));
        assert!(!renderer.needs_rebind(&memory.as_region()));

        memory.grow(1).unwrap();
        assert!(renderer.needs_rebind(&memory.as_region()));

        // Without a rebind, the stale view yields no frame.
        publish(&mut memory, header(4, 4, 3));
        let report = renderer.render(&memory.as_region()).unwrap();
        assert_eq!(report.upload, UploadOutcome::NoFrame);
    }
}
