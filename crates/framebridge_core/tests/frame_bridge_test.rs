//! # Frame Bridge Integration Test
//!
//! Drives the reference engine through a session against a software
//! texture and checks that what lands in the texture is what the engine
//! drew.

use std::time::{Duration, Instant};

use framebridge_core::{
    FrameBackend, FrameHeader, FrameRenderer, ForeignModule, LinearMemory, QuadGeometry, ReferenceEngine,
    RenderSession, SurfaceSize, TextureUpload, TickOutcome, UploadOutcome,
};
use framebridge_core::config::TimingConfig;

/// Test-side GPU error.
#[derive(Debug, thiserror::Error)]
#[error("upload of {got:?} into a {storage:?} texture")]
struct ShapeError {
    got: (u32, u32),
    storage: (u32, u32),
}

/// CPU stand-in for the GPU texture: tightly packed RGBA8 storage.
#[derive(Default)]
struct SoftwareTexture {
    width: u32,
    height: u32,
    texels: Vec<u8>,
    vertices: Option<QuadGeometry>,
    draws: u32,
}

impl FrameBackend for SoftwareTexture {
    type Error = ShapeError;

    fn resize(&mut self, size: SurfaceSize, geometry: &QuadGeometry) -> Result<(), Self::Error> {
        self.width = size.width;
        self.height = size.height;
        self.texels = vec![0; size.width as usize * size.height as usize * 4];
        self.vertices = Some(*geometry);
        Ok(())
    }

    fn upload(&mut self, upload: &TextureUpload<'_>) -> Result<(), Self::Error> {
        if (upload.width, upload.height) != (self.width, self.height) {
            return Err(ShapeError {
                got: (upload.width, upload.height),
                storage: (self.width, self.height),
            });
        }
        let row = upload.width as usize * 4;
        for (dst, src) in self
            .texels
            .chunks_exact_mut(row)
            .zip(upload.bytes.chunks(upload.stride as usize))
        {
            dst.copy_from_slice(&src[..row]);
        }
        Ok(())
    }

    fn draw(&mut self, _size: SurfaceSize) -> Result<(), Self::Error> {
        self.draws += 1;
        Ok(())
    }
}

fn engine_pixels(engine: &ReferenceEngine) -> Vec<u8> {
    let (ptr, stride, width, height) = engine.display().unwrap();
    let region = engine.memory();
    let mut out = Vec::new();
    for y in 0..u64::from(height) {
        let start = u64::from(ptr) + y * u64::from(stride);
        out.extend_from_slice(region.slice(start, u64::from(width) * 4).unwrap());
    }
    out
}

fn start(size: SurfaceSize) -> RenderSession<ReferenceEngine, SoftwareTexture> {
    RenderSession::start(
        ReferenceEngine::new(1, 4096),
        FrameRenderer::new(SoftwareTexture::default()),
        size,
        &TimingConfig::default(),
    )
    .unwrap()
}

/// Test: texture content equals the engine's display rows, padding removed.
#[test]
fn test_engine_frames_reach_texture() {
    // 100 px rows are 400 bytes, padded to a 448-byte stride.
    let mut session = start(SurfaceSize::new(100, 30));
    let t0 = Instant::now();
    assert_eq!(session.tick(t0).unwrap(), TickOutcome::Primed);

    for i in 1..=5u64 {
        let outcome = session.tick(t0 + Duration::from_millis(16 * i)).unwrap();
        let TickOutcome::Rendered(report) = outcome else {
            panic!("tick {i} did not render: {outcome:?}");
        };
        assert_eq!(report.upload, UploadOutcome::Uploaded { bytes: 448 * 30 });
        assert_eq!(report.version, i64::try_from(i).unwrap());
    }

    let texture = session.renderer().backend();
    assert_eq!(texture.texels, engine_pixels(session.module()));
    assert_eq!(texture.draws, 5);
}

/// Test: resizes keep texture storage, quad and frames in agreement.
#[test]
fn test_resize_sequence_never_uploads_misshapen_frames() {
    let mut session = start(SurfaceSize::new(64, 64));
    let mut now = Instant::now();
    session.tick(now).unwrap();

    for &(w, h) in &[(128, 96), (32, 500), (640, 360), (1, 1), (300, 300)] {
        session.resize(SurfaceSize::new(w, h)).unwrap();
        now += Duration::from_millis(16);
        // The software texture fails on any misshapen upload.
        let outcome = session.tick(now).unwrap();
        assert!(matches!(
            outcome,
            TickOutcome::Rendered(report) if matches!(report.upload, UploadOutcome::Uploaded { .. })
        ));

        let texture = session.renderer().backend();
        assert_eq!((texture.width, texture.height), (w, h));
        #[allow(clippy::cast_precision_loss)]
        let (fw, fh) = (w as f32, h as f32);
        assert_eq!(
            texture.vertices.unwrap().positions(),
            [[0.0, 0.0], [fw, 0.0], [0.0, fh], [fw, fh]]
        );
        assert_eq!(texture.texels, engine_pixels(session.module()));
    }

    assert!(session.renderer().stats().rebinds > 1, "growth should have forced rebinds");
}

/// Test: the 100x100 frame, then a resize the producer has not seen yet.
#[test]
fn test_mismatch_after_resize_keeps_last_frame() {
    let mut memory = LinearMemory::new(1, 1);
    let mut renderer = FrameRenderer::new(SoftwareTexture::default());
    renderer.resize(SurfaceSize::new(100, 100)).unwrap();
    assert!(renderer.update_view(&memory.as_region(), 0));

    memory.bytes_mut()[1024..41_024].fill(0x5A);
    let mut header = FrameHeader {
        ptr: 1024,
        stride: 400,
        width: 100,
        height: 100,
        bpp: 4,
        version: 1,
    };
    memory.write(0, &header.encode()).unwrap();

    let first = renderer.render(&memory.as_region()).unwrap();
    assert_eq!(first.upload, UploadOutcome::Uploaded { bytes: 40_000 });
    assert_eq!(renderer.last_seen_version(), 1);

    renderer.resize(SurfaceSize::new(200, 200)).unwrap();
    header.version = 2;
    memory.write(0, &header.encode()).unwrap();

    let second = renderer.render(&memory.as_region()).unwrap();
    assert!(matches!(second.upload, UploadOutcome::SkippedMismatch { .. }));
    assert!(second.drawn);
    assert_eq!(renderer.last_seen_version(), 2);
    assert_eq!(renderer.backend().draws, 2);
}

/// Test: after growth the view reads the new store, never the old one.
#[test]
fn test_rebind_reads_new_region() {
    let mut engine = ReferenceEngine::new(1, 4096);
    engine.init().unwrap();
    engine.set_display_size(8, 8).unwrap();
    engine.render().unwrap();

    let mut renderer = FrameRenderer::new(SoftwareTexture::default());
    renderer.resize(SurfaceSize::new(8, 8)).unwrap();
    let report = renderer.render_from(&engine).unwrap();
    assert!(report.rebound);
    assert_eq!(report.version, 1);

    let old_identity = engine.memory().identity();
    engine.set_display_size(1024, 1024).unwrap();
    assert_ne!(engine.memory().identity(), old_identity);
    renderer.resize(SurfaceSize::new(1024, 1024)).unwrap();
    engine.render().unwrap();

    let report = renderer.render_from(&engine).unwrap();
    assert!(report.rebound);
    assert_eq!(report.version, 2);
    assert_eq!(report.upload, UploadOutcome::Uploaded { bytes: 4096 * 1024 });
}

/// Test: hiding suspends, and the first visible tick is dropped.
#[test]
fn test_visibility_round_trip() {
    let mut session = start(SurfaceSize::new(16, 16));
    let t0 = Instant::now();
    session.tick(t0).unwrap();
    session.tick(t0 + Duration::from_millis(16)).unwrap();
    let published = session.module().frames_published();

    session.set_visible(false);
    for i in 2..10 {
        let outcome = session.tick(t0 + Duration::from_millis(16 * i)).unwrap();
        assert_eq!(outcome, TickOutcome::Suspended);
    }
    session.set_visible(true);

    let resumed = session.tick(t0 + Duration::from_secs(60)).unwrap();
    assert_eq!(resumed, TickOutcome::SkippedAfterResume);
    assert_eq!(session.module().frames_published(), published);

    session.tick(t0 + Duration::from_secs(60) + Duration::from_millis(16)).unwrap();
    assert_eq!(session.module().frames_published(), published + 1);
    assert!(session.last_dt() <= 0.033 + f32::EPSILON);
}
