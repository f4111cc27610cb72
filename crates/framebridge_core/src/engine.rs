//! # Reference Engine
//!
//! A native foreign module that behaves like a freestanding engine compiled
//! to a linear-memory target. It owns a [`LinearMemory`], carves it with a
//! bump allocator and draws an animated test pattern into a display buffer.
//!
//! ```text
//! 0            HEAP_BASE                                    len()
//! ├─ reserved ─┼─ header (24) ─┼─ display #1 ─┼─ display #2 ─┼─ free ─┤
//!                                 (abandoned)    (current)
//! ```
//!
//! The bump heap never frees. Every `set_display_size` allocates a fresh
//! display buffer, and when the heap runs past the end of memory the memory
//! grows, which replaces the backing store and forces the renderer to rebind.

use crate::foreign::{ForeignError, ForeignModule};
use crate::header::{FrameHeader, HEADER_LEN, RGBA8_BPP};
use crate::memory::{LinearMemory, MemoryRegion, PAGE_SIZE};

/// First heap address. Everything below is reserved.
pub const HEAP_BASE: u64 = 1024;

/// Alignment of display rows and buffers.
pub const DISPLAY_ALIGN: u64 = 64;

const HEADER_ALIGN: u64 = 8;

/// Rounds `value` up to a power-of-two `align`.
#[inline]
#[must_use]
pub const fn align_up(value: u64, align: u64) -> u64 {
    debug_assert!(align.is_power_of_two());
    (value + (align - 1)) & !(align - 1)
}

/// Row stride for a display `width` pixels wide.
#[must_use]
pub const fn display_stride(width: u32) -> u64 {
    align_up(width as u64 * RGBA8_BPP as u64, DISPLAY_ALIGN)
}

#[derive(Debug, Clone, Copy)]
struct BumpHeap {
    ptr: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Display {
    ptr: u32,
    stride: u32,
    width: u32,
    height: u32,
}

/// Reference implementation of [`ForeignModule`].
#[derive(Debug)]
pub struct ReferenceEngine {
    memory: LinearMemory,
    heap: Option<BumpHeap>,
    header_addr: u32,
    display: Option<Display>,
    time: f32,
    version: u32,
}

impl ReferenceEngine {
    /// Creates an uninitialized engine over `initial_pages` of memory.
    #[must_use]
    pub fn new(initial_pages: u32, maximum_pages: u32) -> Self {
        Self {
            memory: LinearMemory::new(initial_pages, maximum_pages),
            heap: None,
            header_addr: 0,
            display: None,
            time: 0.0,
            version: 0,
        }
    }

    /// Underlying memory.
    #[must_use]
    pub const fn linear_memory(&self) -> &LinearMemory {
        &self.memory
    }

    /// Simulated time in seconds.
    #[must_use]
    pub const fn time(&self) -> f32 {
        self.time
    }

    /// Number of frames published so far.
    #[must_use]
    pub const fn frames_published(&self) -> u32 {
        self.version
    }

    /// Current display as `(ptr, stride, width, height)`.
    #[must_use]
    pub fn display(&self) -> Option<(u32, u32, u32, u32)> {
        self.display.map(|d| (d.ptr, d.stride, d.width, d.height))
    }

    /// Bump-allocates `bytes` at `align`, growing memory on exhaustion.
    ///
    /// Growth adds the page deficit plus a quarter of it (at least one page)
    /// as slack.
    ///
    /// # Errors
    ///
    /// [`ForeignError::NotInitialized`] before `init`, and
    /// [`ForeignError::OutOfMemory`] when memory cannot grow or the result
    /// would not be addressable.
    pub fn alloc(&mut self, bytes: u64, align: u64) -> Result<u32, ForeignError> {
        let heap = self.heap.as_mut().ok_or(ForeignError::NotInitialized)?;
        let oom = ForeignError::OutOfMemory { requested: bytes };

        let start = align_up(heap.ptr, align);
        let end = start.checked_add(bytes).ok_or(oom.clone())?;
        // Addresses are 32-bit.
        let addr = u32::try_from(start).map_err(|_| oom.clone())?;
        if end > u64::from(u32::MAX) + 1 {
            return Err(oom);
        }

        let limit = self.memory.len() as u64;
        if end > limit {
            let deficit_pages = (end - limit).div_ceil(PAGE_SIZE as u64);
            let pages = deficit_pages + (deficit_pages >> 2).max(1);
            let pages = u32::try_from(pages).map_err(|_| oom.clone())?;
            if self.memory.grow(pages).is_none() {
                tracing::warn!(requested = bytes, pages, "reference engine out of memory");
                return Err(oom);
            }
        }

        heap.ptr = end;
        Ok(addr)
    }

    fn publish(&mut self, display: Display) -> Result<(), ForeignError> {
        let header = FrameHeader {
            ptr: i64::from(display.ptr),
            stride: display.stride,
            width: display.width,
            height: display.height,
            bpp: RGBA8_BPP,
            version: i64::from(self.version),
        };
        self.memory
            .write(u64::from(self.header_addr), &header.encode())
            .map_err(|err| ForeignError::Trap(err.to_string()))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn paint(&mut self, display: Display) {
        let phase = (self.time * 64.0) as u32 as u8;
        let (w, h) = (u64::from(display.width), u64::from(display.height));
        let stride = display.stride as usize;
        let start = display.ptr as usize;
        let rows = &mut self.memory.bytes_mut()[start..start + stride * display.height as usize];

        for (y, row) in rows.chunks_exact_mut(stride).enumerate() {
            let g = (y as u64 * 255 / h) as u8;
            for (x, px) in row[..display.width as usize * 4].chunks_exact_mut(4).enumerate() {
                let r = (x as u64 * 255 / w) as u8;
                px.copy_from_slice(&[r, g, phase, 0xFF]);
            }
        }
    }
}

impl ForeignModule for ReferenceEngine {
    fn init(&mut self) -> Result<(), ForeignError> {
        if self.heap.is_some() {
            return Ok(());
        }
        self.heap = Some(BumpHeap {
            ptr: align_up(HEAP_BASE, DISPLAY_ALIGN),
        });
        self.header_addr = self.alloc(HEADER_LEN as u64, HEADER_ALIGN)?;
        tracing::info!(
            header_addr = self.header_addr,
            pages = self.memory.size_pages(),
            "reference engine initialized"
        );
        Ok(())
    }

    fn set_display_size(&mut self, width: u32, height: u32) -> Result<(), ForeignError> {
        if self.heap.is_none() {
            return Err(ForeignError::NotInitialized);
        }
        if width == 0 || height == 0 {
            return Err(ForeignError::InvalidDisplaySize { width, height });
        }
        let stride = display_stride(width);
        let total = stride
            .checked_mul(u64::from(height))
            .ok_or(ForeignError::OutOfMemory { requested: u64::MAX })?;
        let ptr = self.alloc(total, DISPLAY_ALIGN)?;
        let stride = u32::try_from(stride).map_err(|_| ForeignError::OutOfMemory { requested: total })?;

        self.display = Some(Display {
            ptr,
            stride,
            width,
            height,
        });
        tracing::debug!(width, height, stride, ptr, "display buffer allocated");
        Ok(())
    }

    fn frame_addr(&self) -> u32 {
        self.header_addr
    }

    fn update(&mut self, dt: f32) -> Result<(), ForeignError> {
        if self.heap.is_none() {
            return Err(ForeignError::NotInitialized);
        }
        self.time += dt;
        Ok(())
    }

    fn render(&mut self) -> Result<(), ForeignError> {
        if self.heap.is_none() {
            return Err(ForeignError::NotInitialized);
        }
        let Some(display) = self.display else {
            return Ok(());
        };
        self.paint(display);
        self.version = self.version.wrapping_add(1);
        self.publish(display)
    }

    fn memory(&self) -> MemoryRegion<'_> {
        self.memory.as_region()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::FrameHeaderView;

    fn read_header(engine: &ReferenceEngine) -> FrameHeader {
        let mut view = FrameHeaderView::new();
        view.bind(&engine.memory(), engine.frame_addr()).unwrap();
        view.read(&engine.memory())
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 8), 72);
    }

    #[test]
    fn test_display_stride_is_aligned() {
        assert_eq!(display_stride(16), 64);
        assert_eq!(display_stride(10), 64);
        assert_eq!(display_stride(100), 448);
        assert_eq!(display_stride(17), 128);
    }

    #[test]
    fn test_calls_before_init_fail() {
        let mut engine = ReferenceEngine::new(1, 1);
        assert_eq!(engine.set_display_size(4, 4), Err(ForeignError::NotInitialized));
        assert_eq!(engine.update(0.01), Err(ForeignError::NotInitialized));
        assert_eq!(engine.render(), Err(ForeignError::NotInitialized));
        assert_eq!(engine.alloc(8, 8), Err(ForeignError::NotInitialized));
    }

    #[test]
    fn test_header_allocated_at_heap_base() {
        let mut engine = ReferenceEngine::new(1, 1);
        engine.init().unwrap();
        assert_eq!(u64::from(engine.frame_addr()), HEAP_BASE);
    }

    #[test]
    fn test_zero_display_size_rejected() {
        let mut engine = ReferenceEngine::new(1, 1);
        engine.init().unwrap();
        assert_eq!(
            engine.set_display_size(0, 10),
            Err(ForeignError::InvalidDisplaySize { width: 0, height: 10 })
        );
    }

    #[test]
    fn test_render_publishes_incrementing_versions() {
        let mut engine = ReferenceEngine::new(1, 4);
        engine.init().unwrap();
        engine.set_display_size(10, 3).unwrap();

        engine.render().unwrap();
        let first = read_header(&engine);
        engine.render().unwrap();
        let second = read_header(&engine);

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(second.dimensions(), (10, 3));
        assert_eq!(second.stride, 64);
        assert_eq!(second.bpp, 4);
        assert_eq!(second.ptr % 64, 0);
    }

    #[test]
    fn test_render_without_display_publishes_nothing() {
        let mut engine = ReferenceEngine::new(1, 1);
        engine.init().unwrap();
        engine.render().unwrap();
        assert_eq!(engine.frames_published(), 0);
    }

    #[test]
    fn test_pattern_is_opaque() {
        let mut engine = ReferenceEngine::new(1, 4);
        engine.init().unwrap();
        engine.set_display_size(4, 4).unwrap();
        engine.render().unwrap();

        let (ptr, stride, ..) = engine.display().unwrap();
        let region = engine.memory();
        for y in 0..4u64 {
            let row = region.slice(u64::from(ptr) + y * u64::from(stride), 16).unwrap();
            assert!(row.chunks_exact(4).all(|px| px[3] == 0xFF));
        }
    }

    #[test]
    fn test_large_display_grows_memory_with_slack() {
        let mut engine = ReferenceEngine::new(1, 64);
        engine.init().unwrap();
        let before = engine.memory().identity();

        // 256 * 4 * 256 = 4 pages of pixels past a 1-page memory.
        engine.set_display_size(256, 256).unwrap();

        assert_ne!(engine.memory().identity(), before);
        let pages = engine.linear_memory().size_pages();
        // four-page deficit plus one slack page
        assert_eq!(pages, 1 + 4 + 1);
    }

    #[test]
    fn test_exhausted_memory_is_out_of_memory() {
        let mut engine = ReferenceEngine::new(1, 2);
        engine.init().unwrap();
        let err = engine.set_display_size(1024, 1024).unwrap_err();
        assert!(matches!(err, ForeignError::OutOfMemory { .. }));
        assert!(engine.display().is_none());
    }

    #[test]
    fn test_update_advances_time() {
        let mut engine = ReferenceEngine::new(1, 1);
        engine.init().unwrap();
        engine.update(0.25).unwrap();
        engine.update(0.25).unwrap();
        assert!((engine.time() - 0.5).abs() < f32::EPSILON);
    }
}
