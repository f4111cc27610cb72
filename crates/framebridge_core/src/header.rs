//! Frame header view over foreign memory.
//!
//! The foreign module publishes a fixed 24-byte header at a base address it
//! chooses once. The header locates the pixel data of the latest frame:
//!
//! ```text
//! offset  field    type
//! 0       ptr      u32 LE   byte offset of the first pixel row
//! 4       stride   u32 LE   bytes per row (>= width * bpp)
//! 8       width    u32 LE
//! 12      height   u32 LE
//! 16      bpp      u32 LE   bytes per pixel (4, RGBA8)
//! 20      version  u32 LE   bumped once per produced frame
//! ```
//!
//! [`FrameHeaderView`] remembers only *where* the header lives and *which*
//! backing store it was validated against. It is re-bound whenever the
//! store is replaced.

use thiserror::Error;

use crate::memory::{MemoryIdentity, MemoryRegion};

/// Size of the encoded header in bytes.
pub const HEADER_LEN: usize = 24;

/// Bytes per pixel the renderer accepts (RGBA8).
pub const RGBA8_BPP: u32 = 4;

const PTR_OFFSET: usize = 0;
const STRIDE_OFFSET: usize = 4;
const WIDTH_OFFSET: usize = 8;
const HEIGHT_OFFSET: usize = 12;
const BPP_OFFSET: usize = 16;
const VERSION_OFFSET: usize = 20;

/// Decoded snapshot of a frame header.
///
/// `ptr` and `version` are widened to `i64` so the "no frame" sentinel (`-1`)
/// never collides with a real `u32` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Byte offset of pixel data in the foreign region, or `-1`.
    pub ptr: i64,
    /// Bytes per pixel row.
    pub stride: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Bytes per pixel.
    pub bpp: u32,
    /// Frame counter, or `-1` when no frame is available.
    pub version: i64,
}

impl FrameHeader {
    /// Sentinel returned when no header can be read.
    pub const UNAVAILABLE: Self = Self {
        ptr: -1,
        stride: 0,
        width: 0,
        height: 0,
        bpp: 0,
        version: -1,
    };

    /// Decodes the little-endian wire layout.
    #[inline]
    #[must_use]
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Self {
        let field = |offset: usize| {
            u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };
        Self {
            ptr: i64::from(field(PTR_OFFSET)),
            stride: field(STRIDE_OFFSET),
            width: field(WIDTH_OFFSET),
            height: field(HEIGHT_OFFSET),
            bpp: field(BPP_OFFSET),
            version: i64::from(field(VERSION_OFFSET)),
        }
    }

    /// Encodes into the little-endian wire layout.
    ///
    /// `ptr` and `version` are truncated to their low 32 bits; encoding the
    /// sentinel is meaningless and yields all-ones fields.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        let mut put = |offset: usize, value: u32| {
            out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        };
        put(PTR_OFFSET, self.ptr as u32);
        put(STRIDE_OFFSET, self.stride);
        put(WIDTH_OFFSET, self.width);
        put(HEIGHT_OFFSET, self.height);
        put(BPP_OFFSET, self.bpp);
        put(VERSION_OFFSET, self.version as u32);
        out
    }

    /// True when this header describes a produced frame.
    #[inline]
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.version >= 0
    }

    /// `(width, height)`.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Byte length of the pixel block, `stride * height`.
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        u64::from(self.stride) * u64::from(self.height)
    }

    /// Bytes of pixel data in one row, `width * bpp`.
    #[must_use]
    pub fn row_bytes(&self) -> u64 {
        u64::from(self.width) * u64::from(self.bpp)
    }
}

impl Default for FrameHeader {
    fn default() -> Self {
        Self::UNAVAILABLE
    }
}

/// Failure to bind the header view.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    /// The 24-byte header would extend past the region.
    #[error("frame header at 0x{base:x} does not fit in a region of {region_len} bytes")]
    OutOfBounds {
        /// Requested base address.
        base: u32,
        /// Region length at bind time.
        region_len: usize,
    },
}

/// Where the header lives and which store it was validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderBinding {
    /// Identity of the store the binding was validated against.
    pub identity: MemoryIdentity,
    /// Base address of the header.
    pub base: u32,
}

/// Bounded, re-bindable view of the frame header.
#[derive(Debug, Default)]
pub struct FrameHeaderView {
    binding: Option<HeaderBinding>,
}

impl FrameHeaderView {
    /// Creates an unbound view.
    #[must_use]
    pub const fn new() -> Self {
        Self { binding: None }
    }

    /// Binds the view to the header at `base` inside `region`.
    ///
    /// Must be called at startup and again whenever the region's identity
    /// changes. On failure the view is left unbound.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::OutOfBounds`] if the header does not fit.
    pub fn bind(&mut self, region: &MemoryRegion<'_>, base: u32) -> Result<(), BindError> {
        if region.slice(u64::from(base), HEADER_LEN as u64).is_none() {
            self.binding = None;
            return Err(BindError::OutOfBounds {
                base,
                region_len: region.len(),
            });
        }
        self.binding = Some(HeaderBinding {
            identity: region.identity(),
            base,
        });
        Ok(())
    }

    /// Drops the binding.
    pub fn unbind(&mut self) {
        self.binding = None;
    }

    /// Current binding, if any.
    #[must_use]
    pub const fn binding(&self) -> Option<HeaderBinding> {
        self.binding
    }

    /// True if bound to any store.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// True if bound to the store with `identity`.
    #[must_use]
    pub fn is_bound_to(&self, identity: MemoryIdentity) -> bool {
        self.binding.is_some_and(|b| b.identity == identity)
    }

    /// Reads the header from `region`.
    ///
    /// Returns [`FrameHeader::UNAVAILABLE`] if the view was never bound or
    /// if `region` is not the store the binding was validated against.
    #[inline]
    #[must_use]
    pub fn read(&self, region: &MemoryRegion<'_>) -> FrameHeader {
        let Some(binding) = self.binding else {
            return FrameHeader::UNAVAILABLE;
        };
        if binding.identity != region.identity() {
            return FrameHeader::UNAVAILABLE;
        }
        region
            .slice(u64::from(binding.base), HEADER_LEN as u64)
            .and_then(|bytes| <&[u8; HEADER_LEN]>::try_from(bytes).ok())
            .map_or(FrameHeader::UNAVAILABLE, FrameHeader::decode)
    }
}
