//! Foreign memory regions.
//!
//! The simulation owns a growable, page-granular byte store. Growing it
//! replaces the backing store wholesale, so anything derived from the old
//! store (offsets that were validated against it, views bound to it) must be
//! re-validated. Each backing store carries a [`MemoryIdentity`] token and
//! consumers compare tokens, never contents, to detect replacement.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Size of one linear-memory page in bytes.
pub const PAGE_SIZE: usize = 65_536;

/// Source of process-unique identities.
static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one backing store.
///
/// Two regions with equal identities are the same allocation. A store that
/// is replaced (for example on growth) gets a fresh identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryIdentity(u64);

impl MemoryIdentity {
    /// Issues a new identity that has never been handed out before.
    #[must_use]
    pub fn fresh() -> Self {
        Self(NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw token value (for logging).
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Errors from bounded memory access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// Access outside the current region.
    #[error("memory access out of bounds: offset=0x{offset:x}, len=0x{len:x}, region=0x{region_len:x}")]
    OutOfBounds {
        /// First byte of the access.
        offset: u64,
        /// Length of the access.
        len: u64,
        /// Byte length of the region at the time of access.
        region_len: usize,
    },
}

/// Read-only view of a foreign memory region, valid for one tick.
///
/// This is a borrow: it cannot be kept across ticks, which is exactly the
/// constraint the foreign side imposes (its store may be replaced between
/// ticks).
#[derive(Debug, Clone, Copy)]
pub struct MemoryRegion<'a> {
    identity: MemoryIdentity,
    bytes: &'a [u8],
}

impl<'a> MemoryRegion<'a> {
    /// Wraps a borrowed byte store with its identity.
    #[must_use]
    pub const fn new(identity: MemoryIdentity, bytes: &'a [u8]) -> Self {
        Self { identity, bytes }
    }

    /// Identity of the backing store.
    #[must_use]
    pub const fn identity(&self) -> MemoryIdentity {
        self.identity
    }

    /// Current byte length.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the region holds no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// All bytes of the region.
    #[must_use]
    pub const fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// Bounded sub-slice `[offset, offset + len)`.
    ///
    /// Returns `None` on overflow or when the range leaves the region.
    #[inline]
    #[must_use]
    pub fn slice(&self, offset: u64, len: u64) -> Option<&'a [u8]> {
        let start = usize::try_from(offset).ok()?;
        let len = usize::try_from(len).ok()?;
        let end = start.checked_add(len)?;
        self.bytes.get(start..end)
    }
}

/// Owned, page-granular, growable byte store.
///
/// Mirrors the semantics of a WebAssembly linear memory: sizes are whole
/// pages, growth appends zeroed pages, and every growth that adds pages
/// moves the data into a new backing store with a new identity.
#[derive(Debug)]
pub struct LinearMemory {
    identity: MemoryIdentity,
    bytes: Vec<u8>,
    maximum_pages: u32,
}

impl LinearMemory {
    /// Creates a memory of `initial_pages` zeroed pages that may grow up to
    /// `maximum_pages`.
    #[must_use]
    pub fn new(initial_pages: u32, maximum_pages: u32) -> Self {
        let maximum_pages = maximum_pages.max(initial_pages);
        Self {
            identity: MemoryIdentity::fresh(),
            bytes: vec![0; initial_pages as usize * PAGE_SIZE],
            maximum_pages,
        }
    }

    /// Identity of the current backing store.
    #[must_use]
    pub const fn identity(&self) -> MemoryIdentity {
        self.identity
    }

    /// Current size in pages.
    #[must_use]
    pub fn size_pages(&self) -> u32 {
        // Size never exceeds maximum_pages (a u32) pages.
        u32::try_from(self.bytes.len() / PAGE_SIZE).unwrap_or(u32::MAX)
    }

    /// Configured growth limit in pages.
    #[must_use]
    pub const fn maximum_pages(&self) -> u32 {
        self.maximum_pages
    }

    /// Current size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the memory has zero pages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Grows by `delta_pages`.
    ///
    /// Returns the previous size in pages, or `None` if the maximum would be
    /// exceeded. A growth that adds pages replaces the backing store and
    /// issues a new identity; `grow(0)` keeps both.
    pub fn grow(&mut self, delta_pages: u32) -> Option<u32> {
        let old_pages = self.size_pages();
        if delta_pages == 0 {
            return Some(old_pages);
        }
        let new_pages = old_pages.checked_add(delta_pages)?;
        if new_pages > self.maximum_pages {
            return None;
        }

        let mut replacement = vec![0; new_pages as usize * PAGE_SIZE];
        replacement[..self.bytes.len()].copy_from_slice(&self.bytes);
        self.bytes = replacement;
        self.identity = MemoryIdentity::fresh();

        tracing::debug!(
            old_pages,
            new_pages,
            identity = self.identity.raw(),
            "linear memory grown"
        );
        Some(old_pages)
    }

    /// Borrowed read-only view for one tick.
    #[must_use]
    pub fn as_region(&self) -> MemoryRegion<'_> {
        MemoryRegion::new(self.identity, &self.bytes)
    }

    /// Mutable access for the owner.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Bounded write of `data` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::OutOfBounds`] if the range leaves the memory.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), MemoryError> {
        let region_len = self.bytes.len();
        let out_of_bounds = || MemoryError::OutOfBounds {
            offset,
            len: data.len() as u64,
            region_len,
        };
        let start = usize::try_from(offset).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(data.len()).ok_or_else(out_of_bounds)?;
        let slice = self.bytes.get_mut(start..end).ok_or_else(out_of_bounds)?;
        slice.copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identities_are_unique() {
        let a = MemoryIdentity::fresh();
        let b = MemoryIdentity::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn test_grow_replaces_identity() {
        let mut memory = LinearMemory::new(1, 4);
        let before = memory.identity();

        assert_eq!(memory.grow(2), Some(1));
        assert_eq!(memory.size_pages(), 3);
        assert_ne!(memory.identity(), before);
    }

    #[test]
    fn test_grow_zero_keeps_identity() {
        let mut memory = LinearMemory::new(1, 4);
        let before = memory.identity();

        assert_eq!(memory.grow(0), Some(1));
        assert_eq!(memory.identity(), before);
    }

    #[test]
    fn test_grow_past_maximum_fails() {
        let mut memory = LinearMemory::new(2, 3);
        let before = memory.identity();

        assert_eq!(memory.grow(2), None);
        assert_eq!(memory.size_pages(), 2);
        assert_eq!(memory.identity(), before);
    }

    #[test]
    fn test_grow_preserves_contents() {
        let mut memory = LinearMemory::new(1, 2);
        memory.write(100, &[1, 2, 3]).unwrap();
        memory.grow(1).unwrap();

        let region = memory.as_region();
        assert_eq!(region.slice(100, 3), Some(&[1u8, 2, 3][..]));
        assert_eq!(region.len(), 2 * PAGE_SIZE);
    }

    #[test]
    fn test_slice_bounds() {
        let memory = LinearMemory::new(1, 1);
        let region = memory.as_region();

        assert!(region.slice(0, PAGE_SIZE as u64).is_some());
        assert!(region.slice(1, PAGE_SIZE as u64).is_none());
        assert!(region.slice(u64::MAX, 2).is_none());
        assert!(region.slice(PAGE_SIZE as u64, 0).is_some());
    }

    #[test]
    fn test_write_out_of_bounds() {
        let mut memory = LinearMemory::new(1, 1);
        let err = memory.write(PAGE_SIZE as u64 - 1, &[0, 0]).unwrap_err();
        assert!(matches!(err, MemoryError::OutOfBounds { len: 2, .. }));
    }
}
