//! Byte-addressable memory arena with handle-based access.
//!
//! The arena replaces the raw-pointer memory model of a traditional slab
//! cache with stable `Handle`s: a handle names a byte offset within one of
//! the arena's regions, and every record field access goes through typed,
//! bounds-checked load/store calls. Links between records ("next"/"prev"
//! fields) are stored as handles, never addresses.
//!
//! Regions handed out here back slabs and the LRU sentinel records. They are
//! never returned to the arena: the cache recycles chunks through per-class
//! free lists instead (never-shrink policy).

/// A stable reference to a byte offset within an arena region.
///
/// Packed as `(region << 32) | offset`. The all-ones value is the `NONE`
/// sentinel used to terminate chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// The null handle, used to terminate hash chains and LRU links.
    pub const NONE: Handle = Handle(u64::MAX);

    /// Create a handle from a region index and byte offset.
    #[inline]
    pub fn new(region: u32, offset: u32) -> Self {
        debug_assert!(region != u32::MAX);
        Handle(((region as u64) << 32) | offset as u64)
    }

    /// Reconstruct a handle from its packed representation.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    /// The packed representation, suitable for storage in a record field.
    #[inline]
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.0 == u64::MAX
    }

    #[inline]
    pub fn is_some(&self) -> bool {
        self.0 != u64::MAX
    }

    #[inline]
    fn region(&self) -> usize {
        (self.0 >> 32) as usize
    }

    #[inline]
    fn offset(&self) -> usize {
        self.0 as u32 as usize
    }

    /// A handle to `delta` bytes past this one, within the same region.
    #[inline]
    pub fn offset_by(&self, delta: u32) -> Handle {
        debug_assert!(self.is_some());
        Handle(self.0 + delta as u64)
    }
}

/// Chunk alignment for carved allocations.
const ALIGN: usize = 8;

/// A byte-addressable arena with a memory budget.
///
/// Two growth modes:
/// - lazy: each `allocate` obtains a fresh zeroed region, refused when the
///   budget would be exceeded (unless forced);
/// - prealloc: the full budget is obtained up front as one region and
///   allocations carve from it with 8-byte alignment; once exhausted,
///   forced allocations fall back to fresh regions.
pub struct MemoryArena {
    regions: Vec<Box<[u8]>>,
    /// Total budget in bytes; 0 means unbounded.
    budget: usize,
    /// Bytes handed out so far.
    used: usize,
    /// Carve cursor into region 0 when preallocated.
    prealloc_cursor: Option<usize>,
}

impl MemoryArena {
    /// Create an arena with the given budget (0 = unbounded).
    ///
    /// With `prealloc` set and a nonzero budget, the whole budget is
    /// obtained immediately as a single region.
    pub fn new(budget: usize, prealloc: bool) -> Self {
        let mut regions = Vec::new();
        let mut prealloc_cursor = None;
        if prealloc && budget > 0 {
            regions.push(vec![0u8; budget].into_boxed_slice());
            prealloc_cursor = Some(0);
        }
        Self {
            regions,
            budget,
            used: 0,
            prealloc_cursor,
        }
    }

    /// Bytes handed out so far.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Allocate a zeroed byte range of `len` bytes.
    ///
    /// Returns `None` when the budget is exhausted and `force` is not set.
    /// Forced allocations always succeed (first-slab-per-class guarantee).
    pub fn allocate(&mut self, len: usize, force: bool) -> Option<Handle> {
        if let Some(cursor) = self.prealloc_cursor {
            let aligned = cursor + (ALIGN - cursor % ALIGN) % ALIGN;
            if aligned + len <= self.regions[0].len() {
                self.prealloc_cursor = Some(aligned + len);
                self.used += len;
                return Some(Handle::new(0, aligned as u32));
            }
            if !force {
                return None;
            }
            // fall through to a fresh region
        } else if self.budget != 0 && self.used + len > self.budget && !force {
            return None;
        }

        let region = self.regions.len() as u32;
        self.regions.push(vec![0u8; len].into_boxed_slice());
        self.used += len;
        Some(Handle::new(region, 0))
    }

    #[inline]
    fn slice(&self, handle: Handle, offset: u32, len: usize) -> &[u8] {
        debug_assert!(handle.is_some(), "access through the null handle");
        let region = &self.regions[handle.region()];
        let start = handle.offset() + offset as usize;
        &region[start..start + len]
    }

    #[inline]
    fn slice_mut(&mut self, handle: Handle, offset: u32, len: usize) -> &mut [u8] {
        debug_assert!(handle.is_some(), "access through the null handle");
        let region = &mut self.regions[handle.region()];
        let start = handle.offset() + offset as usize;
        &mut region[start..start + len]
    }

    /// Read bytes at `handle + offset`.
    #[inline]
    pub fn bytes(&self, handle: Handle, offset: u32, len: usize) -> &[u8] {
        self.slice(handle, offset, len)
    }

    /// Write bytes at `handle + offset`.
    #[inline]
    pub fn put_bytes(&mut self, handle: Handle, offset: u32, data: &[u8]) {
        self.slice_mut(handle, offset, data.len()).copy_from_slice(data);
    }

    #[inline]
    pub fn get_u8(&self, handle: Handle, offset: u32) -> u8 {
        self.slice(handle, offset, 1)[0]
    }

    #[inline]
    pub fn put_u8(&mut self, handle: Handle, offset: u32, value: u8) {
        self.slice_mut(handle, offset, 1)[0] = value;
    }

    #[inline]
    pub fn get_u16(&self, handle: Handle, offset: u32) -> u16 {
        u16::from_le_bytes(self.slice(handle, offset, 2).try_into().unwrap())
    }

    #[inline]
    pub fn put_u16(&mut self, handle: Handle, offset: u32, value: u16) {
        self.slice_mut(handle, offset, 2)
            .copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn get_u32(&self, handle: Handle, offset: u32) -> u32 {
        u32::from_le_bytes(self.slice(handle, offset, 4).try_into().unwrap())
    }

    #[inline]
    pub fn put_u32(&mut self, handle: Handle, offset: u32, value: u32) {
        self.slice_mut(handle, offset, 4)
            .copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn get_u64(&self, handle: Handle, offset: u32) -> u64 {
        u64::from_le_bytes(self.slice(handle, offset, 8).try_into().unwrap())
    }

    #[inline]
    pub fn put_u64(&mut self, handle: Handle, offset: u32, value: u64) {
        self.slice_mut(handle, offset, 8)
            .copy_from_slice(&value.to_le_bytes());
    }
}
