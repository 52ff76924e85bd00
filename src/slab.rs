//! Slab class allocator.
//!
//! Memory is handed out in fixed-size slab pages. Each page belongs to one
//! slab class and is carved into equal chunks; a record always occupies
//! exactly one chunk of the smallest class that fits it. Freed chunks go on
//! the class free list and are recycled in LIFO order. Pages are never
//! returned or moved between classes.

use crate::arena::{Handle, MemoryArena};
use crate::config::EngineConfig;
use crate::item::Item;

/// Chunk sizes are rounded up to this alignment.
const CHUNK_ALIGN: u32 = 8;

/// Smallest valid class id. Id 0 is reserved to mean "not in a class".
pub const CLASS_MIN: u8 = 1;

/// Most classes the one-byte id can address, terminal class included.
const MAX_CLASSES: usize = (u8::MAX - CLASS_MIN) as usize;

/// One size class.
struct SlabClass {
    /// Chunk size, including the fixed record header.
    chunk_size: u32,
    /// Chunks carved from one slab page.
    chunks_per_slab: u32,
    /// Recycled chunks, LIFO.
    free: Vec<Handle>,
    /// Partially carved page, `NONE` when exhausted.
    open_slab: Handle,
    /// Chunks already carved from the open page.
    open_carved: u32,
    /// Pages obtained so far.
    slab_count: u32,
}

/// Point-in-time view of one class, for stats and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabClassInfo {
    pub class_id: u8,
    pub chunk_size: u32,
    pub chunks_per_slab: u32,
    pub slab_count: u32,
    pub free_chunks: usize,
}

/// The full set of slab classes over one arena.
pub struct SlabClassAllocator {
    classes: Vec<SlabClass>,
    /// Slab page size; equals the largest chunk size.
    slab_size: u32,
}

impl SlabClassAllocator {
    /// Build the class table from the configured geometry.
    ///
    /// Chunk sizes start at the smallest payload plus header, rounded up to
    /// 8 bytes, and grow by the configured factor while no larger than half
    /// a page. A final class of exactly one chunk per page holds the largest
    /// records.
    pub fn new(config: &EngineConfig) -> Self {
        assert!(
            config.growth_factor > 1.0,
            "growth_factor must be greater than 1.0"
        );
        let slab_size = config.max_item_size as u32;
        let mut classes = Vec::new();

        let mut size = align_up(Item::FIXED_SIZE + config.min_chunk_payload as u32, CHUNK_ALIGN);
        while size <= slab_size / 2 && classes.len() + 1 < MAX_CLASSES {
            classes.push(SlabClass {
                chunk_size: size,
                chunks_per_slab: slab_size / size,
                free: Vec::new(),
                open_slab: Handle::NONE,
                open_carved: 0,
                slab_count: 0,
            });
            // truncation can stall small factors; force one alignment step
            let grown = (size as f64 * config.growth_factor) as u32;
            size = align_up(grown.max(size + 1), CHUNK_ALIGN);
        }

        // terminal class: one maximally sized chunk per page
        classes.push(SlabClass {
            chunk_size: slab_size,
            chunks_per_slab: 1,
            free: Vec::new(),
            open_slab: Handle::NONE,
            open_carved: 0,
            slab_count: 0,
        });

        debug_assert!(classes.len() <= MAX_CLASSES);
        Self { classes, slab_size }
    }

    #[inline]
    fn class(&self, class_id: u8) -> &SlabClass {
        &self.classes[(class_id - CLASS_MIN) as usize]
    }

    #[inline]
    fn class_mut(&mut self, class_id: u8) -> &mut SlabClass {
        &mut self.classes[(class_id - CLASS_MIN) as usize]
    }

    /// Number of size classes.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Largest id, inclusive.
    pub fn class_max(&self) -> u8 {
        CLASS_MIN + self.classes.len() as u8 - 1
    }

    /// Chunk size of a class.
    pub fn chunk_size(&self, class_id: u8) -> u32 {
        self.class(class_id).chunk_size
    }

    /// Smallest class whose chunks fit `size` bytes, or `None` when the
    /// record is larger than the terminal class.
    pub fn select_class(&self, size: u32) -> Option<u8> {
        self.classes
            .iter()
            .position(|c| size <= c.chunk_size)
            .map(|idx| CLASS_MIN + idx as u8)
    }

    /// Obtain a chunk for the class.
    ///
    /// Tries the free list, then the open page, then a fresh page. The first
    /// page of each class is obtained even past the memory budget, so every
    /// class can hold at least one record.
    pub fn allocate(&mut self, arena: &mut MemoryArena, class_id: u8) -> Option<Handle> {
        let slab_size = self.slab_size as usize;
        let class = self.class_mut(class_id);

        if let Some(handle) = class.free.pop() {
            return Some(handle);
        }

        if class.open_slab.is_none() || class.open_carved == class.chunks_per_slab {
            let force = class.slab_count == 0;
            class.open_slab = arena.allocate(slab_size, force)?;
            class.open_carved = 0;
            class.slab_count += 1;
        }

        let chunk = class.open_slab.offset_by(class.open_carved * class.chunk_size);
        class.open_carved += 1;
        Some(chunk)
    }

    /// Return a chunk to its class free list.
    ///
    /// The record must already be unlinked and unreferenced. Its class id is
    /// cleared so a later `Item::init` sees a dead record.
    pub fn free(&mut self, arena: &mut MemoryArena, class_id: u8, handle: Handle) {
        let item = Item::at(handle);
        debug_assert!(!item.is_linked(arena), "free of a linked record");
        debug_assert_eq!(item.ref_count(arena), 0, "free of a referenced record");

        item.set_slabbed(arena, true);
        item.set_class_id(arena, 0);
        self.class_mut(class_id).free.push(handle);
    }

    /// Free chunks currently on a class free list.
    pub fn free_chunks(&self, class_id: u8) -> usize {
        self.class(class_id).free.len()
    }

    /// Snapshot of every class.
    pub fn class_info(&self) -> Vec<SlabClassInfo> {
        self.classes
            .iter()
            .enumerate()
            .map(|(idx, c)| SlabClassInfo {
                class_id: CLASS_MIN + idx as u8,
                chunk_size: c.chunk_size,
                chunks_per_slab: c.chunks_per_slab,
                slab_count: c.slab_count,
                free_chunks: c.free.len(),
            })
            .collect()
    }
}

#[inline]
fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) / align * align
}
