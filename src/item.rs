//! Item record layout and accessors.
//!
//! Every cached entry is one contiguous record inside a slab chunk:
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       8     lru_next    (Handle)
//! 8       8     lru_prev    (Handle)
//! 16      8     hash_next   (Handle, collision chain)
//! 24      4     last_access (seconds since engine start)
//! 28      4     expire_time (seconds since engine start, 0 = never)
//! 32      4     value_len
//! 36      2     ref_count
//! 38      1     suffix_len
//! 39      1     flags       (LINKED | USES_CAS | SLABBED)
//! 40      1     slab_class_id
//! 41      1     key_len
//! 42      8     cas token   (only if USES_CAS)
//! ...           key bytes, one NUL pad byte, suffix, value bytes
//! ```
//!
//! The suffix is the textual `" <flags> <len>\r\n"` rendering a protocol
//! layer emits on a VALUE line; client flags live only there.
//!
//! `Item` is a copy type wrapping the record's handle; every accessor takes
//! the arena explicitly, so borrows are scoped to the single load or store.

use smallvec::SmallVec;

use crate::arena::{Handle, MemoryArena};

const LRU_NEXT_OFFSET: u32 = 0;
const LRU_PREV_OFFSET: u32 = 8;
const HASH_NEXT_OFFSET: u32 = 16;
const TIME_OFFSET: u32 = 24;
const EXPIRE_TIME_OFFSET: u32 = 28;
const VALUE_LENGTH_OFFSET: u32 = 32;
const REF_COUNT_OFFSET: u32 = 36;
const SUFFIX_LENGTH_OFFSET: u32 = 38;
const FLAGS_OFFSET: u32 = 39;
const SLAB_CLASS_OFFSET: u32 = 40;
const KEY_LENGTH_OFFSET: u32 = 41;
const CAS_OFFSET: u32 = 42;

const FLAG_LINKED: u8 = 1;
const FLAG_CAS: u8 = 2;
const FLAG_SLABBED: u8 = 4;

/// Size of the CAS token when present.
const CAS_SIZE: u32 = 8;

/// A short inline buffer for suffix rendering and key snapshots.
pub type KeyBuf = SmallVec<[u8; 64]>;

/// Render the textual suffix carrying client flags and value length.
pub fn render_suffix(user_flags: u32, value_len: usize) -> KeyBuf {
    let mut buf = KeyBuf::new();
    buf.extend_from_slice(format!(" {} {}\r\n", user_flags, value_len).as_bytes());
    buf
}

/// Parse the client flags back out of a rendered suffix.
///
/// Returns 0 if the suffix is malformed (it never is for records written by
/// this engine).
pub fn parse_suffix_flags(suffix: &[u8]) -> u32 {
    std::str::from_utf8(suffix)
        .ok()
        .and_then(|s| s.split_whitespace().next().map(str::to_owned))
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

/// A cached entry, addressed by handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item(Handle);

impl Item {
    /// Size of the fixed header, before the optional CAS token.
    pub const FIXED_SIZE: u32 = 42;

    /// Wrap a handle. `Handle::NONE` is allowed (chain walks produce it) but
    /// must not be dereferenced.
    #[inline]
    pub fn at(handle: Handle) -> Self {
        Item(handle)
    }

    #[inline]
    pub fn handle(&self) -> Handle {
        self.0
    }

    /// Total record size for the given component lengths.
    pub fn total_size_for(
        key_len: usize,
        suffix_len: usize,
        value_len: usize,
        use_cas: bool,
    ) -> u32 {
        let fixed = if use_cas {
            Self::FIXED_SIZE + CAS_SIZE
        } else {
            Self::FIXED_SIZE
        };
        fixed + key_len as u32 + 1 + suffix_len as u32 + value_len as u32
    }

    // ---------- link fields ----------

    #[inline]
    pub fn lru_next(&self, arena: &MemoryArena) -> Handle {
        Handle::from_raw(arena.get_u64(self.0, LRU_NEXT_OFFSET))
    }

    #[inline]
    pub fn set_lru_next(&self, arena: &mut MemoryArena, next: Handle) {
        arena.put_u64(self.0, LRU_NEXT_OFFSET, next.as_raw());
    }

    #[inline]
    pub fn lru_prev(&self, arena: &MemoryArena) -> Handle {
        Handle::from_raw(arena.get_u64(self.0, LRU_PREV_OFFSET))
    }

    #[inline]
    pub fn set_lru_prev(&self, arena: &mut MemoryArena, prev: Handle) {
        arena.put_u64(self.0, LRU_PREV_OFFSET, prev.as_raw());
    }

    #[inline]
    pub fn hash_next(&self, arena: &MemoryArena) -> Handle {
        Handle::from_raw(arena.get_u64(self.0, HASH_NEXT_OFFSET))
    }

    #[inline]
    pub fn set_hash_next(&self, arena: &mut MemoryArena, next: Handle) {
        arena.put_u64(self.0, HASH_NEXT_OFFSET, next.as_raw());
    }

    // ---------- metadata ----------

    #[inline]
    pub fn last_access(&self, arena: &MemoryArena) -> u32 {
        arena.get_u32(self.0, TIME_OFFSET)
    }

    #[inline]
    pub fn set_last_access(&self, arena: &mut MemoryArena, time: u32) {
        arena.put_u32(self.0, TIME_OFFSET, time);
    }

    #[inline]
    pub fn expire_time(&self, arena: &MemoryArena) -> u32 {
        arena.get_u32(self.0, EXPIRE_TIME_OFFSET)
    }

    #[inline]
    pub fn set_expire_time(&self, arena: &mut MemoryArena, expire: u32) {
        arena.put_u32(self.0, EXPIRE_TIME_OFFSET, expire);
    }

    #[inline]
    pub fn value_len(&self, arena: &MemoryArena) -> usize {
        arena.get_u32(self.0, VALUE_LENGTH_OFFSET) as usize
    }

    #[inline]
    pub fn ref_count(&self, arena: &MemoryArena) -> u16 {
        arena.get_u16(self.0, REF_COUNT_OFFSET)
    }

    #[inline]
    pub fn set_ref_count(&self, arena: &mut MemoryArena, count: u16) {
        arena.put_u16(self.0, REF_COUNT_OFFSET, count);
    }

    /// Take a reference on the record.
    #[inline]
    pub fn acquire(&self, arena: &mut MemoryArena) {
        let count = self.ref_count(arena);
        debug_assert!(count < u16::MAX);
        self.set_ref_count(arena, count + 1);
    }

    #[inline]
    pub fn suffix_len(&self, arena: &MemoryArena) -> usize {
        arena.get_u8(self.0, SUFFIX_LENGTH_OFFSET) as usize
    }

    #[inline]
    pub fn key_len(&self, arena: &MemoryArena) -> usize {
        arena.get_u8(self.0, KEY_LENGTH_OFFSET) as usize
    }

    #[inline]
    pub fn class_id(&self, arena: &MemoryArena) -> u8 {
        arena.get_u8(self.0, SLAB_CLASS_OFFSET)
    }

    #[inline]
    pub fn set_class_id(&self, arena: &mut MemoryArena, class_id: u8) {
        arena.put_u8(self.0, SLAB_CLASS_OFFSET, class_id);
    }

    // ---------- flags ----------

    #[inline]
    fn flags(&self, arena: &MemoryArena) -> u8 {
        arena.get_u8(self.0, FLAGS_OFFSET)
    }

    #[inline]
    fn set_flag(&self, arena: &mut MemoryArena, flag: u8, on: bool) {
        let flags = self.flags(arena);
        let flags = if on { flags | flag } else { flags & !flag };
        arena.put_u8(self.0, FLAGS_OFFSET, flags);
    }

    /// Linked: present in exactly one index chain and one LRU list.
    #[inline]
    pub fn is_linked(&self, arena: &MemoryArena) -> bool {
        self.flags(arena) & FLAG_LINKED != 0
    }

    #[inline]
    pub fn set_linked(&self, arena: &mut MemoryArena, linked: bool) {
        self.set_flag(arena, FLAG_LINKED, linked);
    }

    /// Slabbed: the chunk is back on a free list. Mutually exclusive with
    /// linked.
    #[inline]
    pub fn is_slabbed(&self, arena: &MemoryArena) -> bool {
        self.flags(arena) & FLAG_SLABBED != 0
    }

    #[inline]
    pub fn set_slabbed(&self, arena: &mut MemoryArena, slabbed: bool) {
        self.set_flag(arena, FLAG_SLABBED, slabbed);
    }

    #[inline]
    pub fn uses_cas(&self, arena: &MemoryArena) -> bool {
        self.flags(arena) & FLAG_CAS != 0
    }

    // ---------- CAS ----------

    /// The CAS token, or 0 if CAS is disabled for this record.
    #[inline]
    pub fn cas(&self, arena: &MemoryArena) -> u64 {
        if self.uses_cas(arena) {
            arena.get_u64(self.0, CAS_OFFSET)
        } else {
            0
        }
    }

    #[inline]
    pub fn set_cas(&self, arena: &mut MemoryArena, cas: u64) {
        if self.uses_cas(arena) {
            arena.put_u64(self.0, CAS_OFFSET, cas);
        }
    }

    // ---------- variable region ----------

    #[inline]
    fn key_offset(&self, arena: &MemoryArena) -> u32 {
        if self.uses_cas(arena) {
            Self::FIXED_SIZE + CAS_SIZE
        } else {
            Self::FIXED_SIZE
        }
    }

    #[inline]
    fn suffix_offset(&self, arena: &MemoryArena) -> u32 {
        // one NUL pad byte after the key
        self.key_offset(arena) + self.key_len(arena) as u32 + 1
    }

    #[inline]
    fn value_offset(&self, arena: &MemoryArena) -> u32 {
        self.suffix_offset(arena) + self.suffix_len(arena) as u32
    }

    #[inline]
    pub fn key<'a>(&self, arena: &'a MemoryArena) -> &'a [u8] {
        arena.bytes(self.0, self.key_offset(arena), self.key_len(arena))
    }

    #[inline]
    pub fn suffix<'a>(&self, arena: &'a MemoryArena) -> &'a [u8] {
        arena.bytes(self.0, self.suffix_offset(arena), self.suffix_len(arena))
    }

    #[inline]
    pub fn value<'a>(&self, arena: &'a MemoryArena) -> &'a [u8] {
        arena.bytes(self.0, self.value_offset(arena), self.value_len(arena))
    }

    #[inline]
    pub fn key_equals(&self, arena: &MemoryArena, key: &[u8]) -> bool {
        self.key_len(arena) == key.len() && self.key(arena) == key
    }

    /// Copy the key out, so the record can be mutated or recycled while the
    /// bytes are still needed.
    pub fn key_copy(&self, arena: &MemoryArena) -> KeyBuf {
        KeyBuf::from_slice(self.key(arena))
    }

    // ---------- lifecycle ----------

    /// Initialize a fresh (or recycled) chunk as a new record.
    ///
    /// The caller holds the creator's reference afterwards.
    #[allow(clippy::too_many_arguments)]
    pub fn init(
        &self,
        arena: &mut MemoryArena,
        class_id: u8,
        key: &[u8],
        suffix: &[u8],
        expire_time: u32,
        value_len: usize,
        use_cas: bool,
    ) {
        // a live record must never be overwritten
        debug_assert_eq!(self.class_id(arena), 0, "init over a live record");

        self.set_lru_next(arena, Handle::NONE);
        self.set_lru_prev(arena, Handle::NONE);
        self.set_hash_next(arena, Handle::NONE);

        self.set_last_access(arena, 0);
        self.set_expire_time(arena, expire_time);
        arena.put_u32(self.0, VALUE_LENGTH_OFFSET, value_len as u32);
        self.set_ref_count(arena, 1);

        arena.put_u8(self.0, SUFFIX_LENGTH_OFFSET, suffix.len() as u8);
        arena.put_u8(self.0, FLAGS_OFFSET, if use_cas { FLAG_CAS } else { 0 });
        arena.put_u8(self.0, SLAB_CLASS_OFFSET, class_id);
        arena.put_u8(self.0, KEY_LENGTH_OFFSET, key.len() as u8);

        if use_cas {
            arena.put_u64(self.0, CAS_OFFSET, 0);
        }

        let key_off = self.key_offset(arena);
        arena.put_bytes(self.0, key_off, key);
        arena.put_u8(self.0, key_off + key.len() as u32, 0);
        arena.put_bytes(self.0, self.suffix_offset(arena), suffix);
    }

    /// Write the value payload.
    pub fn write_value(&self, arena: &mut MemoryArena, value: &[u8]) {
        debug_assert_eq!(self.value_len(arena), value.len());
        arena.put_bytes(self.0, self.value_offset(arena), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(arena: &mut MemoryArena, len: usize) -> Item {
        Item::at(arena.allocate(len, true).unwrap())
    }

    #[test]
    fn test_total_size() {
        // fixed + key + NUL + suffix + value
        assert_eq!(Item::total_size_for(3, 10, 5, false), 42 + 3 + 1 + 10 + 5);
        assert_eq!(Item::total_size_for(3, 10, 5, true), 42 + 8 + 3 + 1 + 10 + 5);
    }

    #[test]
    fn test_init_and_accessors() {
        let mut arena = MemoryArena::new(0, false);
        let item = scratch(&mut arena, 256);
        let suffix = render_suffix(42, 5);

        item.init(&mut arena, 3, b"key", &suffix, 100, 5, false);
        item.write_value(&mut arena, b"value");

        assert_eq!(item.key(&arena), b"key");
        assert_eq!(item.value(&arena), b"value");
        assert_eq!(item.suffix(&arena), &suffix[..]);
        assert_eq!(item.expire_time(&arena), 100);
        assert_eq!(item.class_id(&arena), 3);
        assert_eq!(item.ref_count(&arena), 1);
        assert!(!item.is_linked(&arena));
        assert!(!item.is_slabbed(&arena));
        assert!(!item.uses_cas(&arena));
        assert_eq!(item.cas(&arena), 0);
        assert!(item.lru_next(&arena).is_none());
        assert!(item.hash_next(&arena).is_none());
    }

    #[test]
    fn test_cas_layout() {
        let mut arena = MemoryArena::new(0, false);
        let item = scratch(&mut arena, 256);
        let suffix = render_suffix(7, 3);

        item.init(&mut arena, 1, b"k", &suffix, 0, 3, true);
        item.write_value(&mut arena, b"abc");

        assert!(item.uses_cas(&arena));
        item.set_cas(&mut arena, 0xDEAD_BEEF_CAFE_BABE);
        assert_eq!(item.cas(&arena), 0xDEAD_BEEF_CAFE_BABE);
        // key and value unaffected by the CAS write
        assert_eq!(item.key(&arena), b"k");
        assert_eq!(item.value(&arena), b"abc");
    }

    #[test]
    fn test_flags() {
        let mut arena = MemoryArena::new(0, false);
        let item = scratch(&mut arena, 128);
        item.init(&mut arena, 1, b"k", b" 0 0\r\n", 0, 0, false);

        item.set_linked(&mut arena, true);
        assert!(item.is_linked(&arena));
        item.set_linked(&mut arena, false);
        assert!(!item.is_linked(&arena));

        item.set_slabbed(&mut arena, true);
        assert!(item.is_slabbed(&arena));
    }

    #[test]
    fn test_key_equals() {
        let mut arena = MemoryArena::new(0, false);
        let item = scratch(&mut arena, 128);
        item.init(&mut arena, 1, b"alpha", b" 0 0\r\n", 0, 0, false);

        assert!(item.key_equals(&arena, b"alpha"));
        assert!(!item.key_equals(&arena, b"alph"));
        assert!(!item.key_equals(&arena, b"alphb"));
    }

    #[test]
    fn test_suffix_roundtrip() {
        let suffix = render_suffix(123456, 789);
        assert_eq!(&suffix[..], b" 123456 789\r\n");
        assert_eq!(parse_suffix_flags(&suffix), 123456);
        assert_eq!(parse_suffix_flags(b"garbage"), 0);
    }

    #[test]
    fn test_ref_counting() {
        let mut arena = MemoryArena::new(0, false);
        let item = scratch(&mut arena, 128);
        item.init(&mut arena, 1, b"k", b" 0 0\r\n", 0, 0, false);

        assert_eq!(item.ref_count(&arena), 1);
        item.acquire(&mut arena);
        assert_eq!(item.ref_count(&arena), 2);
        item.set_ref_count(&mut arena, 0);
        assert_eq!(item.ref_count(&arena), 0);
    }
}
