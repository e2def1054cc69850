//! Entity handles and slot indices.

use std::fmt;

use xias::Xias;

pub mod storage;
pub use storage::{EntityRecord, EntityState, EntityStorage};


/// A generation-checked handle to an entity.
///
/// The lower 24 bits store the index of the entity record,
/// and the upper 8 bits store the generation of the record when the handle was issued.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(u32);

static_assertions::assert_eq_size!(EntityId, u32);

impl EntityId {
    /// The handle that never refers to any entity.
    pub const INVALID: Self = Self(u32::MAX);

    const INDEX_BITS: u32 = 24;
    const INDEX_MASK: u32 = (1 << Self::INDEX_BITS) - 1;

    /// The largest index a live entity can have.
    ///
    /// `INDEX_MASK` itself is excluded so that no live handle equals [`EntityId::INVALID`].
    pub const MAX_INDEX: u32 = Self::INDEX_MASK - 1;

    /// Packs an index and a generation into a handle.
    pub fn new(index: u32, generation: u8) -> Self {
        debug_assert!(index <= Self::MAX_INDEX, "entity index {index} is out of range");
        Self((u32::from(generation) << Self::INDEX_BITS) | (index & Self::INDEX_MASK))
    }

    /// The index of the entity record.
    pub fn index(self) -> u32 { self.0 & Self::INDEX_MASK }

    pub(crate) fn index_usize(self) -> usize { self.index().small_int() }

    /// The generation the record had when this handle was issued.
    pub fn generation(self) -> u8 { (self.0 >> Self::INDEX_BITS).small_int() }

    /// Whether this handle is not [`EntityId::INVALID`].
    ///
    /// A valid handle may still refer to a dead entity.
    pub fn is_valid(self) -> bool { self != Self::INVALID }

    /// The packed representation.
    pub fn raw(self) -> u32 { self.0 }
}

impl Default for EntityId {
    fn default() -> Self { Self::INVALID }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "EntityId({}:{})", self.index(), self.generation())
        } else {
            write!(f, "EntityId(INVALID)")
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.index(), self.generation())
    }
}

/// The location of an entity inside one archetype.
///
/// The lower 18 bits store the index inside the chunk,
/// and the upper 14 bits store the chunk number.
/// The value is meaningless outside the archetype that produced it.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeEntityIndex(u32);

static_assertions::assert_eq_size!(ArchetypeEntityIndex, u32);

impl ArchetypeEntityIndex {
    /// A placeholder for records that are not placed in any archetype.
    pub const INVALID: Self = Self(u32::MAX);

    const INDEX_BITS: u32 = 18;
    const INDEX_MASK: u32 = (1 << Self::INDEX_BITS) - 1;

    /// The maximum number of entities in one chunk.
    pub const MAX_CHUNK_CAPACITY: u32 = 1 << Self::INDEX_BITS;

    /// The maximum number of chunks in one archetype.
    pub const MAX_CHUNKS: u32 = 1 << (32 - Self::INDEX_BITS);

    /// Packs a chunk number and an index inside the chunk.
    pub fn new(chunk: u32, index_in_chunk: u32) -> Self {
        assert!(chunk < Self::MAX_CHUNKS, "archetype chunk count exceeded");
        debug_assert!(index_in_chunk < Self::MAX_CHUNK_CAPACITY);
        Self((chunk << Self::INDEX_BITS) | index_in_chunk)
    }

    /// Computes the slot of the `dense`-th entity for the given chunk capacity.
    pub fn from_dense(dense: u32, chunk_capacity: u32) -> Self {
        Self::new(dense / chunk_capacity, dense % chunk_capacity)
    }

    /// The chunk number.
    pub fn chunk(self) -> u32 { self.0 >> Self::INDEX_BITS }

    /// The index inside the chunk.
    pub fn index_in_chunk(self) -> u32 { self.0 & Self::INDEX_MASK }

    /// The dense index of this slot in an archetype with the given chunk capacity.
    pub fn dense(self, chunk_capacity: u32) -> u32 {
        self.chunk() * chunk_capacity + self.index_in_chunk()
    }

    /// The packed representation.
    pub fn raw(self) -> u32 { self.0 }
}

impl fmt::Debug for ArchetypeEntityIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "ArchetypeEntityIndex(INVALID)")
        } else {
            write!(f, "ArchetypeEntityIndex({}#{})", self.chunk(), self.index_in_chunk())
        }
    }
}
