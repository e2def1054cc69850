/// Tuning parameters of a [`World`](super::World).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// The granularity of archetype chunk sizes in bytes. Must be a power of two.
    pub chunk_size:         usize,
    /// The number of entities an archetype chunk should hold at least.
    ///
    /// Chunks are rounded up to a multiple of `chunk_size`,
    /// so the actual capacity is usually larger.
    pub chunk_entity_count: usize,
    /// The initial size of the arenas backing commands and events.
    pub arena_chunk_size:   usize,
}

impl Default for Config {
    fn default() -> Self {
        Self { chunk_size: 16 * 1024, chunk_entity_count: 100, arena_chunk_size: 64 * 1024 }
    }
}
