//! Chunked columnar storage for all entities sharing one exact component set.
//!
//! Every chunk is a single allocation holding one column per component,
//! preceded by the [`EntityId`] column and followed by shadow columns of trackable components.
//! Live entities always occupy the dense range `[0, len)`;
//! deletion moves the last entity into the hole.

use std::alloc::{self, Layout};
use std::cell::{Cell, RefCell};
use std::ops::Range;
use std::ptr::NonNull;
use std::{fmt, mem};

use bitvec::prelude::BitVec;
use xias::Xias;

use crate::component::ComponentInfo;
use crate::entity::{ArchetypeEntityIndex, EntityId, EntityStorage};
use crate::id::{ArchetypeId, ComponentId, SystemId};
use crate::query::QueryDescription;
use crate::world::Config;


/// The position of an archetype in the world, assigned in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeIndex(u32);

impl ArchetypeIndex {
    /// Wraps a raw index.
    pub const fn from_raw(raw: u32) -> Self { Self(raw) }

    /// The raw index.
    pub const fn raw(self) -> u32 { self.0 }

    pub(crate) fn usize(self) -> usize { self.0.small_int() }
}

/// Receives the spans of entities whose tracked components changed.
pub trait TrackedChangeSink {
    /// Called once for each maximal span of changed entities in one chunk
    /// for each system tracking any of the changed components.
    fn dispatch_changes(
        &self,
        system: SystemId,
        archetype: &Archetype,
        chunk: u32,
        range: Range<u32>,
    );
}

#[derive(Debug, Clone, Copy)]
struct Column {
    offset:        usize,
    shadow_offset: Option<usize>,
    size:          usize,
}

/// A dynamic borrow of a component column, released on drop.
///
/// The counter is `-1` while borrowed exclusively
/// and counts the shared borrows otherwise.
#[derive(Debug)]
pub struct ColumnBorrow<'a> {
    flag: &'a Cell<isize>,
}

impl Drop for ColumnBorrow<'_> {
    fn drop(&mut self) {
        let flag = self.flag.get();
        self.flag.set(if flag < 0 { 0 } else { flag - 1 });
    }
}

const ENTITY_COLUMN: Column =
    Column { offset: 0, shadow_offset: None, size: mem::size_of::<EntityId>() };

/// Storage for entities with one exact component set.
pub struct Archetype {
    id:              ArchetypeId,
    index:           ArchetypeIndex,
    components:      Box<[ComponentInfo]>,
    component_ids:   Box<[ComponentId]>,
    columns:         Box<[Column]>,
    /// Columns of trackable components; the position in this list is the bit in tracking masks.
    tracked:         Box<[usize]>,
    chunk_layout:    Layout,
    chunk_capacity:  u32,
    chunks:          RefCell<Vec<NonNull<u8>>>,
    len:             Cell<u32>,
    tracked_systems: RefCell<Vec<(SystemId, BitVec)>>,
    borrows:         Box<[Cell<isize>]>,
}

impl Archetype {
    /// Creates an empty archetype.
    ///
    /// `components` must be sorted by id without duplicates.
    pub fn new(index: ArchetypeIndex, components: Vec<ComponentInfo>, config: &Config) -> Self {
        assert!(
            components.windows(2).all(|pair| pair[0].id < pair[1].id),
            "archetype components must be sorted and unique"
        );

        let component_ids: Box<[ComponentId]> = components.iter().map(|info| info.id).collect();
        let component_count = components.len();
        let (columns, chunk_capacity, chunk_layout) = compute_layout(&components, config);
        let tracked = components
            .iter()
            .enumerate()
            .filter(|(_, info)| info.is_trackable())
            .map(|(column, _)| column)
            .collect();

        let id = ArchetypeId::of(&component_ids);
        log::trace!(
            "Creating archetype {:?} with {} components, {} entities per chunk",
            id,
            components.len(),
            chunk_capacity
        );

        Self {
            id,
            index,
            components: components.into_boxed_slice(),
            component_ids,
            columns,
            tracked,
            chunk_layout,
            chunk_capacity,
            chunks: RefCell::new(Vec::new()),
            len: Cell::new(0),
            tracked_systems: RefCell::new(Vec::new()),
            borrows: (0..component_count).map(|_| Cell::new(0)).collect(),
        }
    }

    /// The content hash of the component set.
    pub fn id(&self) -> ArchetypeId { self.id }

    /// The position of this archetype in the world.
    pub fn index(&self) -> ArchetypeIndex { self.index }

    /// The component operation tables, sorted by id.
    pub fn components(&self) -> &[ComponentInfo] { &self.components }

    /// The sorted component ids.
    pub fn component_ids(&self) -> &[ComponentId] { &self.component_ids }

    /// The number of live entities.
    pub fn len(&self) -> u32 { self.len.get() }

    /// Whether there are no live entities.
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// The number of entities each chunk holds.
    pub fn chunk_capacity(&self) -> u32 { self.chunk_capacity }

    /// The size of each chunk in bytes.
    pub fn chunk_size(&self) -> usize { self.chunk_layout.size() }

    /// The number of allocated chunks.
    pub fn chunk_count(&self) -> u32 { self.chunks.borrow().len().small_int() }

    /// The number of live entities in the given chunk.
    pub fn chunk_len(&self, chunk: u32) -> u32 {
        let before = chunk * self.chunk_capacity;
        self.len().saturating_sub(before).min(self.chunk_capacity)
    }

    /// Whether the archetype has the component.
    pub fn has(&self, component: ComponentId) -> bool { self.column_of(component).is_some() }

    /// Whether the archetype has all of the `components`.
    pub fn has_all(&self, components: &[ComponentId]) -> bool {
        components.iter().all(|&component| self.has(component))
    }

    /// Whether the archetype has any of the `components`.
    pub fn has_any(&self, components: &[ComponentId]) -> bool {
        components.iter().any(|&component| self.has(component))
    }

    /// Whether the archetype satisfies the with/without predicate of `query`.
    pub fn matches(&self, query: &QueryDescription) -> bool {
        self.has_all(query.with()) && !self.has_any(query.without())
    }

    /// The column index of a component.
    pub fn column_of(&self, component: ComponentId) -> Option<usize> {
        self.component_ids.binary_search(&component).ok()
    }

    /// Borrows the values of a component column until the returned guard is dropped.
    ///
    /// # Panics
    /// Panics if the column is borrowed exclusively,
    /// or if `exclusive` is set and the column is borrowed at all.
    pub fn borrow_column(&self, column: usize, exclusive: bool) -> ColumnBorrow<'_> {
        let flag = self.borrows.get(column).expect("column index is out of bounds");
        let state = flag.get();
        if state < 0 || (exclusive && state > 0) {
            panic!(
                "Component {} in archetype {:?} is already borrowed {}",
                self.components[column].name,
                self.id,
                if state < 0 { "mutably" } else { "immutably" },
            );
        }

        flag.set(if exclusive { -1 } else { state + 1 });
        ColumnBorrow { flag }
    }

    fn slot(&self, column: Column, offset: usize, index: ArchetypeEntityIndex) -> *mut u8 {
        debug_assert!(index.dense(self.chunk_capacity) < self.capacity());
        let chunk = *self
            .chunks
            .borrow()
            .get(index.chunk().small_int::<usize>())
            .expect("slot index is out of bounds");
        let in_chunk: usize = index.index_in_chunk().small_int();
        // Safety: `offset + size * in_chunk` is within the chunk layout computed for the capacity.
        unsafe { chunk.as_ptr().add(offset + column.size * in_chunk) }
    }

    fn capacity(&self) -> u32 { self.chunk_count() * self.chunk_capacity }

    /// A pointer to the component value of `column` at `index`.
    ///
    /// The pointer is valid until the next structural change of this archetype.
    pub fn component_ptr(&self, column: usize, index: ArchetypeEntityIndex) -> NonNull<u8> {
        let column = *self.columns.get(column).expect("column index is out of bounds");
        let ptr = self.slot(column, column.offset, index);
        NonNull::new(ptr).expect("chunk pointers are non-null")
    }

    fn shadow_ptr(&self, column: usize, index: ArchetypeEntityIndex) -> Option<*mut u8> {
        let column = *self.columns.get(column).expect("column index is out of bounds");
        column.shadow_offset.map(|offset| self.slot(column, offset, index))
    }

    /// The entity stored at `index`.
    pub fn entity_at(&self, index: ArchetypeEntityIndex) -> EntityId {
        debug_assert!(index.dense(self.chunk_capacity) < self.len());
        let ptr = self.slot(ENTITY_COLUMN, ENTITY_COLUMN.offset, index);
        // Safety: live slots always hold an initialized entity id.
        unsafe { ptr.cast::<EntityId>().read() }
    }

    fn last_index(&self) -> ArchetypeEntityIndex {
        let len = self.len();
        assert!(len > 0, "archetype is empty");
        ArchetypeEntityIndex::from_dense(len - 1, self.chunk_capacity)
    }

    fn push_slot(&self) -> ArchetypeEntityIndex {
        let len = self.len();
        if len == self.capacity() {
            // Safety: the chunk layout has nonzero size.
            let ptr = unsafe { alloc::alloc(self.chunk_layout) };
            let Some(ptr) = NonNull::new(ptr) else {
                alloc::handle_alloc_error(self.chunk_layout)
            };
            self.chunks.borrow_mut().push(ptr);
        }

        self.len.set(len + 1);
        ArchetypeEntityIndex::from_dense(len, self.chunk_capacity)
    }

    /// Appends an entity whose components are left uninitialized for the caller to fill.
    pub fn insert(&self, entity: EntityId) -> ArchetypeEntityIndex {
        let index = self.push_slot();
        let ptr = self.slot(ENTITY_COLUMN, ENTITY_COLUMN.offset, index);
        // Safety: the slot was just reserved.
        unsafe { ptr.cast::<EntityId>().write(entity) };
        index
    }

    /// Moves a value into the uninitialized component slot, initializing its shadow if tracked.
    ///
    /// # Safety
    /// `src` must point to a valid value of the component type of `column`,
    /// which is logically moved out by this call.
    /// The slot must be uninitialized.
    pub unsafe fn write_component(&self, column: usize, index: ArchetypeEntityIndex, src: *mut u8) {
        let info = self.components.get(column).expect("column index is out of bounds");
        let dst = self.component_ptr(column, index).as_ptr();
        (info.move_fn)(dst, src);

        if let (Some(tracking), Some(shadow)) = (info.tracking, self.shadow_ptr(column, index)) {
            (tracking.clone_into)(shadow, dst);
        }
    }

    /// Moves the entity at `from_index` of `from` into a new slot of this archetype.
    ///
    /// Components present in both archetypes are moved together with their shadows,
    /// components only in `from` are dropped,
    /// and components only in `self` are left uninitialized for the caller to fill.
    pub fn mutate(
        &self,
        storage: &mut EntityStorage,
        from: &Archetype,
        from_index: ArchetypeEntityIndex,
    ) -> ArchetypeEntityIndex {
        assert!(self.id != from.id, "cannot mutate an entity into the same archetype");

        let entity = from.entity_at(from_index);
        let index = self.insert(entity);

        let mut moved = vec![false; from.components.len()];
        for (column, info) in self.components.iter().enumerate() {
            let Some(from_column) = from.column_of(info.id) else { continue };
            moved[from_column] = true;

            if info.is_tag() {
                continue;
            }

            // Safety: the destination slot is fresh and the source slot is live.
            unsafe {
                (info.move_fn)(
                    self.component_ptr(column, index).as_ptr(),
                    from.component_ptr(from_column, from_index).as_ptr(),
                );
                if let (Some(dst), Some(src)) =
                    (self.shadow_ptr(column, index), from.shadow_ptr(from_column, from_index))
                {
                    (info.move_fn)(dst, src);
                }
            }
        }

        let updated = storage.mutate(entity, self.index, index);
        debug_assert!(updated, "mutated entity {entity} is not alive");
        from.remove_slot(storage, from_index, |column| !moved[column]);

        index
    }

    /// Deletes the entity at `index`, dropping all its components.
    ///
    /// The last entity is moved into the freed slot and its record is repointed.
    /// If `update_record` is set, the record of the deleted entity is destroyed.
    pub fn delete(
        &self,
        storage: &mut EntityStorage,
        index: ArchetypeEntityIndex,
        update_record: bool,
    ) {
        let entity = self.entity_at(index);
        self.remove_slot(storage, index, |_| true);

        if update_record {
            storage.destroy(entity);
        }
    }

    fn remove_slot(
        &self,
        storage: &mut EntityStorage,
        index: ArchetypeEntityIndex,
        should_drop: impl Fn(usize) -> bool,
    ) {
        let last = self.last_index();

        for (column, info) in self.components.iter().enumerate() {
            let Some(drop_fn) = info.drop_fn else { continue };
            if !should_drop(column) {
                continue;
            }

            // Safety: the slot is live and is not read again before being overwritten or released.
            unsafe {
                drop_fn(self.component_ptr(column, index).as_ptr());
                if let Some(shadow) = self.shadow_ptr(column, index) {
                    drop_fn(shadow);
                }
            }
        }

        if index != last {
            let last_entity = self.entity_at(last);

            // Safety: both slots are within live chunks and do not overlap.
            unsafe {
                let ptr = self.slot(ENTITY_COLUMN, ENTITY_COLUMN.offset, index);
                ptr.cast::<EntityId>().write(last_entity);

                for (column, info) in self.components.iter().enumerate() {
                    if info.is_tag() {
                        continue;
                    }

                    (info.move_fn)(
                        self.component_ptr(column, index).as_ptr(),
                        self.component_ptr(column, last).as_ptr(),
                    );
                    if let (Some(dst), Some(src)) =
                        (self.shadow_ptr(column, index), self.shadow_ptr(column, last))
                    {
                        (info.move_fn)(dst, src);
                    }
                }
            }

            let moved = storage.move_to(last_entity, index);
            debug_assert!(moved, "swapped entity {last_entity} has no live record");
        }

        self.len.set(self.len() - 1);
    }

    /// Registers the trackable components among `components` that a system observes.
    ///
    /// Does nothing if none of them are tracked in this archetype.
    pub fn update_tracked_cache(&self, system: SystemId, components: &[ComponentId]) {
        let mask: BitVec = self
            .tracked
            .iter()
            .map(|&column| components.contains(&self.component_ids[column]))
            .collect();
        if mask.not_any() {
            return;
        }

        let mut systems = self.tracked_systems.borrow_mut();
        match systems.iter_mut().find(|(id, _)| *id == system) {
            Some((_, existing)) => *existing = mask,
            None => systems.push((system, mask)),
        }
    }

    /// The systems registered for change tracking.
    pub fn tracked_systems(&self) -> Vec<SystemId> {
        self.tracked_systems.borrow().iter().map(|&(system, _)| system).collect()
    }

    /// Compares every tracked component with its shadow and reports changed spans.
    ///
    /// The shadow of every changed value is updated,
    /// so each change is reported once.
    pub fn process_tracked_changes(&self, sink: &dyn TrackedChangeSink) {
        if self.tracked.is_empty() || self.is_empty() {
            return;
        }

        let systems = self.tracked_systems.borrow().clone();
        let capacity: usize = self.chunk_capacity.small_int();
        let mut changed: Vec<BitVec> = vec![BitVec::repeat(false, capacity); self.tracked.len()];

        for chunk in 0..self.chunk_count() {
            let chunk_len = self.chunk_len(chunk);
            let mut chunk_mask: BitVec = BitVec::repeat(false, self.tracked.len());

            for (bit, &column) in self.tracked.iter().enumerate() {
                let tracking =
                    self.components[column].tracking.expect("tracked columns are trackable");
                let entity_mask = &mut changed[bit];
                entity_mask.fill(false);
                let _borrow = self.borrow_column(column, false);

                for in_chunk in 0..chunk_len {
                    let index = ArchetypeEntityIndex::new(chunk, in_chunk);
                    let shadow =
                        self.shadow_ptr(column, index).expect("tracked columns have shadows");
                    let current = self.component_ptr(column, index).as_ptr();
                    // Safety: both slots are live values of the same component type.
                    if unsafe { (tracking.compare_and_assign)(shadow, current) } {
                        entity_mask.set(in_chunk.small_int(), true);
                        chunk_mask.set(bit, true);
                    }
                }
            }

            if chunk_mask.not_any() {
                continue;
            }

            for (system, mask) in &systems {
                if !mask.iter_ones().any(|bit| chunk_mask[bit]) {
                    continue;
                }

                let is_changed = |in_chunk: u32| {
                    let in_chunk: usize = in_chunk.small_int();
                    mask.iter_ones().any(|bit| changed[bit][in_chunk])
                };

                let mut start = None;
                for in_chunk in 0..=chunk_len {
                    let hit = in_chunk < chunk_len && is_changed(in_chunk);
                    match (start, hit) {
                        (None, true) => start = Some(in_chunk),
                        (Some(span_start), false) => {
                            sink.dispatch_changes(*system, self, chunk, span_start..in_chunk);
                            start = None;
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        for dense in 0..self.len() {
            let index = ArchetypeEntityIndex::from_dense(dense, self.chunk_capacity);
            for (column, info) in self.components.iter().enumerate() {
                let Some(drop_fn) = info.drop_fn else { continue };
                // Safety: every slot below `len` holds live values.
                unsafe {
                    drop_fn(self.component_ptr(column, index).as_ptr());
                    if let Some(shadow) = self.shadow_ptr(column, index) {
                        drop_fn(shadow);
                    }
                }
            }
        }

        for chunk in self.chunks.get_mut().drain(..) {
            // Safety: allocated in `push_slot` with the same layout.
            unsafe { alloc::dealloc(chunk.as_ptr(), self.chunk_layout) };
        }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("id", &self.id)
            .field("index", &self.index)
            .field("components", &self.components.iter().map(|info| info.name).collect::<Vec<_>>())
            .field("len", &self.len())
            .field("chunk_capacity", &self.chunk_capacity)
            .finish()
    }
}

fn align_up(value: usize, align: usize) -> usize { (value + align - 1) & !(align - 1) }

fn compute_layout(
    components: &[ComponentInfo],
    config: &Config,
) -> (Box<[Column]>, u32, Layout) {
    assert!(config.chunk_size.is_power_of_two(), "chunk size must be a power of two");

    let entity_size = ENTITY_COLUMN.size
        + components
            .iter()
            .map(|info| info.layout.size() * if info.is_trackable() { 2 } else { 1 })
            .sum::<usize>();
    let align = components
        .iter()
        .map(|info| info.layout.align())
        .fold(mem::align_of::<EntityId>(), usize::max);

    let chunk_size =
        (entity_size * config.chunk_entity_count / config.chunk_size + 1) * config.chunk_size;
    let max_capacity: usize = ArchetypeEntityIndex::MAX_CHUNK_CAPACITY.small_int();
    let mut capacity = (chunk_size / entity_size).min(max_capacity);

    loop {
        assert!(capacity > 0, "components are too large to fit in a chunk");

        let mut offset = ENTITY_COLUMN.size * capacity;
        let mut columns = Vec::with_capacity(components.len());
        for info in components {
            let size = info.layout.size();

            offset = align_up(offset, info.layout.align());
            let column_offset = offset;
            offset += size * capacity;

            let shadow_offset = info.is_trackable().then(|| {
                offset = align_up(offset, info.layout.align());
                let shadow_offset = offset;
                offset += size * capacity;
                shadow_offset
            });

            columns.push(Column { offset: column_offset, shadow_offset, size });
        }

        if offset > chunk_size {
            capacity -= 1;
            continue;
        }

        let layout = Layout::from_size_align(chunk_size, align).expect("chunk layout overflow");
        return (columns.into_boxed_slice(), capacity.small_int(), layout);
    }
}
