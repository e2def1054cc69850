//! The handle table mapping entities to their archetype slots.

use xias::Xias;

use super::{ArchetypeEntityIndex, EntityId};
use crate::archetype::ArchetypeIndex;

/// The lifecycle state of an entity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// The record is free and waiting for reuse.
    Dead,
    /// The entity is placed in an archetype.
    Alive,
    /// The entity exists but has not been placed in an archetype yet.
    AsyncCreation,
    /// The entity is scheduled for destruction but its data is still readable.
    AsyncDestroy,
}

/// Where an entity currently lives.
#[derive(Debug, Clone, Copy)]
pub struct EntityRecord {
    /// The archetype holding the entity data, if it has been placed.
    pub archetype:         Option<ArchetypeIndex>,
    /// The archetype the entity will occupy after the next flush, if a change is staged.
    pub pending_archetype: Option<ArchetypeIndex>,
    /// The slot inside `archetype`.
    pub index:             ArchetypeEntityIndex,
    /// The current generation of the record.
    pub generation:        u8,
    /// The lifecycle state.
    pub state:             EntityState,
}

impl EntityRecord {
    fn new(state: EntityState) -> Self {
        Self {
            archetype: None,
            pending_archetype: None,
            index: ArchetypeEntityIndex::INVALID,
            generation: 0,
            state,
        }
    }

    /// The archetype the entity will occupy once staged changes are applied.
    pub fn effective_archetype(&self) -> Option<ArchetypeIndex> {
        self.pending_archetype.or(self.archetype)
    }
}

/// Stores an [`EntityRecord`] for every entity index ever allocated.
#[derive(Default)]
pub struct EntityStorage {
    records: Vec<EntityRecord>,
    free:    Vec<u32>,
}

impl EntityStorage {
    /// Allocates a new entity in the given state.
    ///
    /// Freed indices are reused first; their generation was already bumped on destruction.
    pub fn create(&mut self, state: EntityState) -> EntityId {
        if let Some(index) = self.free.pop() {
            let record = self.records.get_mut(index.small_int::<usize>()).expect("free index");
            debug_assert_eq!(record.state, EntityState::Dead);
            *record = EntityRecord { generation: record.generation, ..EntityRecord::new(state) };
            return EntityId::new(index, record.generation);
        }

        let index: u32 = self.records.len().small_int();
        assert!(index <= EntityId::MAX_INDEX, "Too many entities");
        self.records.push(EntityRecord::new(state));
        EntityId::new(index, 0)
    }

    fn record(&self, id: EntityId) -> Option<&EntityRecord> {
        if !id.is_valid() {
            return None;
        }

        let record = self.records.get(id.index_usize())?;
        (record.generation == id.generation()).then_some(record)
    }

    fn record_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        if !id.is_valid() {
            return None;
        }

        let record = self.records.get_mut(id.index_usize())?;
        (record.generation == id.generation()).then_some(record)
    }

    /// Whether the entity exists and may be targeted by new changes.
    pub fn is_alive(&self, id: EntityId) -> bool {
        matches!(
            self.record(id),
            Some(EntityRecord { state: EntityState::Alive | EntityState::AsyncCreation, .. })
        )
    }

    /// Whether the entity data may still be read.
    pub fn can_access(&self, id: EntityId) -> bool {
        matches!(
            self.record(id),
            Some(EntityRecord { state: EntityState::Alive | EntityState::AsyncDestroy, .. })
        )
    }

    /// Destroys the entity, bumping the generation and returning the index to the free list.
    ///
    /// Returns `false` if the handle is stale or the entity is already dead.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        let Some(record) = self.record_mut(id) else { return false };
        if record.state == EntityState::Dead {
            return false;
        }

        record.generation = record.generation.wrapping_add(1);
        record.state = EntityState::Dead;
        record.archetype = None;
        record.pending_archetype = None;
        record.index = ArchetypeEntityIndex::INVALID;
        self.free.push(id.index());

        log::trace!("Destroyed entity {id}");
        true
    }

    /// Repoints an entity to another slot in the same archetype.
    ///
    /// Entities scheduled for destruction are still repointed and stay scheduled.
    pub fn move_to(&mut self, id: EntityId, index: ArchetypeEntityIndex) -> bool {
        let Some(record) = self.record_mut(id) else { return false };
        match record.state {
            EntityState::Alive | EntityState::AsyncDestroy => {
                record.index = index;
                true
            }
            EntityState::Dead | EntityState::AsyncCreation => false,
        }
    }

    /// Repoints an entity to a slot in another archetype.
    pub fn mutate(
        &mut self,
        id: EntityId,
        archetype: ArchetypeIndex,
        index: ArchetypeEntityIndex,
    ) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        let record = self.record_mut(id).expect("checked by is_alive");
        record.archetype = Some(archetype);
        if record.pending_archetype == Some(archetype) {
            record.pending_archetype = None;
        }
        record.index = index;
        record.state = EntityState::Alive;
        true
    }

    /// Records the archetype an alive entity will move to at the next flush.
    pub fn set_pending(&mut self, id: EntityId, archetype: ArchetypeIndex) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        self.record_mut(id).expect("checked by is_alive").pending_archetype = Some(archetype);
        true
    }

    /// Marks an alive entity as scheduled for destruction.
    pub fn mark_destroying(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }

        self.record_mut(id).expect("checked by is_alive").state = EntityState::AsyncDestroy;
        true
    }

    /// Returns a copy of the record of an accessible entity.
    pub fn get(&self, id: EntityId) -> Option<EntityRecord> {
        if self.can_access(id) {
            self.record(id).copied()
        } else {
            None
        }
    }

    /// Returns a copy of the record of an entity that has not been destroyed.
    ///
    /// Unlike [`EntityStorage::get`], this also returns entities still waiting for placement.
    pub fn get_any(&self, id: EntityId) -> Option<EntityRecord> {
        self.record(id).filter(|record| record.state != EntityState::Dead).copied()
    }

    /// The number of entities that have not been destroyed.
    pub fn len(&self) -> usize { self.records.len() - self.free.len() }

    /// Whether no entity exists.
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
