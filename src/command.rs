//! Deferred structural changes.
//!
//! While any view, system or event dispatch is running,
//! the world cannot move entities between archetypes.
//! Such changes are queued here and applied when the world is unlocked.

use std::cell::{Cell, RefCell};
use std::mem;
use std::ptr::NonNull;

use bumpalo::Bump;

use crate::archetype::{Archetype, ArchetypeIndex};
use crate::component::Bundle;
use crate::entity::EntityId;

#[cfg(test)]
mod tests;

/// A component value staged in the command arena.
#[derive(Debug, Clone, Copy)]
pub struct PendingComponent {
    /// The column of the component in the target archetype.
    pub column:  usize,
    /// The staged value.
    pub data:    NonNull<u8>,
    /// The destructor of the component type, if any.
    pub drop_fn: Option<unsafe fn(*mut u8)>,
}

impl PendingComponent {
    /// Drops the staged value.
    ///
    /// # Safety
    /// The value must not have been moved out or dropped before.
    pub unsafe fn drop_value(&self) {
        if let Some(drop_fn) = self.drop_fn {
            drop_fn(self.data.as_ptr());
        }
    }
}

/// A queued structural change.
#[derive(Debug)]
pub enum Command {
    /// Moves an entity to another archetype and fills the added components.
    MutateEntity {
        /// The entity to move.
        entity: EntityId,
        /// The archetype the entity occupied when the command was queued.
        /// `None` for entities created while the world was locked.
        from:   Option<ArchetypeIndex>,
        /// The target archetype.
        to:     ArchetypeIndex,
        /// The values of the components added by this change, in the command arena.
        added:  NonNull<[PendingComponent]>,
    },
    /// Destroys an entity together with its components.
    DestroyEntity {
        /// The entity to destroy.
        entity: EntityId,
    },
    /// Adds a new archetype to the query caches.
    InitCacheForArchetype {
        /// The new archetype.
        archetype: ArchetypeIndex,
    },
}

/// Applies queued commands to the owner of the entity storage.
pub trait CommandExecutor {
    /// Applies a [`Command::MutateEntity`].
    ///
    /// Every value in `added` must be moved into the archetype or dropped.
    fn mutate_entity(
        &self,
        entity: EntityId,
        from: Option<ArchetypeIndex>,
        to: ArchetypeIndex,
        added: &[PendingComponent],
    );

    /// Applies a [`Command::DestroyEntity`].
    fn destroy_entity(&self, entity: EntityId);

    /// Applies a [`Command::InitCacheForArchetype`].
    fn init_cache_for_archetype(&self, archetype: ArchetypeIndex);
}

/// An arena-backed FIFO queue of [`Command`]s.
pub struct CommandBuffer {
    commands:   RefCell<Vec<Command>>,
    arena:      RefCell<Bump>,
    in_process: Cell<bool>,
}

impl CommandBuffer {
    /// Creates an empty buffer whose arena starts with `arena_chunk_size` bytes.
    pub fn new(arena_chunk_size: usize) -> Self {
        Self {
            commands:   RefCell::new(Vec::new()),
            arena:      RefCell::new(Bump::with_capacity(arena_chunk_size)),
            in_process: Cell::new(false),
        }
    }

    /// Queues the destruction of an entity.
    ///
    /// Destructions queued by the executor while processing are applied in the same call.
    pub fn destroy(&self, entity: EntityId) {
        self.commands.borrow_mut().push(Command::DestroyEntity { entity });
    }

    /// Queues the registration of a new archetype in the query caches.
    pub fn init_cache(&self, archetype: ArchetypeIndex) {
        assert!(
            !self.in_process.get(),
            "Cannot initialize caches for {archetype:?} while processing commands"
        );
        self.commands.borrow_mut().push(Command::InitCacheForArchetype { archetype });
    }

    /// Moves the values of `bundle` into the arena and queues a [`Command::MutateEntity`].
    ///
    /// Every component of `bundle` must be in `to`.
    pub fn commit<B: Bundle>(
        &self,
        entity: EntityId,
        from: Option<ArchetypeIndex>,
        to: &Archetype,
        bundle: B,
    ) {
        let arena = self.arena.borrow();
        let mut added = Vec::new();
        bundle.take(&mut |info, src| {
            if info.is_tag() {
                return;
            }

            let column = to.column_of(info.id).unwrap_or_else(|| {
                panic!("Component {} is not in the target archetype {:?}", info.name, to.id())
            });
            let data = arena.alloc_layout(info.layout);
            // Safety: `data` is fresh memory for this component type and `src` is moved out.
            unsafe { (info.move_fn)(data.as_ptr(), src) };
            added.push(PendingComponent { column, data, drop_fn: info.drop_fn });
        });

        let added = NonNull::from(arena.alloc_slice_copy(&added));
        drop(arena);

        let command = Command::MutateEntity { entity, from, to: to.index(), added };
        self.commands.borrow_mut().push(command);
    }

    /// The number of queued commands.
    pub fn len(&self) -> usize { self.commands.borrow().len() }

    /// Whether no command is queued.
    pub fn is_empty(&self) -> bool { self.commands.borrow().is_empty() }

    /// Whether [`CommandBuffer::process_commands`] is running.
    pub fn is_processing(&self) -> bool { self.in_process.get() }

    /// Applies all queued commands in FIFO order, then releases the arena.
    ///
    /// Commits and destructions queued by the executor while processing
    /// are applied in the same call.
    /// Does nothing if called again from inside the executor.
    pub fn process_commands(&self, executor: &dyn CommandExecutor) {
        if self.in_process.get() || self.is_empty() {
            return;
        }

        self.in_process.set(true);
        let mut processed = 0;
        loop {
            let commands = mem::take(&mut *self.commands.borrow_mut());
            if commands.is_empty() {
                break;
            }

            processed += commands.len();
            for command in commands {
                match command {
                    Command::MutateEntity { entity, from, to, added } => {
                        // Safety: the arena is not reset until all commands are processed.
                        let added = unsafe { added.as_ref() };
                        executor.mutate_entity(entity, from, to, added);
                    }
                    Command::DestroyEntity { entity } => executor.destroy_entity(entity),
                    Command::InitCacheForArchetype { archetype } => {
                        executor.init_cache_for_archetype(archetype);
                    }
                }
            }
        }
        self.in_process.set(false);

        self.arena.borrow_mut().reset();
        log::debug!("Processed {processed} commands");
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        for command in self.commands.get_mut().drain(..) {
            if let Command::MutateEntity { added, .. } = command {
                // Safety: unprocessed payloads are still owned by the buffer.
                unsafe {
                    for pending in added.as_ref() {
                        pending.drop_value();
                    }
                }
            }
        }
    }
}
