use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::{CommandBuffer, CommandExecutor, PendingComponent};
use crate::archetype::{Archetype, ArchetypeIndex};
use crate::component::ComponentInfo;
use crate::entity::EntityId;
use crate::test_util::{self, DropCounter, Int, Name, Tag};
use crate::world::Config;

#[derive(Debug, PartialEq)]
enum Applied {
    Mutate { entity: EntityId, from: Option<ArchetypeIndex>, to: ArchetypeIndex, ints: Vec<i32> },
    Destroy(EntityId),
    InitCache(ArchetypeIndex),
}

#[derive(Default)]
struct Recorder {
    applied:  RefCell<Vec<Applied>>,
    /// An entity committed from inside `mutate_entity`, once.
    followup: Cell<Option<EntityId>>,
    buffer:   Cell<Option<*const CommandBuffer>>,
}

impl CommandExecutor for Recorder {
    fn mutate_entity(
        &self,
        entity: EntityId,
        from: Option<ArchetypeIndex>,
        to: ArchetypeIndex,
        added: &[PendingComponent],
    ) {
        let mut ints = Vec::new();
        for pending in added {
            if pending.drop_fn.is_none() {
                ints.push(unsafe { pending.data.cast::<Int>().as_ptr().read() }.0);
            } else {
                unsafe { pending.drop_value() };
            }
        }
        self.applied.borrow_mut().push(Applied::Mutate { entity, from, to, ints });

        if let (Some(followup), Some(buffer)) =
            (self.followup.take(), self.buffer.get())
        {
            let buffer = unsafe { &*buffer };
            buffer.commit(followup, None, &int_archetype(), ((), Int(99)));
            buffer.process_commands(self);
        }
    }

    fn destroy_entity(&self, entity: EntityId) {
        self.applied.borrow_mut().push(Applied::Destroy(entity));
    }

    fn init_cache_for_archetype(&self, archetype: ArchetypeIndex) {
        self.applied.borrow_mut().push(Applied::InitCache(archetype));
    }
}

fn int_archetype() -> Archetype {
    let infos = vec![ComponentInfo::of::<Int>()];
    Archetype::new(ArchetypeIndex::from_raw(3), infos, &Config::default())
}

#[test]
fn test_commands_are_applied_in_order() {
    test_util::init();

    let buffer = CommandBuffer::new(64);
    let archetype = int_archetype();
    let first = EntityId::new(1, 0);
    let second = EntityId::new(2, 0);

    buffer.init_cache(archetype.index());
    buffer.commit(first, None, &archetype, ((), Int(7)));
    buffer.destroy(second);
    buffer.commit(second, Some(ArchetypeIndex::from_raw(0)), &archetype, ((), Int(8)));
    assert_eq!(buffer.len(), 4);

    let recorder = Recorder::default();
    buffer.process_commands(&recorder);
    assert!(buffer.is_empty());

    assert_eq!(*recorder.applied.borrow(), [
        Applied::InitCache(archetype.index()),
        Applied::Mutate { entity: first, from: None, to: archetype.index(), ints: vec![7] },
        Applied::Destroy(second),
        Applied::Mutate {
            entity: second,
            from:   Some(ArchetypeIndex::from_raw(0)),
            to:     archetype.index(),
            ints:   vec![8],
        },
    ]);
}

#[test]
fn test_tags_are_not_staged() {
    let buffer = CommandBuffer::new(64);
    let mut infos = vec![ComponentInfo::of::<Int>(), ComponentInfo::of::<Tag>()];
    infos.sort_by_key(|info| info.id);
    let archetype = Archetype::new(ArchetypeIndex::from_raw(1), infos, &Config::default());

    buffer.commit(EntityId::new(0, 0), None, &archetype, (((), Tag), Int(5)));

    let recorder = Recorder::default();
    buffer.process_commands(&recorder);
    assert_eq!(*recorder.applied.borrow(), [Applied::Mutate {
        entity: EntityId::new(0, 0),
        from:   None,
        to:     archetype.index(),
        ints:   vec![5],
    }]);
}

#[test]
fn test_commits_during_processing_are_applied_in_the_same_flush() {
    test_util::init();

    let buffer = CommandBuffer::new(64);
    let archetype = int_archetype();
    buffer.commit(EntityId::new(1, 0), None, &archetype, ((), Int(1)));

    let recorder = Recorder::default();
    recorder.followup.set(Some(EntityId::new(2, 0)));
    recorder.buffer.set(Some(&buffer as *const _));
    buffer.process_commands(&recorder);

    let applied = recorder.applied.borrow();
    assert_eq!(applied.len(), 2, "nested process call is a no-op but the commit is kept");
    assert_eq!(applied[1], Applied::Mutate {
        entity: EntityId::new(2, 0),
        from:   None,
        to:     archetype.index(),
        ints:   vec![99],
    });
    assert!(!buffer.is_processing());
}

/// Destroys the entity with the next index whenever one is destroyed, up to `limit`.
struct ChainedDestroyer<'a> {
    buffer:    &'a CommandBuffer,
    limit:     u32,
    destroyed: RefCell<Vec<EntityId>>,
}

impl CommandExecutor for ChainedDestroyer<'_> {
    fn mutate_entity(
        &self,
        _: EntityId,
        _: Option<ArchetypeIndex>,
        _: ArchetypeIndex,
        _: &[PendingComponent],
    ) {
    }

    fn destroy_entity(&self, entity: EntityId) {
        self.destroyed.borrow_mut().push(entity);
        if entity.index() < self.limit {
            self.buffer.destroy(EntityId::new(entity.index() + 1, 0));
        }
    }

    fn init_cache_for_archetype(&self, _: ArchetypeIndex) {}
}

#[test]
fn test_destroys_during_processing_are_applied_in_the_same_flush() {
    test_util::init();

    let buffer = CommandBuffer::new(64);
    buffer.destroy(EntityId::new(0, 0));

    let executor = ChainedDestroyer { buffer: &buffer, limit: 3, destroyed: RefCell::default() };
    buffer.process_commands(&executor);

    let expected: Vec<EntityId> = (0..=3).map(|index| EntityId::new(index, 0)).collect();
    assert_eq!(*executor.destroyed.borrow(), expected);
    assert!(buffer.is_empty());
    assert!(!buffer.is_processing());
}

#[test]
#[should_panic = "while processing commands"]
fn test_init_cache_while_processing_panics() {
    struct InitializingExecutor<'a>(&'a CommandBuffer);

    impl<'a> CommandExecutor for InitializingExecutor<'a> {
        fn mutate_entity(
            &self,
            _: EntityId,
            _: Option<ArchetypeIndex>,
            _: ArchetypeIndex,
            _: &[PendingComponent],
        ) {
        }

        fn destroy_entity(&self, _: EntityId) {
            self.0.init_cache(ArchetypeIndex::from_raw(0));
        }

        fn init_cache_for_archetype(&self, _: ArchetypeIndex) {}
    }

    let buffer = CommandBuffer::new(64);
    buffer.destroy(EntityId::new(0, 0));
    buffer.process_commands(&InitializingExecutor(&buffer));
}

#[test]
fn test_unprocessed_payloads_are_dropped() {
    let drops = Rc::new(Cell::new(0));
    let mut infos = vec![ComponentInfo::of::<DropCounter>(), ComponentInfo::of::<Name>()];
    infos.sort_by_key(|info| info.id);
    let archetype = Archetype::new(ArchetypeIndex::from_raw(0), infos, &Config::default());

    let buffer = CommandBuffer::new(16);
    for index in 0..10 {
        let bundle = (((), DropCounter(Rc::clone(&drops))), Name(format!("entity {index}")));
        buffer.commit(EntityId::new(index, 0), None, &archetype, bundle);
    }
    assert_eq!(drops.get(), 0);

    drop(buffer);
    assert_eq!(drops.get(), 10);
}
