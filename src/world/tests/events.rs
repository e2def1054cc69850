//! Tests event dispatch, including the structural events.

use std::cell::RefCell;
use std::rc::Rc;

use super::{shared_log, take_log};
use crate::entity::EntityId;
use crate::event::{EventRef, OnAppear, OnDisappear};
use crate::query::On;
use crate::test_util::{self, Float, Int, IntEvent, Tag, TestEvent};
use crate::world::World;

#[test]
fn test_broadcast_event() {
    test_util::init();

    let world = World::new();
    for value in [1, 2, 3] {
        world.entity().add(Int(value)).apply();
    }
    world.entity().add(Float(0.0)).apply();

    let log = shared_log();
    let received = Rc::clone(&log);
    world.system("receiver").for_each(move |int: &Int, event: On<IntEvent>| {
        received.borrow_mut().push(int.0 + event.0);
    });

    world.emit(IntEvent(10));
    assert!(take_log(&log).is_empty(), "emitted events wait for processing");

    world.process_deferred_events();
    let mut values = take_log(&log);
    values.sort_unstable();
    assert_eq!(values, [11, 12, 13]);

    world.process_deferred_events();
    assert!(take_log(&log).is_empty(), "events are only dispatched once");
}

#[test]
fn test_unicast_event() {
    let world = World::new();
    world.entity().add(Int(1)).apply();
    let target = world.entity().add(Int(2)).apply();

    let log = shared_log();
    let received = Rc::clone(&log);
    world
        .system("receiver")
        .for_each(move |entity: EntityId, _: On<IntEvent>| received.borrow_mut().push(entity));

    world.event::<IntEvent>().entity(target).emit_immediately(IntEvent(0));
    assert_eq!(take_log(&log), [target]);

    world.event::<IntEvent>().entity(target).emit(IntEvent(0));
    world.destroy(target);
    world.process_deferred_events();
    assert!(take_log(&log).is_empty(), "events for destroyed entities are discarded");
}

#[test]
fn test_dispatch_follows_system_order() {
    test_util::init();

    let world = World::new();
    world.entity().add(Int(0)).apply();

    let log = shared_log();
    for (name, after) in [("third", Some("second")), ("second", Some("first")), ("first", None)] {
        let mut builder = world.system(name).on_event::<TestEvent>();
        if let Some(after) = after {
            builder = builder.after(after);
        }

        let received = Rc::clone(&log);
        builder.for_each(move |_: &Int| received.borrow_mut().push(name));
    }

    world.emit_immediately(TestEvent);
    assert_eq!(take_log(&log), ["first", "second", "third"]);
}

#[test]
fn test_events_emitted_during_processing_are_deferred() {
    let world = World::new();
    world.entity().add(Int(0)).apply();

    let log = shared_log();
    let received = Rc::clone(&log);
    world.system("counter").for_each(move |_: &Int, event: On<IntEvent>, world: &World| {
        received.borrow_mut().push(event.0);
        if event.0 < 3 {
            world.emit(IntEvent(event.0 + 1));
        }
    });

    world.emit(IntEvent(1));
    for expected in [vec![1], vec![2], vec![3], vec![]] {
        world.process_deferred_events();
        assert_eq!(take_log(&log), expected);
    }
}

#[test]
fn test_untyped_event_parameter() {
    let world = World::new();
    world.entity().add(Int(0)).apply();

    let log = shared_log();
    let received = Rc::clone(&log);
    world
        .system("untyped")
        .on_event::<IntEvent>()
        .for_each(move |_: &Int, event: EventRef<'_>| {
            received.borrow_mut().push(event.downcast::<IntEvent>().map(|event| event.0));
        });

    world.emit_immediately(IntEvent(5));
    assert_eq!(take_log(&log), [Some(5)]);
}

#[test]
fn test_on_appear() {
    test_util::init();

    let world = World::new();
    let log = shared_log();
    let received = Rc::clone(&log);
    world.system("appear").for_each(move |entity: EntityId, int: &Int, _: On<OnAppear>| {
        received.borrow_mut().push((entity, int.0));
    });

    let created = world.entity().add(Int(1)).apply();
    assert_eq!(take_log(&log), [(created, 1)], "components are initialized before OnAppear");

    let float = world.entity().add(Float(0.0)).apply();
    assert!(take_log(&log).is_empty());

    world.edit(float).add(Int(2)).apply();
    assert_eq!(take_log(&log), [(float, 2)]);

    world.edit(created).add(Float(1.0)).apply();
    assert!(take_log(&log).is_empty(), "the entity already matched");
}

#[test]
fn test_on_disappear() {
    test_util::init();

    let world = World::new();
    let log = shared_log();
    let received = Rc::clone(&log);
    world.system("disappear").without::<Tag>().for_each(
        move |entity: EntityId, int: &Int, _: On<OnDisappear>| {
            received.borrow_mut().push((entity, int.0));
        },
    );

    let tagged = world.entity().add(Int(1)).apply();
    let destroyed = world.entity().add(Int(2)).apply();
    assert!(take_log(&log).is_empty());

    world.edit(tagged).add(Tag).apply();
    assert_eq!(take_log(&log), [(tagged, 1)], "adding an excluded component is a disappearance");

    world.edit(tagged).remove::<Tag>().remove::<Int>().apply();
    assert!(take_log(&log).is_empty(), "the entity did not match before the edit");

    world.destroy(destroyed);
    assert_eq!(take_log(&log), [(destroyed, 2)], "components are still readable on OnDisappear");
}

#[test]
fn test_structural_events_while_locked() {
    let world = World::new();
    let log = shared_log();
    let received = Rc::clone(&log);
    world
        .system("appear")
        .for_each(move |entity: EntityId, _: &Int, _: On<OnAppear>| {
            received.borrow_mut().push(entity)
        });

    world.lock();
    let entity = world.entity().add(Int(0)).apply();
    assert!(take_log(&log).is_empty(), "OnAppear waits for the flush");
    world.unlock();
    assert_eq!(take_log(&log), [entity]);
}

#[test]
fn test_event_payloads_are_dropped() {
    use std::cell::Cell;

    use crate::test_util::DropEvent;

    let drops = Rc::new(Cell::new(0));
    let world = World::new();
    world.emit(DropEvent(Rc::clone(&drops)));
    world.emit_immediately(DropEvent(Rc::clone(&drops)));
    assert_eq!(drops.get(), 1);

    world.process_deferred_events();
    world.process_deferred_events();
    assert_eq!(drops.get(), 2);
}

fn destroy_on_appear(world: &World) {
    world.system("killer").for_each(
        |entity: EntityId, _: &Int, _: On<OnAppear>, world: &World| world.destroy(entity),
    );
}

#[test]
fn test_destroy_from_on_appear() {
    test_util::init();

    let world = World::new();
    destroy_on_appear(&world);

    let entity = world.entity().add(Int(1)).apply();
    assert!(!world.is_alive(entity));
    assert_eq!(world.entity_count(), 0);
}

#[test]
fn test_destroy_from_on_appear_while_flushing() {
    test_util::init();

    let world = World::new();
    destroy_on_appear(&world);
    let float = world.entity().add(Float(0.0)).apply();

    let mut created = Vec::new();
    world.view().for_each(|_: &Float, world: &World| {
        created.push(world.entity().add(Int(2)).apply());
    });

    assert_eq!(created.len(), 1);
    assert!(!world.is_alive(created[0]));
    assert!(world.is_alive(float));
    assert_eq!(world.entity_count(), 1);
}

/// Registers a system destroying entities that lose `Int`,
/// and another observing entities with `Tag`.
fn disappear_observers(world: &World) -> Rc<RefCell<Vec<(&'static str, EntityId)>>> {
    let log = shared_log();

    let received = Rc::clone(&log);
    world.system("killer").for_each(
        move |entity: EntityId, _: &Int, _: On<OnDisappear>, world: &World| {
            received.borrow_mut().push(("killer", entity));
            world.destroy(entity);
        },
    );

    let received = Rc::clone(&log);
    world.system("tagged").for_each(move |entity: EntityId, _: &Tag, _: On<OnDisappear>| {
        received.borrow_mut().push(("tagged", entity));
    });

    log
}

#[test]
fn test_destroy_from_on_disappear_notifies_once() {
    test_util::init();

    let world = World::new();
    let log = disappear_observers(&world);
    let entity = world.entity().add(Int(1)).add(Tag).apply();

    world.edit(entity).remove::<Int>().add(Float(0.0)).apply();
    assert_eq!(
        take_log(&log),
        [("killer", entity), ("tagged", entity)],
        "systems still matching after the edit are notified by the destruction",
    );
    assert!(!world.is_alive(entity));
    assert_eq!(world.entity_count(), 0);
}

#[test]
fn test_destroy_from_on_disappear_while_flushing() {
    test_util::init();

    let world = World::new();
    let log = disappear_observers(&world);
    let entity = world.entity().add(Int(1)).add(Tag).apply();
    let survivor = world.entity().add(Int(2)).add(Tag).apply();

    world.lock();
    world.edit(entity).remove::<Int>().add(Float(0.0)).apply();
    assert!(take_log(&log).is_empty());
    world.unlock();

    assert_eq!(take_log(&log), [("killer", entity), ("tagged", entity)]);
    assert!(!world.is_alive(entity));
    assert!(world.is_alive(survivor));
    assert_eq!(world.entity_count(), 1);
    assert_eq!(super::int_of(&world, survivor), Some(2), "swap-remove keeps other entities");
}

#[test]
fn test_edit_from_on_appear() {
    test_util::init();

    let world = World::new();
    world.system("tagger").without::<Tag>().for_each(
        |entity: EntityId, _: &Int, _: On<OnAppear>, world: &World| {
            world.edit(entity).add(Tag).apply();
        },
    );

    let immediate = world.entity().add(Int(1)).apply();
    assert!(world.has::<Tag>(immediate));

    world.lock();
    let deferred = world.entity().add(Int(2)).apply();
    world.unlock();
    assert!(world.has::<Tag>(deferred));
    assert_eq!(super::int_of(&world, deferred), Some(2));
}

#[test]
#[should_panic = "is already borrowed mutably"]
fn test_immediate_dispatch_cannot_alias_a_written_column() {
    let world = World::new();
    world.entity().add(Int(1)).apply();

    world.system("reader").for_each(|_: &Int, _: On<IntEvent>| {});
    world.system("writer").for_each(|int: &mut Int, world: &World| {
        int.0 += 1;
        world.emit_immediately(IntEvent(int.0));
    });
    world.tick();
}
