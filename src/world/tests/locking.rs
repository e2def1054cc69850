//! Tests structural changes staged while the world is locked.

use std::cell::Cell;
use std::rc::Rc;

use super::int_of;
use crate::entity::EntityId;
use crate::test_util::{self, DropCounter, Float, Int};
use crate::world::World;

#[test]
fn test_deferred_creation() {
    test_util::init();

    let world = World::new();
    world.lock();
    let entity = world.entity().add(Int(1)).apply();
    assert!(world.is_alive(entity));
    assert!(world.has::<Int>(entity), "staged components are visible to `has`");
    assert_eq!(int_of(&world, entity), None, "the entity is not placed yet");

    world.unlock();
    assert_eq!(int_of(&world, entity), Some(1));
}

#[test]
fn test_deferred_destruction() {
    test_util::init();

    let world = World::new();
    let entity = world.entity().add(Int(1)).apply();

    world.lock();
    world.destroy(entity);
    assert!(!world.is_alive(entity));
    assert_eq!(int_of(&world, entity), Some(1), "data stays readable until the flush");

    world.unlock();
    assert_eq!(int_of(&world, entity), None);
    assert_eq!(world.entity_count(), 0);
}

#[test]
fn test_deferred_edits_chain() {
    let world = World::new();
    let entity = world.entity().add(Int(1)).apply();

    world.lock();
    world.edit(entity).add(Float(2.0)).apply();
    world.edit(entity).remove::<Int>().apply();
    assert!(world.has::<Float>(entity));
    assert!(!world.has::<Int>(entity));
    world.unlock();

    let mut float = None;
    assert!(world.view().for_entity(entity, |value: &Float| float = Some(value.0)));
    assert_eq!(float, Some(2.0));
    assert_eq!(int_of(&world, entity), None);
}

#[test]
fn test_create_and_destroy_while_locked() {
    let drops = Rc::new(Cell::new(0));
    let world = World::new();

    world.lock();
    let entity = world.entity().add(DropCounter(Rc::clone(&drops))).apply();
    world.destroy(entity);
    world.unlock();

    assert_eq!(drops.get(), 1);
    assert_eq!(world.entity_count(), 0);
    assert!(!world.is_alive(entity));
}

#[test]
fn test_nested_locks() {
    let world = World::new();
    world.lock();
    world.lock();
    let entity = world.entity().add(Int(1)).apply();

    world.unlock();
    assert!(world.is_locked());
    assert_eq!(int_of(&world, entity), None);

    world.unlock();
    assert!(!world.is_locked());
    assert_eq!(int_of(&world, entity), Some(1));
}

#[test]
#[should_panic = "World is not locked"]
fn test_unlock_without_lock() { World::new().unlock(); }

#[test]
fn test_changes_inside_view_are_deferred() {
    test_util::init();

    let world = World::new();
    for value in 0..3 {
        world.entity().add(Int(value)).apply();
    }

    let mut visits = 0;
    world.view().for_each(|entity: EntityId, int: &Int, world: &World| {
        assert!(world.is_locked());
        visits += 1;
        world.destroy(entity);
        world.entity().add(Int(int.0 + 10)).apply();
    });
    assert_eq!(visits, 3, "entities created during the iteration are not visited");

    let mut values = Vec::new();
    world.view().for_each(|int: &Int| values.push(int.0));
    values.sort_unstable();
    assert_eq!(values, [10, 11, 12]);
    assert_eq!(world.entity_count(), 3);
}
