//! Tests views over matching entities.

use crate::entity::EntityId;
use crate::query::On;
use crate::test_util::{self, Float, Int, IntEvent, Tag};
use crate::world::{Config, World};

fn sum(world: &World) -> i32 {
    let mut sum = 0;
    world.view().for_each(|int: &Int| sum += int.0);
    sum
}

#[test]
fn test_view_filters() {
    test_util::init();

    let world = World::new();
    world.entity().add(Int(1)).apply();
    world.entity().add(Int(2)).add(Float(0.0)).apply();
    world.entity().add(Int(4)).add(Tag).apply();
    world.entity().add(Float(8.0)).apply();

    assert_eq!(sum(&world), 7);

    let mut untagged = 0;
    world.view().without::<Tag>().for_each(|int: &Int| untagged += int.0);
    assert_eq!(untagged, 3);

    let mut tagged = 0;
    world.view().with::<Tag>().for_each(|int: &Int| tagged += int.0);
    assert_eq!(tagged, 4);

    let mut floats = 0;
    world.view().with::<Float>().for_each(|_: EntityId| floats += 1);
    assert_eq!(floats, 2);
}

#[test]
fn test_view_writes() {
    let world = World::new();
    for value in 1..=3 {
        world.entity().add(Int(value)).add(Float(value as f32)).apply();
    }

    world.view().for_each(|int: &mut Int, float: &Float| int.0 *= float.0 as i32);
    assert_eq!(sum(&world), 1 + 4 + 9);
}

#[test]
fn test_view_across_chunks() {
    test_util::init();

    let world =
        World::with_config(Config { chunk_size: 64, chunk_entity_count: 2, ..Config::default() });
    let entities: Vec<EntityId> =
        (0..100).map(|value| world.entity().add(Int(value)).apply()).collect();
    assert_eq!(sum(&world), 4950);

    for entity in entities.iter().step_by(2) {
        world.destroy(*entity);
    }
    assert_eq!(sum(&world), 2500);

    let mut visited = Vec::new();
    world.view().for_each(|entity: EntityId, _: &Int| visited.push(entity));
    visited.sort_unstable();
    let expected: Vec<EntityId> = entities.iter().skip(1).step_by(2).copied().collect();
    assert_eq!(visited, expected);
}

#[test]
fn test_view_for_entity() {
    let world = World::new();
    let with_int = world.entity().add(Int(3)).apply();
    let without_int = world.entity().add(Float(1.0)).apply();

    assert!(world.view().for_entity(with_int, |int: &mut Int| int.0 += 1));
    assert!(!world.view().for_entity(without_int, |_: &Int| unreachable!()));
    assert!(!world.view().without::<Int>().for_entity(with_int, |_: EntityId| unreachable!()));

    world.destroy(with_int);
    assert!(!world.view().for_entity(with_int, |_: &Int| unreachable!()));
    assert!(world.view().for_entity(without_int, |_: &Float| {}));
}

#[test]
#[should_panic = "accessed both mutably and immutably"]
fn test_view_shared_and_mutable_alias() {
    World::new().view().for_each(|_: &mut Int, _: &Int| {});
}

#[test]
#[should_panic = "accessed mutably more than once"]
fn test_view_mutable_alias() {
    World::new().view().for_each(|_: &mut Int, _: &mut Int| {});
}

#[test]
#[should_panic = "View callables cannot take event parameters"]
fn test_view_with_event_parameter() {
    World::new().view().for_each(|_: &Int, _: On<IntEvent>| {});
}

#[test]
fn test_nested_views_share_reads() {
    let world = World::new();
    for value in 1..=3 {
        world.entity().add(Int(value)).apply();
    }

    let mut pairs = 0;
    world.view().for_each(|outer: &Int, world: &World| {
        world.view().for_each(|inner: &Int| {
            assert!(inner.0 >= 1 && outer.0 >= 1);
            pairs += 1;
        });
    });
    assert_eq!(pairs, 9);
}

#[test]
#[should_panic = "is already borrowed mutably"]
fn test_nested_view_mutable_alias() {
    let world = World::new();
    world.entity().add(Int(1)).apply();

    world.view().for_each(|outer: &mut Int, world: &World| {
        world.view().for_each(|inner: &mut Int| inner.0 += outer.0);
    });
}

#[test]
#[should_panic = "is already borrowed immutably"]
fn test_nested_for_entity_writes_a_read_column() {
    let world = World::new();
    let entity = world.entity().add(Int(1)).apply();

    world.view().for_each(|_: &Int, world: &World| {
        world.view().for_entity(entity, |inner: &mut Int| inner.0 = 0);
    });
}

#[test]
fn test_column_borrows_are_released_after_a_panic() {
    let world = World::new();
    let entity = world.entity().add(Int(1)).apply();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        world.view().for_each(|_: &mut Int, world: &World| {
            world.view().for_each(|_: &Int| {});
        });
    }));
    assert!(result.is_err());
    assert!(!world.is_locked());

    assert!(world.view().for_entity(entity, |int: &mut Int| int.0 = 5));
    assert_eq!(sum(&world), 5);
}
