use std::time::Duration;

use criterion::*;
use rand::Rng;
use rrecs::{Component, World};

#[derive(Component)]
struct Position([f64; 3]);

#[derive(Component)]
struct Velocity([f64; 3]);

#[derive(Component)]
struct PositionX(f64);
#[derive(Component)]
struct PositionY(f64);
#[derive(Component)]
struct PositionZ(f64);
#[derive(Component)]
struct VelocityX(f64);
#[derive(Component)]
struct VelocityY(f64);
#[derive(Component)]
struct VelocityZ(f64);

fn populate(world: &World, num_entities: u64, individual: bool) {
    let mut rng = rand::thread_rng();
    let mut gen = || rng.gen_range(-65536.0..=65536.0);
    for _ in 0..num_entities {
        if individual {
            world
                .entity()
                .add(PositionX(gen()))
                .add(PositionY(gen()))
                .add(PositionZ(gen()))
                .add(VelocityX(gen()))
                .add(VelocityY(gen()))
                .add(VelocityZ(gen()))
                .apply();
        } else {
            world
                .entity()
                .add(Position([gen(), gen(), gen()]))
                .add(Velocity([gen(), gen(), gen()]))
                .apply();
        }
    }
}

fn iter_entity_add_individual(c: &mut Criterion) {
    let mut group = c.benchmark_group("iter entity (a += b)");
    group.measurement_time(Duration::from_secs(10));

    for log_entities in (4..=16).step_by(4) {
        let num_entities = 1 << log_entities;
        group.throughput(Throughput::Elements(num_entities));
        group.bench_with_input(
            BenchmarkId::new("individual/system", format!("{num_entities} entities")),
            &num_entities,
            |b, &num_entities| {
                let world = World::new();
                populate(&world, num_entities, true);
                world.system("add").for_each(
                    |px: &mut PositionX,
                     py: &mut PositionY,
                     pz: &mut PositionZ,
                     vx: &VelocityX,
                     vy: &VelocityY,
                     vz: &VelocityZ| {
                        px.0 += vx.0;
                        py.0 += vy.0;
                        pz.0 += vz.0;
                    },
                );
                b.iter(|| world.tick())
            },
        );
    }
}

fn iter_entity_add_array(c: &mut Criterion) {
    let mut group = c.benchmark_group("iter entity (a += b)");
    group.measurement_time(Duration::from_secs(10));

    for log_entities in (4..=16).step_by(4) {
        let num_entities = 1 << log_entities;
        group.throughput(Throughput::Elements(num_entities));
        group.bench_with_input(
            BenchmarkId::new("array/view", format!("{num_entities} entities")),
            &num_entities,
            |b, &num_entities| {
                let world = World::new();
                populate(&world, num_entities, false);
                b.iter(|| {
                    world.view().for_each(|position: &mut Position, velocity: &Velocity| {
                        for (p, v) in position.0.iter_mut().zip(velocity.0) {
                            *p += v;
                        }
                    })
                })
            },
        );
    }
}

criterion_group!(benches, iter_entity_add_individual, iter_entity_add_array);
criterion_main!(benches);
