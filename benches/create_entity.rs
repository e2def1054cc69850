use criterion::*;
use rrecs::test_util::CompN;
use rrecs::World;

fn create_entity(c: &mut Criterion) {
    let mut group = c.benchmark_group("create entity");

    macro_rules! create_entity_batch {
        ($num_comps:literal; $($comps:expr),* $(,)?) => {
            for log_entities in (0..=12).step_by(4) {
                let entities = 1 << log_entities;
                group.throughput(Throughput::Elements(entities));
                group.bench_with_input(
                    BenchmarkId::new(
                        format!("{} components", $num_comps),
                        format!("{entities} entities"),
                    ),
                    &entities,
                    |b, &entities| {
                        b.iter_batched(
                            World::new,
                            |world| {
                                for _ in 0..entities {
                                    world.entity()$(.add($comps))*.apply();
                                }
                                world
                            },
                            BatchSize::SmallInput,
                        );
                    },
                );
            }
        }
    }

    create_entity_batch!(0; );
    create_entity_batch!(1; CompN::<1>(1));
    create_entity_batch!(2; CompN::<1>(1), CompN::<2>(2));
    create_entity_batch!(4; CompN::<1>(1), CompN::<2>(2), CompN::<3>(3), CompN::<4>(4));
    create_entity_batch!(
        8;
        CompN::<1>(1), CompN::<2>(2), CompN::<3>(3), CompN::<4>(4),
        CompN::<5>(5), CompN::<6>(6), CompN::<7>(7), CompN::<8>(8),
    );
}

fn create_entity_locked(c: &mut Criterion) {
    let mut group = c.benchmark_group("create entity (deferred)");

    for log_entities in (0..=12).step_by(4) {
        let entities = 1 << log_entities;
        group.throughput(Throughput::Elements(entities));
        group.bench_with_input(
            BenchmarkId::new("4 components", format!("{entities} entities")),
            &entities,
            |b, &entities| {
                b.iter_batched(
                    World::new,
                    |world| {
                        world.lock();
                        for _ in 0..entities {
                            world
                                .entity()
                                .add(CompN::<1>(1))
                                .add(CompN::<2>(2))
                                .add(CompN::<3>(3))
                                .add(CompN::<4>(4))
                                .apply();
                        }
                        world.unlock();
                        world
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

criterion_group!(benches, create_entity, create_entity_locked);
criterion_main!(benches);
