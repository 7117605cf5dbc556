//! # Chunk Iteration Benchmark
//!
//! Column-at-a-time updates over chunked archetypes, against a plain
//! `Vec` baseline.
//!
//! Run with: `cargo bench --package strata_core --bench archetype_benchmark`

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata_core::{EntityRegistry, RegistryConfig, TypeRegistry};

const ENTITY_COUNT: u32 = 1_000_000;

#[derive(Clone, Copy, Default)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}

#[derive(Clone, Copy, Default)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}

fn populated(config: &RegistryConfig) -> EntityRegistry {
    let mut types = TypeRegistry::new();
    types.register::<Position>().unwrap();
    types.register::<Velocity>().unwrap();

    let mut registry = EntityRegistry::with_config(Arc::new(types), config).unwrap();
    registry.create_typed::<(Position, Velocity)>(ENTITY_COUNT).unwrap();

    registry.range_mut::<(Velocity,)>().unwrap().for_each_chunk(|mut chunk| {
        for v in chunk.columns().0.iter_mut() {
            *v = Velocity { x: 0.1, y: 0.2, z: 0.3 };
        }
    });

    registry
}

// =============================================================================
// CHUNK ITERATION
// =============================================================================

fn bench_integrate(c: &mut Criterion) {
    let mut group = c.benchmark_group("integrate_1M");

    for (name, config) in [
        ("16K_chunks", RegistryConfig::default()),
        ("64K_chunks", RegistryConfig::large_chunks()),
    ] {
        let mut registry = populated(&config);

        group.bench_function(name, |b| {
            b.iter(|| {
                registry.range_mut::<(Position, Velocity)>().unwrap().for_each_chunk(|mut chunk| {
                    let (positions, velocities) = chunk.columns();
                    for (p, v) in positions.iter_mut().zip(velocities.iter()) {
                        p.x += v.x * 0.016;
                        p.y += v.y * 0.016;
                        p.z += v.z * 0.016;
                    }
                });
                black_box(registry.entities_count())
            });
        });
    }

    group.finish();
}

fn bench_read_only_sum(c: &mut Criterion) {
    let registry = populated(&RegistryConfig::default());

    c.bench_function("read_only_sum_1M", |b| {
        b.iter(|| {
            let mut sum = 0.0_f32;
            registry.range::<(Velocity,)>().unwrap().for_each_chunk(|_, (velocities,)| {
                for v in velocities {
                    sum += v.x + v.y + v.z;
                }
            });
            black_box(sum)
        });
    });
}

// =============================================================================
// BASELINE
// =============================================================================

fn bench_raw_vec(c: &mut Criterion) {
    let mut positions = vec![Position::default(); ENTITY_COUNT as usize];
    let velocities = vec![Velocity { x: 0.1, y: 0.2, z: 0.3 }; ENTITY_COUNT as usize];

    c.bench_function("raw_vec_integrate_1M", |b| {
        b.iter(|| {
            for (p, v) in positions.iter_mut().zip(velocities.iter()) {
                p.x += v.x * 0.016;
                p.y += v.y * 0.016;
                p.z += v.z * 0.016;
            }
            black_box(positions.len())
        });
    });
}

criterion_group!(benches, bench_integrate, bench_read_only_sum, bench_raw_vec);
criterion_main!(benches);
