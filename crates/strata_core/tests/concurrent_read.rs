//! # Concurrent Read Tests
//!
//! Shared ranges never touch the structure, so many threads may walk the
//! same registry at once.
//!
//! Run with: cargo test -p strata_core --test concurrent_read

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use strata_core::{EntityRegistry, RegistryConfig, TypeRegistry};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Mass(f32);

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Charge(i64);

#[test]
fn test_parallel_chunk_iteration() {
    let mut types = TypeRegistry::new();
    types.register::<Mass>().unwrap();
    types.register::<Charge>().unwrap();

    let mut registry = EntityRegistry::with_config(Arc::new(types), &RegistryConfig::small_chunks()).unwrap();
    let first = registry.create_typed::<(Mass, Charge)>(1000).unwrap();
    registry.create_typed::<(Charge,)>(500).unwrap();

    for i in 0..1000u64 {
        registry.get_mut::<Charge>(first.offset(i)).unwrap().0 = i as i64;
    }

    let expected: i64 = (0..1000).sum();
    let totals = Mutex::new(Vec::new());

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let mut sum = 0i64;
                registry
                    .range::<(Charge,)>()
                    .unwrap()
                    .with_typed::<(Mass,)>()
                    .unwrap()
                    .for_each_chunk(|_, (charges,)| sum += charges.iter().map(|c| c.0).sum::<i64>());
                totals.lock().push(sum);
            });
        }
    });

    let totals = totals.into_inner();
    assert_eq!(totals.len(), 4);
    assert!(totals.iter().all(|&t| t == expected));
}
