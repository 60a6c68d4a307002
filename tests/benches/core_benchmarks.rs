//! # Storm Core Benchmarks
//!
//! | Area | Operation | Target |
//! |------|-----------|--------|
//! | Event bus | publish + tick, 1k events, 4 subscribers | < 1ms per frame |
//! | State store | 1k uncontested writes | < 1ms |
//! | State store | synchronize with 100 open conflicts | < 1ms |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sc_01_state_store::StateStore;
use shared_bus::{EventBus, EventPublisher};
use shared_types::{ComponentId, EventType, NewEvent, Priority};
use std::time::Duration;

// ============================================================================
// EVENT BUS
// ============================================================================

fn bench_publish_and_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_frame");

    for events in [100usize, 1_000] {
        group.throughput(Throughput::Elements(events as u64));
        group.bench_with_input(BenchmarkId::from_parameter(events), &events, |b, &events| {
            let bus = EventBus::new();
            let mut mailboxes: Vec<_> = [
                ComponentId::RENDERER,
                ComponentId::INPUT,
                ComponentId::AI_ORCHESTRATOR,
                ComponentId::SYNC_COORDINATOR,
            ]
            .into_iter()
            .map(|component| {
                let id = bus.subscribe(component, &[EventType::EntityMovement]).unwrap();
                bus.take_mailbox(id).unwrap()
            })
            .collect();

            b.iter(|| {
                for i in 0..events {
                    let priority = Priority::ALL[i % Priority::COUNT];
                    bus.publish(
                        NewEvent::new(EventType::EntityMovement, ComponentId::PROTOCOL_BRIDGE)
                            .with_priority(priority)
                            .with_payload(vec![0u8; 32]),
                    )
                    .unwrap();
                }
                black_box(bus.tick(Duration::from_millis(16)));
                for mailbox in &mut mailboxes {
                    black_box(mailbox.drain());
                }
            });
        });
    }
    group.finish();
}

// ============================================================================
// STATE STORE
// ============================================================================

fn bench_uncontested_writes(c: &mut Criterion) {
    let paths: Vec<String> = (0..1_000).map(|i| format!("/world/objects/{i}/position")).collect();

    c.bench_function("state_uncontested_writes_1k", |b| {
        let store = StateStore::default();
        b.iter(|| {
            for path in &paths {
                black_box(store.update(path, vec![1, 2, 3], 1.0, "opensim").unwrap());
            }
        });
    });
}

fn bench_synchronize_conflicts(c: &mut Criterion) {
    c.bench_function("state_synchronize_100_conflicts", |b| {
        let store = StateStore::default();
        let mut round = 0u8;
        b.iter(|| {
            round = round.wrapping_add(1);
            for i in 0..100 {
                let path = format!("/world/objects/{i}/rotation");
                store.update(&path, vec![round, 0], 0.4, "opensim").unwrap();
                store.update(&path, vec![round, 1], 0.9, "finalverse").unwrap();
            }
            black_box(store.synchronize());
        });
    });
}

criterion_group!(
    benches,
    bench_publish_and_tick,
    bench_uncontested_writes,
    bench_synchronize_conflicts
);
criterion_main!(benches);
