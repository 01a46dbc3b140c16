//! Event dispatch throughput benchmark
//!
//! Measures how fast the engine turns merged kernel events into state
//! changes. The hot path is `FusedEngine::handle_event`: machine lookup,
//! CPU translation, per-CPU bookkeeping, name classification, payload
//! decoding and the handler itself.
//!
//! # Run Instructions
//!
//! ```bash
//! cargo bench --bench event_dispatch
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fusedvm::config::ExperimentConfig;
use fusedvm::engine::FusedEngine;
use fusedvm::event::TraceEvent;
use fusedvm::layout::LayoutKind;

/// Scheduling, interrupt and syscall mix over `cpus` CPUs
fn workload(events: usize, cpus: u32) -> Vec<TraceEvent> {
    (0..events)
        .map(|i| {
            let ts = i as u64 * 100;
            let cpu = i as u32 % cpus;
            let tid = (i % 97) as i64 + 1;
            match i % 6 {
                0 => TraceEvent::new("server", "sched_switch", ts)
                    .cpu(cpu)
                    .field("prev_tid", tid)
                    .field("prev_state", 1)
                    .field("next_tid", tid + 1)
                    .field("next_comm", "worker")
                    .field("next_prio", 20),
                1 => TraceEvent::new("server", "syscall_entry_read", ts).cpu(cpu),
                2 => TraceEvent::new("server", "irq_handler_entry", ts)
                    .cpu(cpu)
                    .field("irq", 19),
                3 => TraceEvent::new("server", "irq_handler_exit", ts)
                    .cpu(cpu)
                    .field("irq", 19),
                4 => TraceEvent::new("server", "syscall_exit_read", ts).cpu(cpu),
                _ => TraceEvent::new("server", "sched_wakeup", ts)
                    .cpu(cpu)
                    .field("tid", tid + 2),
            }
        })
        .collect()
}

/// Benchmark: full event stream replay
fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay");

    for size in [1_000usize, 10_000] {
        let events = workload(size, 4);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &events, |b, events| {
            b.iter(|| {
                let mut engine =
                    FusedEngine::new(ExperimentConfig::single("server", LayoutKind::Lttng))
                        .unwrap();
                for event in events {
                    let _ = engine.handle_event(black_box(event));
                }
                black_box(engine.store().attribute_count())
            });
        });
    }

    group.finish();
}

/// Benchmark: events that match no handler
///
/// Most events of a real trace are of no interest to the state; they must be
/// rejected cheaply.
fn bench_unhandled(c: &mut Criterion) {
    let mut engine =
        FusedEngine::new(ExperimentConfig::single("server", LayoutKind::Lttng)).unwrap();
    let mut ts = 0u64;

    c.bench_function("unhandled_event", |b| {
        b.iter(|| {
            ts += 1;
            let event = TraceEvent::new("server", "block_rq_issue", ts).cpu(0);
            black_box(engine.handle_event(&event))
        });
    });
}

criterion_group!(benches, bench_replay, bench_unhandled);
criterion_main!(benches);
