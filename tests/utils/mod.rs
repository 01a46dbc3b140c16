// Integration Test Utilities
//
// Builders for LTTng-style kernel events and small experiment setups

#![allow(dead_code)]

use fusedvm::config::{ExperimentConfig, TraceConfig};
use fusedvm::engine::FusedEngine;
use fusedvm::event::TraceEvent;
use fusedvm::layout::LayoutKind;
use fusedvm::store::StateValue;

/// Engine over LTTng traces of the given host ids
pub fn engine(hosts: &[&str]) -> FusedEngine {
    let traces = hosts
        .iter()
        .map(|h| TraceConfig::new(h, LayoutKind::Lttng))
        .collect();
    FusedEngine::new(ExperimentConfig::new(traces)).unwrap()
}

/// Feed events in order, panicking on any engine error
pub fn feed(engine: &mut FusedEngine, events: &[TraceEvent]) {
    for event in events {
        engine.handle_event(event).unwrap();
    }
}

pub fn value(engine: &FusedEngine, path: &[&str]) -> StateValue {
    engine.store().ongoing_at_path(path)
}

pub fn switch(host: &str, ts: u64, cpu: u32, prev: i64, next: i64) -> TraceEvent {
    TraceEvent::new(host, "sched_switch", ts)
        .cpu(cpu)
        .field("prev_tid", prev)
        .field("prev_state", 0)
        .field("next_tid", next)
        .field("next_comm", format!("task{}", next))
        .field("next_prio", 20)
}

pub fn irq_entry(host: &str, ts: u64, cpu: u32, irq: i64) -> TraceEvent {
    TraceEvent::new(host, "irq_handler_entry", ts)
        .cpu(cpu)
        .field("irq", irq)
}

pub fn irq_exit(host: &str, ts: u64, cpu: u32, irq: i64) -> TraceEvent {
    TraceEvent::new(host, "irq_handler_exit", ts)
        .cpu(cpu)
        .field("irq", irq)
}

pub fn softirq(host: &str, name: &str, ts: u64, cpu: u32, vec: i64) -> TraceEvent {
    TraceEvent::new(host, name, ts).cpu(cpu).field("vec", vec)
}

pub fn syscall_entry(host: &str, ts: u64, cpu: u32, name: &str) -> TraceEvent {
    TraceEvent::new(host, format!("syscall_entry_{}", name), ts).cpu(cpu)
}

pub fn syscall_exit(host: &str, ts: u64, cpu: u32, name: &str) -> TraceEvent {
    TraceEvent::new(host, format!("syscall_exit_{}", name), ts).cpu(cpu)
}

pub fn vmsync_guest(host: &str, ts: u64, vm_uid: i64) -> TraceEvent {
    TraceEvent::new(host, "vmsync_gh_guest", ts)
        .cpu(0)
        .field("vm_uid", vm_uid)
}

pub fn vmsync_host(host: &str, ts: u64, cpu: u32, vm_uid: i64) -> TraceEvent {
    TraceEvent::new(host, "vmsync_gh_host", ts)
        .cpu(cpu)
        .field("vm_uid", vm_uid)
}

pub fn kvm_entry(host: &str, ts: u64, cpu: u32, vcpu_id: i64) -> TraceEvent {
    TraceEvent::new(host, "kvm_entry", ts)
        .cpu(cpu)
        .field("vcpu_id", vcpu_id)
}

pub fn kvm(host: &str, name: &str, ts: u64, cpu: u32) -> TraceEvent {
    TraceEvent::new(host, name, ts).cpu(cpu)
}

pub fn fork(host: &str, ts: u64, parent: i64, child: i64, vtids: Vec<i64>) -> TraceEvent {
    TraceEvent::new(host, "sched_process_fork", ts)
        .cpu(0)
        .field("parent_tid", parent)
        .field("child_tid", child)
        .field("child_comm", "sh")
        .field("vtids", vtids)
}

/// One `lttng_statedump_process_state` line
#[allow(clippy::too_many_arguments)]
pub fn statedump(
    host: &str,
    ts: u64,
    tid: i64,
    vtid: i64,
    ns_level: i64,
    vpid: i64,
    vppid: i64,
    ns_inum: i64,
) -> TraceEvent {
    TraceEvent::new(host, "lttng_statedump_process_state", ts)
        .cpu(0)
        .field("tid", tid)
        .field("vtid", vtid)
        .field("ns_level", ns_level)
        .field("pid", tid)
        .field("vpid", vpid)
        .field("ppid", 1)
        .field("vppid", vppid)
        .field("name", "init")
        .field("status", 5)
        .field("ns_inum", ns_inum)
}
