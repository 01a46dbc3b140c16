//! Helpers shared by the handlers

use super::EventInfo;
use crate::attributes;
use crate::context::AnalysisContext;
use crate::error::StoreError;
use crate::model::VcpuId;
use crate::store::{Quark, StateStore, StateValue};
use crate::values::{cpu_status, has_bit, process_status};

/// `CPUs/<pcpu>`
pub(crate) fn cpu_node(ss: &mut dyn StateStore, pcpu: u32) -> Quark {
    ss.quark_absolute_and_add(&[attributes::CPUS, &pcpu.to_string()])
}

/// `Threads/<machine>/<tid>` (idle threads qualified by `cpu`)
pub(crate) fn thread_node(ss: &mut dyn StateStore, machine: &str, tid: i64, cpu: u32) -> Quark {
    let name = attributes::thread_attribute_name(tid, cpu);
    ss.quark_absolute_and_add(&[attributes::THREADS, machine, &name])
}

/// Node of the thread currently running on the CPU, as recorded in the tree
///
/// `None` when the CPU has no current thread or no machine name yet.
pub(crate) fn current_thread_node(ss: &mut dyn StateStore, cpu: Quark, pcpu: u32) -> Option<Quark> {
    let tid = ss
        .opt_quark_relative(cpu, &[attributes::CURRENT_THREAD])
        .and_then(|q| ss.query_ongoing(q).as_long())?;
    let machine = ss
        .opt_quark_relative(cpu, &[attributes::MACHINE_NAME])
        .map(|q| ss.query_ongoing(q))?;
    let machine = machine.as_str()?;
    Some(thread_node(ss, machine, tid, pcpu))
}

/// Whether the CPU is currently attributed to `host`
///
/// Events of a machine that does not own the physical CPU right now must not
/// rewrite its status.
pub(crate) fn owns_cpu(ss: &mut dyn StateStore, cpu: Quark, host: &str) -> bool {
    let quark = ss.quark_relative_and_add(cpu, &[attributes::MACHINE_NAME]);
    ss.query_ongoing(quark).as_str() == Some(host)
}

fn in_syscall(ss: &mut dyn StateStore, thread: Quark) -> bool {
    let quark = ss.quark_relative_and_add(thread, &[attributes::SYSTEM_CALL]);
    !ss.query_ongoing(quark).is_null()
}

/// Put the thread back in user mode or syscall mode, depending on whether
/// it is inside a system call
pub(crate) fn set_process_to_running(
    ss: &mut dyn StateStore,
    ts: u64,
    thread: Quark,
) -> Result<(), StoreError> {
    let value = if in_syscall(ss, thread) {
        process_status::RUN_SYSCALL
    } else {
        process_status::RUN_USERMODE
    };
    let quark = ss.quark_relative_and_add(thread, &[attributes::STATUS]);
    ss.modify_attribute(ts, StateValue::Int(value), quark)
}

/// CPU status matching a running thread
pub(crate) fn running_cpu_status(ss: &mut dyn StateStore, tid: i64, thread: Quark) -> StateValue {
    if tid == 0 {
        StateValue::Int(cpu_status::IDLE)
    } else if in_syscall(ss, thread) {
        StateValue::Int(cpu_status::RUN_SYSCALL)
    } else {
        StateValue::Int(cpu_status::RUN_USERMODE)
    }
}

/// Status of a CPU leaving an interrupt, derived from what is still active
///
/// A pending IRQ wins, then an executing soft IRQ, then the current thread.
pub(crate) fn cpu_status_after_interrupt(
    ss: &mut dyn StateStore,
    cpu: Quark,
    pcpu: u32,
) -> StateValue {
    let irqs = ss.quark_relative_and_add(cpu, &[attributes::IRQS]);
    if ss
        .sub_attributes(irqs)
        .into_iter()
        .any(|q| !ss.query_ongoing(q).is_null())
    {
        return StateValue::Int(cpu_status::IRQ);
    }

    let soft_irqs = ss.quark_relative_and_add(cpu, &[attributes::SOFT_IRQS]);
    if ss
        .sub_attributes(soft_irqs)
        .into_iter()
        .any(|q| has_bit(&ss.query_ongoing(q), cpu_status::SOFTIRQ))
    {
        return StateValue::Int(cpu_status::SOFTIRQ);
    }

    let current = ss.quark_relative_and_add(cpu, &[attributes::CURRENT_THREAD]);
    match ss.query_ongoing(current).as_long() {
        None => StateValue::Null,
        Some(tid) => match current_thread_node(ss, cpu, pcpu) {
            Some(thread) => running_cpu_status(ss, tid, thread),
            None if tid == 0 => StateValue::Int(cpu_status::IDLE),
            None => StateValue::Int(cpu_status::RUN_USERMODE),
        },
    }
}

/// Write `value` to the CPU status if the event's machine owns the CPU
pub(crate) fn set_cpu_status(
    ss: &mut dyn StateStore,
    info: &EventInfo<'_>,
    cpu: Quark,
    value: StateValue,
) -> Result<(), StoreError> {
    if !owns_cpu(ss, cpu, info.host) {
        return Ok(());
    }
    let quark = ss.quark_relative_and_add(cpu, &[attributes::STATUS]);
    ss.modify_attribute(info.ts, value, quark)
}

/// Register of the (machine, cpu) the event was emitted on
pub(crate) fn register(ctx: &mut AnalysisContext, info: &EventInfo<'_>) -> Option<VcpuId> {
    let machine = info.machine?;
    Some(ctx.machines.vcpu(machine, info.cpu))
}
