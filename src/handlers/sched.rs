use super::utils::{
    cpu_node, owns_cpu, register, running_cpu_status, set_process_to_running, thread_node,
};
use super::EventInfo;
use crate::attributes;
use crate::context::AnalysisContext;
use crate::error::StoreError;
use crate::namespace;
use crate::registry::SchedSwitch;
use crate::store::{StateStore, StateValue};
use crate::values::{self, linux, process_status};

/// Status of a thread leaving the CPU, from its `prev_state`
///
/// `TASK_NOLOAD` and the bits above it are internal flags or'ed with the real
/// state, so they are masked out.
fn prev_thread_status(prev_state: i64) -> StateValue {
    let state = prev_state & (linux::TASK_NOLOAD - 1);
    if state == 0 {
        StateValue::Int(process_status::WAIT_FOR_CPU)
    } else if state & (linux::TASK_INTERRUPTIBLE | linux::TASK_UNINTERRUPTIBLE) != 0 {
        StateValue::Int(process_status::WAIT_BLOCKED)
    } else if state & linux::TASK_DEAD != 0 {
        StateValue::Null
    } else {
        StateValue::Int(process_status::WAIT_UNKNOWN)
    }
}

pub(super) fn sched_switch(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    switch: &SchedSwitch<'_>,
) -> Result<(), StoreError> {
    let ts = info.ts;
    let prev = thread_node(ss, info.host, switch.prev_tid, info.pcpu);
    let next = thread_node(ss, info.host, switch.next_tid, info.pcpu);

    let quark = ss.quark_relative_and_add(prev, &[attributes::STATUS]);
    ss.modify_attribute(ts, prev_thread_status(switch.prev_state), quark)?;

    set_process_to_running(ss, ts, next)?;
    let quark = ss.quark_relative_and_add(next, &[attributes::EXEC_NAME]);
    ss.modify_attribute(ts, StateValue::str(switch.next_comm), quark)?;
    let quark = ss.quark_relative_and_add(next, &[attributes::PRIO]);
    ss.modify_attribute(ts, values::int_value(switch.next_prio), quark)?;
    ss.quark_relative_and_add(next, &[attributes::SYSTEM_CALL]);
    ss.quark_relative_and_add(next, &[attributes::PPID]);

    let cpu = cpu_node(ss, info.pcpu);
    let modify = owns_cpu(ss, cpu, info.host);

    let thread_value = values::int_value(switch.next_tid);
    let cpu_value = running_cpu_status(ss, switch.next_tid, next);
    if modify {
        let quark = ss.quark_relative_and_add(cpu, &[attributes::CURRENT_THREAD]);
        ss.modify_attribute(ts, thread_value.clone(), quark)?;
        let quark = ss.quark_relative_and_add(cpu, &[attributes::STATUS]);
        ss.modify_attribute(ts, cpu_value.clone(), quark)?;
    }

    if switch.next_tid != 0 {
        let pcpu = info.pcpu.to_string();
        for ns in namespace::process_ns_ids(ss, next) {
            let container = namespace::container_node(ss, info.host, ns);
            ss.quark_relative_and_add(container, &[attributes::PCPUS, &pcpu]);
        }
    }

    if let Some(reg) = register(ctx, info) {
        let vcpu = ctx.machines.vcpu_mut(reg);
        vcpu.current_state = cpu_value;
        vcpu.current_thread = thread_value;
    }
    Ok(())
}

pub(super) fn sched_wakeup(
    ss: &mut dyn StateStore,
    info: &EventInfo<'_>,
    tid: i64,
) -> Result<(), StoreError> {
    let thread = thread_node(ss, info.host, tid, info.pcpu);
    let quark = ss.quark_relative_and_add(thread, &[attributes::STATUS]);
    let status = ss.query_ongoing(quark);
    let running = status == StateValue::Int(process_status::RUN_USERMODE)
        || status == StateValue::Int(process_status::RUN_SYSCALL);
    if running {
        return Ok(());
    }
    ss.modify_attribute(info.ts, StateValue::Int(process_status::WAIT_FOR_CPU), quark)
}

pub(super) fn pi_setprio(
    ss: &mut dyn StateStore,
    info: &EventInfo<'_>,
    tid: i64,
    new_prio: i64,
) -> Result<(), StoreError> {
    let thread = thread_node(ss, info.host, tid, info.pcpu);
    let quark = ss.quark_relative_and_add(thread, &[attributes::PRIO]);
    ss.modify_attribute(info.ts, values::int_value(new_prio), quark)
}
