use super::utils::{cpu_node, register, set_cpu_status, thread_node};
use super::EventInfo;
use crate::attributes;
use crate::context::AnalysisContext;
use crate::error::StoreError;
use crate::store::{Quark, StateStore, StateValue};
use crate::values::{cpu_status, process_status};

/// Node of the thread the emitting machine has on this CPU
fn own_thread(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
) -> Option<Quark> {
    let reg = register(ctx, info)?;
    let tid = ctx.machines.vcpu_ref(reg).current_thread.as_long()?;
    Some(thread_node(ss, info.host, tid, info.pcpu))
}

pub(super) fn sys_entry(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    name: &str,
) -> Result<(), StoreError> {
    if !ctx.analysis.track_syscalls {
        return Ok(());
    }
    let Some(thread) = own_thread(ss, ctx, info) else {
        return Ok(());
    };
    let quark = ss.quark_relative_and_add(thread, &[attributes::SYSTEM_CALL]);
    ss.modify_attribute(info.ts, StateValue::str(name), quark)?;
    let quark = ss.quark_relative_and_add(thread, &[attributes::STATUS]);
    ss.modify_attribute(info.ts, StateValue::Int(process_status::RUN_SYSCALL), quark)?;

    let cpu = cpu_node(ss, info.pcpu);
    set_cpu_status(ss, info, cpu, StateValue::Int(cpu_status::RUN_SYSCALL))?;
    if let Some(reg) = register(ctx, info) {
        ctx.machines.vcpu_mut(reg).current_state = StateValue::Int(cpu_status::RUN_SYSCALL);
    }
    Ok(())
}

pub(super) fn sys_exit(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
) -> Result<(), StoreError> {
    if !ctx.analysis.track_syscalls {
        return Ok(());
    }
    let Some(thread) = own_thread(ss, ctx, info) else {
        return Ok(());
    };
    let quark = ss.quark_relative_and_add(thread, &[attributes::SYSTEM_CALL]);
    ss.modify_attribute(info.ts, StateValue::Null, quark)?;
    let quark = ss.quark_relative_and_add(thread, &[attributes::STATUS]);
    ss.modify_attribute(info.ts, StateValue::Int(process_status::RUN_USERMODE), quark)?;

    let cpu = cpu_node(ss, info.pcpu);
    set_cpu_status(ss, info, cpu, StateValue::Int(cpu_status::RUN_USERMODE))?;
    if let Some(reg) = register(ctx, info) {
        ctx.machines.vcpu_mut(reg).current_state = StateValue::Int(cpu_status::RUN_USERMODE);
    }
    Ok(())
}
