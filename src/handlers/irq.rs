use super::utils::{
    cpu_node, cpu_status_after_interrupt, current_thread_node, register, set_cpu_status,
    set_process_to_running,
};
use super::EventInfo;
use crate::attributes;
use crate::context::AnalysisContext;
use crate::error::StoreError;
use crate::store::{Quark, StateStore, StateValue};
use crate::values::{self, cpu_status, has_bit, process_status};
use tracing::warn;

fn interrupt_current_thread(
    ss: &mut dyn StateStore,
    info: &EventInfo<'_>,
    cpu: Quark,
) -> Result<(), StoreError> {
    if let Some(thread) = current_thread_node(ss, cpu, info.pcpu) {
        let quark = ss.quark_relative_and_add(thread, &[attributes::STATUS]);
        ss.modify_attribute(info.ts, StateValue::Int(process_status::INTERRUPTED), quark)?;
    }
    Ok(())
}

fn resume_current_thread(
    ss: &mut dyn StateStore,
    info: &EventInfo<'_>,
    cpu: Quark,
) -> Result<(), StoreError> {
    if let Some(thread) = current_thread_node(ss, cpu, info.pcpu) {
        set_process_to_running(ss, info.ts, thread)?;
    }
    Ok(())
}

/// Remember what the CPU was doing before the first of nested interrupts
fn save_state_before_irq(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    cpu: Quark,
) {
    let Some(reg) = register(ctx, info) else {
        return;
    };
    let status = ss.quark_relative_and_add(cpu, &[attributes::STATUS]);
    let current = ss.query_ongoing(status);
    let in_interrupt = current == StateValue::Int(cpu_status::IRQ)
        || current == StateValue::Int(cpu_status::SOFTIRQ);
    if !in_interrupt {
        ctx.machines.vcpu_mut(reg).state_before_irq = current;
    }
}

pub(super) fn irq_entry(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    irq: i64,
) -> Result<(), StoreError> {
    let cpu = cpu_node(ss, info.pcpu);
    let quark = ss.quark_relative_and_add(cpu, &[attributes::IRQS, &irq.to_string()]);
    ss.modify_attribute(info.ts, values::int_value(i64::from(info.pcpu)), quark)?;

    interrupt_current_thread(ss, info, cpu)?;
    save_state_before_irq(ss, ctx, info, cpu);
    set_cpu_status(ss, info, cpu, StateValue::Int(cpu_status::IRQ))
}

pub(super) fn irq_exit(
    ss: &mut dyn StateStore,
    info: &EventInfo<'_>,
    irq: i64,
) -> Result<(), StoreError> {
    let cpu = cpu_node(ss, info.pcpu);
    let quark = ss.quark_relative_and_add(cpu, &[attributes::IRQS, &irq.to_string()]);
    ss.modify_attribute(info.ts, StateValue::Null, quark)?;

    resume_current_thread(ss, info, cpu)?;
    let status = cpu_status_after_interrupt(ss, cpu, info.pcpu);
    set_cpu_status(ss, info, cpu, status)
}

pub(super) fn soft_irq_entry(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    vec: i64,
) -> Result<(), StoreError> {
    let cpu = cpu_node(ss, info.pcpu);
    let quark = ss.quark_relative_and_add(cpu, &[attributes::SOFT_IRQS, &vec.to_string()]);
    ss.modify_attribute(info.ts, StateValue::Int(cpu_status::SOFTIRQ), quark)?;

    interrupt_current_thread(ss, info, cpu)?;
    save_state_before_irq(ss, ctx, info, cpu);
    set_cpu_status(ss, info, cpu, StateValue::Int(cpu_status::SOFTIRQ))
}

pub(super) fn soft_irq_raise(
    ss: &mut dyn StateStore,
    info: &EventInfo<'_>,
    vec: i64,
) -> Result<(), StoreError> {
    let cpu = cpu_node(ss, info.pcpu);
    let quark = ss.quark_relative_and_add(cpu, &[attributes::SOFT_IRQS, &vec.to_string()]);
    let value = if has_bit(&ss.query_ongoing(quark), cpu_status::SOFTIRQ) {
        cpu_status::SOFTIRQ | cpu_status::SOFT_IRQ_RAISED
    } else {
        cpu_status::SOFT_IRQ_RAISED
    };
    ss.modify_attribute(info.ts, StateValue::Int(value), quark)
}

pub(super) fn soft_irq_exit(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    vec: i64,
) -> Result<(), StoreError> {
    let cpu = cpu_node(ss, info.pcpu);
    let soft_irqs = ss.quark_relative_and_add(cpu, &[attributes::SOFT_IRQS]);
    let quark = ss.quark_relative_and_add(soft_irqs, &[&vec.to_string()]);

    let current = ss.query_ongoing(quark);
    if !has_bit(&current, cpu_status::SOFTIRQ) {
        warn!(ts = info.ts, cpu = info.pcpu, vec, "soft irq exit without matching entry");
    }
    let value = if has_bit(&current, cpu_status::SOFT_IRQ_RAISED) {
        StateValue::Int(cpu_status::SOFT_IRQ_RAISED)
    } else {
        StateValue::Null
    };
    ss.modify_attribute(info.ts, value, quark)?;

    // A soft irq still executing or raised keeps the CPU in soft irq mode
    let still_pending = ss
        .sub_attributes(soft_irqs)
        .into_iter()
        .any(|q| !ss.query_ongoing(q).is_null());
    if still_pending {
        return Ok(());
    }

    resume_current_thread(ss, info, cpu)?;
    let Some(reg) = register(ctx, info) else {
        return Ok(());
    };
    let restored = ctx.machines.vcpu_ref(reg).state_before_irq.clone();
    ctx.machines.vcpu_mut(reg).current_state = restored.clone();
    set_cpu_status(ss, info, cpu, restored)
}
