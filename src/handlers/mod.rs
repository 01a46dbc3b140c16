//! State-changing event handlers
//!
//! One function per event family, all sharing the same shape: they receive the
//! state store, the analysis context, the resolved [`EventInfo`] and the typed
//! payload decoded by the registry. [`dispatch`] is the single entry point.
//!
//! A handler that cannot resolve something it needs (a thread, a vCPU, a
//! machine) returns `Ok(())` without writing anything. Errors only come from
//! the store.

mod irq;
mod kvm;
mod process;
mod sched;
mod statedump;
mod syscall;
pub(crate) mod utils;

use crate::context::AnalysisContext;
use crate::error::StoreError;
use crate::model::MachineId;
use crate::registry::KernelEvent;
use crate::store::StateStore;

/// Where and when an event happened, after CPU translation
#[derive(Debug, Clone, Copy)]
pub struct EventInfo<'a> {
    /// Host id of the trace that emitted the event
    pub host: &'a str,
    pub machine: Option<MachineId>,
    /// CPU as recorded in the trace (a vCPU for guest traces)
    pub cpu: u32,
    /// Physical CPU the event ran on
    pub pcpu: u32,
    pub ts: u64,
    pub name: &'a str,
}

/// Apply one decoded event to the state
pub fn dispatch(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    event: KernelEvent<'_>,
) -> Result<(), StoreError> {
    match event {
        KernelEvent::IrqEntry { irq } => irq::irq_entry(ss, ctx, info, irq),
        KernelEvent::IrqExit { irq } => irq::irq_exit(ss, info, irq),
        KernelEvent::SoftIrqEntry { vec } => irq::soft_irq_entry(ss, ctx, info, vec),
        KernelEvent::SoftIrqExit { vec } => irq::soft_irq_exit(ss, ctx, info, vec),
        KernelEvent::SoftIrqRaise { vec } => irq::soft_irq_raise(ss, info, vec),
        KernelEvent::SchedSwitch(switch) => sched::sched_switch(ss, ctx, info, &switch),
        KernelEvent::SchedWakeup { tid } => sched::sched_wakeup(ss, info, tid),
        KernelEvent::PiSetprio { tid, new_prio } => sched::pi_setprio(ss, info, tid, new_prio),
        KernelEvent::ProcessFork(fork) => process::process_fork(ss, ctx, info, &fork),
        KernelEvent::ProcessExit => Ok(()),
        KernelEvent::ProcessFree { tid } => process::process_free(ss, info, tid),
        KernelEvent::StateDump(dump) => statedump::state_dump(ss, ctx, info, &dump),
        KernelEvent::SysEntry { name } => syscall::sys_entry(ss, ctx, info, name),
        KernelEvent::SysExit => syscall::sys_exit(ss, ctx, info),
        KernelEvent::KvmEntry => kvm::kvm_entry(ss, ctx, info),
        KernelEvent::KvmExit => kvm::kvm_exit(ss, ctx, info),
        KernelEvent::KvmMmuGetPage => kvm::kvm_mmu_get_page(ctx, info),
        KernelEvent::KvmNestedVmExitInject => kvm::kvm_nested_vmexit_inject(ctx, info),
    }
}

#[cfg(test)]
mod tests;
