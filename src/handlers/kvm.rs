//! Hypervisor transitions
//!
//! On `kvm_entry` the physical CPU switches from the host's view to the
//! guest's: the host CPU status and thread are parked in the host register and
//! the guest vCPU's last known status and thread are restored. `kvm_exit`
//! reverses the swap. The register of the host CPU remembers which vCPU it
//! entered, so an exit without a matching entry is detected instead of
//! restoring stale state.
//!
//! For nested virtualization the L1 hypervisor's own `kvm_entry` only records
//! which L2 vCPU it wants to run (`next_layer`) and asks L0 to wait for the
//! `kvm_mmu_get_page` that confirms the switch; the next L0 entry then
//! restores the L2 vCPU directly.

use tracing::{debug, error, warn};

use super::utils::{cpu_node, register};
use super::EventInfo;
use crate::attributes;
use crate::context::AnalysisContext;
use crate::error::StoreError;
use crate::model::{HostThread, VcpuId};
use crate::store::{StateStore, StateValue};
use crate::values::{self, condition};

/// Host thread the register says was running on the event's CPU
fn register_thread(ctx: &mut AnalysisContext, info: &EventInfo<'_>) -> Option<(VcpuId, i64)> {
    let reg = register(ctx, info)?;
    let tid = ctx.machines.vcpu_ref(reg).current_thread.as_long()?;
    Some((reg, tid))
}

pub(super) fn kvm_entry(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
) -> Result<(), StoreError> {
    let Some(machine) = info.machine else {
        return Ok(());
    };
    let Some((host_reg, thread)) = register_thread(ctx, info) else {
        debug!(ts = info.ts, host = info.host, "kvm entry with no thread on cpu");
        return Ok(());
    };
    let ht = HostThread::new(info.host, thread);

    let (is_host, is_guest) = {
        let m = ctx.machines.machine(machine);
        (m.is_host(), m.is_guest())
    };
    if is_host && is_guest {
        return enter_next_layer(ss, ctx, info, host_reg, &ht);
    }

    let Some(mut vm) = ctx.kvm.vm_from_host_thread(&ht) else {
        debug!(ts = info.ts, thread = %ht, "kvm entry from a thread of no known vm");
        return Ok(());
    };
    let Some(mut vcpu) = ctx.kvm.virtual_cpu(&ht) else {
        debug!(ts = info.ts, thread = %ht, "kvm entry from a thread of no known vcpu");
        return Ok(());
    };

    if ctx.machines.machine(machine).is_thread_ready_for_next_layer(&ht) {
        let Some(next) = ctx.machines.vcpu_ref(vcpu).next_layer else {
            return Ok(());
        };
        vcpu = next;
        vm = ctx.machines.vcpu_ref(vcpu).machine();
    } else {
        let vm_host = ctx.machines.machine(vm).host_id().to_string();
        let vcpu_id = ctx.machines.vcpu_ref(vcpu).cpu_id().to_string();
        let quark =
            ss.quark_absolute_and_add(&[attributes::MACHINES, &vm_host, attributes::CPUS, &vcpu_id]);
        ss.set_if_absent(info.ts, values::int_value(thread), quark)?;
    }

    let ts = info.ts;
    let cpu = cpu_node(ss, info.pcpu);
    let quark = ss.quark_relative_and_add(cpu, &[attributes::CONDITION]);
    ss.modify_attribute(ts, StateValue::Int(condition::IN_VM), quark)?;

    let vm_host = ctx.machines.machine(vm).host_id().to_string();
    ss.quark_absolute_and_add(&[
        attributes::MACHINES,
        &vm_host,
        attributes::PCPUS,
        &info.pcpu.to_string(),
    ]);

    let guest = ctx.machines.vcpu_ref(vcpu).clone();
    let quark = ss.quark_relative_and_add(cpu, &[attributes::VIRTUAL_CPU]);
    ss.modify_attribute(ts, values::int_value(i64::from(guest.cpu_id())), quark)?;
    let quark = ss.quark_relative_and_add(cpu, &[attributes::MACHINE_NAME]);
    ss.modify_attribute(ts, StateValue::str(vm_host.as_str()), quark)?;

    let status = ss.quark_relative_and_add(cpu, &[attributes::STATUS]);
    let host_state = ss.query_ongoing(status);
    ss.modify_attribute(ts, guest.current_state, status)?;

    let current = ss.quark_relative_and_add(cpu, &[attributes::CURRENT_THREAD]);
    let host_thread = ss.query_ongoing(current);
    ss.modify_attribute(ts, guest.current_thread, current)?;

    let reg = ctx.machines.vcpu_mut(host_reg);
    if let Some(previous) = reg.entered {
        warn!(ts, cpu = info.pcpu, previous = previous.0, "kvm entry while a vcpu is already entered");
    }
    reg.current_state = host_state;
    reg.current_thread = host_thread;
    reg.entered = Some(vcpu);
    ctx.machines.machine_mut(vm).add_pcpu(info.pcpu);
    Ok(())
}

/// `kvm_entry` of a machine that is both guest and host (L1)
fn enter_next_layer(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    host_reg: VcpuId,
    ht: &HostThread,
) -> Result<(), StoreError> {
    let next = ctx.kvm.virtual_cpu(ht);
    ctx.machines.vcpu_mut(host_reg).next_layer = next;

    if let Some(next) = next {
        let next_vcpu = ctx.machines.vcpu_ref(next);
        let vm_host = ctx.machines.machine(next_vcpu.machine()).host_id().to_string();
        let vcpu_id = next_vcpu.cpu_id().to_string();
        let quark =
            ss.quark_absolute_and_add(&[attributes::MACHINES, &vm_host, attributes::CPUS, &vcpu_id]);
        let start = ss.start_time();
        ss.set_if_absent(start, values::int_value(ht.tid), quark)?;
    }

    let Some(machine) = info.machine else {
        return Ok(());
    };
    let Some(parent) = ctx.machines.machine(machine).parent() else {
        warn!(host = info.host, "nested hypervisor with no parent machine");
        return Ok(());
    };
    let Some(parent_thread) = ctx.kvm.host_thread_from_vcpu(host_reg).cloned() else {
        debug!(ts = info.ts, host = info.host, "no host thread drives this vcpu yet");
        return Ok(());
    };
    ctx.machines
        .machine_mut(parent)
        .add_thread_waiting_for_next_layer(parent_thread);
    Ok(())
}

pub(super) fn kvm_exit(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
) -> Result<(), StoreError> {
    let Some(machine) = info.machine else {
        return Ok(());
    };
    {
        let m = ctx.machines.machine(machine);
        if m.is_host() && m.is_guest() {
            return Ok(());
        }
    }
    let Some(host_reg) = register(ctx, info) else {
        return Ok(());
    };

    let ts = info.ts;
    let cpu = cpu_node(ss, info.pcpu);
    let condition_quark = ss.quark_relative_and_add(cpu, &[attributes::CONDITION]);

    let Some(guest) = ctx.machines.vcpu_mut(host_reg).entered.take() else {
        let thread = ctx.machines.vcpu_ref(host_reg).current_thread.as_long();
        let known = thread
            .map(|tid| HostThread::new(info.host, tid))
            .and_then(|ht| ctx.kvm.virtual_cpu(&ht));
        if known.is_some() {
            error!(ts, event = info.name, cpu = info.pcpu, "kvm exit without matching kvm entry");
            ss.modify_attribute(ts, StateValue::Int(condition::OUT_VM), condition_quark)?;
        } else {
            debug!(ts, cpu = info.pcpu, "kvm exit from a thread of no known vcpu");
        }
        return Ok(());
    };

    let status = ss.quark_relative_and_add(cpu, &[attributes::STATUS]);
    let current = ss.quark_relative_and_add(cpu, &[attributes::CURRENT_THREAD]);
    let guest_state = ss.query_ongoing(status);
    let guest_thread = ss.query_ongoing(current);
    {
        let vcpu = ctx.machines.vcpu_mut(guest);
        vcpu.current_state = guest_state;
        vcpu.current_thread = guest_thread;
    }

    let host = ctx.machines.vcpu_ref(host_reg).clone();
    ss.modify_attribute(ts, host.current_state, status)?;
    ss.modify_attribute(ts, host.current_thread, current)?;
    let quark = ss.quark_relative_and_add(cpu, &[attributes::MACHINE_NAME]);
    ss.modify_attribute(ts, StateValue::str(info.host), quark)?;
    ss.modify_attribute(ts, StateValue::Int(condition::OUT_VM), condition_quark)
}

/// L0 saw the shadow page walk of a pending nested entry: its next entry
/// goes straight to the nested guest
pub(super) fn kvm_mmu_get_page(
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
) -> Result<(), StoreError> {
    let Some(machine) = info.machine else {
        return Ok(());
    };
    {
        let m = ctx.machines.machine(machine);
        if !m.is_host() || m.is_guest() {
            return Ok(());
        }
    }
    let Some((_, tid)) = register_thread(ctx, info) else {
        return Ok(());
    };
    ctx.machines
        .machine_mut(machine)
        .make_thread_ready_for_next_layer(&HostThread::new(info.host, tid));
    Ok(())
}

pub(super) fn kvm_nested_vmexit_inject(
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
) -> Result<(), StoreError> {
    let Some(machine) = info.machine else {
        return Ok(());
    };
    let Some((_, tid)) = register_thread(ctx, info) else {
        return Ok(());
    };
    ctx.machines
        .machine_mut(machine)
        .remove_thread_from_ready_for_next_layer(&HostThread::new(info.host, tid));
    Ok(())
}
