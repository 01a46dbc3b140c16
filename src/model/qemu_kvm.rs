use std::collections::HashMap;

use fnv::FnvHashMap;
use tracing::debug;

use super::{HostThread, Machine, MachineArena, MachineId, VcpuId};
use crate::event::TraceEvent;
use crate::layout::{qemu_kvm, EventLayout};

/// Host/guest discovery and thread ↔ vCPU pairing for QEMU/KVM
///
/// Roles are inferred from the events themselves: only a hypervisor emits
/// `kvm_*` events, only a guest emits `vmsync_*_guest`. The vmsync handshake
/// (`vm_uid` payload on both sides) pairs a guest with the host thread that runs
/// it, and every `kvm_entry` records which physical CPU a vCPU lands on.
#[derive(Debug, Default)]
pub struct QemuKvmModel {
    tid_to_vcpu: HashMap<HostThread, VcpuId>,
    vcpu_to_tid: FnvHashMap<VcpuId, HostThread>,
    tid_to_vm: HashMap<HostThread, MachineId>,
    virtual_to_physical: FnvHashMap<VcpuId, u32>,
    hosts: HashMap<String, u32>,
    thread_on_cpu: FnvHashMap<(u32, u32), i64>,
    parent_of: HashMap<HostThread, i64>,
}

impl QemuKvmModel {
    /// Build the model for an experiment made of `traces` (host id, trace name)
    ///
    /// A lone trace has no one to pair with: it is a host from the start.
    pub fn new(arena: &mut MachineArena, traces: &[(String, String)]) -> Self {
        if let [(host_id, name)] = traces {
            arena.add_known_machine(Machine::new_host(host_id, name));
        }
        let hosts = traces
            .iter()
            .enumerate()
            .map(|(index, (host_id, _))| (host_id.clone(), index as u32))
            .collect();
        QemuKvmModel {
            hosts,
            ..Self::default()
        }
    }

    /// Machine that produced `event`, creating or refining it from the event
    pub fn current_machine_and_add(
        &mut self,
        arena: &mut MachineArena,
        event: &TraceEvent,
        trace_name: &str,
        layout: &dyn EventLayout,
    ) -> Option<MachineId> {
        let known = arena.known(&event.host);

        if event.name.starts_with(qemu_kvm::KVM_PREFIX) {
            return Some(match known {
                Some(id) => {
                    arena.machine_mut(id).set_host();
                    id
                }
                None => {
                    debug!(host = %event.host, "kvm event seen, machine is a host");
                    arena.add_known_machine(Machine::new_host(&event.host, trace_name))
                }
            });
        }

        if event.name == qemu_kvm::VMSYNC_GH_GUEST || event.name == qemu_kvm::VMSYNC_HG_GUEST {
            if let Some(uid) = event.int_field(layout.field_vm_uid()) {
                return Some(match known {
                    Some(id) => {
                        arena.machine_mut(id).set_guest(uid);
                        id
                    }
                    None => {
                        debug!(host = %event.host, vm_uid = uid, "vmsync guest event, machine is a guest");
                        arena.add_known_machine(Machine::new_guest(uid, &event.host, trace_name))
                    }
                });
            }
        }

        known
    }

    /// Feed the model with one event, before any state-changing handler runs
    pub fn handle_event(
        &mut self,
        arena: &mut MachineArena,
        event: &TraceEvent,
        layout: &dyn EventLayout,
    ) {
        let Some(cpu) = event.cpu else { return };
        let name = event.name.as_str();

        if name == layout.event_sched_switch() {
            let next = event.int_field(layout.field_next_tid());
            if let (Some(&host), Some(next)) = (self.hosts.get(event.host.as_str()), next) {
                self.thread_on_cpu.insert((host, cpu), next);
            }
        } else if name == layout.event_sched_process_fork() {
            let parent = event.int_field(layout.field_parent_tid());
            let child = event.int_field(layout.field_child_tid());
            if let (Some(parent), Some(child)) = (parent, child) {
                self.parent_of.insert(HostThread::new(&event.host, child), parent);
            }
        } else if name == qemu_kvm::VMSYNC_GH_HOST {
            self.pair_guest(arena, event, cpu, layout);
        } else if layout.events_kvm_entry().contains(&name) {
            self.map_vcpu_to_pcpu(arena, event, cpu, layout);
        }
    }

    fn pair_guest(
        &mut self,
        arena: &mut MachineArena,
        event: &TraceEvent,
        cpu: u32,
        layout: &dyn EventLayout,
    ) {
        let Some(tid) = self.thread_on_cpu(&event.host, cpu) else {
            debug!(host = %event.host, cpu, "vmsync_gh_host with no known thread on cpu");
            return;
        };
        let ht = HostThread::new(&event.host, tid);
        if self.tid_to_vm.contains_key(&ht) {
            return;
        }
        let Some(vm_uid) = event.int_field(layout.field_vm_uid()) else {
            return;
        };

        let guests: Vec<MachineId> = arena
            .known_machines()
            .into_iter()
            .filter(|id| {
                let m = arena.machine(*id);
                m.is_guest() && m.vm_uid() == vm_uid
            })
            .collect();

        let host = arena.known(&event.host);
        for guest in guests {
            if let Some(host) = host {
                arena.machine_mut(host).add_child(guest);
            }
            debug!(thread = %ht, guest = arena.machine(guest).host_id(), "guest paired with host thread");
            self.tid_to_vm.insert(ht.clone(), guest);
            // The vcpu threads are children of the process that did the handshake
            if let Some(ppid) = self.parent_of.get(&ht) {
                self.tid_to_vm
                    .insert(HostThread::new(&event.host, *ppid), guest);
            }
        }
    }

    fn map_vcpu_to_pcpu(
        &mut self,
        arena: &mut MachineArena,
        event: &TraceEvent,
        cpu: u32,
        layout: &dyn EventLayout,
    ) {
        let Some(tid) = self.thread_on_cpu(&event.host, cpu) else {
            return;
        };
        let ht = HostThread::new(&event.host, tid);
        let Some(vcpu) = self.vcpu_exiting_hypervisor_mode(arena, event, &ht, layout) else {
            return;
        };
        if !self.tid_to_vm.contains_key(&ht) {
            return;
        }
        self.virtual_to_physical.insert(vcpu, cpu);
    }

    /// vCPU the host thread is about to run, learning the pairing if needed
    fn vcpu_exiting_hypervisor_mode(
        &mut self,
        arena: &mut MachineArena,
        event: &TraceEvent,
        ht: &HostThread,
        layout: &dyn EventLayout,
    ) -> Option<VcpuId> {
        if let Some(vcpu) = self.tid_to_vcpu.get(ht) {
            return Some(*vcpu);
        }
        let vm = match self.tid_to_vm.get(ht) {
            Some(vm) => *vm,
            None => self.find_vm_from_parent(ht)?,
        };
        let vcpu_id = event.int_field(layout.field_vcpu_id())?;
        let vcpu = arena.vcpu(vm, u32::try_from(vcpu_id).ok()?);
        self.tid_to_vcpu.insert(ht.clone(), vcpu);
        self.vcpu_to_tid.insert(vcpu, ht.clone());
        Some(vcpu)
    }

    /// A vcpu thread that was not paired directly inherits its parent's VM
    fn find_vm_from_parent(&mut self, ht: &HostThread) -> Option<MachineId> {
        let ppid = *self.parent_of.get(ht)?;
        let vm = *self.tid_to_vm.get(&HostThread::new(&ht.host, ppid))?;
        self.tid_to_vm.insert(ht.clone(), vm);
        Some(vm)
    }

    /// Last thread scheduled on `cpu` of `host`, as seen by this model
    pub fn thread_on_cpu(&self, host: &str, cpu: u32) -> Option<i64> {
        let host = *self.hosts.get(host)?;
        self.thread_on_cpu.get(&(host, cpu)).copied()
    }

    pub fn virtual_cpu(&self, ht: &HostThread) -> Option<VcpuId> {
        self.tid_to_vcpu.get(ht).copied()
    }

    pub fn vm_from_host_thread(&self, ht: &HostThread) -> Option<MachineId> {
        self.tid_to_vm.get(ht).copied()
    }

    pub fn host_thread_from_vcpu(&self, vcpu: VcpuId) -> Option<&HostThread> {
        self.vcpu_to_tid.get(&vcpu)
    }

    /// Physical CPU that `cpu` of `vm` currently runs on
    ///
    /// For a nested guest the recorded CPU is a vCPU of its parent guest, so
    /// one more hop through the parent is needed.
    pub fn physical_cpu(&self, arena: &MachineArena, vm: MachineId, cpu: u32) -> Option<u32> {
        let vcpu = arena.find_vcpu(vm, cpu)?;
        let pcpu = *self.virtual_to_physical.get(&vcpu)?;
        match arena.machine(vm).parent() {
            Some(parent) if arena.machine(parent).is_guest() => {
                let parent_vcpu = arena.find_vcpu(parent, pcpu)?;
                self.virtual_to_physical.get(&parent_vcpu).copied()
            }
            _ => Some(pcpu),
        }
    }
}
