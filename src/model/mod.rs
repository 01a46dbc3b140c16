//! Virtual machine and container model
//!
//! Machines and virtual CPUs live in a [`MachineArena`] and refer to each other
//! through integer handles, so nested layers (a guest's vCPU pointing at the
//! vCPU of the guest it runs) never form ownership cycles.
//!
//! Two sub-models fill the arena: [`QemuKvmModel`] discovers hosts and guests
//! and pairs host threads with the vCPUs they drive, [`LxcModel`] tracks
//! container machines created from namespace events.

mod lxc;
mod machine;
mod qemu_kvm;
mod vcpu;

pub use lxc::LxcModel;
pub use machine::Machine;
pub use qemu_kvm::QemuKvmModel;
pub use vcpu::VirtualCpu;

use fnv::FnvHashMap;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Handle to a [`Machine`] in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MachineId(pub u32);

/// Handle to a [`VirtualCpu`] in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VcpuId(pub u32);

/// A thread as seen from the machine that schedules it
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostThread {
    pub host: String,
    pub tid: i64,
}

impl HostThread {
    pub fn new(host: &str, tid: i64) -> Self {
        HostThread {
            host: host.to_string(),
            tid,
        }
    }
}

impl fmt::Display for HostThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.tid)
    }
}

/// Owner of every machine and virtual CPU of one analysis
#[derive(Debug, Default)]
pub struct MachineArena {
    machines: Vec<Machine>,
    known: HashMap<String, MachineId>,
    vcpus: Vec<VirtualCpu>,
    vcpu_index: FnvHashMap<(MachineId, u32), VcpuId>,
}

impl MachineArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a traced machine (host or guest) under its host id
    ///
    /// A machine already known under the same host id is kept and returned.
    pub fn add_known_machine(&mut self, machine: Machine) -> MachineId {
        if let Some(id) = self.known.get(machine.host_id()) {
            return *id;
        }
        let host_id = machine.host_id().to_string();
        let id = self.push(machine);
        self.known.insert(host_id, id);
        id
    }

    /// Register a machine that is not a trace of its own (a container)
    pub fn add_machine(&mut self, machine: Machine) -> MachineId {
        self.push(machine)
    }

    fn push(&mut self, machine: Machine) -> MachineId {
        let id = MachineId(self.machines.len() as u32);
        self.machines.push(machine);
        id
    }

    pub fn known(&self, host_id: &str) -> Option<MachineId> {
        self.known.get(host_id).copied()
    }

    /// Known traced machines, sorted by host id
    pub fn known_machines(&self) -> Vec<MachineId> {
        let mut ids: Vec<(&String, MachineId)> = self.known.iter().map(|(k, v)| (k, *v)).collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    pub fn machine(&self, id: MachineId) -> &Machine {
        &self.machines[id.0 as usize]
    }

    pub fn machine_mut(&mut self, id: MachineId) -> &mut Machine {
        &mut self.machines[id.0 as usize]
    }

    pub fn machines(&self) -> impl Iterator<Item = (MachineId, &Machine)> {
        self.machines
            .iter()
            .enumerate()
            .map(|(i, m)| (MachineId(i as u32), m))
    }

    /// Virtual CPU `cpu` of `machine`, created on first use
    pub fn vcpu(&mut self, machine: MachineId, cpu: u32) -> VcpuId {
        if let Some(id) = self.vcpu_index.get(&(machine, cpu)) {
            return *id;
        }
        let id = VcpuId(self.vcpus.len() as u32);
        self.vcpus.push(VirtualCpu::new(machine, cpu));
        self.vcpu_index.insert((machine, cpu), id);
        self.machine_mut(machine).add_vcpu(cpu, id);
        id
    }

    pub fn find_vcpu(&self, machine: MachineId, cpu: u32) -> Option<VcpuId> {
        self.vcpu_index.get(&(machine, cpu)).copied()
    }

    pub fn vcpu_ref(&self, id: VcpuId) -> &VirtualCpu {
        &self.vcpus[id.0 as usize]
    }

    pub fn vcpu_mut(&mut self, id: VcpuId) -> &mut VirtualCpu {
        &mut self.vcpus[id.0 as usize]
    }

    /// Count machines whose role is settled, assigning parents on the way
    ///
    /// Roots are pure hosts; every guest reachable from a root through child
    /// links counts once and gets that link as its parent.
    pub fn number_of_identified_machines(&mut self) -> usize {
        let roots: Vec<MachineId> = self
            .known_machines()
            .into_iter()
            .filter(|id| {
                let m = self.machine(*id);
                m.is_host() && !m.is_guest()
            })
            .collect();

        let mut visited = HashSet::new();
        let mut count = 0;
        for root in roots {
            if visited.insert(root) {
                count += 1 + self.count_children(root, &mut visited);
            }
        }
        count
    }

    fn count_children(&mut self, machine: MachineId, visited: &mut HashSet<MachineId>) -> usize {
        let children: Vec<MachineId> = self.machine(machine).children().iter().copied().collect();
        let mut count = 0;
        for child in children {
            if !visited.insert(child) {
                continue;
            }
            self.machine_mut(child).set_parent(machine);
            count += 1 + self.count_children(child, visited);
        }
        count
    }
}
