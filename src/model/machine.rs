use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::{HostThread, MachineId, VcpuId};
use crate::values::machine_type;

/// One traced machine: bare-metal host, guest, container, or a mix
///
/// `HOST` and `GUEST` are independent bits; a guest that runs nested guests
/// carries both.
#[derive(Debug, Clone)]
pub struct Machine {
    host_id: String,
    trace_name: String,
    kind: i32,
    vm_uid: i64,
    parent: Option<MachineId>,
    children: BTreeSet<MachineId>,
    containers: BTreeSet<MachineId>,
    vcpus: BTreeMap<u32, VcpuId>,
    pcpus: BTreeSet<u32>,
    threads_waiting_for_next_layer: HashSet<HostThread>,
    threads_ready_for_next_layer: HashSet<HostThread>,
}

impl Machine {
    fn with_kind(kind: i32, host_id: &str, vm_uid: i64, trace_name: &str) -> Self {
        Machine {
            host_id: host_id.to_string(),
            trace_name: trace_name.to_string(),
            kind,
            vm_uid,
            parent: None,
            children: BTreeSet::new(),
            containers: BTreeSet::new(),
            vcpus: BTreeMap::new(),
            pcpus: BTreeSet::new(),
            threads_waiting_for_next_layer: HashSet::new(),
            threads_ready_for_next_layer: HashSet::new(),
        }
    }

    pub fn new_host(host_id: &str, trace_name: &str) -> Self {
        Self::with_kind(machine_type::HOST, host_id, -1, trace_name)
    }

    pub fn new_guest(vm_uid: i64, host_id: &str, trace_name: &str) -> Self {
        Self::with_kind(machine_type::GUEST, host_id, vm_uid, trace_name)
    }

    /// A container is identified by its namespace inode number
    pub fn new_container(ns_inum: i64, host_id: &str, trace_name: &str) -> Self {
        Self::with_kind(machine_type::CONTAINER, host_id, ns_inum, trace_name)
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn trace_name(&self) -> &str {
        &self.trace_name
    }

    /// Type bits as published under `Machines/<host_id>`
    pub fn machine_type(&self) -> i32 {
        self.kind
    }

    pub fn is_host(&self) -> bool {
        self.kind & machine_type::HOST == machine_type::HOST
    }

    pub fn is_guest(&self) -> bool {
        self.kind & machine_type::GUEST == machine_type::GUEST
    }

    pub fn is_container(&self) -> bool {
        self.kind & machine_type::CONTAINER == machine_type::CONTAINER
    }

    pub fn set_host(&mut self) {
        self.kind |= machine_type::HOST;
    }

    pub fn set_guest(&mut self, vm_uid: i64) {
        self.kind |= machine_type::GUEST;
        self.vm_uid = vm_uid;
    }

    pub fn vm_uid(&self) -> i64 {
        self.vm_uid
    }

    pub fn parent(&self) -> Option<MachineId> {
        self.parent
    }

    pub fn set_parent(&mut self, parent: MachineId) {
        self.parent = Some(parent);
    }

    /// Guests run by this machine
    pub fn children(&self) -> &BTreeSet<MachineId> {
        &self.children
    }

    pub fn add_child(&mut self, child: MachineId) {
        self.children.insert(child);
    }

    pub fn containers(&self) -> &BTreeSet<MachineId> {
        &self.containers
    }

    pub fn add_container(&mut self, container: MachineId) {
        self.containers.insert(container);
    }

    /// Virtual CPUs of this machine, by machine-local cpu number
    pub fn vcpus(&self) -> &BTreeMap<u32, VcpuId> {
        &self.vcpus
    }

    pub(super) fn add_vcpu(&mut self, cpu: u32, vcpu: VcpuId) {
        self.vcpus.insert(cpu, vcpu);
    }

    /// Physical CPUs this machine has been seen running on
    pub fn pcpus(&self) -> &BTreeSet<u32> {
        &self.pcpus
    }

    pub fn add_pcpu(&mut self, pcpu: u32) {
        self.pcpus.insert(pcpu);
    }

    pub fn add_thread_waiting_for_next_layer(&mut self, ht: HostThread) {
        self.threads_ready_for_next_layer.remove(&ht);
        self.threads_waiting_for_next_layer.insert(ht);
    }

    pub fn is_thread_waiting_for_next_layer(&self, ht: &HostThread) -> bool {
        self.threads_waiting_for_next_layer.contains(ht)
    }

    /// Move a waiting thread to the ready set; threads that were not waiting
    /// are left alone
    pub fn make_thread_ready_for_next_layer(&mut self, ht: &HostThread) {
        if let Some(ht) = self.threads_waiting_for_next_layer.take(ht) {
            self.threads_ready_for_next_layer.insert(ht);
        }
    }

    pub fn is_thread_ready_for_next_layer(&self, ht: &HostThread) -> bool {
        self.threads_ready_for_next_layer.contains(ht)
    }

    pub fn remove_thread_from_ready_for_next_layer(&mut self, ht: &HostThread) {
        self.threads_ready_for_next_layer.remove(ht);
    }
}
