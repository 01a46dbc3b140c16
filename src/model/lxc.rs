use std::collections::HashMap;

use fnv::FnvHashMap;
use tracing::debug;

use super::{HostThread, Machine, MachineArena, MachineId};
use crate::layout::EventLayout;

/// Container machines derived from PID namespaces
///
/// A namespace below the root one becomes a container machine the first time a
/// fork or a state dump mentions it. Containers are scoped by the machine whose
/// trace introduced them.
#[derive(Debug, Default)]
pub struct LxcModel {
    known_containers: FnvHashMap<(MachineId, i64), MachineId>,
    thread_to_container: HashMap<HostThread, MachineId>,
}

impl LxcModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events this model needs even while machine roles are still unknown
    pub fn required_events(layout: &dyn EventLayout) -> Vec<&'static str> {
        let mut events = vec![layout.event_sched_process_fork()];
        events.extend(layout.event_statedump_process_state());
        events
    }

    /// Container for namespace `ns_inum` on `host`, created on first reference
    ///
    /// A new container hangs below the container of `parent_ns` when that one
    /// is known, below the host machine otherwise.
    pub fn container(
        &mut self,
        arena: &mut MachineArena,
        host: MachineId,
        ns_inum: i64,
        parent_ns: Option<i64>,
    ) -> MachineId {
        if let Some(id) = self.known_containers.get(&(host, ns_inum)) {
            return *id;
        }
        let (host_id, trace_name) = {
            let m = arena.machine(host);
            (m.host_id().to_string(), m.trace_name().to_string())
        };
        let id = arena.add_machine(Machine::new_container(ns_inum, &host_id, &trace_name));
        let parent = parent_ns
            .and_then(|ns| self.known_containers.get(&(host, ns)).copied())
            .unwrap_or(host);
        arena.machine_mut(id).set_parent(parent);
        arena.machine_mut(parent).add_container(id);
        self.known_containers.insert((host, ns_inum), id);
        debug!(host = %host_id, ns_inum, "new container");
        id
    }

    pub fn find_container(&self, host: MachineId, ns_inum: i64) -> Option<MachineId> {
        self.known_containers.get(&(host, ns_inum)).copied()
    }

    /// Record that `ht` lives (at its deepest level) in `container`
    pub fn assign_thread(&mut self, ht: HostThread, container: MachineId) {
        self.thread_to_container.insert(ht, container);
    }

    /// Container the thread belongs to, `None` for threads of the root namespace
    pub fn current_container(&self, ht: &HostThread) -> Option<MachineId> {
        self.thread_to_container.get(ht).copied()
    }

    pub fn number_of_known_containers(&self) -> usize {
        self.known_containers.len()
    }
}
