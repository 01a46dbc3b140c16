//! Read-only queries over a reconstructed state tree
//!
//! These answer the questions views ask about machines and containers
//! (which machines were traced, which physical CPUs a machine or container
//! used) without knowing the tree layout.

use crate::attributes;
use crate::namespace;
use crate::store::{Quark, StateStore};
use crate::values::machine_type;

fn child_names(ss: &dyn StateStore, path: &[&str]) -> Vec<String> {
    let Some(node) = ss.opt_quark_absolute(path) else {
        return Vec::new();
    };
    ss.sub_attributes(node)
        .into_iter()
        .map(|q| ss.attribute_name(q).to_string())
        .collect()
}

/// Host ids of every machine recorded under `Machines`
pub fn machines_traced(ss: &dyn StateStore) -> Vec<String> {
    child_names(ss, &[attributes::MACHINES])
}

/// Number of CPUs a machine was seen using (vCPUs for a guest)
pub fn nb_cpus(ss: &dyn StateStore, machine: &str) -> usize {
    child_names(ss, &[attributes::MACHINES, machine, attributes::CPUS]).len()
}

/// Type bits of a machine (host, guest, container)
pub fn type_of_machine(ss: &dyn StateStore, machine: &str) -> Option<i32> {
    let quark = ss.opt_quark_absolute(&[attributes::MACHINES, machine])?;
    ss.query_ongoing(quark).as_int()
}

/// Namespace ids of the containers of a machine
pub fn machine_containers(ss: &dyn StateStore, machine: &str) -> Vec<i64> {
    child_names(ss, &[attributes::MACHINES, machine, attributes::CONTAINERS])
        .into_iter()
        .filter_map(|name| name.parse().ok())
        .collect()
}

/// Parent namespace of a container; `-1` marks the root namespace
pub fn parent_container(ss: &dyn StateStore, machine: &str, ns_inum: i64) -> Option<i64> {
    let quark = ss.opt_quark_absolute(&[
        attributes::MACHINES,
        machine,
        attributes::CONTAINERS,
        &ns_inum.to_string(),
        attributes::PARENT,
    ])?;
    ss.query_ongoing(quark).as_long()
}

/// Host id of the machine hosting `machine`
pub fn parent_machine_name(ss: &dyn StateStore, machine: &str) -> Option<String> {
    let quark = ss.opt_quark_absolute(&[attributes::MACHINES, machine, attributes::PARENT])?;
    ss.query_ongoing(quark).as_str().map(str::to_string)
}

fn sorted_cpus(names: Vec<String>) -> Vec<u32> {
    let mut cpus: Vec<u32> = names.into_iter().filter_map(|n| n.parse().ok()).collect();
    cpus.sort_unstable();
    cpus
}

/// Physical CPUs a machine ran on
///
/// A guest (including a nested hypervisor) reports the pCPUs its vCPUs were
/// placed on, a bare host its own CPUs.
pub fn pcpus_used_by_machine(ss: &dyn StateStore, machine: &str) -> Vec<u32> {
    let Some(kind) = type_of_machine(ss, machine) else {
        return Vec::new();
    };
    let names = if kind & machine_type::GUEST == machine_type::GUEST {
        child_names(ss, &[attributes::MACHINES, machine, attributes::PCPUS])
    } else if kind == machine_type::HOST {
        child_names(ss, &[attributes::MACHINES, machine, attributes::CPUS])
    } else {
        Vec::new()
    };
    sorted_cpus(names)
}

/// Physical CPUs the threads of a container ran on
pub fn pcpus_used_by_container(ss: &dyn StateStore, machine: &str, ns_inum: i64) -> Vec<u32> {
    sorted_cpus(child_names(
        ss,
        &[
            attributes::MACHINES,
            machine,
            attributes::CONTAINERS,
            &ns_inum.to_string(),
            attributes::PCPUS,
        ],
    ))
}

/// `ns_inum` attribute of a thread at its deepest namespace level
pub fn thread_ns_inum_quark(ss: &dyn StateStore, machine: &str, tid: i64) -> Option<Quark> {
    let thread = ss.opt_quark_absolute(&[attributes::THREADS, machine, &tid.to_string()])?;
    let max_level = ss
        .opt_quark_relative(thread, &[attributes::NS_MAX_LEVEL])
        .and_then(|q| ss.query_ongoing(q).as_int())?;
    let level = usize::try_from(max_level.max(1) - 1).ok()?;
    let node = namespace::level_node(ss, thread, level)?;
    ss.opt_quark_relative(node, &[attributes::NS_INUM])
}
