//! Namespace chains and the container registry in the state tree
//!
//! A thread node carries its root-namespace view (`ns_level`, `ns_inum`) and
//! one nested `VTID` node per deeper PID namespace, each with its own
//! `ns_inum`, `VPPID` and `ns_level`. `ns_max_level` on the thread node is the
//! number of levels.
//!
//! Containers are registered per machine under
//! `Machines/<host>/Containers/<ns_inum>`.

use crate::attributes;
use crate::error::StoreError;
use crate::store::{Quark, StateStore, StateValue};
use crate::values;

/// `Machines/<host>/Containers/<ns_inum>`, created if needed
pub fn container_node(ss: &mut dyn StateStore, host: &str, ns_inum: i64) -> Quark {
    ss.quark_absolute_and_add(&[
        attributes::MACHINES,
        host,
        attributes::CONTAINERS,
        &ns_inum.to_string(),
    ])
}

/// Record `tid` (as known on `host`) in the container, with its virtual tid
pub fn save_container_thread(
    ss: &mut dyn StateStore,
    ts: u64,
    host: &str,
    ns_inum: i64,
    tid: i64,
    vtid: i64,
) -> Result<(), StoreError> {
    let container = container_node(ss, host, ns_inum);
    let quark = ss.quark_relative_and_add(container, &[attributes::THREADS, &tid.to_string()]);
    ss.modify_attribute(ts, values::int_value(vtid), quark)
}

/// Set the parent namespace of a container, unless one is already recorded
///
/// The parent is a property of the namespace for the whole trace, so it is
/// written at the start of the analysed range.
pub fn set_container_parent(
    ss: &mut dyn StateStore,
    host: &str,
    ns_inum: i64,
    parent: i64,
) -> Result<bool, StoreError> {
    let container = container_node(ss, host, ns_inum);
    let quark = ss.quark_relative_and_add(container, &[attributes::PARENT]);
    let start = ss.start_time();
    ss.set_if_absent(start, StateValue::Long(parent), quark)
}

/// Node of namespace level `level` below a thread node (level 0 is the thread
/// node itself)
pub fn level_node(ss: &dyn StateStore, thread: Quark, level: usize) -> Option<Quark> {
    let mut node = thread;
    for _ in 0..level {
        node = ss.opt_quark_relative(node, &[attributes::VTID])?;
    }
    Some(node)
}

/// Namespace ids of every nested level of a thread, outermost first
///
/// The root namespace is not included. The walk stops at the first level
/// that is missing or has no `ns_inum` yet.
pub fn process_ns_ids(ss: &dyn StateStore, thread: Quark) -> Vec<i64> {
    let mut namespaces = Vec::new();
    let max_level = ss
        .opt_quark_relative(thread, &[attributes::NS_MAX_LEVEL])
        .and_then(|q| ss.query_ongoing(q).as_int())
        .unwrap_or(0);

    let mut node = thread;
    for _ in 1..max_level.max(1) {
        let Some(next) = ss.opt_quark_relative(node, &[attributes::VTID]) else {
            break;
        };
        let Some(ns_quark) = ss.opt_quark_relative(next, &[attributes::NS_INUM]) else {
            break;
        };
        if let Some(ns) = ss.query_ongoing(ns_quark).as_long() {
            namespaces.push(ns);
        }
        node = next;
    }
    namespaces
}

/// `ns_inum` of the deepest namespace level of a thread
pub fn deepest_ns_inum(ss: &dyn StateStore, thread: Quark) -> Option<i64> {
    let max_level = ss
        .opt_quark_relative(thread, &[attributes::NS_MAX_LEVEL])
        .and_then(|q| ss.query_ongoing(q).as_int())?;
    let level = usize::try_from(max_level - 1).ok()?;
    let node = level_node(ss, thread, level)?;
    let quark = ss.opt_quark_relative(node, &[attributes::NS_INUM])?;
    ss.query_ongoing(quark).as_long()
}
