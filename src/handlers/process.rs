//! Process creation and teardown, with the PID-namespace chain of the child

use super::utils::thread_node;
use super::EventInfo;
use crate::attributes;
use crate::context::AnalysisContext;
use crate::error::StoreError;
use crate::model::HostThread;
use crate::namespace;
use crate::registry::ProcessFork;
use crate::store::{Quark, StateStore, StateValue};
use crate::values::{self, process_status};

/// Make the container machine of `ns_inum` known and place the child in it
fn register_container(
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    ns_inum: i64,
    parent_ns: Option<i64>,
    tid: i64,
) {
    let Some(machine) = info.machine else {
        return;
    };
    let container = ctx
        .containers
        .container(&mut ctx.machines, machine, ns_inum, parent_ns);
    ctx.containers
        .assign_thread(HostThread::new(info.host, tid), container);
}

fn set(
    ss: &mut dyn StateStore,
    ts: u64,
    node: Quark,
    attribute: &str,
    value: StateValue,
) -> Result<(), StoreError> {
    let quark = ss.quark_relative_and_add(node, &[attribute]);
    ss.modify_attribute(ts, value, quark)
}

pub(super) fn process_fork(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    fork: &ProcessFork<'_>,
) -> Result<(), StoreError> {
    let ts = info.ts;
    let host = info.host;
    if let Some(ns) = fork.child_ns_inum {
        namespace::container_node(ss, host, ns);
    }

    let mut parent = thread_node(ss, host, fork.parent_tid, info.pcpu);
    let mut child = thread_node(ss, host, fork.child_tid, info.pcpu);

    set(ss, ts, child, attributes::PPID, values::int_value(fork.parent_tid))?;
    set(ss, ts, child, attributes::EXEC_NAME, StateValue::str(fork.child_comm))?;
    set(ss, ts, child, attributes::STATUS, StateValue::Int(process_status::WAIT_FOR_CPU))?;

    let parent_syscall = ss.quark_relative_and_add(parent, &[attributes::SYSTEM_CALL]);
    let syscall = ss.query_ongoing(parent_syscall);
    if !syscall.is_null() {
        set(ss, ts, child, attributes::SYSTEM_CALL, syscall)?;
    }

    let max_level = fork.vtids.len() as i64;
    set(ss, ts, child, attributes::NS_MAX_LEVEL, values::int_value(max_level))?;

    let mut level: i64 = 0;
    for &vtid in fork.vtids {
        if vtid == fork.child_tid {
            set(ss, ts, child, attributes::NS_LEVEL, values::int_value(level))?;
            let Some(parent_ns) = ss.opt_quark_relative(parent, &[attributes::NS_INUM]) else {
                continue;
            };
            let ns = ss.query_ongoing(parent_ns);
            set(ss, ts, child, attributes::NS_INUM, ns.clone())?;
            if let Some(ns) = ns.as_long() {
                namespace::save_container_thread(ss, ts, host, ns, fork.child_tid, vtid)?;
            }
            continue;
        }
        level += 1;
        let last = level == max_level - 1;

        child = ss.quark_relative_and_add(child, &[attributes::VTID]);
        ss.modify_attribute(ts, values::int_value(vtid), child)?;

        if !last || fork.child_ns_inum == fork.parent_ns_inum {
            // Still inside the parent's namespace at this level
            parent = ss.quark_relative_and_add(parent, &[attributes::VTID]);
            let vppid = ss.query_ongoing(parent);
            set(ss, ts, child, attributes::VPPID, vppid)?;

            let ns = match ss.opt_quark_relative(parent, &[attributes::NS_INUM]) {
                Some(quark) => ss.query_ongoing(quark),
                // Parent never dumped: only the last level is known
                None if last => fork
                    .child_ns_inum
                    .map(StateValue::Long)
                    .unwrap_or(StateValue::Null),
                None => StateValue::Null,
            };
            set(ss, ts, child, attributes::NS_INUM, ns.clone())?;
            if let Some(ns) = ns.as_long() {
                namespace::save_container_thread(ss, ts, host, ns, fork.child_tid, vtid)?;
                register_container(ctx, info, ns, None, fork.child_tid);
            }
        } else if let Some(child_ns) = fork.child_ns_inum {
            set(ss, ts, child, attributes::VPPID, StateValue::Int(0))?;
            set(ss, ts, child, attributes::NS_INUM, StateValue::Long(child_ns))?;
            namespace::save_container_thread(ss, ts, host, child_ns, fork.child_tid, vtid)?;
            if let Some(parent_ns) = fork.parent_ns_inum {
                namespace::set_container_parent(ss, host, child_ns, parent_ns)?;
            }
            register_container(ctx, info, child_ns, fork.parent_ns_inum, fork.child_tid);
        }

        set(ss, ts, child, attributes::NS_LEVEL, values::int_value(level))?;
    }
    Ok(())
}

/// Forget a reaped thread, keeping its namespace chain
pub(super) fn process_free(
    ss: &mut dyn StateStore,
    info: &EventInfo<'_>,
    tid: i64,
) -> Result<(), StoreError> {
    let thread = thread_node(ss, info.host, tid, info.pcpu);
    for attribute in [
        attributes::STATUS,
        attributes::EXEC_NAME,
        attributes::PPID,
        attributes::SYSTEM_CALL,
        attributes::PRIO,
    ] {
        if let Some(quark) = ss.opt_quark_relative(thread, &[attribute]) {
            ss.modify_attribute(info.ts, StateValue::Null, quark)?;
        }
    }
    Ok(())
}
