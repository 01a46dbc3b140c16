//! Bootstrap from the process state dump
//!
//! The dump describes each process once per namespace level, deepest level
//! first. Every write here is write-once: replaying the same dump, or a dump
//! that arrives after live events already described the thread, never
//! overrides what is known.

use super::utils::thread_node;
use super::EventInfo;
use crate::attributes;
use crate::context::AnalysisContext;
use crate::error::StoreError;
use crate::model::HostThread;
use crate::namespace;
use crate::registry::{StateDump, StateDumpDetails};
use crate::store::{Quark, StateStore, StateValue};
use crate::values::{self, linux, process_status};

pub(super) fn state_dump(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    dump: &StateDump<'_>,
) -> Result<(), StoreError> {
    let thread = thread_node(ss, info.host, dump.tid, info.pcpu);
    let layer = create_levels(ss, info.ts, thread, dump)?;
    if let Some(details) = &dump.details {
        fill_level(ss, ctx, info, thread, layer, dump, details)?;
    }
    Ok(())
}

/// Build the `VTID` chain down to the dumped level, returning its node
fn create_levels(
    ss: &mut dyn StateStore,
    ts: u64,
    thread: Quark,
    dump: &StateDump<'_>,
) -> Result<Quark, StoreError> {
    let mut layer = thread;
    for i in 0..dump.ns_level {
        layer = ss.quark_relative_and_add(layer, &[attributes::VTID]);
        if i + 1 == dump.ns_level {
            ss.modify_attribute(ts, values::int_value(dump.vtid), layer)?;
        }
        ss.quark_relative_and_add(layer, &[attributes::VPPID]);
        let quark = ss.quark_relative_and_add(layer, &[attributes::NS_LEVEL]);
        ss.set_if_absent(ts, values::int_value(i + 1), quark)?;
    }
    Ok(layer)
}

fn set_once(
    ss: &mut dyn StateStore,
    ts: u64,
    node: Quark,
    attribute: &str,
    value: StateValue,
) -> Result<bool, StoreError> {
    let quark = ss.quark_relative_and_add(node, &[attribute]);
    ss.set_if_absent(ts, value, quark)
}

fn dumped_status(status: i64) -> StateValue {
    match status {
        linux::STATEDUMP_PROCESS_STATUS_WAIT_CPU => StateValue::Int(process_status::WAIT_FOR_CPU),
        // Nothing says what the process waits on
        linux::STATEDUMP_PROCESS_STATUS_WAIT => StateValue::Int(process_status::WAIT_UNKNOWN),
        _ => StateValue::Int(process_status::UNKNOWN),
    }
}

fn fill_level(
    ss: &mut dyn StateStore,
    ctx: &mut AnalysisContext,
    info: &EventInfo<'_>,
    thread: Quark,
    layer: Quark,
    dump: &StateDump<'_>,
    details: &StateDumpDetails<'_>,
) -> Result<(), StoreError> {
    let ts = info.ts;
    let host = info.host;

    set_once(ss, ts, thread, attributes::NS_MAX_LEVEL, values::int_value(dump.ns_level + 1))?;
    let max_level = ss
        .opt_quark_relative(thread, &[attributes::NS_MAX_LEVEL])
        .and_then(|q| ss.query_ongoing(q).as_long())
        .unwrap_or(dump.ns_level + 1);

    set_once(ss, ts, thread, attributes::STATUS, dumped_status(details.status))?;
    set_once(ss, ts, thread, attributes::EXEC_NAME, StateValue::str(details.name))?;

    let at_root = dump.ns_level == 0;
    let ppid_attribute = if at_root {
        attributes::PPID
    } else {
        attributes::VPPID
    };
    // A process names its parent, a thread names its process
    let (layer_ppid, root_ppid) = if details.vpid == dump.vtid {
        (details.vppid, details.ppid)
    } else {
        (details.vpid, details.pid)
    };
    let written = set_once(ss, ts, layer, ppid_attribute, values::int_value(layer_ppid))?;
    if written && !at_root {
        set_once(ss, ts, thread, attributes::PPID, values::int_value(root_ppid))?;
    }

    set_once(ss, ts, layer, attributes::NS_LEVEL, values::int_value(dump.ns_level))?;
    set_once(ss, ts, layer, attributes::NS_INUM, StateValue::Long(details.ns_inum))?;

    namespace::save_container_thread(ss, ts, host, details.ns_inum, dump.tid, dump.vtid)?;
    if !at_root {
        if let Some(machine) = info.machine {
            let container = ctx
                .containers
                .container(&mut ctx.machines, machine, details.ns_inum, None);
            ctx.containers
                .assign_thread(HostThread::new(host, dump.tid), container);
        }
    }

    if dump.ns_level != max_level - 1 {
        // This namespace is the parent of the one a level deeper
        let child_ns = ss
            .opt_quark_relative(layer, &[attributes::VTID, attributes::NS_INUM])
            .and_then(|q| ss.query_ongoing(q).as_long());
        if let Some(child_ns) = child_ns.filter(|ns| *ns > 0) {
            namespace::set_container_parent(ss, host, child_ns, details.ns_inum)?;
        }
    }

    if at_root {
        namespace::set_container_parent(ss, host, details.ns_inum, -1)?;
    }
    Ok(())
}
