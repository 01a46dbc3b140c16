//! Event name → handler resolution
//!
//! Each layout gets one name table, built the first time a trace of that
//! layout is registered; traces sharing a layout share the table. Syscall
//! events are matched by prefix after the exact lookup fails. Names that match
//! nothing are the common case and simply yield `None`.
//!
//! Decoding turns a [`TraceEvent`] into a [`KernelEvent`] carrying only the
//! typed fields its handler reads. A missing or mistyped required field makes
//! decoding return `None`, which the engine treats as a soft skip.

use std::collections::HashMap;

use crate::event::TraceEvent;
use crate::layout::{statedump, EventLayout};
use crate::values::linux;

/// Semantic class of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    IrqEntry,
    IrqExit,
    SoftIrqEntry,
    SoftIrqExit,
    SoftIrqRaise,
    SchedSwitch,
    SchedWakeup,
    PiSetprio,
    ProcessFork,
    ProcessExit,
    ProcessFree,
    StateDump,
    SysEntry,
    SysExit,
    KvmEntry,
    KvmExit,
    KvmMmuGetPage,
    KvmNestedVmExitInject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedSwitch<'a> {
    pub prev_tid: i64,
    pub prev_state: i64,
    pub next_comm: &'a str,
    pub next_tid: i64,
    pub next_prio: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFork<'a> {
    pub parent_tid: i64,
    pub child_tid: i64,
    pub child_comm: &'a str,
    /// One virtual tid per namespace level, root level first
    pub vtids: &'a [i64],
    pub child_ns_inum: Option<i64>,
    pub parent_ns_inum: Option<i64>,
}

/// Per-level process description from the bootstrap state dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDump<'a> {
    pub tid: i64,
    pub vtid: i64,
    pub ns_level: i64,
    /// `None` when the dump entry only allows building the level chain
    pub details: Option<StateDumpDetails<'a>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDumpDetails<'a> {
    pub pid: i64,
    pub vpid: i64,
    pub ppid: i64,
    pub vppid: i64,
    pub name: &'a str,
    pub status: i64,
    pub ns_inum: i64,
}

/// A decoded event, ready for its handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelEvent<'a> {
    IrqEntry { irq: i64 },
    IrqExit { irq: i64 },
    SoftIrqEntry { vec: i64 },
    SoftIrqExit { vec: i64 },
    SoftIrqRaise { vec: i64 },
    SchedSwitch(SchedSwitch<'a>),
    SchedWakeup { tid: i64 },
    PiSetprio { tid: i64, new_prio: i64 },
    ProcessFork(ProcessFork<'a>),
    ProcessExit,
    ProcessFree { tid: i64 },
    StateDump(StateDump<'a>),
    SysEntry { name: &'a str },
    SysExit,
    KvmEntry,
    KvmExit,
    KvmMmuGetPage,
    KvmNestedVmExitInject,
}

#[derive(Debug)]
struct LayoutTable {
    layout: &'static dyn EventLayout,
    names: HashMap<&'static str, EventKind>,
}

impl LayoutTable {
    fn build(layout: &'static dyn EventLayout) -> Self {
        let mut names = HashMap::new();
        names.insert(layout.event_irq_handler_entry(), EventKind::IrqEntry);
        names.insert(layout.event_irq_handler_exit(), EventKind::IrqExit);
        names.insert(layout.event_soft_irq_entry(), EventKind::SoftIrqEntry);
        names.insert(layout.event_soft_irq_exit(), EventKind::SoftIrqExit);
        names.insert(layout.event_soft_irq_raise(), EventKind::SoftIrqRaise);
        names.insert(layout.event_sched_switch(), EventKind::SchedSwitch);
        names.insert(layout.event_sched_pi_setprio(), EventKind::PiSetprio);
        names.insert(layout.event_sched_process_fork(), EventKind::ProcessFork);
        names.insert(layout.event_sched_process_exit(), EventKind::ProcessExit);
        names.insert(layout.event_sched_process_free(), EventKind::ProcessFree);
        if let Some(name) = layout.event_statedump_process_state() {
            names.insert(name, EventKind::StateDump);
        }
        for name in layout.events_sched_wakeup() {
            names.insert(*name, EventKind::SchedWakeup);
        }
        for name in layout.events_kvm_entry() {
            names.insert(*name, EventKind::KvmEntry);
        }
        for name in layout.events_kvm_exit() {
            names.insert(*name, EventKind::KvmExit);
        }
        names.insert(layout.event_kvm_mmu_get_page(), EventKind::KvmMmuGetPage);
        names.insert(
            layout.event_kvm_nested_vmexit_inject(),
            EventKind::KvmNestedVmExitInject,
        );
        LayoutTable { layout, names }
    }

    fn classify(&self, name: &str) -> Option<EventKind> {
        if let Some(kind) = self.names.get(name) {
            return Some(*kind);
        }
        let layout = self.layout;
        if name.starts_with(layout.event_syscall_exit_prefix())
            || name.starts_with(layout.event_compat_syscall_exit_prefix())
        {
            return Some(EventKind::SysExit);
        }
        if name.starts_with(layout.event_syscall_entry_prefix())
            || name.starts_with(layout.event_compat_syscall_entry_prefix())
        {
            return Some(EventKind::SysEntry);
        }
        None
    }
}

/// Handler tables, one per distinct layout
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    tables: HashMap<&'static str, LayoutTable>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `layout` known; returns `false` if a layout of the same name was
    /// already registered and its table is reused
    pub fn register(&mut self, layout: &'static dyn EventLayout) -> bool {
        if self.tables.contains_key(layout.name()) {
            return false;
        }
        self.tables.insert(layout.name(), LayoutTable::build(layout));
        true
    }

    pub fn layout_count(&self) -> usize {
        self.tables.len()
    }

    /// Handler class of `name` under `layout`, `None` for irrelevant events
    pub fn classify(&self, layout: &dyn EventLayout, name: &str) -> Option<EventKind> {
        self.tables.get(layout.name())?.classify(name)
    }
}

/// Extract the typed payload of `event` for a handler of class `kind`
pub fn decode<'a>(
    kind: EventKind,
    event: &'a TraceEvent,
    layout: &dyn EventLayout,
) -> Option<KernelEvent<'a>> {
    let int = |name: &str| event.int_field(name);

    Some(match kind {
        EventKind::IrqEntry => KernelEvent::IrqEntry {
            irq: int(layout.field_irq())?,
        },
        EventKind::IrqExit => KernelEvent::IrqExit {
            irq: int(layout.field_irq())?,
        },
        EventKind::SoftIrqEntry => KernelEvent::SoftIrqEntry {
            vec: int(layout.field_vec())?,
        },
        EventKind::SoftIrqExit => KernelEvent::SoftIrqExit {
            vec: int(layout.field_vec())?,
        },
        EventKind::SoftIrqRaise => KernelEvent::SoftIrqRaise {
            vec: int(layout.field_vec())?,
        },
        EventKind::SchedSwitch => KernelEvent::SchedSwitch(SchedSwitch {
            prev_tid: int(layout.field_prev_tid())?,
            prev_state: int(layout.field_prev_state())?,
            next_comm: event.str_field(layout.field_next_comm())?,
            next_tid: int(layout.field_next_tid())?,
            next_prio: int(layout.field_next_prio())?,
        }),
        EventKind::SchedWakeup => KernelEvent::SchedWakeup {
            tid: int(layout.field_tid())?,
        },
        EventKind::PiSetprio => KernelEvent::PiSetprio {
            tid: int(layout.field_tid())?,
            new_prio: int(layout.field_new_prio())?,
        },
        EventKind::ProcessFork => KernelEvent::ProcessFork(ProcessFork {
            parent_tid: int(layout.field_parent_tid())?,
            child_tid: int(layout.field_child_tid())?,
            child_comm: event.str_field(layout.field_child_comm())?,
            vtids: event.int_array_field(layout.field_vtids()).unwrap_or(&[]),
            child_ns_inum: int(layout.field_child_ns_inum()),
            parent_ns_inum: int(layout.field_parent_ns_inum()),
        }),
        EventKind::ProcessExit => KernelEvent::ProcessExit,
        EventKind::ProcessFree => KernelEvent::ProcessFree {
            tid: int(layout.field_tid())?,
        },
        EventKind::StateDump => KernelEvent::StateDump(StateDump {
            tid: int(statedump::TID)?,
            vtid: int(statedump::VTID)?,
            ns_level: int(statedump::NS_LEVEL)
                .filter(|level| (0..=linux::MAX_PID_NS_LEVEL).contains(level))?,
            details: decode_statedump_details(event),
        }),
        EventKind::SysEntry => KernelEvent::SysEntry {
            name: event.name.as_str(),
        },
        EventKind::SysExit => KernelEvent::SysExit,
        EventKind::KvmEntry => KernelEvent::KvmEntry,
        EventKind::KvmExit => KernelEvent::KvmExit,
        EventKind::KvmMmuGetPage => KernelEvent::KvmMmuGetPage,
        EventKind::KvmNestedVmExitInject => KernelEvent::KvmNestedVmExitInject,
    })
}

fn decode_statedump_details(event: &TraceEvent) -> Option<StateDumpDetails<'_>> {
    Some(StateDumpDetails {
        pid: event.int_field(statedump::PID)?,
        vpid: event.int_field(statedump::VPID)?,
        ppid: event.int_field(statedump::PPID)?,
        vppid: event.int_field(statedump::VPPID)?,
        name: event.str_field(statedump::NAME)?,
        status: event.int_field(statedump::STATUS)?,
        ns_inum: event.int_field(statedump::NS_INUM)?,
    })
}
