use super::*;
use crate::config::AnalysisConfig;
use crate::registry::{ProcessFork, SchedSwitch, StateDump, StateDumpDetails};
use crate::store::{MemoryHistory, StateValue};
use crate::values::{cpu_status, process_status};

/// Single-host state with CPU 0 and 1 attributed to the host
struct Fixture {
    ss: MemoryHistory,
    ctx: AnalysisContext,
    host: MachineId,
}

impl Fixture {
    fn new() -> Self {
        let traces = vec![("host".to_string(), "host".to_string())];
        let ctx = AnalysisContext::new(&traces, AnalysisConfig::default());
        let host = ctx.machines.known("host").unwrap();
        let mut ss = MemoryHistory::new(0);
        for cpu in ["0", "1"] {
            let q = ss.quark_absolute_and_add(&["CPUs", cpu, "Machine_name"]);
            ss.modify_attribute(0, StateValue::str("host"), q).unwrap();
        }
        Fixture { ss, ctx, host }
    }

    fn apply_on(&mut self, cpu: u32, ts: u64, event: KernelEvent<'_>) {
        let info = EventInfo {
            host: "host",
            machine: Some(self.host),
            cpu,
            pcpu: cpu,
            ts,
            name: "test",
        };
        dispatch(&mut self.ss, &mut self.ctx, &info, event).unwrap();
    }

    fn apply(&mut self, ts: u64, event: KernelEvent<'_>) {
        self.apply_on(0, ts, event);
    }

    fn switch_to(&mut self, ts: u64, next_tid: i64) {
        self.apply(
            ts,
            KernelEvent::SchedSwitch(SchedSwitch {
                prev_tid: 1,
                prev_state: 0,
                next_comm: "b",
                next_tid,
                next_prio: 20,
            }),
        );
    }

    fn value(&self, path: &[&str]) -> StateValue {
        self.ss.ongoing_at_path(path)
    }

    fn value_at(&self, path: &[&str], ts: u64) -> StateValue {
        let quark = self.ss.quark_of(path).unwrap();
        self.ss.query_at(quark, ts)
    }

    fn snapshot(&self) -> Vec<(Vec<String>, StateValue)> {
        self.ss
            .attributes()
            .map(|q| (self.ss.full_path(q), self.ss.query_ongoing(q)))
            .collect()
    }
}

fn int(v: i32) -> StateValue {
    StateValue::Int(v)
}

#[test]
fn test_sched_switch_sets_cpu_and_threads() {
    let mut f = Fixture::new();
    f.switch_to(10, 2);

    assert_eq!(f.value(&["CPUs", "0", "Current_thread"]), int(2));
    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::RUN_USERMODE));
    assert_eq!(f.value(&["Threads", "host", "2", "Status"]), int(process_status::RUN_USERMODE));
    assert_eq!(f.value(&["Threads", "host", "2", "Exec_name"]), StateValue::str("b"));
    assert_eq!(f.value(&["Threads", "host", "2", "Prio"]), int(20));
    assert_eq!(f.value(&["Threads", "host", "1", "Status"]), int(process_status::WAIT_FOR_CPU));
}

#[test]
fn test_switch_to_idle() {
    let mut f = Fixture::new();
    f.switch_to(10, 0);

    assert_eq!(f.value(&["CPUs", "0", "Current_thread"]), int(0));
    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::IDLE));
    assert!(f.ss.quark_of(&["Threads", "host", "0_0"]).is_some());
}

#[test]
fn test_sched_switch_on_foreign_cpu_only_updates_register() {
    let mut f = Fixture::new();
    let q = f.ss.quark_of(&["CPUs", "1", "Machine_name"]).unwrap();
    f.ss.modify_attribute(5, StateValue::str("vm"), q).unwrap();

    f.apply_on(
        1,
        10,
        KernelEvent::SchedSwitch(SchedSwitch {
            prev_tid: 1,
            prev_state: 1,
            next_comm: "b",
            next_tid: 2,
            next_prio: 20,
        }),
    );

    assert_eq!(f.value(&["CPUs", "1", "Current_thread"]), StateValue::Null);
    assert_eq!(f.value(&["CPUs", "1", "Status"]), StateValue::Null);
    assert_eq!(f.value(&["Threads", "host", "1", "Status"]), int(process_status::WAIT_BLOCKED));

    let reg = f.ctx.machines.find_vcpu(f.host, 1).unwrap();
    let vcpu = f.ctx.machines.vcpu_ref(reg);
    assert_eq!(vcpu.current_thread, int(2));
    assert_eq!(vcpu.current_state, int(cpu_status::RUN_USERMODE));
}

#[test]
fn test_irq_round_trip() {
    let mut f = Fixture::new();
    f.switch_to(10, 2);
    f.apply(20, KernelEvent::IrqEntry { irq: 5 });

    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::IRQ));
    assert_eq!(f.value(&["CPUs", "0", "IRQs", "5"]), int(0));
    assert_eq!(f.value(&["Threads", "host", "2", "Status"]), int(process_status::INTERRUPTED));

    f.apply(30, KernelEvent::IrqExit { irq: 5 });

    assert_eq!(f.value(&["CPUs", "0", "Current_thread"]), int(2));
    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::RUN_USERMODE));
    assert_eq!(f.value(&["CPUs", "0", "IRQs", "5"]), StateValue::Null);
    assert_eq!(f.value(&["Threads", "host", "2", "Status"]), int(process_status::RUN_USERMODE));
    assert_eq!(f.value_at(&["CPUs", "0", "Status"], 25), int(cpu_status::IRQ));
}

#[test]
fn test_irq_exit_inside_syscall_returns_to_syscall() {
    let mut f = Fixture::new();
    f.switch_to(10, 2);
    f.apply(15, KernelEvent::SysEntry { name: "read" });
    f.apply(20, KernelEvent::IrqEntry { irq: 9 });
    f.apply(30, KernelEvent::IrqExit { irq: 9 });

    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::RUN_SYSCALL));
    assert_eq!(f.value(&["Threads", "host", "2", "Status"]), int(process_status::RUN_SYSCALL));
}

#[test]
fn test_nested_soft_irqs_restore_state_once() {
    let mut f = Fixture::new();
    f.switch_to(10, 2);
    f.apply(20, KernelEvent::SoftIrqEntry { vec: 1 });
    f.apply(21, KernelEvent::SoftIrqRaise { vec: 3 });
    f.apply(22, KernelEvent::SoftIrqEntry { vec: 2 });
    f.apply(24, KernelEvent::SoftIrqExit { vec: 2 });

    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::SOFTIRQ));
    assert_eq!(f.value(&["Threads", "host", "2", "Status"]), int(process_status::INTERRUPTED));
    assert_eq!(f.value(&["CPUs", "0", "Soft_IRQs", "2"]), StateValue::Null);

    f.apply(26, KernelEvent::SoftIrqExit { vec: 1 });

    // Vector 3 is still raised: the CPU stays in soft irq mode
    assert_eq!(f.value(&["CPUs", "0", "Soft_IRQs", "3"]), int(cpu_status::SOFT_IRQ_RAISED));
    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::SOFTIRQ));
    assert_eq!(f.value(&["Threads", "host", "2", "Status"]), int(process_status::INTERRUPTED));

    f.apply(28, KernelEvent::SoftIrqEntry { vec: 3 });
    f.apply(30, KernelEvent::SoftIrqExit { vec: 3 });

    assert_eq!(f.value(&["CPUs", "0", "Soft_IRQs", "3"]), StateValue::Null);
    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::RUN_USERMODE));
    assert_eq!(f.value(&["Threads", "host", "2", "Status"]), int(process_status::RUN_USERMODE));
}

#[test]
fn test_raised_sibling_holds_soft_irq_mode() {
    let mut f = Fixture::new();
    f.switch_to(10, 2);
    f.apply(20, KernelEvent::SoftIrqEntry { vec: 1 });
    f.apply(25, KernelEvent::SoftIrqRaise { vec: 2 });
    f.apply(30, KernelEvent::SoftIrqExit { vec: 1 });

    assert_eq!(f.value(&["CPUs", "0", "Soft_IRQs", "1"]), StateValue::Null);
    assert_eq!(f.value(&["CPUs", "0", "Soft_IRQs", "2"]), int(cpu_status::SOFT_IRQ_RAISED));
    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::SOFTIRQ));
    assert_eq!(f.value(&["Threads", "host", "2", "Status"]), int(process_status::INTERRUPTED));
}

#[test]
fn test_raise_while_executing_keeps_both_bits() {
    let mut f = Fixture::new();
    f.switch_to(10, 2);
    f.apply(20, KernelEvent::SoftIrqEntry { vec: 4 });
    f.apply(21, KernelEvent::SoftIrqRaise { vec: 4 });

    assert_eq!(
        f.value(&["CPUs", "0", "Soft_IRQs", "4"]),
        int(cpu_status::SOFTIRQ | cpu_status::SOFT_IRQ_RAISED)
    );

    f.apply(22, KernelEvent::SoftIrqExit { vec: 4 });
    assert_eq!(f.value(&["CPUs", "0", "Soft_IRQs", "4"]), int(cpu_status::SOFT_IRQ_RAISED));
}

#[test]
fn test_wakeup_and_setprio() {
    let mut f = Fixture::new();
    f.switch_to(10, 2);
    f.apply(20, KernelEvent::SchedWakeup { tid: 2 });
    f.apply(20, KernelEvent::SchedWakeup { tid: 3 });
    f.apply(30, KernelEvent::PiSetprio { tid: 2, new_prio: 10 });

    assert_eq!(f.value(&["Threads", "host", "2", "Status"]), int(process_status::RUN_USERMODE));
    assert_eq!(f.value(&["Threads", "host", "3", "Status"]), int(process_status::WAIT_FOR_CPU));
    assert_eq!(f.value(&["Threads", "host", "2", "Prio"]), int(10));
}

#[test]
fn test_syscall_entry_and_exit() {
    let mut f = Fixture::new();
    f.switch_to(10, 2);
    f.apply(20, KernelEvent::SysEntry { name: "openat" });

    assert_eq!(f.value(&["Threads", "host", "2", "System_call"]), StateValue::str("openat"));
    assert_eq!(f.value(&["Threads", "host", "2", "Status"]), int(process_status::RUN_SYSCALL));
    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::RUN_SYSCALL));

    f.apply(30, KernelEvent::SysExit);

    assert_eq!(f.value(&["Threads", "host", "2", "System_call"]), StateValue::Null);
    assert_eq!(f.value(&["Threads", "host", "2", "Status"]), int(process_status::RUN_USERMODE));
    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::RUN_USERMODE));
}

#[test]
fn test_syscalls_ignored_when_disabled() {
    let mut f = Fixture::new();
    f.ctx.analysis.track_syscalls = false;
    f.switch_to(10, 2);
    f.apply(20, KernelEvent::SysEntry { name: "openat" });

    assert_eq!(f.value(&["Threads", "host", "2", "System_call"]), StateValue::Null);
    assert_eq!(f.value(&["CPUs", "0", "Status"]), int(cpu_status::RUN_USERMODE));
}

#[test]
fn test_syscall_without_known_thread_is_skipped() {
    let mut f = Fixture::new();
    let before = f.ss.attribute_count();
    f.apply(20, KernelEvent::SysEntry { name: "openat" });
    assert_eq!(f.ss.attribute_count(), before);
}

fn nested_fork<'a>(vtids: &'a [i64]) -> KernelEvent<'a> {
    KernelEvent::ProcessFork(ProcessFork {
        parent_tid: 1,
        child_tid: 5,
        child_comm: "sh",
        vtids,
        child_ns_inum: Some(200),
        parent_ns_inum: Some(100),
    })
}

#[test]
fn test_fork_into_new_namespace() {
    let mut f = Fixture::new();
    let vtids = [5, 7, 9];
    f.apply(10, nested_fork(&vtids));

    let child = ["Threads", "host", "5"];
    assert_eq!(f.value(&["Threads", "host", "5", "PPID"]), int(1));
    assert_eq!(f.value(&["Threads", "host", "5", "Exec_name"]), StateValue::str("sh"));
    assert_eq!(f.value(&["Threads", "host", "5", "Status"]), int(process_status::WAIT_FOR_CPU));
    assert_eq!(f.value(&["Threads", "host", "5", "ns_max_level"]), int(3));
    assert_eq!(f.value(&["Threads", "host", "5", "ns_level"]), int(0));

    assert_eq!(f.value(&["Threads", "host", "5", "VTID"]), int(7));
    assert_eq!(f.value(&["Threads", "host", "5", "VTID", "ns_level"]), int(1));
    assert_eq!(f.value(&["Threads", "host", "5", "VTID", "VTID"]), int(9));
    assert_eq!(f.value(&["Threads", "host", "5", "VTID", "VTID", "VPPID"]), int(0));
    assert_eq!(
        f.value(&["Threads", "host", "5", "VTID", "VTID", "ns_inum"]),
        StateValue::Long(200)
    );
    assert_eq!(f.value(&["Threads", "host", "5", "VTID", "VTID", "ns_level"]), int(2));

    let thread = f.ss.quark_of(&child).unwrap();
    assert_eq!(crate::namespace::deepest_ns_inum(&f.ss, thread), Some(200));
    assert_eq!(
        f.value(&["Machines", "host", "Containers", "200", "Parent"]),
        StateValue::Long(100)
    );
    assert_eq!(f.value(&["Machines", "host", "Containers", "200", "Threads", "5"]), int(9));
    assert!(f.ctx.containers.find_container(f.host, 200).is_some());
}

#[test]
fn test_fork_inherits_parent_syscall() {
    let mut f = Fixture::new();
    let q = f.ss.quark_absolute_and_add(&["Threads", "host", "1", "System_call"]);
    f.ss.modify_attribute(5, StateValue::str("clone"), q).unwrap();

    let vtids = [5];
    f.apply(
        10,
        KernelEvent::ProcessFork(ProcessFork {
            parent_tid: 1,
            child_tid: 5,
            child_comm: "sh",
            vtids: &vtids,
            child_ns_inum: None,
            parent_ns_inum: None,
        }),
    );

    assert_eq!(f.value(&["Threads", "host", "5", "System_call"]), StateValue::str("clone"));
    assert_eq!(f.value(&["Threads", "host", "5", "ns_max_level"]), int(1));
    assert!(f.ss.quark_of(&["Threads", "host", "5", "VTID"]).is_none());
}

#[test]
fn test_process_free_keeps_namespace_chain() {
    let mut f = Fixture::new();
    let vtids = [5, 7, 9];
    f.apply(10, nested_fork(&vtids));
    f.apply(40, KernelEvent::ProcessFree { tid: 5 });

    assert_eq!(f.value(&["Threads", "host", "5", "Status"]), StateValue::Null);
    assert_eq!(f.value(&["Threads", "host", "5", "Exec_name"]), StateValue::Null);
    assert_eq!(f.value(&["Threads", "host", "5", "PPID"]), StateValue::Null);
    assert_eq!(f.value(&["Threads", "host", "5", "VTID"]), int(7));
    assert_eq!(f.value_at(&["Threads", "host", "5", "Exec_name"], 20), StateValue::str("sh"));
}

#[test]
fn test_process_exit_changes_nothing() {
    let mut f = Fixture::new();
    f.switch_to(10, 2);
    let before = f.snapshot();
    f.apply(20, KernelEvent::ProcessExit);
    assert_eq!(f.snapshot(), before);
}

fn dump_levels(f: &mut Fixture, ts: u64) {
    f.apply(
        ts,
        KernelEvent::StateDump(StateDump {
            tid: 5,
            vtid: 1,
            ns_level: 1,
            details: Some(StateDumpDetails {
                pid: 5,
                vpid: 1,
                ppid: 1,
                vppid: 0,
                name: "sh",
                status: 2,
                ns_inum: 200,
            }),
        }),
    );
    f.apply(
        ts,
        KernelEvent::StateDump(StateDump {
            tid: 5,
            vtid: 5,
            ns_level: 0,
            details: Some(StateDumpDetails {
                pid: 5,
                vpid: 5,
                ppid: 1,
                vppid: 1,
                name: "sh",
                status: 2,
                ns_inum: 100,
            }),
        }),
    );
}

#[test]
fn test_state_dump_builds_levels_and_containers() {
    let mut f = Fixture::new();
    dump_levels(&mut f, 10);

    assert_eq!(f.value(&["Threads", "host", "5", "ns_max_level"]), int(2));
    assert_eq!(f.value(&["Threads", "host", "5", "Status"]), int(process_status::WAIT_FOR_CPU));
    assert_eq!(f.value(&["Threads", "host", "5", "PPID"]), int(1));
    assert_eq!(f.value(&["Threads", "host", "5", "ns_inum"]), StateValue::Long(100));
    assert_eq!(f.value(&["Threads", "host", "5", "VTID"]), int(1));
    assert_eq!(f.value(&["Threads", "host", "5", "VTID", "VPPID"]), int(0));
    assert_eq!(f.value(&["Threads", "host", "5", "VTID", "ns_inum"]), StateValue::Long(200));

    assert_eq!(
        f.value(&["Machines", "host", "Containers", "200", "Parent"]),
        StateValue::Long(100)
    );
    assert_eq!(
        f.value(&["Machines", "host", "Containers", "100", "Parent"]),
        StateValue::Long(-1)
    );
    assert!(f.ctx.containers.find_container(f.host, 200).is_some());
}

#[test]
fn test_state_dump_replay_is_idempotent() {
    let mut f = Fixture::new();
    dump_levels(&mut f, 10);
    let before = f.snapshot();
    dump_levels(&mut f, 50);
    assert_eq!(f.snapshot(), before);
}

#[test]
fn test_state_dump_never_overrides_live_state() {
    let mut f = Fixture::new();
    f.switch_to(5, 5);
    dump_levels(&mut f, 10);

    assert_eq!(f.value(&["Threads", "host", "5", "Exec_name"]), StateValue::str("b"));
    assert_eq!(f.value(&["Threads", "host", "5", "Status"]), int(process_status::RUN_USERMODE));
}
