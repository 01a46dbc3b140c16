use super::EventLayout;

/// LTTng kernel tracer naming (2.x event and field names)
#[derive(Debug, Clone, Copy, Default)]
pub struct LttngEventLayout;

impl EventLayout for LttngEventLayout {
    fn name(&self) -> &'static str {
        "lttng"
    }

    fn event_irq_handler_entry(&self) -> &'static str {
        "irq_handler_entry"
    }

    fn event_irq_handler_exit(&self) -> &'static str {
        "irq_handler_exit"
    }

    fn event_soft_irq_entry(&self) -> &'static str {
        "softirq_entry"
    }

    fn event_soft_irq_exit(&self) -> &'static str {
        "softirq_exit"
    }

    fn event_soft_irq_raise(&self) -> &'static str {
        "softirq_raise"
    }

    fn event_sched_switch(&self) -> &'static str {
        "sched_switch"
    }

    fn event_sched_pi_setprio(&self) -> &'static str {
        "sched_pi_setprio"
    }

    fn event_sched_process_fork(&self) -> &'static str {
        "sched_process_fork"
    }

    fn event_sched_process_exit(&self) -> &'static str {
        "sched_process_exit"
    }

    fn event_sched_process_free(&self) -> &'static str {
        "sched_process_free"
    }

    fn events_sched_wakeup(&self) -> &'static [&'static str] {
        &["sched_wakeup", "sched_wakeup_new", "sched_waking"]
    }

    fn event_statedump_process_state(&self) -> Option<&'static str> {
        Some("lttng_statedump_process_state")
    }

    fn event_syscall_entry_prefix(&self) -> &'static str {
        "syscall_entry_"
    }

    fn event_compat_syscall_entry_prefix(&self) -> &'static str {
        "compat_syscall_entry_"
    }

    fn event_syscall_exit_prefix(&self) -> &'static str {
        "syscall_exit_"
    }

    fn event_compat_syscall_exit_prefix(&self) -> &'static str {
        "compat_syscall_exit_"
    }

    fn field_prev_tid(&self) -> &'static str {
        "prev_tid"
    }

    fn field_prev_state(&self) -> &'static str {
        "prev_state"
    }

    fn field_next_comm(&self) -> &'static str {
        "next_comm"
    }

    fn field_next_tid(&self) -> &'static str {
        "next_tid"
    }

    fn field_next_prio(&self) -> &'static str {
        "next_prio"
    }

    fn field_tid(&self) -> &'static str {
        "tid"
    }

    fn field_parent_tid(&self) -> &'static str {
        "parent_tid"
    }

    fn field_child_tid(&self) -> &'static str {
        "child_tid"
    }
}
