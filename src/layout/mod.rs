//! Per-trace event layouts
//!
//! Different tracers name the same kernel events and fields differently
//! (`prev_tid` vs `prev_pid`, `syscall_entry_open` vs `sys_enter_open`). A layout
//! only answers naming questions; it carries no semantics.

mod ftrace;
mod lttng;

pub use ftrace::FtraceEventLayout;
pub use lttng::LttngEventLayout;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event names shared by every layout: they come from the kvm module and the
/// vmsync tracepoints, not from the tracer
pub mod qemu_kvm {
    pub const KVM_PREFIX: &str = "kvm_";
    pub const KVM_ENTRY: &str = "kvm_entry";
    pub const KVM_X86_ENTRY: &str = "kvm_x86_entry";
    pub const KVM_EXIT: &str = "kvm_exit";
    pub const KVM_X86_EXIT: &str = "kvm_x86_exit";
    pub const KVM_MMU_GET_PAGE: &str = "kvm_mmu_get_page";
    pub const KVM_NESTED_VMEXIT_INJECT: &str = "kvm_nested_vmexit_inject";

    pub const VMSYNC_GH_GUEST: &str = "vmsync_gh_guest";
    pub const VMSYNC_GH_HOST: &str = "vmsync_gh_host";
    pub const VMSYNC_HG_GUEST: &str = "vmsync_hg_guest";
    pub const VMSYNC_HG_HOST: &str = "vmsync_hg_host";

    pub const VM_UID: &str = "vm_uid";
    pub const VCPU_ID: &str = "vcpu_id";
}

/// Naming surface of one trace format
pub trait EventLayout: fmt::Debug + Send + Sync {
    /// Identifier used to share handler tables between traces of one format
    fn name(&self) -> &'static str;

    // Event names

    fn event_irq_handler_entry(&self) -> &'static str;
    fn event_irq_handler_exit(&self) -> &'static str;
    fn event_soft_irq_entry(&self) -> &'static str;
    fn event_soft_irq_exit(&self) -> &'static str;
    fn event_soft_irq_raise(&self) -> &'static str;
    fn event_sched_switch(&self) -> &'static str;
    fn event_sched_pi_setprio(&self) -> &'static str;
    fn event_sched_process_fork(&self) -> &'static str;
    fn event_sched_process_exit(&self) -> &'static str;
    fn event_sched_process_free(&self) -> &'static str;
    fn events_sched_wakeup(&self) -> &'static [&'static str];

    /// Bootstrap dump of the process table, if the tracer produces one
    fn event_statedump_process_state(&self) -> Option<&'static str>;

    fn event_syscall_entry_prefix(&self) -> &'static str;
    fn event_compat_syscall_entry_prefix(&self) -> &'static str;
    fn event_syscall_exit_prefix(&self) -> &'static str;
    fn event_compat_syscall_exit_prefix(&self) -> &'static str;

    fn events_kvm_entry(&self) -> &'static [&'static str] {
        &[qemu_kvm::KVM_ENTRY, qemu_kvm::KVM_X86_ENTRY]
    }

    fn events_kvm_exit(&self) -> &'static [&'static str] {
        &[qemu_kvm::KVM_EXIT, qemu_kvm::KVM_X86_EXIT]
    }

    fn event_kvm_mmu_get_page(&self) -> &'static str {
        qemu_kvm::KVM_MMU_GET_PAGE
    }

    fn event_kvm_nested_vmexit_inject(&self) -> &'static str {
        qemu_kvm::KVM_NESTED_VMEXIT_INJECT
    }

    // Field names

    fn field_prev_tid(&self) -> &'static str;
    fn field_prev_state(&self) -> &'static str;
    fn field_next_comm(&self) -> &'static str;
    fn field_next_tid(&self) -> &'static str;
    fn field_next_prio(&self) -> &'static str;
    fn field_irq(&self) -> &'static str {
        "irq"
    }
    fn field_vec(&self) -> &'static str {
        "vec"
    }
    fn field_tid(&self) -> &'static str;
    fn field_new_prio(&self) -> &'static str {
        "newprio"
    }
    fn field_parent_tid(&self) -> &'static str;
    fn field_child_tid(&self) -> &'static str;
    fn field_child_comm(&self) -> &'static str {
        "child_comm"
    }

    /// Namespace payload added to `sched_process_fork` by container-aware tracers
    fn field_vtids(&self) -> &'static str {
        "vtids"
    }
    fn field_child_ns_inum(&self) -> &'static str {
        "child_ns_inum"
    }
    fn field_parent_ns_inum(&self) -> &'static str {
        "parent_ns_inum"
    }

    fn field_vcpu_id(&self) -> &'static str {
        qemu_kvm::VCPU_ID
    }
    fn field_vm_uid(&self) -> &'static str {
        qemu_kvm::VM_UID
    }
}

/// Field names of the process-state dump event
pub mod statedump {
    pub const TID: &str = "tid";
    pub const VTID: &str = "vtid";
    pub const PID: &str = "pid";
    pub const VPID: &str = "vpid";
    pub const PPID: &str = "ppid";
    pub const VPPID: &str = "vppid";
    pub const NAME: &str = "name";
    pub const STATUS: &str = "status";
    pub const NS_LEVEL: &str = "ns_level";
    pub const NS_INUM: &str = "ns_inum";
}

/// Layout selector used in experiment configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Lttng,
    Ftrace,
}

static LTTNG: LttngEventLayout = LttngEventLayout;
static FTRACE: FtraceEventLayout = FtraceEventLayout;

impl LayoutKind {
    pub fn layout(self) -> &'static dyn EventLayout {
        match self {
            LayoutKind::Lttng => &LTTNG,
            LayoutKind::Ftrace => &FTRACE,
        }
    }
}
