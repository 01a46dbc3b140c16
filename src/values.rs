//! State values written to the tree, and the Linux constants they derive from

use crate::store::StateValue;

/// CPU status bits (`CPUs/<n>/Status`)
pub mod cpu_status {
    pub const IDLE: i32 = 0;
    pub const RUN_USERMODE: i32 = 1;
    pub const RUN_SYSCALL: i32 = 2;
    pub const IRQ: i32 = 4;
    pub const SOFTIRQ: i32 = 8;
    pub const SOFT_IRQ_RAISED: i32 = 16;
}

/// CPU condition (`CPUs/<n>/Condition`)
pub mod condition {
    pub const IN_VM: i32 = 0;
    pub const OUT_VM: i32 = 1;
    pub const UNKNOWN: i32 = 3;
}

/// Thread status (`Threads/<m>/<tid>/Status`)
pub mod process_status {
    pub const UNKNOWN: i32 = 0;
    pub const WAIT_BLOCKED: i32 = 1;
    pub const RUN_USERMODE: i32 = 2;
    pub const RUN_SYSCALL: i32 = 3;
    pub const INTERRUPTED: i32 = 4;
    pub const WAIT_FOR_CPU: i32 = 5;
    pub const WAIT_UNKNOWN: i32 = 6;
}

/// Machine type bits (`Machines/<m>`)
pub mod machine_type {
    pub const HOST: i32 = 1 << 0;
    pub const GUEST: i32 = 1 << 1;
    pub const CONTAINER: i32 = 1 << 2;
}

/// Kernel task state bits as found in `sched_switch.prev_state`
pub mod linux {
    pub const TASK_INTERRUPTIBLE: i64 = 1;
    pub const TASK_UNINTERRUPTIBLE: i64 = 2;
    pub const TASK_DEAD: i64 = 64;
    pub const TASK_NOLOAD: i64 = 1024;

    /// `lttng_statedump_process_state.status` values
    pub const STATEDUMP_PROCESS_STATUS_WAIT_CPU: i64 = 2;
    pub const STATEDUMP_PROCESS_STATUS_WAIT: i64 = 5;

    /// Deepest PID namespace nesting the kernel allows
    pub const MAX_PID_NS_LEVEL: i64 = 32;
}

/// Integer state value for a tid, prio or level; wider values stay longs
pub fn int_value(value: i64) -> StateValue {
    i32::try_from(value)
        .map(StateValue::Int)
        .unwrap_or(StateValue::Long(value))
}

/// Whether a CPU status value has the given bit set
pub fn has_bit(value: &StateValue, bit: i32) -> bool {
    value.as_int().is_some_and(|v| v & bit == bit)
}
