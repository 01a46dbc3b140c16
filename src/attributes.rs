//! Attribute names of the fused state tree
//!
//! Layout of the tree written by the handlers:
//!
//! ```text
//! CPUs/<pcpu>/{Current_thread, Status, Condition, Machine_name, Virtual_cpu}
//! CPUs/<pcpu>/IRQs/<irq>
//! CPUs/<pcpu>/Soft_IRQs/<vec>
//! Threads/<machine>/<tid>/{Status, Exec_name, PPID, System_call, Prio,
//!                          ns_max_level, ns_level, ns_inum, VTID/...}
//! Machines/<machine>                    (machine type bits)
//! Machines/<machine>/{Machine_name, Parent, CPUs/<n>, pCPUs/<n>}
//! Machines/<machine>/Containers/<ns_inum>/{Parent, pCPUs/<n>, Threads/<tid>}
//! ```

pub const CPUS: &str = "CPUs";
pub const THREADS: &str = "Threads";
pub const MACHINES: &str = "Machines";
pub const IRQS: &str = "IRQs";
pub const SOFT_IRQS: &str = "Soft_IRQs";

pub const CURRENT_THREAD: &str = "Current_thread";
pub const STATUS: &str = "Status";
pub const CONDITION: &str = "Condition";
pub const MACHINE_NAME: &str = "Machine_name";
pub const VIRTUAL_CPU: &str = "Virtual_cpu";

pub const PCPUS: &str = "pCPUs";
pub const CONTAINERS: &str = "Containers";
pub const PARENT: &str = "Parent";

pub const EXEC_NAME: &str = "Exec_name";
pub const PPID: &str = "PPID";
pub const SYSTEM_CALL: &str = "System_call";
pub const PRIO: &str = "Prio";

pub const NS_MAX_LEVEL: &str = "ns_max_level";
pub const NS_LEVEL: &str = "ns_level";
pub const NS_INUM: &str = "ns_inum";
pub const VTID: &str = "VTID";
pub const VPPID: &str = "VPPID";

/// Prefix of the per-CPU swapper thread entries (`0_<cpu>`)
pub const THREAD_0_PREFIX: &str = "0_";

/// Attribute name of a thread below `Threads/<machine>`
///
/// The idle thread exists once per CPU, so tid 0 is qualified by the CPU it
/// runs on.
///
/// # Example
/// ```
/// use fusedvm::attributes::thread_attribute_name;
///
/// assert_eq!(thread_attribute_name(42, 3), "42");
/// assert_eq!(thread_attribute_name(0, 3), "0_3");
/// ```
pub fn thread_attribute_name(tid: i64, cpu: u32) -> String {
    if tid == 0 {
        format!("{}{}", THREAD_0_PREFIX, cpu)
    } else {
        tid.to_string()
    }
}
