use super::{MachineId, VcpuId};
use crate::store::StateValue;

/// Saved-state slots of one (machine, cpu) pair
///
/// For a guest machine these hold the guest's last known CPU status and thread
/// while the physical CPU runs something else. For a host CPU they hold the
/// host's status and thread while a guest runs on it.
#[derive(Debug, Clone)]
pub struct VirtualCpu {
    machine: MachineId,
    cpu_id: u32,
    pub current_state: StateValue,
    pub current_thread: StateValue,
    pub state_before_irq: StateValue,
    /// vCPU of the next nested layer, set by a mid-layer `kvm_entry`
    pub next_layer: Option<VcpuId>,
    /// Guest vCPU restored by the last `kvm_entry` on this host CPU, taken back
    /// by the matching `kvm_exit`
    pub entered: Option<VcpuId>,
}

impl VirtualCpu {
    pub(super) fn new(machine: MachineId, cpu_id: u32) -> Self {
        VirtualCpu {
            machine,
            cpu_id,
            current_state: StateValue::Null,
            current_thread: StateValue::Null,
            state_before_irq: StateValue::Null,
            next_layer: None,
            entered: None,
        }
    }

    pub fn machine(&self) -> MachineId {
        self.machine
    }

    pub fn cpu_id(&self) -> u32 {
        self.cpu_id
    }
}
