use crate::config::AnalysisConfig;
use crate::model::{LxcModel, MachineArena, QemuKvmModel};

/// Everything the handlers share besides the state store
///
/// Owned by one engine and passed explicitly to every handler call, so two
/// engines never see each other's machines.
#[derive(Debug)]
pub struct AnalysisContext {
    pub machines: MachineArena,
    pub kvm: QemuKvmModel,
    pub containers: LxcModel,
    pub analysis: AnalysisConfig,
}

impl AnalysisContext {
    /// Context for an experiment made of `traces` (host id, trace name)
    pub fn new(traces: &[(String, String)], analysis: AnalysisConfig) -> Self {
        let mut machines = MachineArena::new();
        let kvm = QemuKvmModel::new(&mut machines, traces);
        AnalysisContext {
            machines,
            kvm,
            containers: LxcModel::new(),
            analysis,
        }
    }
}
