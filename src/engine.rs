//! The fused state reconstruction engine
//!
//! One engine consumes the merged, time-ordered event stream of every trace of
//! an experiment. For each event it:
//!
//! 1. resolves the machine that emitted it, learning machine roles from the
//!    event while they are not all known,
//! 2. lets the QEMU/KVM model observe it,
//! 3. translates the event CPU into a physical CPU,
//! 4. once roles are known, records per-CPU and per-machine facts (condition,
//!    virtual CPU, CPU lists, machine roles and parents),
//! 5. dispatches it to its handler.
//!
//! # Example
//! ```
//! use fusedvm::config::ExperimentConfig;
//! use fusedvm::engine::FusedEngine;
//! use fusedvm::event::TraceEvent;
//! use fusedvm::layout::LayoutKind;
//! use fusedvm::store::StateValue;
//!
//! let mut engine = FusedEngine::new(ExperimentConfig::single("server", LayoutKind::Lttng))?;
//! engine.handle_event(
//!     &TraceEvent::new("server", "sched_switch", 10)
//!         .cpu(0)
//!         .field("prev_tid", 0)
//!         .field("prev_state", 0)
//!         .field("next_tid", 42)
//!         .field("next_comm", "bash")
//!         .field("next_prio", 20),
//! )?;
//!
//! let current = engine.store().ongoing_at_path(&["CPUs", "0", "Current_thread"]);
//! assert_eq!(current, StateValue::Int(42));
//! # Ok::<(), fusedvm::error::FusedError>(())
//! ```

use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info};

use crate::attributes;
use crate::config::ExperimentConfig;
use crate::context::AnalysisContext;
use crate::error::{FusedError, Result, StoreError};
use crate::event::TraceEvent;
use crate::handlers::{self, EventInfo};
use crate::layout::EventLayout;
use crate::model::{LxcModel, MachineId};
use crate::registry::{self, HandlerRegistry};
use crate::store::{MemoryHistory, StateStore, StateValue};
use crate::values::condition;

/// Per-trace data resolved once at construction
#[derive(Debug)]
struct TraceEntry {
    name: String,
    layout: &'static dyn EventLayout,
    container_events: Vec<&'static str>,
}

/// State reconstruction over a set of co-analysed traces
#[derive(Debug)]
pub struct FusedEngine<S: StateStore = MemoryHistory> {
    config: ExperimentConfig,
    store: S,
    ctx: AnalysisContext,
    registry: HandlerRegistry,
    traces: HashMap<String, TraceEntry>,
    roles_found: bool,
    roles_published: bool,
    aborted: HashSet<String>,
}

impl FusedEngine<MemoryHistory> {
    /// Engine writing to a fresh in-memory history starting at 0
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        Self::with_store(config, MemoryHistory::default())
    }

    /// Fresh engine over the same experiment: new model, new registry, empty
    /// store with the same start time
    pub fn new_instance(&self) -> Result<Self> {
        Self::with_store(
            self.config.clone(),
            MemoryHistory::new(self.store.start_time()),
        )
    }
}

impl<S: StateStore> FusedEngine<S> {
    /// Version of the produced state layout, bumped on any change to the tree
    pub const VERSION: u32 = 1;

    /// Engine writing to `store`
    ///
    /// # Errors
    /// [`FusedError::Config`] if the experiment is invalid.
    pub fn with_store(config: ExperimentConfig, store: S) -> Result<Self> {
        config.validate()?;

        let mut registry = HandlerRegistry::new();
        let mut traces = HashMap::new();
        for trace in &config.traces {
            let layout = trace.layout.layout();
            if registry.register(layout) {
                debug!(layout = layout.name(), "handler table built");
            }
            traces.insert(
                trace.host_id.clone(),
                TraceEntry {
                    name: trace.trace_name().to_string(),
                    layout,
                    container_events: LxcModel::required_events(layout),
                },
            );
        }

        let names: Vec<(String, String)> = config
            .traces
            .iter()
            .map(|t| (t.host_id.clone(), t.trace_name().to_string()))
            .collect();
        let ctx = AnalysisContext::new(&names, config.analysis.clone());

        Ok(FusedEngine {
            config,
            store,
            ctx,
            registry,
            traces,
            roles_found: false,
            roles_published: false,
            aborted: HashSet::new(),
        })
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn context(&self) -> &AnalysisContext {
        &self.ctx
    }

    /// Whether every trace's machine has a settled role
    pub fn roles_found(&self) -> bool {
        self.roles_found
    }

    pub fn is_aborted(&self, host: &str) -> bool {
        self.aborted.contains(host)
    }

    /// Process one event
    ///
    /// Unknown or incomplete events are skipped; a store error is logged and
    /// the engine keeps going.
    ///
    /// # Errors
    /// [`FusedError::MissingLayout`] for the first event of a host that is not
    /// part of the experiment, [`FusedError::TraceAborted`] for every later one.
    pub fn handle_event(&mut self, event: &TraceEvent) -> Result<()> {
        if self.aborted.contains(&event.host) {
            return Err(FusedError::TraceAborted {
                host: event.host.clone(),
            });
        }
        let Some(trace) = self.traces.get(&event.host) else {
            error!(host = %event.host, event = %event.name, "no layout for trace, aborting it");
            self.aborted.insert(event.host.clone());
            return Err(FusedError::MissingLayout {
                host: event.host.clone(),
            });
        };
        let layout = trace.layout;
        let Some(cpu) = event.cpu else {
            return Ok(());
        };

        let ctx = &mut self.ctx;
        let machine = if self.roles_found {
            ctx.machines.known(&event.host)
        } else {
            ctx.kvm
                .current_machine_and_add(&mut ctx.machines, event, &trace.name, layout)
        };
        ctx.kvm.handle_event(&mut ctx.machines, event, layout);

        let container_event = ctx.analysis.container_events_before_roles
            && trace.container_events.contains(&event.name.as_str());
        if !self.check_roles() && !container_event {
            return Ok(());
        }

        let mut pcpu = cpu;
        let mut guest = false;
        if let Some(m) = machine {
            self.ctx.machines.vcpu(m, cpu);
            if self.ctx.machines.machine(m).is_guest() {
                guest = true;
                match self.ctx.kvm.physical_cpu(&self.ctx.machines, m, cpu) {
                    Some(p) => pcpu = p,
                    None => return Ok(()),
                }
            }
        }

        let info = EventInfo {
            host: &event.host,
            machine,
            cpu,
            pcpu,
            ts: event.timestamp,
            name: &event.name,
        };

        if self.roles_found {
            if let Err(err) = self.preamble(&info, guest) {
                error!(ts = info.ts, event = info.name, cpu = info.pcpu, %err, "machine state update rejected");
            }
        }

        let Some(kind) = self.registry.classify(layout, &event.name) else {
            return Ok(());
        };
        let Some(decoded) = registry::decode(kind, event, layout) else {
            debug!(ts = info.ts, event = info.name, "missing field, event skipped");
            return Ok(());
        };
        if let Err(err) = handlers::dispatch(&mut self.store, &mut self.ctx, &info, decoded) {
            error!(ts = info.ts, event = info.name, cpu = info.pcpu, %err, "state update rejected");
        }
        Ok(())
    }

    /// All traced machines identified? Cached once true.
    fn check_roles(&mut self) -> bool {
        if !self.roles_found
            && self.ctx.machines.number_of_identified_machines() == self.config.traces.len()
        {
            info!(machines = self.config.traces.len(), "all machine roles found");
            self.roles_found = true;
        }
        self.roles_found
    }

    fn preamble(&mut self, info: &EventInfo<'_>, guest: bool) -> std::result::Result<(), StoreError> {
        let ss = &mut self.store;
        let host = info.host;
        let cpu = ss.quark_absolute_and_add(&[attributes::CPUS, &info.pcpu.to_string()]);
        let pcpu = info.pcpu.to_string();

        if guest {
            let quark = ss.quark_relative_and_add(cpu, &[attributes::VIRTUAL_CPU]);
            ss.modify_attribute(info.ts, crate::values::int_value(i64::from(info.cpu)), quark)?;
            let machine = ss.quark_absolute_and_add(&[attributes::MACHINES, host]);
            ss.quark_relative_and_add(machine, &[attributes::CPUS, &info.cpu.to_string()]);
            ss.quark_relative_and_add(machine, &[attributes::PCPUS, &pcpu]);
        } else {
            ss.quark_absolute_and_add(&[attributes::MACHINES, host, attributes::CPUS, &pcpu]);
        }

        if !self.roles_published {
            self.publish_machines()?;
            self.roles_published = true;
        }

        let pure_host = info.machine.is_some_and(|m| {
            let m = self.ctx.machines.machine(m);
            m.is_host() && !m.is_guest()
        });
        if pure_host {
            let ss = &mut self.store;
            let quark = ss.quark_relative_and_add(cpu, &[attributes::CONDITION]);
            ss.modify_attribute(info.ts, StateValue::Int(condition::OUT_VM), quark)?;
            let quark = ss.quark_relative_and_add(cpu, &[attributes::MACHINE_NAME]);
            ss.modify_attribute(info.ts, StateValue::str(host), quark)?;
        }
        Ok(())
    }

    /// Record machine roles, trace names and parents under `Machines`
    fn publish_machines(&mut self) -> std::result::Result<(), StoreError> {
        let start = self.store.start_time();
        let machines: Vec<MachineId> = self.ctx.machines.known_machines();
        for id in machines {
            let m = self.ctx.machines.machine(id);
            let host_id = m.host_id().to_string();
            let machine_type = m.machine_type();
            let trace_name = m.trace_name().to_string();
            let parent = m
                .parent()
                .map(|p| self.ctx.machines.machine(p).host_id().to_string());

            let ss = &mut self.store;
            let node = ss.quark_absolute_and_add(&[attributes::MACHINES, &host_id]);
            ss.set_if_absent(start, StateValue::Int(machine_type), node)?;
            let quark = ss.quark_relative_and_add(node, &[attributes::MACHINE_NAME]);
            ss.set_if_absent(start, StateValue::str(trace_name), quark)?;
            if let Some(parent) = parent {
                let quark = ss.quark_relative_and_add(node, &[attributes::PARENT]);
                ss.set_if_absent(start, StateValue::str(parent), quark)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TraceConfig;
    use crate::layout::LayoutKind;

    fn switch(host: &str, ts: u64, cpu: u32, next: i64) -> TraceEvent {
        TraceEvent::new(host, "sched_switch", ts)
            .cpu(cpu)
            .field("prev_tid", 0)
            .field("prev_state", 0)
            .field("next_tid", next)
            .field("next_comm", "t")
            .field("next_prio", 20)
    }

    #[test]
    fn test_single_trace_roles_found_on_first_event() {
        let mut engine = FusedEngine::new(ExperimentConfig::single("h", LayoutKind::Lttng)).unwrap();
        assert!(!engine.roles_found());
        engine.handle_event(&switch("h", 1, 0, 5)).unwrap();
        assert!(engine.roles_found());
        let ss = engine.store();
        assert_eq!(ss.ongoing_at_path(&["Machines", "h"]), StateValue::Int(1));
        assert_eq!(ss.ongoing_at_path(&["Machines", "h", "Machine_name"]), StateValue::str("h"));
        assert_eq!(ss.ongoing_at_path(&["CPUs", "0", "Condition"]), StateValue::Int(condition::OUT_VM));
        assert!(ss.quark_of(&["Machines", "h", "CPUs", "0"]).is_some());
    }

    #[test]
    fn test_unknown_host_aborts_only_that_trace() {
        let mut engine = FusedEngine::new(ExperimentConfig::single("h", LayoutKind::Lttng)).unwrap();
        let err = engine.handle_event(&switch("ghost", 1, 0, 5)).unwrap_err();
        assert!(err.is_fatal());
        assert!(engine.is_aborted("ghost"));
        let err = engine.handle_event(&switch("ghost", 2, 0, 5)).unwrap_err();
        assert!(matches!(err, FusedError::TraceAborted { .. }));

        engine.handle_event(&switch("h", 3, 0, 5)).unwrap();
        assert_eq!(
            engine.store().ongoing_at_path(&["CPUs", "0", "Current_thread"]),
            StateValue::Int(5)
        );
    }

    #[test]
    fn test_event_without_cpu_is_ignored() {
        let mut engine = FusedEngine::new(ExperimentConfig::single("h", LayoutKind::Lttng)).unwrap();
        let mut event = switch("h", 1, 0, 5);
        event.cpu = None;
        engine.handle_event(&event).unwrap();
        assert_eq!(engine.store().attribute_count(), 0);
    }

    #[test]
    fn test_store_error_does_not_stop_the_engine() {
        let mut engine = FusedEngine::new(ExperimentConfig::single("h", LayoutKind::Lttng)).unwrap();
        engine.handle_event(&switch("h", 10, 0, 5)).unwrap();
        // Out of order: rejected by the store, logged, not returned
        engine.handle_event(&switch("h", 5, 0, 6)).unwrap();
        engine.handle_event(&switch("h", 20, 0, 7)).unwrap();
        assert_eq!(
            engine.store().ongoing_at_path(&["CPUs", "0", "Current_thread"]),
            StateValue::Int(7)
        );
    }

    #[test]
    fn test_events_wait_for_roles_in_multi_trace_experiments() {
        let config = ExperimentConfig::new(vec![
            TraceConfig::new("host", LayoutKind::Lttng),
            TraceConfig::new("vm", LayoutKind::Lttng),
        ]);
        let mut engine = FusedEngine::new(config).unwrap();
        engine.handle_event(&switch("host", 1, 0, 5)).unwrap();
        assert!(!engine.roles_found());
        assert!(engine.store().quark_of(&["CPUs", "0", "Current_thread"]).is_none());
    }

    #[test]
    fn test_new_instance_starts_empty() {
        let mut engine = FusedEngine::new(ExperimentConfig::single("h", LayoutKind::Lttng)).unwrap();
        engine.handle_event(&switch("h", 1, 0, 5)).unwrap();
        let fresh = engine.new_instance().unwrap();
        assert_eq!(fresh.store().attribute_count(), 0);
        assert!(!fresh.roles_found());
        assert_eq!(fresh.config(), engine.config());
        assert_eq!(FusedEngine::<MemoryHistory>::VERSION, 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = FusedEngine::new(ExperimentConfig::new(vec![])).unwrap_err();
        assert!(matches!(err, FusedError::Config(_)));
    }
}
