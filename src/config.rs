use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::FusedError;
use crate::layout::LayoutKind;

/// One trace of the experiment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Host id the events of this trace are tagged with
    pub host_id: String,

    /// Display name of the trace, defaults to the host id
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub layout: LayoutKind,
}

impl TraceConfig {
    pub fn new(host_id: &str, layout: LayoutKind) -> Self {
        TraceConfig {
            host_id: host_id.to_string(),
            name: None,
            layout,
        }
    }

    pub fn trace_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.host_id)
    }
}

/// Tunables of the state reconstruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Handle `syscall_entry_*` / `syscall_exit_*` events
    ///
    /// Default: true
    pub track_syscalls: bool,

    /// Let fork and state-dump events through while machine roles are still
    /// being discovered (container-only mode)
    ///
    /// Default: true
    pub container_events_before_roles: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            track_syscalls: true,
            container_events_before_roles: true,
        }
    }
}

/// Set of traces analysed together
///
/// # Example
/// ```
/// use fusedvm::config::ExperimentConfig;
///
/// let config = ExperimentConfig::from_toml_str(r#"
/// [[trace]]
/// host_id = "server"
///
/// [[trace]]
/// host_id = "vm1"
/// layout = "ftrace"
///
/// [analysis]
/// track_syscalls = false
/// "#)?;
///
/// assert_eq!(config.traces.len(), 2);
/// assert!(!config.analysis.track_syscalls);
/// assert!(config.analysis.container_events_before_roles);
/// # Ok::<(), anyhow::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(rename = "trace", default)]
    pub traces: Vec<TraceConfig>,

    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl ExperimentConfig {
    pub fn new(traces: Vec<TraceConfig>) -> Self {
        Self {
            traces,
            analysis: AnalysisConfig::default(),
        }
    }

    /// Experiment made of a single trace
    pub fn single(host_id: &str, layout: LayoutKind) -> Self {
        Self::new(vec![TraceConfig::new(host_id, layout)])
    }

    /// Load an experiment description from a TOML file
    ///
    /// # Errors
    /// Returns error if the file can't be read, isn't valid TOML, or describes
    /// an invalid trace set (see [`ExperimentConfig::validate`]).
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read experiment file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid experiment file: {}", path.as_ref().display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ExperimentConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML experiment")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject an empty trace set and host ids listed twice
    pub fn validate(&self) -> std::result::Result<(), FusedError> {
        if self.traces.is_empty() {
            return Err(FusedError::Config("experiment has no trace".to_string()));
        }
        let mut seen = HashSet::new();
        for trace in &self.traces {
            if !seen.insert(trace.host_id.as_str()) {
                return Err(FusedError::Config(format!(
                    "host id '{}' is listed twice",
                    trace.host_id
                )));
            }
        }
        Ok(())
    }

    pub fn trace(&self, host_id: &str) -> Option<&TraceConfig> {
        self.traces.iter().find(|t| t.host_id == host_id)
    }
}
