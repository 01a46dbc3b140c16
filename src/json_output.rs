//! JSON output format for the reconstructed state

use serde::Serialize;

use crate::store::{Interval, MemoryHistory, StateStore, StateValue};

/// One attribute of the state tree
#[derive(Debug, Clone, Serialize)]
pub struct JsonAttribute {
    /// Path from the root, joined with `/`
    pub path: String,
    /// Value in effect at the end of the analysis
    pub value: StateValue,
    /// Every interval, oldest first (only with `--history`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intervals: Option<Vec<Interval>>,
}

/// The whole state tree
#[derive(Debug, Clone, Serialize)]
pub struct JsonStateDump {
    /// Version of the state layout
    pub version: u32,
    pub start: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
    pub attributes: Vec<JsonAttribute>,
}

impl JsonStateDump {
    /// Collect every attribute of `ss`, in creation order
    pub fn from_history(ss: &MemoryHistory, version: u32, with_history: bool) -> Self {
        let attributes = ss
            .attributes()
            .map(|quark| JsonAttribute {
                path: ss.full_path(quark).join("/"),
                value: ss.query_ongoing(quark),
                intervals: with_history.then(|| ss.intervals(quark)),
            })
            .collect();
        JsonStateDump {
            version,
            start: ss.start_time(),
            end: ss.end_time(),
            attributes,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
