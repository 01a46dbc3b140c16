//! Trace events as delivered by the driver
//!
//! Events come already merged into timestamp order across every trace of the
//! experiment. A [`TraceEvent`] carries the host id of the trace it was read
//! from, the CPU it was recorded on (machine-local: a guest event carries the
//! guest's vCPU number) and a flat payload of named fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One payload field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Int(i64),
    Str(String),
    IntArray(Vec<i64>),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<Vec<i64>> for FieldValue {
    fn from(v: Vec<i64>) -> Self {
        FieldValue::IntArray(v)
    }
}

/// A kernel trace event attributed to one traced machine
///
/// # Example
/// ```
/// use fusedvm::event::TraceEvent;
///
/// let event = TraceEvent::new("host", "sched_switch", 1_000)
///     .cpu(0)
///     .field("prev_tid", 1)
///     .field("next_comm", "bash");
///
/// assert_eq!(event.int_field("prev_tid"), Some(1));
/// assert_eq!(event.str_field("next_comm"), Some("bash"));
/// assert_eq!(event.int_field("next_tid"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub host: String,
    pub name: String,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl TraceEvent {
    pub fn new(host: impl Into<String>, name: impl Into<String>, timestamp: u64) -> Self {
        TraceEvent {
            host: host.into(),
            name: name.into(),
            timestamp,
            cpu: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn cpu(mut self, cpu: u32) -> Self {
        self.cpu = Some(cpu);
        self
    }

    pub fn field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    pub fn int_field(&self, name: &str) -> Option<i64> {
        match self.fields.get(name)? {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        match self.fields.get(name)? {
            FieldValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn int_array_field(&self, name: &str) -> Option<&[i64]> {
        match self.fields.get(name)? {
            FieldValue::IntArray(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}
