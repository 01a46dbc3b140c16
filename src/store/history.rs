use std::collections::HashMap;

use serde::Serialize;

use super::{Quark, StateStore, StateValue};
use crate::error::StoreError;

/// One closed or ongoing interval of an attribute's history
///
/// `end` is exclusive; `None` marks the ongoing interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub start: u64,
    pub end: Option<u64>,
    pub value: StateValue,
}

#[derive(Debug)]
struct Node {
    name: String,
    parent: Option<Quark>,
    children: Vec<Quark>,
    child_index: HashMap<String, Quark>,
    closed: Vec<Interval>,
    ongoing_start: u64,
    ongoing: StateValue,
}

impl Node {
    fn new(name: String, parent: Option<Quark>, start: u64) -> Self {
        Node {
            name,
            parent,
            children: Vec::new(),
            child_index: HashMap::new(),
            closed: Vec::new(),
            ongoing_start: start,
            ongoing: StateValue::Null,
        }
    }
}

/// In-memory attribute tree with full interval history
///
/// # Example
/// ```
/// use fusedvm::store::{MemoryHistory, StateStore, StateValue};
///
/// let mut ss = MemoryHistory::new(0);
/// let quark = ss.quark_absolute_and_add(&["CPUs", "0", "Status"]);
/// ss.modify_attribute(10, StateValue::Int(1), quark)?;
/// ss.modify_attribute(20, StateValue::Int(2), quark)?;
///
/// assert_eq!(ss.query_at(quark, 15), StateValue::Int(1));
/// assert_eq!(ss.query_ongoing(quark), StateValue::Int(2));
/// # Ok::<(), fusedvm::error::StoreError>(())
/// ```
#[derive(Debug)]
pub struct MemoryHistory {
    nodes: Vec<Node>,
    start_time: u64,
    end_time: Option<u64>,
}

impl MemoryHistory {
    pub fn new(start_time: u64) -> Self {
        MemoryHistory {
            nodes: vec![Node::new(String::new(), None, start_time)],
            start_time,
            end_time: None,
        }
    }

    fn node(&self, quark: Quark) -> Option<&Node> {
        self.nodes.get(quark.0 as usize)
    }

    /// Value in effect at `ts`
    pub fn query_at(&self, quark: Quark, ts: u64) -> StateValue {
        let Some(node) = self.node(quark) else {
            return StateValue::Null;
        };
        if ts >= node.ongoing_start {
            return node.ongoing.clone();
        }
        node.closed
            .iter()
            .find(|i| i.start <= ts && i.end.is_some_and(|end| ts < end))
            .map(|i| i.value.clone())
            .unwrap_or_default()
    }

    /// Full history of an attribute, ongoing interval last
    pub fn intervals(&self, quark: Quark) -> Vec<Interval> {
        let Some(node) = self.node(quark) else {
            return Vec::new();
        };
        let mut all = node.closed.clone();
        all.push(Interval {
            start: node.ongoing_start,
            end: self.end_time.filter(|end| *end > node.ongoing_start),
            value: node.ongoing.clone(),
        });
        all
    }

    /// Mark the end of the analysed range
    ///
    /// Ongoing intervals are reported as ending at `end_ts` afterwards; they
    /// stay open for writes.
    pub fn close(&mut self, end_ts: u64) {
        self.end_time = Some(end_ts);
    }

    pub fn end_time(&self) -> Option<u64> {
        self.end_time
    }

    /// Look up an absolute path without creating it
    pub fn quark_of(&self, path: &[&str]) -> Option<Quark> {
        self.opt_quark_absolute(path)
    }

    /// Ongoing value at an absolute path, `Null` if the path does not exist
    pub fn ongoing_at_path(&self, path: &[&str]) -> StateValue {
        self.quark_of(path)
            .map(|q| self.query_ongoing(q))
            .unwrap_or_default()
    }

    /// Path segments from the root down to `quark`
    pub fn full_path(&self, quark: Quark) -> Vec<String> {
        let mut segments = Vec::new();
        let mut current = Some(quark);
        while let Some(q) = current {
            if q == Quark::ROOT {
                break;
            }
            let Some(node) = self.node(q) else { break };
            segments.push(node.name.clone());
            current = node.parent;
        }
        segments.reverse();
        segments
    }

    /// Every attribute except the root, in creation order
    pub fn attributes(&self) -> impl Iterator<Item = Quark> + '_ {
        (1..self.nodes.len()).map(|i| Quark(i as u32))
    }

    pub fn attribute_count(&self) -> usize {
        self.nodes.len() - 1
    }
}

impl Default for MemoryHistory {
    fn default() -> Self {
        Self::new(0)
    }
}

impl StateStore for MemoryHistory {
    fn quark_relative_and_add(&mut self, parent: Quark, path: &[&str]) -> Quark {
        let mut current = parent;
        for segment in path {
            let existing = self
                .node(current)
                .and_then(|n| n.child_index.get(*segment).copied());
            current = match existing {
                Some(q) => q,
                None => {
                    let quark = Quark(self.nodes.len() as u32);
                    self.nodes
                        .push(Node::new(segment.to_string(), Some(current), self.start_time));
                    if let Some(p) = self.nodes.get_mut(current.0 as usize) {
                        p.children.push(quark);
                        p.child_index.insert(segment.to_string(), quark);
                    }
                    quark
                }
            };
        }
        current
    }

    fn opt_quark_relative(&self, parent: Quark, path: &[&str]) -> Option<Quark> {
        let mut current = parent;
        for segment in path {
            current = *self.node(current)?.child_index.get(*segment)?;
        }
        Some(current)
    }

    fn modify_attribute(
        &mut self,
        ts: u64,
        value: StateValue,
        quark: Quark,
    ) -> Result<(), StoreError> {
        let node = self
            .nodes
            .get_mut(quark.0 as usize)
            .ok_or(StoreError::UnknownAttribute(quark))?;
        if ts < node.ongoing_start {
            let last = node.ongoing_start;
            return Err(StoreError::NonMonotonic {
                attribute: self.full_path(quark).join("/"),
                last,
                requested: ts,
            });
        }
        if ts > node.ongoing_start {
            let previous = std::mem::take(&mut node.ongoing);
            node.closed.push(Interval {
                start: node.ongoing_start,
                end: Some(ts),
                value: previous,
            });
            node.ongoing_start = ts;
        }
        node.ongoing = value;
        Ok(())
    }

    fn query_ongoing(&self, quark: Quark) -> StateValue {
        self.node(quark)
            .map(|n| n.ongoing.clone())
            .unwrap_or_default()
    }

    fn sub_attributes(&self, quark: Quark) -> Vec<Quark> {
        self.node(quark)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    fn parent_attribute(&self, quark: Quark) -> Option<Quark> {
        self.node(quark).and_then(|n| n.parent)
    }

    fn attribute_name(&self, quark: Quark) -> &str {
        self.node(quark).map(|n| n.name.as_str()).unwrap_or("")
    }

    fn start_time(&self) -> u64 {
        self.start_time
    }
}
