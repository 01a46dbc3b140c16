//! Hierarchical, time-indexed attribute store
//!
//! The analysis writes its reconstructed state into a tree of attributes
//! (`CPUs/0/Current_thread`, `Threads/host/42/Status`, ...). Each attribute has
//! an interval history: a write at time `t` closes the interval in effect and
//! opens a new one. Timestamps written to one attribute must not go backwards.
//!
//! [`StateStore`] is the contract the handlers rely on; [`MemoryHistory`] is the
//! in-memory implementation used by the binary and the tests.

mod history;
mod value;

pub use history::{Interval, MemoryHistory};
pub use value::StateValue;

use crate::error::StoreError;
use std::fmt;

/// Handle to one attribute path in the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quark(pub u32);

impl Quark {
    /// The unnamed root of the attribute tree
    pub const ROOT: Quark = Quark(0);
}

impl fmt::Display for Quark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Builder/query surface of the attribute store
pub trait StateStore {
    /// Resolve a path from the root, creating missing attributes
    fn quark_absolute_and_add(&mut self, path: &[&str]) -> Quark {
        self.quark_relative_and_add(Quark::ROOT, path)
    }

    /// Resolve a path below `parent`, creating missing attributes
    fn quark_relative_and_add(&mut self, parent: Quark, path: &[&str]) -> Quark;

    /// Resolve a path below `parent` without creating anything
    fn opt_quark_relative(&self, parent: Quark, path: &[&str]) -> Option<Quark>;

    fn opt_quark_absolute(&self, path: &[&str]) -> Option<Quark> {
        self.opt_quark_relative(Quark::ROOT, path)
    }

    /// Set `value` effective at `ts`, closing the interval currently in effect
    ///
    /// # Errors
    /// [`StoreError::NonMonotonic`] if `ts` precedes the start of the ongoing
    /// interval of this attribute.
    fn modify_attribute(&mut self, ts: u64, value: StateValue, quark: Quark)
        -> Result<(), StoreError>;

    /// Value currently in effect (the ongoing interval)
    fn query_ongoing(&self, quark: Quark) -> StateValue;

    /// Direct children of an attribute, in creation order
    fn sub_attributes(&self, quark: Quark) -> Vec<Quark>;

    fn parent_attribute(&self, quark: Quark) -> Option<Quark>;

    fn attribute_name(&self, quark: Quark) -> &str;

    /// Start of the analysed time range
    fn start_time(&self) -> u64;

    /// Write-once update: only sets `value` if the attribute is currently null
    ///
    /// Returns whether the write happened.
    fn set_if_absent(
        &mut self,
        ts: u64,
        value: StateValue,
        quark: Quark,
    ) -> Result<bool, StoreError> {
        if !self.query_ongoing(quark).is_null() {
            return Ok(false);
        }
        self.modify_attribute(ts, value, quark)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests;
