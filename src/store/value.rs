use serde::Serialize;
use std::fmt;

/// Value held by an attribute for the duration of an interval
///
/// `Null` is the "no state" value: a freshly created attribute holds `Null`
/// until something is written to it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(untagged)]
pub enum StateValue {
    #[default]
    Null,
    Int(i32),
    Long(i64),
    Str(String),
}

impl StateValue {
    pub fn str(value: impl Into<String>) -> Self {
        StateValue::Str(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }

    /// Integer view of the value; longs are accepted when they fit
    pub fn as_int(&self) -> Option<i32> {
        match self {
            StateValue::Int(v) => Some(*v),
            StateValue::Long(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            StateValue::Int(v) => Some(i64::from(*v)),
            StateValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Null => write!(f, "null"),
            StateValue::Int(v) => write!(f, "{}", v),
            StateValue::Long(v) => write!(f, "{}L", v),
            StateValue::Str(s) => write!(f, "\"{}\"", s),
        }
    }
}
