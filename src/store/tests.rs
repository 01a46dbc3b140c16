use super::*;
use crate::error::StoreError;

#[test]
fn test_quark_paths_are_shared() {
    let mut ss = MemoryHistory::new(0);
    let a = ss.quark_absolute_and_add(&["Threads", "host", "42"]);
    let threads = ss.opt_quark_absolute(&["Threads"]).unwrap();
    let b = ss.quark_relative_and_add(threads, &["host", "42"]);
    assert_eq!(a, b);
    assert_eq!(ss.full_path(a), vec!["Threads", "host", "42"]);
    assert_eq!(ss.attribute_name(a), "42");
    assert_eq!(ss.attribute_count(), 3);
}

#[test]
fn test_opt_quark_does_not_create() {
    let mut ss = MemoryHistory::new(0);
    assert!(ss.opt_quark_absolute(&["CPUs", "0"]).is_none());
    let cpus = ss.quark_absolute_and_add(&["CPUs"]);
    assert!(ss.opt_quark_relative(cpus, &["0"]).is_none());
    assert_eq!(ss.attribute_count(), 1);
}

#[test]
fn test_sub_attributes_in_creation_order() {
    let mut ss = MemoryHistory::new(0);
    let cpus = ss.quark_absolute_and_add(&["CPUs"]);
    let c1 = ss.quark_relative_and_add(cpus, &["1"]);
    let c0 = ss.quark_relative_and_add(cpus, &["0"]);
    assert_eq!(ss.sub_attributes(cpus), vec![c1, c0]);
    assert_eq!(ss.parent_attribute(c0), Some(cpus));
    assert_eq!(ss.parent_attribute(cpus), Some(Quark::ROOT));
}

#[test]
fn test_history_intervals() {
    let mut ss = MemoryHistory::new(5);
    let q = ss.quark_absolute_and_add(&["CPUs", "0", "Status"]);
    ss.modify_attribute(10, StateValue::Int(1), q).unwrap();
    ss.modify_attribute(30, StateValue::Int(2), q).unwrap();

    let intervals = ss.intervals(q);
    assert_eq!(intervals.len(), 3);
    assert_eq!(intervals[0].value, StateValue::Null);
    assert_eq!(intervals[1].start, 10);
    assert_eq!(intervals[1].end, Some(30));
    assert_eq!(intervals[2].end, None);

    assert_eq!(ss.query_at(q, 7), StateValue::Null);
    assert_eq!(ss.query_at(q, 29), StateValue::Int(1));
    assert_eq!(ss.query_at(q, 30), StateValue::Int(2));
}

#[test]
fn test_same_timestamp_overwrites() {
    let mut ss = MemoryHistory::new(0);
    let q = ss.quark_absolute_and_add(&["x"]);
    ss.modify_attribute(10, StateValue::Int(1), q).unwrap();
    ss.modify_attribute(10, StateValue::Int(2), q).unwrap();
    assert_eq!(ss.intervals(q).len(), 2);
    assert_eq!(ss.query_ongoing(q), StateValue::Int(2));
}

#[test]
fn test_non_monotonic_write_rejected() {
    let mut ss = MemoryHistory::new(0);
    let q = ss.quark_absolute_and_add(&["CPUs", "0", "Status"]);
    ss.modify_attribute(100, StateValue::Int(1), q).unwrap();
    let err = ss.modify_attribute(50, StateValue::Int(2), q).unwrap_err();
    assert_eq!(
        err,
        StoreError::NonMonotonic {
            attribute: "CPUs/0/Status".to_string(),
            last: 100,
            requested: 50,
        }
    );
    assert_eq!(ss.query_ongoing(q), StateValue::Int(1));
}

#[test]
fn test_unknown_quark_rejected() {
    let mut ss = MemoryHistory::new(0);
    let err = ss
        .modify_attribute(1, StateValue::Int(1), Quark(99))
        .unwrap_err();
    assert_eq!(err, StoreError::UnknownAttribute(Quark(99)));
    assert!(ss.query_ongoing(Quark(99)).is_null());
}

#[test]
fn test_set_if_absent_is_write_once() {
    let mut ss = MemoryHistory::new(0);
    let q = ss.quark_absolute_and_add(&["Machines", "host", "Containers", "200", "Parent"]);
    assert!(ss.set_if_absent(0, StateValue::str("100"), q).unwrap());
    assert!(!ss.set_if_absent(5, StateValue::str("300"), q).unwrap());
    assert_eq!(ss.query_ongoing(q), StateValue::str("100"));
    assert_eq!(ss.intervals(q).len(), 1);
}

#[test]
fn test_ongoing_at_path() {
    let mut ss = MemoryHistory::new(0);
    let q = ss.quark_absolute_and_add(&["CPUs", "2", "Condition"]);
    ss.modify_attribute(3, StateValue::Int(0), q).unwrap();
    assert_eq!(ss.ongoing_at_path(&["CPUs", "2", "Condition"]), StateValue::Int(0));
    assert!(ss.ongoing_at_path(&["CPUs", "9", "Condition"]).is_null());
}

#[test]
fn test_close_bounds_ongoing_intervals() {
    let mut ss = MemoryHistory::new(0);
    let q = ss.quark_absolute_and_add(&["CPUs", "0", "Current_thread"]);
    ss.modify_attribute(10, StateValue::Int(2), q).unwrap();
    ss.close(50);
    let last = ss.intervals(q).pop().unwrap();
    assert_eq!(last.start, 10);
    assert_eq!(last.end, Some(50));
    assert_eq!(ss.end_time(), Some(50));
}
