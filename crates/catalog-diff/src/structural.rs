//! Generic structural differ
//!
//! Walks two JSON values in lockstep and reports every leaf-level
//! difference as a [`Fragment`]. Knows nothing about resources: callers
//! decide what a fragment means.

use crate::key::Key;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::BTreeSet;

/// Kind of a raw difference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Present only on the new side
    Add,
    /// Present only on the old side
    Remove,
    /// Present on both sides with different values
    Change,
}

/// One step in a path through nested values
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

impl Segment {
    fn as_string(&self) -> String {
        match self {
            Self::Field(name) => name.clone(),
            Self::Index(i) => i.to_string(),
        }
    }
}

/// A single leaf-level difference
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub op: Op,
    pub path: Vec<Segment>,
    /// `Null` for [`Op::Add`]
    pub old: Value,
    /// `Null` for [`Op::Remove`]
    pub new: Value,
}

impl Fragment {
    pub fn key(&self) -> Key {
        Key::from_segments(self.path.iter().map(Segment::as_string))
    }

    /// Whether any path step indexes into an array
    pub fn crosses_array(&self) -> bool {
        self.path.iter().any(|s| matches!(s, Segment::Index(_)))
    }

    /// Whether either side of the difference is itself a collection
    pub fn touches_collection(&self) -> bool {
        is_collection(&self.old) || is_collection(&self.new)
    }
}

fn is_collection(value: &Value) -> bool {
    matches!(value, Value::Array(_) | Value::Object(_))
}

/// Diff two keyed maps. Keys present on one side only are reported as
/// whole-entry additions/removals; shared keys are walked recursively.
pub fn diff_keyed(old: &IndexMap<Key, Value>, new: &IndexMap<Key, Value>) -> Vec<Fragment> {
    let mut out = Vec::new();
    let mut path = Vec::new();

    for (key, old_value) in old {
        path.clear();
        path.extend(key.segments().map(|s| Segment::Field(s.to_string())));
        match new.get(key) {
            Some(new_value) => diff_values(&mut path, old_value, new_value, &mut out),
            None => out.push(removed(&path, old_value)),
        }
    }

    for (key, new_value) in new {
        if !old.contains_key(key) {
            path.clear();
            path.extend(key.segments().map(|s| Segment::Field(s.to_string())));
            out.push(added(&path, new_value));
        }
    }

    out
}

/// Diff two values below `path`, appending fragments to `out`.
pub fn diff_values(path: &mut Vec<Segment>, old: &Value, new: &Value, out: &mut Vec<Fragment>) {
    if old == new {
        return;
    }

    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let names: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for name in names {
                path.push(Segment::Field(name.clone()));
                match (a.get(name), b.get(name)) {
                    (Some(x), Some(y)) => diff_values(path, x, y, out),
                    (Some(x), None) => out.push(removed(path, x)),
                    (None, Some(y)) => out.push(added(path, y)),
                    (None, None) => {}
                }
                path.pop();
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for i in 0..a.len().max(b.len()) {
                path.push(Segment::Index(i));
                match (a.get(i), b.get(i)) {
                    (Some(x), Some(y)) => diff_values(path, x, y, out),
                    (Some(x), None) => out.push(removed(path, x)),
                    (None, Some(y)) => out.push(added(path, y)),
                    (None, None) => {}
                }
                path.pop();
            }
        }
        _ => out.push(Fragment {
            op: Op::Change,
            path: path.clone(),
            old: old.clone(),
            new: new.clone(),
        }),
    }
}

fn added(path: &[Segment], value: &Value) -> Fragment {
    Fragment {
        op: Op::Add,
        path: path.to_vec(),
        old: Value::Null,
        new: value.clone(),
    }
}

fn removed(path: &[Segment], value: &Value) -> Fragment {
    Fragment {
        op: Op::Remove,
        path: path.to_vec(),
        old: value.clone(),
        new: Value::Null,
    }
}
