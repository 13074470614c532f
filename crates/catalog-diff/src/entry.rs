//! Difference entries produced by the differ

use crate::key::Key;
use crate::model::Location;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What happened to a resource or attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Resource exists only in the new catalog
    Added,
    /// Resource exists only in the old catalog
    Removed,
    /// A scalar value changed
    Changed,
    /// A collection-valued attribute changed inside a resource present on both sides
    NestedChanged,
}

impl ChangeKind {
    /// Single-character op code used by ignore rules and renderers
    pub fn symbol(&self) -> char {
        match self {
            Self::Added => '+',
            Self::Removed => '-',
            Self::Changed => '~',
            Self::NestedChanged => '!',
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            '+' => Some(Self::Added),
            '-' => Some(Self::Removed),
            '~' => Some(Self::Changed),
            '!' => Some(Self::NestedChanged),
            _ => None,
        }
    }

    /// Ordering rank in the final output
    pub(crate) fn rank(&self) -> u8 {
        match self {
            Self::Added | Self::Removed => 0,
            Self::Changed => 1,
            Self::NestedChanged => 2,
        }
    }
}

/// One reported difference. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffEntry {
    kind: ChangeKind,
    key: Key,
    old_value: Value,
    new_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    old_location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    new_location: Option<Location>,
}

impl DiffEntry {
    /// A resource present only in the new catalog
    pub fn added(key: Key, value: Value, location: Option<Location>) -> Self {
        Self {
            kind: ChangeKind::Added,
            key,
            old_value: Value::Null,
            new_value: value,
            old_location: None,
            new_location: location,
        }
    }

    /// A resource present only in the old catalog
    pub fn removed(key: Key, value: Value, location: Option<Location>) -> Self {
        Self {
            kind: ChangeKind::Removed,
            key,
            old_value: value,
            new_value: Value::Null,
            old_location: location,
            new_location: None,
        }
    }

    /// A scalar change at `key`
    pub fn changed(
        key: Key,
        old_value: Value,
        new_value: Value,
        old_location: Option<Location>,
        new_location: Option<Location>,
    ) -> Self {
        Self {
            kind: ChangeKind::Changed,
            key,
            old_value,
            new_value,
            old_location,
            new_location,
        }
    }

    /// A change inside the collection at `key`; values are the whole collections
    pub fn nested_changed(
        key: Key,
        old_value: Value,
        new_value: Value,
        old_location: Option<Location>,
        new_location: Option<Location>,
    ) -> Self {
        Self {
            kind: ChangeKind::NestedChanged,
            ..Self::changed(key, old_value, new_value, old_location, new_location)
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn old_value(&self) -> &Value {
        &self.old_value
    }

    pub fn new_value(&self) -> &Value {
        &self.new_value
    }

    pub fn old_location(&self) -> Option<&Location> {
        self.old_location.as_ref()
    }

    pub fn new_location(&self) -> Option<&Location> {
        self.new_location.as_ref()
    }

    pub fn resource_type(&self) -> &str {
        self.key.resource_type()
    }

    pub fn title(&self) -> &str {
        self.key.title()
    }

    /// Same entry seen from the other direction (old and new swapped)
    pub fn reversed(&self) -> Self {
        let kind = match self.kind {
            ChangeKind::Added => ChangeKind::Removed,
            ChangeKind::Removed => ChangeKind::Added,
            other => other,
        };
        Self {
            kind,
            key: self.key.clone(),
            old_value: self.new_value.clone(),
            new_value: self.old_value.clone(),
            old_location: self.new_location.clone(),
            new_location: self.old_location.clone(),
        }
    }
}
