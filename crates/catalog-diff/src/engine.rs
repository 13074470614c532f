//! Diff engine
//!
//! Pipeline: normalize both catalogs → split off whole-resource additions
//! and removals → structural diff of the shared resources → reclassify
//! deferred fragments as nested changes → drop null/null artifacts →
//! ignore rules → post-filters.

use crate::entry::{ChangeKind, DiffEntry};
use crate::error::{Error, Result};
use crate::filters::{self, Filter};
use crate::key::Key;
use crate::model::{Catalog, Location};
use crate::normalize::{NormalizedCatalog, PARAMETERS, normalize};
use crate::rules::{IgnoreRule, is_ignored};
use crate::structural::{Fragment, Op, diff_keyed};
use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

/// Configured catalog differ.
///
/// Rules and filters are compiled when the differ is built, so every
/// configuration error surfaces before any catalog is compared.
#[derive(Debug, Default)]
pub struct Differ {
    ignore: Vec<IgnoreRule>,
    ignore_tags: Vec<String>,
    filters: Vec<Box<dyn Filter>>,
}

impl Differ {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ignore(mut self, rules: impl IntoIterator<Item = IgnoreRule>) -> Self {
        self.ignore.extend(rules);
        self
    }

    /// Resources carrying any of these tags are ignored entirely
    pub fn with_ignore_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Resolve post-filters by name
    pub fn with_filters<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        self.filters.extend(filters::resolve(names)?);
        Ok(self)
    }

    pub fn with_filter(mut self, filter: Box<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Compare two catalogs
    pub fn diff(&self, from: &Catalog, to: &Catalog) -> Result<Vec<DiffEntry>> {
        // A failed build outranks anything wrong with the other side's content
        from.resources()?;
        to.resources()?;

        let old = normalize(from)?;
        let new = normalize(to)?;

        let mut rules = self.ignore.clone();
        if !self.ignore_tags.is_empty() {
            rules.extend(rules_from_ignore_tags(&old, &new, &self.ignore_tags));
        }

        let entries = compare(&old, &new, from.compilation_dir(), to.compilation_dir())?;
        let before = entries.len();
        let entries: Vec<DiffEntry> = entries
            .into_iter()
            .filter(|e| !is_ignored(&rules, e))
            .collect();
        log::debug!(
            "Ignore rules removed {} of {} entries",
            before - entries.len(),
            before
        );

        let mut entries = filters::apply(
            &self.filters,
            entries,
            from.compilation_dir(),
            to.compilation_dir(),
        );
        entries.sort_by_key(|e| e.kind().rank());
        Ok(entries)
    }
}

/// Compare two catalogs with explicit rules and already-resolved filters.
pub fn diff(
    from: &Catalog,
    to: &Catalog,
    ignore_rules: &[IgnoreRule],
    filters: Vec<Box<dyn Filter>>,
) -> Result<Vec<DiffEntry>> {
    Differ {
        ignore: ignore_rules.to_vec(),
        ignore_tags: Vec::new(),
        filters,
    }
    .diff(from, to)
}

/// Unfiltered comparison of two normalized catalogs.
fn compare(
    old: &NormalizedCatalog,
    new: &NormalizedCatalog,
    old_dir: &str,
    new_dir: &str,
) -> Result<Vec<DiffEntry>> {
    let mut entries = Vec::new();

    for (key, body) in &new.resources {
        if !old.resources.contains_key(key) {
            entries.push(DiffEntry::added(
                key.clone(),
                body.clone(),
                location(new, key, new_dir),
            ));
        }
    }
    for (key, body) in &old.resources {
        if !new.resources.contains_key(key) {
            entries.push(DiffEntry::removed(
                key.clone(),
                body.clone(),
                location(old, key, old_dir),
            ));
        }
    }

    let shared_old = shared(&old.resources, &new.resources);
    let shared_new = shared(&new.resources, &old.resources);

    let mut changed = Vec::new();
    let mut deferred: IndexSet<Key> = IndexSet::new();
    for fragment in diff_keyed(&shared_old, &shared_new) {
        if is_scalar_change(&fragment) {
            let key = fragment.key();
            let resource = key.resource_key();
            changed.push(DiffEntry::changed(
                key,
                fragment.old,
                fragment.new,
                location(old, &resource, old_dir),
                location(new, &resource, new_dir),
            ));
        } else {
            deferred.insert(attribute_key(&fragment.key()));
        }
    }

    // The nested entry carries these values in full
    changed.retain(|e: &DiffEntry| !deferred.contains(&attribute_key(e.key())));

    let mut nested = Vec::with_capacity(deferred.len());
    for key in deferred {
        let resource = key.resource_key();
        let (Some(old_body), Some(new_body)) = (
            shared_old.get(&resource),
            shared_new.get(&resource),
        ) else {
            return Err(Error::Internal(format!(
                "deferred change {key} refers to a resource missing from one catalog"
            )));
        };

        let path = key.attribute_segments();
        let old_value = value_at(old_body, &path).cloned().unwrap_or(Value::Null);
        let new_value = value_at(new_body, &path).cloned().unwrap_or(Value::Null);
        if old_value == new_value {
            continue;
        }
        nested.push(DiffEntry::nested_changed(
            key,
            old_value,
            new_value,
            location(old, &resource, old_dir),
            location(new, &resource, new_dir),
        ));
    }

    entries.extend(changed);
    entries.extend(nested);
    entries.retain(|e| {
        !(matches!(e.kind(), ChangeKind::Changed | ChangeKind::NestedChanged)
            && e.old_value().is_null()
            && e.new_value().is_null())
    });

    log::debug!(
        "Compared {} → {} resources: {} raw differences",
        old.len(),
        new.len(),
        entries.len()
    );
    Ok(entries)
}

/// Entries of `map` whose keys also exist in `other`, in `map` order
fn shared(map: &IndexMap<Key, Value>, other: &IndexMap<Key, Value>) -> IndexMap<Key, Value> {
    map.iter()
        .filter(|(k, _)| other.contains_key(*k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// A leaf change reportable as-is: both sides present, no array index on
/// the path, and neither side a collection.
fn is_scalar_change(fragment: &Fragment) -> bool {
    fragment.op == Op::Change && !fragment.crosses_array() && !fragment.touches_collection()
}

/// Truncate a fragment key to the attribute it belongs to:
/// `parameters\f<name>` for parameters, the field itself otherwise.
fn attribute_key(key: &Key) -> Key {
    let segments: Vec<&str> = key.segments().collect();
    let depth = match segments.get(2) {
        Some(&PARAMETERS) if segments.len() > 3 => 4,
        _ => 3,
    };
    Key::from_segments(segments.into_iter().take(depth))
}

fn value_at<'a>(mut value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    for segment in path {
        value = match value {
            Value::Object(map) => map.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

fn location(catalog: &NormalizedCatalog, key: &Key, compilation_dir: &str) -> Option<Location> {
    catalog
        .locations
        .get(key)
        .filter(|l| !l.is_empty())
        .map(|l| l.relative_to(compilation_dir))
}

/// Synthesize ignore rules from opt-in resource tags.
///
/// The new catalog is authoritative: every tagged resource in it is
/// ignored. The old catalog is consulted only for resources that no
/// longer exist, so deleting a previously-ignored resource stays ignored.
pub fn rules_from_ignore_tags<S: AsRef<str>>(
    from: &NormalizedCatalog,
    to: &NormalizedCatalog,
    ignore_tags: &[S],
) -> Vec<IgnoreRule> {
    let tagged = |catalog: &NormalizedCatalog, key: &Key| {
        let tags = catalog.tags(key);
        ignore_tags.iter().any(|t| tags.contains(&t.as_ref()))
    };

    let mut rules: Vec<IgnoreRule> = to
        .resources
        .keys()
        .filter(|key| tagged(to, key))
        .map(|key| IgnoreRule::for_resource(key.resource_type(), key.title()))
        .collect();

    rules.extend(
        from.resources
            .keys()
            .filter(|key| !to.resources.contains_key(*key) && tagged(from, key))
            .map(|key| IgnoreRule::for_resource(key.resource_type(), key.title())),
    );

    log::debug!("Derived {} ignore rules from tags", rules.len());
    rules
}

/// Counts of each kind of difference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub changed: usize,
    pub nested_changed: usize,
}

impl DiffSummary {
    pub fn from_entries(entries: &[DiffEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            match entry.kind() {
                ChangeKind::Added => summary.added += 1,
                ChangeKind::Removed => summary.removed += 1,
                ChangeKind::Changed => summary.changed += 1,
                ChangeKind::NestedChanged => summary.nested_changed += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.added + self.removed + self.changed + self.nested_changed
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
