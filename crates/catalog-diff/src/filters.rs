//! Pluggable post-filters
//!
//! Filters run after ignore rules and may drop any entry. They are looked
//! up by name when the differ is configured, so a typo fails at setup rather
//! than silently letting everything through at diff time.

use crate::entry::{ChangeKind, DiffEntry};
use crate::error::{Error, Result};
use crate::key::SEPARATOR;
use crate::rules::stringify;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Names accepted by [`by_name`]
pub const AVAILABLE: [&str; 4] = ["AbsentFile", "CompilationDir", "JSON", "SingleItemArray"];

const COMPILATION_DIR_PLACEHOLDER: &str = "<compilation-dir>";

/// Everything a filter may consult besides the entry itself
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// Entries still present when this filter runs
    pub entries: &'a [DiffEntry],
    pub from_compilation_dir: &'a str,
    pub to_compilation_dir: &'a str,
}

/// A post-filter over difference entries
pub trait Filter: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Return true to drop `entry`
    fn filtered(&self, entry: &DiffEntry, ctx: &FilterContext<'_>) -> bool;
}

/// Look up a built-in filter
pub fn by_name(name: &str) -> Result<Box<dyn Filter>> {
    match name {
        "AbsentFile" => Ok(Box::new(AbsentFile)),
        "CompilationDir" => Ok(Box::new(CompilationDir)),
        "JSON" => Ok(Box::new(JsonContent)),
        "SingleItemArray" => Ok(Box::new(SingleItemArray)),
        other => Err(Error::UnknownFilter(other.to_string())),
    }
}

/// Resolve several names, failing on the first unknown one
pub fn resolve<S: AsRef<str>>(names: &[S]) -> Result<Vec<Box<dyn Filter>>> {
    names.iter().map(|n| by_name(n.as_ref())).collect()
}

/// Run filters in order; each sees only what earlier filters kept.
pub(crate) fn apply(
    filters: &[Box<dyn Filter>],
    mut entries: Vec<DiffEntry>,
    from_compilation_dir: &str,
    to_compilation_dir: &str,
) -> Vec<DiffEntry> {
    for filter in filters {
        let snapshot = entries.clone();
        let ctx = FilterContext {
            entries: &snapshot,
            from_compilation_dir,
            to_compilation_dir,
        };
        let before = entries.len();
        entries.retain(|entry| !filter.filtered(entry, &ctx));
        log::debug!(
            "Filter {} removed {} entries",
            filter.name(),
            before - entries.len()
        );
    }
    entries
}

fn is_value_change(entry: &DiffEntry) -> bool {
    matches!(
        entry.kind(),
        ChangeKind::Changed | ChangeKind::NestedChanged
    )
}

fn ensure_path() -> String {
    format!("parameters{SEPARATOR}ensure")
}

/// Once a file becomes `ensure => absent`, its other attributes are noise.
#[derive(Debug)]
pub struct AbsentFile;

impl Filter for AbsentFile {
    fn name(&self) -> &'static str {
        "AbsentFile"
    }

    fn filtered(&self, entry: &DiffEntry, ctx: &FilterContext<'_>) -> bool {
        if entry.resource_type() != "File" || !is_value_change(entry) {
            return false;
        }
        let ensure = ensure_path();
        if entry.key().attribute_path() == ensure {
            return false;
        }

        let absent: HashSet<&str> = ctx
            .entries
            .iter()
            .filter(|e| {
                e.resource_type() == "File"
                    && is_value_change(e)
                    && e.key().attribute_path() == ensure
                    && e.new_value().as_str() == Some("absent")
            })
            .map(DiffEntry::title)
            .collect();
        absent.contains(entry.title())
    }
}

/// Drops changes caused only by the differing compilation directories.
#[derive(Debug)]
pub struct CompilationDir;

impl Filter for CompilationDir {
    fn name(&self) -> &'static str {
        "CompilationDir"
    }

    fn filtered(&self, entry: &DiffEntry, ctx: &FilterContext<'_>) -> bool {
        if !is_value_change(entry)
            || ctx.from_compilation_dir.is_empty()
            || ctx.to_compilation_dir.is_empty()
        {
            return false;
        }
        let old = stringify(entry.old_value())
            .replace(ctx.from_compilation_dir, COMPILATION_DIR_PLACEHOLDER);
        let new = stringify(entry.new_value())
            .replace(ctx.to_compilation_dir, COMPILATION_DIR_PLACEHOLDER);
        old == new
    }
}

/// `x` and `[x]` are treated as the same value.
#[derive(Debug)]
pub struct SingleItemArray;

impl Filter for SingleItemArray {
    fn name(&self) -> &'static str {
        "SingleItemArray"
    }

    fn filtered(&self, entry: &DiffEntry, _ctx: &FilterContext<'_>) -> bool {
        if !is_value_change(entry) {
            return false;
        }
        let wraps = |array: &Value, scalar: &Value| match array {
            Value::Array(items) => items.len() == 1 && items[0] == *scalar,
            _ => false,
        };
        let (old, new) = (entry.old_value(), entry.new_value());
        wraps(old, new) || wraps(new, old)
    }
}

/// JSON file content that differs only in formatting.
#[derive(Debug)]
pub struct JsonContent;

impl Filter for JsonContent {
    fn name(&self) -> &'static str {
        "JSON"
    }

    fn filtered(&self, entry: &DiffEntry, _ctx: &FilterContext<'_>) -> bool {
        if entry.kind() != ChangeKind::Changed
            || entry.resource_type() != "File"
            || !entry.title().ends_with(".json")
            || entry.key().attribute_path() != format!("parameters{SEPARATOR}content")
        {
            return false;
        }
        let parse = |v: &Value| {
            v.as_str()
                .and_then(|s| serde_json::from_str::<Value>(s).ok())
        };
        match (parse(entry.old_value()), parse(entry.new_value())) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use serde_json::json;

    fn param_change(title: &str, param: &str, old: Value, new: Value) -> DiffEntry {
        DiffEntry::changed(
            Key::from_segments(["File", title, "parameters", param]),
            old,
            new,
            None,
            None,
        )
    }

    fn run(name: &str, entries: Vec<DiffEntry>, from_dir: &str, to_dir: &str) -> Vec<DiffEntry> {
        let filters = vec![by_name(name).unwrap()];
        apply(&filters, entries, from_dir, to_dir)
    }

    #[test]
    fn test_unknown_filter_is_configuration_error() {
        let err = resolve(&["AbsentFile", "Bogus"]).unwrap_err();
        assert!(matches!(err, Error::UnknownFilter(ref n) if n == "Bogus"));
        assert_eq!(resolve(&AVAILABLE).unwrap().len(), AVAILABLE.len());
    }

    #[test]
    fn test_absent_file_keeps_only_ensure() {
        let entries = vec![
            param_change("/etc/a", "ensure", json!("file"), json!("absent")),
            param_change("/etc/a", "content", json!("x"), json!("y")),
            param_change("/etc/b", "content", json!("x"), json!("y")),
        ];
        let kept = run("AbsentFile", entries, "", "");
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|e| e.title() != "/etc/a"
            || e.key().attribute_path().ends_with("ensure")));
    }

    #[test]
    fn test_compilation_dir_only_change_dropped() {
        let entries = vec![
            param_change("/x", "content", json!("/tmp/one/modules/x"), json!("/tmp/two/modules/x")),
            param_change("/x", "mode", json!("/tmp/one/a"), json!("/tmp/two/b")),
        ];
        let kept = run("CompilationDir", entries, "/tmp/one", "/tmp/two");
        assert_eq!(kept.len(), 1);
        assert!(kept[0].key().attribute_path().ends_with("mode"));
    }

    #[test]
    fn test_single_item_array() {
        let entries = vec![
            param_change("/x", "owner", json!("root"), json!(["root"])),
            param_change("/x", "group", json!(["a"]), json!(["a", "b"])),
        ];
        let kept = run("SingleItemArray", entries, "", "");
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn test_json_content_equivalence() {
        let entries = vec![
            param_change("/etc/app.json", "content", json!("{\"a\": 1}"), json!("{\n  \"a\":1\n}")),
            param_change("/etc/app.json", "content", json!("{\"a\": 1}"), json!("{\"a\": 2}")),
            param_change("/etc/app.txt", "content", json!("{\"a\": 1}"), json!("{\"a\":1}")),
        ];
        let kept = run("JSON", entries, "", "");
        assert_eq!(kept.len(), 2);
    }
}
