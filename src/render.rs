//! Diff output
//!
//! Rendering only reads entries; what the engine produced is never altered.
//! Text output groups entries by resource in the order they first appear.

use anyhow::Result;
use catalog_diff::{ChangeKind, DiffEntry, DiffSummary, Key, Location};
use colored::{ColoredString, Colorize};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

/// Display switches threaded through every render call
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Show changes that only alter a value's type (`"1"` vs `1`)
    pub display_datatype_changes: bool,
}

/// Whether a change is nothing but a type change of equal-looking values
pub fn is_datatype_change(entry: &DiffEntry) -> bool {
    matches!(
        entry.kind(),
        ChangeKind::Changed | ChangeKind::NestedChanged
    ) && !entry.old_value().is_null()
        && !entry.new_value().is_null()
        && entry.old_value() != entry.new_value()
        && loosen(entry.old_value()) == loosen(entry.new_value())
}

/// Scalars as strings, recursively
fn loosen(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::String(b.to_string()),
        Value::Number(n) => Value::String(n.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(loosen).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), loosen(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Entries to show under `opts`
pub fn visible<'a>(entries: &'a [DiffEntry], opts: RenderOptions) -> Vec<&'a DiffEntry> {
    entries
        .iter()
        .filter(|e| opts.display_datatype_changes || !is_datatype_change(e))
        .collect()
}

fn marker(kind: ChangeKind) -> ColoredString {
    let symbol = kind.symbol().to_string();
    match kind {
        ChangeKind::Added => symbol.green(),
        ChangeKind::Removed => symbol.red(),
        ChangeKind::Changed => symbol.yellow(),
        ChangeKind::NestedChanged => symbol.cyan(),
    }
}

fn attribute_label(key: &Key) -> String {
    key.attribute_segments().join("::")
}

fn location_suffix(location: Option<&Location>) -> String {
    location
        .filter(|l| !l.is_empty())
        .map(|l| format!("  ({l})").dimmed().to_string())
        .unwrap_or_default()
}

/// Text form of a value for display
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(absent)".to_string(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn render_values(out: &mut String, old: &Value, new: &Value) {
    let (old_text, new_text) = (display_value(old), display_value(new));

    if old_text.contains('\n') || new_text.contains('\n') {
        let diff = similar::TextDiff::from_lines(&old_text, &new_text);
        for change in diff.iter_all_changes() {
            let line = change.value().trim_end_matches('\n');
            match change.tag() {
                similar::ChangeTag::Delete => {
                    out.push_str(&format!("      {}\n", format!("- {line}").red()));
                }
                similar::ChangeTag::Insert => {
                    out.push_str(&format!("      {}\n", format!("+ {line}").green()));
                }
                similar::ChangeTag::Equal => {}
            }
        }
        return;
    }

    out.push_str(&format!("      {}\n", format!("- {old_text}").red()));
    out.push_str(&format!("      {}\n", format!("+ {new_text}").green()));
}

/// Render entries as grouped, colored text
pub fn render_text(entries: &[DiffEntry], opts: RenderOptions) -> String {
    let mut groups: IndexMap<Key, Vec<&DiffEntry>> = IndexMap::new();
    for entry in visible(entries, opts) {
        groups
            .entry(entry.key().resource_key())
            .or_default()
            .push(entry);
    }

    let mut out = String::new();
    for (resource, group) in &groups {
        for entry in group.iter().filter(|e| e.key().is_resource()) {
            let location = match entry.kind() {
                ChangeKind::Removed => entry.old_location(),
                _ => entry.new_location(),
            };
            out.push_str(&format!(
                "{} {}{}\n",
                marker(entry.kind()),
                resource.reference().bold(),
                location_suffix(location)
            ));
        }

        let attributes: Vec<&&DiffEntry> =
            group.iter().filter(|e| !e.key().is_resource()).collect();
        if attributes.is_empty() {
            continue;
        }

        let location = attributes
            .iter()
            .find_map(|e| e.new_location().or(e.old_location()));
        out.push_str(&format!(
            "{}{}\n",
            resource.reference().bold(),
            location_suffix(location)
        ));
        for entry in attributes {
            out.push_str(&format!(
                "  {} {}\n",
                marker(entry.kind()),
                attribute_label(entry.key())
            ));
            render_values(&mut out, entry.old_value(), entry.new_value());
        }
    }
    out
}

/// One-line summary of what was found
pub fn render_summary(entries: &[DiffEntry], opts: RenderOptions) -> String {
    let shown: Vec<DiffEntry> = visible(entries, opts).into_iter().cloned().collect();
    let summary = DiffSummary::from_entries(&shown);
    if !summary.has_changes() {
        return "No differences".to_string();
    }
    let mut text = format!(
        "{} added, {} removed, {} changed, {} nested changes",
        summary.added, summary.removed, summary.changed, summary.nested_changed
    );
    let hidden = entries.len() - shown.len();
    if hidden > 0 {
        text.push_str(&format!(" ({hidden} datatype-only changes hidden)"));
    }
    text
}

#[derive(Serialize)]
struct JsonEntry<'a> {
    kind: ChangeKind,
    resource: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    attribute: Option<String>,
    old_value: &'a Value,
    new_value: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_location: Option<&'a Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_location: Option<&'a Location>,
}

impl<'a> From<&'a DiffEntry> for JsonEntry<'a> {
    fn from(entry: &'a DiffEntry) -> Self {
        let key = entry.key();
        Self {
            kind: entry.kind(),
            resource: key.reference(),
            attribute: (!key.is_resource()).then(|| attribute_label(key)),
            old_value: entry.old_value(),
            new_value: entry.new_value(),
            old_location: entry.old_location(),
            new_location: entry.new_location(),
        }
    }
}

/// Render entries as a JSON array, in engine order
pub fn render_json(entries: &[DiffEntry], opts: RenderOptions) -> Result<String> {
    let view: Vec<JsonEntry<'_>> = visible(entries, opts)
        .into_iter()
        .map(JsonEntry::from)
        .collect();
    Ok(serde_json::to_string_pretty(&view)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain() {
        colored::control::set_override(false);
    }

    fn attr(kind: ChangeKind, attr: &str, old: Value, new: Value) -> DiffEntry {
        let key = Key::resource("File", "/etc/motd")
            .child("parameters")
            .child(attr);
        match kind {
            ChangeKind::NestedChanged => DiffEntry::nested_changed(key, old, new, None, None),
            _ => DiffEntry::changed(key, old, new, None, None),
        }
    }

    #[test]
    fn test_datatype_change_detection() {
        assert!(is_datatype_change(&attr(
            ChangeKind::Changed,
            "port",
            json!("80"),
            json!(80)
        )));
        assert!(is_datatype_change(&attr(
            ChangeKind::NestedChanged,
            "flags",
            json!(["true", 1]),
            json!([true, "1"])
        )));
        assert!(!is_datatype_change(&attr(
            ChangeKind::Changed,
            "port",
            json!("80"),
            json!(81)
        )));
        assert!(!is_datatype_change(&attr(
            ChangeKind::Changed,
            "port",
            Value::Null,
            json!("null")
        )));
    }

    #[test]
    fn test_datatype_changes_hidden_by_default() {
        plain();
        let entries = vec![
            attr(ChangeKind::Changed, "port", json!("80"), json!(80)),
            attr(ChangeKind::Changed, "mode", json!("0644"), json!("0600")),
        ];
        let text = render_text(&entries, RenderOptions::default());
        assert!(text.contains("~ parameters::mode"));
        assert!(!text.contains("port"));

        let shown = render_text(
            &entries,
            RenderOptions {
                display_datatype_changes: true,
            },
        );
        assert!(shown.contains("~ parameters::port"));

        let summary = render_summary(&entries, RenderOptions::default());
        assert!(summary.contains("1 changed"));
        assert!(summary.contains("1 datatype-only changes hidden"));
    }

    #[test]
    fn test_text_groups_by_resource() {
        plain();
        let entries = vec![
            DiffEntry::added(
                Key::resource("Package", "nginx"),
                json!({"parameters": {}}),
                Some(Location {
                    file: Some("site.pp".into()),
                    line: Some(3),
                }),
            ),
            attr(ChangeKind::Changed, "mode", json!("0644"), json!("0600")),
            attr(
                ChangeKind::NestedChanged,
                "require",
                json!(["A"]),
                json!(["A", "B"]),
            ),
        ];
        let text = render_text(&entries, RenderOptions::default());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "+ Package[nginx]  (site.pp:3)");
        assert_eq!(lines[1], "File[/etc/motd]");
        assert_eq!(lines[2], "  ~ parameters::mode");
        assert_eq!(lines[3], "      - 0644");
        assert_eq!(lines[4], "      + 0600");
        assert_eq!(lines[5], "  ! parameters::require");
        // One resource header for both attribute changes
        assert_eq!(text.matches("File[/etc/motd]").count(), 1);
    }

    #[test]
    fn test_multiline_values_show_line_diff() {
        plain();
        let entries = vec![attr(
            ChangeKind::Changed,
            "content",
            json!("a\nb\nc\n"),
            json!("a\nB\nc\n"),
        )];
        let text = render_text(&entries, RenderOptions::default());
        assert!(text.contains("      - b\n"));
        assert!(text.contains("      + B\n"));
        assert!(!text.contains("- a"));
    }

    #[test]
    fn test_json_output() {
        let entries = vec![
            attr(ChangeKind::Changed, "mode", json!("0644"), json!("0600")),
            DiffEntry::removed(Key::resource("Service", "old"), json!({}), None),
        ];
        let parsed: Value =
            serde_json::from_str(&render_json(&entries, RenderOptions::default()).unwrap())
                .unwrap();
        assert_eq!(parsed[0]["kind"], "changed");
        assert_eq!(parsed[0]["resource"], "File[/etc/motd]");
        assert_eq!(parsed[0]["attribute"], "parameters::mode");
        assert_eq!(parsed[0]["new_value"], "0600");
        assert_eq!(parsed[1]["kind"], "removed");
        assert!(parsed[1].get("attribute").is_none());
    }

    #[test]
    fn test_empty_summary() {
        assert_eq!(
            render_summary(&[], RenderOptions::default()),
            "No differences"
        );
    }
}
