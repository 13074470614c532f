//! Ignore rules
//!
//! A rule suppresses differences by resource type, title and (optionally)
//! attribute. Rules OR together; the fields of one rule AND together, as do
//! several attribute specs on one rule.
//!
//! Textual form: `Type[Title]` or `Type[Title]::attr-spec`, with further
//! attribute specs joined by ` && `.
//!
//! - type: `*`, a literal (case-insensitive) or `/regex/` (full match)
//! - title: as type, plus `*` wildcards (`/etc/*`). A `/…/` title also
//!   matches its own text literally, so `File[/etc/nginx/]` still names
//!   that directory.
//!
//! A `/regex/` type ends at its first unescaped `/`; the title ends at the
//! `]` balancing its opening bracket. Anything else after the title besides
//! `::` is rejected.
//! - attr-spec: `*`, a set of op codes (`+-~!`), or a path-spec
//!   `[+|-]path[op operand]` where `::` separates path segments and op is
//!   one of `=>` `=+>` `=->` `=~>` `=&>` (the `>` is optional).
//!
//! Everything is compiled once; matching never re-parses.

use crate::entry::{ChangeKind, DiffEntry};
use crate::error::{Error, Result};
use crate::key::SEPARATOR;
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use similar::{ChangeTag, TextDiff};
use std::fmt;
use std::str::FromStr;

/// Separator between attribute specs in the textual form
const ATTR_JOIN: &str = " && ";

/// Pattern for a resource type or title
#[derive(Debug, Clone)]
pub enum Pattern {
    /// `*`
    Any,
    /// Case-insensitive exact match (stored lowercased)
    Literal(String),
    /// Anchored regex
    Regex(Regex),
    /// A `/…/` title: the regex, or the text itself as a literal path
    RegexOrLiteral(Regex, String),
}

impl Pattern {
    fn parse(text: &str, is_title: bool) -> Result<Self> {
        if text == "*" {
            return Ok(Self::Any);
        }
        if text.len() >= 2 && text.starts_with('/') && text.ends_with('/') {
            let inner = &text[1..text.len() - 1];
            let re = compile(&format!("^(?:{inner})$"), false)?;
            // `/etc/nginx/` is as likely a directory as a regex
            return Ok(if is_title {
                Self::RegexOrLiteral(re, text.to_lowercase())
            } else {
                Self::Regex(re)
            });
        }
        let allow_wildcard = is_title;
        if allow_wildcard && text.contains('*') {
            let body = text
                .split('*')
                .map(regex::escape)
                .collect::<Vec<_>>()
                .join(".*");
            return compile(&format!("^{body}$"), true).map(Self::Regex);
        }
        Ok(Self::Literal(text.to_lowercase()))
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Literal(expected) => text.to_lowercase() == *expected,
            Self::Regex(re) => re.is_match(text),
            Self::RegexOrLiteral(re, literal) => {
                re.is_match(text) || text.to_lowercase() == *literal
            }
        }
    }
}

/// Which side of a difference must be absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strictness {
    Added,
    Removed,
}

/// Value condition attached to a path-spec
#[derive(Debug, Clone)]
pub enum Condition {
    /// `=>v`: old or new equals v
    Equals(String),
    /// `=+>v`: new equals v
    NewEquals(String),
    /// `=->v`: old equals v
    OldEquals(String),
    /// `=~>re`: some changed line matches
    AnyLineMatches(Regex),
    /// `=&>re`: every changed line matches
    AllLinesMatch(Regex),
}

/// Attribute path with optional strictness and value condition
#[derive(Debug, Clone)]
pub struct PathSpec {
    strict: Option<Strictness>,
    /// Lowercased, segments joined by [`SEPARATOR`]
    path: String,
    condition: Option<Condition>,
}

/// One attribute constraint on a rule
#[derive(Debug, Clone)]
pub enum AttrSpec {
    /// No constraint
    Any,
    /// Matches by change kind only, anywhere on the resource
    Kinds(Vec<ChangeKind>),
    Path(PathSpec),
}

impl AttrSpec {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() || text == "*" {
            return Ok(Self::Any);
        }
        if text.chars().all(|c| ChangeKind::from_symbol(c).is_some()) {
            return Ok(Self::Kinds(
                text.chars().filter_map(ChangeKind::from_symbol).collect(),
            ));
        }
        PathSpec::parse(text).map(Self::Path)
    }

    fn matches(&self, entry: &DiffEntry) -> bool {
        match self {
            Self::Any => true,
            Self::Kinds(kinds) => kinds.contains(&entry.kind()),
            Self::Path(spec) => spec.matches(entry),
        }
    }
}

impl PathSpec {
    fn parse(text: &str) -> Result<Self> {
        let (strict, rest) = match text.chars().next() {
            Some('+') => (Some(Strictness::Added), &text[1..]),
            Some('-') => (Some(Strictness::Removed), &text[1..]),
            _ => (None, text),
        };

        let (path, condition) = match rest.find('=') {
            None => (rest, None),
            Some(pos) => (&rest[..pos], Some(parse_condition(text, &rest[pos + 1..])?)),
        };

        let path = path.trim();
        if path.is_empty() {
            return Err(Error::invalid_rule(text, "attribute path is empty"));
        }

        Ok(Self {
            strict,
            path: path.replace("::", &SEPARATOR.to_string()).to_lowercase(),
            condition,
        })
    }

    fn matches(&self, entry: &DiffEntry) -> bool {
        let segments = entry.key().attribute_segments();
        if segments.is_empty() {
            return false;
        }

        let path_matches = if self.path.contains(SEPARATOR) {
            entry.key().attribute_path().to_lowercase() == self.path
        } else {
            segments.iter().any(|s| s.to_lowercase() == self.path)
        };
        if !path_matches {
            return false;
        }

        let (old, new) = (entry.old_value(), entry.new_value());
        let strict_ok = match self.strict {
            None => true,
            Some(Strictness::Added) => old.is_null() && !new.is_null(),
            Some(Strictness::Removed) => new.is_null() && !old.is_null(),
        };
        if !strict_ok {
            return false;
        }

        match &self.condition {
            None => true,
            Some(condition) => condition.matches(old, new),
        }
    }
}

fn parse_condition(rule: &str, text: &str) -> Result<Condition> {
    let mut chars = text.chars();
    let modifier = match text.chars().next() {
        Some(c @ ('+' | '-' | '~' | '&')) => {
            chars.next();
            Some(c)
        }
        _ => None,
    };
    let rest = chars.as_str();
    let operand = rest.strip_prefix('>').unwrap_or(rest);

    Ok(match modifier {
        None => Condition::Equals(operand.to_string()),
        Some('+') => Condition::NewEquals(operand.to_string()),
        Some('-') => Condition::OldEquals(operand.to_string()),
        Some('~') | Some('&') => {
            if operand.is_empty() {
                return Err(Error::invalid_rule(rule, "line-match operator needs a regex"));
            }
            let re = compile(operand, true)?;
            if modifier == Some('~') {
                Condition::AnyLineMatches(re)
            } else {
                Condition::AllLinesMatch(re)
            }
        }
        Some(_) => return Err(Error::invalid_rule(rule, "unknown operator")),
    })
}

impl Condition {
    fn matches(&self, old: &Value, new: &Value) -> bool {
        match self {
            Self::Equals(v) => side_equals(old, v) || side_equals(new, v),
            Self::NewEquals(v) => side_equals(new, v),
            Self::OldEquals(v) => side_equals(old, v),
            Self::AnyLineMatches(re) => changed_lines(old, new).iter().any(|l| re.is_match(l)),
            Self::AllLinesMatch(re) => {
                let lines = changed_lines(old, new);
                !lines.is_empty() && lines.iter().all(|l| re.is_match(l))
            }
        }
    }
}

fn side_equals(value: &Value, expected: &str) -> bool {
    !value.is_null() && stringify(value) == expected
}

/// Text form of a value for operand comparison and line diffs
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
        }
        other => other.to_string(),
    }
}

/// Lines inserted or deleted between the text forms of two values
fn changed_lines(old: &Value, new: &Value) -> Vec<String> {
    let (old, new) = (stringify(old), stringify(new));
    TextDiff::from_lines(&old, &new)
        .iter_all_changes()
        .filter(|change| change.tag() != ChangeTag::Equal)
        .map(|change| change.value().trim_end_matches(['\r', '\n']).to_string())
        .collect()
}

fn compile(pattern: &str, case_insensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(case_insensitive)
        .build()
        .map_err(|source| Error::InvalidRegex {
            pattern: pattern.to_string(),
            source,
        })
}

/// A compiled ignore rule
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    resource_type: Pattern,
    title: Pattern,
    attrs: Vec<AttrSpec>,
    source: String,
}

impl IgnoreRule {
    /// Compile a rule from its three fields
    pub fn new(resource_type: &str, title: &str, attrs: &[&str]) -> Result<Self> {
        let mut source = format!("{resource_type}[{title}]");
        if !attrs.is_empty() {
            source.push_str("::");
            source.push_str(&attrs.join(ATTR_JOIN));
        }
        Ok(Self {
            resource_type: Pattern::parse(resource_type, false)?,
            title: Pattern::parse(title, true)?,
            attrs: attrs
                .iter()
                .map(|a| AttrSpec::parse(a))
                .collect::<Result<_>>()?,
            source,
        })
    }

    /// Rule ignoring one exact resource, every kind of change
    pub fn for_resource(resource_type: &str, title: &str) -> Self {
        Self {
            resource_type: Pattern::Literal(resource_type.to_lowercase()),
            title: Pattern::Literal(title.to_lowercase()),
            attrs: Vec::new(),
            source: format!("{resource_type}[{title}]"),
        }
    }

    /// Whether this rule suppresses `entry`
    pub fn matches(&self, entry: &DiffEntry) -> bool {
        self.resource_type.matches(entry.resource_type())
            && self.title.matches(entry.title())
            && self.attrs.iter().all(|a| a.matches(entry))
    }
}

/// Whether any rule suppresses `entry`
pub fn is_ignored(rules: &[IgnoreRule], entry: &DiffEntry) -> bool {
    rules.iter().any(|rule| rule.matches(entry))
}

impl FromStr for IgnoreRule {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        let open = type_end(text)?;
        let resource_type = &text[..open];
        let after = &text[open + 1..];

        let close = title_end(after)
            .ok_or_else(|| Error::invalid_rule(text, "missing closing ']'"))?;
        let title = &after[..close];
        let attrs = match &after[close + 1..] {
            "" => None,
            rest => match rest.strip_prefix("::") {
                Some(attrs) => Some(attrs),
                None => {
                    return Err(Error::invalid_rule(
                        text,
                        "expected '::' or end of rule after ']'",
                    ));
                }
            },
        };

        if resource_type.is_empty() || title.is_empty() {
            return Err(Error::invalid_rule(text, "type and title must not be empty"));
        }

        let attrs: Vec<&str> = attrs
            .map(|a| a.split(ATTR_JOIN).collect())
            .unwrap_or_default();
        Self::new(resource_type, title, &attrs)
    }
}

/// Byte offset of the `[` opening the title. A `/regex/` type is skipped as
/// a whole so its character classes are not taken for the title.
fn type_end(text: &str) -> Result<usize> {
    let start = match text.strip_prefix('/') {
        Some(rest) => {
            let close = unescaped(rest, '/')
                .ok_or_else(|| Error::invalid_rule(text, "unterminated type regex"))?;
            close + 2
        }
        None => 0,
    };
    match text[start..].find('[') {
        Some(pos) if start == 0 || pos == 0 => Ok(start + pos),
        _ => Err(Error::invalid_rule(text, "expected Type[Title]")),
    }
}

/// First occurrence of `needle` not preceded by a backslash
fn unescaped(text: &str, needle: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            c if c == needle => return Some(i),
            _ => {}
        }
    }
    None
}

/// Byte offset of the `]` balancing the title's opening bracket
fn title_end(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

impl fmt::Display for IgnoreRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Key;
    use serde_json::json;

    fn rule(text: &str) -> IgnoreRule {
        text.parse().unwrap()
    }

    fn added(t: &str, title: &str) -> DiffEntry {
        DiffEntry::added(Key::resource(t, title), json!({"parameters": {}}), None)
    }

    fn changed(t: &str, title: &str, attr: &[&str], old: Value, new: Value) -> DiffEntry {
        let mut key = Key::resource(t, title);
        for segment in attr {
            key = key.child(segment);
        }
        DiffEntry::changed(key, old, new, None, None)
    }

    #[test]
    fn test_type_star_and_case_insensitive_literal() {
        assert!(rule("*[*]").matches(&added("File", "/x")));
        assert!(rule("file[/X]").matches(&added("File", "/x")));
        assert!(!rule("Exec[/x]").matches(&added("File", "/x")));
    }

    #[test]
    fn test_type_regex_is_full_match() {
        assert!(rule("/Fi.e/[*]").matches(&added("File", "/x")));
        assert!(!rule("/Fil/[*]").matches(&added("File", "/x")));
    }

    #[test]
    fn test_type_regex_with_character_class() {
        let r = rule("/[Ff]ile/[*]");
        assert!(r.matches(&added("File", "/x")));
        assert!(r.matches(&added("file", "/x")));
        assert!(!r.matches(&added("Exec", "/x")));
    }

    #[test]
    fn test_title_regex_with_brackets() {
        let r = rule("File[//etc/[a-z]+\\.conf/]::mode");
        let c = changed("File", "/etc/app.conf", &["parameters", "mode"], json!("1"), json!("2"));
        assert!(r.matches(&c));
        let c = changed("File", "/etc/app1.conf", &["parameters", "mode"], json!("1"), json!("2"));
        assert!(!r.matches(&c));
    }

    #[test]
    fn test_directory_title_matches_literally() {
        let r = rule("File[/etc/nginx/]");
        assert!(r.matches(&added("File", "/etc/nginx/")));
        assert!(!r.matches(&added("File", "/etc/nginx")));
        assert!(!r.matches(&added("File", "/etc/nginx/conf.d/")));
    }

    #[test]
    fn test_title_wildcard() {
        let r = rule("File[/etc/*.conf]");
        assert!(r.matches(&added("File", "/ETC/nginx.conf")));
        assert!(!r.matches(&added("File", "/etc/nginx.conf.bak")));
        // Dots are literal in wildcards
        assert!(!r.matches(&added("File", "/etc/nginxXconf")));
    }

    #[test]
    fn test_op_code_only_attr() {
        let r = rule("*[*]::+");
        assert!(r.matches(&added("File", "/x")));
        let c = changed("File", "/x", &["parameters", "mode"], json!("1"), json!("2"));
        assert!(!r.matches(&c));
        assert!(rule("*[*]::~!").matches(&c));
    }

    #[test]
    fn test_bare_segment_and_full_path() {
        let c = changed("File", "/x", &["parameters", "content"], json!("a"), json!("b"));
        assert!(rule("File[/x]::content").matches(&c));
        assert!(rule("File[/x]::Parameters::Content").matches(&c));
        assert!(!rule("File[/x]::parameters::mode").matches(&c));
        // Resource-level entries have no attribute path
        assert!(!rule("File[/x]::content").matches(&added("File", "/x")));
    }

    #[test]
    fn test_strict_addition() {
        let r = rule("*[*]::+mode");
        let new_attr = DiffEntry::nested_changed(
            Key::from_segments(["File", "/x", "parameters", "mode"]),
            Value::Null,
            json!("0644"),
            None,
            None,
        );
        assert!(r.matches(&new_attr));
        let c = changed("File", "/x", &["parameters", "mode"], json!("0600"), json!("0644"));
        assert!(!r.matches(&c));
    }

    #[test]
    fn test_value_operators() {
        let c = changed("File", "/x", &["parameters", "mode"], json!("0600"), json!("0644"));
        assert!(rule("*[*]::mode=>0600").matches(&c));
        assert!(rule("*[*]::mode=0644").matches(&c));
        assert!(rule("*[*]::mode=+>0644").matches(&c));
        assert!(!rule("*[*]::mode=+>0600").matches(&c));
        assert!(rule("*[*]::mode=->0600").matches(&c));
        assert!(!rule("*[*]::mode=-0644").matches(&c));
    }

    #[test]
    fn test_line_regex_operators() {
        let c = changed(
            "File",
            "/x",
            &["parameters", "content"],
            json!("keep\n# generated at 1\n"),
            json!("keep\n# Generated at 2\n"),
        );
        assert!(rule("*[*]::content=~>^# generated").matches(&c));
        assert!(rule("*[*]::content=&>^# generated").matches(&c));

        let mixed = changed(
            "File",
            "/x",
            &["parameters", "content"],
            json!("a\n# generated 1\n"),
            json!("b\n# generated 2\n"),
        );
        assert!(rule("*[*]::content=~>generated").matches(&mixed));
        assert!(!rule("*[*]::content=&>generated").matches(&mixed));
    }

    #[test]
    fn test_multiple_attrs_and_together() {
        let c = changed("File", "/x", &["parameters", "mode"], json!("0600"), json!("0644"));
        assert!(rule("*[*]::mode && ~").matches(&c));
        assert!(!rule("*[*]::mode && +").matches(&c));
    }

    #[test]
    fn test_rules_or_together() {
        let rules = vec![rule("Exec[*]"), rule("File[/x]")];
        assert!(is_ignored(&rules, &added("File", "/x")));
        assert!(!is_ignored(&rules, &added("Package", "x")));
    }

    #[test]
    fn test_malformed_rules_rejected() {
        assert!(matches!(
            "File".parse::<IgnoreRule>(),
            Err(Error::InvalidRule { .. })
        ));
        assert!(matches!(
            "File[/x".parse::<IgnoreRule>(),
            Err(Error::InvalidRule { .. })
        ));
        assert!(matches!(
            "/(/[x]".parse::<IgnoreRule>(),
            Err(Error::InvalidRegex { .. })
        ));
        assert!(matches!(
            "File[x]::content=~>".parse::<IgnoreRule>(),
            Err(Error::InvalidRule { .. })
        ));
        // Unterminated type regex
        assert!(matches!(
            "/[Ff]ile[*]".parse::<IgnoreRule>(),
            Err(Error::InvalidRule { .. })
        ));
        // Text between the type regex and the title
        assert!(matches!(
            "/File/x[*]".parse::<IgnoreRule>(),
            Err(Error::InvalidRule { .. })
        ));
        // Unbalanced title
        assert!(matches!(
            "File[/tmp/a]b]".parse::<IgnoreRule>(),
            Err(Error::InvalidRule { .. })
        ));
        assert!(matches!(
            "File[[x]".parse::<IgnoreRule>(),
            Err(Error::InvalidRule { .. })
        ));
    }

    #[test]
    fn test_display_round_trips_source() {
        assert_eq!(rule("File[/x]::mode").to_string(), "File[/x]::mode");
    }
}
