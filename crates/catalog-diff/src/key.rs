//! Comparison keys
//!
//! A key is a path of segments joined by [`SEPARATOR`]. The first two
//! segments are always the resource type and title; anything after that
//! addresses a location inside the resource (`parameters`, attribute name,
//! nested hash key or array index).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved separator between key segments (form feed).
pub const SEPARATOR: char = '\u{000C}';

/// Path identifying a resource, or a location nested inside one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    /// Key for a whole resource.
    pub fn resource(resource_type: &str, title: &str) -> Self {
        Self(format!("{resource_type}{SEPARATOR}{title}"))
    }

    /// Build a key from arbitrary segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = String::new();
        for (i, segment) in segments.into_iter().enumerate() {
            if i > 0 {
                out.push(SEPARATOR);
            }
            out.push_str(segment.as_ref());
        }
        Self(out)
    }

    /// Append one segment.
    pub fn child(&self, segment: &str) -> Self {
        Self(format!("{}{SEPARATOR}{segment}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR)
    }

    pub fn resource_type(&self) -> &str {
        self.segments().next().unwrap_or_default()
    }

    pub fn title(&self) -> &str {
        self.segments().nth(1).unwrap_or_default()
    }

    /// Key of the resource that owns this location.
    pub fn resource_key(&self) -> Self {
        Self::resource(self.resource_type(), self.title())
    }

    /// Segments below the resource (empty for a resource key).
    pub fn attribute_segments(&self) -> Vec<&str> {
        self.segments().skip(2).collect()
    }

    /// Attribute path below the resource, joined with [`SEPARATOR`].
    pub fn attribute_path(&self) -> String {
        self.attribute_segments().join(&SEPARATOR.to_string())
    }

    pub fn is_resource(&self) -> bool {
        self.segments().count() <= 2
    }

    /// `Type[Title]` reference form.
    pub fn reference(&self) -> String {
        format!("{}[{}]", self.resource_type(), self.title())
    }
}

impl fmt::Display for Key {
    /// `Type[Title]` followed by `::`-joined attribute segments.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reference())?;
        for segment in self.attribute_segments() {
            write!(f, "::{segment}")?;
        }
        Ok(())
    }
}
