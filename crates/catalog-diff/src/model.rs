//! Catalog data model
//!
//! A [`Catalog`] is the fully-resolved set of resources compiled for one
//! host. Catalogs are immutable once built; a catalog whose build failed
//! still exists as a value but refuses to hand out resources.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;

/// One managed resource as it appears in a compiled catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub title: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub exported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            title: title.into(),
            parameters: Map::new(),
            tags: Vec::new(),
            exported: false,
            file: None,
            line: None,
        }
    }

    /// Set a parameter (builder style)
    pub fn with_param(mut self, name: &str, value: Value) -> Self {
        self.parameters.insert(name.to_string(), value);
        self
    }

    /// Set the tags (builder style)
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the source location (builder style)
    pub fn at(mut self, file: &str, line: u64) -> Self {
        self.file = Some(file.to_string());
        self.line = Some(line);
        self
    }

    pub fn exported(mut self) -> Self {
        self.exported = true;
        self
    }

    /// `Type[Title]` reference form
    pub fn reference(&self) -> String {
        format!("{}[{}]", self.resource_type, self.title)
    }

    pub fn location(&self) -> Location {
        Location {
            file: self.file.clone(),
            line: self.line,
        }
    }
}

/// Source location of a resource declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: Option<String>,
    pub line: Option<u64>,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.line.is_none()
    }

    /// Strip a compilation directory prefix from the file, for display.
    pub fn relative_to(&self, compilation_dir: &str) -> Self {
        let dir = compilation_dir.trim_end_matches('/');
        let file = self.file.as_ref().map(|f| {
            if dir.is_empty() {
                return f.clone();
            }
            match f.strip_prefix(dir) {
                Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
                _ => f.clone(),
            }
        });
        Self {
            file,
            line: self.line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}"),
            (Some(file), None) => write!(f, "{file}"),
            (None, Some(line)) => write!(f, "<unknown>:{line}"),
            (None, None) => write!(f, "<unknown>"),
        }
    }
}

/// Whether the catalog compiled successfully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BuildStatus {
    Built(Vec<Resource>),
    Failed { reason: String },
}

/// A compiled catalog, or the record of a failed compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    status: BuildStatus,
    /// Directory the catalog was compiled in (display only)
    #[serde(default)]
    compilation_dir: String,
}

/// On-disk catalog document, either flat or wrapped in a `data` section.
#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    resources: Option<Vec<Resource>>,
    #[serde(default)]
    data: Option<DataSection>,
}

#[derive(Debug, Deserialize)]
struct DataSection {
    #[serde(default)]
    resources: Vec<Resource>,
}

impl Catalog {
    /// Create a successfully built catalog
    pub fn new(resources: Vec<Resource>) -> Self {
        Self {
            status: BuildStatus::Built(resources),
            compilation_dir: String::new(),
        }
    }

    /// Create a catalog whose build failed
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: BuildStatus::Failed {
                reason: reason.into(),
            },
            compilation_dir: String::new(),
        }
    }

    pub fn with_compilation_dir(mut self, dir: impl Into<String>) -> Self {
        self.compilation_dir = dir.into();
        self
    }

    /// Parse a catalog document
    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::parse(content, None)
    }

    /// Read and parse a catalog document from disk
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, Some(path))
    }

    fn parse(content: &str, path: Option<&Path>) -> Result<Self> {
        let doc: CatalogDocument = serde_json::from_str(content).map_err(|source| Error::Parse {
            path: path.map(Path::to_path_buf),
            source,
        })?;
        let resources = doc
            .resources
            .or_else(|| doc.data.map(|d| d.resources))
            .unwrap_or_default();
        Ok(Self::new(resources))
    }

    /// Resources of a built catalog
    pub fn resources(&self) -> Result<&[Resource]> {
        match &self.status {
            BuildStatus::Built(resources) => Ok(resources),
            BuildStatus::Failed { reason } => Err(Error::CatalogNotBuilt {
                reason: reason.clone(),
            }),
        }
    }

    pub fn compilation_dir(&self) -> &str {
        &self.compilation_dir
    }

    pub fn is_built(&self) -> bool {
        matches!(self.status, BuildStatus::Built(_))
    }

    /// Find a resource by type (case-insensitive) and title
    pub fn find(&self, resource_type: &str, title: &str) -> Option<&Resource> {
        self.resources().ok()?.iter().find(|r| {
            r.resource_type.eq_ignore_ascii_case(resource_type) && r.title == title
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_parse_flat_document() {
        let doc = json!({
            "name": "node.example.com",
            "resources": [
                {"type": "File", "title": "/etc/motd", "parameters": {"content": "hi"},
                 "tags": ["file"], "exported": false, "file": "/x/site.pp", "line": 3}
            ]
        });
        let catalog = Catalog::from_json_str(&doc.to_string()).unwrap();
        let resources = catalog.resources().unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].reference(), "File[/etc/motd]");
        assert_eq!(resources[0].line, Some(3));
    }

    #[test]
    fn test_parse_wrapped_document() {
        let doc = json!({"data": {"resources": [{"type": "Class", "title": "main"}]}});
        let catalog = Catalog::from_json_str(&doc.to_string()).unwrap();
        assert_eq!(catalog.resources().unwrap().len(), 1);
    }

    #[test]
    fn test_parse_error_names_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = Catalog::from_path(file.path()).unwrap_err();
        assert!(matches!(err, Error::Parse { path: Some(_), .. }));
    }

    #[test]
    fn test_failed_catalog_refuses_resources() {
        let catalog = Catalog::failed("compiler exited 1");
        assert!(!catalog.is_built());
        let err = catalog.resources().unwrap_err();
        assert!(matches!(err, Error::CatalogNotBuilt { .. }));
    }

    #[test]
    fn test_location_relative_to() {
        let loc = Location {
            file: Some("/tmp/build/modules/foo/init.pp".into()),
            line: Some(7),
        };
        assert_eq!(
            loc.relative_to("/tmp/build/").to_string(),
            "modules/foo/init.pp:7"
        );
        assert_eq!(loc.relative_to("/other").file, loc.file);
        assert_eq!(loc.relative_to("/tmp/bu").file, loc.file);
    }
}
