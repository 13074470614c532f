use crate::paths;
use anyhow::{Context, Result};
use catalog_diff::{IgnoreRule, ValidationOptions};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// Settings
// ============================================================================

/// Settings file contents. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Ignore rules, as rule strings or tables
    pub ignore: Vec<RuleSpec>,

    /// Resources carrying any of these tags are ignored
    pub ignore_tags: Vec<String>,

    /// Post-filters applied after ignore rules, by name
    pub filters: Vec<String>,

    /// Build both catalogs concurrently
    pub parallel: bool,

    /// Fail a build whose relationships point at undeclared resources
    pub validate_references: bool,

    /// Show changes that only alter a value's type (`"1"` vs `1`)
    pub display_datatype_changes: bool,

    /// External command that compiles a catalog from a directory
    pub compiler: Option<CompilerConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ignore: Vec::new(),
            ignore_tags: Vec::new(),
            filters: Vec::new(),
            parallel: true,
            validate_references: true,
            display_datatype_changes: false,
            compiler: None,
        }
    }
}

/// An ignore rule as written in the settings file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSpec {
    /// `Type[Title]::attr && attr`
    Text(String),
    /// `{ type = "File", title = "/etc/*", attrs = ["content"] }`
    Table {
        #[serde(rename = "type")]
        resource_type: String,
        title: String,
        #[serde(default)]
        attrs: Vec<String>,
    },
}

impl RuleSpec {
    pub fn compile(&self) -> catalog_diff::Result<IgnoreRule> {
        match self {
            RuleSpec::Text(text) => text.parse(),
            RuleSpec::Table {
                resource_type,
                title,
                attrs,
            } => {
                let attrs: Vec<&str> = attrs.iter().map(String::as_str).collect();
                IgnoreRule::new(resource_type, title, &attrs)
            }
        }
    }
}

/// How to invoke the catalog compiler
///
/// The compiler runs with the source directory as its working directory
/// and must print the catalog document on stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl CompilerConfig {
    /// Program path with `~` and variables expanded
    pub fn program_path(&self) -> PathBuf {
        paths::expand(&self.program)
    }
}

impl Settings {
    /// Load settings from `path`, or from the default location.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (paths::config_file()?, false),
        };

        if !explicit && !path.exists() {
            log::debug!("No settings file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let settings = Self::from_toml(&content)
            .with_context(|| format!("Invalid settings file: {}", path.display()))?;
        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Compile every ignore rule, failing on the first invalid one
    pub fn ignore_rules(&self) -> Result<Vec<IgnoreRule>> {
        self.ignore
            .iter()
            .map(|spec| {
                spec.compile()
                    .with_context(|| format!("Invalid ignore rule: {spec:?}"))
            })
            .collect()
    }

    pub fn validation(&self) -> ValidationOptions {
        ValidationOptions {
            check_references: self.validate_references,
        }
    }
}
