//! Semantic catalog validation
//!
//! A catalog can compile without errors and still be unusable: duplicate
//! declarations, blank identities, relationships pointing at resources that
//! were never declared. Build tasks run this as their validator.

use crate::error::{Error, Result};
use crate::model::{Catalog, Resource};
use serde_json::Value;
use std::collections::HashSet;

/// Parameters whose values reference other resources
const RELATIONSHIP_PARAMS: [&str; 4] = ["before", "require", "notify", "subscribe"];

#[derive(Debug, Clone, Copy)]
pub struct ValidationOptions {
    /// Check that relationship targets exist
    pub check_references: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            check_references: true,
        }
    }
}

/// Validate a built catalog, collecting every problem found.
pub fn validate(catalog: &Catalog, opts: ValidationOptions) -> Result<()> {
    let resources = catalog.resources()?;
    let mut problems = Vec::new();

    let mut identities: HashSet<(String, &str)> = HashSet::new();
    let mut file_paths: HashSet<&str> = HashSet::new();
    for resource in resources {
        if resource.resource_type.trim().is_empty() || resource.title.trim().is_empty() {
            problems.push(format!(
                "resource with empty type or title at {}",
                resource.location()
            ));
            continue;
        }
        let identity = (resource.resource_type.to_lowercase(), resource.title.as_str());
        if !identities.insert(identity) {
            problems.push(format!("duplicate declaration of {}", resource.reference()));
        }
        if resource.resource_type == "File"
            && let Some(Value::String(path)) = resource.parameters.get("path")
        {
            file_paths.insert(path);
        }
    }

    if opts.check_references {
        for resource in resources {
            for target in references(resource) {
                match parse_reference(target) {
                    None => problems.push(format!(
                        "{} has malformed reference '{target}'",
                        resource.reference()
                    )),
                    Some((rtype, title)) => {
                        let exists = identities.contains(&(rtype.to_lowercase(), title))
                            || (rtype.eq_ignore_ascii_case("File") && file_paths.contains(title));
                        if !exists {
                            problems.push(format!(
                                "{} references missing resource {target}",
                                resource.reference()
                            ));
                        }
                    }
                }
            }
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        log::debug!("Catalog failed validation with {} problems", problems.len());
        Err(Error::InvalidCatalog { problems })
    }
}

/// Relationship targets declared on a resource
fn references(resource: &Resource) -> Vec<&str> {
    RELATIONSHIP_PARAMS
        .iter()
        .filter_map(|name| resource.parameters.get(*name))
        .flat_map(|value| match value {
            Value::String(s) => vec![s.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        })
        .collect()
}

/// Split `Type[Title]` into its parts
fn parse_reference(reference: &str) -> Option<(&str, &str)> {
    let open = reference.find('[')?;
    let title = reference[open + 1..].strip_suffix(']')?;
    let rtype = &reference[..open];
    if rtype.is_empty() || title.is_empty() {
        return None;
    }
    Some((rtype, title))
}
