//! Catalog normalization
//!
//! Reduces a catalog to a comparison-ready map keyed by `type\ftitle`, plus
//! a side table of source locations. Everything that does not describe the
//! end state of a resource (ordering metaparameters, declaration order of
//! tags, where it was declared) is stripped here so the differ never sees it.

use crate::error::{Error, Result};
use crate::key::Key;
use crate::model::{Catalog, Location, Resource};
use indexmap::IndexMap;
use indexmap::map::Entry;
use serde_json::{Map, Value};

/// Parameters that only affect ordering, not end state
const ORDERING_PARAMS: [&str; 2] = ["before", "require"];

/// Parameters whose element order carries no meaning
const UNORDERED_PARAMS: [&str; 3] = ["notify", "subscribe", "tag"];

/// Field names inside a normalized resource body
pub const PARAMETERS: &str = "parameters";
pub const TAGS: &str = "tags";

/// A catalog reduced for comparison.
#[derive(Debug, Clone, Default)]
pub struct NormalizedCatalog {
    /// Resource bodies (`{"parameters": {...}, "tags": [...]}`) in catalog order
    pub resources: IndexMap<Key, Value>,
    /// Declaration site of each resource, keyed like `resources`
    pub locations: IndexMap<Key, Location>,
}

impl NormalizedCatalog {
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Tags of a normalized resource
    pub fn tags(&self, key: &Key) -> Vec<&str> {
        self.resources
            .get(key)
            .and_then(|body| body.get(TAGS))
            .and_then(Value::as_array)
            .map(|tags| tags.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Normalize a built catalog.
pub fn normalize(catalog: &Catalog) -> Result<NormalizedCatalog> {
    let mut out = NormalizedCatalog::default();

    for resource in catalog.resources()? {
        if resource.exported {
            continue;
        }

        let (key, body) = normalize_resource(resource);
        let location = resource.location();

        match out.resources.entry(key) {
            Entry::Occupied(existing) => {
                let first = out
                    .locations
                    .get(existing.key())
                    .cloned()
                    .unwrap_or_default();
                return Err(Error::DuplicateResource {
                    resource: existing.key().reference(),
                    first: first.to_string(),
                    second: location.to_string(),
                });
            }
            Entry::Vacant(slot) => {
                out.locations.insert(slot.key().clone(), location);
                slot.insert(body);
            }
        }
    }

    log::debug!(
        "Normalized {} resources ({} in source catalog)",
        out.len(),
        catalog.resources().map(<[Resource]>::len).unwrap_or(0)
    );
    Ok(out)
}

/// Comparison key and body for a single resource.
fn normalize_resource(resource: &Resource) -> (Key, Value) {
    let mut parameters = resource.parameters.clone();

    // A file is identified by where it lands, not by its declared name
    let mut title = resource.title.clone();
    if resource.resource_type == "File"
        && let Some(path) = parameters.remove("path")
    {
        title = match path {
            Value::String(s) => s,
            other => other.to_string(),
        };
    }

    for name in ORDERING_PARAMS {
        parameters.remove(name);
    }

    for name in UNORDERED_PARAMS {
        if let Some(Value::Array(items)) = parameters.get_mut(name) {
            sort_values(items);
        }
    }

    let mut body = Map::new();
    body.insert(PARAMETERS.to_string(), Value::Object(parameters));

    if !resource.tags.is_empty() {
        let mut tags: Vec<Value> = resource.tags.iter().cloned().map(Value::String).collect();
        sort_values(&mut tags);
        body.insert(TAGS.to_string(), Value::Array(tags));
    }

    (
        Key::resource(&resource.resource_type, &title),
        Value::Object(body),
    )
}

fn sort_values(items: &mut [Value]) {
    items.sort_by_cached_key(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog(resources: Vec<Resource>) -> Catalog {
        Catalog::new(resources)
    }

    #[test]
    fn test_exported_resources_dropped() {
        let cat = catalog(vec![
            Resource::new("Host", "a").exported(),
            Resource::new("Host", "b"),
        ]);
        let norm = normalize(&cat).unwrap();
        assert_eq!(norm.len(), 1);
        assert!(norm.resources.contains_key(&Key::resource("Host", "b")));
    }

    #[test]
    fn test_file_retitled_by_path() {
        let cat = catalog(vec![
            Resource::new("File", "my-name").with_param("path", json!("/etc/foo")),
        ]);
        let norm = normalize(&cat).unwrap();
        let key = Key::resource("File", "/etc/foo");
        let body = &norm.resources[&key];
        assert!(body[PARAMETERS].get("path").is_none());
    }

    #[test]
    fn test_path_retitling_only_applies_to_files() {
        let cat = catalog(vec![
            Resource::new("Exec", "run").with_param("path", json!("/usr/bin")),
        ]);
        let norm = normalize(&cat).unwrap();
        let body = &norm.resources[&Key::resource("Exec", "run")];
        assert_eq!(body[PARAMETERS]["path"], json!("/usr/bin"));
    }

    #[test]
    fn test_ordering_params_removed_and_sets_sorted() {
        let cat = catalog(vec![
            Resource::new("Service", "nginx")
                .with_param("require", json!("Package[nginx]"))
                .with_param("before", json!(["Exec[x]"]))
                .with_param("notify", json!(["Exec[b]", "Exec[a]"]))
                .with_param("subscribe", json!("File[/etc/nginx.conf]"))
                .with_tags(["web", "base"]),
        ]);
        let norm = normalize(&cat).unwrap();
        let body = &norm.resources[&Key::resource("Service", "nginx")];
        assert!(body[PARAMETERS].get("require").is_none());
        assert!(body[PARAMETERS].get("before").is_none());
        assert_eq!(body[PARAMETERS]["notify"], json!(["Exec[a]", "Exec[b]"]));
        assert_eq!(body[PARAMETERS]["subscribe"], json!("File[/etc/nginx.conf]"));
        assert_eq!(body[TAGS], json!(["base", "web"]));
    }

    #[test]
    fn test_empty_tags_omitted() {
        let norm = normalize(&catalog(vec![Resource::new("Class", "main")])).unwrap();
        assert!(norm.resources[&Key::resource("Class", "main")].get(TAGS).is_none());
    }

    #[test]
    fn test_locations_split_out() {
        let cat = catalog(vec![Resource::new("Class", "main").at("/code/site.pp", 4)]);
        let norm = normalize(&cat).unwrap();
        let key = Key::resource("Class", "main");
        assert_eq!(norm.locations[&key].line, Some(4));
        assert!(norm.resources[&key].get("file").is_none());
        assert!(norm.resources[&key].get("line").is_none());
    }

    #[test]
    fn test_collision_after_retitling_is_error() {
        let cat = catalog(vec![
            Resource::new("File", "/etc/foo").at("a.pp", 1),
            Resource::new("File", "other")
                .with_param("path", json!("/etc/foo"))
                .at("b.pp", 2),
        ]);
        let err = normalize(&cat).unwrap_err();
        match err {
            Error::DuplicateResource {
                resource,
                first,
                second,
            } => {
                assert_eq!(resource, "File[/etc/foo]");
                assert_eq!(first, "a.pp:1");
                assert_eq!(second, "b.pp:2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unbuilt_catalog_rejected() {
        let err = normalize(&Catalog::failed("nope")).unwrap_err();
        assert!(matches!(err, Error::CatalogNotBuilt { .. }));
    }
}
