#![deny(missing_docs)]

//! # Localizer
//!
//! Registry of content hoisted into the canonical containers of the result
//! document (`/definitions`, `/components/schemas`, `/paths`, ...).
//!
//! Entries are keyed by the canonical [`Reference`] of their origin, so
//! localizing the same origin twice yields the same entry. Names are unique
//! per component; collisions get `_1`, `_2`, ... suffixes.

use crate::dialect::Component;
use crate::error::{NormalizeError, NormalizeResult};
use crate::reference::Reference;
use crate::util::pointer::{escape_segment, JsonPointer};
use crate::util::tree::{merge_fields, ref_node};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;
use url::Url;

/// One hoisted component.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizedContent {
    /// Component kind.
    pub component: Component,
    /// Unique name within the component's container.
    pub name: String,
    /// Content stored under the name.
    pub node: Value,
    /// Canonical reference of the origin.
    pub origin: Reference,
    /// Container the entry is assembled into.
    pub container: JsonPointer,
}

impl LocalizedContent {
    /// Same-document `$ref` string pointing at this entry.
    pub fn ref_string(&self) -> String {
        format!("#{}/{}", self.container, escape_segment(&self.name))
    }

    /// `{"$ref": ...}` pointing at this entry.
    pub fn ref_node(&self) -> Value {
        ref_node(&self.ref_string())
    }
}

/// Registry of localized content.
#[derive(Debug, Default)]
pub struct Localizer {
    entries: IndexMap<Component, IndexMap<String, LocalizedContent>>,
    by_origin: HashMap<Reference, (Component, String)>,
}

impl Localizer {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `node` as the content at `pointer` in the document at `base`.
    ///
    /// Returns the existing entry when that origin was already localized.
    ///
    /// # Arguments
    ///
    /// * `node` - The content.
    /// * `component` - Component kind; must have a container.
    /// * `pointer` - Location of the content in its document.
    /// * `base` - URL of that document.
    pub fn localize(
        &mut self,
        node: Value,
        component: Component,
        pointer: &JsonPointer,
        base: &Url,
    ) -> NormalizeResult<&LocalizedContent> {
        let origin = Reference::at_pointer(base, pointer);
        if !self.by_origin.contains_key(&origin) {
            let container = component.container_pointer().ok_or_else(|| {
                NormalizeError::General(format!("Component {} has no container", component))
            })?;
            let preferred = component.preferred_name(pointer, Some(base));
            let names = self.entries.entry(component).or_default();
            let mut name = preferred.clone();
            let mut suffix = 1;
            while names.contains_key(&name) {
                name = format!("{}_{}", preferred, suffix);
                suffix += 1;
            }
            debug!(origin = %origin, component = %component, name = %name, "Localized");
            names.insert(
                name.clone(),
                LocalizedContent {
                    component,
                    name: name.clone(),
                    node,
                    origin: origin.clone(),
                    container,
                },
            );
            self.by_origin.insert(origin.clone(), (component, name));
        }
        self.get(&origin).ok_or_else(|| {
            NormalizeError::General(format!("Localized entry vanished for {}", origin))
        })
    }

    /// Overwrites fields of an existing entry with those of `node`.
    ///
    /// Fails when the origin was never localized.
    pub fn merge_localize(
        &mut self,
        node: &Value,
        pointer: &JsonPointer,
        base: &Url,
    ) -> NormalizeResult<()> {
        let origin = Reference::at_pointer(base, pointer);
        let entry = self
            .get_mut(&origin)
            .ok_or_else(|| NormalizeError::MergeBeforeLocalize(origin.to_string()))?;
        merge_fields(&mut entry.node, node);
        Ok(())
    }

    /// Replaces the content of an existing entry. Returns whether one existed.
    pub fn refresh(&mut self, origin: &Reference, node: Value) -> bool {
        match self.get_mut(origin) {
            Some(entry) => {
                entry.node = node;
                true
            }
            None => false,
        }
    }

    /// Whether `origin` has been localized.
    pub fn contains(&self, origin: &Reference) -> bool {
        self.by_origin.contains_key(origin)
    }

    /// Entry for `origin`.
    pub fn get(&self, origin: &Reference) -> Option<&LocalizedContent> {
        let (component, name) = self.by_origin.get(origin)?;
        self.entries.get(component)?.get(name)
    }

    fn get_mut(&mut self, origin: &Reference) -> Option<&mut LocalizedContent> {
        let (component, name) = self.by_origin.get(origin)?;
        self.entries.get_mut(component)?.get_mut(name)
    }

    /// Entries of one component in registration order.
    pub fn localized_content(&self, component: Component) -> impl Iterator<Item = &LocalizedContent> {
        self.entries
            .get(&component)
            .into_iter()
            .flat_map(|names| names.values())
    }

    /// Components with at least one entry, in first-registration order.
    pub fn components(&self) -> impl Iterator<Item = Component> + '_ {
        self.entries.keys().copied()
    }

    /// Total number of entries.
    pub fn len(&self) -> usize {
        self.by_origin.len()
    }

    /// Whether nothing was localized.
    pub fn is_empty(&self) -> bool {
        self.by_origin.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn ptr(s: &str) -> JsonPointer {
        JsonPointer::parse(s).unwrap()
    }

    #[test]
    fn test_localize_is_idempotent() {
        let schema = Dialect::Swagger2.component("SCHEMA").unwrap();
        let mut loc = Localizer::new();
        let base = url("file:///specs/main.yaml");
        let first = loc
            .localize(json!({"type": "string"}), schema, &ptr("/definitions/Pet"), &base)
            .unwrap()
            .clone();
        let again = loc
            .localize(json!({"type": "integer"}), schema, &ptr("/definitions/Pet"), &base)
            .unwrap();
        assert_eq!(again, &first);
        assert_eq!(first.ref_string(), "#/definitions/Pet");
        assert_eq!(loc.len(), 1);
    }

    #[test]
    fn test_name_collisions_get_suffixes() {
        let schema = Dialect::Swagger2.component("SCHEMA").unwrap();
        let mut loc = Localizer::new();
        let names: Vec<String> = ["file:///a.yaml", "file:///b.yaml", "file:///c.yaml"]
            .iter()
            .map(|u| {
                loc.localize(json!({}), schema, &ptr("/definitions/Pet"), &url(u))
                    .unwrap()
                    .name
                    .clone()
            })
            .collect();
        assert_eq!(names, vec!["Pet", "Pet_1", "Pet_2"]);
        let order: Vec<&str> = loc
            .localized_content(schema)
            .map(|entry| entry.name.as_str())
            .collect();
        assert_eq!(order, vec!["Pet", "Pet_1", "Pet_2"]);
    }

    #[test]
    fn test_merge_localize_requires_entry() {
        let path = Dialect::Swagger2.component("PATH").unwrap();
        let mut loc = Localizer::new();
        let base = url("file:///main.yaml");
        let err = loc
            .merge_localize(&json!({"get": {}}), &ptr("/paths/~1foo"), &base)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::MergeBeforeLocalize(_)));

        let entry = loc
            .localize(json!({"get": 1, "put": 1}), path, &ptr("/paths/~1foo"), &base)
            .unwrap();
        assert_eq!(entry.name, "/foo");
        assert_eq!(entry.ref_string(), "#/paths/~1foo");
        loc.merge_localize(&json!({"put": 2, "post": 2}), &ptr("/paths/~1foo"), &base)
            .unwrap();
        let origin = Reference::at_pointer(&base, &ptr("/paths/~1foo"));
        assert_eq!(
            loc.get(&origin).unwrap().node,
            json!({"get": 1, "put": 2, "post": 2})
        );
    }

    #[test]
    fn test_refresh() {
        let schema = Dialect::OpenApi3.component("SCHEMA").unwrap();
        let mut loc = Localizer::new();
        let base = url("file:///x/other.yaml");
        let origin = Reference::at_pointer(&base, &ptr("/Foo"));
        assert!(!loc.refresh(&origin, json!(1)));
        let entry = loc.localize(json!(0), schema, &ptr("/Foo"), &base).unwrap();
        assert_eq!(entry.name, "other_SCHEMA");
        assert_eq!(entry.ref_string(), "#/components/schemas/other_SCHEMA");
        assert!(loc.refresh(&origin, json!(1)));
        assert_eq!(loc.get(&origin).unwrap().node, json!(1));
        assert_eq!(loc.components().collect::<Vec<_>>(), vec![schema]);
    }
}
