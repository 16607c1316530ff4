//! # Tree Helpers
//!
//! Small operations on `serde_json::Value` trees shared by the scanner,
//! localizer and processor: recognizing `$ref` nodes, stripping the `_info`
//! adornment, field merges and path-creating inserts.

use crate::error::{NormalizeError, NormalizeResult};
use crate::util::pointer::{JsonPointer, PathSegment};
use serde_json::{Map, Value};

/// Property holding a reference string.
pub const REF_KEY: &str = "$ref";

/// Property holding the diagnostic annotation of a reference node.
pub const ADORNMENT_KEY: &str = "_info";

/// Whether `node` is an object with a string `$ref` property.
pub fn is_ref_node(node: &Value) -> bool {
    ref_string(node).is_some()
}

/// The `$ref` string of a reference node.
pub fn ref_string(node: &Value) -> Option<&str> {
    node.as_object()
        .and_then(|map| map.get(REF_KEY))
        .and_then(Value::as_str)
}

/// `{"$ref": target}`.
pub fn ref_node(target: &str) -> Value {
    let mut map = Map::new();
    map.insert(REF_KEY.to_string(), Value::String(target.to_string()));
    Value::Object(map)
}

/// Copy of an object without its `$ref` and `_info` properties.
///
/// Non-objects are returned unchanged.
pub fn without_ref(node: &Value) -> Value {
    match node {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != REF_KEY && key.as_str() != ADORNMENT_KEY)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Overwrites fields of `target` with those of `source`.
///
/// When either side is not an object, `source` replaces `target` outright.
pub fn merge_fields(target: &mut Value, source: &Value) {
    match (target.as_object_mut(), source.as_object()) {
        (Some(existing), Some(incoming)) => {
            for (key, value) in incoming {
                existing.insert(key.clone(), value.clone());
            }
        }
        _ => *target = source.clone(),
    }
}

/// Removes `_info` from every reference node in the tree.
pub fn strip_adornments(node: &mut Value) {
    match node {
        Value::Object(map) => {
            if map.get(REF_KEY).is_some_and(Value::is_string) {
                map.shift_remove(ADORNMENT_KEY);
            }
            map.values_mut().for_each(strip_adornments);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_adornments),
        _ => {}
    }
}

/// Stores `value` at `path` below `root`, creating intermediate containers.
///
/// Missing intermediates become objects for key segments and arrays (padded
/// with `null`) for index segments. An existing scalar in the way is an error.
pub fn insert_at(root: &mut Value, path: &[PathSegment], value: Value) -> NormalizeResult<()> {
    let Some((last, parents)) = path.split_last() else {
        *root = value;
        return Ok(());
    };
    let mut node = root;
    for (depth, segment) in parents.iter().enumerate() {
        let next = path.get(depth + 1);
        node = child_slot(node, segment, next, path)?;
    }
    match (node, last) {
        (Value::Object(map), PathSegment::Key(key)) => {
            map.insert(key.clone(), value);
            Ok(())
        }
        (Value::Array(items), PathSegment::Index(idx)) => {
            if items.len() <= *idx {
                items.resize(idx + 1, Value::Null);
            }
            items[*idx] = value;
            Ok(())
        }
        _ => Err(blocked(path)),
    }
}

fn child_slot<'a>(
    node: &'a mut Value,
    segment: &PathSegment,
    next: Option<&PathSegment>,
    path: &[PathSegment],
) -> NormalizeResult<&'a mut Value> {
    let empty = || match next {
        Some(PathSegment::Index(_)) => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    };
    match (node, segment) {
        (Value::Object(map), PathSegment::Key(key)) => {
            let slot = map.entry(key.clone()).or_insert_with(empty);
            if slot.is_null() {
                *slot = empty();
            }
            Ok(slot)
        }
        (Value::Array(items), PathSegment::Index(idx)) => {
            if items.len() <= *idx {
                items.resize(idx + 1, Value::Null);
            }
            let slot = &mut items[*idx];
            if slot.is_null() {
                *slot = empty();
            }
            Ok(slot)
        }
        _ => Err(blocked(path)),
    }
}

fn blocked(path: &[PathSegment]) -> NormalizeError {
    NormalizeError::General(format!(
        "Cannot insert at {}: a non-container value is in the way",
        JsonPointer::from_path(path)
    ))
}

/// Every `$ref` in `root` that is not a resolvable same-document pointer,
/// with its location.
pub fn find_unresolved(root: &Value) -> Vec<(JsonPointer, String)> {
    let mut found = Vec::new();
    collect_unresolved(root, root, &mut JsonPointer::root(), &mut found);
    found
}

fn collect_unresolved(
    root: &Value,
    node: &Value,
    here: &mut JsonPointer,
    found: &mut Vec<(JsonPointer, String)>,
) {
    if let Some(target) = ref_string(node) {
        let resolved = target
            .strip_prefix('#')
            .and_then(|fragment| JsonPointer::from_fragment(fragment).ok())
            .and_then(|ptr| ptr.resolve(root));
        if resolved.is_none() {
            found.push((here.clone(), target.to_string()));
        }
    }
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                let mut below = here.clone();
                below.push(key.as_str());
                collect_unresolved(root, child, &mut below, found);
            }
        }
        Value::Array(items) => {
            for (idx, child) in items.iter().enumerate() {
                let mut below = here.clone();
                below.push(idx.to_string());
                collect_unresolved(root, child, &mut below, found);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_ref_node_helpers() {
        let node = json!({"$ref": "#/definitions/Pet", "_info": {"valid": true}});
        assert!(is_ref_node(&node));
        assert_eq!(ref_string(&node), Some("#/definitions/Pet"));
        assert!(!is_ref_node(&json!({"$ref": 5})));
        assert_eq!(ref_node("a#/b"), json!({"$ref": "a#/b"}));
    }

    #[test]
    fn test_without_ref() {
        let node = json!({"$ref": "x", "_info": {}, "get": {"summary": "s"}});
        assert_eq!(without_ref(&node), json!({"get": {"summary": "s"}}));
    }

    #[test]
    fn test_merge_fields_overwrites() {
        let mut target = json!({"get": 1, "put": 2});
        merge_fields(&mut target, &json!({"put": 3, "post": 4}));
        assert_eq!(target, json!({"get": 1, "put": 3, "post": 4}));

        let mut scalar = json!("x");
        merge_fields(&mut scalar, &json!({"a": 1}));
        assert_eq!(scalar, json!({"a": 1}));
    }

    #[test]
    fn test_strip_adornments_only_touches_ref_nodes() {
        let mut doc = json!({
            "_info": "kept",
            "a": [{"$ref": "#/x", "_info": {"valid": false}}]
        });
        strip_adornments(&mut doc);
        assert_eq!(doc, json!({"_info": "kept", "a": [{"$ref": "#/x"}]}));
    }

    #[test]
    fn test_insert_at_creates_containers() {
        let mut doc = json!({});
        let path = vec![
            PathSegment::from("components"),
            PathSegment::from("schemas"),
            PathSegment::from("Pet"),
        ];
        insert_at(&mut doc, &path, json!({"type": "object"})).unwrap();
        insert_at(&mut doc, &[PathSegment::from("tags"), PathSegment::Index(1)], json!("b")).unwrap();
        assert_eq!(
            doc,
            json!({
                "components": {"schemas": {"Pet": {"type": "object"}}},
                "tags": [null, "b"]
            })
        );
    }

    #[test]
    fn test_insert_at_blocked_by_scalar() {
        let mut doc = json!({"a": 1});
        let path = vec![PathSegment::from("a"), PathSegment::from("b")];
        assert!(insert_at(&mut doc, &path, json!(2)).is_err());
    }

    #[test]
    fn test_find_unresolved() {
        let doc = json!({
            "definitions": {"Pet": {}},
            "a": {"$ref": "#/definitions/Pet"},
            "b": [{"$ref": "#/definitions/Missing"}],
            "c": {"$ref": "other.yaml#/Pet"}
        });
        let found: Vec<(String, String)> = find_unresolved(&doc)
            .into_iter()
            .map(|(ptr, target)| (ptr.to_string(), target))
            .collect();
        assert_eq!(
            found,
            vec![
                ("/b/0".to_string(), "#/definitions/Missing".to_string()),
                ("/c".to_string(), "other.yaml#/Pet".to_string()),
            ]
        );
    }
}
