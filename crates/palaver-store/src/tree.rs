//! Low-level operations on the in-memory value tree.
//!
//! The tree is a plain `serde_json::Value`; interior nodes are objects and
//! empty objects are pruned on removal, so "a path exists" and "a non-null
//! value is stored at or under that path" are the same predicate.

use serde_json::{Map, Value};

use crate::path::StorePath;

/// Read the subtree at `path`, if present.
pub fn get_at<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

/// Replace the subtree at `path`, creating interior objects as needed.
/// Writing `Value::Null` is equivalent to removal.
pub fn set_at(root: &mut Value, path: &StorePath, value: Value) {
    if value.is_null() {
        remove_at(root, path);
        return;
    }

    let mut node = root;
    let (last, interior) = path
        .segments()
        .split_last()
        .expect("path has at least one segment");

    for segment in interior {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = node
            .as_object_mut()
            .expect("just ensured object")
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    node.as_object_mut()
        .expect("just ensured object")
        .insert(last.clone(), value);
}

/// Remove the subtree at `path`, pruning interior objects left empty.
/// Returns whether anything was removed.
pub fn remove_at(root: &mut Value, path: &StorePath) -> bool {
    fn inner(node: &mut Value, segments: &[String]) -> bool {
        let Some(map) = node.as_object_mut() else {
            return false;
        };
        match segments {
            [] => false,
            [last] => map.remove(last).is_some(),
            [first, rest @ ..] => {
                let Some(child) = map.get_mut(first) else {
                    return false;
                };
                let removed = inner(child, rest);
                if removed && child.as_object().is_some_and(Map::is_empty) {
                    map.remove(first);
                }
                removed
            }
        }
    }
    inner(root, path.segments())
}
