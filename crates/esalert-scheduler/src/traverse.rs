//! Response flattening: walks a search response along a dotted path.
//!
//! Lists met along the way are broadcast: the remaining path is applied to
//! every element and the results concatenated. Bucket keys seen while
//! broadcasting accumulate into a keychain (`"a - b"`), and each mapping leaf
//! comes back with its own `key` prefixed by that keychain (`"a - b-c"`).
//!
//! The input tree is never modified; leaves are cloned before annotation.

use serde_json::Value;

const KEYCHAIN_SEPARATOR: &str = " - ";
const LEAF_KEY_SEPARATOR: &str = "-";

/// Collect every leaf reachable from `tree` along `path`.
///
/// Missing keys and shapes that can't be descended yield nothing for that
/// branch; this never fails. A key that is present but `null` is a leaf.
pub fn flatten(tree: &Value, path: &str) -> Vec<Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    walk(tree, &segments, "", &mut out);
    out
}

fn walk(node: &Value, segments: &[&str], keychain: &str, out: &mut Vec<Value>) {
    let Some((segment, rest)) = segments.split_first() else {
        collect_leaf(node, keychain, out);
        return;
    };

    match node {
        Value::Object(map) => {
            if let Some(child) = map.get(*segment) {
                walk(child, rest, keychain, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                let chain = extend_keychain(keychain, item);
                walk(item, segments, &chain, out);
            }
        }
        _ => {}
    }
}

fn collect_leaf(node: &Value, keychain: &str, out: &mut Vec<Value>) {
    match node {
        Value::Array(items) => out.extend(items.iter().map(|item| annotate(item, keychain))),
        other => out.push(annotate(other, keychain)),
    }
}

fn extend_keychain(keychain: &str, item: &Value) -> String {
    match item.get("key").and_then(Value::as_str) {
        Some(key) if keychain.is_empty() => key.to_string(),
        Some(key) => format!("{keychain}{KEYCHAIN_SEPARATOR}{key}"),
        None => keychain.to_string(),
    }
}

/// Clone a leaf, prefixing its `key` with the keychain when both are present.
fn annotate(leaf: &Value, keychain: &str) -> Value {
    let mut leaf = leaf.clone();
    if keychain.is_empty() {
        return leaf;
    }
    if let Some(Value::String(key)) = leaf.get_mut("key") {
        if !key.is_empty() {
            *key = format!("{keychain}{LEAF_KEY_SEPARATOR}{key}");
        }
    }
    leaf
}
