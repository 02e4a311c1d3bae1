//! Helpers over the merged JSON tree: layering, leaf traversal and the
//! canonical form the config hash is computed from.

use serde_json::{Map, Value};

/// Folds `layer` into `base`. Maps merge key by key; any other value in
/// `layer` replaces whatever `base` held at that position.
pub(crate) fn merge_layer(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(into), Value::Object(from)) => {
            for (key, incoming) in from {
                match into.get_mut(&key) {
                    Some(existing) => merge_layer(existing, incoming),
                    None => {
                        into.insert(key, incoming);
                    }
                }
            }
        }
        (slot, replacement) => *slot = replacement,
    }
}

/// Calls `visit` with the JSON pointer and value of every scalar leaf.
/// Array elements are addressed by index; the root scalar is `/`.
pub(crate) fn for_each_leaf<'a>(root: &'a Value, mut visit: impl FnMut(&str, &'a Value)) {
    let mut path = String::new();
    walk(root, &mut path, &mut visit);
}

fn walk<'a>(node: &'a Value, path: &mut String, visit: &mut impl FnMut(&str, &'a Value)) {
    let children: Box<dyn Iterator<Item = (String, &'a Value)> + 'a> = match node {
        Value::Object(map) => Box::new(map.iter().map(|(k, v)| (escape_token(k), v))),
        Value::Array(items) => Box::new(items.iter().enumerate().map(|(i, v)| (i.to_string(), v))),
        leaf => {
            visit(if path.is_empty() { "/" } else { path.as_str() }, leaf);
            return;
        }
    };
    for (token, child) in children {
        let mark = path.len();
        path.push('/');
        path.push_str(&token);
        walk(child, path, visit);
        path.truncate(mark);
    }
}

fn escape_token(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Compact JSON with every object's keys in lexical order, so two documents
/// that differ only in key order produce the same bytes.
pub(crate) fn canonical_string(root: &Value) -> serde_json::Result<String> {
    serde_json::to_string(&ordered(root))
}

fn ordered(node: &Value) -> Value {
    match node {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let out: Map<String, Value> = keys
                .into_iter()
                .map(|k| (k.clone(), ordered(&map[k])))
                .collect();
            Value::Object(out)
        }
        Value::Array(items) => items.iter().map(ordered).collect(),
        scalar => scalar.clone(),
    }
}
