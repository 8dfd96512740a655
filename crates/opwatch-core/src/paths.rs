//! Changed-path computation for mutation payloads.

use opwatch_proto::{Document, Shape};

/// Compute the dot paths of every leaf reachable in `payload`.
///
/// Objects are descended into, key by key, in field order. Everything else
/// (scalars, arrays, object ids, dates and other extended JSON wrappers) is
/// a leaf. A leaf at the root has no
/// path and yields nothing, as does an empty object.
///
/// Payloads are owned trees, so there are no cycles to guard against.
pub fn compute_paths(payload: &Document) -> Vec<String> {
    let mut paths = Vec::new();
    collect(payload, &mut String::new(), &mut paths);
    paths
}

fn collect(value: &Document, prefix: &mut String, out: &mut Vec<String>) {
    if value.shape() != Shape::Associative {
        if !prefix.is_empty() {
            out.push(prefix.clone());
        }
        return;
    }
    let Some(fields) = value.as_object() else {
        return;
    };

    for (key, child) in fields.iter() {
        let restore = prefix.len();
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(key);
        collect(child, prefix, out);
        prefix.truncate(restore);
    }
}
