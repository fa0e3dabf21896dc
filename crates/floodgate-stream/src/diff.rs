//! Snapshot diffing into minimal patches, and patch replay.
//!
//! Diffs are computed over the serialized form so that applying the patch to
//! the previous serialized snapshot reproduces the next one exactly. Only
//! adjacent generations are ever compared.

use serde_json::{Map, Value};

use floodgate_gateway::model::{
    Patch, PatchOp, PatchOpKind, Taxonomy, TorrentListSnapshot,
};

/// Compute the patch transforming `prev` into `next` for the torrent map.
///
/// An added hash yields one `add` op carrying the full record; a changed
/// record yields one `replace` op per changed field; a vanished hash yields
/// one `remove` op.
#[must_use]
pub fn diff_torrents(prev: &TorrentListSnapshot, next: &TorrentListSnapshot) -> Patch {
    let prev = serialize_map(&prev.torrents);
    let next = serialize_map(&next.torrents);
    diff_nested(&prev, &next)
}

/// Compute the patch transforming `prev` into `next` for a taxonomy.
#[must_use]
pub fn diff_taxonomy(prev: &Taxonomy, next: &Taxonomy) -> Patch {
    let prev = to_object(prev);
    let next = to_object(next);
    diff_nested(&prev, &next)
}

/// Apply `patch` to a serialized snapshot in place.
///
/// Patch replay is the inverse of diffing: `apply(prev, diff(prev, next))`
/// must equal `next`. Unknown paths are ignored rather than panicking so a
/// viewer applying a stale patch degrades gracefully.
pub fn apply_patch(target: &mut Value, patch: &Patch) {
    for op in patch {
        let mut segments = op
            .path
            .split('/')
            .skip(1)
            .map(unescape_segment)
            .collect::<Vec<_>>();
        let Some(leaf) = segments.pop() else {
            continue;
        };

        let mut cursor = &mut *target;
        let mut lost = false;
        for segment in &segments {
            // Split the lookup in two to work around a borrow-checker
            // limitation with loop-carried mutable reborrows; behavior is
            // identical to a single `get_mut` navigation.
            if cursor.get_mut(segment.as_str()).is_none() {
                lost = true;
                break;
            }
            cursor = cursor.get_mut(segment.as_str()).unwrap();
        }
        if lost {
            continue;
        }
        let Some(object) = cursor.as_object_mut() else {
            continue;
        };
        match op.op {
            PatchOpKind::Add | PatchOpKind::Replace => {
                if let Some(value) = &op.value {
                    object.insert(leaf, value.clone());
                }
            }
            PatchOpKind::Remove => {
                object.remove(&leaf);
            }
        }
    }
}

fn serialize_map<T: serde::Serialize>(
    map: &std::collections::BTreeMap<String, T>,
) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            (
                key.clone(),
                serde_json::to_value(value).expect("domain values serialize"),
            )
        })
        .collect()
}

fn to_object<T: serde::Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value).expect("domain values serialize") {
        Value::Object(object) => object,
        _ => Map::new(),
    }
}

/// Diff two two-level objects: removals and additions at the first level,
/// per-key replacements one level down.
fn diff_nested(prev: &Map<String, Value>, next: &Map<String, Value>) -> Patch {
    let mut patch = Patch::new();

    for key in prev.keys() {
        if !next.contains_key(key) {
            patch.push(PatchOp {
                op: PatchOpKind::Remove,
                path: format!("/{}", escape_segment(key)),
                value: None,
            });
        }
    }

    for (key, next_value) in next {
        match prev.get(key) {
            None => patch.push(PatchOp {
                op: PatchOpKind::Add,
                path: format!("/{}", escape_segment(key)),
                value: Some(next_value.clone()),
            }),
            Some(prev_value) if prev_value == next_value => {}
            Some(prev_value) => {
                match (prev_value.as_object(), next_value.as_object()) {
                    (Some(prev_fields), Some(next_fields)) => {
                        diff_fields(key, prev_fields, next_fields, &mut patch);
                    }
                    _ => patch.push(PatchOp {
                        op: PatchOpKind::Replace,
                        path: format!("/{}", escape_segment(key)),
                        value: Some(next_value.clone()),
                    }),
                }
            }
        }
    }
    patch
}

fn diff_fields(
    key: &str,
    prev: &Map<String, Value>,
    next: &Map<String, Value>,
    patch: &mut Patch,
) {
    for field in prev.keys() {
        if !next.contains_key(field) {
            patch.push(PatchOp {
                op: PatchOpKind::Remove,
                path: format!("/{}/{}", escape_segment(key), escape_segment(field)),
                value: None,
            });
        }
    }
    for (field, next_value) in next {
        let changed = prev.get(field) != Some(next_value);
        if changed {
            patch.push(PatchOp {
                op: if prev.contains_key(field) {
                    PatchOpKind::Replace
                } else {
                    PatchOpKind::Add
                },
                path: format!("/{}/{}", escape_segment(key), escape_segment(field)),
                value: Some(next_value.clone()),
            });
        }
    }
}

fn escape_segment(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape_segment(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}
