//! Structural delta pass over canonical world JSON.
//!
//! Elements are encoded as patches against the element before them, and each
//! branch timeline the same way (event against previous event). Worlds full
//! of near-identical elements shrink to their differences.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const FORMAT: u32 = 1;

/// Recursive difference between two JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Patch {
    #[serde(rename = "s")]
    Same,
    #[serde(rename = "=")]
    Replace(Value),
    /// Changed keys, then removed keys.
    #[serde(rename = "~")]
    Merge(BTreeMap<String, Patch>, Vec<String>),
}

#[derive(Debug, Serialize, Deserialize)]
struct DeltaDocument {
    #[serde(rename = "f")]
    format: u32,
    /// The document with `elements` and every branch `timeline` removed.
    #[serde(rename = "b")]
    base: Value,
    #[serde(rename = "e")]
    elements: Option<Vec<Patch>>,
    /// One entry per branch in `base`, `None` where the branch had no timeline.
    #[serde(rename = "t")]
    timelines: Vec<Option<Vec<Patch>>>,
}

pub(crate) fn encode(input: &[u8]) -> Result<Vec<u8>, String> {
    let mut root: Value = serde_json::from_slice(input).map_err(|e| e.to_string())?;

    let (elements, timelines) = match root.as_object_mut() {
        Some(object) => {
            let elements = object
                .remove("elements")
                .map(|value| take_array(value).map(|items| diff_chain(&items)))
                .transpose()?;
            let timelines = match object.get_mut("branches").and_then(Value::as_array_mut) {
                Some(branches) => branches
                    .iter_mut()
                    .map(|branch| {
                        branch
                            .as_object_mut()
                            .and_then(|b| b.remove("timeline"))
                            .map(|value| take_array(value).map(|items| diff_chain(&items)))
                            .transpose()
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                None => Vec::new(),
            };
            (elements, timelines)
        }
        None => (None, Vec::new()),
    };

    let document = DeltaDocument {
        format: FORMAT,
        base: root,
        elements,
        timelines,
    };
    serde_json::to_vec(&document).map_err(|e| e.to_string())
}

pub(crate) fn decode(input: &[u8]) -> Result<Vec<u8>, String> {
    let document: DeltaDocument =
        serde_json::from_slice(input).map_err(|e| format!("not a delta document: {e}"))?;
    if document.format != FORMAT {
        return Err(format!("unknown delta format {}", document.format));
    }

    let mut root = document.base;
    if let Some(patches) = document.elements {
        let object = root
            .as_object_mut()
            .ok_or("delta base is not an object")?;
        object.insert("elements".into(), Value::Array(apply_chain(&patches)?));
    }

    if !document.timelines.is_empty() {
        let branches = root
            .get_mut("branches")
            .and_then(Value::as_array_mut)
            .ok_or("timelines present without branches")?;
        if branches.len() != document.timelines.len() {
            return Err(format!(
                "{} timelines for {} branches",
                document.timelines.len(),
                branches.len()
            ));
        }
        for (branch, timeline) in branches.iter_mut().zip(document.timelines) {
            let Some(patches) = timeline else { continue };
            let branch = branch
                .as_object_mut()
                .ok_or("branch entry is not an object")?;
            branch.insert("timeline".into(), Value::Array(apply_chain(&patches)?));
        }
    }

    serde_json::to_vec(&root).map_err(|e| e.to_string())
}

fn take_array(value: Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(format!("expected array, found {other}")),
    }
}

fn diff_chain(items: &[Value]) -> Vec<Patch> {
    let mut previous = &Value::Null;
    items
        .iter()
        .map(|item| {
            let patch = diff(previous, item);
            previous = item;
            patch
        })
        .collect()
}

fn apply_chain(patches: &[Patch]) -> Result<Vec<Value>, String> {
    let mut items: Vec<Value> = Vec::with_capacity(patches.len());
    for patch in patches {
        let previous = items.last().unwrap_or(&Value::Null);
        let next = apply(previous, patch)?;
        items.push(next);
    }
    Ok(items)
}

fn diff(from: &Value, to: &Value) -> Patch {
    if from == to {
        return Patch::Same;
    }
    let (Value::Object(old), Value::Object(new)) = (from, to) else {
        return Patch::Replace(to.clone());
    };

    let changed = new
        .iter()
        .filter_map(|(key, value)| match old.get(key) {
            Some(previous) if previous == value => None,
            Some(previous) => Some((key.clone(), diff(previous, value))),
            None => Some((key.clone(), Patch::Replace(value.clone()))),
        })
        .collect();
    let removed = old
        .keys()
        .filter(|key| !new.contains_key(*key))
        .cloned()
        .collect();
    Patch::Merge(changed, removed)
}

fn apply(base: &Value, patch: &Patch) -> Result<Value, String> {
    match patch {
        Patch::Same => Ok(base.clone()),
        Patch::Replace(value) => Ok(value.clone()),
        Patch::Merge(changed, removed) => {
            let Value::Object(object) = base else {
                return Err("merge patch against non-object".into());
            };
            let mut merged: Map<String, Value> = object.clone();
            for key in removed {
                merged.remove(key);
            }
            for (key, child) in changed {
                let current = merged.get(key).unwrap_or(&Value::Null);
                let next = apply(current, child)?;
                merged.insert(key.clone(), next);
            }
            Ok(Value::Object(merged))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roundtrip(value: &Value) -> Value {
        let input = serde_json::to_vec(value).unwrap();
        let encoded = encode(&input).unwrap();
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, input, "delta decode must be byte-exact on canonical input");
        serde_json::from_slice(&decoded).unwrap()
    }

    #[test]
    fn similar_elements_become_small_patches() {
        let elements: Vec<Value> = (0..30)
            .map(|i| {
                json!({
                    "id": format!("e{i}"),
                    "type": "lamp",
                    "position": [i, 0, 0],
                    "properties": {
                        "lighting": {"intensity": 0.8, "color": "#ffeecc", "radius": 12},
                        "physics": {"mass": 2.5, "friction": 0.4, "static": true},
                        "behavior": {"flicker": false, "schedule": "dusk-to-dawn"}
                    }
                })
            })
            .collect();
        let doc = json!({"metadata": {"id": "w"}, "elements": elements, "branches": []});
        let input = serde_json::to_vec(&doc).unwrap();
        let encoded = encode(&input).unwrap();
        assert!(encoded.len() < input.len() / 2);
        assert_eq!(roundtrip(&doc), doc);
    }

    #[test]
    fn timelines_and_removed_keys_survive() {
        let doc = json!({
            "elements": [
                {"id": "a", "extra": true, "nested": {"x": 1, "y": 2}},
                {"id": "b", "nested": {"x": 1}},
                {"id": "c", "nested": 5}
            ],
            "branches": [
                {"id": "main", "timeline": [{"id": "t1", "action": "add"}, {"id": "t2", "action": "add"}]},
                {"id": "empty"}
            ]
        });
        assert_eq!(roundtrip(&doc), doc);
    }

    #[test]
    fn non_object_roots_pass_through() {
        assert_eq!(roundtrip(&json!([1, 2, 3])), json!([1, 2, 3]));
        assert_eq!(roundtrip(&json!({"branches": "odd"})), json!({"branches": "odd"}));
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode(b"\x28\xb5\x2f\xfd garbage").is_err());
        assert!(decode(br#"{"f":1,"b":[],"e":[{"=":1}],"t":[]}"#).is_err());
        assert!(decode(br#"{"f":1,"b":{},"e":[{"~":[{},[]]}],"t":[]}"#).is_err());
    }
}
