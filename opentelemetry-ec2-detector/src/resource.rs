//! Attribute-merge helper shared by the detection pipeline.

use opentelemetry::{KeyValue, Value};
use opentelemetry_sdk::Resource;

/// Returns a present-but-empty resource, as opposed to an absent one.
pub(crate) fn empty_resource() -> Resource {
    Resource::builder_empty().build()
}

/// An empty string value carries no information and must never displace an
/// attribute that is already set.
fn is_empty_value(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.as_str().is_empty())
}

/// Merges `incoming` attributes over `base`, right-biased: on key collision
/// the incoming value wins. Incoming attributes with empty string values are
/// no-op contributions; they neither insert nor overwrite. An absent (`None`)
/// base behaves like an empty one.
pub(crate) fn merge_attributes<I>(base: Option<&Resource>, incoming: I) -> Resource
where
    I: IntoIterator<Item = KeyValue>,
{
    let mut merged: Vec<KeyValue> = base
        .map(|res| {
            res.iter()
                .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    for incoming_kv in incoming {
        if is_empty_value(&incoming_kv.value) {
            continue;
        }
        match merged.iter_mut().find(|kv| kv.key == incoming_kv.key) {
            Some(existing) => existing.value = incoming_kv.value,
            None => merged.push(incoming_kv),
        }
    }

    Resource::builder_empty().with_attributes(merged).build()
}
