use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

pub type CycleId = u64;
pub type EventId = String;
pub type DecisionId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub source: String,
    pub event_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub observed_at_ms: i64,
}

/// Normalized form of an [`Event`] that every scoring stage reads.
///
/// Text blocks and numeric features are collected from the payload leaves in
/// sorted dotted-path order, so two payloads that differ only in key order
/// canonicalize identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub event_id: EventId,
    pub source: String,
    pub event_type: String,
    pub text_blocks: Vec<String>,
    pub numeric_features: BTreeMap<String, f64>,
    pub content_hash: String,
    pub observed_at_ms: i64,
}

impl CanonicalEvent {
    pub fn text_len(&self) -> usize {
        self.text_blocks.iter().map(|block| block.len()).sum()
    }

    pub fn joined_text(&self) -> String {
        self.text_blocks.join("\n")
    }
}

pub fn canonicalize(event: &Event) -> CanonicalEvent {
    let mut text_blocks = Vec::new();
    let mut numeric_features = BTreeMap::new();
    collect_leaves("", &event.payload, &mut text_blocks, &mut numeric_features);

    let canonical = canonicalize_json(&serde_json::json!({
        "source": event.source,
        "event_type": event.event_type,
        "payload": event.payload,
    }));
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    let content_hash = format!("{:x}", hasher.finalize());

    CanonicalEvent {
        event_id: event.id.clone(),
        source: event.source.clone(),
        event_type: event.event_type.clone(),
        text_blocks,
        numeric_features,
        content_hash,
        observed_at_ms: event.observed_at_ms,
    }
}

fn collect_leaves(
    path: &str,
    value: &Value,
    text_blocks: &mut Vec<String>,
    numeric_features: &mut BTreeMap<String, f64>,
) {
    match value {
        Value::Object(map) => {
            let mut keys = map.keys().collect::<Vec<_>>();
            keys.sort();
            for key in keys {
                let child_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}.{key}")
                };
                if let Some(child) = map.get(key) {
                    collect_leaves(&child_path, child, text_blocks, numeric_features);
                }
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_leaves(
                    &format!("{path}.{index}"),
                    item,
                    text_blocks,
                    numeric_features,
                );
            }
        }
        Value::String(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                text_blocks.push(trimmed.to_string());
            }
        }
        Value::Number(number) => {
            if let Some(value) = number.as_f64() {
                numeric_features.insert(path.to_string(), value);
            }
        }
        Value::Bool(flag) => {
            numeric_features.insert(path.to_string(), if *flag { 1.0 } else { 0.0 });
        }
        Value::Null => {}
    }
}

pub fn canonicalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys = map.keys().cloned().collect::<Vec<_>>();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(item) = map.get(&key) {
                    sorted.insert(key, canonicalize_json(item));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize_json).collect()),
        primitive => primitive.clone(),
    }
}

pub fn now_unix_ms() -> i64 {
    let now = time::OffsetDateTime::now_utc();
    (now.unix_timestamp_nanos() / 1_000_000) as i64
}
