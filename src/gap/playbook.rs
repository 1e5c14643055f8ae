use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gap::rollback::CriticalReview;

/// Result of capability-gap synthesis, merged back into the winning intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GapResolution {
    pub capability: Option<String>,
    #[serde(default)]
    pub driver: Value,
    /// Rate limits, redactions, safety lists and pre/postcondition atoms.
    #[serde(default)]
    pub playbook: Value,
    /// Critique of the realized capability, fed into rollback synthesis.
    #[serde(default)]
    pub review: Option<CriticalReview>,
}

/// Deep merge of `patch` into `target`: arrays append, objects merge key by
/// key, anything else overwrites. A null patch is a no-op.
pub fn merge_playbook(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (_, Value::Null) => {}
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => merge_playbook(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (Value::Array(target), Value::Array(patch)) => {
            target.extend(patch.iter().cloned());
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Applies a synthesis result to an intent: the realized capability replaces
/// the target and the playbook and driver binding land in the constraints.
pub fn apply_resolution(capability: &mut String, constraints: &mut Value, resolution: &GapResolution) {
    if let Some(realized) = resolution.capability.as_deref()
        && !realized.trim().is_empty()
    {
        *capability = realized.to_string();
    }
    if constraints.is_null() {
        *constraints = Value::Object(serde_json::Map::new());
    }
    merge_playbook(constraints, &resolution.playbook);
    if !resolution.driver.is_null() {
        merge_playbook(constraints, &serde_json::json!({ "driver": resolution.driver }));
    }
}
