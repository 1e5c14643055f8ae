use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const DEFERRED_REFERENCE_KEY: &str = "$from_result";

fn default_success_path() -> String {
    "status".to_string()
}

fn default_success_value() -> Value {
    Value::String("ok".to_string())
}

/// Declared shape of a capability, as configured in the capability registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySpec {
    pub name: String,
    #[serde(default)]
    pub idempotent: bool,
    #[serde(default)]
    pub rollback_capability: Option<String>,
    /// Rollback param name to dotted path in the forward result.
    #[serde(default)]
    pub reverse_params: BTreeMap<String, String>,
    #[serde(default)]
    pub guards: Vec<Condition>,
    #[serde(default = "default_success_path")]
    pub success_path: String,
    #[serde(default = "default_success_value")]
    pub success_value: Value,
}

impl CapabilitySpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            idempotent: false,
            rollback_capability: None,
            reverse_params: BTreeMap::new(),
            guards: Vec::new(),
            success_path: default_success_path(),
            success_value: default_success_value(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOp {
    Eq,
    Ne,
    Exists,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub path: String,
    pub op: ConditionOp,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn eq(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            op: ConditionOp::Eq,
            value,
        }
    }

    pub fn holds(&self, document: &Value) -> bool {
        let found = lookup_path(document, &self.path);
        match self.op {
            ConditionOp::Eq => found == Some(&self.value),
            ConditionOp::Ne => found != Some(&self.value),
            ConditionOp::Exists => found.is_some_and(|value| !value.is_null()),
        }
    }
}

/// Reviewer feedback on a forward action; may name a rollback capability the
/// capability declaration lacks, and add guards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CriticalReview {
    #[serde(default)]
    pub rollback_capability: Option<String>,
    #[serde(default)]
    pub guards: Vec<Condition>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackContract {
    pub capability: Option<String>,
    pub params: Map<String, Value>,
    pub preconditions: Vec<Condition>,
    pub postconditions: Vec<Condition>,
    pub meta: Value,
}

impl RollbackContract {
    pub fn noop(reason: &str) -> Self {
        Self {
            capability: None,
            params: Map::new(),
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            meta: json!({ "noop": true, "reason": reason }),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.capability.is_none()
    }
}

pub fn default_guards() -> Vec<Condition> {
    vec![
        Condition {
            path: "forward.dispatched".to_string(),
            op: ConditionOp::Eq,
            value: Value::Bool(true),
        },
        Condition {
            path: "forward.status".to_string(),
            op: ConditionOp::Ne,
            value: Value::String("rolled_back".to_string()),
        },
    ]
}

/// Builds the rollback contract attached to an outgoing intent. Never executed here.
pub fn synthesize_rollback(
    spec: &CapabilitySpec,
    review: Option<&CriticalReview>,
    last_result: Option<&Value>,
) -> RollbackContract {
    let explicit = spec
        .rollback_capability
        .clone()
        .or_else(|| review.and_then(|review| review.rollback_capability.clone()))
        .filter(|capability| !capability.trim().is_empty());

    let Some(capability) = explicit else {
        let reason = if spec.idempotent {
            "idempotent_forward_action"
        } else {
            "no_rollback_capability"
        };
        return RollbackContract::noop(reason);
    };

    let mut params = Map::new();
    let mut deferred = Vec::new();
    for (name, path) in &spec.reverse_params {
        match last_result.and_then(|result| lookup_path(result, path)) {
            Some(value) => {
                params.insert(name.clone(), value.clone());
            }
            None => {
                params.insert(name.clone(), json!({ DEFERRED_REFERENCE_KEY: path }));
                deferred.push(path.clone());
            }
        }
    }

    let mut preconditions = spec.guards.clone();
    if let Some(review) = review {
        preconditions.extend(review.guards.iter().cloned());
    }
    preconditions.extend(default_guards());

    let postconditions = vec![Condition::eq(spec.success_path.clone(), spec.success_value.clone())];

    RollbackContract {
        capability: Some(capability),
        params,
        preconditions,
        postconditions,
        meta: json!({
            "forward_capability": spec.name,
            "deferred_params": deferred,
            "review_notes": review.and_then(|review| review.notes.clone()),
        }),
    }
}

/// Resolves a dotted path (`a.b.0.c`) against a JSON document.
pub fn lookup_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(document);
    }
    path.split('.').try_fold(document, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|index| items.get(index)),
        _ => None,
    })
}
