use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const REDACTION_PLACEHOLDER: &str = "[REDACTED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflexAction {
    Redact,
    Block,
    Quarantine,
    Throttle,
}

impl ReflexAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReflexAction::Redact => "redact",
            ReflexAction::Block => "block",
            ReflexAction::Quarantine => "quarantine",
            ReflexAction::Throttle => "throttle",
        }
    }

    /// Only `block` removes an event from bidding.
    pub fn excludes_from_bidding(&self) -> bool {
        matches!(self, ReflexAction::Block)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflexRule {
    pub flag: String,
    pub action: ReflexAction,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflexVerdict {
    pub flag: String,
    pub action: ReflexAction,
    pub reason: String,
    #[serde(default)]
    pub redacted_paths: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReflexCatalog {
    rules: Vec<ReflexRule>,
    placeholder: String,
}

impl Default for ReflexCatalog {
    fn default() -> Self {
        Self::new(default_reflex_rules())
    }
}

impl ReflexCatalog {
    pub fn new(rules: Vec<ReflexRule>) -> Self {
        Self::with_placeholder(rules, REDACTION_PLACEHOLDER)
    }

    pub fn with_placeholder(rules: Vec<ReflexRule>, placeholder: impl Into<String>) -> Self {
        Self {
            rules,
            placeholder: placeholder.into(),
        }
    }

    pub fn rules(&self) -> &[ReflexRule] {
        &self.rules
    }

    /// First rule, in declaration order, whose flag is present and truthy.
    pub fn decide(&self, risk_details: &BTreeMap<String, Value>) -> Option<&ReflexRule> {
        self.rules.iter().find(|rule| {
            risk_details
                .get(&rule.flag)
                .map(is_truthy)
                .unwrap_or(false)
        })
    }

    /// Applies `rule` to `payload` and returns what was done.
    pub fn apply(&self, rule: &ReflexRule, payload: &mut Value) -> ReflexVerdict {
        let redacted_paths = match rule.action {
            ReflexAction::Redact => redact(payload, &rule.fields, &self.placeholder),
            ReflexAction::Block | ReflexAction::Quarantine | ReflexAction::Throttle => Vec::new(),
        };

        ReflexVerdict {
            flag: rule.flag.clone(),
            action: rule.action,
            reason: rule.reason.clone(),
            redacted_paths,
        }
    }
}

impl Default for ReflexRule {
    fn default() -> Self {
        Self {
            flag: "secret_token".to_string(),
            action: ReflexAction::Block,
            fields: Vec::new(),
            reason: "credential material in event payload".to_string(),
        }
    }
}

pub fn default_reflex_rules() -> Vec<ReflexRule> {
    vec![
        ReflexRule::default(),
        ReflexRule {
            flag: "pii_email".to_string(),
            action: ReflexAction::Redact,
            fields: vec!["email".to_string(), "from".to_string(), "to".to_string()],
            reason: "personal contact data".to_string(),
        },
        ReflexRule {
            flag: "untrusted_host".to_string(),
            action: ReflexAction::Quarantine,
            fields: Vec::new(),
            reason: "reference to a host outside the trusted set".to_string(),
        },
    ]
}

/// Best-effort in-place substitution of dotted paths; missing paths are skipped.
pub fn redact(payload: &mut Value, paths: &[String], placeholder: &str) -> Vec<String> {
    let mut applied = Vec::new();
    for path in paths {
        if let Some(slot) = lookup_mut(payload, path) {
            *slot = Value::String(placeholder.to_string());
            applied.push(path.clone());
        }
    }
    applied
}

fn lookup_mut<'a>(value: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    let mut current = value;
    for segment in path.split('.').filter(|segment| !segment.is_empty()) {
        current = match current {
            Value::Object(map) => map.get_mut(segment)?,
            Value::Array(items) => {
                let index = segment.parse::<usize>().ok()?;
                items.get_mut(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map(|v| v != 0.0).unwrap_or(false),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
