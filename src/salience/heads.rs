use std::{
    collections::{BTreeMap, BTreeSet},
    sync::OnceLock,
};

use regex::Regex;
use serde_json::{Value, json};

use crate::{
    salience::types::PriorSnapshot,
    types::CanonicalEvent,
};

pub const RELEVANCE_HEAD: &str = "relevance";
pub const RISK_HEAD: &str = "risk";
pub const NOVELTY_HEAD: &str = "novelty";
pub const URGENCY_HEAD: &str = "urgency";

const URGENCY_TERMS: &[&str] = &[
    "urgent", "critical", "outage", "down", "breach", "incident", "asap", "failure", "error",
];
const UNTRUSTED_HOST_TRUST: f64 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub struct HeadOutput {
    pub raw: f64,
    pub detail: BTreeMap<String, Value>,
}

/// The fixed set of salience heads. Heads read only the event and the prior
/// snapshot, so any subset can be scored concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SalienceHead {
    Relevance,
    Risk,
    Novelty,
    Urgency,
}

impl SalienceHead {
    pub fn default_set() -> Vec<SalienceHead> {
        vec![
            SalienceHead::Relevance,
            SalienceHead::Risk,
            SalienceHead::Novelty,
            SalienceHead::Urgency,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            SalienceHead::Relevance => RELEVANCE_HEAD,
            SalienceHead::Risk => RISK_HEAD,
            SalienceHead::Novelty => NOVELTY_HEAD,
            SalienceHead::Urgency => URGENCY_HEAD,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            RELEVANCE_HEAD => Some(SalienceHead::Relevance),
            RISK_HEAD => Some(SalienceHead::Risk),
            NOVELTY_HEAD => Some(SalienceHead::Novelty),
            URGENCY_HEAD => Some(SalienceHead::Urgency),
            _ => None,
        }
    }

    pub fn score(&self, event: &CanonicalEvent, priors: &PriorSnapshot) -> HeadOutput {
        let output = match self {
            SalienceHead::Relevance => score_relevance(event, priors),
            SalienceHead::Risk => score_risk(event, priors),
            SalienceHead::Novelty => score_novelty(event, priors),
            SalienceHead::Urgency => score_urgency(event),
        };
        HeadOutput {
            raw: sanitize_unit(output.raw),
            detail: output.detail,
        }
    }
}

fn score_relevance(event: &CanonicalEvent, priors: &PriorSnapshot) -> HeadOutput {
    let schema_match = priors
        .schema_matches
        .get(&event.event_id)
        .copied()
        .map(sanitize_unit)
        .unwrap_or(0.0);

    let text = event.joined_text().to_lowercase();
    let mut miss_product = 1.0;
    let mut keyword_hits = Vec::new();
    for (keyword, weight) in &priors.keyword_priors {
        if !keyword.is_empty() && text.contains(keyword.as_str()) {
            miss_product *= 1.0 - sanitize_unit(*weight);
            keyword_hits.push(keyword.clone());
        }
    }
    let keyword_score = 1.0 - miss_product;

    HeadOutput {
        raw: schema_match.max(keyword_score),
        detail: BTreeMap::from([
            ("schema_match".to_string(), json!(schema_match)),
            ("keyword_score".to_string(), json!(keyword_score)),
            ("keyword_hits".to_string(), json!(keyword_hits)),
        ]),
    }
}

fn score_risk(event: &CanonicalEvent, priors: &PriorSnapshot) -> HeadOutput {
    let text = event.joined_text();
    let mut detail = BTreeMap::new();
    let mut miss_product = 1.0;

    if secret_pattern().is_match(&text) {
        detail.insert("secret_token".to_string(), json!(true));
        miss_product *= 1.0 - 0.8;
    }
    if email_pattern().is_match(&text) {
        detail.insert("pii_email".to_string(), json!(true));
        miss_product *= 1.0 - 0.4;
    }

    let hosts = extract_hosts(&text);
    if !priors.host_priors.is_empty() {
        let untrusted = hosts
            .iter()
            .filter(|host| {
                priors
                    .host_priors
                    .get(host.as_str())
                    .is_none_or(|trust| *trust < UNTRUSTED_HOST_TRUST)
            })
            .cloned()
            .collect::<Vec<_>>();
        if !untrusted.is_empty() {
            detail.insert("untrusted_host".to_string(), json!(true));
            detail.insert("untrusted_hosts".to_string(), json!(untrusted));
            miss_product *= 1.0 - 0.3;
        }
    }

    let severity = event
        .numeric_features
        .iter()
        .find(|(path, _)| path.rsplit('.').next() == Some("severity"))
        .map(|(_, value)| if *value > 1.0 { value / 10.0 } else { *value })
        .map(sanitize_unit)
        .unwrap_or(0.0);
    if severity > 0.0 {
        detail.insert("severity".to_string(), json!(severity));
        miss_product *= 1.0 - severity;
    }

    HeadOutput {
        raw: 1.0 - miss_product,
        detail,
    }
}

fn score_novelty(event: &CanonicalEvent, priors: &PriorSnapshot) -> HeadOutput {
    let tokens = tokenize(&event.joined_text());
    let unique = tokens.iter().collect::<BTreeSet<_>>().len();
    let familiarity = priors
        .schema_matches
        .get(&event.event_id)
        .copied()
        .map(sanitize_unit)
        .unwrap_or(0.0);

    let raw = if tokens.is_empty() {
        0.0
    } else {
        (unique as f64 / tokens.len() as f64) * (1.0 - familiarity)
    };

    HeadOutput {
        raw,
        detail: BTreeMap::from([
            ("tokens".to_string(), json!(tokens.len())),
            ("unique_tokens".to_string(), json!(unique)),
            ("familiarity".to_string(), json!(familiarity)),
        ]),
    }
}

fn score_urgency(event: &CanonicalEvent) -> HeadOutput {
    let tokens = tokenize(&event.joined_text());
    let hits = tokens
        .iter()
        .filter(|token| URGENCY_TERMS.contains(&token.as_str()))
        .count();

    HeadOutput {
        raw: 1.0 - 0.7_f64.powi(hits as i32),
        detail: BTreeMap::from([("urgency_hits".to_string(), json!(hits))]),
    }
}

pub fn extract_hosts(text: &str) -> Vec<String> {
    let mut hosts = host_pattern()
        .captures_iter(text)
        .filter_map(|captures| captures.get(1))
        .map(|host| host.as_str().to_ascii_lowercase())
        .collect::<Vec<_>>();
    hosts.sort();
    hosts.dedup();
    hosts
}

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
        .collect()
}

fn sanitize_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn secret_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(api[_-]?key|secret|password|bearer\s+[a-z0-9._-]{8,}|sk-[a-z0-9]{16,})")
            .expect("secret pattern is a valid regex")
    })
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
            .expect("email pattern is a valid regex")
    })
}

fn host_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)https?://([a-z0-9.-]+)").expect("host pattern is a valid regex")
    })
}
