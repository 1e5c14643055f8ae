pub mod catalog;

pub use catalog::{
    REDACTION_PLACEHOLDER, ReflexAction, ReflexCatalog, ReflexRule, ReflexVerdict,
    default_reflex_rules, redact,
};
