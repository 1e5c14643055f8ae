use std::{
    collections::BTreeMap,
    fs,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use jsonschema::{JSONSchema, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    bidding::{BiddingPolicy, ProbePlanner, UtilityWeights},
    collaborators::PolicyHints,
    gap::{CapabilitySpec, GapResolution, GapThresholds},
    reflex::{REDACTION_PLACEHOLDER, ReflexRule, default_reflex_rules},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub r#loop: LoopConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub salience: SalienceConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub field: FieldConfig,
    #[serde(default)]
    pub bidding: BiddingConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub gap: GapConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub reflex: ReflexConfig,
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<CapabilitySpec>,
    #[serde(default)]
    pub policy: PolicyHints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
            r#loop: LoopConfig::default(),
            budget: BudgetConfig::default(),
            salience: SalienceConfig::default(),
            calibration: CalibrationConfig::default(),
            field: FieldConfig::default(),
            bidding: BiddingConfig::default(),
            market: MarketConfig::default(),
            gap: GapConfig::default(),
            dispatch: DispatchConfig::default(),
            ledger: LedgerConfig::default(),
            reflex: ReflexConfig::default(),
            capabilities: default_capabilities(),
            policy: PolicyHints::default(),
        }
    }
}

fn default_enabled_true() -> bool {
    true
}

fn default_logging_dir() -> PathBuf {
    PathBuf::from("./logs/vigil")
}

fn default_logging_filter() -> String {
    "info".to_string()
}

fn default_logging_rotation() -> LoggingRotation {
    LoggingRotation::Daily
}

fn default_logging_retention_days() -> usize {
    14
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_logging_filter")]
    pub filter: String,
    #[serde(default = "default_logging_rotation")]
    pub rotation: LoggingRotation,
    #[serde(default = "default_logging_retention_days")]
    pub retention_days: usize,
    #[serde(default = "default_enabled_true")]
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_logging_dir(),
            filter: default_logging_filter(),
            rotation: default_logging_rotation(),
            retention_days: default_logging_retention_days(),
            stderr_warn_enabled: true,
        }
    }
}

fn default_metrics_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9464)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_listen_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TickMissedBehavior {
    Skip,
}

fn default_event_queue_capacity() -> usize {
    256
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_tick_missed_behavior() -> TickMissedBehavior {
    TickMissedBehavior::Skip
}

fn default_max_batch_size() -> usize {
    64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_tick_missed_behavior")]
    pub tick_missed_behavior: TickMissedBehavior,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: default_event_queue_capacity(),
            tick_interval_ms: default_tick_interval_ms(),
            tick_missed_behavior: default_tick_missed_behavior(),
            max_batch_size: default_max_batch_size(),
        }
    }
}

fn default_pool_ms() -> u64 {
    1_000
}

fn default_tempo_alpha() -> f64 {
    crate::budget::DEFAULT_TEMPO_ALPHA
}

fn default_max_reserve_frac() -> f64 {
    crate::budget::DEFAULT_MAX_RESERVE_FRAC
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_pool_ms")]
    pub pool_ms: u64,
    #[serde(default = "default_tempo_alpha")]
    pub tempo_alpha: f64,
    #[serde(default = "default_max_reserve_frac")]
    pub max_reserve_frac: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            pool_ms: default_pool_ms(),
            tempo_alpha: default_tempo_alpha(),
            max_reserve_frac: default_max_reserve_frac(),
        }
    }
}

fn default_gate_seed() -> u64 {
    0x5eed
}

fn default_t_min() -> f64 {
    0.5
}

fn default_t_max() -> f64 {
    2.0
}

fn default_curiosity() -> f64 {
    0.5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalienceConfig {
    #[serde(default = "default_gate_seed")]
    pub gate_seed: u64,
    #[serde(default = "default_t_min")]
    pub t_min: f64,
    #[serde(default = "default_t_max")]
    pub t_max: f64,
    /// Used when the policy service supplies no curiosity signal.
    #[serde(default = "default_curiosity")]
    pub curiosity: f64,
    #[serde(default)]
    pub keyword_priors: BTreeMap<String, f64>,
    #[serde(default)]
    pub host_priors: BTreeMap<String, f64>,
}

impl Default for SalienceConfig {
    fn default() -> Self {
        Self {
            gate_seed: default_gate_seed(),
            t_min: default_t_min(),
            t_max: default_t_max(),
            curiosity: default_curiosity(),
            keyword_priors: BTreeMap::new(),
            host_priors: BTreeMap::new(),
        }
    }
}

fn default_history_capacity() -> usize {
    crate::calibration::DEFAULT_HISTORY_CAPACITY
}

fn default_alpha() -> f64 {
    crate::calibration::DEFAULT_ALPHA
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            alpha: default_alpha(),
        }
    }
}

fn default_diffusion() -> f64 {
    crate::field::DEFAULT_DIFFUSION_COEFFICIENT
}

fn default_leak_gamma() -> f64 {
    0.05
}

fn default_hotspot_threshold() -> f64 {
    crate::field::DEFAULT_HOTSPOT_THRESHOLD
}

fn default_hotspot_bonus() -> f64 {
    0.25
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    #[serde(default = "default_diffusion")]
    pub diffusion: f64,
    #[serde(default = "default_leak_gamma")]
    pub leak_gamma: f64,
    #[serde(default = "default_hotspot_threshold")]
    pub hotspot_threshold: f64,
    #[serde(default = "default_hotspot_bonus")]
    pub hotspot_bonus: f64,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            diffusion: default_diffusion(),
            leak_gamma: default_leak_gamma(),
            hotspot_threshold: default_hotspot_threshold(),
            hotspot_bonus: default_hotspot_bonus(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BiddingConfig {
    #[serde(default)]
    pub policy: BiddingPolicy,
    #[serde(default)]
    pub weights: UtilityWeights,
    #[serde(default)]
    pub min_utility: f64,
    #[serde(default)]
    pub probes: ProbePlanner,
}

fn default_market_strategy() -> String {
    "pareto_knee".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_market_strategy")]
    pub strategy: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            strategy: default_market_strategy(),
        }
    }
}

fn default_outcome_window() -> usize {
    crate::gap::DEFAULT_OUTCOME_WINDOW
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapConfig {
    #[serde(default)]
    pub thresholds: GapThresholds,
    #[serde(default = "default_outcome_window")]
    pub outcome_window: usize,
    /// Local synthesis table: missing capability to its realization.
    #[serde(default)]
    pub substitutes: BTreeMap<String, GapResolution>,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            thresholds: GapThresholds::default(),
            outcome_window: default_outcome_window(),
            substitutes: BTreeMap::new(),
        }
    }
}

fn default_slack_ms() -> u64 {
    250
}

fn default_collaborator_timeout_ms() -> u64 {
    2_000
}

fn default_token_ttl_ms() -> u64 {
    60_000
}

fn default_token_issuer() -> String {
    "vigil".to_string()
}

fn default_token_audience() -> String {
    "execution-mesh".to_string()
}

fn default_token_key_id() -> String {
    "local-1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_slack_ms")]
    pub slack_ms: u64,
    #[serde(default = "default_collaborator_timeout_ms")]
    pub collaborator_timeout_ms: u64,
    #[serde(default = "default_token_ttl_ms")]
    pub token_ttl_ms: u64,
    #[serde(default)]
    pub shadow_enabled: bool,
    #[serde(default = "default_token_issuer")]
    pub token_issuer: String,
    #[serde(default = "default_token_audience")]
    pub token_audience: String,
    #[serde(default = "default_token_key_id")]
    pub token_key_id: String,
    #[serde(default)]
    pub token_secret: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            slack_ms: default_slack_ms(),
            collaborator_timeout_ms: default_collaborator_timeout_ms(),
            token_ttl_ms: default_token_ttl_ms(),
            shadow_enabled: false,
            token_issuer: default_token_issuer(),
            token_audience: default_token_audience(),
            token_key_id: default_token_key_id(),
            token_secret: String::new(),
        }
    }
}

fn default_ledger_dir() -> PathBuf {
    PathBuf::from("./ledger")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_dir")]
    pub dir: PathBuf,
    /// Switches record digests to keyed BLAKE3.
    #[serde(default)]
    pub hash_key: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dir: default_ledger_dir(),
            hash_key: None,
        }
    }
}

fn default_placeholder() -> String {
    REDACTION_PLACEHOLDER.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflexConfig {
    #[serde(default = "default_reflex_rules")]
    pub rules: Vec<ReflexRule>,
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for ReflexConfig {
    fn default() -> Self {
        Self {
            rules: default_reflex_rules(),
            placeholder: default_placeholder(),
        }
    }
}

pub fn default_capabilities() -> Vec<CapabilitySpec> {
    [
        crate::bidding::FETCH_CAPABILITY,
        crate::bidding::LOOKUP_CAPABILITY,
        crate::bidding::SEARCH_CAPABILITY,
    ]
    .into_iter()
    .map(|name| CapabilitySpec {
        idempotent: true,
        ..CapabilitySpec::named(name)
    })
    .collect()
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config_value: Value = json5::from_str(&config_content)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;

        let config_base = config_path.parent().unwrap_or_else(|| Path::new("."));
        let schema_path = resolve_schema_path(config_base, &config_value)?;
        validate_against_schema(&config_value, &schema_path)?;

        let mut config: Config =
            serde_json::from_value(config_value).context("failed to deserialize vigil config")?;

        if !config.ledger.dir.is_absolute() {
            config.ledger.dir = config_base.join(&config.ledger.dir);
        }
        if config.salience.t_max < config.salience.t_min {
            return Err(anyhow!(
                "salience.t_max ({}) must not be below salience.t_min ({})",
                config.salience.t_max,
                config.salience.t_min
            ));
        }

        Ok(config)
    }
}

fn resolve_schema_path(config_base: &Path, config_value: &Value) -> Result<PathBuf> {
    if let Some(path_text) = config_value.get("$schema").and_then(|value| value.as_str()) {
        let configured = PathBuf::from(path_text);
        if configured.is_absolute() {
            return Ok(configured);
        }
        return Ok(config_base.join(&configured));
    }

    let local_default = config_base.join("vigil.schema.json");
    if local_default.exists() {
        return Ok(local_default);
    }

    Err(anyhow!(
        "unable to resolve schema path: expected $schema in config or vigil.schema.json"
    ))
}

fn validate_against_schema(config_value: &Value, schema_path: &Path) -> Result<()> {
    let schema_content = fs::read_to_string(schema_path)
        .with_context(|| format!("failed to read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_content)
        .with_context(|| format!("failed to parse schema {}", schema_path.display()))?;

    let compiled =
        JSONSchema::compile(&schema).map_err(|e| anyhow!("failed to compile schema: {e}"))?;

    match compiled.validate(config_value) {
        Ok(()) => Ok(()),
        Err(errors_iter) => {
            let validation_errors: Vec<ValidationError> = errors_iter.collect();
            let messages: Vec<String> = validation_errors
                .into_iter()
                .map(|error| error.to_string())
                .collect();
            Err(anyhow!("config validation failed: {}", messages.join("; ")))
        }
    }
}
