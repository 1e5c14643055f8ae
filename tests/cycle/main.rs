use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;
use vigil::{
    bidding::SEARCH_CAPABILITY,
    collaborators::{
        CollaboratorError, Collaborators, DeliberationPort, DispatchedIntent, Escalation,
        EscalationReason, ExecutionPort, ExecutionResult, KnowledgeGraphPort, OutcomeReport,
        PolicyHints, PolicyHintsPort, SchemaPriorPort, unavailable,
    },
    config::Config,
    cycle::{DecisionCycle, EventDisposition},
    field::Adjacency,
    gap::{CapabilitySpec, CriticalReview, GapResolution, GapTrigger},
    ledger::RecordKind,
    salience::PriorSnapshot,
    types::{CanonicalEvent, CycleId, Event},
};

fn test_config() -> Config {
    let mut config = Config::default();
    config.ledger.dir = std::env::temp_dir().join(format!("vigil-cycle-test-{}", Uuid::now_v7()));
    config.dispatch.collaborator_timeout_ms = 200;
    config
}

fn cleanup(config: &Config) {
    let _ = std::fs::remove_dir_all(&config.ledger.dir);
}

fn event(id: &str, text: &str) -> Event {
    Event {
        id: id.to_string(),
        source: "ops-feed".to_string(),
        event_type: "message".to_string(),
        payload: json!({ "body": text }),
        observed_at_ms: 1_700_000_000_000,
    }
}

#[derive(Default)]
struct RecordingDeliberation {
    received: Mutex<Vec<Escalation>>,
}

impl RecordingDeliberation {
    fn reasons(&self) -> Vec<EscalationReason> {
        self.received
            .lock()
            .expect("lock")
            .iter()
            .map(|escalation| escalation.reason)
            .collect()
    }
}

#[async_trait]
impl DeliberationPort for RecordingDeliberation {
    async fn escalate(&self, escalation: Escalation) -> Result<(), CollaboratorError> {
        self.received.lock().expect("lock").push(escalation);
        Ok(())
    }
}

struct FailingPolicy;

#[async_trait]
impl PolicyHintsPort for FailingPolicy {
    async fn hints(&self, _cycle_id: CycleId) -> Result<PolicyHints, CollaboratorError> {
        Err(unavailable("policy service offline"))
    }

    async fn report_outcome(&self, _report: OutcomeReport) -> Result<(), CollaboratorError> {
        Err(unavailable("policy service offline"))
    }
}

struct SlowPolicy;

#[async_trait]
impl PolicyHintsPort for SlowPolicy {
    async fn hints(&self, _cycle_id: CycleId) -> Result<PolicyHints, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(PolicyHints::default())
    }

    async fn report_outcome(&self, _report: OutcomeReport) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

#[derive(Default)]
struct HintedPolicy {
    hints: PolicyHints,
    reports: Mutex<Vec<OutcomeReport>>,
}

#[async_trait]
impl PolicyHintsPort for HintedPolicy {
    async fn hints(&self, _cycle_id: CycleId) -> Result<PolicyHints, CollaboratorError> {
        Ok(self.hints.clone())
    }

    async fn report_outcome(&self, report: OutcomeReport) -> Result<(), CollaboratorError> {
        self.reports.lock().expect("lock").push(report);
        Ok(())
    }
}

struct FailingKnowledgeGraph;

#[async_trait]
impl KnowledgeGraphPort for FailingKnowledgeGraph {
    async fn adjacency(&self, _nodes: &[String]) -> Result<Adjacency, CollaboratorError> {
        Err(unavailable("graph store unreachable"))
    }
}

struct FailingPriors;

#[async_trait]
impl SchemaPriorPort for FailingPriors {
    async fn priors(&self, _events: &[CanonicalEvent]) -> Result<PriorSnapshot, CollaboratorError> {
        Err(unavailable("schema index rebuilding"))
    }
}

struct FailingExecution;

#[async_trait]
impl ExecutionPort for FailingExecution {
    async fn dispatch(&self, _intent: DispatchedIntent) -> Result<ExecutionResult, CollaboratorError> {
        Err(unavailable("executor pool drained"))
    }

    async fn shadow_dispatch(
        &self,
        _intent: DispatchedIntent,
    ) -> Result<ExecutionResult, CollaboratorError> {
        Err(unavailable("executor pool drained"))
    }
}

/// Succeeds with a fixed result shape and records what it was sent.
#[derive(Default)]
struct ScriptedExecution {
    actual_ms: Option<u64>,
    violations: Vec<String>,
    rollback_failed: bool,
    shadow_status: Option<String>,
    output: Value,
    dispatched: Mutex<Vec<DispatchedIntent>>,
    shadowed: Mutex<Vec<DispatchedIntent>>,
}

impl ScriptedExecution {
    fn result(&self, intent: &DispatchedIntent, status: &str) -> ExecutionResult {
        ExecutionResult {
            intent_id: intent.intent_id.clone(),
            success: true,
            status: status.to_string(),
            actual_ms: self.actual_ms.unwrap_or(intent.headers.allocated_ms),
            output: self.output.clone(),
            postcondition_violations: self.violations.clone(),
            rollback_failed: self.rollback_failed,
            error: None,
        }
    }

    fn dispatched(&self) -> Vec<DispatchedIntent> {
        self.dispatched.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ExecutionPort for ScriptedExecution {
    async fn dispatch(&self, intent: DispatchedIntent) -> Result<ExecutionResult, CollaboratorError> {
        let result = self.result(&intent, "ok");
        self.dispatched.lock().expect("lock").push(intent);
        Ok(result)
    }

    async fn shadow_dispatch(
        &self,
        intent: DispatchedIntent,
    ) -> Result<ExecutionResult, CollaboratorError> {
        let status = self.shadow_status.clone().unwrap_or_else(|| "ok".to_string());
        let result = self.result(&intent, &status);
        self.shadowed.lock().expect("lock").push(intent);
        Ok(result)
    }
}

#[tokio::test]
async fn given_plain_event_when_cycle_runs_then_it_is_dispatched_and_recorded() {
    let config = test_config();
    let execution = Arc::new(ScriptedExecution::default());
    let collaborators = Collaborators::local(&config).with_execution(execution.clone());
    let cycle = DecisionCycle::new(config.clone(), collaborators);

    let summary = cycle
        .run_cycle(vec![event("e1", "disk usage climbing on db seven")])
        .await
        .expect("cycle should complete");

    assert_eq!(summary.disposition("e1"), Some(EventDisposition::Dispatched));
    assert_eq!(summary.winners.len(), 1);
    assert!(summary.spent_ms <= 1_000);
    assert!(summary.fallbacks.is_empty(), "fallbacks: {:?}", summary.fallbacks);

    let winner = &summary.winners[0];
    assert_eq!(winner.intent.capability, SEARCH_CAPABILITY);
    assert_eq!(winner.intent.headers.decision_id, summary.decision_id);
    assert!(winner.intent.headers.deadline_ms > 1_700_000_000_000);
    assert!(winner.audit.within_budget);
    let token = winner.intent.token.as_ref().expect("intent carries a token");
    assert!(token.predicates.contains(&format!("capability:{SEARCH_CAPABILITY}")));
    assert_eq!(execution.dispatched().len(), 1);

    let barcodes = summary.ledger.clone().expect("ledger written");
    let why = cycle
        .ledger()
        .read(RecordKind::WhyTrace, &barcodes.why_trace)
        .expect("read why trace")
        .expect("why trace exists");
    assert_eq!(why.record.decision_id, summary.decision_id);
    let capsule = cycle
        .ledger()
        .read(RecordKind::ReplayCapsule, &barcodes.replay_capsule)
        .expect("read capsule")
        .expect("capsule exists");
    assert_eq!(capsule.record.body["events"][0]["event_id"], json!("e1"));
    assert!(capsule.record.body["events"][0].get("payload").is_none());

    cleanup(&config);
}

#[tokio::test]
async fn given_secret_bearing_event_when_cycle_runs_then_block_reflex_yields_zero_bids() {
    let config = test_config();
    let cycle = DecisionCycle::new(config.clone(), Collaborators::local(&config));

    let summary = cycle
        .run_cycle(vec![event("leak", "here is the password hunter2 and api_key=abc")])
        .await
        .expect("cycle should complete");

    let status = summary.status("leak").expect("status recorded");
    assert_eq!(status.disposition, EventDisposition::Blocked);
    assert_eq!(status.bid_count, 0);
    assert_eq!(status.reflex.as_ref().map(|verdict| verdict.flag.as_str()), Some("secret_token"));
    assert!(summary.winners.is_empty());
    assert_eq!(summary.spent_ms, 0);

    cleanup(&config);
}

#[tokio::test]
async fn given_unregistered_capability_when_substitute_exists_then_intent_uses_substitute() {
    let mut config = test_config();
    config.capabilities = vec![CapabilitySpec::named("web.fetch"), CapabilitySpec::named("search.backup")];
    config.gap.substitutes = BTreeMap::from([(
        SEARCH_CAPABILITY.to_string(),
        GapResolution {
            capability: Some("search.backup".to_string()),
            driver: json!({ "engine": "backup" }),
            playbook: json!({ "rate_limit": { "per_minute": 30 } }),
            review: Some(CriticalReview {
                rollback_capability: Some("search.forget".to_string()),
                ..CriticalReview::default()
            }),
        },
    )]);
    let deliberation = Arc::new(RecordingDeliberation::default());
    let collaborators = Collaborators::local(&config).with_deliberation(deliberation.clone());
    let cycle = DecisionCycle::new(config.clone(), collaborators);

    let summary = cycle
        .run_cycle(vec![event("e1", "quarterly report draft ready")])
        .await
        .expect("cycle should complete");

    let winner = summary.winners.first().expect("event still wins");
    let gap = winner.gap.as_ref().expect("gap detected");
    assert_eq!(gap.missing_capability, SEARCH_CAPABILITY);
    assert!(gap.triggers.contains(&GapTrigger::MissingCapability));
    assert!(!gap.exemplars.is_empty());
    assert_eq!(winner.intent.capability, "search.backup");
    assert_eq!(winner.intent.constraints["driver"]["engine"], json!("backup"));
    assert_eq!(winner.intent.constraints["rate_limit"]["per_minute"], json!(30));
    assert_eq!(winner.intent.rollback.capability.as_deref(), Some("search.forget"));
    assert_eq!(winner.settled_rollback.capability.as_deref(), Some("search.forget"));
    assert!(!deliberation.reasons().contains(&EscalationReason::PlannerDecision));

    cleanup(&config);
}

#[tokio::test]
async fn given_unregistered_capability_without_substitute_then_planner_is_consulted() {
    let mut config = test_config();
    config.capabilities = vec![CapabilitySpec::named("web.fetch")];
    let deliberation = Arc::new(RecordingDeliberation::default());
    let collaborators = Collaborators::local(&config).with_deliberation(deliberation.clone());
    let cycle = DecisionCycle::new(config.clone(), collaborators);

    let summary = cycle
        .run_cycle(vec![event("e1", "quarterly report draft ready")])
        .await
        .expect("cycle should complete");

    let winner = summary.winners.first().expect("event still wins");
    assert_eq!(winner.intent.capability, SEARCH_CAPABILITY);
    assert!(winner.escalations.contains(&EscalationReason::PlannerDecision));
    assert_eq!(deliberation.reasons(), vec![EscalationReason::PlannerDecision]);

    cleanup(&config);
}

#[tokio::test]
async fn given_failing_collaborators_when_cycle_runs_then_it_falls_back_without_aborting() {
    let config = test_config();
    let mut collaborators = Collaborators::local(&config)
        .with_policy(Arc::new(FailingPolicy))
        .with_knowledge_graph(Arc::new(FailingKnowledgeGraph))
        .with_execution(Arc::new(FailingExecution));
    collaborators.schema_priors = Arc::new(FailingPriors);
    let cycle = DecisionCycle::new(config.clone(), collaborators);

    let summary = cycle
        .run_cycle(vec![event("e1", "router flapping in rack four")])
        .await
        .expect("collaborator failures never abort a cycle");

    for collaborator in ["policy", "knowledge_graph", "schema_priors"] {
        assert!(
            summary.fallbacks.iter().any(|name| name == collaborator),
            "{collaborator} missing from {:?}",
            summary.fallbacks
        );
    }
    assert_eq!(summary.disposition("e1"), Some(EventDisposition::DispatchFailed));
    let winner = &summary.winners[0];
    assert!(!winner.result.success);
    assert!(winner.result.error.is_some());
    assert_eq!(winner.regret, 1.0);
    assert_eq!(summary.outcome.dispatched, 1);
    assert_eq!(summary.outcome.succeeded, 0);
    assert!(summary.ledger.is_some());

    cleanup(&config);
}

#[tokio::test]
async fn given_slow_policy_service_when_cycle_runs_then_call_times_out_to_config_hints() {
    let mut config = test_config();
    config.dispatch.collaborator_timeout_ms = 20;
    let collaborators = Collaborators::local(&config).with_policy(Arc::new(SlowPolicy));
    let cycle = DecisionCycle::new(config.clone(), collaborators);

    let summary = cycle
        .run_cycle(vec![event("e1", "certificate expires tomorrow")])
        .await
        .expect("cycle should complete");

    assert!(summary.fallbacks.iter().any(|name| name == "policy"));
    assert!(summary.budget_ms <= 1_000);

    cleanup(&config);
}

#[tokio::test]
async fn given_policy_hints_when_cycle_runs_then_arm_pool_and_strategy_are_honored() {
    let config = test_config();
    let policy = Arc::new(HintedPolicy {
        hints: PolicyHints {
            pool_ms: Some(500),
            bidding_arm: Some("hybrid".to_string()),
            market_strategy: Some("vickrey".to_string()),
            ..PolicyHints::default()
        },
        ..HintedPolicy::default()
    });
    let collaborators = Collaborators::local(&config).with_policy(policy.clone());
    let cycle = DecisionCycle::new(config.clone(), collaborators);

    let summary = cycle
        .run_cycle(vec![event("e1", "new signup spike from campaign")])
        .await
        .expect("cycle should complete");

    assert!(summary.budget_ms > 0 && summary.budget_ms <= 500);
    assert!(summary.strategy_fell_back);
    assert_eq!(summary.strategy_requested, "vickrey");
    assert_eq!(summary.status("e1").map(|status| status.bid_count), Some(2));
    assert_eq!(summary.winners.len(), 1, "one dispatch per event");
    let granted_ms = summary
        .winners
        .iter()
        .map(|winner| winner.intent.headers.allocated_ms)
        .sum::<u64>();
    assert!(granted_ms > 0);
    assert_eq!(summary.spent_ms, granted_ms);
    assert_eq!(summary.auction_spent_ms, 2 * granted_ms, "both scorers' bids won the auction");

    let reports = policy.reports.lock().expect("lock").clone();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].dispatched, 1);
    assert_eq!(reports[0].success_rate, 1.0);

    cleanup(&config);
}

#[tokio::test]
async fn given_tiny_pool_when_cycle_runs_then_event_is_outbid_without_dispatch() {
    let config = test_config();
    let policy = Arc::new(HintedPolicy {
        hints: PolicyHints {
            pool_ms: Some(10),
            ..PolicyHints::default()
        },
        ..HintedPolicy::default()
    });
    let execution = Arc::new(ScriptedExecution::default());
    let collaborators = Collaborators::local(&config)
        .with_policy(policy)
        .with_execution(execution.clone());
    let cycle = DecisionCycle::new(config.clone(), collaborators);

    let summary = cycle
        .run_cycle(vec![event("e1", "backup finished with warnings")])
        .await
        .expect("cycle should complete");

    assert_eq!(summary.disposition("e1"), Some(EventDisposition::Outbid));
    assert!(summary.winners.is_empty());
    assert!(execution.dispatched().is_empty());

    cleanup(&config);
}

#[tokio::test]
async fn given_execution_feedback_when_violations_and_rollback_failure_then_both_escalate() {
    let config = test_config();
    let execution = Arc::new(ScriptedExecution {
        actual_ms: Some(500),
        violations: vec!["status_mismatch".to_string()],
        rollback_failed: true,
        ..ScriptedExecution::default()
    });
    let deliberation = Arc::new(RecordingDeliberation::default());
    let collaborators = Collaborators::local(&config)
        .with_execution(execution)
        .with_deliberation(deliberation.clone());
    let cycle = DecisionCycle::new(config.clone(), collaborators);

    let summary = cycle
        .run_cycle(vec![event("e1", "payment webhook retries exhausted")])
        .await
        .expect("cycle should complete");

    let winner = &summary.winners[0];
    assert!(!winner.audit.within_budget);
    assert!(winner.audit.overrun_ms > 0);
    assert!(winner.regret > 0.0);
    let reasons = deliberation.reasons();
    assert!(reasons.contains(&EscalationReason::PostcondViolation));
    assert!(reasons.contains(&EscalationReason::RollbackFailed));

    let windows = cycle.outcomes();
    let windows = windows.lock().await;
    assert_eq!(
        windows.postcondition_errors(SEARCH_CAPABILITY),
        vec!["status_mismatch".to_string()]
    );
    assert_eq!(windows.regret_window(SEARCH_CAPABILITY).len(), 1);

    cleanup(&config);
}

#[tokio::test]
async fn given_shadow_enabled_when_twin_disagrees_then_mismatch_escalates() {
    let mut config = test_config();
    config.dispatch.shadow_enabled = true;
    let execution = Arc::new(ScriptedExecution {
        shadow_status: Some("partial".to_string()),
        ..ScriptedExecution::default()
    });
    let deliberation = Arc::new(RecordingDeliberation::default());
    let collaborators = Collaborators::local(&config)
        .with_execution(execution.clone())
        .with_deliberation(deliberation.clone());
    let cycle = DecisionCycle::new(config.clone(), collaborators);

    let summary = cycle
        .run_cycle(vec![event("e1", "deploy canary error rate rising")])
        .await
        .expect("cycle should complete");

    let shadow = summary.winners[0].shadow.as_ref().expect("shadow trial ran");
    assert!(!shadow.matched);
    assert_eq!(execution.shadowed.lock().expect("lock").len(), 1);
    assert!(execution.shadowed.lock().expect("lock")[0].shadow);
    assert_eq!(deliberation.reasons(), vec![EscalationReason::TwinMismatch]);

    cleanup(&config);
}

#[tokio::test]
async fn given_duplicate_event_ids_when_cycle_runs_then_only_first_is_considered() {
    let config = test_config();
    let cycle = DecisionCycle::new(config.clone(), Collaborators::local(&config));

    let summary = cycle
        .run_cycle(vec![
            event("dup", "first copy of the alert"),
            event("dup", "second copy of the alert"),
        ])
        .await
        .expect("cycle should complete");

    assert_eq!(summary.statuses.len(), 1);
    assert!(summary.winners.len() <= 1);

    cleanup(&config);
}

#[tokio::test]
async fn given_consecutive_cycles_then_cycle_ids_increase_and_empty_batches_complete() {
    let config = test_config();
    let cycle = DecisionCycle::new(config.clone(), Collaborators::local(&config));

    let first = cycle.run_cycle(Vec::new()).await.expect("empty batch completes");
    let second = cycle
        .run_cycle(vec![event("e1", "hello")])
        .await
        .expect("cycle should complete");

    assert!(first.statuses.is_empty());
    assert!(first.winners.is_empty());
    assert_eq!(second.cycle_id, first.cycle_id + 1);
    assert_ne!(first.decision_id, second.decision_id);

    cleanup(&config);
}
