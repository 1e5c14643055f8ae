use std::{
    collections::{BTreeMap, BTreeSet},
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use futures_util::future::join_all;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    bidding::{Bid, BidFormer, BiddingPolicy, TERM_HOTSPOT, UtilityScorer},
    budget::{BudgetManager, TempoForecaster},
    calibration::{AlphaPolicy, ConformalCalibrator},
    collaborators::{
        CollaboratorError, Collaborators, DigestTokenSigner, DispatchHeaders, DispatchedIntent,
        Escalation, EscalationReason, ExecutionResult, OutcomeReport, PolicyHints, TokenRequest,
        TokenSignerPort, timeout,
    },
    config::Config,
    cycle::{
        error::CycleError,
        types::{
            CostAudit, DecisionSummary, EventDisposition, EventStatus, LedgerBarcodes,
            ShadowTrial, WinnerOutcome,
        },
    },
    field::{Hotspot, SalienceField, clamp_leak_gamma, co_occurrence_adjacency},
    gap::{
        CapabilitySpec, GapInputs, GapResolution, GapTrigger, OutcomeWindows, apply_resolution,
        detect_gap, regret_for, synthesize_rollback,
    },
    ledger::{DecisionLedger, DecisionRecord, LedgerError, RecordKind},
    market::{AuctionOutcome, run_auction},
    observability::metrics::{
        record_allocation_denied, record_auction_winners, record_collaborator_fallback,
        record_cycle_id, record_escalation, record_reflex,
    },
    reflex::ReflexCatalog,
    salience::{
        GateContext, PriorSnapshot, SalienceEngine, temperature_from_curiosity,
    },
    types::{CanonicalEvent, CycleId, Event, canonicalize, now_unix_ms},
};

/// Inputs shared by every event of one cycle.
struct CycleScope<'a> {
    cycle_id: CycleId,
    decision_id: &'a str,
    priors: &'a PriorSnapshot,
    weights: &'a [f64],
    alpha: &'a AlphaPolicy,
    policy: BiddingPolicy,
}

/// Inputs shared by every winner of one cycle.
struct WinnerScope<'a> {
    cycle_id: CycleId,
    decision_id: &'a str,
    hints: &'a PolicyHints,
    known_capabilities: &'a BTreeSet<String>,
}

/// One attention/admission decision cycle over a batch of events.
///
/// Process-wide state (budget, tempo, field, calibration histories, outcome
/// windows) sits behind one `tokio::sync::Mutex` each and is locked only for
/// the narrow operation that needs it.
pub struct DecisionCycle {
    config: Config,
    engine: SalienceEngine,
    reflex: ReflexCatalog,
    former: BidFormer,
    budget: Arc<Mutex<BudgetManager>>,
    tempo: Arc<Mutex<TempoForecaster>>,
    field: Arc<Mutex<SalienceField>>,
    calibrator: Arc<Mutex<ConformalCalibrator>>,
    outcomes: Arc<Mutex<OutcomeWindows>>,
    capabilities: BTreeMap<String, CapabilitySpec>,
    ledger: DecisionLedger,
    collaborators: Collaborators,
    fallback_signer: DigestTokenSigner,
    cycle_seq: AtomicU64,
}

impl DecisionCycle {
    pub fn new(config: Config, collaborators: Collaborators) -> Self {
        let engine = SalienceEngine::with_default_heads(config.salience.gate_seed);
        let reflex =
            ReflexCatalog::with_placeholder(config.reflex.rules.clone(), config.reflex.placeholder.clone());
        let former = BidFormer::new(
            config.bidding.probes.clone(),
            UtilityScorer::new(config.bidding.weights),
            config.bidding.min_utility,
        );
        let capabilities = config
            .capabilities
            .iter()
            .map(|spec| (spec.name.clone(), spec.clone()))
            .collect();
        let ledger = DecisionLedger::new(config.ledger.dir.clone(), config.ledger.hash_key.as_deref());
        let fallback_signer = DigestTokenSigner::new(
            config.dispatch.token_issuer.clone(),
            config.dispatch.token_audience.clone(),
            config.dispatch.token_key_id.clone(),
            config.dispatch.token_secret.clone(),
        );

        Self {
            engine,
            reflex,
            former,
            budget: Arc::new(Mutex::new(BudgetManager::new(config.budget.pool_ms))),
            tempo: Arc::new(Mutex::new(TempoForecaster::new(
                config.budget.tempo_alpha,
                config.budget.max_reserve_frac,
            ))),
            field: Arc::new(Mutex::new(SalienceField::new(config.field.diffusion))),
            calibrator: Arc::new(Mutex::new(ConformalCalibrator::new(
                config.calibration.history_capacity,
            ))),
            outcomes: Arc::new(Mutex::new(OutcomeWindows::new(config.gap.outcome_window))),
            capabilities,
            ledger,
            collaborators,
            fallback_signer,
            cycle_seq: AtomicU64::new(0),
            config,
        }
    }

    pub fn budget(&self) -> Arc<Mutex<BudgetManager>> {
        Arc::clone(&self.budget)
    }

    pub fn field(&self) -> Arc<Mutex<SalienceField>> {
        Arc::clone(&self.field)
    }

    pub fn calibrator(&self) -> Arc<Mutex<ConformalCalibrator>> {
        Arc::clone(&self.calibrator)
    }

    pub fn outcomes(&self) -> Arc<Mutex<OutcomeWindows>> {
        Arc::clone(&self.outcomes)
    }

    pub fn ledger(&self) -> &DecisionLedger {
        &self.ledger
    }

    /// Runs one full cycle. Collaborator failures degrade fields of the
    /// summary; only an internal salience shape error fails the call.
    pub async fn run_cycle(&self, events: Vec<Event>) -> Result<DecisionSummary, CycleError> {
        let cycle_id = self.cycle_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let decision_id = format!("dec-{}", Uuid::now_v7());
        let mut fallbacks = Vec::new();

        let hints = match self
            .call("policy", self.collaborators.policy.hints(cycle_id))
            .await
        {
            Ok(hints) => hints,
            Err(err) => {
                note_fallback("policy", &err, &mut fallbacks);
                self.config.policy.clone()
            }
        };
        let policy = self.resolve_policy(&hints);
        let strategy_name = hints
            .market_strategy
            .clone()
            .unwrap_or_else(|| self.config.market.strategy.clone());

        self.refresh_budget(&hints).await;

        let mut seen = BTreeSet::new();
        let mut batch = Vec::with_capacity(events.len());
        for event in events {
            if !seen.insert(event.id.clone()) {
                tracing::warn!(
                    target: "cycle",
                    cycle_id = cycle_id,
                    event_id = %event.id,
                    "duplicate_event_skipped"
                );
                continue;
            }
            let canonical = canonicalize(&event);
            batch.push((event, canonical));
        }
        let canonical_batch = batch
            .iter()
            .map(|(_, canonical)| canonical.clone())
            .collect::<Vec<_>>();

        let priors = match self
            .call(
                "schema_priors",
                self.collaborators.schema_priors.priors(&canonical_batch),
            )
            .await
        {
            Ok(priors) => priors,
            Err(err) => {
                note_fallback("schema_priors", &err, &mut fallbacks);
                PriorSnapshot::default()
            }
        };

        let context = gate_context(&canonical_batch);
        let curiosity = hints.curiosity.unwrap_or(self.config.salience.curiosity);
        let temperature = temperature_from_curiosity(
            curiosity,
            self.config.salience.t_min,
            self.config.salience.t_max,
        );
        let weights = self.engine.gate_weights(&context, temperature)?;
        let gate_weights = self
            .engine
            .head_names()
            .into_iter()
            .map(str::to_string)
            .zip(weights.iter().copied())
            .collect::<BTreeMap<_, _>>();

        let alpha = AlphaPolicy {
            default_alpha: self.config.calibration.alpha,
            global_override: hints.alpha,
            per_head: hints.alpha_per_head.clone(),
        };

        let scope = CycleScope {
            cycle_id,
            decision_id: &decision_id,
            priors: &priors,
            weights: &weights,
            alpha: &alpha,
            policy,
        };
        let mut statuses = BTreeMap::new();
        let mut bids = Vec::new();
        for (event, canonical) in &batch {
            let status = self
                .admit_event(&scope, event, canonical, &mut bids, &mut fallbacks)
                .await?;
            statuses.insert(canonical.event_id.clone(), status);
        }

        let hotspots = self
            .diffuse_field(&hints, &canonical_batch, &mut fallbacks)
            .await;
        self.adjust_bids(&mut bids, &hotspots, &hints);

        let auction = {
            let budget = self.budget.lock().await;
            run_auction(bids.clone(), &*budget, &strategy_name)
        };
        record_auction_winners(auction.winners.len());

        let granted = self.allocate_winners(&auction, &mut statuses).await;
        let spent_ms = granted.iter().map(|bid| bid.estimated_cost_ms).sum::<u64>();

        let known_capabilities = self.capabilities.keys().cloned().collect::<BTreeSet<_>>();
        let winner_scope = WinnerScope {
            cycle_id,
            decision_id: &decision_id,
            hints: &hints,
            known_capabilities: &known_capabilities,
        };
        let runs = join_all(
            granted
                .iter()
                .map(|bid| self.execute_winner(&winner_scope, bid)),
        )
        .await;

        let mut winners = Vec::with_capacity(runs.len());
        for (outcome, winner_fallbacks) in runs {
            fallbacks.extend(winner_fallbacks);
            if let Some(status) = statuses.get_mut(&outcome.event_id) {
                status.disposition = if outcome.result.success {
                    EventDisposition::Dispatched
                } else {
                    EventDisposition::DispatchFailed
                };
                status.intent_ids.push(outcome.intent.intent_id.clone());
                status.escalations.extend(outcome.escalations.iter().copied());
            }
            winners.push(outcome);
        }

        let outcome = summarize_outcome(cycle_id, &decision_id, &winners);
        if let Err(err) = self
            .call(
                "policy",
                self.collaborators.policy.report_outcome(outcome.clone()),
            )
            .await
        {
            note_fallback("policy", &err, &mut fallbacks);
        }

        fallbacks.sort();
        fallbacks.dedup();
        let mut summary = DecisionSummary {
            cycle_id,
            decision_id: decision_id.clone(),
            policy,
            strategy_requested: auction.strategy_requested.clone(),
            strategy_applied: auction.strategy_applied,
            strategy_fell_back: auction.fell_back,
            temperature,
            gate_weights,
            budget_ms: auction.budget_ms,
            spent_ms,
            auction_spent_ms: auction.spent_ms,
            statuses,
            winners,
            hotspots,
            outcome,
            fallbacks,
            ledger: None,
        };

        let replay = json!({
            "events": canonical_batch
                .iter()
                .map(|event| json!({
                    "event_id": event.event_id,
                    "source": event.source,
                    "event_type": event.event_type,
                    "content_hash": event.content_hash,
                    "observed_at_ms": event.observed_at_ms,
                }))
                .collect::<Vec<_>>(),
            "priors": priors,
            "hints": hints,
            "gate_seed": self.engine.gate().seed(),
            "gate_context": context,
            "temperature": temperature,
            "alpha": alpha,
            "policy": policy,
            "strategy": strategy_name,
            "budget": self.budget.lock().await.snapshot(),
        });
        match self.write_ledger(&summary, &auction, &bids, replay) {
            Ok(barcodes) => summary.ledger = Some(barcodes),
            Err(err) => {
                tracing::error!(
                    target: "cycle",
                    cycle_id = cycle_id,
                    decision_id = %decision_id,
                    error = %err,
                    "ledger_write_failed"
                );
            }
        }

        record_cycle_id(cycle_id);
        tracing::info!(
            target: "cycle",
            cycle_id = cycle_id,
            decision_id = %summary.decision_id,
            events = summary.statuses.len(),
            bids = bids.len(),
            winners = summary.winners.len(),
            spent_ms = summary.spent_ms,
            auction_spent_ms = summary.auction_spent_ms,
            fallbacks = summary.fallbacks.len(),
            "cycle_completed"
        );
        Ok(summary)
    }

    fn resolve_policy(&self, hints: &PolicyHints) -> BiddingPolicy {
        match hints.bidding_arm.as_deref() {
            None => self.config.bidding.policy,
            Some(arm) => BiddingPolicy::from_arm(arm).unwrap_or_else(|| {
                tracing::warn!(
                    target: "cycle",
                    arm = arm,
                    "unknown_bidding_arm"
                );
                self.config.bidding.policy
            }),
        }
    }

    async fn refresh_budget(&self, hints: &PolicyHints) {
        let mut budget = self.budget.lock().await;
        if let Some(pool_ms) = hints.pool_ms.filter(|pool_ms| *pool_ms > 0) {
            budget.set_pool_ms(pool_ms);
        }
        budget.tick();
        if hints.reserve_ms.is_empty() {
            self.tempo.lock().await.forecast_and_reserve(&mut budget);
        } else {
            budget.set_reserves(hints.reserve_ms.clone());
        }
    }

    async fn admit_event(
        &self,
        scope: &CycleScope<'_>,
        event: &Event,
        canonical: &CanonicalEvent,
        bids: &mut Vec<Bid>,
        fallbacks: &mut Vec<String>,
    ) -> Result<EventStatus, CycleError> {
        let mut status = EventStatus::new(&canonical.event_id);
        self.tempo
            .lock()
            .await
            .observe_event(&canonical.event_type);

        let report = self
            .engine
            .score_event(canonical, scope.priors, scope.weights)
            .await?;
        let scores = report.weighted_by_head();
        let verdict = {
            let mut calibrator = self.calibrator.lock().await;
            let verdict = calibrator.assess(&scores, scope.alpha);
            calibrator.update_all(&scores);
            verdict
        };
        let out_of_distribution = verdict.out_of_distribution;
        status.calibration = Some(verdict);

        let mut admitted = canonical.clone();
        if let Some(rule) = self.reflex.decide(&report.risk_details()) {
            let mut payload = event.payload.clone();
            let verdict = self.reflex.apply(rule, &mut payload);
            record_reflex(verdict.action.as_str());
            tracing::info!(
                target: "reflex",
                event_id = %canonical.event_id,
                flag = %verdict.flag,
                action = verdict.action.as_str(),
                redacted = verdict.redacted_paths.len(),
                "reflex_fired"
            );
            if !verdict.redacted_paths.is_empty() {
                admitted = canonicalize(&Event {
                    payload,
                    ..event.clone()
                });
            }
            let excluded = verdict.action.excludes_from_bidding();
            status.reflex = Some(verdict);
            if excluded {
                status.disposition = EventDisposition::Blocked;
                return Ok(status);
            }
        }

        if out_of_distribution {
            status.disposition = EventDisposition::Escalated;
            status.escalations.push(EscalationReason::ConformalOod);
            let detail = serde_json::to_value(&status.calibration).unwrap_or(Value::Null);
            self.escalate(
                Escalation {
                    reason: EscalationReason::ConformalOod,
                    cycle_id: scope.cycle_id,
                    decision_id: scope.decision_id.to_string(),
                    event_id: Some(canonical.event_id.clone()),
                    detail,
                },
                fallbacks,
            )
            .await;
            return Ok(status);
        }

        self.field
            .lock()
            .await
            .deposit(&[admitted.source.clone()], report.total_weighted());

        let event_bids = self.former.form_bids(&admitted, &report, scope.policy);
        status.bid_count = event_bids.len();
        status.disposition = if event_bids.is_empty() {
            EventDisposition::NoBid
        } else {
            EventDisposition::Outbid
        };
        bids.extend(event_bids);
        Ok(status)
    }

    async fn diffuse_field(
        &self,
        hints: &PolicyHints,
        batch: &[CanonicalEvent],
        fallbacks: &mut Vec<String>,
    ) -> Vec<Hotspot> {
        let leak_gamma = clamp_leak_gamma(hints.leak_gamma.unwrap_or(self.config.field.leak_gamma));
        let nodes = self.field.lock().await.snapshot().into_keys().collect::<Vec<_>>();
        let co_occurrence = || {
            co_occurrence_adjacency(
                batch
                    .iter()
                    .map(|event| (event.source.as_str(), event.event_type.as_str())),
            )
        };
        let adjacency = match self
            .call(
                "knowledge_graph",
                self.collaborators.knowledge_graph.adjacency(&nodes),
            )
            .await
        {
            Ok(adjacency) if !adjacency.is_empty() => adjacency,
            Ok(_) => co_occurrence(),
            Err(err) => {
                note_fallback("knowledge_graph", &err, fallbacks);
                co_occurrence()
            }
        };

        let mut field = self.field.lock().await;
        field.diffuse(&adjacency, leak_gamma);
        field.detect_hotspots(self.config.field.hotspot_threshold)
    }

    fn adjust_bids(&self, bids: &mut [Bid], hotspots: &[Hotspot], hints: &PolicyHints) {
        let hot = hotspots
            .iter()
            .map(|hotspot| hotspot.node.as_str())
            .collect::<BTreeSet<_>>();
        for bid in bids.iter_mut() {
            if hot.contains(bid.source.as_str()) && self.config.field.hotspot_bonus != 0.0 {
                bid.add_term(TERM_HOTSPOT, self.config.field.hotspot_bonus);
            }
            if let Some(multiplier) = hints
                .cost_multipliers
                .get(&bid.action.capability)
                .copied()
                .filter(|multiplier| multiplier.is_finite() && *multiplier >= 0.0)
            {
                bid.estimated_cost_ms = (bid.estimated_cost_ms as f64 * multiplier).round() as u64;
                bid.terms.insert("price_multiplier".to_string(), multiplier);
            }
        }
    }

    /// Grants each winner its own budget slice; at most one dispatch per event.
    async fn allocate_winners(
        &self,
        auction: &AuctionOutcome,
        statuses: &mut BTreeMap<String, EventStatus>,
    ) -> Vec<Bid> {
        let mut budget = self.budget.lock().await;
        let mut granted = Vec::new();
        let mut granted_events = BTreeSet::new();
        for bid in &auction.winners {
            if granted_events.contains(&bid.event_id) {
                tracing::debug!(
                    target: "cycle",
                    bid_id = %bid.bid_id,
                    event_id = %bid.event_id,
                    "duplicate_event_winner_skipped"
                );
                continue;
            }
            if budget.request_allocation(bid.estimated_cost_ms, &bid.bid_id, Some(&bid.event_type)) {
                granted_events.insert(bid.event_id.clone());
                granted.push(bid.clone());
            } else {
                record_allocation_denied();
                if let Some(status) = statuses.get_mut(&bid.event_id)
                    && status.disposition == EventDisposition::Outbid
                {
                    status.disposition = EventDisposition::AllocationDenied;
                }
            }
        }
        granted
    }

    async fn execute_winner(
        &self,
        scope: &WinnerScope<'_>,
        bid: &Bid,
    ) -> (WinnerOutcome, Vec<String>) {
        let mut fallbacks = Vec::new();
        let mut escalations = Vec::new();
        let allocated_ms = bid.estimated_cost_ms;
        let intent_id = format!("intent:{}:{}", scope.decision_id, bid.bid_id);
        let mut capability = bid.action.capability.clone();
        let mut constraints = Value::Object(Map::new());

        let (postcondition_errors, regret_window) = {
            let outcomes = self.outcomes.lock().await;
            (
                outcomes.postcondition_errors(&capability),
                outcomes.regret_window(&capability),
            )
        };
        let gap = detect_gap(
            GapInputs {
                chosen_capability: &capability,
                known_capabilities: scope.known_capabilities,
                postcondition_errors: &postcondition_errors,
                regret_window: &regret_window,
                trending_hosts: &scope.hints.trending_hosts,
            },
            &self.config.gap.thresholds,
        )
        .map(|mut gap| {
            gap.exemplars.push(json!({
                "event_id": bid.event_id,
                "bid_id": bid.bid_id,
                "params": bid.action.params,
            }));
            gap
        });

        let mut review = None;
        if let Some(gap) = &gap {
            tracing::info!(
                target: "gap",
                capability = %gap.missing_capability,
                triggers = gap.triggers.len(),
                "capability_gap_detected"
            );
            let resolution = match self
                .call(
                    "gap_synthesizer",
                    self.collaborators.gap_synthesizer.synthesize(gap),
                )
                .await
            {
                Ok(resolution) => resolution,
                Err(err) => {
                    note_fallback("gap_synthesizer", &err, &mut fallbacks);
                    GapResolution::default()
                }
            };
            apply_resolution(&mut capability, &mut constraints, &resolution);
            review = resolution.review.clone();

            if resolution.capability.is_none() && gap.triggers.contains(&GapTrigger::MissingCapability) {
                escalations.push(EscalationReason::PlannerDecision);
                self.escalate(
                    Escalation {
                        reason: EscalationReason::PlannerDecision,
                        cycle_id: scope.cycle_id,
                        decision_id: scope.decision_id.to_string(),
                        event_id: Some(bid.event_id.clone()),
                        detail: json!({ "gap": gap }),
                    },
                    &mut fallbacks,
                )
                .await;
            }
        }

        let token_request = TokenRequest {
            intent_id: intent_id.clone(),
            predicates: token_predicates(&capability, &bid.event_id, allocated_ms, &constraints),
            ttl_ms: self.config.dispatch.token_ttl_ms,
        };
        let token = match self
            .call(
                "token_signer",
                self.collaborators.signer.sign(token_request.clone()),
            )
            .await
        {
            Ok(token) => Some(token),
            Err(err) => {
                note_fallback("token_signer", &err, &mut fallbacks);
                self.fallback_signer.sign(token_request).await.ok()
            }
        };

        let spec = self
            .capabilities
            .get(&capability)
            .cloned()
            .unwrap_or_else(|| CapabilitySpec::named(capability.clone()));
        let rollback = synthesize_rollback(&spec, review.as_ref(), None);

        let deadline_ms = now_unix_ms()
            .saturating_add(allocated_ms as i64)
            .saturating_add(self.config.dispatch.slack_ms as i64);
        let intent = DispatchedIntent {
            intent_id,
            event_id: bid.event_id.clone(),
            capability,
            params: bid.action.params.clone(),
            headers: DispatchHeaders {
                decision_id: scope.decision_id.to_string(),
                allocated_ms,
                deadline_ms,
            },
            token,
            constraints,
            rollback,
            shadow: false,
        };

        let result = match self
            .call("execution", self.collaborators.execution.dispatch(intent.clone()))
            .await
        {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    target: "cycle",
                    intent_id = %intent.intent_id,
                    capability = %intent.capability,
                    error = %err,
                    "dispatch_failed"
                );
                ExecutionResult::failed(&intent.intent_id, err.to_string())
            }
        };

        let settled_rollback = synthesize_rollback(&spec, review.as_ref(), Some(&result.output));
        let audit = CostAudit::new(allocated_ms, result.actual_ms);
        let regret = regret_for(result.success, allocated_ms, result.actual_ms);
        {
            let mut outcomes = self.outcomes.lock().await;
            for code in &result.postcondition_violations {
                outcomes.record_postcondition_error(&intent.capability, code);
            }
            outcomes.record_regret(&intent.capability, regret);
        }

        if !result.postcondition_violations.is_empty() {
            escalations.push(EscalationReason::PostcondViolation);
            self.escalate(
                Escalation {
                    reason: EscalationReason::PostcondViolation,
                    cycle_id: scope.cycle_id,
                    decision_id: scope.decision_id.to_string(),
                    event_id: Some(bid.event_id.clone()),
                    detail: json!({
                        "intent_id": intent.intent_id,
                        "capability": intent.capability,
                        "violations": result.postcondition_violations,
                    }),
                },
                &mut fallbacks,
            )
            .await;
        }
        if result.rollback_failed {
            escalations.push(EscalationReason::RollbackFailed);
            self.escalate(
                Escalation {
                    reason: EscalationReason::RollbackFailed,
                    cycle_id: scope.cycle_id,
                    decision_id: scope.decision_id.to_string(),
                    event_id: Some(bid.event_id.clone()),
                    detail: json!({
                        "intent_id": intent.intent_id,
                        "rollback": intent.rollback,
                    }),
                },
                &mut fallbacks,
            )
            .await;
        }

        let shadow = if self.config.dispatch.shadow_enabled {
            self.shadow_trial(scope, &intent, &result, &mut escalations, &mut fallbacks)
                .await
        } else {
            None
        };

        (
            WinnerOutcome {
                bid_id: bid.bid_id.clone(),
                event_id: bid.event_id.clone(),
                intent,
                result,
                audit,
                regret,
                gap,
                settled_rollback,
                shadow,
                escalations,
            },
            fallbacks,
        )
    }

    async fn shadow_trial(
        &self,
        scope: &WinnerScope<'_>,
        intent: &DispatchedIntent,
        primary: &ExecutionResult,
        escalations: &mut Vec<EscalationReason>,
        fallbacks: &mut Vec<String>,
    ) -> Option<ShadowTrial> {
        let allocated_ms = intent.headers.allocated_ms;
        let granted = {
            let mut budget = self.budget.lock().await;
            budget.can_allocate_non_reserved(allocated_ms)
                && budget.request_allocation(
                    allocated_ms,
                    &format!("shadow:{}", intent.intent_id),
                    None,
                )
        };
        if !granted {
            tracing::debug!(
                target: "cycle",
                intent_id = %intent.intent_id,
                allocated_ms = allocated_ms,
                "shadow_trial_skipped"
            );
            return None;
        }

        let mut twin = intent.clone();
        twin.shadow = true;
        let result = match self
            .call("execution", self.collaborators.execution.shadow_dispatch(twin))
            .await
        {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    target: "cycle",
                    intent_id = %intent.intent_id,
                    error = %err,
                    "shadow_dispatch_failed"
                );
                return None;
            }
        };

        let matched = result.success == primary.success && result.status == primary.status;
        if !matched {
            escalations.push(EscalationReason::TwinMismatch);
            self.escalate(
                Escalation {
                    reason: EscalationReason::TwinMismatch,
                    cycle_id: scope.cycle_id,
                    decision_id: scope.decision_id.to_string(),
                    event_id: Some(intent.event_id.clone()),
                    detail: json!({
                        "intent_id": intent.intent_id,
                        "primary_status": primary.status,
                        "shadow_status": result.status,
                    }),
                },
                fallbacks,
            )
            .await;
        }
        Some(ShadowTrial { result, matched })
    }

    /// Best effort: the escalation stands locally even if delivery fails.
    async fn escalate(&self, escalation: Escalation, fallbacks: &mut Vec<String>) {
        record_escalation(escalation.reason.as_str());
        tracing::warn!(
            target: "cycle",
            reason = escalation.reason.as_str(),
            cycle_id = escalation.cycle_id,
            event_id = ?escalation.event_id,
            "event_escalated"
        );
        if let Err(err) = self
            .call(
                "deliberation",
                self.collaborators.deliberation.escalate(escalation),
            )
            .await
        {
            note_fallback("deliberation", &err, fallbacks);
        }
    }

    async fn call<T>(
        &self,
        collaborator: &'static str,
        request: impl Future<Output = Result<T, CollaboratorError>>,
    ) -> Result<T, CollaboratorError> {
        let limit = Duration::from_millis(self.config.dispatch.collaborator_timeout_ms);
        match tokio::time::timeout(limit, request).await {
            Ok(result) => result,
            Err(_) => Err(timeout(format!(
                "{collaborator} did not answer within {}ms",
                limit.as_millis()
            ))),
        }
    }

    fn write_ledger(
        &self,
        summary: &DecisionSummary,
        auction: &AuctionOutcome,
        bids: &[Bid],
        replay: Value,
    ) -> Result<LedgerBarcodes, LedgerError> {
        let recorded_at_ms = now_unix_ms();
        let why_trace = DecisionRecord {
            kind: RecordKind::WhyTrace,
            decision_id: summary.decision_id.clone(),
            cycle_id: summary.cycle_id,
            recorded_at_ms,
            body: json!({
                "summary": serde_json::to_value(summary)?,
                "bids": serde_json::to_value(bids)?,
                "frontier": serde_json::to_value(&auction.frontier)?,
            }),
        };
        let replay_capsule = DecisionRecord {
            kind: RecordKind::ReplayCapsule,
            decision_id: summary.decision_id.clone(),
            cycle_id: summary.cycle_id,
            recorded_at_ms,
            body: replay,
        };

        Ok(LedgerBarcodes {
            why_trace: self.ledger.write(&why_trace)?,
            replay_capsule: self.ledger.write(&replay_capsule)?,
        })
    }
}

fn note_fallback(collaborator: &'static str, err: &CollaboratorError, fallbacks: &mut Vec<String>) {
    record_collaborator_fallback(collaborator);
    tracing::warn!(
        target: "cycle",
        collaborator = collaborator,
        kind = ?err.kind,
        error = %err,
        "collaborator_fallback"
    );
    fallbacks.push(collaborator.to_string());
}

fn gate_context(batch: &[CanonicalEvent]) -> GateContext {
    let avg_text_len = if batch.is_empty() {
        0.0
    } else {
        batch.iter().map(|event| event.text_len() as f64).sum::<f64>() / batch.len() as f64
    };
    GateContext {
        batch_size: batch.len(),
        avg_text_len,
    }
}

fn token_predicates(
    capability: &str,
    event_id: &str,
    allocated_ms: u64,
    constraints: &Value,
) -> Vec<String> {
    let mut predicates = vec![
        format!("capability:{capability}"),
        format!("event:{event_id}"),
        format!("max_ms:{allocated_ms}"),
    ];
    if let Value::Object(map) = constraints {
        predicates.extend(map.keys().map(|key| format!("constraint:{key}")));
    }
    predicates.sort();
    predicates.dedup();
    predicates
}

fn summarize_outcome(cycle_id: CycleId, decision_id: &str, winners: &[WinnerOutcome]) -> OutcomeReport {
    let dispatched = winners.len();
    let succeeded = winners.iter().filter(|winner| winner.result.success).count();
    let allocated = winners.iter().map(|winner| winner.audit.allocated_ms).sum::<u64>();
    let actual = winners.iter().map(|winner| winner.audit.actual_ms).sum::<u64>();
    let regret_sum = winners.iter().map(|winner| winner.regret).sum::<f64>();

    OutcomeReport {
        cycle_id,
        decision_id: decision_id.to_string(),
        dispatched,
        succeeded,
        success_rate: if dispatched == 0 {
            0.0
        } else {
            succeeded as f64 / dispatched as f64
        },
        normalized_cost: if allocated == 0 {
            0.0
        } else {
            actual as f64 / allocated as f64
        },
        regret_mean: if dispatched == 0 {
            0.0
        } else {
            regret_sum / dispatched as f64
        },
        regret_count: dispatched,
    }
}
