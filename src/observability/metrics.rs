use std::net::SocketAddr;

use metrics::{Unit, counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const CYCLE_ID_METRIC: &str = "vigil_cycle_id";
pub const AUCTION_WINNERS_METRIC: &str = "vigil_auction_winners";
pub const COLLABORATOR_FALLBACK_METRIC: &str = "vigil_collaborator_fallback_total";
pub const REFLEX_METRIC: &str = "vigil_reflex_total";
pub const ESCALATION_METRIC: &str = "vigil_escalation_total";
pub const ALLOCATION_DENIED_METRIC: &str = "vigil_allocation_denied_total";

#[derive(Debug, Clone, Copy)]
pub struct MetricsRuntime {
    pub listen_addr: SocketAddr,
}

pub fn describe_metrics() {
    describe_gauge!(
        CYCLE_ID_METRIC,
        Unit::Count,
        "Latest decision cycle id completed."
    );
    describe_gauge!(
        AUCTION_WINNERS_METRIC,
        Unit::Count,
        "Winners selected by the latest auction."
    );
    describe_counter!(
        COLLABORATOR_FALLBACK_METRIC,
        Unit::Count,
        "Collaborator calls that failed and fell back to a local default."
    );
    describe_counter!(
        REFLEX_METRIC,
        Unit::Count,
        "Reflex rules fired, by action."
    );
    describe_counter!(
        ESCALATION_METRIC,
        Unit::Count,
        "Escalations raised to deliberation, by reason."
    );
    describe_counter!(
        ALLOCATION_DENIED_METRIC,
        Unit::Count,
        "Budget allocation requests denied."
    );
}

pub fn start_prometheus_exporter(listen_addr: SocketAddr) -> Result<MetricsRuntime, BuildError> {
    describe_metrics();

    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()?;

    Ok(MetricsRuntime { listen_addr })
}

pub fn record_cycle_id(cycle_id: u64) {
    gauge!(CYCLE_ID_METRIC).set(cycle_id as f64);
}

pub fn record_auction_winners(count: usize) {
    gauge!(AUCTION_WINNERS_METRIC).set(count as f64);
}

pub fn record_collaborator_fallback(collaborator: &'static str) {
    counter!(COLLABORATOR_FALLBACK_METRIC, "collaborator" => collaborator).increment(1);
}

pub fn record_reflex(action: &'static str) {
    counter!(REFLEX_METRIC, "action" => action).increment(1);
}

pub fn record_escalation(reason: &'static str) {
    counter!(ESCALATION_METRIC, "reason" => reason).increment(1);
}

pub fn record_allocation_denied() {
    counter!(ALLOCATION_DENIED_METRIC).increment(1);
}
