use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio::{
    io::BufReader,
    signal::unix::{SignalKind, signal},
    sync::mpsc::{self, error::TryRecvError},
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{LoopConfig, TickMissedBehavior},
    cycle::{DecisionCycle, DecisionSummary},
    runtime::ingress::{EventIngress, ReadReport, read_ndjson},
    types::Event,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopReport {
    pub cycles: u64,
    pub events: usize,
    pub failed_cycles: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    InputExhausted,
    Signal(&'static str),
}

/// Drives one cycle per tick until the queue is closed and empty or
/// `shutdown` fires. Events still queued at shutdown get one final cycle.
pub async fn run_loop<F>(
    cycle: Arc<DecisionCycle>,
    mut rx: mpsc::Receiver<Event>,
    loop_config: &LoopConfig,
    shutdown: CancellationToken,
    mut on_summary: F,
) -> LoopReport
where
    F: FnMut(&DecisionSummary),
{
    let mut report = LoopReport::default();
    let mut ticker = tokio::time::interval(Duration::from_millis(loop_config.tick_interval_ms.max(1)));
    match loop_config.tick_missed_behavior {
        TickMissedBehavior::Skip => ticker.set_missed_tick_behavior(MissedTickBehavior::Skip),
    }
    let max_batch = loop_config.max_batch_size.max(1);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                rx.close();
                let (batch, _) = drain_batch(&mut rx, usize::MAX);
                if !batch.is_empty() {
                    run_batch(&cycle, batch, &mut report, &mut on_summary).await;
                }
                break;
            }
            _ = ticker.tick() => {
                let (batch, disconnected) = drain_batch(&mut rx, max_batch);
                if !batch.is_empty() {
                    run_batch(&cycle, batch, &mut report, &mut on_summary).await;
                }
                if disconnected {
                    break;
                }
            }
        }
    }

    report
}

fn drain_batch(rx: &mut mpsc::Receiver<Event>, max_batch: usize) -> (Vec<Event>, bool) {
    let mut batch = Vec::new();
    while batch.len() < max_batch {
        match rx.try_recv() {
            Ok(event) => batch.push(event),
            Err(TryRecvError::Empty) => return (batch, false),
            Err(TryRecvError::Disconnected) => return (batch, true),
        }
    }
    (batch, false)
}

async fn run_batch<F>(
    cycle: &DecisionCycle,
    batch: Vec<Event>,
    report: &mut LoopReport,
    on_summary: &mut F,
) where
    F: FnMut(&DecisionSummary),
{
    let events = batch.len();
    report.events += events;
    match cycle.run_cycle(batch).await {
        Ok(summary) => {
            report.cycles += 1;
            on_summary(&summary);
        }
        Err(err) => {
            report.failed_cycles += 1;
            tracing::error!(
                target: "runtime",
                events = events,
                kind = ?err.kind,
                error = %err,
                "cycle_failed"
            );
        }
    }
}

/// Wires NDJSON input, the tick loop and signal handling together.
/// Summaries are handed to `on_summary` as they complete.
pub async fn run<F>(
    cycle: Arc<DecisionCycle>,
    loop_config: LoopConfig,
    events_path: Option<PathBuf>,
    on_summary: F,
) -> Result<(ExitReason, LoopReport)>
where
    F: FnMut(&DecisionSummary),
{
    let (tx, rx) = mpsc::channel(loop_config.event_queue_capacity.max(1));
    let ingress = EventIngress::new(tx);
    let shutdown = CancellationToken::new();

    let reader_ingress = ingress.clone();
    let reader_task = tokio::spawn(async move {
        let report = match events_path {
            Some(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("failed to open events file {}", path.display()))?;
                read_ndjson(BufReader::new(file), &reader_ingress).await
            }
            None => read_ndjson(BufReader::new(tokio::io::stdin()), &reader_ingress).await,
        }
        .context("failed to read events")?;
        reader_ingress.close_gate().await;
        Ok::<ReadReport, anyhow::Error>(report)
    });
    drop(ingress);

    let mut sigint =
        signal(SignalKind::interrupt()).context("unable to listen for SIGINT (Ctrl+C)")?;
    let mut sigterm = signal(SignalKind::terminate()).context("unable to listen for SIGTERM")?;

    let loop_shutdown = shutdown.clone();
    let driver = run_loop(cycle, rx, &loop_config, loop_shutdown, on_summary);
    tokio::pin!(driver);

    let (exit_reason, report) = tokio::select! {
        report = &mut driver => (ExitReason::InputExhausted, report),
        _ = sigint.recv() => {
            shutdown.cancel();
            (ExitReason::Signal("SIGINT"), driver.await)
        }
        _ = sigterm.recv() => {
            shutdown.cancel();
            (ExitReason::Signal("SIGTERM"), driver.await)
        }
    };

    if exit_reason != ExitReason::InputExhausted {
        reader_task.abort();
    }
    match reader_task.await {
        Ok(Ok(read)) => tracing::info!(
            target: "runtime",
            accepted = read.accepted,
            rejected = read.rejected,
            "event_input_closed"
        ),
        Ok(Err(err)) => tracing::error!(target: "runtime", error = %format!("{err:#}"), "event_input_failed"),
        Err(err) if err.is_cancelled() => {}
        Err(err) => tracing::error!(target: "runtime", error = %err, "event_reader_join_failed"),
    }

    tracing::info!(
        target: "runtime",
        exit = ?exit_reason,
        cycles = report.cycles,
        events = report.events,
        failed_cycles = report.failed_cycles,
        "runtime_stopped"
    );
    Ok((exit_reason, report))
}
