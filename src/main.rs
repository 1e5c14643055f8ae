use std::{
    io::{self, Write},
    sync::Arc,
};

use anyhow::{Context, Result};

use vigil::{
    cli::args_from_env,
    collaborators::Collaborators,
    config::Config,
    cycle::DecisionCycle,
    logging::init_tracing,
    observability::metrics::start_prometheus_exporter,
    runtime::{self, ExitReason},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = args_from_env()?;
    let config = Config::load(&args.config_path)
        .with_context(|| format!("failed to load config from {}", args.config_path.display()))?;

    let logging_guard = init_tracing(&config.logging).context("failed to initialize logging")?;

    if config.metrics.enabled {
        let metrics = start_prometheus_exporter(config.metrics.listen_addr)
            .context("failed to start prometheus exporter")?;
        tracing::info!(
            target: "observability",
            listen_addr = %metrics.listen_addr,
            "metrics_exporter_started"
        );
    }

    let loop_config = config.r#loop.clone();
    let collaborators = Collaborators::local(&config);
    let cycle = Arc::new(DecisionCycle::new(config, collaborators));

    let stdout = io::stdout();
    let (exit_reason, report) = runtime::run(cycle, loop_config, args.events_path, |summary| {
        let mut out = stdout.lock();
        match serde_json::to_string(summary) {
            Ok(line) => {
                let _ = writeln!(out, "{line}");
            }
            Err(err) => tracing::error!(
                target: "runtime",
                cycle_id = summary.cycle_id,
                error = %err,
                "summary_serialize_failed"
            ),
        }
    })
    .await?;

    match exit_reason {
        ExitReason::InputExhausted => eprintln!(
            "vigil finished: {} cycles over {} events (run {})",
            report.cycles,
            report.events,
            logging_guard.run_id()
        ),
        ExitReason::Signal(signal_name) => eprintln!("vigil stopped: received {signal_name}"),
    }

    Ok(())
}
