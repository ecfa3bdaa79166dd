use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use load_test::cli::{BackendKind, Cli, Command, RunArgs};
use load_test::config::PROFILES;
use load_test::metrics::reporter;
use load_test::{Harness, HarnessError, JsonLinesSink};
use surge_client::{Connector, HttpConnector};
use surge_testsuite::SimulatedBackend;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    match cli.command {
        Command::Profiles => {
            for (name, description) in PROFILES {
                println!("{:<10} {}", name, description);
            }
            Ok(())
        }
        Command::Run(args) => {
            // Initialize tracing
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(if args.verbose {
                    tracing::Level::DEBUG
                } else {
                    tracing::Level::INFO
                })
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;

            run(args).await
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let config = args.build_config()?;

    tracing::info!("Surge Load Test Starting...");
    tracing::info!("Endpoint: {}", config.endpoint);
    tracing::info!("Target: {} ({} MB)", config.target, config.target_capacity_mb);
    tracing::info!("Max In-Flight: {}", config.max_in_flight);
    tracing::info!("Operation Timeout: {:?}", config.operation_timeout);
    tracing::info!("Schedule: {}", config.schedule);

    let connector: Arc<dyn Connector> = match args.backend {
        BackendKind::Http => Arc::new(HttpConnector::new(config.target.clone())),
        BackendKind::Simulated => {
            tracing::warn!("NOTE: using the in-process simulated backend, nothing is written");
            Arc::new(
                SimulatedBackend::builder()
                    .latency(Duration::from_millis(args.sim_latency_ms))
                    .overload_first(args.sim_overload_first)
                    .build(),
            )
        }
    };

    let mut harness = Harness::new(config, connector)?;
    if let Some(path) = &args.outcomes_file {
        tracing::info!("Writing outcomes to {}", path.display());
        harness = harness.with_sink(Arc::new(JsonLinesSink::create(path)?));
    }

    let abort = harness.abort_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.trigger("interrupted by Ctrl+C");
        }
    });

    let live_view = (args.report_interval > 0).then(|| {
        let aggregator = harness.aggregator();
        let interval = args.report_interval;
        tokio::spawn(async move {
            reporter::start_periodic_reporter(aggregator, interval).await;
        })
    });

    let result = harness.run().await;
    if let Some(handle) = live_view {
        handle.abort();
    }

    let report = match &result {
        Ok(report) => Some(report),
        Err(e) => e.report(),
    };
    if let Some(report) = report {
        reporter::print_final_report(report);
        if let Some(path) = &args.report_json {
            reporter::write_json_report(report, path)?;
            tracing::info!("Report written to {}", path.display());
        }
    }

    match result {
        Ok(_) => {
            tracing::info!("Load test complete");
            Ok(())
        }
        Err(HarnessError::Aborted { cause, .. }) => anyhow::bail!("Load test aborted: {}", cause),
        Err(e) => Err(e.into()),
    }
}
