//! # abiquo-watch
//!
//! Waits for Abiquo asynchronous tasks to finish and prints how each one
//! ended. Exits with an error when any task failed or timed out.
//!
//! ## Usage
//! ```bash
//! abiquo-watch --endpoint https://abiquo.example.com/api --user admin \
//!     --max-wait-secs 600 \
//!     cloud/virtualdatacenters/1/virtualappliances/2/virtualmachines/3/tasks/7d9c...
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::future::try_join_all;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use abiquo_api::AbiquoClient;
use abiquo_monitor::{AsyncTaskMonitor, MonitoringService};

mod cli;
mod config;
mod report;

use cli::Args;
use config::{Config, DEFAULT_CONFIG_PATH};
use report::{ReportCallback, TaskReport};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration before logging, which it configures
    let (config, source) = match &args.config {
        Some(config_path) => (Config::load(config_path)?, Some(config_path.as_str())),
        None => match Config::load(DEFAULT_CONFIG_PATH) {
            Ok(cfg) => (cfg, Some(DEFAULT_CONFIG_PATH)),
            Err(_) => (Config::default(), None),
        },
    };
    let config = config.with_overrides(&args)?;

    abiquo_common::init_logging(&config.logging.level, config.logging.format)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting abiquo-watch");
    match source {
        Some(path) => info!(config_path = %path, "Configuration loaded"),
        None => info!("No config file found, using CLI arguments and defaults"),
    }

    let failures = run(config, &args).await?;
    if failures > 0 {
        anyhow::bail!("{} task(s) did not complete successfully", failures);
    }

    Ok(())
}

/// Watch every task given on the command line. Returns how many did not
/// complete.
async fn run(config: Config, args: &Args) -> Result<usize> {
    let client = Arc::new(AbiquoClient::new(config.client.clone()).context("Failed to create API client")?);

    let tasks = try_join_all(args.tasks.iter().map(|href| {
        let client = Arc::clone(&client);
        async move {
            client
                .get_task_by_href(href)
                .await
                .with_context(|| format!("Failed to fetch task {}", href))
        }
    }))
    .await?;

    let expected = tasks.iter().map(|t| t.task_id.as_str()).collect::<HashSet<_>>().len();
    info!(
        tasks = expected,
        endpoint = %config.client.endpoint,
        poll_delay_ms = config.monitor.poll_delay_ms,
        max_wait_secs = args.max_wait_secs,
        "Watching tasks"
    );

    let service = Arc::new(MonitoringService::start(&config.monitor)?);
    let monitor = AsyncTaskMonitor::new(Arc::clone(&service), client);

    let (tx, mut rx) = mpsc::unbounded_channel::<TaskReport>();
    let callback = Arc::new(ReportCallback::new(tx));

    let handle = match args.max_wait_secs {
        Some(secs) => monitor.monitor_within(Duration::from_secs(secs), callback, &tasks)?,
        None => monitor.monitor(callback, &tasks)?,
    };

    let mut failures = 0;
    for _ in 0..expected {
        let Some(report) = rx.recv().await else {
            error!(monitor_id = %handle.id(), "Monitor stopped before reporting every task");
            failures += handle.remaining();
            break;
        };

        println!("{}", report.render());
        if !report.is_success() {
            warn!(task_id = %report.task.task_id, outcome = %report.outcome, "Task did not complete");
            failures += 1;
        }
    }

    service.close();
    Ok(failures)
}
