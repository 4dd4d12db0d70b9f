//! `relay-worker` -- process remote-work tasks.
//!
//! Each command-line argument is a task URL. Every task is fetched,
//! its jobs run concurrently against the remote API, and the results
//! are recorded back on the task. Tasks are processed concurrently.
//!
//! Configuration comes from the environment (see [`WorkerConfig`]).
//! `LOG_FORMAT=json` switches log output to JSON lines.
//!
//! The process exits non-zero if the configuration is invalid or any
//! task could not be set up.

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use relay_worker::config::DEFAULT_LOG_FILTER;
use relay_worker::{Worker, WorkerConfig};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let task_urls: Vec<String> = std::env::args().skip(1).collect();
    if task_urls.is_empty() {
        tracing::error!("Usage: relay-worker <task-url>...");
        return ExitCode::from(2);
    }

    match run(&task_urls).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Worker failed to start");
            ExitCode::FAILURE
        }
    }
}

/// Returns `false` if any request was aborted during setup.
async fn run(task_urls: &[String]) -> anyhow::Result<bool> {
    let config = WorkerConfig::from_env()?;
    tracing::info!(
        tower_url = %config.tower.base_url,
        request_timeout_secs = config.request_timeout.as_secs(),
        tasks = task_urls.len(),
        "Starting relay-worker",
    );

    let worker = Worker::from_config(&config)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let report = worker.run_batch(task_urls, &shutdown).await;
    for (url, e) in &report.aborted {
        tracing::error!(task_url = %url, error = %e, "Task was not processed");
    }
    tracing::info!(
        finished = report.finished.len(),
        aborted = report.aborted.len(),
        "All tasks done",
    );

    Ok(!report.has_setup_failures())
}

fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
