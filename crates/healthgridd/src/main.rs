//! healthgridd — the healthgrid daemon.
//!
//! Single binary that assembles:
//! - Workload backend (Kubernetes API or in-memory)
//! - Check executor (ephemeral pods, or in-process DNS resolution)
//! - Check controller + schedules
//! - HTTP surface (probes, status, Prometheus)
//!
//! # Usage
//!
//! ```text
//! healthgridd run --port 8080 --checks checks.toml
//! healthgridd run --executor network
//! healthgridd validate --checks checks.toml
//! ```

mod config;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use healthgrid_controller::Controller;
use healthgrid_executor::network::DEFAULT_TARGET;
use healthgrid_executor::{
    CheckExecutor, ExecutorConfig, KubeBackend, MemoryBackend, NetworkExecutor, PodExecutor,
    WorkloadBackend,
};
use healthgrid_model::HealthCheck;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ChecksFile;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_LOG_FILTER: &str = "info,healthgridd=debug,healthgrid=debug";

#[derive(Parser)]
#[command(name = "healthgridd", about = "healthgrid daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register the checks and serve their status over HTTP.
    Run {
        /// Port to listen on. Falls back to 8080 when unset or invalid.
        #[arg(long, env = "PORT")]
        port: Option<String>,

        /// TOML file with check definitions. Defaults to the built-in checks.
        #[arg(long)]
        checks: Option<PathBuf>,

        /// How checks are executed.
        #[arg(long, value_enum, default_value_t = ExecutorKind::Pod)]
        executor: ExecutorKind,

        /// Where check workloads run. Ignored by the network executor.
        #[arg(long, value_enum, default_value_t = BackendKind::Kubernetes)]
        backend: BackendKind,

        /// `host:port` resolved by the network executor.
        #[arg(long, default_value = DEFAULT_TARGET)]
        network_target: String,

        /// Delay between workload phase reads, in milliseconds.
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        poll_interval_ms: u64,
    },

    /// Parse a checks file and print the resulting definitions.
    Validate {
        #[arg(long)]
        checks: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExecutorKind {
    /// One ephemeral pod per run.
    Pod,
    /// In-process DNS lookup, no workloads.
    Network,
}

/// Executor selection from the `run` flags.
struct ExecutorOptions {
    kind: ExecutorKind,
    backend: BackendKind,
    network_target: String,
    poll_interval: Duration,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendKind {
    Kubernetes,
    Memory,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            port,
            checks,
            executor,
            backend,
            network_target,
            poll_interval_ms,
        } => {
            let options = ExecutorOptions {
                kind: executor,
                backend,
                network_target,
                poll_interval: Duration::from_millis(poll_interval_ms),
            };
            run(port.as_deref(), checks.as_deref(), options).await
        }
        Command::Validate { checks } => validate(checks.as_deref()),
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Port from `--port`/`PORT`, or 8080 when absent or unparsable.
fn resolve_port(raw: Option<&str>) -> u16 {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => DEFAULT_PORT,
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!(port = %value, "invalid port, using default {DEFAULT_PORT}");
            DEFAULT_PORT
        }),
    }
}

fn load_checks(path: Option<&Path>) -> anyhow::Result<Vec<HealthCheck>> {
    match path {
        Some(path) => ChecksFile::from_file(path)?.into_checks(),
        None => Ok(config::builtin_checks()),
    }
}

fn validate(path: Option<&Path>) -> anyhow::Result<()> {
    let checks = load_checks(path)?;
    println!("{}", serde_json::to_string_pretty(&checks)?);
    info!(count = checks.len(), "check definitions are valid");
    Ok(())
}

async fn build_executor(options: ExecutorOptions) -> anyhow::Result<Arc<dyn CheckExecutor>> {
    match options.kind {
        ExecutorKind::Network => {
            info!(network_target = %options.network_target, "network executor initialized");
            Ok(Arc::new(NetworkExecutor::with_target(options.network_target)))
        }
        ExecutorKind::Pod => {
            let backend: Arc<dyn WorkloadBackend> = match options.backend {
                BackendKind::Kubernetes => Arc::new(
                    KubeBackend::try_default()
                        .await
                        .context("failed to connect to the Kubernetes API")?,
                ),
                BackendKind::Memory => {
                    warn!("in-memory backend selected, no real workloads will run");
                    Arc::new(MemoryBackend::new())
                }
            };
            let poll_interval = options.poll_interval;
            info!(poll_interval_ms = poll_interval.as_millis() as u64, "pod executor initialized");
            Ok(Arc::new(PodExecutor::with_config(
                backend,
                ExecutorConfig { poll_interval },
            )))
        }
    }
}

async fn run(
    port: Option<&str>,
    checks: Option<&Path>,
    options: ExecutorOptions,
) -> anyhow::Result<()> {
    info!("healthgrid daemon starting");

    let port = resolve_port(port);
    let definitions = load_checks(checks)?;

    // ── Initialize subsystems ──────────────────────────────────

    let executor = build_executor(options).await?;

    let controller = Controller::new(executor);
    for check in definitions {
        let name = check.name.clone();
        controller
            .register(check)
            .await
            .with_context(|| format!("failed to register check {name:?}"))?;
    }
    info!(checks = controller.check_count().await, "checks registered");

    // ── Start API server ───────────────────────────────────────

    let router = healthgrid_api::build_router(controller.clone());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "HTTP server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    controller.shutdown().await;
    info!("healthgrid daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_falls_back_to_default() {
        assert_eq!(resolve_port(None), 8080);
        assert_eq!(resolve_port(Some("")), 8080);
        assert_eq!(resolve_port(Some("not-a-port")), 8080);
        assert_eq!(resolve_port(Some("70000")), 8080);
        assert_eq!(resolve_port(Some("9090")), 9090);
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "healthgridd",
            "run",
            "--port",
            "9000",
            "--backend",
            "memory",
            "--poll-interval-ms",
            "250",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
        match cli.command {
            Command::Run {
                port,
                executor,
                backend,
                network_target,
                poll_interval_ms,
                checks,
            } => {
                assert_eq!(port.as_deref(), Some("9000"));
                assert!(matches!(executor, ExecutorKind::Pod));
                assert!(matches!(backend, BackendKind::Memory));
                assert_eq!(network_target, DEFAULT_TARGET);
                assert_eq!(poll_interval_ms, 250);
                assert!(checks.is_none());
            }
            Command::Validate { .. } => panic!("expected run"),
        }
    }

    #[tokio::test]
    async fn network_executor_needs_no_backend() {
        let cli = Cli::try_parse_from([
            "healthgridd",
            "run",
            "--executor",
            "network",
            "--network-target",
            "localhost:80",
        ])
        .unwrap();
        let Command::Run {
            executor,
            backend,
            network_target,
            poll_interval_ms,
            ..
        } = cli.command
        else {
            panic!("expected run");
        };
        assert!(matches!(executor, ExecutorKind::Network));

        // The Kubernetes default is never contacted for the network executor.
        let executor = build_executor(ExecutorOptions {
            kind: executor,
            backend,
            network_target,
            poll_interval: Duration::from_millis(poll_interval_ms),
        })
        .await
        .unwrap();

        let result = executor
            .execute(&HealthCheck::new("net", "default", 60, 5))
            .await
            .unwrap();
        assert!(result.ok, "errors: {:?}", result.errors);
        executor.shutdown().await;
    }

    #[test]
    fn cli_rejects_zero_poll_interval() {
        let parsed = Cli::try_parse_from(["healthgridd", "run", "--poll-interval-ms", "0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn builtin_checks_load_without_file() {
        let checks = load_checks(None).unwrap();
        assert_eq!(checks.len(), 2);
    }
}
