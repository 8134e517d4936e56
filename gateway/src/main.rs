mod config;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, LoggingConfig, MetricsConfig};
use dispatch::errors::DispatchError;
use metrics_exporter_statsd::StatsdBuilder;
use refdata::ReferenceData;
use refdata::source::SourceError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(version, about = "Mobile VAS dispatch gateway")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the dispatch front end and admin listeners
    Run(ConfigArgs),
    /// Parse and validate a config file, then exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long, short)]
    config: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("metrics setup failed: {0}")]
    Metrics(String),
    #[error("reference data source: {0}")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        CliCommand::CheckConfig(args) => load_config(&args.config).map(|_| {
            println!("{}: ok", args.config.display());
        }),
        CliCommand::Run(args) => run(&args.config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            tracing::error!(error = %e, "Gateway exited with an error");
            ExitCode::FAILURE
        }
    }
}

fn load_config(path: &Path) -> Result<Config, GatewayError> {
    let config = Config::from_file(path)?;
    config.validate()?;
    Ok(config)
}

fn run(path: &Path) -> Result<(), GatewayError> {
    let config = load_config(path)?;

    // Keep the guard alive so buffered events are flushed on exit.
    let _sentry = init_sentry(&config.logging);
    init_logging(&config.logging);
    if let Some(metrics) = &config.metrics {
        init_metrics(metrics)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_async(config))
}

async fn run_async(config: Config) -> Result<(), GatewayError> {
    let source = refdata::get_source(&config.refdata.source)?;
    let refdata = ReferenceData::new(source, config.refdata.private_networks.clone());
    let worker = refdata.start(Duration::from_secs(config.refdata.reload_interval_secs));

    #[cfg(unix)]
    spawn_reload_on_hangup(refdata.clone())?;

    tracing::info!("Starting gateway");
    let result = tokio::select! {
        result = dispatch::run(config.dispatch, refdata.clone()) => {
            result.map_err(GatewayError::from)
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    };

    refdata.shutdown().await;
    if let Some(worker) = worker {
        let _ = worker.await;
    }
    result
}

/// Reloads all reference data on SIGHUP.
#[cfg(unix)]
fn spawn_reload_on_hangup(refdata: ReferenceData) -> Result<(), GatewayError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match refdata.refresh().await {
                Ok(rows) => tracing::info!(rows, "Reloaded reference data on SIGHUP"),
                Err(e) => tracing::error!(error = %e, "Reload on SIGHUP failed"),
            }
        }
    });
    Ok(())
}

fn init_sentry(config: &LoggingConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        config
            .level
            .as_deref()
            .and_then(|level| EnvFilter::try_new(level).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    });

    let sentry_layer = config
        .sentry_dsn
        .is_some()
        .then(|| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_layer)
        .init();
}

fn init_metrics(config: &MetricsConfig) -> Result<(), GatewayError> {
    let recorder = StatsdBuilder::from(config.statsd_host.as_str(), config.statsd_port)
        .build(Some(&config.prefix))
        .map_err(|e| GatewayError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| GatewayError::Metrics(e.to_string()))?;

    shared::metrics_defs::describe_all(refdata::metrics_defs::ALL_METRICS);
    shared::metrics_defs::describe_all(dispatch::metrics_defs::ALL_METRICS);
    tracing::info!(
        host = %config.statsd_host,
        port = config.statsd_port,
        "Metrics exporter installed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_subcommands() {
        Cli::command().debug_assert();

        let cli =
            Cli::try_parse_from(["gateway", "run", "--config", "/etc/gateway.yaml"]).unwrap();
        assert!(matches!(
            cli.command,
            CliCommand::Run(ConfigArgs { config }) if config == Path::new("/etc/gateway.yaml")
        ));

        let cli = Cli::try_parse_from(["gateway", "check-config", "-c", "gw.yaml"]).unwrap();
        assert!(matches!(cli.command, CliCommand::CheckConfig(_)));

        assert!(Cli::try_parse_from(["gateway", "run"]).is_err());
    }

    #[test]
    fn check_config_reports_errors() {
        assert!(matches!(
            load_config(Path::new("/nonexistent/gateway.yaml")),
            Err(GatewayError::Config(ConfigError::LoadError(_)))
        ));
    }
}
