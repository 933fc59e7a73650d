//! kwnode - Kubernetes problem watcher
//!
//! This binary watches a cluster's nodes and pods and reports problems to
//! a Slack channel.

use clap::{Parser, Subcommand};
use kw_alerts::{LogChannel, Notifier, SlackChannel, SlackConfig};
use kwnode::{KubeSource, LogFormat, RunArgs, Runner, WatchConfig};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_DIRECTIVES: &str = "kwnode=info,kw_alerts=info,kw_observe=info";

#[derive(Parser)]
#[command(name = "kwnode")]
#[command(about = "Kubernetes node and pod problem watcher")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the cluster and report problems
    Run(RunArgs),

    /// Check cluster access and the Slack channel, then exit
    Check(RunArgs),
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVES));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (args, check_only) = match cli.command {
        Commands::Run(args) => (args, false),
        Commands::Check(args) => (args, true),
    };
    init_tracing(args.log_format);

    let config = WatchConfig::from_args(&args)?;
    let source = KubeSource::try_default().await?;

    let result = match &config.slack {
        Some(slack) => {
            let channel = SlackChannel::new(SlackConfig::new(&slack.token, &slack.channel)?)?;
            watch(source, channel, config, check_only).await
        }
        None => watch(source, LogChannel::default(), config, check_only).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "kwnode stopped");
    }
    result
}

async fn watch<N: Notifier>(
    source: KubeSource,
    notifier: N,
    config: WatchConfig,
    check_only: bool,
) -> anyhow::Result<()> {
    let channel = notifier.verify().await?;
    info!(channel = %channel, "notification channel verified");

    let mut runner = Runner::new(source, notifier, config);
    runner.verify().await?;
    info!(
        watch_nodes = runner.config().watch_nodes,
        namespaces = ?runner.config().watch_namespaces,
        metrics_available = runner.source().metrics_available(),
        "setup verified"
    );

    if check_only {
        return Ok(());
    }

    runner.start().await?;
    Ok(())
}
