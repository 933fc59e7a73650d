//! Agent configuration.
//!
//! Every setting can be given as a `kwnode run` flag or through the
//! environment:
//! - Slack credentials (`SLACK_TOKEN`, `SLACK_CHANNEL`)
//! - Watch targets (`WATCH_NODES`, `WATCH_NAMESPACES`)
//! - Poll interval, dry-run mode and log format

use std::time::Duration;

use clap::{ArgAction, Args, ValueEnum};

use crate::error::{Result, WatchError};

/// Default reconciliation period in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Command-line arguments of `kwnode run`.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Slack bot token
    #[arg(long, env = "SLACK_TOKEN", hide_env_values = true)]
    pub slack_token: Option<String>,

    /// Slack channel to post alerts to
    #[arg(long, env = "SLACK_CHANNEL")]
    pub slack_channel: Option<String>,

    /// Watch nodes; any value other than `false` enables
    #[arg(
        long,
        env = "WATCH_NODES",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = parse_watch_flag
    )]
    pub watch_nodes: bool,

    /// Comma separated namespaces whose pods are watched
    #[arg(long, env = "WATCH_NAMESPACES", default_value = "default")]
    pub watch_namespaces: String,

    /// Seconds between reconciliation cycles
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    /// Log alert messages instead of posting them to Slack
    #[arg(long, env = "DRY_RUN")]
    pub dry_run: bool,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

fn parse_watch_flag(value: &str) -> std::result::Result<bool, String> {
    Ok(value != "false")
}

/// Splits a comma separated namespace list, dropping blanks and repeats.
#[must_use]
pub fn parse_namespaces(value: &str) -> Vec<String> {
    let mut namespaces: Vec<String> = Vec::new();
    for ns in value.split(',').map(str::trim).filter(|ns| !ns.is_empty()) {
        if !namespaces.iter().any(|existing| existing == ns) {
            namespaces.push(ns.to_string());
        }
    }
    namespaces
}

/// Slack credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackSettings {
    /// Bot token.
    pub token: String,
    /// Channel name or id.
    pub channel: String,
}

/// Validated agent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchConfig {
    /// Slack credentials; `None` in dry-run mode.
    pub slack: Option<SlackSettings>,
    /// Whether nodes are classified.
    pub watch_nodes: bool,
    /// Namespaces whose pods are classified, in order.
    pub watch_namespaces: Vec<String>,
    /// Reconciliation period.
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            slack: None,
            watch_nodes: true,
            watch_namespaces: vec!["default".to_string()],
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl WatchConfig {
    /// Builds and validates the configuration from parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the arguments are inconsistent.
    pub fn from_args(args: &RunArgs) -> Result<Self> {
        let slack = if args.dry_run {
            None
        } else {
            let token = non_empty(args.slack_token.as_deref())
                .ok_or_else(|| WatchError::Config("SLACK_TOKEN is required".to_string()))?;
            let channel = non_empty(args.slack_channel.as_deref())
                .ok_or_else(|| WatchError::Config("SLACK_CHANNEL is required".to_string()))?;
            Some(SlackSettings {
                token: token.to_string(),
                channel: channel.to_string(),
            })
        };

        let config = Self {
            slack,
            watch_nodes: args.watch_nodes,
            watch_namespaces: parse_namespaces(&args.watch_namespaces),
            poll_interval: Duration::from_secs(args.poll_interval_secs),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(WatchError::Config(
                "poll interval must be greater than 0".to_string(),
            ));
        }

        if !self.watch_nodes && self.watch_namespaces.is_empty() {
            return Err(WatchError::Config(
                "nothing to watch: node watching is disabled and no namespaces are configured"
                    .to_string(),
            ));
        }

        if let Some(slack) = &self.slack {
            if slack.token.is_empty() || slack.channel.is_empty() {
                return Err(WatchError::Config(
                    "slack token and channel cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// True if alerts are only logged.
    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.slack.is_none()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
