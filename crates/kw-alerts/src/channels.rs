//! Notification channels for alert delivery.
//!
//! This module provides the [`Notifier`] trait and its implementations:
//! [`SlackChannel`] posts to a Slack channel, [`LogChannel`] writes to the
//! tracing log and [`MemoryChannel`] keeps messages in memory.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{NotifyError, Result};
use crate::retry::{retry_with_backoff, RetryConfig};

/// Default Slack Web API base URL.
pub const SLACK_API_URL: &str = "https://slack.com/api";

/// Delivers alert text to a single destination.
///
/// Implementations retry transient failures internally; an error returned
/// from [`send`](Notifier::send) is final.
#[allow(async_fn_in_trait)]
pub trait Notifier {
    /// Returns the name of this channel.
    fn name(&self) -> &str;

    /// Sends one message.
    async fn send(&self, message: &str) -> Result<()>;

    /// Checks that the destination exists and is reachable. Returns a
    /// human-readable destination name.
    async fn verify(&self) -> Result<String> {
        Ok(self.name().to_string())
    }
}

/// Configuration for a Slack channel.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Bot token.
    pub token: String,
    /// Channel ID or name to post into.
    pub channel: String,
    /// Web API base URL.
    pub api_url: String,
    /// Timeout in seconds for HTTP requests.
    pub timeout_secs: u64,
    /// Retry policy for transient failures.
    pub retry: RetryConfig,
}

impl SlackConfig {
    /// Creates a new Slack configuration.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::InvalidConfig` if the token or the channel is empty.
    pub fn new(token: impl Into<String>, channel: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let channel = channel.into();

        if token.is_empty() {
            return Err(NotifyError::InvalidConfig {
                reason: "no slack token provided (is SLACK_TOKEN set?)".to_string(),
            });
        }
        if channel.is_empty() {
            return Err(NotifyError::InvalidConfig {
                reason: "no slack channel provided (is SLACK_CHANNEL set?)".to_string(),
            });
        }

        Ok(Self {
            token,
            channel,
            api_url: SLACK_API_URL.to_string(),
            timeout_secs: 30,
            retry: RetryConfig::default(),
        })
    }

    /// Sets the Web API base URL.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[derive(Debug, Serialize)]
struct PostMessage<'a> {
    channel: &'a str,
    text: &'a str,
}

/// The subset of a Slack Web API response kubewatch reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackResponse {
    /// Whether the call succeeded.
    pub ok: bool,
    /// Error code when `ok` is false.
    #[serde(default)]
    pub error: Option<String>,
    /// Channel info, present on `conversations.info`.
    #[serde(default)]
    pub channel: Option<SlackChannelInfo>,
}

impl SlackResponse {
    /// Converts an `ok: false` response into an error.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::SlackApi` carrying Slack's error code.
    pub fn into_result(self) -> Result<Self> {
        if self.ok {
            Ok(self)
        } else {
            Err(NotifyError::SlackApi(
                self.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

/// Channel details from `conversations.info`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlackChannelInfo {
    /// Channel ID.
    #[serde(default)]
    pub id: String,
    /// Channel name.
    #[serde(default)]
    pub name: String,
}

/// Posts messages to a Slack channel through the Web API.
#[derive(Debug, Clone)]
pub struct SlackChannel {
    config: SlackConfig,
    client: reqwest::Client,
}

impl SlackChannel {
    /// Creates a Slack channel.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::Http` if the HTTP client cannot be built.
    pub fn new(config: SlackConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, client })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SlackConfig {
        &self.config
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{method}", self.config.api_url.trim_end_matches('/'))
    }

    async fn read_response(endpoint: String, response: reqwest::Response) -> Result<SlackResponse> {
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status {
                endpoint,
                status: status.as_u16(),
            });
        }
        let body: SlackResponse = response.json().await?;
        body.into_result()
    }

    async fn post_once(&self, text: &str) -> Result<()> {
        let endpoint = self.endpoint("chat.postMessage");
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.config.token)
            .json(&PostMessage {
                channel: &self.config.channel,
                text,
            })
            .send()
            .await?;

        Self::read_response(endpoint, response).await?;
        Ok(())
    }
}

impl Notifier for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, message: &str) -> Result<()> {
        retry_with_backoff(
            &self.config.retry,
            || self.post_once(message),
            NotifyError::is_transient,
        )
        .await?;

        debug!(channel = %self.config.channel, "posted slack message");
        Ok(())
    }

    async fn verify(&self) -> Result<String> {
        let endpoint = self.endpoint("conversations.info");
        let response = self
            .client
            .get(&endpoint)
            .bearer_auth(&self.config.token)
            .query(&[("channel", self.config.channel.as_str())])
            .send()
            .await?;

        let body = Self::read_response(endpoint, response).await?;
        Ok(body
            .channel
            .map(|c| c.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.config.channel.clone()))
    }
}

/// A channel that logs messages instead of delivering them.
#[derive(Debug, Clone)]
pub struct LogChannel {
    name: String,
}

impl LogChannel {
    /// Creates a new log channel.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogChannel {
    fn default() -> Self {
        Self::new("log")
    }
}

impl Notifier for LogChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, message: &str) -> Result<()> {
        info!(channel = %self.name, message = %message, "ALERT");
        Ok(())
    }
}

/// A channel that keeps every message in memory.
///
/// Clones share the same buffer, so a test can hold one handle while the
/// manager owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryChannel {
    messages: Arc<Mutex<Vec<String>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MemoryChannel {
    /// Creates an empty channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following send fail with `reason`, or succeed again with `None`.
    pub fn set_failure(&self, reason: Option<&str>) {
        *self.failure.lock() = reason.map(str::to_string);
    }

    /// Returns a copy of every delivered message.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Removes and returns every delivered message.
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.messages.lock())
    }

    /// Returns the number of delivered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    /// Returns true if nothing was delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl Notifier for MemoryChannel {
    fn name(&self) -> &str {
        "memory"
    }

    async fn send(&self, message: &str) -> Result<()> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(NotifyError::NotificationFailed { reason });
        }
        self.messages.lock().push(message.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod slack_config_tests {
        use super::*;

        #[test]
        fn valid_config() {
            let config = SlackConfig::new("xoxb-token", "#alerts").unwrap();
            assert_eq!(config.api_url, SLACK_API_URL);
            assert_eq!(config.timeout_secs, 30);
            assert_eq!(config.retry.max_attempts, 5);
        }

        #[test]
        fn empty_token_rejected() {
            let err = SlackConfig::new("", "#alerts").unwrap_err();
            assert!(err.to_string().contains("SLACK_TOKEN"));
        }

        #[test]
        fn empty_channel_rejected() {
            let err = SlackConfig::new("xoxb-token", "").unwrap_err();
            assert!(err.to_string().contains("SLACK_CHANNEL"));
        }

        #[test]
        fn builder_overrides() {
            let config = SlackConfig::new("t", "c")
                .unwrap()
                .with_api_url("http://localhost:9999/api/")
                .with_timeout_secs(5)
                .with_retry(RetryConfig::immediate(2));
            let channel = SlackChannel::new(config).unwrap();
            assert_eq!(
                channel.endpoint("chat.postMessage"),
                "http://localhost:9999/api/chat.postMessage"
            );
            assert_eq!(channel.config().timeout_secs, 5);
        }
    }

    mod slack_response_tests {
        use super::*;

        #[test]
        fn ok_response() {
            let body: SlackResponse =
                serde_json::from_str(r#"{"ok":true,"channel":{"id":"C1","name":"alerts"}}"#).unwrap();
            let body = body.into_result().unwrap();
            assert_eq!(body.channel.unwrap().name, "alerts");
        }

        #[test]
        fn error_response() {
            let body: SlackResponse =
                serde_json::from_str(r#"{"ok":false,"error":"channel_not_found"}"#).unwrap();
            let err = body.into_result().unwrap_err();
            assert!(matches!(err, NotifyError::SlackApi(ref code) if code == "channel_not_found"));
        }

        #[test]
        fn post_message_payload() {
            let json = serde_json::to_string(&PostMessage {
                channel: "#alerts",
                text: "hello",
            })
            .unwrap();
            assert_eq!(json, r##"{"channel":"#alerts","text":"hello"}"##);
        }
    }

    mod memory_channel_tests {
        use super::*;

        #[tokio::test]
        async fn records_messages() {
            let channel = MemoryChannel::new();
            let handle = channel.clone();
            channel.send("one").await.unwrap();
            channel.send("two").await.unwrap();
            assert_eq!(handle.messages(), vec!["one", "two"]);
            assert_eq!(handle.take().len(), 2);
            assert!(handle.is_empty());
        }

        #[tokio::test]
        async fn injected_failure() {
            let channel = MemoryChannel::new();
            channel.set_failure(Some("channel_archived"));
            let err = channel.send("one").await.unwrap_err();
            assert!(err.to_string().contains("channel_archived"));
            assert!(channel.is_empty());

            channel.set_failure(None);
            channel.send("two").await.unwrap();
            assert_eq!(channel.len(), 1);
        }

        #[tokio::test]
        async fn default_verify_returns_name() {
            assert_eq!(MemoryChannel::new().verify().await.unwrap(), "memory");
        }
    }

    #[tokio::test]
    async fn log_channel_always_succeeds() {
        let channel = LogChannel::default();
        assert_eq!(channel.name(), "log");
        channel.send("hello").await.unwrap();
    }

    #[tokio::test]
    async fn slack_unreachable_endpoint_fails() {
        let config = SlackConfig::new("t", "c")
            .unwrap()
            .with_api_url("http://127.0.0.1:1")
            .with_retry(RetryConfig::immediate(2));
        let channel = SlackChannel::new(config).unwrap();
        let err = channel.send("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::Http(_)));
    }
}
