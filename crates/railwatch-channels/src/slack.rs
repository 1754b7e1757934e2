//! Slack channel: delivers notices with the Web API `chat.postMessage`.
//! The destination is a channel id or a user id (Slack opens the DM).

use async_trait::async_trait;
use railwatch_core::config::SlackConfig;
use railwatch_core::error::{RailwatchError, Result};
use railwatch_core::traits::Notifier;
use railwatch_core::types::OutboundMessage;
use serde::Deserialize;
use std::time::Duration;

pub struct SlackNotifier {
    client: reqwest::Client,
    bot_token: String,
    api_base: String,
    timeout: Duration,
}

impl SlackNotifier {
    pub fn new(config: &SlackConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            bot_token: config.bot_token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base, method)
    }
}

/// JSON body for `chat.postMessage`.
pub fn post_message_body(channel: &str, message: &OutboundMessage) -> serde_json::Value {
    let mut body = serde_json::json!({
        "channel": channel,
        "text": message.text,
    });
    if !message.blocks.is_empty() {
        body["blocks"] = serde_json::json!(message.blocks);
    }
    body
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn name(&self) -> &str {
        "slack"
    }

    async fn send(&self, destination_id: &str, message: &OutboundMessage) -> Result<()> {
        let response = self
            .client
            .post(self.api_url("chat.postMessage"))
            .bearer_auth(&self.bot_token)
            .json(&post_message_body(destination_id, message))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| RailwatchError::Notify(format!("chat.postMessage failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RailwatchError::Notify(format!("Slack API error {status}: {body}")));
        }

        let result: SlackApiResponse = response
            .json()
            .await
            .map_err(|e| RailwatchError::Notify(format!("Invalid Slack response: {e}")))?;
        result.into_result()?;

        tracing::debug!("Slack message sent to {destination_id}");
        Ok(())
    }
}

// --- Slack API Types ---

/// Slack reports failures as HTTP 200 with `ok: false`.
#[derive(Debug, Deserialize)]
pub struct SlackApiResponse {
    pub ok: bool,
    pub error: Option<String>,
    #[serde(default)]
    pub warning: Option<String>,
}

impl SlackApiResponse {
    pub fn into_result(self) -> Result<()> {
        if let Some(warning) = &self.warning {
            tracing::debug!("Slack warning: {warning}");
        }
        if self.ok {
            Ok(())
        } else {
            Err(RailwatchError::Notify(format!(
                "Slack rejected message: {}",
                self.error.unwrap_or_else(|| "unknown_error".into())
            )))
        }
    }
}
