// =============================================================================
// Telegram Bot API notifier — sendMessage in HTML parse mode
// =============================================================================
//
// Reply mapping:
//   ok: true                               -> delivered
//   429 + parameters.retry_after (seconds) -> Throttled
//   anything else                          -> Permanent (blocked bot, bad chat, ...)
//
// SECURITY: the bot token is part of the URL and is never logged.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::interfaces::{DeliveryError, Notifier};

const API_BASE: &str = "https://api.telegram.org";

/// Used when Telegram says 429 without a `retry_after`.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Clone)]
pub struct TelegramNotifier {
    token: String,
    base_url: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, API_BASE)
    }

    pub fn with_base_url(token: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build reqwest client")?;
        Ok(Self {
            token: token.into(),
            base_url: base_url.into(),
            client,
        })
    }

    #[instrument(skip(self, text), name = "telegram::send_message")]
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), DeliveryError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let payload = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            // reqwest errors embed the URL, which carries the token.
            .map_err(|e| DeliveryError::Permanent(format!("sendMessage transport error: {}", e.without_url())))?;

        let status = resp.status().as_u16();
        let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
        let outcome = classify_response(status, &body);
        debug!(chat_id, status, ok = outcome.is_ok(), "sendMessage answered");
        outcome
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn deliver(&self, subscriber_id: i64, message: &str) -> Result<(), DeliveryError> {
        self.send_message(subscriber_id, message).await
    }
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Stand-in when no bot token is configured: logs each message and reports
/// it delivered, so the rest of the pipeline (cooldowns, signal log) behaves
/// exactly as in production.
#[derive(Debug, Default)]
pub struct LogOnlyNotifier;

#[async_trait]
impl Notifier for LogOnlyNotifier {
    async fn deliver(&self, subscriber_id: i64, message: &str) -> Result<(), DeliveryError> {
        info!(subscriber_id, body = message, "dry-run delivery (no TELEGRAM_BOT_TOKEN)");
        Ok(())
    }
}

/// Map an HTTP status plus Bot API body to a delivery outcome.
pub fn classify_response(status: u16, body: &serde_json::Value) -> Result<(), DeliveryError> {
    if (200..300).contains(&status) && body.get("ok").and_then(|v| v.as_bool()).unwrap_or(true) {
        return Ok(());
    }

    let error_code = body
        .get("error_code")
        .and_then(|v| v.as_u64())
        .unwrap_or(u64::from(status));

    if error_code == 429 {
        let retry_after = body
            .pointer("/parameters/retry_after")
            .and_then(|v| v.as_u64())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RETRY_AFTER);
        return Err(DeliveryError::Throttled { retry_after });
    }

    let description = body
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or("no description");
    Err(DeliveryError::Permanent(format!("telegram error {error_code}: {description}")))
}
