use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use peptalk_core::config::TelegramConfig;
use peptalk_core::errors::DeliverError;
use peptalk_core::pipeline::QuoteDelivery;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

const PARSE_MODE: &str = "Markdown";

pub struct TelegramClient {
    http: reqwest::Client,
    bot_token: SecretString,
    chat_id: String,
    base_url: String,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build telegram http client")?;

        Ok(Self {
            http,
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        // The bot token is part of the URL path per the Bot API shape.
        // Nothing derived from this URL may reach logs or error text.
        format!("{}/bot{}/sendMessage", self.base_url, self.bot_token.expose_secret())
    }
}

#[async_trait]
impl QuoteDelivery for TelegramClient {
    async fn deliver(&self, text: &str) -> Result<(), DeliverError> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text: format_message(text),
            parse_mode: PARSE_MODE,
        };

        debug!(chat_id = %self.chat_id, "calling telegram sendMessage");

        let response = self
            .http
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let description = response
                .json::<SendMessageResponse>()
                .await
                .ok()
                .and_then(|body| body.description);
            return Err(classify_status(status, description));
        }

        let body: SendMessageResponse = response
            .json()
            .await
            .map_err(|_| DeliverError::Unavailable("unreadable provider response".to_string()))?;
        if !body.ok {
            return Err(DeliverError::Unavailable(format!(
                "provider reported failure: {}",
                body.description.unwrap_or_else(|| "no description".to_string())
            )));
        }

        Ok(())
    }
}

/// Markdown framing around the raw quote. The quote itself is passed
/// through unescaped, as the legacy `Markdown` parse mode expects.
pub fn format_message(quote: &str) -> String {
    format!("*Daily pep talk*\n\n_{quote}_")
}

fn classify_transport_error(error: reqwest::Error) -> DeliverError {
    // reqwest error text can embed the request URL, which carries the
    // bot token here; classify by kind and keep the message static.
    if error.is_timeout() {
        DeliverError::Unavailable("request timed out".to_string())
    } else if error.is_connect() {
        DeliverError::Unavailable("connection failed".to_string())
    } else {
        DeliverError::Unavailable("transport error".to_string())
    }
}

fn classify_status(status: StatusCode, description: Option<String>) -> DeliverError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => {
            DeliverError::Auth(format!("provider rejected the bot token (status {status})"))
        }
        StatusCode::BAD_REQUEST | StatusCode::FORBIDDEN => DeliverError::TargetInvalid(
            description.unwrap_or_else(|| format!("destination rejected (status {status})")),
        ),
        StatusCode::TOO_MANY_REQUESTS => {
            DeliverError::Unavailable("rate limited (status 429)".to_string())
        }
        other => DeliverError::Unavailable(format!("provider returned status {other}")),
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}
