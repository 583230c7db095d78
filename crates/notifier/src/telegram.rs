//! Telegram Bot API sender.
//!
//! Posts to `sendMessage` with Markdown formatting. A Markdown message the
//! platform cannot parse is resent once as plain text.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use herald_common::error::SendError;

use crate::ChatSender;

const API_BASE: &str = "https://api.telegram.org";

/// Fragment of the error description for malformed Markdown.
const ENTITY_PARSE_ERROR: &str = "can't parse entities";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_web_page_preview: bool,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramResponse {
    #[serde(default)]
    ok: bool,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Sends messages to one chat through the Bot API.
pub struct TelegramSender {
    http: Client,
    /// `https://api.telegram.org/bot{token}` unless overridden.
    base_url: String,
    chat_id: String,
}

impl TelegramSender {
    /// `timeout` bounds each HTTP request, connect included.
    pub fn new(token: &str, chat_id: impl Into<String>, timeout: Duration) -> Result<Self, SendError> {
        Self::with_base_url(format!("{API_BASE}/bot{token}"), chat_id, timeout)
    }

    /// Sender against a custom base URL, e.g. a local mock server.
    pub fn with_base_url(
        base_url: impl Into<String>,
        chat_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SendError> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(transport_error)?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            chat_id: chat_id.into(),
        })
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    async fn post(&self, text: &str, parse_mode: Option<&str>) -> Result<(), SendError> {
        let url = format!("{}/sendMessage", self.base_url);
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode,
            disable_web_page_preview: false,
        };

        let resp = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        let header_retry_after = resp
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        // Error pages from proxies are not JSON; fall back to an empty body.
        let raw = resp.text().await.map_err(transport_error)?;
        let body: TelegramResponse = serde_json::from_str(&raw).unwrap_or_default();

        classify(status, body, header_retry_after)
    }
}

/// The request URL embeds the bot token, so it is stripped from the message.
fn transport_error(e: reqwest::Error) -> SendError {
    SendError::Connection(e.without_url().to_string())
}

fn classify(
    status: StatusCode,
    body: TelegramResponse,
    header_retry_after: Option<u64>,
) -> Result<(), SendError> {
    if status.is_success() && body.ok {
        return Ok(());
    }

    let description = body
        .description
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = body
            .parameters
            .and_then(|p| p.retry_after)
            .or(header_retry_after)
            .map(Duration::from_secs);
        return Err(SendError::RateLimited { retry_after });
    }

    if status.is_server_error() {
        return Err(SendError::Server {
            status: status.as_u16(),
            description,
        });
    }

    Err(SendError::Rejected {
        status: status.as_u16(),
        description,
    })
}

#[async_trait]
impl ChatSender for TelegramSender {
    async fn send_text(&self, text: &str) -> Result<(), SendError> {
        match self.post(text, Some("Markdown")).await {
            Err(SendError::Rejected {
                status: 400,
                description,
            }) if description.contains(ENTITY_PARSE_ERROR) => {
                tracing::warn!(
                    chat_id = %self.chat_id,
                    %description,
                    "Markdown rejected, resending as plain text"
                );
                self.post(text, None).await
            }
            other => other,
        }
    }
}
