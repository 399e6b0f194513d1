//! Messaging transport abstraction
//!
//! Provides:
//! - A transport trait covering text, single-photo, and media-group sends
//! - A Telegram Bot API implementation with HTML markup
//! - A transient/permanent error split driving retry decisions
//! - A recording mock that doubles as the dry-run transport

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::BotConfig;
use crate::errors::Result;

/// Delivery failure, split by retry eligibility
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// Timeout, connection failure, rate limit, upstream 5xx
    #[error("transient delivery failure: {0}")]
    Transient(String),

    /// Rejected payload (e.g. unbalanced markup); retrying cannot help
    #[error("delivery rejected: {0}")]
    Permanent(String),
}

impl SendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SendError::Transient(_))
    }
}

/// One item of a media-group send
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub url: String,
    pub caption: Option<String>,
}

/// Outbound messaging channel
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat_id: &str, text: &str) -> std::result::Result<(), SendError>;

    async fn send_photo(
        &self,
        chat_id: &str,
        photo_url: &str,
        caption: &str,
    ) -> std::result::Result<(), SendError>;

    async fn send_media_group(
        &self,
        chat_id: &str,
        items: &[MediaItem],
    ) -> std::result::Result<(), SendError>;
}

/// Telegram Bot API transport
pub struct TelegramTransport {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramTransport {
    pub fn new(token: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_base: "https://api.telegram.org".to_string(),
            token: token.to_string(),
        })
    }

    /// Override the API host (test servers)
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    async fn call(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> std::result::Result<(), SendError> {
        let url = format!("{}/bot{}/{}", self.api_base, self.token, method);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| SendError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let description = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());

        // 429 and 5xx are worth another attempt; the rest means the payload
        // itself was rejected.
        if status.as_u16() == 429 || status.is_server_error() {
            Err(SendError::Transient(format!("{}: {}", status, description)))
        } else {
            Err(SendError::Permanent(format!("{}: {}", status, description)))
        }
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> std::result::Result<(), SendError> {
        self.call(
            "sendMessage",
            json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML",
            }),
        )
        .await
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        photo_url: &str,
        caption: &str,
    ) -> std::result::Result<(), SendError> {
        self.call(
            "sendPhoto",
            json!({
                "chat_id": chat_id,
                "photo": photo_url,
                "caption": caption,
                "parse_mode": "HTML",
            }),
        )
        .await
    }

    async fn send_media_group(
        &self,
        chat_id: &str,
        items: &[MediaItem],
    ) -> std::result::Result<(), SendError> {
        let media: Vec<serde_json::Value> = items
            .iter()
            .map(|item| match &item.caption {
                Some(caption) => json!({
                    "type": "photo",
                    "media": item.url,
                    "caption": caption,
                    "parse_mode": "HTML",
                }),
                None => json!({
                    "type": "photo",
                    "media": item.url,
                }),
            })
            .collect();

        self.call(
            "sendMediaGroup",
            json!({
                "chat_id": chat_id,
                "media": media,
            }),
        )
        .await
    }
}

/// A recorded outbound call
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Text {
        chat_id: String,
        text: String,
    },
    Photo {
        chat_id: String,
        url: String,
        caption: String,
    },
    MediaGroup {
        chat_id: String,
        items: Vec<MediaItem>,
    },
}

/// Recording transport for tests and dry runs
///
/// Scripted failures are consumed in order, one per send attempt.
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<TransportCall>>,
    failures: Mutex<VecDeque<SendError>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a failure for the next send attempt
    pub fn fail_next(&self, err: SendError) {
        self.failures
            .lock()
            .expect("mock lock poisoned")
            .push_back(err);
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().expect("mock lock poisoned").clone()
    }

    fn push(&self, call: TransportCall) -> std::result::Result<(), SendError> {
        self.calls.lock().expect("mock lock poisoned").push(call);
        match self
            .failures
            .lock()
            .expect("mock lock poisoned")
            .pop_front()
        {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_text(&self, chat_id: &str, text: &str) -> std::result::Result<(), SendError> {
        info!(chat_id, chars = text.chars().count(), "Dry-run text send");
        self.push(TransportCall::Text {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
        })
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        photo_url: &str,
        caption: &str,
    ) -> std::result::Result<(), SendError> {
        info!(chat_id, photo_url, "Dry-run photo send");
        self.push(TransportCall::Photo {
            chat_id: chat_id.to_string(),
            url: photo_url.to_string(),
            caption: caption.to_string(),
        })
    }

    async fn send_media_group(
        &self,
        chat_id: &str,
        items: &[MediaItem],
    ) -> std::result::Result<(), SendError> {
        info!(chat_id, count = items.len(), "Dry-run media group send");
        self.push(TransportCall::MediaGroup {
            chat_id: chat_id.to_string(),
            items: items.to_vec(),
        })
    }
}

/// Create a transport from bot configuration; without a token the bot runs
/// against the dry-run transport.
pub fn create_transport(config: &BotConfig) -> Result<Arc<dyn Transport>> {
    match config.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => Ok(Arc::new(TelegramTransport::new(token)?)),
        None => {
            warn!("No transport token configured, using dry-run transport");
            Ok(Arc::new(MockTransport::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_transience() {
        assert!(SendError::Transient("timeout".into()).is_transient());
        assert!(!SendError::Permanent("bad markup".into()).is_transient());
    }

    #[tokio::test]
    async fn test_mock_records_and_fails_in_order() {
        let transport = MockTransport::new();
        transport.fail_next(SendError::Transient("flood".into()));

        let first = transport.send_text("chat", "раз").await;
        assert_eq!(first, Err(SendError::Transient("flood".into())));

        let second = transport.send_text("chat", "два").await;
        assert!(second.is_ok());

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[0], TransportCall::Text { text, .. } if text == "раз"));
    }

    #[test]
    fn test_dry_run_transport_without_token() {
        let config = BotConfig::default();
        assert!(create_transport(&config).is_ok());
    }
}
