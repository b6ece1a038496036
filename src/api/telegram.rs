use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use super::Notifier;
use crate::error::BotError;
use crate::Result;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT_SECS: u64 = 10;

/// Telegram bot alert sender
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

impl TelegramNotifier {
    pub fn new(bot_token: String, chat_id: String) -> Result<Self> {
        Self::with_base_url(TELEGRAM_API_BASE, bot_token, chat_id)
    }

    pub fn with_base_url(base_url: &str, bot_token: String, chat_id: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .map_err(|e| BotError::Config(format!("failed to build Telegram client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token,
            chat_id,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: message,
            parse_mode: "Markdown",
        };

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| BotError::Notification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BotError::Notification(format!("Telegram returned {}: {}", status, body)));
        }

        Ok(())
    }
}

/// Where alerts go: Telegram when configured, otherwise only the log
#[derive(Clone)]
pub enum AlertChannel {
    Telegram(TelegramNotifier),
    LogOnly,
}

impl AlertChannel {
    pub fn from_credentials(bot_token: Option<String>, chat_id: Option<String>) -> Result<Self> {
        match (bot_token, chat_id) {
            (Some(token), Some(chat)) if !token.is_empty() && !chat.is_empty() => {
                Ok(AlertChannel::Telegram(TelegramNotifier::new(token, chat)?))
            }
            _ => {
                tracing::warn!(
                    "TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID not set, alerts go to the log only"
                );
                Ok(AlertChannel::LogOnly)
            }
        }
    }
}

#[async_trait]
impl Notifier for AlertChannel {
    async fn notify(&self, message: &str) -> Result<()> {
        match self {
            AlertChannel::Telegram(telegram) => telegram.notify(message).await,
            AlertChannel::LogOnly => {
                tracing::info!(alert = %message, "Alert");
                Ok(())
            }
        }
    }
}
