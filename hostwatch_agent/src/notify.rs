//! Delivery of alert text to the administrator.
//!
//! Delivery is best-effort and at-most-once: [`deliver`] logs a failure and
//! moves on, nothing is queued or retried.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::error::MonitorError;

/// HTTP timeout for a single delivery attempt.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const TELEGRAM_API: &str = "https://api.telegram.org";

pub trait NotificationSink: Send + Sync + 'static {
    fn notify(&self, message: &str) -> impl Future<Output = Result<(), MonitorError>> + Send;
}

/// Send `message`, logging instead of propagating a delivery failure.
pub async fn deliver<N: NotificationSink>(sink: &N, message: &str) -> bool {
    match sink.notify(message).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "notification dropped");
            false
        }
    }
}

/// Writes notifications to the log; used when no chat is configured.
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl NotificationSink for LogSink {
    async fn notify(&self, message: &str) -> Result<(), MonitorError> {
        info!(target: "hostwatch::notify", "{message}");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

/// Sends notifications to one chat through the Telegram Bot API.
pub struct TelegramSink {
    client: reqwest::Client,
    endpoint: String,
    chat_id: i64,
}

impl TelegramSink {
    pub fn new(api_base: &str, token: &str, chat_id: i64) -> Result<Self, MonitorError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MonitorError::DeliveryFailed(format!("http client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/bot{token}/sendMessage", api_base.trim_end_matches('/')),
            chat_id,
        })
    }
}

impl NotificationSink for TelegramSink {
    async fn notify(&self, message: &str) -> Result<(), MonitorError> {
        let body = SendMessage {
            chat_id: self.chat_id,
            text: message,
            parse_mode: "Markdown",
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| MonitorError::DeliveryFailed(e.without_url().to_string()))?;
        if !response.status().is_success() {
            return Err(MonitorError::DeliveryFailed(format!(
                "telegram returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// The sink chosen at startup.
pub enum Notifier {
    Log(LogSink),
    Telegram(TelegramSink),
}

impl NotificationSink for Notifier {
    async fn notify(&self, message: &str) -> Result<(), MonitorError> {
        match self {
            Notifier::Log(s) => s.notify(message).await,
            Notifier::Telegram(s) => s.notify(message).await,
        }
    }
}
