//! HTTP webhook notifications

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::observability::{Event, Logger};

use super::{NotifySeverity, NotifySink};

/// Posts `{"text": ..., "severity": ...}` to a webhook URL.
///
/// Delivery failures are logged and dropped.
pub struct WebhookSink {
    http: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, String> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

pub(crate) fn payload(message: &str, severity: NotifySeverity) -> serde_json::Value {
    json!({ "text": message, "severity": severity.as_str() })
}

#[async_trait]
impl NotifySink for WebhookSink {
    async fn send(&self, message: &str, severity: NotifySeverity) {
        let result = self
            .http
            .post(&self.url)
            .json(&payload(message, severity))
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => Logger::trace(Event::NotifySent, &[("sink", "webhook")]),
            Err(e) => Logger::warn(
                Event::NotifyFailed,
                &[("sink", "webhook"), ("error", &e.to_string())],
            ),
        }
    }
}
