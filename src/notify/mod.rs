//! Notification side channel
//!
//! Scan progress and failures are pushed to a [`NotifySink`]. Delivery is
//! best effort: a sink never fails the operation that notified it.

mod webhook;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::observability::{Event, Logger};

pub use webhook::WebhookSink;

/// Notification severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifySeverity {
    Info,
    Warning,
    Critical,
}

impl NotifySeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifySeverity::Info => "info",
            NotifySeverity::Warning => "warning",
            NotifySeverity::Critical => "critical",
        }
    }
}

/// Destination for operator notifications.
#[async_trait]
pub trait NotifySink: Send + Sync {
    async fn send(&self, message: &str, severity: NotifySeverity);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotifySink for LogSink {
    async fn send(&self, message: &str, severity: NotifySeverity) {
        let fields = [("severity", severity.as_str()), ("message", message)];
        match severity {
            NotifySeverity::Info => Logger::info(Event::NotifySent, &fields),
            NotifySeverity::Warning => Logger::warn(Event::NotifySent, &fields),
            NotifySeverity::Critical => Logger::error(Event::NotifySent, &fields),
        }
    }
}

/// Records notifications in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    sent: Mutex<Vec<(String, NotifySeverity)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, NotifySeverity)> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn count(&self, severity: NotifySeverity) -> usize {
        self.messages().iter().filter(|(_, s)| *s == severity).count()
    }
}

#[async_trait]
impl NotifySink for MemorySink {
    async fn send(&self, message: &str, severity: NotifySeverity) {
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((message.to_string(), severity));
    }
}

/// Delivers every notification to each inner sink, in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotifySink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotifySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotifySink for FanoutSink {
    async fn send(&self, message: &str, severity: NotifySeverity) {
        for sink in &self.sinks {
            sink.send(message, severity).await;
        }
    }
}
