//! Best-effort activity log: every event goes to `tracing`, and a copy is
//! written to the `logs` table for the operator UI.

use std::sync::Arc;

use domains::models::{LogEntry, LogLevel};
use domains::ports::LogRepo;

#[derive(Clone)]
pub struct ActivityLog {
    repo: Arc<dyn LogRepo>,
    source: &'static str,
}

impl ActivityLog {
    pub fn new(repo: Arc<dyn LogRepo>, source: &'static str) -> Self {
        Self { repo, source }
    }

    pub async fn info(&self, message: impl Into<String>, metadata: serde_json::Value) {
        self.write(LogLevel::Info, message.into(), metadata).await;
    }

    pub async fn warn(&self, message: impl Into<String>, metadata: serde_json::Value) {
        self.write(LogLevel::Warning, message.into(), metadata).await;
    }

    pub async fn error(&self, message: impl Into<String>, metadata: serde_json::Value) {
        self.write(LogLevel::Error, message.into(), metadata).await;
    }

    async fn write(&self, level: LogLevel, message: String, metadata: serde_json::Value) {
        match level {
            LogLevel::Debug => tracing::debug!(source = self.source, %metadata, "{message}"),
            LogLevel::Info => tracing::info!(source = self.source, %metadata, "{message}"),
            LogLevel::Warning => tracing::warn!(source = self.source, %metadata, "{message}"),
            LogLevel::Error => tracing::error!(source = self.source, %metadata, "{message}"),
        }

        let entry = LogEntry::new(level, self.source, message).with_metadata(metadata);
        if let Err(e) = self.repo.insert_log(entry).await {
            tracing::warn!(source = self.source, error = %e, "failed to persist log row");
        }
    }
}
