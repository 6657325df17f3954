use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event_type: String,
    pub batch_id: String,
    pub recipient: Option<String>,
    pub attempt: Option<u32>,
    pub state: String,
    pub error: Option<String>,
    pub message_hash: Option<String>,
}

impl AuditEvent {
    pub fn new(event_type: &str, batch_id: &str, state: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event_type: event_type.to_string(),
            batch_id: batch_id.to_string(),
            recipient: None,
            attempt: None,
            state: state.to_string(),
            error: None,
            message_hash: None,
        }
    }

    pub fn with_recipient(mut self, recipient: &str) -> Self {
        self.recipient = Some(recipient.to_string());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_hash(mut self, hash: String) -> Self {
        self.message_hash = Some(hash);
        self
    }
}

/// Append-only JSON-lines file of dispatch events.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, event: &AuditEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open audit log {}", self.path.display()))?;

        let json = serde_json::to_string(event)?;
        writeln!(file, "{}", json)?;
        tracing::debug!(event_type=%event.event_type, batch_id=%event.batch_id, "Audit event written");
        Ok(())
    }

    pub fn read_all(&self) -> Result<Vec<AuditEvent>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read audit log {}", self.path.display()))?;
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).context("Malformed audit line"))
            .collect()
    }
}
