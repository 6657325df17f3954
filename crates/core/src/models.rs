use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    None,
    Connection,
    Other,
}

impl ErrorKind {
    /// Triage free-text transport errors. Carrier-side drops usually surface
    /// as "Connection Closed" or similar.
    pub fn classify(error_text: &str) -> Self {
        let lower = error_text.to_lowercase();
        if lower.contains("connection") || lower.contains("close") {
            ErrorKind::Connection
        } else {
            ErrorKind::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub recipient: String,
    /// 1-based.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub error_kind: ErrorKind,
    pub error_message: Option<String>,
    /// Delay waited after this attempt before the next one.
    pub backoff_ms: Option<u64>,
}

impl DispatchAttempt {
    pub fn succeeded(recipient: &str, attempt: u32) -> Self {
        Self {
            recipient: recipient.to_string(),
            attempt,
            outcome: AttemptOutcome::Success,
            error_kind: ErrorKind::None,
            error_message: None,
            backoff_ms: None,
        }
    }

    pub fn failed(recipient: &str, attempt: u32, kind: ErrorKind, error: String) -> Self {
        Self {
            recipient: recipient.to_string(),
            attempt,
            outcome: AttemptOutcome::Failure,
            error_kind: kind,
            error_message: Some(error),
            backoff_ms: None,
        }
    }

    pub fn with_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = Some(backoff_ms);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub recipient: String,
    /// Canonical transport address, absent when the recipient could not be normalized.
    pub address: Option<String>,
    pub success: bool,
    pub message: String,
    pub attempts: Vec<DispatchAttempt>,
}

impl DispatchResult {
    pub fn failure(recipient: &str, address: Option<String>, message: impl Into<String>) -> Self {
        Self {
            recipient: recipient.to_string(),
            address,
            success: false,
            message: message.into(),
            attempts: Vec::new(),
        }
    }

    pub fn with_attempts(mut self, attempts: Vec<DispatchAttempt>) -> Self {
        self.attempts = attempts;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub results: Vec<DispatchResult>,
    pub success_count: usize,
    pub total_count: usize,
}

impl BatchOutcome {
    pub fn from_results(results: Vec<DispatchResult>) -> Self {
        let success_count = results.iter().filter(|r| r.success).count();
        let total_count = results.len();
        Self {
            results,
            success_count,
            total_count,
        }
    }

    pub fn failed_recipients(&self) -> impl Iterator<Item = &DispatchResult> {
        self.results.iter().filter(|r| !r.success)
    }
}
