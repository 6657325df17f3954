pub mod audit;
pub mod notifier;

use audit::{AuditEvent, AuditLog};
use isp_notify_core::format::body_digest;
use isp_notify_core::models::{BatchOutcome, DispatchAttempt, DispatchResult, ErrorKind};
use isp_notify_core::recipient::{to_address, DEFAULT_ADDRESS_SUFFIX};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use transport::Transport;

pub const DEFAULT_MAX_RETRIES: i32 = 3;

pub const SEND_TIMEOUT: Duration = Duration::from_millis(15_000);
pub const VALIDATION_TIMEOUT: Duration = Duration::from_millis(5_000);
/// Wait between consecutive recipients of one batch.
pub const RECIPIENT_PACING: Duration = Duration::from_millis(1_000);

const CONNECTION_BACKOFF_STEP: Duration = Duration::from_millis(3_000);
const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(2_000);
const VALIDATION_BACKOFF_STEP: Duration = Duration::from_millis(1_000);
const VALIDATION_ATTEMPTS: u32 = 2;

pub const MSG_SENT: &str = "sent";
pub const MSG_INVALID_RECIPIENT: &str = "invalid recipient";
pub const MSG_TRANSPORT_UNAVAILABLE: &str = "transport unavailable";
pub const MSG_EXHAUSTED: &str = "exhausted all attempts";

/// Sends one body to many recipients, one at a time, retrying each.
#[derive(Clone)]
pub struct NotificationDispatcher {
    transport: Arc<dyn Transport + 'static>,
    address_suffix: String,
    audit: Option<AuditLog>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub address: Option<String>,
    pub error: Option<String>,
}

struct SendFailure {
    kind: ErrorKind,
    error: String,
}

fn timeout_message(description: &str, limit: Duration) -> String {
    format!("{description} timeout after {}ms", limit.as_millis())
}

// Dropping the caller's future must not leave the recipient retrying on its own.
struct AbortOnDrop(JoinHandle<DispatchResult>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn generate_batch_id() -> String {
    use rand::{distributions::Alphanumeric, Rng};
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn Transport + 'static>) -> Self {
        Self {
            transport,
            address_suffix: DEFAULT_ADDRESS_SUFFIX.to_string(),
            audit: None,
        }
    }

    pub fn with_address_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.address_suffix = suffix.into();
        self
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    fn audit(&self, event: AuditEvent) {
        if let Some(log) = &self.audit {
            let _ = log.write(&event);
        }
    }

    /// Deliver `message` to every recipient in order and report each outcome.
    ///
    /// Never fails: per-recipient problems, including a panicking transport,
    /// end up in that recipient's [`DispatchResult`].
    pub async fn dispatch_batch(
        &self,
        recipients: &[String],
        message: &str,
        max_retries: i32,
    ) -> BatchOutcome {
        let batch_id = generate_batch_id();
        self.audit(AuditEvent::new("batch_started", &batch_id, "started").with_hash(body_digest(message)));
        tracing::info!(%batch_id, recipients = recipients.len(), "dispatching batch");

        let mut results = Vec::with_capacity(recipients.len());
        for (i, recipient) in recipients.iter().enumerate() {
            if i > 0 {
                sleep(RECIPIENT_PACING).await;
            }
            results.push(self.dispatch_isolated(&batch_id, recipient, message, max_retries).await);
        }

        let outcome = BatchOutcome::from_results(results);
        tracing::info!(
            %batch_id,
            success = outcome.success_count,
            total = outcome.total_count,
            "batch finished"
        );
        self.audit(AuditEvent::new(
            "batch_finished",
            &batch_id,
            &format!("{}/{}", outcome.success_count, outcome.total_count),
        ));
        outcome
    }

    /// Single recipient with retries. Same semantics as one entry of a batch.
    pub async fn dispatch_one(&self, recipient: &str, message: &str, max_retries: i32) -> DispatchResult {
        self.dispatch_isolated(&generate_batch_id(), recipient, message, max_retries)
            .await
    }

    // Runs the recipient on its own task so a panic inside the transport is
    // contained to this recipient.
    async fn dispatch_isolated(
        &self,
        batch_id: &str,
        recipient: &str,
        message: &str,
        max_retries: i32,
    ) -> DispatchResult {
        let this = self.clone();
        let (batch, who, body) = (batch_id.to_string(), recipient.to_string(), message.to_string());
        let mut task = AbortOnDrop(tokio::spawn(async move {
            this.run_one(&batch, &who, &body, max_retries).await
        }));

        match (&mut task.0).await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(%batch_id, %recipient, error = %err, "recipient dispatch aborted");
                let error = format!("unexpected error: {err}");
                self.audit(
                    AuditEvent::new("recipient_failed", batch_id, "failed")
                        .with_recipient(recipient)
                        .with_error(error.clone()),
                );
                DispatchResult::failure(recipient, None, error)
            }
        }
    }

    async fn run_one(
        &self,
        batch_id: &str,
        recipient: &str,
        message: &str,
        max_retries: i32,
    ) -> DispatchResult {
        let max_attempts = max_retries.max(1) as u32;

        let Some(address) = to_address(recipient, &self.address_suffix) else {
            tracing::warn!(%recipient, "recipient has no digits, skipping");
            self.audit(
                AuditEvent::new("recipient_failed", batch_id, "invalid")
                    .with_recipient(recipient)
                    .with_error(MSG_INVALID_RECIPIENT.to_string()),
            );
            return DispatchResult::failure(recipient, None, MSG_INVALID_RECIPIENT);
        };

        let mut attempts = Vec::new();
        for attempt in 1..=max_attempts {
            let (failure, step) = if !self.transport.is_available() {
                let failure = SendFailure {
                    kind: ErrorKind::Connection,
                    error: MSG_TRANSPORT_UNAVAILABLE.to_string(),
                };
                (failure, DEFAULT_BACKOFF_STEP)
            } else {
                match self.send_with_timeout(&address, message).await {
                    Ok(message_id) => {
                        attempts.push(DispatchAttempt::succeeded(recipient, attempt));
                        tracing::info!(%address, attempt, %message_id, "message delivered");
                        self.audit(
                            AuditEvent::new("recipient_delivered", batch_id, MSG_SENT)
                                .with_recipient(&address)
                                .with_attempt(attempt),
                        );
                        return DispatchResult {
                            recipient: recipient.to_string(),
                            address: Some(address),
                            success: true,
                            message: MSG_SENT.to_string(),
                            attempts,
                        };
                    }
                    Err(failure) => {
                        let step = match failure.kind {
                            ErrorKind::Connection => CONNECTION_BACKOFF_STEP,
                            _ => DEFAULT_BACKOFF_STEP,
                        };
                        (failure, step)
                    }
                }
            };

            let record = DispatchAttempt::failed(recipient, attempt, failure.kind, failure.error.clone());
            if attempt == max_attempts {
                attempts.push(record);
                tracing::warn!(%address, attempt, error = %failure.error, "giving up on recipient");
                self.audit(
                    AuditEvent::new("recipient_failed", batch_id, "failed")
                        .with_recipient(&address)
                        .with_attempt(attempt)
                        .with_error(failure.error.clone()),
                );
                return DispatchResult::failure(recipient, Some(address), failure.error)
                    .with_attempts(attempts);
            }

            let wait = step * attempt;
            attempts.push(record.with_backoff_ms(wait.as_millis() as u64));
            tracing::warn!(
                %address,
                attempt,
                max_attempts,
                kind = ?failure.kind,
                error = %failure.error,
                wait_ms = wait.as_millis() as u64,
                "send attempt failed, retrying"
            );
            self.audit(
                AuditEvent::new("attempt_failed", batch_id, "retrying")
                    .with_recipient(&address)
                    .with_attempt(attempt)
                    .with_error(failure.error),
            );
            sleep(wait).await;
        }

        DispatchResult::failure(recipient, Some(address), MSG_EXHAUSTED).with_attempts(attempts)
    }

    async fn send_with_timeout(&self, address: &str, body: &str) -> Result<String, SendFailure> {
        match timeout(SEND_TIMEOUT, self.transport.send(address, body)).await {
            Ok(Ok(message_id)) => Ok(message_id),
            Ok(Err(err)) => Err(SendFailure {
                kind: err.kind(),
                error: err.to_string(),
            }),
            Err(_) => {
                let error = timeout_message("send message", SEND_TIMEOUT);
                Err(SendFailure {
                    kind: ErrorKind::classify(&error),
                    error,
                })
            }
        }
    }

    /// Check that a number can receive messages. Unavailability is not retried.
    pub async fn validate_recipient(&self, recipient: &str) -> ValidationOutcome {
        let Some(address) = to_address(recipient, &self.address_suffix) else {
            return ValidationOutcome {
                valid: false,
                address: None,
                error: Some(MSG_INVALID_RECIPIENT.to_string()),
            };
        };

        if !self.transport.is_available() {
            tracing::warn!(%address, "cannot validate, transport unavailable");
            return ValidationOutcome {
                valid: false,
                address: Some(address),
                error: Some(MSG_TRANSPORT_UNAVAILABLE.to_string()),
            };
        }

        let mut last_error = String::new();
        for attempt in 1..=VALIDATION_ATTEMPTS {
            match timeout(VALIDATION_TIMEOUT, self.transport.is_registered(&address)).await {
                Ok(Ok(registered)) => {
                    return ValidationOutcome {
                        valid: registered,
                        address: Some(address),
                        error: (!registered).then(|| "not registered".to_string()),
                    };
                }
                Ok(Err(err)) => last_error = err.to_string(),
                Err(_) => last_error = timeout_message("validation", VALIDATION_TIMEOUT),
            }
            tracing::warn!(%address, attempt, error = %last_error, "validation attempt failed");
            if attempt < VALIDATION_ATTEMPTS {
                sleep(VALIDATION_BACKOFF_STEP * attempt).await;
            }
        }

        ValidationOutcome {
            valid: false,
            address: Some(address),
            error: Some(last_error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use isp_notify_core::models::AttemptOutcome;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;
    use transport::TransportError;

    #[derive(Debug, Clone)]
    enum Step {
        Ok,
        Fail(TransportError),
        Hang,
        Panic,
        Unregistered,
    }

    /// Plays back a script of outcomes; everything succeeds once the script runs out.
    #[derive(Default)]
    struct ScriptedTransport {
        availability: Mutex<VecDeque<bool>>,
        steps: Mutex<VecDeque<Step>>,
        always: Mutex<Option<Step>>,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedTransport {
        fn with_steps(steps: Vec<Step>) -> Arc<Self> {
            let t = Self::default();
            *t.steps.lock().unwrap() = steps.into();
            Arc::new(t)
        }

        fn always(step: Step) -> Arc<Self> {
            let t = Self::default();
            *t.always.lock().unwrap() = Some(step);
            Arc::new(t)
        }

        fn unavailable_for(self: Arc<Self>, checks: usize) -> Arc<Self> {
            self.availability.lock().unwrap().extend(std::iter::repeat(false).take(checks));
            self
        }

        fn next_step(&self) -> Step {
            if let Some(step) = self.steps.lock().unwrap().pop_front() {
                return step;
            }
            self.always.lock().unwrap().clone().unwrap_or(Step::Ok)
        }

        fn calls(&self) -> Vec<(String, Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        fn is_available(&self) -> bool {
            self.availability.lock().unwrap().pop_front().unwrap_or(true)
        }

        async fn send(&self, address: &str, _body: &str) -> Result<String, TransportError> {
            self.calls.lock().unwrap().push((address.to_string(), Instant::now()));
            match self.next_step() {
                Step::Ok | Step::Unregistered => Ok("msg-1".to_string()),
                Step::Fail(err) => Err(err),
                Step::Hang => {
                    sleep(Duration::from_secs(600)).await;
                    Ok("late".to_string())
                }
                Step::Panic => panic!("transport exploded"),
            }
        }

        async fn is_registered(&self, address: &str) -> Result<bool, TransportError> {
            self.calls.lock().unwrap().push((address.to_string(), Instant::now()));
            match self.next_step() {
                Step::Ok => Ok(true),
                Step::Unregistered => Ok(false),
                Step::Fail(err) => Err(err),
                Step::Hang => {
                    sleep(Duration::from_secs(600)).await;
                    Ok(true)
                }
                Step::Panic => panic!("transport exploded"),
            }
        }
    }

    fn numbers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn backoffs(result: &DispatchResult) -> Vec<Option<u64>> {
        result.attempts.iter().map(|a| a.backoff_ms).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_is_not_an_error() {
        let transport = ScriptedTransport::with_steps(vec![]);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let outcome = dispatcher.dispatch_batch(&[], "test", 3).await;
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.success_count, 0);
        assert_eq!(outcome.total_count, 0);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn first_try_success_makes_one_attempt() {
        let transport = ScriptedTransport::with_steps(vec![]);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let result = dispatcher.dispatch_one("081234567890", "hello", 3).await;
        assert!(result.success);
        assert_eq!(result.message, "sent");
        assert_eq!(result.address.as_deref(), Some("6281234567890@s.whatsapp.net"));
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.attempts[0].outcome, AttemptOutcome::Success);
        assert_eq!(result.attempts[0].error_kind, ErrorKind::None);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_recipient_fails_without_attempts() {
        let transport = ScriptedTransport::with_steps(vec![]);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        for raw in ["", "   "] {
            let result = dispatcher.dispatch_one(raw, "hello", 3).await;
            assert!(!result.success);
            assert!(result.message.contains("invalid"));
            assert!(result.attempts.is_empty());
            assert!(result.address.is_none());
        }
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn connection_errors_back_off_three_seconds_per_attempt() {
        let transport =
            ScriptedTransport::always(Step::Fail(TransportError::Send("Connection Closed".into())));
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let result = dispatcher.dispatch_one("081111111111", "hello", 3).await;
        assert!(!result.success);
        assert_eq!(result.message, "Connection Closed");
        assert_eq!(result.attempts.len(), 3);
        assert!(result
            .attempts
            .iter()
            .all(|a| a.error_kind == ErrorKind::Connection && a.outcome == AttemptOutcome::Failure));
        assert_eq!(backoffs(&result), vec![Some(3000), Some(6000), None]);

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[1].1 - calls[0].1 >= Duration::from_millis(3000));
        assert!(calls[2].1 - calls[1].1 >= Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn other_errors_back_off_two_seconds_per_attempt() {
        let transport =
            ScriptedTransport::always(Step::Fail(TransportError::Send("invalid number".into())));
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let result = dispatcher.dispatch_one("081111111111", "hello", 3).await;
        assert!(!result.success);
        assert_eq!(result.message, "invalid number");
        assert!(result.attempts.iter().all(|a| a.error_kind == ErrorKind::Other));
        assert_eq!(backoffs(&result), vec![Some(2000), Some(4000), None]);

        let calls = transport.calls();
        assert!(calls[1].1 - calls[0].1 >= Duration::from_millis(2000));
        assert!(calls[1].1 - calls[0].1 < Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failure() {
        let transport = ScriptedTransport::with_steps(vec![
            Step::Fail(TransportError::Connection("reset".into())),
            Step::Ok,
        ]);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let result = dispatcher.dispatch_one("081111111111", "hello", 3).await;
        assert!(result.success);
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(result.attempts[0].error_kind, ErrorKind::Connection);
        assert_eq!(result.attempts[0].backoff_ms, Some(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_transport_is_retried_then_reported() {
        let transport = ScriptedTransport::with_steps(vec![]).unavailable_for(3);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let result = dispatcher.dispatch_one("081111111111", "hello", 3).await;
        assert!(!result.success);
        assert_eq!(result.message, "transport unavailable");
        assert_eq!(result.attempts.len(), 3);
        assert!(result.attempts.iter().all(|a| a.error_kind == ErrorKind::Connection));
        assert_eq!(backoffs(&result), vec![Some(2000), Some(4000), None]);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn availability_is_rechecked_every_attempt() {
        let transport = ScriptedTransport::with_steps(vec![]).unavailable_for(1);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let result = dispatcher.dispatch_one("081111111111", "hello", 3).await;
        assert!(result.success);
        assert_eq!(result.attempts.len(), 2);
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_send_times_out() {
        let transport = ScriptedTransport::always(Step::Hang);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let started = Instant::now();
        let result = dispatcher.dispatch_one("081111111111", "hello", 1).await;
        assert!(!result.success);
        assert_eq!(result.message, "send message timeout after 15000ms");
        assert_eq!(result.attempts[0].error_kind, ErrorKind::Other);
        assert!(started.elapsed() >= SEND_TIMEOUT);
    }

    #[tokio::test(start_paused = true)]
    async fn non_positive_retries_still_attempt_once() {
        let transport =
            ScriptedTransport::always(Step::Fail(TransportError::Send("invalid number".into())));
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let result = dispatcher.dispatch_one("081111111111", "hello", 0).await;
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(transport.calls().len(), 1);

        let result = dispatcher.dispatch_one("081111111111", "hello", -4).await;
        assert_eq!(result.attempts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_end_to_end() {
        let fail = || Step::Fail(TransportError::Send("invalid number".into()));
        let transport = ScriptedTransport::with_steps(vec![Step::Ok, fail(), fail(), fail()]);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let recipients = numbers(&["081111111111", "082222222222"]);
        let outcome = dispatcher.dispatch_batch(&recipients, "test", 3).await;

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.results[0].recipient, "081111111111");
        assert!(outcome.results[0].success);
        assert_eq!(outcome.results[1].recipient, "082222222222");
        assert!(!outcome.results[1].success);
        assert_eq!(outcome.results[1].attempts.len(), 3);
        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.total_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn recipients_are_processed_sequentially_with_pacing() {
        let fail = || Step::Fail(TransportError::Send("Connection Closed".into()));
        let transport = ScriptedTransport::with_steps(vec![fail(), Step::Ok, fail(), Step::Ok]);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let recipients = numbers(&["0811", "0822", "0833"]);
        let outcome = dispatcher.dispatch_batch(&recipients, "test", 3).await;
        assert_eq!(outcome.success_count, 3);

        let calls = transport.calls();
        let order: Vec<&str> = calls.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(
            order,
            vec![
                "62811@s.whatsapp.net",
                "62811@s.whatsapp.net",
                "62822@s.whatsapp.net",
                "62822@s.whatsapp.net",
                "62833@s.whatsapp.net",
            ]
        );
        for pair in calls.windows(2) {
            assert!(pair[1].1 >= pair[0].1);
            if pair[0].0 != pair[1].0 {
                assert!(pair[1].1 - pair[0].1 >= RECIPIENT_PACING);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_recipient_does_not_stop_the_batch() {
        let transport = ScriptedTransport::with_steps(vec![]);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let recipients = numbers(&["0811", "   ", "0833"]);
        let outcome = dispatcher.dispatch_batch(&recipients, "test", 3).await;

        assert_eq!(outcome.total_count, 3);
        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.results[1].message, "invalid recipient");
        assert!(outcome.success_count <= outcome.total_count);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_transport_is_contained_per_recipient() {
        let transport = ScriptedTransport::with_steps(vec![Step::Panic, Step::Ok]);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let recipients = numbers(&["0811", "0822"]);
        let outcome = dispatcher.dispatch_batch(&recipients, "test", 3).await;

        assert_eq!(outcome.results.len(), 2);
        assert!(!outcome.results[0].success);
        assert!(outcome.results[0].message.starts_with("unexpected error"));
        assert!(outcome.results[1].success);
        assert_eq!(outcome.success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn single_dispatch_contains_a_panic() {
        let transport = ScriptedTransport::with_steps(vec![Step::Panic]);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let result = dispatcher.dispatch_one("0811", "test", 3).await;
        assert!(!result.success);
        assert_eq!(result.recipient, "0811");
        assert!(result.message.starts_with("unexpected error"));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_batch_stops_retrying() {
        let transport = ScriptedTransport::always(Step::Fail(TransportError::Send("boom".into())));
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let recipients = numbers(&["0811"]);
        let cut_short = timeout(
            Duration::from_millis(500),
            dispatcher.dispatch_batch(&recipients, "test", 3),
        )
        .await;
        assert!(cut_short.is_err());
        assert_eq!(transport.calls().len(), 1);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_suffix_is_applied() {
        let transport = ScriptedTransport::with_steps(vec![]);
        let dispatcher = NotificationDispatcher::new(transport.clone()).with_address_suffix("");

        let result = dispatcher.dispatch_one("0811", "hello", 1).await;
        assert_eq!(result.address.as_deref(), Some("62811"));
    }

    #[tokio::test(start_paused = true)]
    async fn batch_writes_audit_trail() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.jsonl"));
        let transport = ScriptedTransport::with_steps(vec![
            Step::Fail(TransportError::Send("Connection Closed".into())),
            Step::Ok,
        ]);
        let dispatcher = NotificationDispatcher::new(transport).with_audit_log(log.clone());

        dispatcher.dispatch_batch(&numbers(&["0811", ""]), "test", 2).await;

        let events = log.read_all().unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(
            kinds,
            vec![
                "batch_started",
                "attempt_failed",
                "recipient_delivered",
                "recipient_failed",
                "batch_finished",
            ]
        );
        assert_eq!(events[0].message_hash.as_deref(), Some(body_digest("test").as_str()));
        assert!(events.iter().all(|e| e.batch_id == events[0].batch_id));
        assert_eq!(events[4].state, "1/2");
    }

    #[tokio::test(start_paused = true)]
    async fn validation_accepts_registered_number() {
        let transport = ScriptedTransport::with_steps(vec![]);
        let dispatcher = NotificationDispatcher::new(transport);

        let outcome = dispatcher.validate_recipient("081234567890").await;
        assert!(outcome.valid);
        assert_eq!(outcome.address.as_deref(), Some("6281234567890@s.whatsapp.net"));
        assert_eq!(outcome.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_reports_unregistered_number() {
        let transport = ScriptedTransport::with_steps(vec![Step::Unregistered]);
        let dispatcher = NotificationDispatcher::new(transport);

        let outcome = dispatcher.validate_recipient("081234567890").await;
        assert!(!outcome.valid);
        assert_eq!(outcome.error.as_deref(), Some("not registered"));
    }

    #[tokio::test(start_paused = true)]
    async fn validation_retries_a_timeout_once() {
        let transport = ScriptedTransport::with_steps(vec![Step::Hang, Step::Ok]);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let outcome = dispatcher.validate_recipient("0811").await;
        assert!(outcome.valid);
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].1 - calls[0].1 >= VALIDATION_TIMEOUT + VALIDATION_BACKOFF_STEP);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_gives_up_after_two_timeouts() {
        let transport = ScriptedTransport::always(Step::Hang);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let outcome = dispatcher.validate_recipient("0811").await;
        assert!(!outcome.valid);
        assert_eq!(outcome.error.as_deref(), Some("validation timeout after 5000ms"));
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn validation_fails_fast_when_unavailable() {
        let transport = ScriptedTransport::with_steps(vec![]).unavailable_for(1);
        let dispatcher = NotificationDispatcher::new(transport.clone());

        let outcome = dispatcher.validate_recipient("0811").await;
        assert!(!outcome.valid);
        assert_eq!(outcome.error.as_deref(), Some("transport unavailable"));
        assert!(transport.calls().is_empty());

        let outcome = dispatcher.validate_recipient("--").await;
        assert_eq!(outcome.error.as_deref(), Some("invalid recipient"));
        assert_eq!(outcome.address, None);
    }
}
