use super::{Transport, TransportError};
use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub address: String,
    pub body: String,
    pub message_id: String,
}

/// Local stand-in for a real carrier: accepts everything while connected.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    latency: Duration,
    sent: Mutex<Vec<SentMessage>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Self::with_latency(Duration::from_millis(200))
    }

    pub fn with_latency(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(true),
            latency,
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn is_available(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, address: &str, body: &str) -> Result<String, TransportError> {
        // simulate network latency
        sleep(self.latency).await;
        if !self.is_available() {
            return Err(TransportError::Connection("Connection Closed".to_string()));
        }

        let message_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMessage {
                address: address.to_string(),
                body: body.to_string(),
                message_id: message_id.clone(),
            });
        }
        tracing::debug!(%address, %message_id, "mock transport accepted message");
        Ok(message_id)
    }
}
