use async_trait::async_trait;
use isp_notify_core::models::ErrorKind;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport not connected")]
    NotConnected,
    /// The transport already knows this was a connection-level failure.
    #[error("{0}")]
    Connection(String),
    /// Free-text failure reported by the carrier.
    #[error("{0}")]
    Send(String),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::NotConnected | TransportError::Connection(_) => ErrorKind::Connection,
            TransportError::Send(text) => ErrorKind::classify(text),
        }
    }
}

/// Outbound text channel used by the dispatcher.
///
/// Implementations must not assume they will be called with a timeout of
/// their own; the dispatcher bounds every call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether a send attempt is worth making right now.
    fn is_available(&self) -> bool;

    /// Send `body` to a canonical address. Returns the carrier's message id.
    async fn send(&self, address: &str, body: &str) -> Result<String, TransportError>;

    async fn is_registered(&self, _address: &str) -> Result<bool, TransportError> {
        Ok(true)
    }
}

pub mod meta_api;
pub mod mock;
