use super::{Transport, TransportError};
use anyhow::{Context, Result};
use async_trait::async_trait;
use isp_notify_core::recipient::address_digits;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub const DEFAULT_BASE_URL: &str = "https://graph.facebook.com/v18.0";

/// WhatsApp Business (Meta Cloud API) sender.
pub struct MetaApiTransport {
    pub base_url: String,
    pub phone_number_id: String,
    api_key: String,
    http_client: reqwest::Client,
    connected: AtomicBool,
    display_number: RwLock<Option<String>>,
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    text: TextBody<'a>,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessageId>,
}

#[derive(Debug, Deserialize)]
struct SentMessageId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct PhoneNumberInfo {
    verified_name: Option<String>,
    display_phone_number: Option<String>,
}

impl MetaApiTransport {
    pub fn new(base_url: String, phone_number_id: String, api_key: String) -> Result<Arc<Self>> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Arc::new(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            phone_number_id,
            api_key,
            http_client,
            connected: AtomicBool::new(false),
            display_number: RwLock::new(None),
        }))
    }

    /// Verify credentials against the phone number resource and mark the
    /// transport connected on success.
    pub async fn connect(&self) -> Result<bool> {
        let url = format!("{}/{}", self.base_url, self.phone_number_id);
        let resp = self
            .http_client
            .get(&url)
            .query(&[
                ("fields", "verified_name,display_phone_number"),
                ("access_token", self.api_key.as_str()),
            ])
            .send()
            .await;

        let resp = match resp {
            Ok(resp) if resp.status().is_success() => resp,
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(%status, %body, "Meta API connection check rejected");
                self.connected.store(false, Ordering::SeqCst);
                return Ok(false);
            }
            Err(err) => {
                tracing::error!(error = %err, "Meta API connection failed");
                self.connected.store(false, Ordering::SeqCst);
                return Ok(false);
            }
        };

        let info: PhoneNumberInfo = resp
            .json()
            .await
            .context("Failed to parse phone number info")?;

        let Some(name) = info.verified_name else {
            self.connected.store(false, Ordering::SeqCst);
            return Ok(false);
        };

        {
            let mut display = self.display_number.write().await;
            *display = info.display_phone_number;
        }
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(verified_name = %name, "Meta API connected");
        Ok(true)
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        tracing::info!("Meta API disconnected");
    }

    pub async fn display_number(&self) -> Option<String> {
        self.display_number.read().await.clone()
    }
}

fn map_request_error(err: reqwest::Error) -> TransportError {
    if err.is_connect() || err.is_timeout() {
        TransportError::Connection(format!("connection error: {err}"))
    } else {
        TransportError::Send(err.to_string())
    }
}

#[async_trait]
impl Transport for MetaApiTransport {
    fn is_available(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, address: &str, body: &str) -> Result<String, TransportError> {
        let url = format!("{}/{}/messages", self.base_url, self.phone_number_id);
        let payload = SendRequest {
            messaging_product: "whatsapp",
            to: address_digits(address),
            kind: "text",
            text: TextBody { body },
        };

        let resp = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(map_request_error)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Send(format!("{status} - {body}")));
        }

        let sent: SendResponse = resp
            .json()
            .await
            .map_err(|e| TransportError::Send(format!("invalid send response: {e}")))?;

        let id = sent
            .messages
            .into_iter()
            .next()
            .map(|m| m.id)
            .ok_or_else(|| TransportError::Send("No message ID returned".to_string()))?;

        tracing::info!(to = %payload.to, message_id = %id, "Message sent via Meta API");
        Ok(id)
    }
}
