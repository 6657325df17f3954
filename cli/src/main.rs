mod commands;

use clap::Parser;
use config::AppConfig;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transport::{meta_api::MetaApiTransport, mock::MockTransport, Transport};

pub(crate) const META_API_KEY_SECRET: &str = "whatsapp_meta_api_key";

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub(crate) async fn create_transport(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Transport>> {
    match cfg.transport.kind.as_str() {
        "meta_api" => {
            let base_url = cfg
                .transport
                .base_url
                .clone()
                .unwrap_or_else(|| transport::meta_api::DEFAULT_BASE_URL.to_string());
            let phone_number_id = cfg
                .transport
                .phone_number_id
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Meta API phone_number_id not configured"))?;

            let api_key = std::env::var("WHATSAPP_META_API_KEY")
                .or_else(|_| config::get_secret(META_API_KEY_SECRET))
                .map_err(|_| anyhow::anyhow!("Meta API key not found in env or keychain"))?;

            let client = MetaApiTransport::new(base_url, phone_number_id, api_key)?;
            if !client.connect().await? {
                // Sends will be reported as "transport unavailable" per recipient.
                tracing::warn!("Meta API not connected");
            }
            tracing::info!("Using WhatsApp Meta API transport");
            Ok(client)
        }
        "mock" => {
            tracing::info!("Using mock transport");
            Ok(MockTransport::new())
        }
        other => anyhow::bail!("Unknown transport kind: {other}"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = commands::Cli::parse();
    commands::run(cli).await
}
