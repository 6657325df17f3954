use anyhow::{Context, Result};
use isp_notify_core::format::OfflineListOptions;
use isp_notify_core::recipient::DEFAULT_ADDRESS_SUFFIX;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "isp-notify";
const KEYCHAIN_SERVICE: &str = "isp.notify.credentials";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub dispatch: DispatchSettings,
    #[serde(default)]
    pub pppoe: PppoeNotificationSettings,
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub technicians: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_transport_kind")]
    pub kind: String, // "mock" | "meta_api"
    pub base_url: Option<String>,
    pub phone_number_id: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: default_transport_kind(),
            base_url: None,
            phone_number_id: None,
        }
    }
}

fn default_transport_kind() -> String {
    "mock".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,
    #[serde(default = "default_address_suffix")]
    pub address_suffix: String,
    #[serde(default = "default_audit_log")]
    pub audit_log: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            address_suffix: default_address_suffix(),
            audit_log: default_audit_log(),
        }
    }
}

fn default_max_retries() -> i32 {
    3
}

fn default_address_suffix() -> String {
    DEFAULT_ADDRESS_SUFFIX.to_string()
}

fn default_audit_log() -> String {
    "dispatch_audit.jsonl".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PppoeNotificationSettings {
    #[serde(default = "enabled")]
    pub enabled: bool,
    #[serde(default = "enabled")]
    pub login_notifications: bool,
    #[serde(default = "enabled")]
    pub logout_notifications: bool,
    #[serde(default = "enabled")]
    pub include_offline_list: bool,
    #[serde(default = "default_max_offline_list_count")]
    pub max_offline_list_count: usize,
}

impl Default for PppoeNotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            login_notifications: true,
            logout_notifications: true,
            include_offline_list: true,
            max_offline_list_count: default_max_offline_list_count(),
        }
    }
}

impl PppoeNotificationSettings {
    pub fn offline_list(&self) -> OfflineListOptions {
        OfflineListOptions {
            include: self.include_offline_list,
            max_count: self.max_offline_list_count,
        }
    }
}

fn enabled() -> bool {
    true
}

fn default_max_offline_list_count() -> usize {
    20
}

impl AppConfig {
    /// Returns false when the number was already listed.
    pub fn add_admin(&mut self, number: &str) -> bool {
        add_unique(&mut self.admins, number)
    }

    pub fn remove_admin(&mut self, number: &str) -> bool {
        remove_all(&mut self.admins, number)
    }

    pub fn add_technician(&mut self, number: &str) -> bool {
        add_unique(&mut self.technicians, number)
    }

    pub fn remove_technician(&mut self, number: &str) -> bool {
        remove_all(&mut self.technicians, number)
    }
}

fn add_unique(list: &mut Vec<String>, number: &str) -> bool {
    let number = number.trim();
    if number.is_empty() || list.iter().any(|n| n == number) {
        return false;
    }
    list.push(number.to_string());
    true
}

fn remove_all(list: &mut Vec<String>, number: &str) -> bool {
    let number = number.trim();
    let before = list.len();
    list.retain(|n| n != number);
    list.len() != before
}

pub fn config_path() -> Result<PathBuf> {
    confy::get_configuration_file_path(APP_NAME, None).context("Failed to resolve config path")
}

/// A missing file is created with defaults; an unreadable one is an error.
pub fn load_from(path: &Path) -> Result<AppConfig> {
    let cfg: AppConfig = confy::load_path(path)
        .with_context(|| format!("Failed to load app config from {}", path.display()))?;
    Ok(cfg)
}

pub fn store_to(cfg: &AppConfig, path: &Path) -> Result<()> {
    confy::store_path(path, cfg)
        .with_context(|| format!("Failed to store app config to {}", path.display()))?;
    Ok(())
}

/// Store a secret in the OS keychain
pub fn store_secret(key: &str, value: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    entry.set_password(value)?;
    Ok(())
}

/// Retrieve a secret from the OS keychain
pub fn get_secret(key: &str) -> Result<String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    let password = entry.get_password()?;
    Ok(password)
}

pub fn delete_secret(key: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    entry.delete_password()?;
    Ok(())
}
