use super::NotificationDispatcher;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use config::PppoeNotificationSettings;
use isp_notify_core::format::{
    batch_login_message, batch_logout_message, login_message, logout_message, PppoeUser,
};
use isp_notify_core::models::BatchOutcome;
use isp_notify_core::recipient::merge_recipients;
use std::fmt;
use std::sync::Arc;

/// Where admin and technician numbers come from.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn admin_numbers(&self) -> Result<Vec<String>>;
    async fn technician_numbers(&self) -> Result<Vec<String>>;
}

/// Directory backed by the lists in the settings file.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    pub admins: Vec<String>,
    pub technicians: Vec<String>,
}

impl StaticDirectory {
    pub fn new(admins: Vec<String>, technicians: Vec<String>) -> Arc<Self> {
        Arc::new(Self { admins, technicians })
    }
}

#[async_trait]
impl RecipientDirectory for StaticDirectory {
    async fn admin_numbers(&self) -> Result<Vec<String>> {
        Ok(self.admins.clone())
    }

    async fn technician_numbers(&self) -> Result<Vec<String>> {
        Ok(self.technicians.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NoUsers,
    NoRecipients,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::Disabled => "notifications disabled",
            SkipReason::NoUsers => "no users to report",
            SkipReason::NoRecipients => "no notification recipients",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub enum NotifyOutcome {
    Skipped(SkipReason),
    Dispatched(BatchOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Login,
    Logout,
}

/// Sends PPPoE login/logout notices to every admin and technician.
pub struct PppoeNotifier {
    dispatcher: NotificationDispatcher,
    directory: Arc<dyn RecipientDirectory + 'static>,
    settings: PppoeNotificationSettings,
    max_retries: i32,
}

impl PppoeNotifier {
    pub fn new(
        dispatcher: NotificationDispatcher,
        directory: Arc<dyn RecipientDirectory + 'static>,
        settings: PppoeNotificationSettings,
        max_retries: i32,
    ) -> Self {
        Self {
            dispatcher,
            directory,
            settings,
            max_retries,
        }
    }

    fn enabled_for(&self, event: Event) -> bool {
        self.settings.enabled
            && match event {
                Event::Login => self.settings.login_notifications,
                Event::Logout => self.settings.logout_notifications,
            }
    }

    pub async fn recipients(&self) -> Vec<String> {
        let admins = match self.directory.admin_numbers().await {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "failed to load admin numbers");
                Vec::new()
            }
        };
        let technicians = match self.directory.technician_numbers().await {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "failed to load technician numbers");
                Vec::new()
            }
        };
        let merged = merge_recipients(&admins, &technicians);
        tracing::info!(
            admins = admins.len(),
            technicians = technicians.len(),
            total = merged.len(),
            "resolved notification recipients"
        );
        merged
    }

    // Gates run in order: toggle, then users, then directory lookup.
    async fn deliver(
        &self,
        event: Event,
        has_users: bool,
        body: impl FnOnce() -> String,
    ) -> NotifyOutcome {
        if !self.enabled_for(event) {
            tracing::info!(?event, "notification disabled, skipping");
            return NotifyOutcome::Skipped(SkipReason::Disabled);
        }
        if !has_users {
            return NotifyOutcome::Skipped(SkipReason::NoUsers);
        }

        let recipients = self.recipients().await;
        if recipients.is_empty() {
            tracing::info!(?event, "no recipients configured, skipping");
            return NotifyOutcome::Skipped(SkipReason::NoRecipients);
        }

        let outcome = self
            .dispatcher
            .dispatch_batch(&recipients, &body(), self.max_retries)
            .await;
        NotifyOutcome::Dispatched(outcome)
    }

    pub async fn notify_login(&self, user: &PppoeUser) -> NotifyOutcome {
        self.deliver(Event::Login, true, || login_message(user, &Local::now()))
            .await
    }

    pub async fn notify_logout(&self, user: &PppoeUser) -> NotifyOutcome {
        self.deliver(Event::Logout, true, || logout_message(user, &Local::now()))
            .await
    }

    pub async fn notify_batch_login(&self, users: &[PppoeUser], offline: &[String]) -> NotifyOutcome {
        let opts = self.settings.offline_list();
        self.deliver(Event::Login, !users.is_empty(), || {
            batch_login_message(users, offline, opts, &Local::now())
        })
        .await
    }

    pub async fn notify_batch_logout(&self, users: &[PppoeUser], offline: &[String]) -> NotifyOutcome {
        let opts = self.settings.offline_list();
        self.deliver(Event::Logout, !users.is_empty(), || {
            batch_logout_message(users, offline, opts, &Local::now())
        })
        .await
    }
}
