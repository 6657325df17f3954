use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt::{Display, Write};

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H.%M.%S";

/// An active (or just dropped) PPPoE session as reported by the router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PppoeUser {
    pub name: String,
    pub address: Option<String>,
    pub uptime: Option<String>,
    pub comment: Option<String>,
}

impl PppoeUser {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfflineListOptions {
    pub include: bool,
    pub max_count: usize,
}

impl Default for OfflineListOptions {
    fn default() -> Self {
        Self {
            include: true,
            max_count: 20,
        }
    }
}

pub fn body_digest(body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

fn timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn login_message<Tz>(user: &PppoeUser, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut msg = String::from("🔔 *PPPoE LOGIN NOTIFICATION*\n\n");
    let _ = writeln!(msg, "👤 *User:* {}", user.name);
    let _ = writeln!(msg, "📍 *IP Address:* {}", user.address.as_deref().unwrap_or("N/A"));
    let _ = writeln!(msg, "📈 *Uptime:* {}", user.uptime.as_deref().unwrap_or("N/A"));
    if let Some(comment) = &user.comment {
        let _ = writeln!(msg, "📝 *Comment:* {comment}");
    }
    let _ = write!(msg, "\n⏰ *Time:* {}", timestamp(at));
    msg
}

pub fn logout_message<Tz>(user: &PppoeUser, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut msg = String::from("🚪 *PPPoE LOGOUT NOTIFICATION*\n\n");
    let _ = writeln!(msg, "👤 *User:* {}", user.name);
    if let Some(comment) = &user.comment {
        let _ = writeln!(msg, "📝 *Comment:* {comment}");
    }
    let _ = write!(msg, "\n⏰ *Time:* {}", timestamp(at));
    msg
}

pub fn batch_login_message<Tz>(
    users: &[PppoeUser],
    offline: &[String],
    opts: OfflineListOptions,
    at: &DateTime<Tz>,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut msg = String::from("🔔 *PPPoE LOGIN NOTIFICATION*\n\n");
    let _ = writeln!(msg, "📊 *User Login ({}):*", users.len());
    for (i, user) in users.iter().enumerate() {
        let _ = writeln!(msg, "{}. *{}*", i + 1, user.name);
        if let Some(address) = &user.address {
            let _ = writeln!(msg, "   • IP: {address}");
        }
        if let Some(uptime) = &user.uptime {
            let _ = writeln!(msg, "   • Uptime: {uptime}");
        }
        msg.push('\n');
    }
    push_offline_section(&mut msg, "🚫 *User Offline", offline, opts);
    let _ = write!(msg, "\n⏰ {}", timestamp(at));
    msg
}

pub fn batch_logout_message<Tz>(
    users: &[PppoeUser],
    offline: &[String],
    opts: OfflineListOptions,
    at: &DateTime<Tz>,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut msg = String::from("🚪 *PPPoE LOGOUT NOTIFICATION*\n\n");
    let _ = writeln!(msg, "📊 *User Logout ({}):*", users.len());
    for (i, user) in users.iter().enumerate() {
        let _ = writeln!(msg, "{}. *{}*", i + 1, user.name);
    }
    if opts.include && !offline.is_empty() {
        msg.push('\n');
    }
    push_offline_section(&mut msg, "🚫 *Total User Offline", offline, opts);
    let _ = write!(msg, "\n⏰ {}", timestamp(at));
    msg
}

fn push_offline_section(msg: &mut String, title: &str, offline: &[String], opts: OfflineListOptions) {
    if !opts.include || offline.is_empty() {
        return;
    }
    let _ = writeln!(msg, "{title} ({}):*", offline.len());
    for (i, name) in offline.iter().take(opts.max_count).enumerate() {
        let _ = writeln!(msg, "{}. {name}", i + 1);
    }
    if offline.len() > opts.max_count {
        let _ = writeln!(msg, "... and {} more users", offline.len() - opts.max_count);
    }
}
