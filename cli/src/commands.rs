use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use config::AppConfig;
use dispatcher::audit::AuditLog;
use dispatcher::notifier::{NotifyOutcome, PppoeNotifier, StaticDirectory};
use dispatcher::NotificationDispatcher;
use isp_notify_core::format::PppoeUser;
use isp_notify_core::models::BatchOutcome;
use std::fmt::Write;
use std::path::Path;

#[derive(Debug, Parser)]
#[command(name = "isp-notify", about = "Send ISP admin notifications over WhatsApp")]
pub struct Cli {
    /// Print dispatch outcomes as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a message to one or more numbers.
    Send {
        #[arg(long = "to", required = true)]
        to: Vec<String>,
        #[arg(long)]
        message: String,
        #[arg(long)]
        max_retries: Option<i32>,
    },
    /// Notify admins and technicians of a PPPoE login.
    Login {
        #[arg(long)]
        user: String,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        uptime: Option<String>,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Notify admins and technicians of a PPPoE logout.
    Logout {
        #[arg(long)]
        user: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Check whether a number can receive messages.
    Validate { number: String },
    #[command(subcommand)]
    Recipients(RecipientsAction),
    #[command(subcommand)]
    Settings(SettingsAction),
    #[command(subcommand)]
    Secret(SecretAction),
}

#[derive(Debug, Subcommand)]
pub enum RecipientsAction {
    List,
    AddAdmin { number: String },
    RemoveAdmin { number: String },
    AddTechnician { number: String },
    RemoveTechnician { number: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl From<Toggle> for bool {
    fn from(t: Toggle) -> bool {
        t == Toggle::On
    }
}

#[derive(Debug, Subcommand)]
pub enum SettingsAction {
    Show,
    Enable,
    Disable,
    Login { state: Toggle },
    Logout { state: Toggle },
}

#[derive(Debug, Subcommand)]
pub enum SecretAction {
    /// Store the Meta API access token in the OS keychain.
    Set { value: String },
    Clear,
}

fn build_dispatcher(cfg: &AppConfig, transport: std::sync::Arc<dyn transport::Transport>) -> NotificationDispatcher {
    NotificationDispatcher::new(transport)
        .with_address_suffix(cfg.dispatch.address_suffix.clone())
        .with_audit_log(AuditLog::new(&cfg.dispatch.audit_log))
}

async fn build_notifier(cfg: &AppConfig) -> Result<PppoeNotifier> {
    let transport = crate::create_transport(cfg).await?;
    let directory = StaticDirectory::new(cfg.admins.clone(), cfg.technicians.clone());
    Ok(PppoeNotifier::new(
        build_dispatcher(cfg, transport),
        directory,
        cfg.pppoe.clone(),
        cfg.dispatch.max_retries,
    ))
}

pub fn render_outcome(outcome: &BatchOutcome) -> String {
    let mut out = String::new();
    for result in &outcome.results {
        let mark = if result.success { "✅" } else { "❌" };
        let _ = writeln!(
            out,
            "{mark} {} - {} ({} attempt(s))",
            result.recipient,
            result.message,
            result.attempts.len()
        );
    }
    let _ = write!(
        out,
        "Delivered to {} of {} recipient(s)",
        outcome.success_count, outcome.total_count
    );
    out
}

fn print_outcome(json: bool, outcome: &BatchOutcome) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        println!("{}", render_outcome(outcome));
    }
    Ok(())
}

fn print_notify(json: bool, outcome: &NotifyOutcome) -> Result<()> {
    match outcome {
        NotifyOutcome::Skipped(reason) => {
            println!("Skipped: {reason}");
            Ok(())
        }
        NotifyOutcome::Dispatched(batch) => print_outcome(json, batch),
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let path = config::config_path()?;
    run_at(cli, &path).await
}

async fn run_at(cli: Cli, config_file: &Path) -> Result<()> {
    let mut cfg = config::load_from(config_file)?;

    match cli.command {
        Command::Send {
            to,
            message,
            max_retries,
        } => {
            let transport = crate::create_transport(&cfg).await?;
            let dispatcher = build_dispatcher(&cfg, transport);
            let retries = max_retries.unwrap_or(cfg.dispatch.max_retries);
            let outcome = dispatcher.dispatch_batch(&to, &message, retries).await;
            print_outcome(cli.json, &outcome)?;
        }
        Command::Login {
            user,
            address,
            uptime,
            comment,
        } => {
            let user = PppoeUser {
                name: user,
                address,
                uptime,
                comment,
            };
            let outcome = build_notifier(&cfg).await?.notify_login(&user).await;
            print_notify(cli.json, &outcome)?;
        }
        Command::Logout { user, comment } => {
            let user = PppoeUser {
                comment,
                ..PppoeUser::named(user)
            };
            let outcome = build_notifier(&cfg).await?.notify_logout(&user).await;
            print_notify(cli.json, &outcome)?;
        }
        Command::Validate { number } => {
            let transport = crate::create_transport(&cfg).await?;
            let outcome = build_dispatcher(&cfg, transport)
                .validate_recipient(&number)
                .await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else if outcome.valid {
                println!("{number} is reachable");
            } else {
                println!(
                    "{number} is not reachable: {}",
                    outcome.error.as_deref().unwrap_or("unknown")
                );
            }
        }
        Command::Recipients(action) => {
            if apply_recipients(&mut cfg, &action) {
                config::store_to(&cfg, config_file)?;
                tracing::info!(?action, "Recipients updated");
            }
            println!("Admins: {}", cfg.admins.join(", "));
            println!("Technicians: {}", cfg.technicians.join(", "));
        }
        Command::Settings(action) => {
            if apply_settings(&mut cfg, &action) {
                config::store_to(&cfg, config_file)?;
                tracing::info!(?action, "Settings updated");
            }
            println!("{}", serde_json::to_string_pretty(&cfg.pppoe)?);
        }
        Command::Secret(action) => match action {
            SecretAction::Set { value } => {
                config::store_secret(crate::META_API_KEY_SECRET, &value)
                    .context("Failed to store Meta API key")?;
                println!("Meta API key stored");
            }
            SecretAction::Clear => {
                config::delete_secret(crate::META_API_KEY_SECRET)
                    .context("Failed to delete Meta API key")?;
                println!("Meta API key removed");
            }
        },
    }
    Ok(())
}

/// Returns true when the config changed.
fn apply_recipients(cfg: &mut AppConfig, action: &RecipientsAction) -> bool {
    match action {
        RecipientsAction::List => false,
        RecipientsAction::AddAdmin { number } => cfg.add_admin(number),
        RecipientsAction::RemoveAdmin { number } => cfg.remove_admin(number),
        RecipientsAction::AddTechnician { number } => cfg.add_technician(number),
        RecipientsAction::RemoveTechnician { number } => cfg.remove_technician(number),
    }
}

fn apply_settings(cfg: &mut AppConfig, action: &SettingsAction) -> bool {
    let pppoe = &mut cfg.pppoe;
    match action {
        SettingsAction::Show => return false,
        SettingsAction::Enable => pppoe.enabled = true,
        SettingsAction::Disable => pppoe.enabled = false,
        SettingsAction::Login { state } => pppoe.login_notifications = (*state).into(),
        SettingsAction::Logout { state } => pppoe.logout_notifications = (*state).into(),
    }
    true
}
