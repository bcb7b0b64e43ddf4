//! `rollcall` — track class attendance from the terminal.
//!
//! # Usage
//!
//! ```
//! rollcall login ada@example.com
//! rollcall subjects add "Linear Algebra"
//! rollcall attend add "Linear Algebra" present --class 2
//! rollcall report
//! rollcall --config ~/.config/rollcall/rollcall.toml watch
//! ```
//!
//! Settings come from the TOML file, then `ROLLCALL_*` environment
//! variables, then flags.

mod commands;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use rollcall_client::{GatewayConfig, HttpGateway};
use rollcall_core::attendance::AttendanceStatus;
use rollcall_store::{AttendanceStore, FileStorage, RoutePolicy};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rollcall", version, about = "Track class attendance")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "rollcall.toml")]
  config: PathBuf,

  /// API root, e.g. http://localhost:8080/api.
  #[arg(long)]
  url: Option<String>,

  /// Where the session is kept between runs.
  #[arg(long, value_name = "FILE")]
  session_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Sign in and load your data.
  Login {
    email:    String,
    /// Read from stdin when omitted.
    #[arg(long, env = "ROLLCALL_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
  /// Create an account and sign in.
  Register { username: String, email: String },
  /// Forget the local session.
  Logout,
  /// Show the signed-in account and its subscription.
  Whoami,
  #[command(subcommand)]
  Subjects(SubjectsCommand),
  #[command(subcommand)]
  Attend(AttendCommand),
  /// List attendance records, most recent first.
  History {
    /// Only records for this subject.
    #[arg(long)]
    subject: Option<String>,
  },
  /// Per-subject and overall attendance statistics.
  Report,
  /// Delete all of your subjects and records.
  Reset {
    /// Skip the confirmation prompt.
    #[arg(long)]
    yes: bool,
  },
  /// Keep validating the session and print every change.
  Watch {
    #[arg(long, value_enum, default_value_t = Route::Member)]
    route: Route,
  },
  #[command(subcommand)]
  Admin(AdminCommand),
}

#[derive(Subcommand, Debug)]
enum SubjectsCommand {
  List,
  Add { name: String },
  /// Remove a subject and every record for it.
  Rm { name: String },
}

#[derive(Subcommand, Debug)]
enum AttendCommand {
  /// Record attendance for one class.
  Add {
    subject: String,
    /// present, absent, or "no class".
    status:  AttendanceStatus,
    /// Defaults to today.
    #[arg(long)]
    date:    Option<NaiveDate>,
    /// Class hour; also the number of hours the record counts for.
    #[arg(long = "class", default_value_t = 1)]
    class_number: u32,
  },
  /// Change fields of an existing record.
  Update {
    id:      String,
    #[arg(long)]
    subject: Option<String>,
    #[arg(long)]
    status:  Option<AttendanceStatus>,
    #[arg(long)]
    date:    Option<NaiveDate>,
    #[arg(long = "class")]
    class_number: Option<u32>,
  },
  Rm { id: String },
  /// Remove every record for a subject, date, and class hour.
  RmSlot {
    subject: String,
    date:    NaiveDate,
    #[arg(long = "class", default_value_t = 1)]
    class_number: u32,
  },
}

#[derive(Subcommand, Debug)]
enum AdminCommand {
  /// Sign in to the admin console.
  Login {
    email:    String,
    #[arg(long, env = "ROLLCALL_PASSWORD", hide_env_values = true)]
    password: Option<String>,
  },
  Users,
  /// Show a user's subjects, records, and report.
  Show { user_id: String },
  Activate {
    user_id: String,
    /// Length of the subscription from today.
    #[arg(long, default_value_t = 30)]
    days:    u32,
  },
  Deactivate { user_id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Route {
  Public,
  Member,
  Admin,
}

impl From<Route> for RoutePolicy {
  fn from(route: Route) -> Self {
    match route {
      Route::Public => Self::Public,
      Route::Member => Self::Member,
      Route::Admin => Self::Admin,
    }
  }
}

// ─── Settings ─────────────────────────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct Settings {
  base_url:           String,
  session_file:       PathBuf,
  poll_interval_secs: u64,
  timeout_secs:       u64,
}

fn load_settings(cli: &Cli) -> Result<Settings> {
  config::Config::builder()
    .set_default("base_url", "http://localhost:8080/api")?
    .set_default("session_file", "~/.rollcall/session.json")?
    .set_default("poll_interval_secs", 5)?
    .set_default("timeout_secs", 30)?
    .add_source(config::File::from(cli.config.clone()).required(false))
    .add_source(config::Environment::with_prefix("ROLLCALL"))
    .set_override_option("base_url", cli.url.clone())?
    .set_override_option(
      "session_file",
      cli.session_file.as_ref().map(|p| p.to_string_lossy().into_owned()),
    )?
    .build()
    .context("failed to read config file")?
    .try_deserialize()
    .context("failed to deserialise settings")
}

// ─── Entry point ──────────────────────────────────────────────────────────────

type Store = AttendanceStore<HttpGateway, FileStorage>;

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let settings = load_settings(&cli)?;
  tracing::debug!(?settings, "settings loaded");

  let gateway = HttpGateway::new(GatewayConfig {
    base_url: settings.base_url.clone(),
    timeout:  Duration::from_secs(settings.timeout_secs),
  })
  .context("failed to build HTTP client")?;
  let storage = FileStorage::new(expand_tilde(&settings.session_file));
  let store = AttendanceStore::new(Arc::new(gateway), Arc::new(storage));

  commands::run(cli.command, &store, &settings).await
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
