//! Subcommand handlers. Each one drives the store and prints the result.

use std::{
  io::{self, BufRead, Write},
  time::Duration,
};

use anyhow::{Context as _, Result, anyhow, bail};
use rollcall_core::{
  LoginFailure,
  attendance::{AttendancePatch, AttendanceRecord, NewAttendance},
  report::{AttendanceReport, history},
  subject::find_by_name,
  user::{Registration, User},
};
use rollcall_store::{GuardState, SessionGuard, guard::today};
use tracing::info;

use crate::{AdminCommand, AttendCommand, Command, Settings, Store, SubjectsCommand};

pub async fn run(command: Command, store: &Store, settings: &Settings) -> Result<()> {
  match command {
    Command::Login { email, password } => {
      let password = password_or_prompt(password, "Password: ")?;
      let user = store
        .login(&email, &password)
        .await
        .map_err(|e| match e.login_failure() {
          LoginFailure::InvalidCredentials => anyhow!("Invalid email or password"),
          LoginFailure::Inactive => anyhow!(
            "Your subscription is not active. Contact the administrator to renew it."
          ),
          LoginFailure::Server => anyhow!(e).context("login failed"),
        })?;
      print_user(&user);
      report_load_error(store);
    }

    Command::Register { username, email } => {
      let password = password_or_prompt(None, "Password: ")?;
      let confirm = password_or_prompt(None, "Confirm password: ")?;
      let user = store
        .register(Registration {
          username,
          email,
          password,
          confirm_password: Some(confirm),
        })
        .await?;
      println!("Registered {}.", user.username);
      if !user.is_active_on(today()) {
        println!("Your subscription is not active yet. Contact the administrator to activate it.");
      }
    }

    Command::Logout => {
      store.logout();
      println!("Logged out.");
    }

    Command::Whoami => match store.current_user() {
      Some(user) => print_user(&user),
      None => println!("Not logged in."),
    },

    Command::Subjects(cmd) => {
      signed_in(store).await?;
      match cmd {
        SubjectsCommand::List => {
          for subject in store.subjects() {
            println!("{}  {}", subject.id, subject.name);
          }
        }
        SubjectsCommand::Add { name } => {
          let subject = store.add_subject(&name).await?;
          println!("Added {} ({}).", subject.name, subject.id);
        }
        SubjectsCommand::Rm { name } => {
          let subjects = store.subjects();
          let subject = find_by_name(&subjects, &name)
            .with_context(|| format!("no subject named {name:?}"))?;
          store.remove_subject(&subject.id).await?;
          println!("Removed {} and its records.", subject.name);
        }
      }
    }

    Command::Attend(cmd) => {
      signed_in(store).await?;
      match cmd {
        AttendCommand::Add { subject, status, date, class_number } => {
          let record = store
            .add_attendance_record(NewAttendance {
              subject,
              status,
              date: date.unwrap_or_else(today),
              class_number,
            })
            .await?;
          print_record(&record);
        }
        AttendCommand::Update { id, subject, status, date, class_number } => {
          let patch = AttendancePatch { subject, status, date, class_number };
          match store.update_attendance_record(&id, patch).await? {
            Some(record) => print_record(&record),
            None => println!("Record {id} is not in your loaded records; nothing changed locally."),
          }
        }
        AttendCommand::Rm { id } => {
          store.delete_attendance_record(&id).await?;
          println!("Deleted {id}.");
        }
        AttendCommand::RmSlot { subject, date, class_number } => {
          store.delete_attendance_by_slot(&subject, date, class_number).await?;
          println!("Deleted {subject} on {date}, class {class_number}.");
        }
      }
    }

    Command::History { subject } => {
      signed_in(store).await?;
      let records = store.attendance_records();
      for record in history(&records) {
        let matches = subject.as_deref().is_none_or(|name| {
          record.subject.as_ref().is_some_and(|s| s.has_name(name))
        });
        if matches {
          print_record(record);
        }
      }
    }

    Command::Report => {
      signed_in(store).await?;
      print_report(&store.report());
    }

    Command::Reset { yes } => {
      signed_in(store).await?;
      if !yes && !confirm("Delete all subjects and attendance records? [y/N] ")? {
        println!("Cancelled.");
        return Ok(());
      }
      store.reset_all_data().await?;
      println!("All data deleted.");
    }

    Command::Watch { route } => watch(store, settings, route.into()).await?,

    Command::Admin(cmd) => admin(cmd, store).await?,
  }
  Ok(())
}

async fn admin(cmd: AdminCommand, store: &Store) -> Result<()> {
  match cmd {
    AdminCommand::Login { email, password } => {
      let password = password_or_prompt(password, "Password: ")?;
      let user = store
        .admin_login(&email, &password)
        .await
        .map_err(|e| anyhow!(e.user_message("Admin login failed")))?;
      println!("Signed in to the admin console as {}.", user.email);
    }
    AdminCommand::Users => {
      for user in store.list_users().await? {
        let state = if user.is_active_on(today()) { "active" } else { "inactive" };
        let paid = user.paid_till.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        println!("{}  {:<20} {:<30} {:<8} paid till {paid}", user.id, user.username, user.email, state);
      }
    }
    AdminCommand::Show { user_id } => {
      let overview = store.user_overview(&user_id).await?;
      println!("{} subjects, {} records", overview.subjects.len(), overview.records.len());
      print_report(&overview.report);
    }
    AdminCommand::Activate { user_id, days } => {
      let user = store.activate_user(&user_id, days).await?;
      info!(user = %user.id, "activated from cli");
      print_user(&user);
    }
    AdminCommand::Deactivate { user_id } => {
      let user = store.deactivate_user(&user_id).await?;
      print_user(&user);
    }
  }
  Ok(())
}

async fn watch(store: &Store, settings: &Settings, policy: rollcall_store::RoutePolicy) -> Result<()> {
  let guard = SessionGuard::new(store.gateway().clone(), store.storage().clone(), policy)
    .with_interval(Duration::from_secs(settings.poll_interval_secs.max(1)));
  let handle = guard.mount();
  let mut rx = handle.subscribe();

  let mut state = *rx.borrow_and_update();
  print_guard(state);
  while !matches!(state, GuardState::Denied(_)) {
    tokio::select! {
      changed = rx.changed() => {
        if changed.is_err() {
          break;
        }
        state = *rx.borrow_and_update();
        print_guard(state);
      }
      _ = tokio::signal::ctrl_c() => break,
    }
  }
  handle.unmount();
  Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Reload the signed-in user's data; fail when nobody is signed in.
async fn signed_in(store: &Store) -> Result<()> {
  if store.current_user().is_none() {
    bail!("Not logged in. Run `rollcall login <email>` first.");
  }
  store.restore().await?;
  Ok(())
}

fn report_load_error(store: &Store) {
  if let Some(message) = store.state().error {
    eprintln!("{message}");
  }
}

fn password_or_prompt(password: Option<String>, prompt: &str) -> Result<String> {
  if let Some(password) = password {
    return Ok(password);
  }
  let line = prompt_line(prompt)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

fn confirm(prompt: &str) -> Result<bool> {
  let answer = prompt_line(prompt)?;
  Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn prompt_line(prompt: &str) -> Result<String> {
  print!("{prompt}");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line).context("failed to read stdin")?;
  Ok(line)
}

fn print_user(user: &User) {
  let status = if user.is_active_on(today()) { "active" } else { "inactive" };
  let paid = user.paid_till.map(|d| d.to_string()).unwrap_or_else(|| "never".into());
  let role = if user.is_admin { " (admin)" } else { "" };
  println!("{} <{}>{role}", user.username, user.email);
  println!("  id:        {}", user.id);
  println!("  status:    {status}");
  println!("  paid till: {paid}");
}

fn print_record(record: &AttendanceRecord) {
  let date = record.date.map(|d| d.to_string()).unwrap_or_else(|| "----------".into());
  let subject = record
    .subject
    .as_ref()
    .map(|s| s.name.as_str())
    .or(record.subject_id.as_deref())
    .unwrap_or("?");
  let status = record.status.map(|s| s.to_string()).unwrap_or_else(|| "?".into());
  let id = record.id.as_deref().unwrap_or("-");
  println!("{date}  {subject:<24} {status:<9} class {:<2} {id}", record.class_number);
}

fn print_report(report: &AttendanceReport) {
  println!(
    "{:<24} {:>7} {:>6} {:>8} {:>6} {:>5}",
    "subject", "present", "absent", "no class", "hours", "%"
  );
  for s in &report.subjects {
    println!(
      "{:<24} {:>7} {:>6} {:>8} {:>6} {:>4}%",
      s.name,
      s.present,
      s.absent,
      s.no_class,
      format!("{}/{}", s.attended_hours, s.total_hours),
      s.percentage
    );
  }
  let o = &report.overall;
  println!();
  println!(
    "attended {} of {} hours ({} missed), {} of {} classes, {}% overall",
    o.attended_hours, o.total_hours, o.missed_hours, o.classes_attended, o.classes_held,
    o.average_percentage
  );
}

fn print_guard(state: GuardState) {
  match state {
    GuardState::Denied(reason) => println!("denied: {reason:?} -> {}", reason.redirect()),
    state => println!("{state:?}"),
  }
}
