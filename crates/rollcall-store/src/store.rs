//! [`AttendanceStore`] — the single source of truth for the signed-in user's
//! data.
//!
//! Every mutation goes through the [`Gateway`] first and is reflected in
//! local state only after the gateway confirms it; nothing is applied
//! optimistically, so nothing ever needs rolling back. State is published
//! through a `watch` channel and every change is one `send_modify`, so a
//! subscriber never observes a half-applied update.

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use chrono::NaiveDate;
use rollcall_core::{
  GatewayError,
  attendance::{AttendancePatch, AttendanceRecord, NewAttendance},
  gateway::{Gateway, NewRecord, RecordUpdate},
  normalize::{
    normalize_attendance_record, normalize_attendance_records, normalize_subject,
    normalize_subjects, normalize_user, subject_lookup,
  },
  report::AttendanceReport,
  storage::{CURRENT_USER_KEY, SESSION_KEY, SessionStorage, load_user, save_user},
  subject::{Subject, find_by_name},
  user::{Registration, User},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{Error, Result};

const DEFAULT_ACTIVATION_DAYS: u32 = 30;

// ─── State ───────────────────────────────────────────────────────────────────

/// A snapshot of everything the store holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreState {
  pub current_user:       Option<User>,
  pub subjects:           Vec<Subject>,
  pub attendance_records: Vec<AttendanceRecord>,
  /// True while at least one operation is in flight.
  pub loading:            bool,
  /// User-facing message from the most recent failure.
  pub error:              Option<String>,
}

/// Another user's data as seen from the admin console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserOverview {
  pub subjects: Vec<Subject>,
  pub records:  Vec<AttendanceRecord>,
  pub report:   AttendanceReport,
}

// ─── Loading flag ────────────────────────────────────────────────────────────

/// Holds the loading flag up for as long as it lives. Overlapping operations
/// each hold one; the flag drops when the last is released.
struct Loading<'a> {
  state:     &'a watch::Sender<StoreState>,
  in_flight: &'a AtomicUsize,
}

impl<'a> Loading<'a> {
  fn acquire(state: &'a watch::Sender<StoreState>, in_flight: &'a AtomicUsize) -> Self {
    state.send_modify(|s| {
      in_flight.fetch_add(1, Ordering::SeqCst);
      s.loading = true;
    });
    Self { state, in_flight }
  }
}

impl Drop for Loading<'_> {
  fn drop(&mut self) {
    self.state.send_modify(|s| {
      let remaining = self.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
      s.loading = remaining > 0;
    });
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Construct once at startup and share by reference (or `Arc`) with every
/// view that needs it.
pub struct AttendanceStore<G, S> {
  gateway:   Arc<G>,
  storage:   Arc<S>,
  state:     watch::Sender<StoreState>,
  in_flight: AtomicUsize,
}

impl<G, S> AttendanceStore<G, S>
where
  G: Gateway,
  S: SessionStorage,
{
  /// Create a store, restoring the persisted current user if there is one.
  /// Call [`restore`](Self::restore) afterwards to load that user's data.
  pub fn new(gateway: Arc<G>, storage: Arc<S>) -> Self {
    let current_user = load_user(storage.as_ref(), CURRENT_USER_KEY);
    if let Some(user) = &current_user {
      debug!(user = %user.id, "restored persisted user");
    }
    let (state, _) = watch::channel(StoreState { current_user, ..StoreState::default() });
    Self { gateway, storage, state, in_flight: AtomicUsize::new(0) }
  }

  pub fn gateway(&self) -> &Arc<G> { &self.gateway }

  pub fn storage(&self) -> &Arc<S> { &self.storage }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub fn state(&self) -> StoreState { self.state.borrow().clone() }

  /// A receiver that sees every state replacement.
  pub fn subscribe(&self) -> watch::Receiver<StoreState> { self.state.subscribe() }

  pub fn current_user(&self) -> Option<User> { self.state.borrow().current_user.clone() }

  pub fn subjects(&self) -> Vec<Subject> { self.state.borrow().subjects.clone() }

  pub fn attendance_records(&self) -> Vec<AttendanceRecord> {
    self.state.borrow().attendance_records.clone()
  }

  pub fn report(&self) -> AttendanceReport {
    let state = self.state.borrow();
    AttendanceReport::build(&state.subjects, &state.attendance_records)
  }

  pub fn clear_error(&self) { self.state.send_modify(|s| s.error = None); }

  // ── Internals ─────────────────────────────────────────────────────────────

  fn loading(&self) -> Loading<'_> { Loading::acquire(&self.state, &self.in_flight) }

  fn require_user(&self) -> Result<User> {
    self.current_user().ok_or(Error::NotLoggedIn)
  }

  /// Record a failure's message in state and hand the error back.
  fn fail(&self, err: Error) -> Error {
    if err.is_validation() {
      debug!(error = %err, "rejected before reaching the server");
    } else {
      warn!(error = ?err, "operation failed");
    }
    let message = err.to_string();
    self.state.send_modify(|s| s.error = Some(message));
    err
  }

  fn persist(&self, key: &str, user: Option<&User>) {
    let result = match user {
      Some(user) => save_user(self.storage.as_ref(), key, user),
      None => self.storage.remove(key),
    };
    if let Err(e) = result {
      warn!(key, error = %e, "failed to persist session state");
    }
  }

  /// Swap the current user. Signing out, or switching to a different
  /// account, clears the domain data in the same update so nothing from the
  /// previous account stays visible.
  fn set_current_user(&self, user: Option<User>) {
    self.persist(CURRENT_USER_KEY, user.as_ref());
    self.state.send_modify(|s| {
      let same_account = matches!(
        (&s.current_user, &user),
        (Some(old), Some(new)) if old.id == new.id
      );
      if !same_account {
        s.subjects.clear();
        s.attendance_records.clear();
        s.error = None;
      }
      s.current_user = user;
    });
  }

  /// Sign in as `user` and load their data. A failed load is already
  /// recorded in `error` and does not undo the sign-in.
  async fn enter_session(&self, user: User) {
    self.set_current_user(Some(user));
    if let Err(e) = self.load_user_data().await {
      debug!(error = %e, "initial data load failed");
    }
  }

  // ── Session ───────────────────────────────────────────────────────────────

  /// Reload data for the user restored from storage, if any.
  pub async fn restore(&self) -> Result<()> {
    if self.current_user().is_none() {
      return Ok(());
    }
    self.load_user_data().await
  }

  /// Create an account and sign in as it. Failures carry the server's
  /// message when it sent one.
  pub async fn register(&self, registration: Registration) -> Result<User> {
    if !registration.passwords_match() {
      return Err(self.fail(Error::PasswordMismatch));
    }
    let _loading = self.loading();

    let raw = self.gateway.register(registration).await.map_err(|e| {
      warn!(error = %e, "registration failed");
      Error::gateway_with_server_message(e, "Registration failed")
    })?;
    let user = normalize_user(&raw).ok_or(Error::MissingId("user"))?;

    info!(user = %user.id, "registered");
    self.enter_session(user.clone()).await;
    Ok(user)
  }

  /// Sign in. The gateway error is returned untouched so the caller can
  /// branch on it (see [`GatewayError::login_failure`]).
  pub async fn login(&self, email: &str, password: &str) -> Result<User, GatewayError> {
    let _loading = self.loading();

    let raw = self
      .gateway
      .login(email.to_string(), password.to_string())
      .await?;
    let user = normalize_user(&raw)
      .ok_or_else(|| GatewayError::Decode("login response has no user id".into()))?;

    info!(user = %user.id, active = user.active, "logged in");
    self.persist(SESSION_KEY, Some(&user));
    self.enter_session(user.clone()).await;
    Ok(user)
  }

  /// Sign in to the admin console. Errors propagate raw, like [`login`](Self::login).
  pub async fn admin_login(&self, email: &str, password: &str) -> Result<User, GatewayError> {
    let _loading = self.loading();

    let raw = self
      .gateway
      .admin_login(email.to_string(), password.to_string())
      .await?;
    let mut user = normalize_user(&raw)
      .ok_or_else(|| GatewayError::Decode("admin login response has no user id".into()))?;
    user.is_admin = true;

    info!(user = %user.id, "admin logged in");
    self.enter_session(user.clone()).await;
    Ok(user)
  }

  /// Forget the session locally. No network call.
  pub fn logout(&self) {
    if let Some(user) = self.current_user() {
      info!(user = %user.id, "logged out");
    }
    self.persist(SESSION_KEY, None);
    self.set_current_user(None);
  }

  // ── Data load ─────────────────────────────────────────────────────────────

  /// Fetch subjects and records for the current user and replace both in one
  /// update. On failure the previous data stays in place.
  pub async fn load_user_data(&self) -> Result<()> {
    let user = self.require_user()?;
    let _loading = self.loading();
    self.state.send_modify(|s| s.error = None);

    const LOAD_FAILED: &str = "Failed to load your data. Please try again.";

    let raw_subjects = self
      .gateway
      .list_subjects(user.id.clone())
      .await
      .map_err(|e| self.fail(Error::gateway(e, LOAD_FAILED)))?;
    let subjects = normalize_subjects(&raw_subjects);
    let lookup = subject_lookup(&subjects);

    let raw_records = self
      .gateway
      .list_attendance(user.id.clone())
      .await
      .map_err(|e| self.fail(Error::gateway(e, LOAD_FAILED)))?;
    let records = normalize_attendance_records(&raw_records, &lookup);

    let applied = self.state.send_if_modified(|s| {
      if s.current_user.as_ref().is_none_or(|u| u.id != user.id) {
        return false;
      }
      s.subjects = subjects;
      s.attendance_records = records;
      true
    });
    if applied {
      debug!(user = %user.id, "user data loaded");
    } else {
      debug!(user = %user.id, "discarding data loaded for a user who is no longer signed in");
    }
    Ok(())
  }

  // ── Subjects ──────────────────────────────────────────────────────────────

  /// Add a subject. Duplicate names (ignoring case) are rejected locally
  /// first; the server remains the final authority.
  pub async fn add_subject(&self, name: &str) -> Result<Subject> {
    let user = self.require_user()?;
    let name = name.trim();
    if name.is_empty() {
      return Err(self.fail(Error::EmptySubjectName));
    }
    if find_by_name(&self.subjects(), name).is_some() {
      return Err(self.fail(Error::DuplicateSubject(name.to_string())));
    }
    let _loading = self.loading();

    let raw = self
      .gateway
      .add_subject(user.id, name.to_string())
      .await
      .map_err(|e| self.fail(Error::gateway(e, "Failed to add subject. Please try again.")))?;
    let subject = normalize_subject(&raw).ok_or_else(|| self.fail(Error::MissingId("subject")))?;

    self.state.send_modify(|s| s.subjects.push(subject.clone()));
    info!(subject = %subject.id, "subject added");
    Ok(subject)
  }

  /// Delete a subject and, in the same update, every record that refers to
  /// it.
  pub async fn remove_subject(&self, subject_id: &str) -> Result<()> {
    let user = self.require_user()?;
    let _loading = self.loading();

    self
      .gateway
      .delete_subject(subject_id.to_string(), user.id)
      .await
      .map_err(|e| self.fail(Error::gateway(e, "Failed to remove subject. Please try again.")))?;

    self.state.send_modify(|s| {
      s.subjects.retain(|subject| subject.id != subject_id);
      s.attendance_records.retain(|r| !r.references_subject(subject_id));
    });
    info!(subject = subject_id, "subject removed");
    Ok(())
  }

  fn resolve_subject(&self, name: &str) -> Result<Subject> {
    find_by_name(&self.subjects(), name)
      .cloned()
      .ok_or_else(|| Error::SubjectNotFound(name.to_string()))
  }

  // ── Attendance ────────────────────────────────────────────────────────────

  /// Record attendance. The subject is given by name and must exist; an
  /// unknown name fails without touching state.
  pub async fn add_attendance_record(&self, input: NewAttendance) -> Result<AttendanceRecord> {
    let user = self.require_user()?;
    let subject = self.resolve_subject(&input.subject).map_err(|e| self.fail(e))?;
    let _loading = self.loading();

    let raw = self
      .gateway
      .add_attendance(NewRecord {
        user_id:      user.id,
        subject_id:   subject.id.clone(),
        status:       input.status,
        date:         input.date,
        class_number: input.class_number,
      })
      .await
      .map_err(|e| {
        self.fail(Error::gateway(e, "Failed to add attendance record. Please try again."))
      })?;

    let mut record = normalize_attendance_record(&raw, &subject_lookup(&self.subjects()));
    record.subject_id = Some(subject.id.clone());
    record.subject = Some(subject);

    self.state.send_modify(|s| s.attendance_records.push(record.clone()));
    debug!(record = ?record.id, "attendance record added");
    Ok(record)
  }

  /// Update a record. A `subject` name in the patch is re-resolved; without
  /// one the record keeps its subject. A record no longer present locally is
  /// left alone and `Ok(None)` is returned.
  pub async fn update_attendance_record(
    &self,
    record_id: &str,
    patch: AttendancePatch,
  ) -> Result<Option<AttendanceRecord>> {
    self.require_user()?;
    let subject = match &patch.subject {
      Some(name) => Some(self.resolve_subject(name).map_err(|e| self.fail(e))?),
      None => None,
    };
    let _loading = self.loading();

    let update = RecordUpdate {
      subject_id:   subject.as_ref().map(|s| s.id.clone()),
      status:       patch.status,
      date:         patch.date,
      class_number: patch.class_number,
    };
    let raw = self
      .gateway
      .update_attendance(record_id.to_string(), update)
      .await
      .map_err(|e| {
        self.fail(Error::gateway(e, "Failed to update attendance record. Please try again."))
      })?;
    let has_class_number = raw.class_number.is_some();

    // Merge against the state as it is now, not as it was before the await,
    // so concurrent updates to other records are not overwritten.
    let mut updated = None;
    self.state.send_modify(|s| {
      let lookup = subject_lookup(&s.subjects);
      let Some(existing) = s.attendance_records.iter_mut().find(|r| r.has_id(record_id)) else {
        debug!(record = record_id, "updated record is not loaded locally; ignoring");
        return;
      };
      let mut fresh = normalize_attendance_record(&raw, &lookup);
      if fresh.id.is_none() {
        fresh.id = Some(record_id.to_string());
      }
      match &subject {
        Some(subject) => {
          fresh.subject = Some(subject.clone());
          fresh.subject_id = Some(subject.id.clone());
        }
        None if fresh.subject.is_none() => {
          debug!(
            target: "rollcall::lenient",
            record = record_id,
            response_subject = ?fresh.subject_id,
            "update response has no resolvable subject; keeping the previous one"
          );
          // Both fields move together so they never name different subjects.
          fresh.subject = existing.subject.clone();
          fresh.subject_id = existing.subject_id.clone();
        }
        None => {}
      }
      fresh.user_id = fresh.user_id.or_else(|| existing.user_id.clone());
      fresh.date = fresh.date.or(existing.date);
      fresh.status = fresh.status.or(existing.status);
      if !has_class_number {
        fresh.class_number = existing.class_number;
      }
      *existing = fresh.clone();
      updated = Some(fresh);
    });
    Ok(updated)
  }

  pub async fn delete_attendance_record(&self, record_id: &str) -> Result<()> {
    self.require_user()?;
    let _loading = self.loading();

    self
      .gateway
      .delete_attendance(record_id.to_string())
      .await
      .map_err(|e| {
        self.fail(Error::gateway(e, "Failed to delete attendance record. Please try again."))
      })?;

    self.state.send_modify(|s| s.attendance_records.retain(|r| !r.has_id(record_id)));
    debug!(record = record_id, "attendance record deleted");
    Ok(())
  }

  /// Delete every record for one subject, date, and class hour.
  pub async fn delete_attendance_by_slot(
    &self,
    subject_name: &str,
    date: NaiveDate,
    class_number: u32,
  ) -> Result<()> {
    self.require_user()?;
    let subject = self.resolve_subject(subject_name).map_err(|e| self.fail(e))?;
    let _loading = self.loading();

    self
      .gateway
      .delete_attendance_by_slot(subject.id.clone(), date, class_number)
      .await
      .map_err(|e| {
        self.fail(Error::gateway(e, "Failed to delete attendance record. Please try again."))
      })?;

    self.state.send_modify(|s| {
      s.attendance_records.retain(|r| {
        !(r.references_subject(&subject.id)
          && r.date == Some(date)
          && r.class_number == class_number)
      });
    });
    Ok(())
  }

  /// Wipe the current user's subjects and records on the server, then
  /// locally.
  pub async fn reset_all_data(&self) -> Result<()> {
    let user = self.require_user()?;
    let _loading = self.loading();

    self
      .gateway
      .reset_user_data(user.id.clone())
      .await
      .map_err(|e| self.fail(Error::gateway(e, "Failed to reset data. Please try again.")))?;

    self.state.send_modify(|s| {
      s.subjects.clear();
      s.attendance_records.clear();
    });
    info!(user = %user.id, "all data reset");
    Ok(())
  }

  // ── Admin console ─────────────────────────────────────────────────────────

  fn require_admin(&self) -> Result<User> {
    let user = self.require_user()?;
    if user.is_admin { Ok(user) } else { Err(Error::AdminRequired) }
  }

  pub async fn list_users(&self) -> Result<Vec<User>> {
    self.require_admin()?;
    let _loading = self.loading();

    let raw = self
      .gateway
      .list_users()
      .await
      .map_err(|e| self.fail(Error::gateway_with_server_message(e, "Failed to load users")))?;
    Ok(raw.iter().filter_map(normalize_user).collect())
  }

  /// Load another user's subjects and records without touching the
  /// signed-in user's state.
  pub async fn user_overview(&self, user_id: &str) -> Result<UserOverview> {
    self.require_admin()?;
    let _loading = self.loading();

    const FAILED: &str = "Failed to load user data";
    let raw_subjects = self
      .gateway
      .list_subjects(user_id.to_string())
      .await
      .map_err(|e| self.fail(Error::gateway_with_server_message(e, FAILED)))?;
    let subjects = normalize_subjects(&raw_subjects);
    let raw_records = self
      .gateway
      .list_attendance(user_id.to_string())
      .await
      .map_err(|e| self.fail(Error::gateway_with_server_message(e, FAILED)))?;
    let records = normalize_attendance_records(&raw_records, &subject_lookup(&subjects));
    let report = AttendanceReport::build(&subjects, &records);
    Ok(UserOverview { subjects, records, report })
  }

  /// Activate a subscription for `days` days (30 when zero).
  pub async fn activate_user(&self, user_id: &str, days: u32) -> Result<User> {
    self.require_admin()?;
    let _loading = self.loading();
    let days = if days == 0 { DEFAULT_ACTIVATION_DAYS } else { days };

    let raw = self
      .gateway
      .activate_user(user_id.to_string(), days)
      .await
      .map_err(|e| self.fail(Error::gateway_with_server_message(e, "Failed to activate user")))?;
    let user = normalize_user(&raw).ok_or_else(|| self.fail(Error::MissingId("user")))?;
    info!(user = %user.id, days, paid_till = ?user.paid_till, "user activated");
    Ok(user)
  }

  pub async fn deactivate_user(&self, user_id: &str) -> Result<User> {
    self.require_admin()?;
    let _loading = self.loading();

    let raw = self
      .gateway
      .deactivate_user(user_id.to_string())
      .await
      .map_err(|e| {
        self.fail(Error::gateway_with_server_message(e, "Failed to deactivate user"))
      })?;
    let user = normalize_user(&raw).ok_or_else(|| self.fail(Error::MissingId("user")))?;
    info!(user = %user.id, "user deactivated");
    Ok(user)
  }
}
