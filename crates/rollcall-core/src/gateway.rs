//! The `Gateway` trait: the seam between the client and the remote REST API.
//!
//! Implementations (e.g. `rollcall-client`) perform the request and hand
//! back raw payloads. They never retain state and never normalize; that is
//! the job of [`crate::normalize`] on the caller's side.

use std::future::Future;

use chrono::NaiveDate;
use serde::Serialize;

use crate::{
  attendance::AttendanceStatus,
  error::GatewayError,
  normalize::{RawAttendanceRecord, RawSubject, RawUser},
  user::Registration,
};

// ─── Request bodies ──────────────────────────────────────────────────────────

/// Parameters for `POST /attendance/add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
  pub user_id:      String,
  pub subject_id:   String,
  pub status:       AttendanceStatus,
  pub date:         NaiveDate,
  pub class_number: u32,
}

/// Body for `PUT /attendance/:id`. Absent fields are left untouched by the
/// server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub subject_id:   Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub status:       Option<AttendanceStatus>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub date:         Option<NaiveDate>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub class_number: Option<u32>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the remote attendance API.
///
/// All methods return `Send` futures so the store and the session guard can
/// drive them from spawned tokio tasks.
pub trait Gateway: Send + Sync {
  // ── Accounts ──────────────────────────────────────────────────────────

  /// `POST /users/register`
  fn register(
    &self,
    input: Registration,
  ) -> impl Future<Output = Result<RawUser, GatewayError>> + Send + '_;

  /// `POST /users/login`
  fn login(
    &self,
    email: String,
    password: String,
  ) -> impl Future<Output = Result<RawUser, GatewayError>> + Send + '_;

  /// `POST /admin/login`
  fn admin_login(
    &self,
    email: String,
    password: String,
  ) -> impl Future<Output = Result<RawUser, GatewayError>> + Send + '_;

  /// `GET /users/:id`. `Ok(None)` means the account no longer exists.
  fn get_user(
    &self,
    user_id: String,
  ) -> impl Future<Output = Result<Option<RawUser>, GatewayError>> + Send + '_;

  // ── Administration ────────────────────────────────────────────────────

  /// `GET /users`
  fn list_users(
    &self,
  ) -> impl Future<Output = Result<Vec<RawUser>, GatewayError>> + Send + '_;

  /// `PUT /admin/users/:id/activate?days=N`
  fn activate_user(
    &self,
    user_id: String,
    days: u32,
  ) -> impl Future<Output = Result<RawUser, GatewayError>> + Send + '_;

  /// `PUT /admin/users/:id/deactivate`
  fn deactivate_user(
    &self,
    user_id: String,
  ) -> impl Future<Output = Result<RawUser, GatewayError>> + Send + '_;

  // ── Subjects ──────────────────────────────────────────────────────────

  /// `GET /subjects/user/:userId`
  fn list_subjects(
    &self,
    user_id: String,
  ) -> impl Future<Output = Result<Vec<RawSubject>, GatewayError>> + Send + '_;

  /// `POST /subjects/add?userId&name`
  fn add_subject(
    &self,
    user_id: String,
    name: String,
  ) -> impl Future<Output = Result<RawSubject, GatewayError>> + Send + '_;

  /// `DELETE /subjects/:subjectId/user/:userId`
  fn delete_subject(
    &self,
    subject_id: String,
    user_id: String,
  ) -> impl Future<Output = Result<(), GatewayError>> + Send + '_;

  // ── Attendance ────────────────────────────────────────────────────────

  /// `GET /attendance/user/:userId`
  fn list_attendance(
    &self,
    user_id: String,
  ) -> impl Future<Output = Result<Vec<RawAttendanceRecord>, GatewayError>> + Send + '_;

  /// `POST /attendance/add?userId&subjectId&status&date&classNumber`
  fn add_attendance(
    &self,
    record: NewRecord,
  ) -> impl Future<Output = Result<RawAttendanceRecord, GatewayError>> + Send + '_;

  /// `PUT /attendance/:id`
  fn update_attendance(
    &self,
    record_id: String,
    update: RecordUpdate,
  ) -> impl Future<Output = Result<RawAttendanceRecord, GatewayError>> + Send + '_;

  /// `DELETE /attendance/:id`
  fn delete_attendance(
    &self,
    record_id: String,
  ) -> impl Future<Output = Result<(), GatewayError>> + Send + '_;

  /// `DELETE /attendance/delete-by-subject-date-class?subjectId&date&classNumber`
  fn delete_attendance_by_slot(
    &self,
    subject_id: String,
    date: NaiveDate,
    class_number: u32,
  ) -> impl Future<Output = Result<(), GatewayError>> + Send + '_;

  // ── Reset ─────────────────────────────────────────────────────────────

  /// `DELETE /reset/user/:userId`: wipes the user's subjects and records.
  fn reset_user_data(
    &self,
    user_id: String,
  ) -> impl Future<Output = Result<(), GatewayError>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_update_omits_untouched_fields() {
    let update = RecordUpdate {
      status: Some(AttendanceStatus::NoClass),
      ..RecordUpdate::default()
    };
    assert_eq!(
      serde_json::to_value(&update).unwrap(),
      serde_json::json!({ "status": "No Class" })
    );
  }
}
