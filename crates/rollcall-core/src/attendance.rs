//! Attendance records and the form inputs that create or patch them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::subject::Subject;

/// Outcome of one class hour.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum AttendanceStatus {
  Present,
  Absent,
  #[serde(rename = "No Class")]
  #[strum(serialize = "No Class")]
  NoClass,
}

/// An attendance record in canonical shape.
///
/// `subject` is the resolved subject when it is still known; `subject_id` is
/// kept even when resolution failed so an orphaned reference stays visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
  pub id:           Option<String>,
  pub user_id:      Option<String>,
  pub subject:      Option<Subject>,
  pub subject_id:   Option<String>,
  pub date:         Option<NaiveDate>,
  pub status:       Option<AttendanceStatus>,
  pub class_number: u32,
}

impl AttendanceRecord {
  /// The subject this record points at, via either the resolved subject or
  /// the preserved id.
  pub fn resolved_subject_id(&self) -> Option<&str> {
    self
      .subject
      .as_ref()
      .map(|s| s.id.as_str())
      .or(self.subject_id.as_deref())
  }

  pub fn references_subject(&self, subject_id: &str) -> bool {
    self.subject.as_ref().is_some_and(|s| s.id == subject_id)
      || self.subject_id.as_deref() == Some(subject_id)
  }

  pub fn has_id(&self, id: &str) -> bool { self.id.as_deref() == Some(id) }

  /// Class hours this record stands for; never less than one.
  pub fn hours(&self) -> u32 { self.class_number.max(1) }
}

/// Form input for a new record. `subject` is a subject *name*.
#[derive(Debug, Clone)]
pub struct NewAttendance {
  pub subject:      String,
  pub status:       AttendanceStatus,
  pub date:         NaiveDate,
  pub class_number: u32,
}

/// Partial update for an existing record. A `subject` name, when present, is
/// re-resolved against the current subject list.
#[derive(Debug, Clone, Default)]
pub struct AttendancePatch {
  pub subject:      Option<String>,
  pub status:       Option<AttendanceStatus>,
  pub date:         Option<NaiveDate>,
  pub class_number: Option<u32>,
}
