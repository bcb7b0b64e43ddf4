//! The identifier normalizer: the one place where raw backend payloads cross
//! into canonical types.
//!
//! The backend is inconsistent about how it spells identifiers (`id` or
//! `_id`) and about how an attendance record refers to its subject (embedded
//! object, bare id string, or a separate `subjectId`). Everything here is
//! pure and never fails; data-quality problems are logged under the
//! `rollcall::normalize` target and degrade to `None` fields.

use std::{collections::HashMap, fmt};

use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use tracing::warn;

use crate::{
  attendance::{AttendanceRecord, AttendanceStatus},
  subject::Subject,
  user::User,
};

/// Subjects keyed by id; built from the user's current subject list.
pub type SubjectLookup = HashMap<String, Subject>;

// ─── Raw shapes ──────────────────────────────────────────────────────────────

/// An identifier as the backend sends it: usually a string, occasionally a
/// number.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum RawId {
  Text(String),
  Number(i64),
}

impl fmt::Display for RawId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Text(s) => f.write_str(s),
      Self::Number(n) => write!(f, "{n}"),
    }
  }
}

impl From<&str> for RawId {
  fn from(s: &str) -> Self { Self::Text(s.to_string()) }
}

/// A raw payload that may carry either identifier spelling.
pub trait Identified {
  fn id_field(&self) -> Option<&RawId>;
  fn underscore_id_field(&self) -> Option<&RawId>;
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
  pub id:            Option<RawId>,
  #[serde(rename = "_id")]
  pub underscore_id: Option<RawId>,
  pub username:      Option<String>,
  pub email:         Option<String>,
  pub is_admin:      Option<bool>,
  pub active:        Option<bool>,
  pub paid_till:     Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSubject {
  pub id:            Option<RawId>,
  #[serde(rename = "_id")]
  pub underscore_id: Option<RawId>,
  pub name:          Option<String>,
}

/// The three ways a record can point at its subject, resolved once at
/// ingestion.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawSubjectRef {
  Embedded(RawSubject),
  Id(RawId),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAttendanceRecord {
  pub id:            Option<RawId>,
  #[serde(rename = "_id")]
  pub underscore_id: Option<RawId>,
  pub user_id:       Option<RawId>,
  pub subject:       Option<RawSubjectRef>,
  pub subject_id:    Option<RawId>,
  pub date:          Option<String>,
  pub status:        Option<String>,
  /// Number or numeric string.
  pub class_number:  Option<serde_json::Value>,
}

macro_rules! identified {
  ($($ty:ty),*) => {$(
    impl Identified for $ty {
      fn id_field(&self) -> Option<&RawId> { self.id.as_ref() }
      fn underscore_id_field(&self) -> Option<&RawId> { self.underscore_id.as_ref() }
    }
  )*};
}

identified!(RawUser, RawSubject, RawAttendanceRecord);

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// `id` when present, else `_id`, else `None`. A `None` is a data-integrity
/// problem for the caller to report, never something to paper over with a
/// default.
pub fn normalize_id<R: Identified + ?Sized>(raw: &R) -> Option<String> {
  raw
    .id_field()
    .or_else(|| raw.underscore_id_field())
    .map(RawId::to_string)
}

// ─── Entities ────────────────────────────────────────────────────────────────

/// Returns `None` (and logs) when the payload has no identifier.
pub fn normalize_user(raw: &RawUser) -> Option<User> {
  let Some(id) = normalize_id(raw) else {
    warn!(target: "rollcall::normalize", email = ?raw.email, "user payload has no id");
    return None;
  };
  let paid_till = raw.paid_till.as_deref().and_then(|s| {
    let parsed = parse_date(s);
    if parsed.is_none() {
      warn!(target: "rollcall::normalize", user = %id, value = s, "unparseable paidTill");
    }
    parsed
  });
  Some(User {
    id,
    username: raw.username.clone().unwrap_or_default(),
    email: raw.email.clone().unwrap_or_default(),
    is_admin: raw.is_admin.unwrap_or(false),
    active: raw.active.unwrap_or(false),
    paid_till,
  })
}

/// Returns `None` (and logs) when the payload has no identifier; `name` is
/// passed through unchanged.
pub fn normalize_subject(raw: &RawSubject) -> Option<Subject> {
  let Some(id) = normalize_id(raw) else {
    warn!(target: "rollcall::normalize", name = ?raw.name, "subject payload has no id");
    return None;
  };
  Some(Subject { id, name: raw.name.clone().unwrap_or_default() })
}

/// Normalize a subject list, dropping unidentifiable entries.
pub fn normalize_subjects(raw: &[RawSubject]) -> Vec<Subject> {
  raw.iter().filter_map(normalize_subject).collect()
}

pub fn subject_lookup(subjects: &[Subject]) -> SubjectLookup {
  subjects.iter().map(|s| (s.id.clone(), s.clone())).collect()
}

/// Resolve a raw record into canonical shape against `lookup`.
///
/// Subject resolution order: an embedded object (looked up by its id, or
/// synthesized from its own name), then a bare id string, then the separate
/// `subjectId` field. An unresolved reference yields `subject: None` while
/// `subject_id` is preserved.
///
/// Idempotent: feeding the canonical form back in (serialized, or via
/// `RawAttendanceRecord::from`) reproduces the same record.
pub fn normalize_attendance_record(
  raw: &RawAttendanceRecord,
  lookup: &SubjectLookup,
) -> AttendanceRecord {
  let id = normalize_id(raw);
  if id.is_none() {
    warn!(target: "rollcall::normalize", "attendance record has no id");
  }

  let (subject, subject_id) = resolve_subject(raw, lookup);
  if subject.is_none() {
    warn!(
      target: "rollcall::normalize",
      record = ?id,
      subject_id = ?subject_id,
      "attendance record subject unresolved"
    );
  }

  let date = raw.date.as_deref().and_then(|s| {
    let parsed = parse_date(s);
    if parsed.is_none() {
      warn!(target: "rollcall::normalize", record = ?id, value = s, "unparseable date");
    }
    parsed
  });

  let status = raw.status.as_deref().and_then(|s| {
    let parsed = s.trim().parse::<AttendanceStatus>().ok();
    if parsed.is_none() {
      warn!(target: "rollcall::normalize", record = ?id, value = s, "unknown status");
    }
    parsed
  });

  AttendanceRecord {
    id,
    user_id: raw.user_id.as_ref().map(RawId::to_string),
    subject,
    subject_id,
    date,
    status,
    class_number: parse_class_number(raw.class_number.as_ref()),
  }
}

pub fn normalize_attendance_records(
  raw: &[RawAttendanceRecord],
  lookup: &SubjectLookup,
) -> Vec<AttendanceRecord> {
  raw
    .iter()
    .map(|r| normalize_attendance_record(r, lookup))
    .collect()
}

fn resolve_subject(
  raw: &RawAttendanceRecord,
  lookup: &SubjectLookup,
) -> (Option<Subject>, Option<String>) {
  let field_id = || raw.subject_id.as_ref().map(RawId::to_string);

  match &raw.subject {
    Some(RawSubjectRef::Embedded(embedded)) => match normalize_id(embedded) {
      Some(id) => {
        let subject = lookup.get(&id).cloned().unwrap_or_else(|| Subject {
          id:   id.clone(),
          name: embedded.name.clone().unwrap_or_default(),
        });
        (Some(subject), Some(id))
      }
      // An embedded object without an id says nothing usable; fall back to
      // the separate field.
      None => by_id(field_id(), lookup),
    },
    Some(RawSubjectRef::Id(id)) => by_id(Some(id.to_string()), lookup),
    None => by_id(field_id(), lookup),
  }
}

fn by_id(
  id: Option<String>,
  lookup: &SubjectLookup,
) -> (Option<Subject>, Option<String>) {
  let subject = id.as_ref().and_then(|id| lookup.get(id).cloned());
  (subject, id)
}

/// Date-only parse: `YYYY-MM-DD`, or the date part of a timestamp as
/// written (offset ignored, not converted).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
  let trimmed = raw.trim();
  NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
    .ok()
    .or_else(|| DateTime::parse_from_rfc3339(trimmed).ok().map(|dt| dt.date_naive()))
    .or_else(|| {
      trimmed
        .get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
    })
}

fn parse_class_number(raw: Option<&serde_json::Value>) -> u32 {
  let parsed = match raw {
    Some(serde_json::Value::Number(n)) => n
      .as_u64()
      .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
    Some(serde_json::Value::String(s)) => s.trim().parse::<u64>().ok(),
    _ => None,
  };
  parsed
    .and_then(|n| u32::try_from(n).ok())
    .filter(|n| *n > 0)
    .unwrap_or(1)
}

// ─── Canonical → raw ─────────────────────────────────────────────────────────

impl From<&AttendanceRecord> for RawAttendanceRecord {
  fn from(record: &AttendanceRecord) -> Self {
    Self {
      id:            record.id.as_deref().map(RawId::from),
      underscore_id: None,
      user_id:       record.user_id.as_deref().map(RawId::from),
      subject:       record.subject.as_ref().map(|s| {
        RawSubjectRef::Embedded(RawSubject {
          id:            Some(RawId::from(s.id.as_str())),
          underscore_id: None,
          name:          Some(s.name.clone()),
        })
      }),
      subject_id:    record.subject_id.as_deref().map(RawId::from),
      date:          record.date.map(|d| d.format("%Y-%m-%d").to_string()),
      status:        record.status.map(|s| s.to_string()),
      class_number:  Some(serde_json::Value::from(record.class_number)),
    }
  }
}

/// Re-run normalization over an already canonical record, e.g. after the
/// subject list changed.
pub fn renormalize(record: &AttendanceRecord, lookup: &SubjectLookup) -> AttendanceRecord {
  normalize_attendance_record(&RawAttendanceRecord::from(record), lookup)
}
