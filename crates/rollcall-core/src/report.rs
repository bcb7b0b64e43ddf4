//! Aggregate attendance statistics and history ordering.
//!
//! A record weighs as many hours as its `class_number` (minimum one).
//! "No Class" records are counted but never contribute to hour totals.

use std::cmp::Reverse;

use serde::Serialize;

use crate::{
  attendance::{AttendanceRecord, AttendanceStatus},
  subject::Subject,
};

/// Statistics for one subject, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStats {
  pub name:           String,
  pub present:        u32,
  pub absent:         u32,
  pub no_class:       u32,
  pub total_hours:    u32,
  pub attended_hours: u32,
  pub missed_hours:   u32,
  pub percentage:     u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
  pub total_hours:        u32,
  pub attended_hours:     u32,
  pub missed_hours:       u32,
  pub classes_attended:   u32,
  /// Present plus absent; "No Class" entries are not held classes.
  pub classes_held:       u32,
  pub average_percentage: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceReport {
  pub subjects: Vec<SubjectStats>,
  pub overall:  OverallStats,
}

impl AttendanceReport {
  /// Every subject appears, in list order, even without records. Records
  /// whose subject has since been removed but still carry a name are counted
  /// under that name after the known subjects; nameless orphans are skipped.
  pub fn build(subjects: &[Subject], records: &[AttendanceRecord]) -> Self {
    let mut stats: Vec<SubjectStats> = Vec::new();
    for subject in subjects {
      if !stats.iter().any(|s| s.name == subject.name) {
        stats.push(SubjectStats { name: subject.name.clone(), ..Default::default() });
      }
    }

    for record in records {
      let Some(name) = subject_name(record, subjects) else {
        continue;
      };
      let index = match stats.iter().position(|s| s.name == name) {
        Some(i) => i,
        None => {
          stats.push(SubjectStats { name: name.to_string(), ..Default::default() });
          stats.len() - 1
        }
      };
      let entry = &mut stats[index];
      let hours = record.hours();
      match record.status {
        Some(AttendanceStatus::Present) => {
          entry.present += 1;
          entry.attended_hours += hours;
          entry.total_hours += hours;
        }
        Some(AttendanceStatus::Absent) => {
          entry.absent += 1;
          entry.missed_hours += hours;
          entry.total_hours += hours;
        }
        Some(AttendanceStatus::NoClass) => entry.no_class += 1,
        None => {}
      }
    }

    let mut overall = OverallStats::default();
    for entry in &mut stats {
      entry.percentage = percentage(entry.attended_hours, entry.total_hours);
      overall.total_hours += entry.total_hours;
      overall.attended_hours += entry.attended_hours;
      overall.missed_hours += entry.missed_hours;
      overall.classes_attended += entry.present;
      overall.classes_held += entry.present + entry.absent;
    }
    overall.average_percentage = percentage(overall.attended_hours, overall.total_hours);

    Self { subjects: stats, overall }
  }
}

fn subject_name<'a>(record: &'a AttendanceRecord, subjects: &'a [Subject]) -> Option<&'a str> {
  if let Some(subject) = &record.subject
    && !subject.name.is_empty()
  {
    return Some(subject.name.as_str());
  }
  let id = record.resolved_subject_id()?;
  subjects.iter().find(|s| s.id == id).map(|s| s.name.as_str())
}

/// Rounded to the nearest whole percent; zero when nothing was held.
fn percentage(attended: u32, total: u32) -> u32 {
  if total == 0 {
    return 0;
  }
  (f64::from(attended) * 100.0 / f64::from(total)).round() as u32
}

/// Records ordered most recent first; undated records last.
pub fn history(records: &[AttendanceRecord]) -> Vec<&AttendanceRecord> {
  let mut sorted: Vec<&AttendanceRecord> = records.iter().collect();
  sorted.sort_by_key(|r| (r.date.is_none(), Reverse(r.date)));
  sorted
}
