//! Subjects: a named course owned by one user; attendance is recorded
//! against it.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
  pub id:   String,
  pub name: String,
}

impl Subject {
  /// Subject names are unique per user without regard to case.
  pub fn has_name(&self, name: &str) -> bool {
    self.name.to_lowercase() == name.trim().to_lowercase()
  }
}

/// Find a subject by case-insensitive name.
pub fn find_by_name<'a>(subjects: &'a [Subject], name: &str) -> Option<&'a Subject> {
  subjects.iter().find(|s| s.has_name(name))
}
