//! User accounts and the subscription predicate derived from them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A user account in canonical shape: one `id` field regardless of how the
/// backend spelled it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id:        String,
  pub username:  String,
  pub email:     String,
  pub is_admin:  bool,
  pub active:    bool,
  /// Last calendar day covered by the subscription.
  pub paid_till: Option<NaiveDate>,
}

impl User {
  /// `active` and paid through `today` (inclusive). Both conditions are
  /// required; a missing `paid_till` is never active.
  pub fn is_active_on(&self, today: NaiveDate) -> bool {
    self.active && self.paid_till.is_some_and(|paid| paid >= today)
  }
}

/// Input to `Gateway::register`.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
  pub username:         String,
  pub email:            String,
  pub password:         String,
  /// Checked locally before any request is made; never sent.
  #[serde(skip)]
  pub confirm_password: Option<String>,
}

impl Registration {
  pub fn passwords_match(&self) -> bool {
    self.confirm_password.as_deref().is_none_or(|c| c == self.password)
  }
}
