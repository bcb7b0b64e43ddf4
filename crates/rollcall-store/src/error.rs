//! Error type for `rollcall-store`.
//!
//! Every variant's `Display` is the user-facing message; it is also what the
//! store writes into `StoreState::error`.

use rollcall_core::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("You need to be logged in to do that.")]
  NotLoggedIn,

  #[error("Administrator access is required.")]
  AdminRequired,

  #[error("Passwords do not match")]
  PasswordMismatch,

  #[error("Subject name must not be empty")]
  EmptySubjectName,

  #[error("Subject \"{0}\" already exists")]
  DuplicateSubject(String),

  #[error("Subject not found")]
  SubjectNotFound(String),

  /// The backend accepted a write but its response has no usable id.
  #[error("The server returned a {0} without an id")]
  MissingId(&'static str),

  /// A gateway call failed. `message` is what the user sees.
  #[error("{message}")]
  Gateway {
    message: String,
    #[source]
    source:  GatewayError,
  },
}

impl Error {
  pub(crate) fn gateway(source: GatewayError, fallback: &str) -> Self {
    Self::Gateway { message: fallback.to_string(), source }
  }

  /// Prefer the server's own message over `fallback`.
  pub(crate) fn gateway_with_server_message(source: GatewayError, fallback: &str) -> Self {
    Self::Gateway { message: source.user_message(fallback), source }
  }

  /// True for failures caught before any request was made.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      Self::PasswordMismatch
        | Self::EmptySubjectName
        | Self::DuplicateSubject(_)
        | Self::SubjectNotFound(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
