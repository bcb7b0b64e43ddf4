//! Error types for `rollcall-core`.

use thiserror::Error;

/// A failure reported by a [`crate::gateway::Gateway`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
  /// The server answered with a non-success status.
  #[error("server responded {status}: {}", .message.as_deref().unwrap_or("<no message>"))]
  Status {
    status:  u16,
    /// User-facing message extracted from the error payload, if any.
    message: Option<String>,
  },

  /// No response was received (connection refused, timeout, DNS, ...).
  #[error("network error: {0}")]
  Transport(String),

  /// A response arrived but its body could not be decoded.
  #[error("malformed response: {0}")]
  Decode(String),
}

/// How a failed login should be routed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFailure {
  /// Wrong email or password.
  InvalidCredentials,
  /// The account exists but its subscription is not active.
  Inactive,
  /// Anything else: server fault or no connectivity.
  Server,
}

impl GatewayError {
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Status { status, .. } => Some(*status),
      _ => None,
    }
  }

  /// The message carried by the server's error payload, if present.
  pub fn message(&self) -> Option<&str> {
    match self {
      Self::Status { message, .. } => message.as_deref(),
      _ => None,
    }
  }

  pub fn is_not_found(&self) -> bool { self.status() == Some(404) }

  /// The server's message when it sent one, otherwise `fallback`.
  pub fn user_message(&self, fallback: &str) -> String {
    self.message().unwrap_or(fallback).to_string()
  }

  /// Classify a login failure so the caller can branch between a credentials
  /// alert, the inactive-subscription view, and a generic error.
  pub fn login_failure(&self) -> LoginFailure {
    if let Some(message) = self.message() {
      let lowered = message.to_lowercase();
      if lowered.contains("not active") || lowered.contains("expired") {
        return LoginFailure::Inactive;
      }
    }
    match self.status() {
      Some(400 | 401 | 403 | 404) => LoginFailure::InvalidCredentials,
      _ => LoginFailure::Server,
    }
  }
}

/// A failure reading or writing the local persisted session state.
#[derive(Debug, Error)]
pub enum StorageError {
  #[error("storage io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("storage serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("storage lock poisoned")]
  Poisoned,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn status(status: u16, message: Option<&str>) -> GatewayError {
    GatewayError::Status { status, message: message.map(str::to_string) }
  }

  #[test]
  fn inactive_message_wins_over_status() {
    let err = status(403, Some("Account is not active"));
    assert_eq!(err.login_failure(), LoginFailure::Inactive);
    let err = status(401, Some("Subscription EXPIRED on 2025-01-01"));
    assert_eq!(err.login_failure(), LoginFailure::Inactive);
  }

  #[test]
  fn unauthorized_is_invalid_credentials() {
    assert_eq!(
      status(401, Some("Invalid email or password")).login_failure(),
      LoginFailure::InvalidCredentials
    );
    assert_eq!(status(401, None).login_failure(), LoginFailure::InvalidCredentials);
  }

  #[test]
  fn transport_and_5xx_are_server_failures() {
    assert_eq!(
      GatewayError::Transport("connection refused".into()).login_failure(),
      LoginFailure::Server
    );
    assert_eq!(status(502, None).login_failure(), LoginFailure::Server);
  }

  #[test]
  fn user_message_falls_back() {
    assert_eq!(
      status(409, Some("Email already registered")).user_message("Registration failed"),
      "Email already registered"
    );
    assert_eq!(
      GatewayError::Decode("eof".into()).user_message("Registration failed"),
      "Registration failed"
    );
  }
}
