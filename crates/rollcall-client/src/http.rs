//! Async HTTP client wrapping the attendance JSON API.

use std::time::Duration;

use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rollcall_core::{
  GatewayError,
  gateway::{Gateway, NewRecord, RecordUpdate},
  normalize::{RawAttendanceRecord, RawSubject, RawUser},
  user::Registration,
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

/// Connection settings for the attendance API.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
  /// API root, including any path prefix (e.g. `https://host/api`).
  pub base_url: String,
  pub timeout:  Duration,
}

/// Async HTTP client for the attendance REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpGateway {
  client:   Client,
  base_url: String,
}

#[derive(Serialize)]
struct Credentials {
  email:    String,
  password: String,
}

impl HttpGateway {
  pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
    let client = Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;
    Ok(Self {
      client,
      base_url: config.base_url.trim_end_matches('/').to_string(),
    })
  }

  fn url(&self, path: &str) -> String { format!("{}{}", self.base_url, path) }

  /// Send `req`, mapping transport failures and non-success statuses.
  async fn send(&self, label: &str, req: RequestBuilder) -> Result<Response, GatewayError> {
    debug!(request = label, "sending");
    let resp = req
      .send()
      .await
      .map_err(|e| GatewayError::Transport(format!("{label}: {e}")))?;

    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!(request = label, %status, "request rejected");
    Err(GatewayError::Status {
      status:  status.as_u16(),
      message: extract_message(&body),
    })
  }

  async fn fetch<T: DeserializeOwned>(
    &self,
    label: &str,
    req: RequestBuilder,
  ) -> Result<T, GatewayError> {
    let resp = self.send(label, req).await?;
    decode(label, resp).await
  }

  async fn execute(&self, label: &str, req: RequestBuilder) -> Result<(), GatewayError> {
    self.send(label, req).await.map(drop)
  }
}

async fn decode<T: DeserializeOwned>(label: &str, resp: Response) -> Result<T, GatewayError> {
  resp
    .json()
    .await
    .map_err(|e| GatewayError::Decode(format!("{label}: {e}")))
}

/// Pull a user-facing message out of an error body: `{"message": ...}`,
/// `{"error": ...}`, a JSON string, or plain text.
pub(crate) fn extract_message(body: &str) -> Option<String> {
  let trimmed = body.trim();
  if trimmed.is_empty() {
    return None;
  }
  match serde_json::from_str::<serde_json::Value>(trimmed) {
    Ok(serde_json::Value::Object(map)) => map
      .get("message")
      .or_else(|| map.get("error"))
      .and_then(|v| v.as_str())
      .map(str::to_string),
    Ok(serde_json::Value::String(s)) => Some(s),
    Ok(_) => None,
    Err(_) => Some(trimmed.to_string()),
  }
}

impl Gateway for HttpGateway {
  // ── Accounts ──────────────────────────────────────────────────────────────

  async fn register(&self, input: Registration) -> Result<RawUser, GatewayError> {
    let req = self.client.post(self.url("/users/register")).json(&input);
    self.fetch("POST /users/register", req).await
  }

  async fn login(&self, email: String, password: String) -> Result<RawUser, GatewayError> {
    let req = self
      .client
      .post(self.url("/users/login"))
      .json(&Credentials { email, password });
    self.fetch("POST /users/login", req).await
  }

  async fn admin_login(&self, email: String, password: String) -> Result<RawUser, GatewayError> {
    let req = self
      .client
      .post(self.url("/admin/login"))
      .json(&Credentials { email, password });
    self.fetch("POST /admin/login", req).await
  }

  async fn get_user(&self, user_id: String) -> Result<Option<RawUser>, GatewayError> {
    let req = self.client.get(self.url(&format!("/users/{user_id}")));
    match self.send("GET /users/:id", req).await {
      Ok(resp) => decode("GET /users/:id", resp).await,
      Err(GatewayError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }

  // ── Administration ────────────────────────────────────────────────────────

  async fn list_users(&self) -> Result<Vec<RawUser>, GatewayError> {
    self.fetch("GET /users", self.client.get(self.url("/users"))).await
  }

  async fn activate_user(&self, user_id: String, days: u32) -> Result<RawUser, GatewayError> {
    let req = self
      .client
      .put(self.url(&format!("/admin/users/{user_id}/activate")))
      .query(&[("days", days)]);
    self.fetch("PUT /admin/users/:id/activate", req).await
  }

  async fn deactivate_user(&self, user_id: String) -> Result<RawUser, GatewayError> {
    let req = self
      .client
      .put(self.url(&format!("/admin/users/{user_id}/deactivate")));
    self.fetch("PUT /admin/users/:id/deactivate", req).await
  }

  // ── Subjects ──────────────────────────────────────────────────────────────

  async fn list_subjects(&self, user_id: String) -> Result<Vec<RawSubject>, GatewayError> {
    let req = self.client.get(self.url(&format!("/subjects/user/{user_id}")));
    self.fetch("GET /subjects/user/:userId", req).await
  }

  async fn add_subject(&self, user_id: String, name: String) -> Result<RawSubject, GatewayError> {
    let req = self
      .client
      .post(self.url("/subjects/add"))
      .query(&[("userId", user_id), ("name", name)]);
    self.fetch("POST /subjects/add", req).await
  }

  async fn delete_subject(&self, subject_id: String, user_id: String) -> Result<(), GatewayError> {
    let req = self
      .client
      .delete(self.url(&format!("/subjects/{subject_id}/user/{user_id}")));
    self.execute("DELETE /subjects/:subjectId/user/:userId", req).await
  }

  // ── Attendance ────────────────────────────────────────────────────────────

  async fn list_attendance(&self, user_id: String) -> Result<Vec<RawAttendanceRecord>, GatewayError> {
    let req = self.client.get(self.url(&format!("/attendance/user/{user_id}")));
    self.fetch("GET /attendance/user/:userId", req).await
  }

  async fn add_attendance(&self, record: NewRecord) -> Result<RawAttendanceRecord, GatewayError> {
    let req = self.client.post(self.url("/attendance/add")).query(&[
      ("userId", record.user_id),
      ("subjectId", record.subject_id),
      ("status", record.status.to_string()),
      ("date", record.date.format("%Y-%m-%d").to_string()),
      ("classNumber", record.class_number.to_string()),
    ]);
    self.fetch("POST /attendance/add", req).await
  }

  async fn update_attendance(
    &self,
    record_id: String,
    update: RecordUpdate,
  ) -> Result<RawAttendanceRecord, GatewayError> {
    let req = self
      .client
      .put(self.url(&format!("/attendance/{record_id}")))
      .json(&update);
    self.fetch("PUT /attendance/:id", req).await
  }

  async fn delete_attendance(&self, record_id: String) -> Result<(), GatewayError> {
    let req = self.client.delete(self.url(&format!("/attendance/{record_id}")));
    self.execute("DELETE /attendance/:id", req).await
  }

  async fn delete_attendance_by_slot(
    &self,
    subject_id: String,
    date: NaiveDate,
    class_number: u32,
  ) -> Result<(), GatewayError> {
    let req = self
      .client
      .delete(self.url("/attendance/delete-by-subject-date-class"))
      .query(&[
        ("subjectId", subject_id),
        ("date", date.format("%Y-%m-%d").to_string()),
        ("classNumber", class_number.to_string()),
      ]);
    self.execute("DELETE /attendance/delete-by-subject-date-class", req).await
  }

  // ── Reset ─────────────────────────────────────────────────────────────────

  async fn reset_user_data(&self, user_id: String) -> Result<(), GatewayError> {
    let req = self.client.delete(self.url(&format!("/reset/user/{user_id}")));
    self.execute("DELETE /reset/user/:userId", req).await
  }
}
