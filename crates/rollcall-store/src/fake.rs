//! An in-memory [`Gateway`] standing in for the REST backend in tests.
//!
//! Payloads are kept as raw JSON so tests can seed the inconsistent shapes
//! the real backend produces (`id` vs `_id`, embedded vs bare subject refs).

use std::{
  sync::{Mutex, MutexGuard},
  time::Duration,
};

use chrono::{Duration as Days, NaiveDate};
use rollcall_core::{
  GatewayError,
  gateway::{Gateway, NewRecord, RecordUpdate},
  normalize::{RawAttendanceRecord, RawSubject, RawUser},
  user::Registration,
};
use serde_json::{Value, json};

#[derive(Default)]
pub struct Backend {
  pub users:       Vec<Value>,
  pub subjects:    Vec<Value>,
  pub records:     Vec<Value>,
  /// Every call fails as if the server were unreachable.
  pub offline:     bool,
  /// Write calls fail with a 500.
  pub fail_writes: bool,
  /// Names of the calls made, in order.
  pub calls:       Vec<&'static str>,
  next_id:         u32,
}

impl Backend {
  fn id(&mut self, prefix: &str) -> String {
    self.next_id += 1;
    format!("{prefix}{}", self.next_id)
  }
}

#[derive(Default)]
pub struct FakeGateway {
  backend: Mutex<Backend>,
  latency: Mutex<Duration>,
}

fn id_of(value: &Value) -> Option<&str> {
  value
    .get("id")
    .or_else(|| value.get("_id"))
    .and_then(Value::as_str)
}

fn subject_of(record: &Value) -> Option<&str> {
  match record.get("subject") {
    Some(Value::String(id)) => Some(id.as_str()),
    Some(obj @ Value::Object(_)) => id_of(obj),
    _ => record.get("subjectId").and_then(Value::as_str),
  }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, GatewayError> {
  serde_json::from_value(value).map_err(|e| GatewayError::Decode(e.to_string()))
}

fn server_error() -> GatewayError {
  GatewayError::Status { status: 500, message: Some("internal error".into()) }
}

fn not_found(what: &str) -> GatewayError {
  GatewayError::Status { status: 404, message: Some(format!("{what} not found")) }
}

impl FakeGateway {
  pub fn backend(&self) -> MutexGuard<'_, Backend> { self.backend.lock().unwrap() }

  pub fn set_latency(&self, latency: Duration) { *self.latency.lock().unwrap() = latency; }

  pub fn calls(&self, name: &str) -> usize {
    self.backend().calls.iter().filter(|c| **c == name).count()
  }

  pub fn seed_user(&self, user: Value) { self.backend().users.push(user); }

  /// A member with password "pw" whose subscription runs `days` from today.
  pub fn seed_member(&self, id: &str, email: &str, active: bool, days: i64) {
    let paid = chrono::Local::now().date_naive() + Days::days(days);
    self.seed_user(json!({
      "_id": id,
      "username": id,
      "email": email,
      "password": "pw",
      "active": active,
      "paidTill": paid.format("%Y-%m-%d").to_string(),
    }));
  }

  /// Sleep for the configured latency, then lock the backend and log the
  /// call. Fails first if offline.
  async fn enter(&self, call: &'static str, write: bool) -> Result<MutexGuard<'_, Backend>, GatewayError> {
    let latency = *self.latency.lock().unwrap();
    if !latency.is_zero() {
      tokio::time::sleep(latency).await;
    }
    let mut backend = self.backend();
    backend.calls.push(call);
    if backend.offline {
      return Err(GatewayError::Transport("connection refused".into()));
    }
    if write && backend.fail_writes {
      return Err(server_error());
    }
    Ok(backend)
  }

  fn public_user(user: &Value) -> Value {
    let mut user = user.clone();
    if let Some(map) = user.as_object_mut() {
      map.remove("password");
    }
    user
  }

  async fn authenticate(&self, call: &'static str, email: String, password: String) -> Result<RawUser, GatewayError> {
    let backend = self.enter(call, false).await?;
    let user = backend
      .users
      .iter()
      .find(|u| u["email"] == email.as_str() && u["password"] == password.as_str())
      .map(Self::public_user)
      .ok_or(GatewayError::Status {
        status:  401,
        message: Some("Invalid email or password".into()),
      })?;
    decode(user)
  }
}

impl Gateway for FakeGateway {
  async fn register(&self, input: Registration) -> Result<RawUser, GatewayError> {
    let mut backend = self.enter("register", true).await?;
    if backend.users.iter().any(|u| u["email"] == input.email.as_str()) {
      return Err(GatewayError::Status {
        status:  409,
        message: Some("Email already registered".into()),
      });
    }
    let id = backend.id("u");
    let user = json!({
      "id": id,
      "username": input.username,
      "email": input.email,
      "password": input.password,
      "active": false,
    });
    backend.users.push(user.clone());
    decode(Self::public_user(&user))
  }

  async fn login(&self, email: String, password: String) -> Result<RawUser, GatewayError> {
    self.authenticate("login", email, password).await
  }

  async fn admin_login(&self, email: String, password: String) -> Result<RawUser, GatewayError> {
    self.authenticate("admin_login", email, password).await
  }

  async fn get_user(&self, user_id: String) -> Result<Option<RawUser>, GatewayError> {
    let backend = self.enter("get_user", false).await?;
    backend
      .users
      .iter()
      .find(|u| id_of(u) == Some(user_id.as_str()))
      .map(|u| decode(Self::public_user(u)))
      .transpose()
  }

  async fn list_users(&self) -> Result<Vec<RawUser>, GatewayError> {
    let backend = self.enter("list_users", false).await?;
    backend.users.iter().map(|u| decode(Self::public_user(u))).collect()
  }

  async fn activate_user(&self, user_id: String, days: u32) -> Result<RawUser, GatewayError> {
    let mut backend = self.enter("activate_user", true).await?;
    let paid = chrono::Local::now().date_naive() + Days::days(i64::from(days));
    let user = backend
      .users
      .iter_mut()
      .find(|u| id_of(u) == Some(user_id.as_str()))
      .ok_or_else(|| not_found("user"))?;
    user["active"] = json!(true);
    user["paidTill"] = json!(paid.format("%Y-%m-%d").to_string());
    decode(Self::public_user(user))
  }

  async fn deactivate_user(&self, user_id: String) -> Result<RawUser, GatewayError> {
    let mut backend = self.enter("deactivate_user", true).await?;
    let user = backend
      .users
      .iter_mut()
      .find(|u| id_of(u) == Some(user_id.as_str()))
      .ok_or_else(|| not_found("user"))?;
    user["active"] = json!(false);
    decode(Self::public_user(user))
  }

  async fn list_subjects(&self, user_id: String) -> Result<Vec<RawSubject>, GatewayError> {
    let backend = self.enter("list_subjects", false).await?;
    backend
      .subjects
      .iter()
      .filter(|s| s["userId"] == user_id.as_str())
      .cloned()
      .map(decode)
      .collect()
  }

  async fn add_subject(&self, user_id: String, name: String) -> Result<RawSubject, GatewayError> {
    let mut backend = self.enter("add_subject", true).await?;
    let id = backend.id("s");
    let subject = json!({ "_id": id, "name": name, "userId": user_id });
    backend.subjects.push(subject.clone());
    decode(subject)
  }

  async fn delete_subject(&self, subject_id: String, user_id: String) -> Result<(), GatewayError> {
    let mut backend = self.enter("delete_subject", true).await?;
    backend
      .subjects
      .retain(|s| !(id_of(s) == Some(subject_id.as_str()) && s["userId"] == user_id.as_str()));
    backend.records.retain(|r| subject_of(r) != Some(subject_id.as_str()));
    Ok(())
  }

  async fn list_attendance(&self, user_id: String) -> Result<Vec<RawAttendanceRecord>, GatewayError> {
    let backend = self.enter("list_attendance", false).await?;
    backend
      .records
      .iter()
      .filter(|r| r["userId"] == user_id.as_str())
      .cloned()
      .map(decode)
      .collect()
  }

  async fn add_attendance(&self, record: NewRecord) -> Result<RawAttendanceRecord, GatewayError> {
    let mut backend = self.enter("add_attendance", true).await?;
    let id = backend.id("a");
    let record = json!({
      "_id": id,
      "userId": record.user_id,
      "subject": record.subject_id,
      "status": record.status.to_string(),
      "date": record.date.format("%Y-%m-%d").to_string(),
      "classNumber": record.class_number,
    });
    backend.records.push(record.clone());
    decode(record)
  }

  async fn update_attendance(
    &self,
    record_id: String,
    update: RecordUpdate,
  ) -> Result<RawAttendanceRecord, GatewayError> {
    let mut backend = self.enter("update_attendance", true).await?;
    let record = backend
      .records
      .iter_mut()
      .find(|r| id_of(r) == Some(record_id.as_str()))
      .ok_or_else(|| not_found("record"))?;
    if let Some(subject_id) = update.subject_id {
      record["subject"] = json!(subject_id);
    }
    if let Some(status) = update.status {
      record["status"] = json!(status.to_string());
    }
    if let Some(date) = update.date {
      record["date"] = json!(date.format("%Y-%m-%d").to_string());
    }
    if let Some(class_number) = update.class_number {
      record["classNumber"] = json!(class_number);
    }
    decode(record.clone())
  }

  async fn delete_attendance(&self, record_id: String) -> Result<(), GatewayError> {
    let mut backend = self.enter("delete_attendance", true).await?;
    backend.records.retain(|r| id_of(r) != Some(record_id.as_str()));
    Ok(())
  }

  async fn delete_attendance_by_slot(
    &self,
    subject_id: String,
    date: NaiveDate,
    class_number: u32,
  ) -> Result<(), GatewayError> {
    let mut backend = self.enter("delete_attendance_by_slot", true).await?;
    let date = date.format("%Y-%m-%d").to_string();
    backend.records.retain(|r| {
      !(subject_of(r) == Some(subject_id.as_str())
        && r["date"] == date.as_str()
        && r["classNumber"] == class_number)
    });
    Ok(())
  }

  async fn reset_user_data(&self, user_id: String) -> Result<(), GatewayError> {
    let mut backend = self.enter("reset_user_data", true).await?;
    backend.subjects.retain(|s| s["userId"] != user_id.as_str());
    backend.records.retain(|r| r["userId"] != user_id.as_str());
    Ok(())
  }
}
