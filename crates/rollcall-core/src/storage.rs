//! Local persisted session state: a small string key/value store that
//! survives restarts and is cleared on logout.

use std::{collections::HashMap, sync::Mutex};

use tracing::warn;

use crate::{
  error::StorageError,
  normalize::{RawUser, normalize_user},
  user::User,
};

/// Key holding the store's current user.
pub const CURRENT_USER_KEY: &str = "currentUser";

/// Key holding the logged-in session record read by the session guard for
/// its synchronous check.
pub const SESSION_KEY: &str = "loggedUser";

pub trait SessionStorage: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
  fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
  fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Read a user stored under `key`.
///
/// The stored JSON goes back through the normalizer, so entries written with
/// the legacy `_id` spelling still load. Unreadable or corrupt entries are
/// logged and treated as absent.
pub fn load_user<S: SessionStorage + ?Sized>(storage: &S, key: &str) -> Option<User> {
  let raw = match storage.get(key) {
    Ok(Some(raw)) => raw,
    Ok(None) => return None,
    Err(e) => {
      warn!(key, error = %e, "failed to read stored user");
      return None;
    }
  };
  match serde_json::from_str::<RawUser>(&raw) {
    Ok(user) => normalize_user(&user),
    Err(e) => {
      warn!(key, error = %e, "discarding corrupt stored user");
      None
    }
  }
}

pub fn save_user<S: SessionStorage + ?Sized>(
  storage: &S,
  key: &str,
  user: &User,
) -> Result<(), StorageError> {
  storage.set(key, &serde_json::to_string(user)?)
}

/// In-process storage; nothing survives the process. Useful for tests and
/// for running without a session file.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, String>>,
}

impl SessionStorage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
    entries.remove(key);
    Ok(())
  }
}
