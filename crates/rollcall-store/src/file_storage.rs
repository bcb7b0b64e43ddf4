//! [`FileStorage`] — a [`SessionStorage`] persisted as one JSON object on
//! disk.

use std::{
  collections::BTreeMap,
  fs, io,
  path::{Path, PathBuf},
  sync::Mutex,
};

use rollcall_core::{StorageError, storage::SessionStorage};

/// Session storage backed by a single JSON file of string keys to string
/// values. A missing file reads as empty.
#[derive(Debug)]
pub struct FileStorage {
  path: PathBuf,
  lock: Mutex<()>,
}

type Entries = BTreeMap<String, String>;

impl FileStorage {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self { path: path.as_ref().to_path_buf(), lock: Mutex::new(()) }
  }

  pub fn path(&self) -> &Path { &self.path }

  fn read_entries(&self) -> Result<Entries, StorageError> {
    match fs::read_to_string(&self.path) {
      Ok(raw) if raw.trim().is_empty() => Ok(Entries::new()),
      Ok(raw) => Ok(serde_json::from_str(&raw)?),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Entries::new()),
      Err(e) => Err(e.into()),
    }
  }

  /// Write via a sibling temp file and rename so a crash never leaves a
  /// half-written session file.
  fn write_entries(&self, entries: &Entries) -> Result<(), StorageError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent)?;
    }
    let tmp = self.path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
    fs::rename(&tmp, &self.path)?;
    Ok(())
  }

  fn update(&self, f: impl FnOnce(&mut Entries)) -> Result<(), StorageError> {
    let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
    let mut entries = self.read_entries()?;
    f(&mut entries);
    self.write_entries(&entries)
  }
}

impl SessionStorage for FileStorage {
  fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
    let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
    Ok(self.read_entries()?.remove(key))
  }

  fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
    self.update(|entries| {
      entries.insert(key.to_string(), value.to_string());
    })
  }

  fn remove(&self, key: &str) -> Result<(), StorageError> {
    self.update(|entries| {
      entries.remove(key);
    })
  }
}

#[cfg(test)]
mod tests {
  use rollcall_core::storage::{CURRENT_USER_KEY, SESSION_KEY};

  use super::*;

  fn temp_path() -> PathBuf {
    std::env::temp_dir()
      .join(format!("rollcall-{}", uuid::Uuid::new_v4()))
      .join("session.json")
  }

  #[test]
  fn values_survive_a_new_instance() {
    let path = temp_path();
    let storage = FileStorage::new(&path);
    storage.set(CURRENT_USER_KEY, r#"{"id":"u1"}"#).unwrap();
    storage.set(SESSION_KEY, r#"{"id":"u1","active":true}"#).unwrap();

    let reopened = FileStorage::new(&path);
    assert_eq!(
      reopened.get(CURRENT_USER_KEY).unwrap().as_deref(),
      Some(r#"{"id":"u1"}"#)
    );

    reopened.remove(SESSION_KEY).unwrap();
    assert!(storage.get(SESSION_KEY).unwrap().is_none());
    assert!(storage.get(CURRENT_USER_KEY).unwrap().is_some());

    fs::remove_dir_all(path.parent().unwrap()).ok();
  }

  #[test]
  fn missing_file_reads_empty() {
    let storage = FileStorage::new(temp_path());
    assert!(storage.get(SESSION_KEY).unwrap().is_none());
  }

  #[test]
  fn corrupt_file_is_an_error() {
    let path = temp_path();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{oops").unwrap();
    let storage = FileStorage::new(&path);
    assert!(matches!(storage.get(SESSION_KEY), Err(StorageError::Serialization(_))));
    fs::remove_dir_all(path.parent().unwrap()).ok();
  }
}
