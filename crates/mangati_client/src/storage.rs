//! Durable session storage.
//!
//! [`Storage`] is a tiny key/value seam (a browser's local storage, a file per
//! key on disk, or memory in tests). [`SessionStore`] is the only code that
//! reads or writes session keys through it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    io::ErrorKind,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};
use tracing::warn;
use uuid::Uuid;

use crate::error::ClientError;

const TOKEN_KEY: &str = "token";
const USER_KEY: &str = "user";
const REDIRECT_KEY: &str = "redirectAfterLogin";

pub trait Storage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, ClientError>;
    fn write(&self, key: &str, value: &str) -> Result<(), ClientError>;
    fn remove(&self, key: &str) -> Result<(), ClientError>;
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, ClientError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// One file per key under a directory.
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, ClientError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, ClientError> {
        match fs::read_to_string(self.path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), ClientError> {
        fs::write(self.path(key), value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The user projection returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredSession {
    pub token: String,
    pub user: UserProfile,
}

/// Get/set/clear over the session keys. Reading never fails: anything that
/// cannot be read back cleanly is dropped and reported as "no session".
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn Storage>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn load(&self) -> Option<StoredSession> {
        match self.try_load() {
            Ok(session) => session,
            Err(e) => {
                warn!("Discarding unreadable session: {}", e);
                self.clear();
                None
            }
        }
    }

    fn try_load(&self) -> Result<Option<StoredSession>, ClientError> {
        let token = self.storage.read(TOKEN_KEY)?;
        let user = self.storage.read(USER_KEY)?;
        match (token, user) {
            (Some(token), Some(user)) => {
                let user: UserProfile = serde_json::from_str(&user)
                    .map_err(|e| ClientError::Storage(format!("stored user: {}", e)))?;
                Ok(Some(StoredSession { token, user }))
            }
            (None, None) => Ok(None),
            _ => Err(ClientError::Storage("half-written session".to_string())),
        }
    }

    pub fn save(&self, session: &StoredSession) -> Result<(), ClientError> {
        let user = serde_json::to_string(&session.user)
            .map_err(|e| ClientError::Storage(e.to_string()))?;
        self.storage.write(TOKEN_KEY, &session.token)?;
        self.storage.write(USER_KEY, &user)
    }

    pub fn clear(&self) {
        for key in [TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.storage.remove(key) {
                warn!("Failed to remove {} from session storage: {}", key, e);
            }
        }
    }

    pub fn set_redirect(&self, path: &str) {
        if let Err(e) = self.storage.write(REDIRECT_KEY, path) {
            warn!("Failed to remember redirect path: {}", e);
        }
    }

    /// Returns the remembered post-login path once.
    pub fn take_redirect(&self) -> Option<String> {
        let path = self.storage.read(REDIRECT_KEY).ok().flatten()?;
        if let Err(e) = self.storage.remove(REDIRECT_KEY) {
            warn!("Failed to forget redirect path: {}", e);
        }
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> StoredSession {
        StoredSession {
            token: "a.b.c".to_string(),
            user: UserProfile {
                id: Uuid::new_v4(),
                username: "hana".to_string(),
                email: "hana@mangati.app".to_string(),
                roles: vec!["Writer".to_string()],
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn file_storage_round_trips_a_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(Arc::new(FileStorage::open(dir.path()).unwrap()));
        assert_eq!(store.load(), None);

        let saved = session();
        store.save(&saved).unwrap();

        // A second store over the same directory sees it, like a restarted app.
        let reopened = SessionStore::new(Arc::new(FileStorage::open(dir.path()).unwrap()));
        assert_eq!(reopened.load(), Some(saved));

        reopened.clear();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn corrupt_user_json_is_no_session() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        storage.write(TOKEN_KEY, "a.b.c").unwrap();
        storage.write(USER_KEY, "{ not json").unwrap();

        let store = SessionStore::new(storage.clone());
        assert_eq!(store.load(), None);
        assert_eq!(storage.read(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.read(USER_KEY).unwrap(), None);
    }

    #[test]
    fn token_without_user_is_no_session() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(TOKEN_KEY, "a.b.c").unwrap();
        let store = SessionStore::new(storage.clone());
        assert_eq!(store.load(), None);
        assert_eq!(storage.read(TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn redirect_is_taken_once() {
        let store = SessionStore::new(Arc::new(MemoryStorage::new()));
        store.set_redirect("/series/7");
        assert_eq!(store.take_redirect().as_deref(), Some("/series/7"));
        assert_eq!(store.take_redirect(), None);
    }
}
