//! Session state shared between the auth client and the table client.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

use super::{Session, User};

/// Cloneable handle to the current session.
#[derive(Clone, Default)]
pub struct SessionHandle {
  inner: Arc<RwLock<Option<Session>>>,
}

impl SessionHandle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_session(session: Option<Session>) -> Self {
    Self {
      inner: Arc::new(RwLock::new(session)),
    }
  }

  pub fn get(&self) -> Option<Session> {
    self
      .inner
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Access token of a live (non-expired) session.
  pub fn access_token(&self) -> Option<String> {
    self
      .get()
      .filter(|s| !s.is_expired())
      .map(|s| s.access_token)
  }

  pub fn user(&self) -> Option<User> {
    self.get().filter(|s| !s.is_expired()).map(|s| s.user)
  }

  pub fn set(&self, session: Session) {
    *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
  }

  pub fn clear(&self) {
    *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
  }
}

/// Session persisted as JSON so separate CLI invocations share a sign-in.
#[derive(Debug, Clone)]
pub struct SessionStore {
  path: PathBuf,
}

impl SessionStore {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  /// `$XDG_DATA_HOME/labcat/session.json`
  pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|dir| dir.join("labcat").join("session.json"))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Load the stored session; unreadable or corrupt files count as signed out.
  pub fn load(&self) -> Option<Session> {
    let contents = std::fs::read_to_string(&self.path).ok()?;
    match serde_json::from_str(&contents) {
      Ok(session) => Some(session),
      Err(e) => {
        warn!(path = %self.path.display(), error = %e, "ignoring unreadable session file");
        None
      }
    }
  }

  pub fn save(&self, session: &Session) -> std::io::Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(session).map_err(std::io::Error::other)?;
    std::fs::write(&self.path, data)?;
    debug!(path = %self.path.display(), "session saved");
    Ok(())
  }

  pub fn clear(&self) -> std::io::Result<()> {
    match std::fs::remove_file(&self.path) {
      Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
      _ => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn session() -> Session {
    Session {
      access_token: "token".into(),
      refresh_token: Some("refresh".into()),
      expires_at: None,
      user: User {
        id: "user-1".into(),
        email: Some("admin@imedilab.mx".into()),
      },
    }
  }

  #[test]
  fn test_store_save_load_clear() {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::new(dir.path().join("nested").join("session.json"));

    assert!(store.load().is_none());
    store.save(&session()).unwrap();
    assert_eq!(store.load(), Some(session()));

    store.clear().unwrap();
    assert!(store.load().is_none());
    // Clearing twice is fine
    store.clear().unwrap();
  }

  #[test]
  fn test_corrupt_file_is_signed_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(SessionStore::new(path).load().is_none());
  }

  #[test]
  fn test_handle_hides_expired_session() {
    let handle = SessionHandle::new();
    assert!(handle.access_token().is_none());

    let mut expired = session();
    expired.expires_at = Some(chrono::Utc::now() - chrono::Duration::minutes(1));
    handle.set(expired);
    assert!(handle.access_token().is_none());
    assert!(handle.user().is_none());

    handle.set(session());
    assert_eq!(handle.access_token().as_deref(), Some("token"));
    handle.clear();
    assert!(handle.get().is_none());
  }
}
