//! Authentication collaborator.
//!
//! The data-access layer performs no authorization of its own; it only
//! needs the current session's access token to attach to remote calls.

mod client;
mod session;

pub use client::GoTrueAuth;
pub use session::{SessionHandle, SessionStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthErrorKind};

const MAX_EMAIL_CHARS: usize = 255;
const MIN_PASSWORD_CHARS: usize = 6;
const MAX_PASSWORD_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub access_token: String,
  pub refresh_token: Option<String>,
  pub expires_at: Option<DateTime<Utc>>,
  pub user: User,
}

impl Session {
  pub fn is_expired(&self) -> bool {
    self.expires_at.is_some_and(|at| at <= Utc::now())
  }
}

/// Sign-in capability consumed by the application.
#[async_trait]
pub trait AuthProvider: Send + Sync {
  fn current_user(&self) -> Option<User>;

  async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError>;

  /// Register a new account. Depending on the service this may or may not
  /// start a session right away.
  async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError>;

  async fn sign_out(&self);
}

/// Email and password that passed form validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
  pub email: String,
  pub password: String,
}

/// Validate sign-in form fields before contacting the auth service.
pub fn validate_credentials(email: &str, password: &str) -> Result<Credentials, AuthError> {
  let email = email.trim();
  if email.chars().count() > MAX_EMAIL_CHARS || !looks_like_email(email) {
    return Err(AuthError::new(AuthErrorKind::InvalidInput, "Email inválido"));
  }

  let length = password.chars().count();
  if length < MIN_PASSWORD_CHARS {
    return Err(AuthError::new(
      AuthErrorKind::InvalidInput,
      format!("Mínimo {} caracteres", MIN_PASSWORD_CHARS),
    ));
  }
  if length > MAX_PASSWORD_CHARS {
    return Err(AuthError::new(
      AuthErrorKind::InvalidInput,
      format!("Máximo {} caracteres", MAX_PASSWORD_CHARS),
    ));
  }

  Ok(Credentials {
    email: email.to_string(),
    password: password.to_string(),
  })
}

fn looks_like_email(value: &str) -> bool {
  if value.chars().any(char::is_whitespace) {
    return false;
  }
  let Some((local, domain)) = value.split_once('@') else {
    return false;
  };
  !local.is_empty()
    && !domain.contains('@')
    && domain.contains('.')
    && !domain.starts_with('.')
    && !domain.ends_with('.')
}
