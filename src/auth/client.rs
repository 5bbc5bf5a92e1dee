//! HTTP client for a GoTrue-style auth service.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Response;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use url::Url;

use super::{validate_credentials, AuthProvider, Session, SessionHandle, SessionStore, User};
use crate::config::RemoteConfig;
use crate::error::{AuthError, AuthErrorKind, ConfigError};

#[derive(Debug, Deserialize)]
struct ApiUser {
  id: String,
  #[serde(default)]
  email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiTokenResponse {
  access_token: String,
  #[serde(default)]
  refresh_token: Option<String>,
  #[serde(default)]
  expires_in: Option<i64>,
  user: ApiUser,
}

impl ApiTokenResponse {
  fn into_session(self) -> Session {
    Session {
      access_token: self.access_token,
      refresh_token: self.refresh_token,
      expires_at: self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
      user: User {
        id: self.user.id,
        email: self.user.email,
      },
    }
  }
}

/// The service reports errors under different keys depending on the endpoint.
#[derive(Debug, Deserialize)]
struct ApiAuthError {
  #[serde(default)]
  error_description: Option<String>,
  #[serde(default)]
  msg: Option<String>,
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  error: Option<String>,
}

impl ApiAuthError {
  fn message(self) -> Option<String> {
    self
      .error_description
      .or(self.msg)
      .or(self.message)
      .or(self.error)
  }
}

/// Auth client that keeps the active session in a [`SessionHandle`] and,
/// optionally, on disk.
#[derive(Clone)]
pub struct GoTrueAuth {
  http: reqwest::Client,
  base: Url,
  api_key: String,
  session: SessionHandle,
  store: Option<SessionStore>,
}

impl GoTrueAuth {
  pub fn new(
    config: &RemoteConfig,
    api_key: String,
    session: SessionHandle,
  ) -> Result<Self, ConfigError> {
    Ok(Self {
      http: config.http_client()?,
      base: config.base_url()?,
      api_key,
      session,
      store: None,
    })
  }

  /// Persist sessions in `store` and restore one from it if present.
  pub fn with_store(mut self, store: SessionStore) -> Self {
    if let Some(saved) = store.load().filter(|s| !s.is_expired()) {
      self.session.set(saved);
    }
    self.store = Some(store);
    self
  }

  fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
    self
      .base
      .join(path)
      .map_err(|e| AuthError::new(AuthErrorKind::Other, format!("invalid auth url: {}", e)))
  }

  async fn error_from(response: Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiAuthError>(&body)
      .ok()
      .and_then(ApiAuthError::message)
      .unwrap_or_else(|| format!("auth request failed with status {}", status.as_u16()));
    AuthError::from_service(message)
  }

  fn transport(err: reqwest::Error) -> AuthError {
    AuthError::new(AuthErrorKind::Other, err.to_string())
  }

  fn remember(&self, session: Session) -> User {
    if let Some(store) = &self.store {
      if let Err(e) = store.save(&session) {
        warn!(error = %e, "failed to persist session");
      }
    }
    let user = session.user.clone();
    self.session.set(session);
    user
  }
}

#[async_trait]
impl AuthProvider for GoTrueAuth {
  fn current_user(&self) -> Option<User> {
    self.session.user()
  }

  async fn sign_in(&self, email: &str, password: &str) -> Result<User, AuthError> {
    let credentials = validate_credentials(email, password)?;
    let url = self.endpoint("auth/v1/token?grant_type=password")?;

    let response = self
      .http
      .post(url)
      .header("apikey", &self.api_key)
      .json(&json!({ "email": credentials.email, "password": credentials.password }))
      .send()
      .await
      .map_err(Self::transport)?;

    if !response.status().is_success() {
      return Err(Self::error_from(response).await);
    }

    let token: ApiTokenResponse = response.json().await.map_err(Self::transport)?;
    let user = self.remember(token.into_session());
    info!(user_id = %user.id, "signed in");
    Ok(user)
  }

  async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
    let credentials = validate_credentials(email, password)?;
    let url = self.endpoint("auth/v1/signup")?;

    let response = self
      .http
      .post(url)
      .header("apikey", &self.api_key)
      .json(&json!({ "email": credentials.email, "password": credentials.password }))
      .send()
      .await
      .map_err(Self::transport)?;

    if !response.status().is_success() {
      return Err(Self::error_from(response).await);
    }

    // With email confirmation enabled the service answers with a bare user
    // and no session.
    let body: serde_json::Value = response.json().await.map_err(Self::transport)?;
    if let Ok(token) = serde_json::from_value::<ApiTokenResponse>(body) {
      self.remember(token.into_session());
    }
    info!(email = %credentials.email, "signed up");
    Ok(())
  }

  async fn sign_out(&self) {
    if let Some(token) = self.session.access_token() {
      if let Ok(url) = self.endpoint("auth/v1/logout") {
        let result = self
          .http
          .post(url)
          .header("apikey", &self.api_key)
          .bearer_auth(token)
          .send()
          .await;
        match result {
          Ok(response) if !response.status().is_success() => warn!(
            status = response.status().as_u16(),
            "logout rejected, clearing local session anyway"
          ),
          Ok(_) => {}
          Err(e) => warn!(error = %e, "logout request failed, clearing local session anyway"),
        }
      }
    }

    self.session.clear();
    if let Some(store) = &self.store {
      if let Err(e) = store.clear() {
        warn!(error = %e, "failed to remove stored session");
      }
    }
    info!("signed out");
  }
}
