//! Error taxonomy for the catalog data-access layer.

use thiserror::Error;

/// SQLSTATE reported by the store for a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Local, pre-network rejection of a mutation payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {field}: {reason}")]
pub struct ValidationError {
  pub field: &'static str,
  pub reason: String,
}

impl ValidationError {
  pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
    Self {
      field,
      reason: reason.into(),
    }
  }
}

/// Failure reported by the remote store or the transport in front of it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct RemoteError {
  /// Raw message from the store (or the transport)
  pub message: String,
  /// Store error code, e.g. a SQLSTATE or a `PGRST` code
  pub code: Option<String>,
  /// HTTP status, when the failure came back as a response
  pub status: Option<u16>,
  /// Set when the store rejected the write as a uniqueness violation
  pub duplicate: bool,
}

impl RemoteError {
  /// Build an error from the store's message and code, classifying duplicates.
  pub fn from_store(message: impl Into<String>, code: Option<String>, status: Option<u16>) -> Self {
    let message = message.into();
    let duplicate = code.as_deref() == Some(UNIQUE_VIOLATION) || message.contains("duplicate");
    Self {
      message,
      code,
      status,
      duplicate,
    }
  }

  /// An error raised before any response was received.
  pub fn transport(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      code: None,
      status: None,
      duplicate: false,
    }
  }

  /// Whether retrying the same request could plausibly succeed.
  pub fn is_transient(&self) -> bool {
    match self.status {
      None => self.code.is_none(),
      Some(status) => status == 408 || status == 429 || status >= 500,
    }
  }
}

/// Code carried by a fetch that returned rows which failed to decode.
pub const MALFORMED_ROW: &str = "malformed_row";

impl From<DecodeError> for RemoteError {
  fn from(err: DecodeError) -> Self {
    // A coded error is never transient.
    Self::from_store(err.to_string(), Some(MALFORMED_ROW.to_string()), None)
  }
}

impl From<reqwest::Error> for RemoteError {
  fn from(err: reqwest::Error) -> Self {
    match err.status() {
      Some(status) => Self::from_store(err.to_string(), None, Some(status.as_u16())),
      None => Self::transport(err.to_string()),
    }
  }
}

/// A remote row that does not map onto the typed entity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to decode {resource} row: {reason}")]
pub struct DecodeError {
  pub resource: &'static str,
  pub reason: String,
}

impl DecodeError {
  pub fn new(resource: &'static str, reason: impl Into<String>) -> Self {
    Self {
      resource,
      reason: reason.into(),
    }
  }
}

/// Failure of a create/update/delete operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Remote(#[from] RemoteError),

  #[error(transparent)]
  Decode(#[from] DecodeError),
}

impl OperationError {
  pub fn is_validation(&self) -> bool {
    matches!(self, Self::Validation(_))
  }

  /// The remote error, if this failure came from the store.
  pub fn remote(&self) -> Option<&RemoteError> {
    match self {
      Self::Remote(err) => Some(err),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
  InvalidCredentials,
  AlreadyRegistered,
  InvalidInput,
  Other,
}

/// Sign-in or sign-up failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AuthError {
  pub kind: AuthErrorKind,
  pub message: String,
}

impl AuthError {
  pub fn new(kind: AuthErrorKind, message: impl Into<String>) -> Self {
    Self {
      kind,
      message: message.into(),
    }
  }

  /// Classify a message returned by the auth service.
  pub fn from_service(message: impl Into<String>) -> Self {
    let message = message.into();
    let lower = message.to_lowercase();
    let kind = if lower.contains("invalid login credentials") {
      AuthErrorKind::InvalidCredentials
    } else if lower.contains("already registered") || lower.contains("already been registered") {
      AuthErrorKind::AlreadyRegistered
    } else {
      AuthErrorKind::Other
    };
    Self { kind, message }
  }

  /// Message shown to the user in place of the raw service text.
  pub fn user_message(&self) -> String {
    match self.kind {
      AuthErrorKind::InvalidCredentials => "Credenciales inválidas".to_string(),
      AuthErrorKind::AlreadyRegistered => "Este email ya está registrado".to_string(),
      AuthErrorKind::InvalidInput | AuthErrorKind::Other => self.message.clone(),
    }
  }
}

/// Configuration could not be located, read or parsed.
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("config file not found: {0}")]
  NotFound(String),

  #[error("failed to read config file {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("invalid config value for {field}: {reason}")]
  Invalid { field: &'static str, reason: String },

  #[error("{0}")]
  MissingSecret(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_duplicate_detected_from_code() {
    let err = RemoteError::from_store("conflict", Some("23505".into()), Some(409));
    assert!(err.duplicate);
  }

  #[test]
  fn test_duplicate_detected_from_message() {
    let err = RemoteError::from_store(
      "duplicate key value violates unique constraint \"categorias_nombre_key\"",
      None,
      Some(409),
    );
    assert!(err.duplicate);
  }

  #[test]
  fn test_plain_error_is_not_duplicate() {
    let err = RemoteError::from_store("permission denied", Some("42501".into()), Some(403));
    assert!(!err.duplicate);
    assert!(!err.is_transient());
  }

  #[test]
  fn test_transient_classification() {
    assert!(RemoteError::transport("connection reset").is_transient());
    assert!(RemoteError::from_store("bad gateway", None, Some(502)).is_transient());
    assert!(!RemoteError::from_store("not found", Some("PGRST116".into()), Some(406)).is_transient());
  }

  #[test]
  fn test_decode_failure_is_permanent() {
    let err = RemoteError::from(DecodeError::new("paquetes", "missing field `precio`"));
    assert_eq!(err.code.as_deref(), Some(MALFORMED_ROW));
    assert!(!err.is_transient());
    assert!(err.message.contains("paquetes"));
  }

  #[test]
  fn test_auth_error_remapping() {
    let err = AuthError::from_service("Invalid login credentials");
    assert_eq!(err.kind, AuthErrorKind::InvalidCredentials);
    assert_eq!(err.user_message(), "Credenciales inválidas");

    let err = AuthError::from_service("User already registered");
    assert_eq!(err.kind, AuthErrorKind::AlreadyRegistered);

    let err = AuthError::from_service("rate limited");
    assert_eq!(err.user_message(), "rate limited");
  }
}
