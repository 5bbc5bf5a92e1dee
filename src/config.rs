use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;
use crate::remote::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Project URL, e.g. `https://abcd.supabase.co`
  pub url: String,
  /// Per-request timeout; unset means wait indefinitely
  #[serde(default)]
  pub timeout_secs: Option<u64>,
}

impl RemoteConfig {
  /// Project URL with a trailing slash so relative endpoints join under it.
  pub fn base_url(&self) -> Result<Url, ConfigError> {
    let mut raw = self.url.trim().to_string();
    if !raw.ends_with('/') {
      raw.push('/');
    }

    let url = Url::parse(&raw).map_err(|e| ConfigError::Invalid {
      field: "remote.url",
      reason: format!("invalid URL format: {}", e),
    })?;

    match url.scheme() {
      "http" | "https" => Ok(url),
      scheme => Err(ConfigError::Invalid {
        field: "remote.url",
        reason: format!("unsupported URL scheme: {}", scheme),
      }),
    }
  }

  /// HTTP client honouring `timeout_secs`, shared by the table and auth APIs.
  pub fn http_client(&self) -> Result<reqwest::Client, ConfigError> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = self.timeout_secs {
      builder = builder.timeout(std::time::Duration::from_secs(secs));
    }
    builder.build().map_err(|e| ConfigError::Invalid {
      field: "remote",
      reason: format!("failed to build HTTP client: {}", e),
    })
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Age after which a cached list is refetched on the next read
  pub stale_time_secs: u64,
  /// Also invalidate cached package lists when a category changes
  pub cascade_category_changes: bool,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_time_secs: 300,
      cascade_category_changes: false,
    }
  }
}

impl CacheConfig {
  pub fn stale_time(&self) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(self.stale_time_secs).unwrap_or(i64::MAX))
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./labcat.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/labcat/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(ConfigError::NotFound(p.display().to_string()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(ConfigError::NotFound(
        "no labcat.yaml in the current directory or ~/.config/labcat/config.yaml".to_string(),
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("labcat.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("labcat").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
      path: path.display().to_string(),
      source,
    })?;

    let config: Config = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
      path: path.display().to_string(),
      source,
    })?;
    config.remote.base_url()?;

    Ok(config)
  }

  /// Get the project API key from environment variables.
  ///
  /// Checks LABCAT_API_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_api_key() -> Result<String, ConfigError> {
    std::env::var("LABCAT_API_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        ConfigError::MissingSecret(
          "API key not found. Set LABCAT_API_KEY or SUPABASE_ANON_KEY environment variable."
            .to_string(),
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labcat.yaml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
  }

  #[test]
  fn test_minimal_config_uses_defaults() {
    let (_dir, path) = write("remote:\n  url: https://abcd.supabase.co\n");
    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.cache.stale_time_secs, 300);
    assert!(!config.cache.cascade_category_changes);
    assert_eq!(config.retry, RetryPolicy::default());
    assert_eq!(config.remote.timeout_secs, None);
    assert_eq!(
      config.remote.base_url().unwrap().as_str(),
      "https://abcd.supabase.co/"
    );
  }

  #[test]
  fn test_full_config() {
    let (_dir, path) = write(
      r#"
remote:
  url: http://localhost:54321
  timeout_secs: 10
cache:
  stale_time_secs: 60
  cascade_category_changes: true
retry:
  max_attempts: 3
  initial_backoff_ms: 100
"#,
    );
    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.remote.timeout_secs, Some(10));
    assert_eq!(config.cache.stale_time(), chrono::Duration::seconds(60));
    assert!(config.cache.cascade_category_changes);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.retry.initial_backoff_ms, 100);
    assert_eq!(config.retry.max_backoff_ms, 5_000);
  }

  #[test]
  fn test_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/definitely/not/here.yaml"))).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
  }

  #[test]
  fn test_bad_scheme_rejected() {
    let (_dir, path) = write("remote:\n  url: ftp://example.com\n");
    let err = Config::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "remote.url", .. }));
  }

  #[test]
  fn test_parse_error() {
    let (_dir, path) = write("remote: [unterminated");
    assert!(matches!(
      Config::load(Some(&path)).unwrap_err(),
      ConfigError::Parse { .. }
    ));
  }
}
