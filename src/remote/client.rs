//! HTTP/JSON adapter for a PostgREST-style table API.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{no_rows, Projection, RemoteClient, Row, SelectQuery};
use crate::auth::SessionHandle;
use crate::config::RemoteConfig;
use crate::error::{ConfigError, RemoteError};

/// Error body returned by the table API.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  code: Option<String>,
  #[serde(default)]
  details: Option<String>,
  #[serde(default)]
  hint: Option<String>,
}

impl ApiErrorBody {
  fn into_remote_error(self, status: u16) -> RemoteError {
    let mut message = self
      .message
      .unwrap_or_else(|| format!("request failed with status {}", status));
    if let Some(details) = self.details.filter(|d| !d.is_empty()) {
      message = format!("{} ({})", message, details);
    }
    if let Some(hint) = self.hint.filter(|h| !h.is_empty()) {
      debug!(%hint, "store returned a hint");
    }
    RemoteError::from_store(message, self.code, Some(status))
  }
}

/// Table API client.
///
/// Requests carry the project API key and, once signed in, the session's
/// access token (falling back to the API key for anonymous access).
#[derive(Clone)]
pub struct RestClient {
  http: reqwest::Client,
  base: Url,
  api_key: String,
  session: SessionHandle,
}

impl RestClient {
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
    })
  }

  fn table_url(&self, resource: &str) -> Result<Url, RemoteError> {
    self
      .base
      .join(&format!("rest/v1/{}", resource))
      .map_err(|e| RemoteError::transport(format!("invalid resource url for {}: {}", resource, e)))
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let token = self
      .session
      .access_token()
      .unwrap_or_else(|| self.api_key.clone());

    self
      .http
      .request(method, url)
      .header("apikey", &self.api_key)
      .bearer_auth(token)
  }

  /// Decode a response into rows, or into the store's error.
  async fn rows(response: Response) -> Result<Vec<Row>, RemoteError> {
    let status = response.status();
    if !status.is_success() {
      let code = status.as_u16();
      let body = response.text().await.unwrap_or_default();
      return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(parsed) => parsed.into_remote_error(code),
        Err(_) => RemoteError::from_store(
          if body.is_empty() {
            format!("request failed with status {}", code)
          } else {
            body
          },
          None,
          Some(code),
        ),
      });
    }

    let value: Value = response.json().await?;
    match value {
      Value::Array(items) => items
        .into_iter()
        .map(|item| match item {
          Value::Object(row) => Ok(row),
          other => Err(RemoteError::transport(format!(
            "expected a row object, got {}",
            other
          ))),
        })
        .collect(),
      Value::Object(row) => Ok(vec![row]),
      Value::Null => Ok(Vec::new()),
      other => Err(RemoteError::transport(format!(
        "expected an array of rows, got {}",
        other
      ))),
    }
  }

  fn single(rows: Vec<Row>, resource: &str, id: &str) -> Result<Row, RemoteError> {
    rows.into_iter().next().ok_or_else(|| no_rows(resource, id))
  }
}

#[async_trait]
impl RemoteClient for RestClient {
  async fn select(&self, resource: &str, query: &SelectQuery) -> Result<Vec<Row>, RemoteError> {
    let mut url = self.table_url(resource)?;
    url
      .query_pairs_mut()
      .append_pair("select", &query.projection.to_select_param())
      .append_pair("order", &query.to_order_param());

    debug!(resource, %url, "select");
    let response = self.request(Method::GET, url).send().await?;
    Self::rows(response).await
  }

  async fn insert(
    &self,
    resource: &str,
    row: Row,
    returning: &Projection,
  ) -> Result<Row, RemoteError> {
    let mut url = self.table_url(resource)?;
    url
      .query_pairs_mut()
      .append_pair("select", &returning.to_select_param());

    debug!(resource, "insert");
    let response = self
      .request(Method::POST, url)
      .header("Prefer", "return=representation")
      .json(&Value::Array(vec![Value::Object(row)]))
      .send()
      .await?;

    Self::single(Self::rows(response).await?, resource, "(new)")
  }

  async fn update(
    &self,
    resource: &str,
    id: &str,
    row: Row,
    returning: &Projection,
  ) -> Result<Row, RemoteError> {
    let mut url = self.table_url(resource)?;
    url
      .query_pairs_mut()
      .append_pair("id", &format!("eq.{}", id))
      .append_pair("select", &returning.to_select_param());

    debug!(resource, id, "update");
    let response = self
      .request(Method::PATCH, url)
      .header("Prefer", "return=representation")
      .json(&Value::Object(row))
      .send()
      .await?;

    Self::single(Self::rows(response).await?, resource, id)
  }

  async fn delete(&self, resource: &str, id: &str) -> Result<(), RemoteError> {
    let mut url = self.table_url(resource)?;
    url
      .query_pairs_mut()
      .append_pair("id", &format!("eq.{}", id))
      .append_pair("select", "id");

    debug!(resource, id, "delete");
    let response = self
      .request(Method::DELETE, url)
      .header("Prefer", "return=representation")
      .send()
      .await?;

    Self::single(Self::rows(response).await?, resource, id).map(|_| ())
  }
}
