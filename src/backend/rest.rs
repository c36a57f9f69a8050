use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{FunctionInvoker, ObjectStore, PrincipalSource, RemoteCollection, RemoteError};
use crate::config::Config;
use crate::sync::{Entity, EntityId, ListQuery, OrderBy, Principal, PrincipalId};

/// Client for the hosted backend (tables, storage, functions, auth).
#[derive(Clone)]
pub struct RestBackend {
  http: reqwest::Client,
  base: Url,
  anon_key: String,
  access_token: Option<String>,
}

/// Subset of the auth user payload we care about.
#[derive(Debug, Deserialize)]
struct ApiUser {
  id: String,
  email: Option<String>,
  #[serde(default)]
  user_metadata: ApiUserMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUserMetadata {
  full_name: Option<String>,
}

impl RestBackend {
  pub fn new(config: &Config) -> Result<Self> {
    let anon_key = config.anon_key()?;
    let access_token = Config::get_access_token().ok();

    let base = normalize_base(&config.backend.url)
      .map_err(|e| eyre!("Invalid backend url {}: {}", config.backend.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.backend.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      anon_key,
      access_token,
    })
  }

  fn endpoint(&self, path: &str) -> Result<Url, RemoteError> {
    Ok(self.base.join(path)?)
  }

  fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
    req.header("apikey", &self.anon_key).bearer_auth(bearer)
  }

  fn table_request(
    &self,
    method: reqwest::Method,
    table: &str,
  ) -> Result<reqwest::RequestBuilder, RemoteError> {
    let url = self.endpoint(&format!("rest/v1/{}", table))?;
    Ok(self.authorized(self.http.request(method, url)))
  }
}

#[async_trait]
impl<E: Entity> RemoteCollection<E> for RestBackend {
  async fn list(&self, query: &ListQuery) -> Result<Vec<E>, RemoteError> {
    let table = E::kind().table();
    debug!(table, ?query, "listing records");

    let resp = self
      .table_request(reqwest::Method::GET, table)?
      .query(&list_params(query))
      .send()
      .await?;

    read_json(resp).await
  }

  async fn insert(&self, record: Value) -> Result<E, RemoteError> {
    let table = E::kind().table();

    let resp = self
      .table_request(reqwest::Method::POST, table)?
      .header("Prefer", "return=representation")
      .json(&record)
      .send()
      .await?;

    let mut rows: Vec<E> = read_json(resp).await?;
    if rows.is_empty() {
      return Err(RemoteError::EmptyResponse);
    }
    Ok(rows.swap_remove(0))
  }

  async fn update(&self, id: &EntityId, patch: Value) -> Result<E, RemoteError> {
    let table = E::kind().table();

    let resp = self
      .table_request(reqwest::Method::PATCH, table)?
      .query(&[("id", format!("eq.{}", id))])
      .header("Prefer", "return=representation")
      .json(&patch)
      .send()
      .await?;

    let mut rows: Vec<E> = read_json(resp).await?;
    if rows.is_empty() {
      // PostgREST answers an update that matched nothing with an empty array
      return Err(RemoteError::NotFound {
        table,
        id: id.to_string(),
      });
    }
    Ok(rows.swap_remove(0))
  }

  async fn delete(&self, id: &EntityId) -> Result<(), RemoteError> {
    let resp = self
      .table_request(reqwest::Method::DELETE, E::kind().table())?
      .query(&[("id", format!("eq.{}", id))])
      .send()
      .await?;

    check_status(resp).await
  }
}

#[async_trait]
impl ObjectStore for RestBackend {
  async fn upload(
    &self,
    bucket: &str,
    path: &str,
    bytes: Vec<u8>,
    content_type: &str,
  ) -> Result<(), RemoteError> {
    let url = self.endpoint(&format!("storage/v1/object/{}/{}", bucket, path))?;
    let content_type = HeaderValue::from_str(content_type)
      .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    let resp = self
      .authorized(self.http.post(url))
      .header("x-upsert", "true")
      .header(CONTENT_TYPE, content_type)
      .body(bytes)
      .send()
      .await?;

    check_status(resp).await
  }

  fn public_url(&self, bucket: &str, path: &str) -> Result<Url, RemoteError> {
    self.endpoint(&format!("storage/v1/object/public/{}/{}", bucket, path))
  }
}

#[async_trait]
impl FunctionInvoker for RestBackend {
  async fn invoke(&self, name: &str, body: Value) -> Result<Value, RemoteError> {
    let url = self.endpoint(&format!("functions/v1/{}", name))?;
    let resp = self.authorized(self.http.post(url)).json(&body).send().await?;
    read_json(resp).await
  }
}

#[async_trait]
impl PrincipalSource for RestBackend {
  async fn current_principal(&self) -> Result<Option<Principal>, RemoteError> {
    if self.access_token.is_none() {
      return Ok(None);
    }

    let url = self.endpoint("auth/v1/user")?;
    let resp = self.authorized(self.http.get(url)).send().await?;

    // An expired or revoked token just means nobody is signed in
    if matches!(resp.status().as_u16(), 401 | 403) {
      return Ok(None);
    }

    let user: ApiUser = read_json(resp).await?;
    Ok(Some(Principal {
      id: PrincipalId::new(user.id),
      email: user.email,
      display_name: user.user_metadata.full_name,
    }))
  }
}

/// Parse the configured base url so that relative joins append to its path.
fn normalize_base(raw: &str) -> Result<Url, url::ParseError> {
  let mut url = Url::parse(raw)?;
  if !url.path().ends_with('/') {
    let path = format!("{}/", url.path());
    url.set_path(&path);
  }
  Ok(url)
}

/// Query string for a PostgREST list request.
fn list_params(query: &ListQuery) -> Vec<(String, String)> {
  let mut params = vec![("select".to_string(), "*".to_string())];
  for filter in &query.filters {
    params.push((filter.column.clone(), format!("eq.{}", filter.value)));
  }
  params.push(("order".to_string(), order_param(&query.order)));
  params
}

fn order_param(order: &OrderBy) -> String {
  let direction = if order.ascending { "asc" } else { "desc" };
  format!("{}.{}.nullslast", order.column, direction)
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, RemoteError> {
  let status = resp.status();
  let bytes = resp.bytes().await?;

  if !status.is_success() {
    return Err(RemoteError::Status {
      status: status.as_u16(),
      body: String::from_utf8_lossy(&bytes).into_owned(),
    });
  }

  Ok(serde_json::from_slice(&bytes)?)
}

async fn check_status(resp: reqwest::Response) -> Result<(), RemoteError> {
  let status = resp.status();
  if status.is_success() {
    return Ok(());
  }

  let body = resp.text().await.unwrap_or_default();
  Err(RemoteError::Status {
    status: status.as_u16(),
    body,
  })
}
