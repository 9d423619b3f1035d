//! PowerStore REST transport
//!
//! Talks to `https://<array>/api/rest`. A session is opened with basic auth
//! against `login_session`; the returned `DELL-EMC-TOKEN` header and session
//! cookie are replayed on every request.

use crate::config::ProviderConfig;
use crate::domain::ports::{Collection, ListQuery, PowerStoreApi};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, CONTENT_RANGE};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

const TOKEN_HEADER: &str = "DELL-EMC-TOKEN";
const PAGE_SIZE: u64 = 1000;

// =============================================================================
// Error Body
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    messages: Vec<ErrorMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorMessage {
    code: String,
    severity: String,
    message_l10n: String,
    arguments: Vec<String>,
}

// =============================================================================
// Pagination
// =============================================================================

/// Parsed `Content-Range: <first>-<last>/<total>` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub first: u64,
    pub last: u64,
    pub total: u64,
}

impl PageRange {
    /// Offset of the next page, if any
    pub fn next_offset(&self) -> Option<u64> {
        let next = self.last + 1;
        (next < self.total).then_some(next)
    }
}

/// Parse a `Content-Range` header value
pub fn parse_content_range(header: &str) -> Result<PageRange> {
    let invalid = || {
        Error::Pagination(format!(
            "{}, expected format: <first>-<last>/<total>",
            header
        ))
    };

    let (range, total) = header.split_once('/').ok_or_else(invalid)?;
    let (first, last) = range.split_once('-').ok_or_else(invalid)?;

    let parse = |s: &str| s.trim().parse::<u64>().map_err(|_| invalid());
    Ok(PageRange {
        first: parse(first)?,
        last: parse(last)?,
        total: parse(total)?,
    })
}

// =============================================================================
// REST Client
// =============================================================================

/// HTTPS transport to a PowerStore array
pub struct RestClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
}

impl RestClient {
    /// Build a client; no request is sent until [`RestClient::login`]
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .danger_accept_invalid_certs(config.insecure)
            .timeout(Duration::from_secs(config.timeout_secs()))
            .build()?;

        Ok(Self {
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            http,
            token: RwLock::new(None),
        })
    }

    /// Build a client and open a session
    pub async fn connect(config: &ProviderConfig) -> Result<Self> {
        let client = Self::new(config)?;
        client.login().await?;
        Ok(client)
    }

    /// Open a session and keep its token
    pub async fn login(&self) -> Result<()> {
        let url = format!("{}/login_session", self.base_url);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let err = decode_error(response, "login_session").await;
            warn!("Login to {} failed with status {}", self.base_url, status);
            return Err(Error::Authentication(err.to_string()));
        }

        let token = response
            .headers()
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *self.token.write() = token;

        info!("Opened PowerStore session on {}", self.base_url);
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.http.request(method, self.url(path));
        if let Some(token) = self.token.read().as_deref() {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder
    }

    /// Send a request; an expired session is reopened once and the request replayed
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Response> {
        debug!("{} {}", method, path);

        let build = || {
            let mut builder = self.request(method.clone(), path).query(query);
            if let Some(body) = body {
                builder = builder.json(body);
            }
            builder
        };

        let response = build().send().await?;
        if matches!(
            response.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            debug!("Session rejected on {} {}, logging in again", method, path);
            self.login().await?;
            return Ok(build().send().await?);
        }
        Ok(response)
    }

    /// Fail on non-2xx responses, decoding the array's message list
    async fn check(response: Response, kind: &str, id: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound {
                kind: kind.to_string(),
                id: id.to_string(),
            });
        }
        Err(decode_error(response, kind).await)
    }

    async fn json_body(response: Response) -> Result<Value> {
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Turn an error response into [`Error::Api`]
async fn decode_error(response: Response, context: &str) -> Error {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();

    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) if !body.messages.is_empty() => {
            let first = &body.messages[0];
            debug!(
                "{} failed: code={} severity={} arguments={:?}",
                context, first.code, first.severity, first.arguments
            );
            first.message_l10n.clone()
        }
        _ if text.is_empty() => format!("{} request failed", context),
        _ => text,
    };

    Error::Api { status, message }
}

fn page_range(headers: &HeaderMap) -> Result<Option<PageRange>> {
    match headers.get(CONTENT_RANGE).and_then(|v| v.to_str().ok()) {
        Some(value) if !value.is_empty() => parse_content_range(value).map(Some),
        _ => Ok(None),
    }
}

#[async_trait]
impl PowerStoreApi for RestClient {
    async fn create(&self, collection: Collection, body: Value) -> Result<String> {
        let response = self
            .send(Method::POST, collection.path(), &[], Some(&body))
            .await?;
        let response = Self::check(response, collection.path(), "").await?;
        let created: crate::client::CreateResponse =
            serde_json::from_value(Self::json_body(response).await?)?;
        Ok(created.id)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Value> {
        let path = format!("{}/{}", collection.path(), id);
        let query = [("select".to_string(), collection.select().to_string())];
        let response = self.send(Method::GET, &path, &query, None).await?;
        let response = Self::check(response, collection.path(), id).await?;
        Self::json_body(response).await
    }

    async fn list(&self, collection: Collection, query: &ListQuery) -> Result<Vec<Value>> {
        let mut items = Vec::new();
        let mut offset = 0;

        loop {
            let mut params = vec![
                ("select".to_string(), collection.select().to_string()),
                ("limit".to_string(), PAGE_SIZE.to_string()),
                ("offset".to_string(), offset.to_string()),
            ];
            params.extend(query.params.iter().cloned());

            let response = self
                .send(Method::GET, collection.path(), &params, None)
                .await?;
            let response = Self::check(response, collection.path(), "").await?;

            let paginated = response.status() == StatusCode::PARTIAL_CONTENT;
            let range = if paginated {
                page_range(response.headers())?
            } else {
                None
            };

            match Self::json_body(response).await? {
                Value::Array(page) => items.extend(page),
                Value::Null => {}
                other => items.push(other),
            }

            match range.and_then(|r| r.next_offset()) {
                Some(next) if next > offset => offset = next,
                Some(next) => {
                    warn!(
                        "{} returned a page range that does not advance (offset {}, next {})",
                        collection, offset, next
                    );
                    break;
                }
                None => break,
            }
        }

        debug!("Listed {} entries from {}", items.len(), collection);
        Ok(items)
    }

    async fn modify(&self, collection: Collection, id: &str, body: Value) -> Result<()> {
        let path = format!("{}/{}", collection.path(), id);
        let response = self.send(Method::PATCH, &path, &[], Some(&body)).await?;
        Self::check(response, collection.path(), id).await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &str, body: Option<Value>) -> Result<()> {
        let path = format!("{}/{}", collection.path(), id);
        let response = self.send(Method::DELETE, &path, &[], body.as_ref()).await?;
        Self::check(response, collection.path(), id).await?;
        Ok(())
    }

    async fn action(
        &self,
        collection: Collection,
        id: &str,
        action: &str,
        body: Value,
    ) -> Result<Value> {
        let path = format!("{}/{}/{}", collection.path(), id, action);
        let response = self.send(Method::POST, &path, &[], Some(&body)).await?;
        let response = Self::check(response, collection.path(), id).await?;
        Self::json_body(response).await
    }

    fn backend_name(&self) -> &str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, Query};
    use axum::http::{HeaderMap as AxumHeaders, StatusCode as AxumStatus};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    fn authorized(headers: &AxumHeaders) -> bool {
        headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v == "token-1")
            .unwrap_or(false)
    }

    async fn login() -> impl IntoResponse {
        ([(TOKEN_HEADER, "token-1")], Json(json!([{"id": "session"}])))
    }

    async fn list_fs(
        headers: AxumHeaders,
        Query(params): Query<HashMap<String, String>>,
    ) -> axum::response::Response {
        if !authorized(&headers) {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        let offset: u64 = params.get("offset").and_then(|o| o.parse().ok()).unwrap_or(0);
        assert_eq!(params.get("limit").map(String::as_str), Some("1000"));
        assert!(params.contains_key("select"));

        // two pages of two, total of three
        let (body, range) = if offset == 0 {
            (json!([{"id": "fs-0"}, {"id": "fs-1"}]), "0-1/3")
        } else {
            (json!([{"id": "fs-2"}]), "2-2/3")
        };
        (
            AxumStatus::PARTIAL_CONTENT,
            [("content-range", range)],
            Json(body),
        )
            .into_response()
    }

    async fn create_fs(headers: AxumHeaders, Json(body): Json<Value>) -> axum::response::Response {
        if !authorized(&headers) {
            return AxumStatus::UNAUTHORIZED.into_response();
        }
        if body["name"] == "taken" {
            return (
                AxumStatus::UNPROCESSABLE_ENTITY,
                Json(json!({"messages": [{
                    "code": "0xE0A07001000C",
                    "severity": "Error",
                    "message_l10n": "The name taken is already in use.",
                    "arguments": ["taken"]
                }, {
                    "code": "0xE0A07001000D",
                    "severity": "Error",
                    "message_l10n": "Operation aborted.",
                    "arguments": []
                }]})),
            )
                .into_response();
        }
        (AxumStatus::CREATED, Json(json!({"id": "fs-new"}))).into_response()
    }

    async fn list_volumes() -> axum::response::Response {
        // every page claims to be the first one
        (
            AxumStatus::PARTIAL_CONTENT,
            [("content-range", "0-0/5")],
            Json(json!([{"id": "vol-0"}])),
        )
            .into_response()
    }

    async fn get_fs(Path(id): Path<String>) -> axum::response::Response {
        if id == "missing" {
            return (
                AxumStatus::NOT_FOUND,
                Json(json!({"messages": [{"message_l10n": "not found"}]})),
            )
                .into_response();
        }
        Json(json!({"id": id, "name": "fs", "size_total": 1024})).into_response()
    }

    async fn spawn_mock_array() -> String {
        let app = Router::new()
            .route("/api/rest/login_session", get(login))
            .route("/api/rest/file_system", get(list_fs).post(create_fs))
            .route("/api/rest/file_system/:id", get(get_fs))
            .route("/api/rest/volume", get(list_volumes));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/rest", addr)
    }

    fn config(endpoint: String) -> ProviderConfig {
        ProviderConfig {
            endpoint,
            username: "admin".into(),
            password: "secret".into(),
            insecure: true,
            timeout: 10,
        }
    }

    #[test]
    fn test_parse_content_range() {
        let range = parse_content_range("0-999/2500").unwrap();
        assert_eq!(
            range,
            PageRange {
                first: 0,
                last: 999,
                total: 2500
            }
        );
        assert_eq!(range.next_offset(), Some(1000));
        assert_eq!(parse_content_range("2000-2499/2500").unwrap().next_offset(), None);

        assert!(parse_content_range("0-999").is_err());
        assert!(parse_content_range("a-b/c").is_err());
    }

    #[tokio::test]
    async fn test_list_follows_pagination() {
        let client = RestClient::connect(&config(spawn_mock_array().await))
            .await
            .unwrap();

        let items = client
            .list(Collection::FileSystem, &ListQuery::new())
            .await
            .unwrap();
        let ids: Vec<_> = items.iter().map(|v| v["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["fs-0", "fs-1", "fs-2"]);
    }

    #[tokio::test]
    async fn test_list_stops_when_range_does_not_advance() {
        let client = RestClient::connect(&config(spawn_mock_array().await))
            .await
            .unwrap();

        let items = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.list(Collection::Volume, &ListQuery::new()),
        )
        .await
        .unwrap()
        .unwrap();
        // offset 0 moves to 1, the repeated range at offset 1 ends the loop
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_create_get_and_errors() {
        let client = RestClient::connect(&config(spawn_mock_array().await))
            .await
            .unwrap();

        let id = client
            .create(Collection::FileSystem, json!({"name": "fs"}))
            .await
            .unwrap();
        assert_eq!(id, "fs-new");

        let fs = client.get(Collection::FileSystem, "fs-new").await.unwrap();
        assert_eq!(fs["size_total"], 1024);

        let err = client
            .create(Collection::FileSystem, json!({"name": "taken"}))
            .await
            .unwrap_err();
        match err {
            Error::Api { status, message } => {
                assert_eq!(status, 422);
                assert_eq!(message, "The name taken is already in use.");
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let missing = client.get(Collection::FileSystem, "missing").await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_relogin_when_session_missing() {
        let client = RestClient::new(&config(spawn_mock_array().await)).unwrap();

        // no login yet, the first call is rejected and replayed after login
        let id = client
            .create(Collection::FileSystem, json!({"name": "fs"}))
            .await
            .unwrap();
        assert_eq!(id, "fs-new");
    }
}
