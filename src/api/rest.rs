//! REST API Handlers
//!
//! Exposes the provider lifecycle over JSON: schema retrieval, config
//! validation, planning, the five resource operations, and data source
//! reads. Every lifecycle call is counted in [`ProviderMetrics`].

use super::metrics::{ProviderMetrics, OUTCOME_OK};
use crate::error::{Error, ErrorCategory, Result};
use crate::framework::diagnostics::category_label;
use crate::framework::{Diagnostics, TYPE_PREFIX};
use crate::provider::PowerStoreProvider;
use axum::{
    extract::{Json, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

// =============================================================================
// Request/Response Types
// =============================================================================

/// Body of every lifecycle request; which fields are needed depends on the operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleRequest {
    pub config: Option<Value>,
    pub state: Option<Value>,
    pub id: Option<String>,
}

/// Error body returned for every failed call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: String,
    pub summary: String,
    pub detail: String,
    pub diagnostics: Diagnostics,
}

/// Failed call with its HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ApiErrorResponse,
}

impl ApiError {
    fn from_diagnostics(diagnostics: Diagnostics) -> Self {
        let (summary, detail) = diagnostics
            .iter()
            .next()
            .map(|d| (d.summary.clone(), d.detail.clone()))
            .unwrap_or_default();
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ApiErrorResponse {
                error: ErrorCategory::Validation.to_string(),
                summary,
                detail,
                diagnostics,
            },
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self {
            status: status_for(&err),
            body: ApiErrorResponse {
                error: category_label(&err),
                summary: err.summary(),
                detail: err.detail(),
                diagnostics: Diagnostics::from_error(&err),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// HTTP status for a provider error
pub fn status_for(err: &Error) -> StatusCode {
    if matches!(err, Error::UnknownType { .. }) || err.is_not_found() {
        return StatusCode::NOT_FOUND;
    }
    match err.category() {
        ErrorCategory::Validation => StatusCode::BAD_REQUEST,
        ErrorCategory::Remote | ErrorCategory::Refresh => StatusCode::BAD_GATEWAY,
        ErrorCategory::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    provider: Arc<PowerStoreProvider>,
    metrics: Arc<ProviderMetrics>,
}

impl RestRouter {
    pub fn new(provider: Arc<PowerStoreProvider>, metrics: Arc<ProviderMetrics>) -> Self {
        Self { provider, metrics }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            provider: self.provider,
            metrics: self.metrics,
        };

        Router::new()
            .route("/v1/schema", get(get_schema))
            .route("/v1/resources/:type_name/:operation", post(resource_operation))
            .route("/v1/data-sources/:type_name/read", post(read_data_source))
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(get_metrics))
            .with_state(state)
    }
}

#[derive(Clone)]
struct AppState {
    provider: Arc<PowerStoreProvider>,
    metrics: Arc<ProviderMetrics>,
}

impl AppState {
    /// Run one lifecycle call and record its outcome
    async fn instrumented<T, F>(&self, type_name: &str, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = call.await;
        let outcome = match &result {
            Ok(_) => OUTCOME_OK.to_string(),
            Err(err) => {
                warn!("{} {} failed: {}", operation, type_name, err.detail());
                category_label(err)
            }
        };
        let kind = format!("{}{}", TYPE_PREFIX, type_name.trim_start_matches(TYPE_PREFIX));
        self.metrics
            .observe(&kind, operation, &outcome, started.elapsed());
        result
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T> {
    value.ok_or_else(|| {
        Error::validation(
            "Invalid Request",
            format!("request body must contain \"{}\"", field),
        )
    })
}

// =============================================================================
// Handlers
// =============================================================================

async fn get_schema(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(state.provider.schema()?))
}

async fn resource_operation(
    State(state): State<AppState>,
    Path((type_name, operation)): Path<(String, String)>,
    Json(request): Json<LifecycleRequest>,
) -> ApiResult<Response> {
    let handler = state.provider.resource(&type_name)?;
    if let Some(config) = &request.config {
        debug!(
            "{} {} config={}",
            operation,
            type_name,
            state.provider.redacted(&type_name, config)
        );
    }

    // Every schema finding is reported, not only the first
    if matches!(operation.as_str(), "plan" | "create" | "update") {
        if let Some(config) = &request.config {
            let diagnostics = handler.validate(config);
            if diagnostics.has_errors() {
                state.metrics.observe(
                    &format!("{}{}", TYPE_PREFIX, handler.type_name()),
                    &operation,
                    &ErrorCategory::Validation.to_string(),
                    std::time::Duration::ZERO,
                );
                return Err(ApiError::from_diagnostics(diagnostics));
            }
        }
    }

    let response = match operation.as_str() {
        "validate" => {
            let config = required(request.config, "config")?;
            let diagnostics = handler.validate(&config);
            Json(json!({
                "valid": !diagnostics.has_errors(),
                "diagnostics": diagnostics,
            }))
            .into_response()
        }
        "plan" => {
            let config = required(request.config, "config")?;
            let planned = state
                .instrumented(&type_name, "plan", async {
                    handler.plan(&config, request.state.as_ref())
                })
                .await?;
            Json(planned).into_response()
        }
        "create" => {
            let config = required(request.config, "config")?;
            let created = state
                .instrumented(&type_name, "create", handler.create(&config))
                .await?;
            (StatusCode::CREATED, Json(created)).into_response()
        }
        "read" => {
            let current = required(request.state, "state")?;
            let refreshed = state
                .instrumented(&type_name, "read", handler.read(&current))
                .await?;
            Json(refreshed).into_response()
        }
        "update" => {
            let config = required(request.config, "config")?;
            let current = required(request.state, "state")?;
            let updated = state
                .instrumented(&type_name, "update", handler.update(&config, &current))
                .await?;
            Json(updated).into_response()
        }
        "delete" => {
            let current = required(request.state, "state")?;
            state
                .instrumented(&type_name, "delete", handler.delete(&current))
                .await?;
            StatusCode::NO_CONTENT.into_response()
        }
        "import" => {
            let id = required(request.id, "id")?;
            let imported = state
                .instrumented(&type_name, "import", handler.import(&id))
                .await?;
            Json(imported).into_response()
        }
        other => {
            return Err(Error::UnknownType {
                kind: "operation".into(),
                name: other.to_string(),
            }
            .into())
        }
    };
    Ok(response)
}

async fn read_data_source(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Json(request): Json<LifecycleRequest>,
) -> ApiResult<Json<Value>> {
    let handler = state.provider.data_source(&type_name)?;
    let config = required(request.config, "config")?;

    let diagnostics = handler.validate(&config);
    if diagnostics.has_errors() {
        return Err(ApiError::from_diagnostics(diagnostics));
    }

    let result = state
        .instrumented(&type_name, "read-data", handler.read(&config))
        .await?;
    Ok(Json(result))
}

async fn get_metrics(State(state): State<AppState>) -> ApiResult<Response> {
    let (content_type, body) = state.metrics.render()?;
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness check
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.provider.check_connection().await {
        Ok(()) => (StatusCode::OK, "ready".to_string()),
        Err(e) => {
            error!("PowerStore array is unreachable: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, format!("array unreachable: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<ProviderMetrics>) {
        let metrics = Arc::new(ProviderMetrics::new().unwrap());
        let provider = Arc::new(PowerStoreProvider::simulated());
        (RestRouter::new(provider, metrics.clone()).build(), metrics)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&Error::validation("Invalid", "bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::operation_msg("Error creating host", "boom")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&Error::Refresh {
                summary: "Error getting host after creation".into(),
                detail: "gone".into()
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&Error::NotFound {
                kind: "host".into(),
                id: "h1".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&Error::UnknownType {
                kind: "resource".into(),
                name: "powerstore_lun".into()
            }),
            StatusCode::NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_host_lifecycle_over_http() {
        let (app, metrics) = app();
        let config = json!({
            "name": "esx-01",
            "os_type": "ESXi",
            "initiators": [{"port_name": "iqn.1998-01.com.vmware:esx-01"}]
        });

        let (status, created) = call(
            &app,
            "POST",
            "/v1/resources/powerstore_host/create",
            json!({ "config": config }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["id"].as_str().unwrap().to_string();

        let (status, read) = call(
            &app,
            "POST",
            "/v1/resources/host/read",
            json!({ "state": created }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(read["name"], "esx-01");

        let (status, imported) = call(
            &app,
            "POST",
            "/v1/resources/powerstore_host/import",
            json!({ "id": id }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(imported["id"], id.as_str());

        let (status, _) = call(
            &app,
            "POST",
            "/v1/resources/powerstore_host/delete",
            json!({ "state": read }),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = call(
            &app,
            "POST",
            "/v1/resources/powerstore_host/read",
            json!({ "state": read }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");

        assert_eq!(metrics.count("powerstore_host", "create", OUTCOME_OK), 1);
        assert_eq!(metrics.count("powerstore_host", "read", "not_found"), 1);
    }

    #[tokio::test]
    async fn test_validation_errors_carry_diagnostics() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            "POST",
            "/v1/resources/powerstore_hostgroup/create",
            json!({ "config": { "description": "no name", "bogus": 1 } }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation");
        assert!(body["diagnostics"].as_array().unwrap().len() >= 2);

        let (status, body) = call(
            &app,
            "POST",
            "/v1/resources/powerstore_hostgroup/validate",
            json!({ "config": { "name": "hg" } }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["valid"], true);
    }

    #[tokio::test]
    async fn test_unknown_type_and_operation() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            "POST",
            "/v1/resources/powerstore_lun/read",
            json!({ "state": {} }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "internal");

        let (status, _) = call(
            &app,
            "POST",
            "/v1/resources/powerstore_host/rename",
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &app,
            "POST",
            "/v1/resources/powerstore_host/read",
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["summary"], "Invalid Request");
    }

    #[tokio::test]
    async fn test_data_source_read() {
        let (app, _) = app();
        let (status, body) = call(
            &app,
            "POST",
            "/v1/data-sources/powerstore_nas_server/read",
            json!({ "config": { "id": "nas-1" } }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nas_servers"][0]["id"], "nas-1");
    }

    #[tokio::test]
    async fn test_schema_health_and_metrics() {
        let (app, _) = app();
        let (status, body) = call(&app, "GET", "/v1/schema", Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["resource_schemas"]["powerstore_volume"].is_object());

        let request = Request::builder().uri("/ready").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
