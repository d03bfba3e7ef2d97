//! HTTP control surface for the node lifecycle

use crate::{AgentError, Result};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use vnode_core::{Error, NodeLifecycle, Workload};

/// HTTP server exposing a [`NodeLifecycle`] implementation as JSON
#[derive(Clone)]
pub struct HttpServer {
    provider: Arc<dyn NodeLifecycle>,
}

/// Error returned from handlers
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.to_http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        let body = Json(json!({
            "error": self.0.to_string(),
            "category": self.0.category(),
        }));
        (status, body).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Deserialize)]
struct LogQuery {
    tail: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ExecRequest {
    command: Vec<String>,
}

impl HttpServer {
    pub fn new(provider: Arc<dyn NodeLifecycle>) -> Self {
        Self { provider }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(health_check))
            .route(
                "/v1/workloads",
                get(list_workloads).post(create_workload).put(update_workload),
            )
            .route(
                "/v1/workloads/{namespace}/{name}",
                get(get_workload).delete(delete_workload),
            )
            .route("/v1/workloads/{namespace}/{name}/status", get(workload_status))
            .route(
                "/v1/workloads/{namespace}/{name}/logs/{container}",
                get(workload_logs),
            )
            .route(
                "/v1/workloads/{namespace}/{name}/exec/{container}",
                post(exec_in_workload),
            )
            .route("/v1/node/capacity", get(node_capacity))
            .route("/v1/node/conditions", get(node_conditions))
            .route("/v1/node/addresses", get(node_addresses))
            .route("/v1/node/endpoints", get(daemon_endpoints))
            .route("/v1/node/os", get(operating_system))
            .route("/v1/stats/summary", get(stats_summary))
            .layer(TraceLayer::new_for_http())
            .with_state(self.provider.clone())
    }

    /// Serve until the process receives Ctrl+C
    pub async fn serve(&self, addr: SocketAddr) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AgentError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        info!("Starting HTTP server on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| AgentError::Server(format!("HTTP server failed: {}", e)))?;

        info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C signal");
}

type Provider = State<Arc<dyn NodeLifecycle>>;

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn create_workload(
    State(provider): Provider,
    Json(workload): Json<Workload>,
) -> ApiResult<StatusCode> {
    provider.create_workload(workload).await?;
    Ok(StatusCode::CREATED)
}

async fn update_workload(
    State(provider): Provider,
    Json(workload): Json<Workload>,
) -> ApiResult<StatusCode> {
    provider.update_workload(workload).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_workload(
    State(provider): Provider,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let workload = provider.get_workload(&namespace, &name).await?;
    provider.delete_workload(&workload).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_workloads(State(provider): Provider) -> ApiResult<impl IntoResponse> {
    let workloads: Vec<Workload> = provider
        .list_workloads()
        .await?
        .iter()
        .map(|w| w.as_ref().clone())
        .collect();
    Ok(Json(workloads))
}

async fn get_workload(
    State(provider): Provider,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let workload = provider.get_workload(&namespace, &name).await?;
    Ok(Json(workload.as_ref().clone()))
}

async fn workload_status(
    State(provider): Provider,
    Path((namespace, name)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(provider.get_workload_status(&namespace, &name).await?))
}

async fn workload_logs(
    State(provider): Provider,
    Path((namespace, name, container)): Path<(String, String, String)>,
    Query(query): Query<LogQuery>,
) -> ApiResult<String> {
    Ok(provider
        .get_workload_logs(&namespace, &name, &container, query.tail)
        .await?)
}

async fn exec_in_workload(
    State(provider): Provider,
    Path((namespace, name, container)): Path<(String, String, String)>,
    Json(request): Json<ExecRequest>,
) -> ApiResult<StatusCode> {
    provider
        .exec_in_workload(&namespace, &name, &container, &request.command)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn node_capacity(State(provider): Provider) -> impl IntoResponse {
    Json(provider.capacity().await)
}

async fn node_conditions(State(provider): Provider) -> impl IntoResponse {
    Json(provider.node_conditions().await)
}

async fn node_addresses(State(provider): Provider) -> impl IntoResponse {
    Json(provider.node_addresses().await)
}

async fn daemon_endpoints(State(provider): Provider) -> impl IntoResponse {
    Json(provider.daemon_endpoints().await)
}

async fn operating_system(State(provider): Provider) -> impl IntoResponse {
    Json(json!({ "operatingSystem": provider.operating_system() }))
}

async fn stats_summary(State(provider): Provider) -> ApiResult<impl IntoResponse> {
    Ok(Json(provider.stats_summary().await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{NodeProvider, ProviderSettings};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;
    use vnode_core::SettingsSource;
    use vnode_runtime::{ContainerRuntime, RecordingRuntime};

    fn app(runtime: Arc<dyn ContainerRuntime>, work_dir: &std::path::Path) -> Router {
        let settings = ProviderSettings::new("vk-tinc", "10.0.0.1").with_work_dir(work_dir);
        let provider = NodeProvider::new(settings, &SettingsSource::empty(), runtime).unwrap();
        HttpServer::new(Arc::new(provider)).router()
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }

    fn workload_json(name: &str) -> Value {
        json!({
            "metadata": {"namespace": "default", "name": name},
            "spec": {"containers": [{"name": "app", "image": "nginx"}]}
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(Arc::new(RecordingRuntime::new()), dir.path());

        let (status, body) = send(&app, "GET", "/healthz", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_workload_lifecycle_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(Arc::new(RecordingRuntime::new()), dir.path());

        let (status, _) = send(&app, "POST", "/v1/workloads", Some(workload_json("web"))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, "GET", "/v1/workloads/default/web", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["spec"]["containers"][0]["image"], "nginx");

        let (_, body) = send(&app, "GET", "/v1/workloads", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(&app, "GET", "/v1/workloads/default/web/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "Running");
        assert_eq!(body["containerStatuses"][0]["ready"], true);

        let (status, _) = send(&app, "DELETE", "/v1/workloads/default/web", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, "GET", "/v1/workloads/default/web", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["category"], "not_found");
    }

    #[tokio::test]
    async fn test_update_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(Arc::new(RecordingRuntime::new()), dir.path());

        send(&app, "POST", "/v1/workloads", Some(workload_json("web"))).await;
        let mut replacement = workload_json("web");
        replacement["spec"]["containers"][0]["image"] = json!("nginx:1.27");

        let (status, _) = send(&app, "PUT", "/v1/workloads", Some(replacement)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = send(&app, "GET", "/v1/workloads/default/web", None).await;
        assert_eq!(body["spec"]["containers"][0]["image"], "nginx:1.27");
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(RecordingRuntime::new());
        runtime.fail_ensure_running(true).await;
        let app = app(runtime, dir.path());

        let (status, body) = send(&app, "DELETE", "/v1/workloads/default/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["category"], "not_found");

        let (status, body) = send(
            &app,
            "POST",
            "/v1/workloads",
            Some(json!({"metadata": {"namespace": "", "name": "web"}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["category"], "invalid_key");

        let (status, body) = send(&app, "POST", "/v1/workloads", Some(workload_json("web"))).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["category"], "runtime_failure");
    }

    #[tokio::test]
    async fn test_node_endpoints() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(Arc::new(RecordingRuntime::new()), dir.path());

        let (_, body) = send(&app, "GET", "/v1/node/capacity", None).await;
        assert_eq!(body["cpu"], "20");
        assert_eq!(body["memory"], "100Gi");

        let (_, body) = send(&app, "GET", "/v1/node/conditions", None).await;
        assert_eq!(body.as_array().unwrap().len(), 5);
        assert_eq!(body[0]["type"], "Ready");

        let (_, body) = send(&app, "GET", "/v1/node/addresses", None).await;
        assert_eq!(body[0]["type"], "InternalIP");
        assert_eq!(body[0]["address"], "10.0.0.1");

        let (_, body) = send(&app, "GET", "/v1/node/endpoints", None).await;
        assert_eq!(body["kubeletPort"], 655);

        let (_, body) = send(&app, "GET", "/v1/node/os", None).await;
        assert_eq!(body["operatingSystem"], "Linux");

        let (status, _) = send(&app, "GET", "/v1/stats/summary", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_logs_and_exec() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(Arc::new(RecordingRuntime::new()), dir.path());

        let uri = "/v1/workloads/default/web/logs/app?tail=5";
        let (status, body) = send(&app, "GET", uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);

        let (status, _) = send(
            &app,
            "POST",
            "/v1/workloads/default/web/exec/app",
            Some(json!({"command": ["ls", "-l"]})),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
