//! REST API server for the query router
//!
//! Exposes analyze / list tools / suggest over HTTP for the dashboard UI

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::agent::Orchestrator;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalyzeRequest {
    pub query: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SuggestRequest {
    #[serde(default)]
    pub seed: String,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Failure that still carries a payload (error-tagged analysis results)
    pub fn failure<T: Serialize>(data: T, message: String) -> Self {
        Self {
            success: false,
            data: serde_json::to_value(data).ok(),
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "tools_discovered": state.orchestrator.registry().is_populated(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Analyze Endpoint
/// =============================

async fn analyze(
    State(state): State<ApiState>,
    Json(req): Json<AnalyzeRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(query = %req.query, "Received analyze request");

    let result = state.orchestrator.analyze(&req.query).await;

    match &result.error {
        None => (StatusCode::OK, Json(ApiResponse::success(&result))),
        Some(error) => {
            // a missing tool server is a deployment problem, not a bad query
            let status = if error.code == "registry_empty" {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::OK
            };
            let message = error.message.clone();
            (status, Json(ApiResponse::failure(&result, message)))
        }
    }
}

/// =============================
/// Tools Endpoint
/// =============================

async fn list_tools(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.list_tools().await {
        Ok(tools) => (StatusCode::OK, Json(ApiResponse::success(tools))),
        Err(e) => {
            let status = if e.is_configuration() {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::BAD_GATEWAY
            };
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// =============================
/// Suggest Endpoint
/// =============================

async fn suggest(
    State(state): State<ApiState>,
    Json(req): Json<SuggestRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let suggestions = state.orchestrator.suggest(&req.seed).await;
    (StatusCode::OK, Json(ApiResponse::success(suggestions)))
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .route("/api/tools", get(list_tools))
        .route("/api/suggest", post(suggest))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::QueryClassifier;
    use crate::resolver::EntityResolver;
    use crate::suggest::SuggestionGenerator;
    use crate::test_support::ScriptedTransport;
    use crate::tools::{names, ToolRegistry};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn router(transport: ScriptedTransport) -> Router {
        let orchestrator = Orchestrator::new(
            Arc::new(ToolRegistry::new()),
            Arc::new(transport),
            QueryClassifier::rules_only(),
            EntityResolver::default(),
            SuggestionGenerator::new(None),
        );
        create_router(Arc::new(orchestrator))
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = tokio_test::assert_ok!(router.oneshot(request).await);
        let status = response.status();
        let bytes = tokio_test::assert_ok!(to_bytes(response.into_body(), usize::MAX).await);
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_returns_tagged_result() {
        let transport =
            ScriptedTransport::standard().respond(names::QUOTE, r#"{"symbol": "AAPL", "price": 190.0}"#);

        let (status, body) = send(
            router(transport),
            post_json("/api/analyze", json!({ "query": "Apple stock" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["widgetType"], json!("quote"));
        assert_eq!(body["data"]["toolUsed"], json!(names::QUOTE));
    }

    #[tokio::test]
    async fn test_empty_registry_is_service_unavailable() {
        let (status, body) = send(
            router(ScriptedTransport::new(vec![])),
            post_json("/api/analyze", json!({ "query": "Apple stock" })),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["data"]["widgetType"], json!("error"));
        assert_eq!(body["data"]["error"]["code"], json!("registry_empty"));
    }

    #[tokio::test]
    async fn test_tools_and_suggest_endpoints() {
        let app = router(ScriptedTransport::standard());

        let request = Request::builder()
            .uri("/api/tools")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().map(Vec::len), Some(12));

        let (status, body) = send(app, post_json("/api/suggest", json!({ "seed": "tesla" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"][0], json!("What is TSLA trading at?"));
    }
}
