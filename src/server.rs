use axum::{
    extract::{rejection::JsonRejection, Path as UrlPath, Request, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // For oneshot
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tracing::{error, info, warn};

use crate::error::{Result, SplicerError};
use crate::pipeline::{ConcatOrchestrator, ConcatRequest, Strategy};
use crate::store::ArtifactStore;

pub struct AppState {
    pub orchestrator: ConcatOrchestrator,
    /// Overrides the Host header when building artifact addresses
    pub public_url: Option<String>,
}

impl AppState {
    fn base_url(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.public_url {
            return url.trim_end_matches('/').to_string();
        }
        let host = headers
            .get(header::HOST)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("localhost");
        format!("http://{}", host)
    }
}

pub type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
pub struct ConcatResponse {
    pub code: u16,
    pub msg: String,
    pub url: String,
    pub strategy: Strategy,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub msg: String,
}

/// Maps pipeline failures onto HTTP responses
pub struct ApiError(SplicerError);

impl From<SplicerError> for ApiError {
    fn from(err: SplicerError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.status_code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody { code, msg: self.0.to_string() })).into_response()
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/concat", post(concat))
        .route("/files/:token/:filename", get(serve_artifact))
        .route("/health", get(health))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

pub async fn start_server(bind: &str, state: SharedState) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| SplicerError::Config(format!("Invalid bind address '{}': {}", bind, e)))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Concat service listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Periodically delete working sets older than `retention`
pub fn spawn_sweeper(store: ArtifactStore, retention: Duration, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.sweep_expired(retention)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Retention sweep failed: {}", e),
                Err(e) => error!("Retention sweep panicked: {}", e),
            }
        }
    })
}

async fn concat(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ConcatRequest>, JsonRejection>,
) -> std::result::Result<Json<ConcatResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| SplicerError::Validation(e.body_text()))?;
    let report = state.orchestrator.run(request.urls).await?;
    let url = state
        .orchestrator
        .store()
        .external_address(&state.base_url(&headers), &report.token);

    Ok(Json(ConcatResponse {
        code: 0,
        msg: "success".to_string(),
        url,
        strategy: report.strategy,
    }))
}

async fn serve_artifact(
    State(state): State<SharedState>,
    UrlPath((token, filename)): UrlPath<(String, String)>,
    request: Request,
) -> Response {
    let Some(path) = state.orchestrator.store().resolve(&token, &filename) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::fetch::MockFetcher;
    use crate::media::{MockTranscodeEngine, TranscodeOutcome};
    use axum::body::Body;
    use tempfile::TempDir;

    fn app(root: &TempDir, public_url: Option<&str>) -> Router {
        let mut fetcher = MockFetcher::new();
        fetcher.expect_fetch().returning(|_, dest, _| {
            std::fs::write(dest, vec![1u8; 2048]).unwrap();
            Ok(2048)
        });
        let mut engine = MockTranscodeEngine::new();
        engine.expect_transcode().returning(|cmd| {
            std::fs::write(cmd.args.last().unwrap(), b"merged video").unwrap();
            Ok(TranscodeOutcome::Success)
        });

        let store = ArtifactStore::new(root.path()).unwrap();
        let orchestrator = ConcatOrchestrator::new(&Config::default(), store, Arc::new(engine), Arc::new(fetcher));
        router(Arc::new(AppState {
            orchestrator,
            public_url: public_url.map(str::to_string),
        }))
    }

    fn post_concat(body: &str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/concat")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::HOST, "videos.example.com:8080")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn empty_url_list_is_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let response = app(&root, None).oneshot(post_concat(r#"{"urls": []}"#)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["code"], 400);
        assert_eq!(body["msg"], "Invalid request: No URLs provided");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let response = app(&root, None).oneshot(post_concat("not json")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], 400);

        let missing = app(&root, None).oneshot(post_concat("{}")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn success_returns_artifact_address_from_host() {
        let root = tempfile::tempdir().unwrap();
        let response = app(&root, None)
            .oneshot(post_concat(r#"{"urls": ["https://cdn.example.com/a.mp4", "https://cdn.example.com/b.mp4"]}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["code"], 0);
        assert_eq!(body["msg"], "success");
        assert_eq!(body["strategy"], "fast");
        let url = body["url"].as_str().unwrap();
        assert!(url.starts_with("http://videos.example.com:8080/files/"));
        assert!(url.ends_with("/out.mp4"));
    }

    #[tokio::test]
    async fn serves_only_the_published_artifact() {
        let root = tempfile::tempdir().unwrap();
        let app = app(&root, Some("https://media.example.com/"));

        let response = app
            .clone()
            .oneshot(post_concat(r#"{"urls": ["https://cdn.example.com/a.mp4"]}"#))
            .await
            .unwrap();
        let body = json_body(response).await;
        let url = body["url"].as_str().unwrap().to_string();
        let path = url.strip_prefix("https://media.example.com").unwrap().to_string();

        let artifact = app
            .clone()
            .oneshot(axum::http::Request::builder().uri(&path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(artifact.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(artifact.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"merged video");

        let source = path.replace("out.mp4", "in_0.mp4");
        let hidden = app
            .oneshot(axum::http::Request::builder().uri(&source).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(hidden.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let root = tempfile::tempdir().unwrap();
        let response = app(&root, None)
            .oneshot(axum::http::Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }
}
