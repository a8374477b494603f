// Copyright 2026 Scout Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP dispatch shell.
//!
//! A deliberately thin layer: each route maps 1:1 to an engine operation,
//! deserializes the request, and serializes the result. No acquisition
//! logic lives here. Every engine error becomes a well-formed JSON response;
//! the consumer is an automated agent and must never see a raw fault.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::engine::{Engine, ScrapeOutcome, VideoInsight};
use crate::errors::EngineError;

/// Build the router with all operation endpoints.
pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/transcript", get(handle_transcript))
        .route("/verify", post(handle_verify))
        .route("/scrape", get(handle_scrape))
        .route("/tools/market_deep_dive", post(handle_market))
        .route("/tools/video_insight", post(handle_video))
        .route("/tools/reddit_search", post(handle_search))
        .layer(cors)
        .with_state(engine)
}

/// Serve the REST API on the given port until the process exits.
pub async fn serve(port: u16, engine: Arc<Engine>) -> anyhow::Result<()> {
    let app = router(engine);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("scout engine listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Map an engine error to a status code plus structured body.
fn error_response(e: &EngineError) -> (StatusCode, Json<Value>) {
    let status = match e {
        EngineError::Input(_) => StatusCode::BAD_REQUEST,
        EngineError::BlockDetected { .. } => StatusCode::FORBIDDEN,
        EngineError::AllStrategiesFailed { .. } | EngineError::ExtractionEmpty => {
            StatusCode::NOT_FOUND
        }
        EngineError::SessionInit(_)
        | EngineError::Navigation(_)
        | EngineError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
    };

    let mut body = json!({
        "error": e.to_string(),
        "code": e.code(),
    });
    if let EngineError::BlockDetected {
        block_type, title, ..
    } = e
    {
        body["block_type"] = json!(block_type);
        body["title"] = json!(title);
    }
    if let EngineError::AllStrategiesFailed { attempts, .. } = e {
        body["attempts"] = json!(attempts);
    }

    (status, Json(body))
}

async fn handle_health() -> Json<Value> {
    Json(json!({ "status": "active", "service": "scout-engine" }))
}

#[derive(Deserialize)]
struct TranscriptParams {
    #[serde(default)]
    video_id: String,
}

async fn handle_transcript(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<TranscriptParams>,
) -> impl IntoResponse {
    match engine.fetch_transcript(&params.video_id).await {
        Ok(result) => (StatusCode::OK, Json(json!(result))),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct UrlBody {
    #[serde(default)]
    url: String,
}

async fn handle_verify(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<UrlBody>,
) -> impl IntoResponse {
    match engine.verify_link(&body.url).await {
        Ok(verdict) => (StatusCode::OK, Json(json!(verdict))),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct ScrapeParams {
    #[serde(default)]
    url: String,
}

async fn handle_scrape(
    State(engine): State<Arc<Engine>>,
    Query(params): Query<ScrapeParams>,
) -> impl IntoResponse {
    match engine.scrape_page(&params.url).await {
        Ok(ScrapeOutcome::Content(content)) => (
            StatusCode::OK,
            Json(json!({
                "url": content.final_url,
                "html": content.raw_markup,
                "text": content.cleaned_text,
            })),
        ),
        // Block detection is a classified outcome, surfaced 403 so the
        // agent can tell "blocked" from "broken".
        Ok(ScrapeOutcome::Blocked(report)) => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": "Bot Detection Triggered",
                "block_type": report.block_type,
                "trigger": report.trigger,
                "title": report.title,
            })),
        ),
        Err(e) => error_response(&e),
    }
}

async fn handle_market(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<UrlBody>,
) -> impl IntoResponse {
    match engine.market_deep_dive(&body.url).await {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({
                "tool_name": "market_deep_dive",
                "status": "success",
                "data": report,
            })),
        ),
        Err(e) => error_response(&e),
    }
}

async fn handle_video(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<UrlBody>,
) -> impl IntoResponse {
    match engine.video_insight(&body.url).await {
        Ok(VideoInsight::Report { data }) => (
            StatusCode::OK,
            Json(json!({
                "tool_name": "video_insight",
                "status": "success",
                "data": data,
            })),
        ),
        Ok(VideoInsight::Skipped { reason }) => (
            StatusCode::OK,
            Json(json!({ "status": "skipped", "reason": reason })),
        ),
        Err(e) => error_response(&e),
    }
}

#[derive(Deserialize)]
struct SearchBody {
    #[serde(default)]
    query: String,
}

async fn handle_search(
    State(engine): State<Arc<Engine>>,
    Json(body): Json<SearchBody>,
) -> impl IntoResponse {
    match engine.reddit_search(&body.query).await {
        Ok(links) => (
            StatusCode::OK,
            Json(json!({
                "tool_name": "reddit_search",
                "status": "success",
                "data": links,
            })),
        ),
        Err(e) => error_response(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_router_builds() {
        let engine = Arc::new(Engine::new(EngineConfig::default()).expect("engine builds"));
        let _ = router(engine);
    }

    #[test]
    fn test_block_detected_maps_to_403_with_block_type() {
        let e = EngineError::BlockDetected {
            block_type: "captcha".into(),
            trigger: "robot check".into(),
            title: "Robot Check".into(),
        };
        let (status, Json(body)) = error_response(&e);
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["block_type"], "captcha");
    }

    #[test]
    fn test_input_error_maps_to_400() {
        let (status, _) = error_response(&EngineError::Input("missing url".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_exhaustion_maps_to_404_with_attempts() {
        let e = EngineError::AllStrategiesFailed {
            operation: "transcript".into(),
            summary: "a: x; b: y".into(),
            attempts: vec![],
        };
        let (status, Json(body)) = error_response(&e);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.get("attempts").is_some());
    }
}
