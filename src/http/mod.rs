//! HTTP trigger for the pipeline.
//!
//! `POST /run-etl` runs one job per request. Every request builds its own engine from the
//! shared, read-only configuration, so concurrent runs never share a connection or a token.
//! The job runs on its own task and finishes even if the client goes away.

use crate::config::AppConfig;
use crate::core::etl::EtlEngine;
use crate::domain::model::EtlRequest;
use crate::utils::error::EtlError;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

const INDEX_HTML: &str = include_str!("../../templates/index.html");

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
}

pub fn router(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/run-etl", post(run_etl))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { config })
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn run_etl(
    State(state): State<AppState>,
    payload: Result<Json<EtlRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            tracing::warn!("Rejected run-etl body: {}", rejection.body_text());
            return error_response(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };

    if request
        .query_name
        .as_deref()
        .map_or(true, |name| name.trim().is_empty())
    {
        return error_response(StatusCode::BAD_REQUEST, "Query name is required");
    }

    // 在獨立任務中執行，連線中斷也不會在載入途中取消
    let config = state.config.clone();
    let job = tokio::spawn(async move {
        let engine = EtlEngine::from_config(&config)?;
        engine.run_request(&request).await
    });

    let outcome = match job.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!("ETL task did not complete: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "ETL run was aborted");
        }
    };

    match outcome {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => {
            tracing::error!("Error in ETL process: {}", e);
            let status = match e {
                EtlError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            error_response(status, &e.user_friendly_message())
        }
    }
}
