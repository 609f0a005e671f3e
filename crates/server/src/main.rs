use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use serde::Deserialize;
use server_api::{simulated_samples, ApiContext};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{
        CurrentPriceResponse, DistrictsResponse, HistoryResponse, PriceSnapshot, PriceStats,
        SubmissionRecord, SubmissionStatus, SubmissionsResponse, SubmitRequest, VerifyRequest,
        VerifyResponse,
    },
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

mod app_state;
mod config;

use app_state::AppState;
use config::load_settings;

const MAX_REQUEST_BYTES: usize = 16 * 1024;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    days: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SubmissionsQuery {
    status: Option<SubmissionStatus>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let api = ApiContext::new(settings.history_retention_days);
    if settings.seed_prices {
        api.seed_history(Utc::now()).await;
        info!("seeded price history");
    }

    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, retention_days = settings.history_retention_days, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api", get(index))
        .route("/api/price", get(http_current_price))
        .route("/api/price/refresh", post(http_refresh_prices))
        .route("/api/history", get(http_history))
        .route("/api/verify", post(http_verify))
        .route("/api/submit", post(http_submit))
        .route("/api/districts", get(http_district_prices))
        .route("/api/submissions", get(http_submissions))
        .route("/api/stats", get(http_stats))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BYTES))
        .with_state(state)
}

fn reject(error: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = match error.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn index() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "Coconut Price Tracker API",
        "endpoints": [
            "GET /api/price",
            "POST /api/price/refresh",
            "GET /api/history?days=7",
            "POST /api/verify",
            "POST /api/submit",
            "GET /api/districts",
            "GET /api/submissions?status=pending",
            "GET /api/stats",
        ],
    }))
}

async fn http_current_price(State(state): State<Arc<AppState>>) -> ApiResult<CurrentPriceResponse> {
    server_api::current_price(&state.api)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_refresh_prices(State(state): State<Arc<AppState>>) -> ApiResult<PriceSnapshot> {
    let now = Utc::now();
    let readings = simulated_samples(&mut StdRng::from_entropy(), now);
    server_api::refresh_prices(&state.api, readings, now)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_history(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HistoryQuery>,
) -> Json<HistoryResponse> {
    Json(server_api::history(&state.api, q.days).await)
}

async fn http_verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<VerifyResponse> {
    server_api::verify(&state.api, req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<SubmissionRecord> {
    server_api::submit(&state.api, req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_district_prices(State(state): State<Arc<AppState>>) -> ApiResult<DistrictsResponse> {
    let mut rng = StdRng::from_entropy();
    server_api::district_prices(&state.api, &mut rng)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_submissions(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SubmissionsQuery>,
) -> Json<SubmissionsResponse> {
    Json(server_api::submissions(&state.api, q.status).await)
}

async fn http_stats(State(state): State<Arc<AppState>>) -> ApiResult<PriceStats> {
    server_api::stats(&state.api)
        .await
        .map(Json)
        .map_err(reject)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
