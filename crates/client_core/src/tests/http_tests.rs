use super::*;
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use axum::{extract::State, routing::get, routing::post, Json, Router};
use chrono::Utc;
use shared::{
    domain::{Scope, SubmissionId},
    error::ErrorCode,
    protocol::{DistrictPrice, SubmissionKind, SubmissionRecord, SubmissionStatus},
};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct BackendState {
    calls: Arc<AtomicU32>,
    failures_before_success: u32,
    received: Arc<Mutex<Vec<VerifyRequest>>>,
}

async fn spawn_backend(app: Router) -> Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

fn fast_policy() -> HttpClientConfig {
    HttpClientConfig {
        timeout: Duration::from_secs(2),
        retries: 2,
        retry_delay: Duration::from_millis(10),
    }
}

async fn current_price(
    State(state): State<BackendState>,
) -> Result<Json<CurrentPriceResponse>, (axum::http::StatusCode, Json<ApiError>)> {
    let call = state.calls.fetch_add(1, Ordering::SeqCst) + 1;
    if call <= state.failures_before_success {
        return Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Internal, "scraper warming up")),
        ));
    }
    Ok(Json(CurrentPriceResponse {
        current_price: 29.4,
        min_price: 27.0,
        max_price: 32.0,
        source_count: 5,
        last_updated: Utc::now(),
    }))
}

async fn districts() -> Json<DistrictsResponse> {
    Json(DistrictsResponse {
        districts: vec![
            DistrictPrice {
                district: "Thanjavur".into(),
                price: 30.1,
                min: 27.1,
                max: 33.1,
                trend: "+2%".into(),
                source_count: 3,
            },
            DistrictPrice {
                district: "Kanchipuram".into(),
                price: 25.0,
                min: 22.5,
                max: 27.5,
                trend: "0%".into(),
                source_count: 2,
            },
        ],
        state_average: 28.0,
        total_districts: 2,
        last_updated: Utc::now(),
    })
}

async fn verify(
    State(state): State<BackendState>,
    Json(request): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, (axum::http::StatusCode, Json<ApiError>)> {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let Some(price) = request.price else {
        return Err((
            axum::http::StatusCode::BAD_REQUEST,
            Json(ApiError::validation("Please provide the correct price")),
        ));
    };
    state.received.lock().await.push(request.clone());
    Ok(Json(VerifyResponse::CorrectionQueued {
        submission: SubmissionRecord {
            id: SubmissionId(1),
            kind: SubmissionKind::Correction,
            user_price: price,
            system_price: Some(28.0),
            district: request.district.unwrap_or_default(),
            market: request.market.unwrap_or_default(),
            contact: None,
            notes: "User reported incorrect price".into(),
            status: SubmissionStatus::Pending,
            timestamp: Utc::now(),
        },
    }))
}

async fn rejecting_verify(
    State(state): State<BackendState>,
) -> (axum::http::StatusCode, Json<ApiError>) {
    state.calls.fetch_add(1, Ordering::SeqCst);
    (
        axum::http::StatusCode::BAD_REQUEST,
        Json(ApiError::validation("Missing 'is_correct' field")),
    )
}

fn backend(state: BackendState) -> Router {
    Router::new()
        .route("/api/price", get(current_price))
        .route("/api/districts", get(districts))
        .route("/api/verify", post(verify))
        .with_state(state)
}

fn submission() -> CorrectionSubmission {
    CorrectionSubmission {
        scope: Scope::Global,
        proposed_price: 27.5,
        location_label: "Koyambedu Market".into(),
        district: District::known("Chennai").expect("known"),
        submitted_at: Utc::now(),
    }
}

#[tokio::test]
async fn price_source_reads_current_and_district_quotes() {
    let state = BackendState::default();
    let url = spawn_backend(backend(state)).await.expect("backend");
    let source = HttpPriceSource::new(&url, fast_policy()).expect("source");

    let quote = source.current_price().await.expect("quote");
    assert_eq!(quote.value, 29.4);

    let quotes = source.district_prices().await.expect("districts");
    assert_eq!(quotes.len(), 2);
    assert_eq!(quotes[0].district, District::known("Thanjavur").expect("known"));
    assert_eq!(quotes[0].quote.value, 30.1);
    assert_eq!(quotes[1].district.as_str(), "Kanchipuram");
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let state = BackendState {
        failures_before_success: 2,
        ..BackendState::default()
    };
    let calls = state.calls.clone();
    let url = spawn_backend(backend(state)).await.expect("backend");
    let source = HttpPriceSource::new(&url, fast_policy()).expect("source");

    let quote = source.current_price().await.expect("quote after retries");
    assert_eq!(quote.value, 29.4);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retries_are_bounded() {
    let state = BackendState {
        failures_before_success: 10,
        ..BackendState::default()
    };
    let calls = state.calls.clone();
    let url = spawn_backend(backend(state)).await.expect("backend");
    let source = HttpPriceSource::new(&url, fast_policy()).expect("source");

    let err = source.current_price().await.expect_err("should give up");
    assert!(format!("{err:#}").contains("retries exhausted"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn sink_posts_correction_to_review_queue() {
    let state = BackendState::default();
    let received = state.received.clone();
    let url = spawn_backend(backend(state)).await.expect("backend");
    let sink = HttpSubmissionSink::new(&url, fast_policy()).expect("sink");

    sink.submit(&submission()).await.expect("submit");

    let received = received.lock().await;
    assert_eq!(
        *received,
        vec![VerifyRequest {
            is_correct: false,
            price: Some(27.5),
            district: Some("Chennai".into()),
            market: Some("Koyambedu Market".into()),
        }]
    );
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let state = BackendState::default();
    let calls = state.calls.clone();
    let app = Router::new()
        .route("/api/verify", post(rejecting_verify))
        .with_state(state);
    let url = spawn_backend(app).await.expect("backend");
    let sink = HttpSubmissionSink::new(&url, fast_policy()).expect("sink");

    let err = sink.submit(&submission()).await.expect_err("rejected");
    assert!(err.to_string().contains("Missing 'is_correct' field"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn base_url_path_prefix_is_kept() {
    let state = BackendState::default();
    let app = Router::new().nest("/coconut", backend(state));
    let url = spawn_backend(app).await.expect("backend");

    for base in [format!("{url}/coconut"), format!("{url}/coconut/")] {
        let source = HttpPriceSource::new(&base, fast_policy()).expect("source");
        let quote = source.current_price().await.expect("quote under prefix");
        assert_eq!(quote.value, 29.4);
    }
}

#[test]
fn invalid_base_url_is_rejected() {
    assert!(HttpPriceSource::new("not a url", HttpClientConfig::default()).is_err());
}
