use super::*;
use axum::{body, body::Body, http::Request, response::Response};
use tower::ServiceExt;

async fn test_app(seed: bool) -> Router {
    let api = ApiContext::default();
    if seed {
        api.seed_history(Utc::now()).await;
    }
    build_router(Arc::new(AppState { api }))
}

fn post_json(uri: &str, payload: serde_json::Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

fn get_req(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request")
}

async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = test_app(false).await;
    let response = app.oneshot(get_req("/healthz")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn price_routes_report_missing_data_until_refreshed() {
    let app = test_app(false).await;

    let response = app.clone().oneshot(get_req("/api/price")).await.expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error: ApiError = json_body(response).await;
    assert_eq!(error.code, ErrorCode::NotFound);

    let response = app
        .clone()
        .oneshot(Request::post("/api/price/refresh").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let snapshot: PriceSnapshot = json_body(response).await;
    assert_eq!(snapshot.source_count, 5);
    assert!((25.0..=33.0).contains(&snapshot.average_price));

    let response = app.oneshot(get_req("/api/price")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let current: CurrentPriceResponse = json_body(response).await;
    assert_eq!(current.current_price, snapshot.average_price);
}

#[tokio::test]
async fn history_honours_days_query() {
    let app = test_app(true).await;
    let response = app
        .clone()
        .oneshot(get_req("/api/history?days=3"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let history: HistoryResponse = json_body(response).await;
    assert_eq!(history.count, 3);
    assert_eq!(history.chart_data.len(), 3);

    let response = app.oneshot(get_req("/api/history")).await.expect("response");
    let history: HistoryResponse = json_body(response).await;
    assert_eq!(history.count, 7);
}

#[tokio::test]
async fn verify_route_confirms_and_queues_corrections() {
    let app = test_app(true).await;

    let response = app
        .clone()
        .oneshot(post_json("/api/verify", serde_json::json!({ "is_correct": true })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let outcome: VerifyResponse = json_body(response).await;
    assert!(matches!(outcome, VerifyResponse::Confirmed { confirmed_price, .. } if confirmed_price == 28.0));

    let response = app
        .clone()
        .oneshot(post_json("/api/verify", serde_json::json!({ "is_correct": false })))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/verify",
            serde_json::json!({
                "is_correct": false,
                "price": 31.5,
                "district": "Madurai",
                "market": "Mattuthavani",
            }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_req("/api/submissions?status=pending"))
        .await
        .expect("response");
    let listed: SubmissionsResponse = json_body(response).await;
    assert_eq!(listed.count, 1);
    assert_eq!(listed.pending_count, 1);
    assert_eq!(listed.data[0].district, "Madurai");
    assert_eq!(listed.data[0].system_price, Some(28.0));
}

#[tokio::test]
async fn submit_route_validates_fields() {
    let app = test_app(false).await;

    let response = app
        .clone()
        .oneshot(post_json("/api/submit", serde_json::json!({ "price": 27.0 })))
        .await
        .expect("response");
    assert!(response.status().is_client_error());

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/submit",
            serde_json::json!({ "price": -1.0, "district": "Erode" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post_json(
            "/api/submit",
            serde_json::json!({ "price": 27.0, "district": "Erode", "notes": "weekly market" }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let record: SubmissionRecord = json_body(response).await;
    assert_eq!(record.notes, "weekly market");
}

#[tokio::test]
async fn districts_and_stats_follow_latest_snapshot() {
    let app = test_app(true).await;

    let response = app
        .clone()
        .oneshot(get_req("/api/districts"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let table: DistrictsResponse = json_body(response).await;
    assert_eq!(table.total_districts, 12);
    assert_eq!(table.state_average, 28.0);

    let response = app.oneshot(get_req("/api/stats")).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let stats: PriceStats = json_body(response).await;
    assert_eq!(stats.data_points, 7);
    assert_eq!(stats.weekly_change, "+0.0%");
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let app = test_app(false).await;
    let notes = "x".repeat(MAX_REQUEST_BYTES + 1);
    let response = app
        .oneshot(post_json(
            "/api/submit",
            serde_json::json!({ "price": 27.0, "district": "Erode", "notes": notes }),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
