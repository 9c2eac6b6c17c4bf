mod common;

use axum::http::StatusCode;
use common::{assert_err_envelope, build_test_context, request_json, request_text};
use serde_json::json;

#[tokio::test]
async fn gauge_update_then_read_back() {
    let ctx = build_test_context().await.expect("test context should build");

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/update",
        Some(json!({"id":"Alloc","type":"gauge","value":15.135})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id":"Alloc","type":"gauge","value":15.135}));

    let (status, text) = request_text(&ctx.app, "GET", "/value/gauge/Alloc").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "15.135");
}

#[tokio::test]
async fn counter_updates_accumulate_and_echo_total() {
    let ctx = build_test_context().await.expect("test context should build");
    let record = json!({"id":"PollCount","type":"counter","delta":3});

    let (_, first) = request_json(&ctx.app, "POST", "/update", Some(record.clone())).await;
    assert_eq!(first["delta"], 3);
    let (status, second) = request_json(&ctx.app, "POST", "/update", Some(record)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["delta"], 6);

    let (_, text) = request_text(&ctx.app, "GET", "/value/counter/PollCount").await;
    assert_eq!(text, "6");
}

#[tokio::test]
async fn listing_formats_values_as_strings() {
    let ctx = build_test_context().await.expect("test context should build");
    request_json(
        &ctx.app,
        "POST",
        "/update",
        Some(json!({"id":"Alloc","type":"gauge","value":15.135})),
    )
    .await;
    for _ in 0..2 {
        request_json(
            &ctx.app,
            "POST",
            "/update",
            Some(json!({"id":"PollCount","type":"counter","delta":3})),
        )
        .await;
    }

    let (status, text) = request_text(&ctx.app, "GET", "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        text,
        r#"{"Gauges":{"Alloc":"15.135"},"Counters":{"PollCount":"6"}}"#
    );
}

#[tokio::test]
async fn unknown_metrics_and_types() {
    let ctx = build_test_context().await.expect("test context should build");

    let (status, _) = request_text(&ctx.app, "GET", "/value/gauge/Missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, text) = request_text(&ctx.app, "GET", "/value/histogram/Alloc").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_err_envelope(&body, 1001);

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/value",
        Some(json!({"id":"Missing","type":"counter"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_err_envelope(&body, 1004);
}

#[tokio::test]
async fn malformed_records_are_rejected() {
    let ctx = build_test_context().await.expect("test context should build");

    for record in [
        json!({"id":"Alloc","type":"gauge"}),
        json!({"id":"Alloc","type":"gauge","delta":1}),
        json!({"id":"Alloc","type":"gauge","value":1.0,"delta":1}),
        json!({"id":"","type":"counter","delta":1}),
        json!({"id":"Alloc","type":"summary","value":1.0}),
    ] {
        let (status, body) = request_json(&ctx.app, "POST", "/update", Some(record)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_err_envelope(&body, 1010);
    }

    let (status, body) = request_json(&ctx.app, "POST", "/update", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1010);
    assert!(ctx.state.store.snapshot_all().is_empty());
}

#[tokio::test]
async fn value_lookup_by_body() {
    let ctx = build_test_context().await.expect("test context should build");
    request_json(
        &ctx.app,
        "POST",
        "/update",
        Some(json!({"id":"PollCount","type":"counter","delta":7})),
    )
    .await;

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/value",
        Some(json!({"id":"PollCount","type":"counter"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"id":"PollCount","type":"counter","delta":7}));
}

#[tokio::test]
async fn batch_is_applied_and_echoed() {
    let ctx = build_test_context().await.expect("test context should build");
    let batch = json!([
        {"id":"Alloc","type":"gauge","value":1.5},
        {"id":"PollCount","type":"counter","delta":2},
        {"id":"Alloc","type":"gauge","value":2.5},
        {"id":"PollCount","type":"counter","delta":3}
    ]);

    let (status, body) = request_json(&ctx.app, "POST", "/updates/", Some(batch.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, batch);

    assert_eq!(ctx.state.store.get_gauge("Alloc"), Some(2.5));
    assert_eq!(ctx.state.store.get_counter("PollCount"), Some(5));

    let (status, body) = request_json(&ctx.app, "POST", "/updates", Some(json!([]))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn kind_conflict_rejects_whole_batch() {
    let ctx = build_test_context().await.expect("test context should build");
    request_json(
        &ctx.app,
        "POST",
        "/update",
        Some(json!({"id":"Alloc","type":"gauge","value":1.0})),
    )
    .await;

    let (status, body) = request_json(
        &ctx.app,
        "POST",
        "/update",
        Some(json!({"id":"Alloc","type":"counter","delta":1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_err_envelope(&body, 1005);

    let (status, _) = request_json(
        &ctx.app,
        "POST",
        "/updates/",
        Some(json!([
            {"id":"Fresh","type":"counter","delta":1},
            {"id":"Alloc","type":"counter","delta":1}
        ])),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(ctx.state.store.get_counter("Fresh"), None);
    assert_eq!(ctx.state.store.get_gauge("Alloc"), Some(1.0));
}

#[tokio::test]
async fn path_update_route() {
    let ctx = build_test_context().await.expect("test context should build");

    let (status, text) = request_text(&ctx.app, "POST", "/update/gauge/Temp/21.5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(text, "OK");
    let (status, _) = request_text(&ctx.app, "POST", "/update/counter/Hits/4").await;
    assert_eq!(status, StatusCode::OK);
    request_text(&ctx.app, "POST", "/update/counter/Hits/4").await;

    let (_, text) = request_text(&ctx.app, "GET", "/value/gauge/Temp").await;
    assert_eq!(text, "21.5");
    let (_, text) = request_text(&ctx.app, "GET", "/value/counter/Hits").await;
    assert_eq!(text, "8");

    let (status, _) = request_text(&ctx.app, "POST", "/update/counter/Hits/1.5").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = request_text(&ctx.app, "POST", "/update/gauge/Temp/NaN").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = request_text(&ctx.app, "POST", "/update/timer/Temp/1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn responses_carry_trace_id() {
    let ctx = build_test_context().await.expect("test context should build");
    let req = axum::http::Request::builder()
        .uri("/value/gauge/Missing")
        .header("X-Trace-Id", "caller-trace-1")
        .body(axum::body::Body::empty())
        .unwrap();
    let (status, headers, bytes) = common::send(&ctx.app, req).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(headers["x-trace-id"], "caller-trace-1");
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["trace_id"], "caller-trace-1");
}
