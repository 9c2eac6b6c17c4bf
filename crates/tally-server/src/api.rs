use crate::logging::TraceId;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tally_common::{codec, CodecError, Metric, MetricKind};
use tally_storage::StorageError;

/// Error body shared by every failing endpoint.
#[derive(Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// Numeric error code, see `to_custom_error_code`.
    pub err_code: i32,
    /// Human-readable error message.
    pub err_msg: String,
    /// Trace id of the request, also sent as `X-Trace-Id`.
    pub trace_id: String,
    pub data: Option<T>,
}

fn to_custom_error_code(code: &str) -> i32 {
    match code {
        "bad_request" => 1001,
        "not_found" => 1004,
        "kind_conflict" => 1005,
        "malformed_payload" => 1010,
        "corrupt_stream" => 1011,
        "integrity_mismatch" => 1012,
        "payload_too_large" => 1013,
        "internal_error" => 1500,
        "storage_error" => 1501,
        _ => 1999,
    }
}

pub fn error_response(status: StatusCode, trace_id: &str, code: &str, msg: &str) -> Response {
    (
        status,
        Json(ApiResponse::<Value> {
            err_code: to_custom_error_code(code),
            err_msg: msg.to_string(),
            trace_id: trace_id.to_string(),
            data: None,
        }),
    )
        .into_response()
}

/// 400 response for a body the codec refused.
pub fn codec_error_response(trace_id: &str, err: &CodecError) -> Response {
    let code = match err {
        CodecError::MalformedPayload(_) => "malformed_payload",
        CodecError::CorruptStream(_) => "corrupt_stream",
        CodecError::TooLarge { .. } => "payload_too_large",
        CodecError::IntegrityMismatch => "integrity_mismatch",
    };
    tracing::warn!(trace_id = %trace_id, error = %err, "Rejected request body");
    error_response(StatusCode::BAD_REQUEST, trace_id, code, &err.to_string())
}

fn storage_error_response(trace_id: &str, err: &StorageError) -> Response {
    match err {
        StorageError::KindConflict { .. } => {
            error_response(StatusCode::BAD_REQUEST, trace_id, "kind_conflict", &err.to_string())
        }
        _ => {
            tracing::error!(trace_id = %trace_id, error = %err, "Persistence failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "storage_error",
                &err.to_string(),
            )
        }
    }
}

fn parse_kind(trace_id: &str, raw: &str) -> Result<MetricKind, Response> {
    raw.parse::<MetricKind>()
        .map_err(|msg| error_response(StatusCode::BAD_REQUEST, trace_id, "bad_request", &msg))
}

fn metric_not_found(trace_id: &str, kind: MetricKind, id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        trace_id,
        "not_found",
        &format!("{kind} metric {id} not found"),
    )
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_metrics))
        .route("/ping", get(ping))
        .route("/update", post(update_metric))
        .route("/update/", post(update_metric))
        .route("/update/:kind/:id/:value", post(update_from_path))
        .route("/updates", post(update_batch))
        .route("/updates/", post(update_batch))
        .route("/value", post(value_from_body))
        .route("/value/", post(value_from_body))
        .route("/value/:kind/:id", get(value_from_path))
}

/// Applies one metric and echoes it with the now-current value.
async fn update_metric(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let metric: Metric = match codec::decode(&body) {
        Ok(metric) => metric,
        Err(e) => return codec_error_response(&trace_id, &e),
    };

    let current = match state.store.apply(&metric) {
        Ok(current) => current,
        Err(e) => return storage_error_response(&trace_id, &e),
    };

    if let Err(e) = state
        .persistence
        .after_update(&state.store, std::slice::from_ref(&metric))
        .await
    {
        return storage_error_response(&trace_id, &e);
    }

    Json(current).into_response()
}

/// Applies a batch as one unit and echoes the submitted records.
async fn update_batch(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let metrics: Vec<Metric> = match codec::decode(&body) {
        Ok(metrics) => metrics,
        Err(e) => return codec_error_response(&trace_id, &e),
    };

    if let Err(e) = state.store.apply_batch(&metrics) {
        return storage_error_response(&trace_id, &e);
    }
    if let Err(e) = state.persistence.after_update(&state.store, &metrics).await {
        return storage_error_response(&trace_id, &e);
    }

    tracing::debug!(trace_id = %&*trace_id, count = metrics.len(), "Applied batch");
    Json(metrics).into_response()
}

/// Path form of a single update: `/update/{type}/{id}/{value}`.
async fn update_from_path(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, id, raw)): Path<(String, String, String)>,
) -> Response {
    let kind = match parse_kind(&trace_id, &kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    if id.trim().is_empty() {
        return error_response(StatusCode::NOT_FOUND, &trace_id, "not_found", "metric id is empty");
    }

    let metric = match kind {
        MetricKind::Gauge => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(|v| Metric::gauge(id, v)),
        MetricKind::Counter => raw.parse::<i64>().ok().map(|d| Metric::counter(id, d)),
    };
    let Some(metric) = metric else {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            &format!("invalid {kind} value: {raw}"),
        );
    };

    if let Err(e) = state.store.apply(&metric) {
        return storage_error_response(&trace_id, &e);
    }
    if let Err(e) = state
        .persistence
        .after_update(&state.store, std::slice::from_ref(&metric))
        .await
    {
        return storage_error_response(&trace_id, &e);
    }

    (StatusCode::OK, "OK").into_response()
}

#[derive(Deserialize)]
struct ValueQuery {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Completes `{id, type}` with the current value.
async fn value_from_body(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    body: Bytes,
) -> Response {
    let query: ValueQuery = match codec::decode(&body) {
        Ok(query) => query,
        Err(e) => return codec_error_response(&trace_id, &e),
    };
    let kind = match parse_kind(&trace_id, &query.kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };

    match state.store.get(kind, &query.id) {
        Some(value) => Json(Metric {
            id: query.id,
            value,
        })
        .into_response(),
        None => metric_not_found(&trace_id, kind, &query.id),
    }
}

/// Plain-text current value.
async fn value_from_path(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Response {
    let kind = match parse_kind(&trace_id, &kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };

    match state.store.get(kind, &id) {
        Some(value) => (StatusCode::OK, value.to_string()).into_response(),
        None => metric_not_found(&trace_id, kind, &id),
    }
}

#[derive(Serialize)]
struct Listing {
    #[serde(rename = "Gauges")]
    gauges: BTreeMap<String, String>,
    #[serde(rename = "Counters")]
    counters: BTreeMap<String, String>,
}

async fn list_metrics(State(state): State<AppState>) -> Json<Listing> {
    let snapshot = state.store.snapshot_all();
    Json(Listing {
        gauges: snapshot
            .gauges
            .into_iter()
            .map(|(id, v)| (id, v.to_string()))
            .collect(),
        counters: snapshot
            .counters
            .into_iter()
            .map(|(id, v)| (id, v.to_string()))
            .collect(),
    })
}

/// Database liveness probe.
async fn ping(Extension(trace_id): Extension<TraceId>, State(state): State<AppState>) -> Response {
    match state.persistence.ping().await {
        Ok(()) => (StatusCode::OK, "OK").into_response(),
        Err(e) => {
            tracing::warn!(trace_id = %&*trace_id, error = %e, "Ping failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                &e.to_string(),
            )
        }
    }
}
