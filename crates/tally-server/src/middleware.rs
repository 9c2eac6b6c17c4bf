use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderName, HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tally_common::{codec, CodecError};

use crate::api::{codec_error_response, error_response};
use crate::logging::{trace_id_of, truncate_body, MAX_BODY_LOG_CHARS};
use crate::state::AppState;

/// `HashSHA256`; header names are matched case-insensitively.
static HASH_HEADER_NAME: HeaderName = HeaderName::from_static("hashsha256");

/// Unwraps the request envelope and wraps the response.
///
/// Inbound: reads at most `max_body_bytes`, gunzips when `Content-Encoding`
/// lists gzip, then checks the `HashSHA256` signature against the
/// uncompressed bytes when a key is configured. A wrong signature is always
/// rejected; a missing one only under `require_signature`.
///
/// Outbound: signs the uncompressed body when a key is configured and gzips
/// successful JSON or HTML responses for clients that accept gzip.
pub async fn envelope_middleware(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let trace_id = trace_id_of(&req);
    let accepts_gzip = req
        .headers()
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(codec::lists_gzip);
    let gzipped = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(codec::lists_gzip);

    let (mut parts, body) = req.into_parts();
    let raw = match axum::body::to_bytes(body, state.config.max_body_bytes).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::warn!(trace_id = %trace_id, error = %e, "Failed to read request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                "request body unreadable or too large",
            );
        }
    };

    let body = if gzipped {
        match codec::decompress_limited(&raw, state.config.max_body_bytes) {
            Ok(plain) => {
                parts.headers.remove(header::CONTENT_ENCODING);
                parts.headers.remove(header::CONTENT_LENGTH);
                axum::body::Bytes::from(plain)
            }
            Err(e) => return codec_error_response(&trace_id, &e),
        }
    } else {
        raw
    };

    if !body.is_empty() {
        tracing::debug!(
            trace_id = %trace_id,
            body = %truncate_body(&body, MAX_BODY_LOG_CHARS),
            "request body"
        );
    }

    if let Some(key) = state.signing_key() {
        let signature = parts
            .headers
            .get(&HASH_HEADER_NAME)
            .and_then(|v| v.to_str().ok());
        let rejected = match signature {
            Some(sig) => !codec::verify(&body, sig, key),
            None => state.config.require_signature && !body.is_empty(),
        };
        if rejected {
            return codec_error_response(&trace_id, &CodecError::IntegrityMismatch);
        }
    }

    let response = next.run(Request::from_parts(parts, Body::from(body))).await;
    seal_response(&state, &trace_id, response, accepts_gzip).await
}

async fn seal_response(
    state: &AppState,
    trace_id: &str,
    response: Response,
    accepts_gzip: bool,
) -> Response {
    let key = state.signing_key();
    let compress = accepts_gzip
        && response.status().as_u16() < 300
        && response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(codec::is_compressible);
    if key.is_none() && !compress {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(trace_id = %trace_id, error = %e, "Failed to buffer response body");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "internal_error",
                "failed to buffer response",
            );
        }
    };

    if let Some(key) = key {
        if let Ok(value) = HeaderValue::from_str(&codec::sign(&bytes, key)) {
            parts.headers.insert(HASH_HEADER_NAME.clone(), value);
        }
    }

    if !compress {
        return Response::from_parts(parts, Body::from(bytes));
    }
    match codec::compress(&bytes) {
        Ok(compressed) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            parts
                .headers
                .insert(header::CONTENT_ENCODING, HeaderValue::from_static(codec::GZIP));
            Response::from_parts(parts, Body::from(compressed))
        }
        Err(e) => {
            tracing::warn!(trace_id = %trace_id, error = %e, "Response compression failed, sending plain");
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}
