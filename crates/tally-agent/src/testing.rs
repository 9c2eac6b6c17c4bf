//! In-process HTTP collector double for sender and scheduler tests.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tally_common::codec;

#[derive(Debug, Clone)]
pub struct Captured {
    pub path: String,
    /// Decompressed request body.
    pub body: Vec<u8>,
    pub content_encoding: Option<String>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub enum Responder {
    Ok,
    /// Answer 500 to the first `n` requests.
    FailFirst(usize),
    /// Answer 500 to the first `n` requests on `/updates/`.
    FailBatches(usize),
    BadRequest,
    BadSignature,
    /// Never answer within a test's lifetime.
    Hang,
}

#[derive(Clone)]
struct Shared {
    responder: Responder,
    seen: Arc<AtomicUsize>,
    batches: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<Captured>>>,
}

pub struct CaptureServer {
    address: String,
    requests: Arc<Mutex<Vec<Captured>>>,
}

impl CaptureServer {
    pub async fn start(responder: Responder) -> Self {
        let shared = Shared {
            responder,
            seen: Arc::new(AtomicUsize::new(0)),
            batches: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        };
        let requests = shared.requests.clone();
        let app = Router::new().fallback(capture).with_state(shared);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { address, requests }
    }

    pub fn address(&self) -> String {
        self.address.clone()
    }

    pub fn requests(&self) -> Vec<Captured> {
        self.requests.lock().unwrap().clone()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn capture(State(shared): State<Shared>, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let content_encoding = header(&headers, "content-encoding");
    let body = if content_encoding.as_deref() == Some("gzip") {
        codec::decompress(&body).unwrap()
    } else {
        body.to_vec()
    };
    let path = uri.path().to_string();
    let n = shared.seen.fetch_add(1, Ordering::SeqCst);
    let batch_n = if path == "/updates/" {
        shared.batches.fetch_add(1, Ordering::SeqCst)
    } else {
        usize::MAX
    };

    shared.requests.lock().unwrap().push(Captured {
        path,
        body: body.clone(),
        content_encoding,
        signature: header(&headers, codec::HASH_HEADER),
    });

    match shared.responder {
        Responder::Ok => (StatusCode::OK, body).into_response(),
        Responder::FailFirst(limit) if n < limit => {
            (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable").into_response()
        }
        Responder::FailBatches(limit) if batch_n < limit => {
            (StatusCode::INTERNAL_SERVER_ERROR, "storage unavailable").into_response()
        }
        Responder::FailFirst(_) | Responder::FailBatches(_) => (StatusCode::OK, body).into_response(),
        Responder::BadRequest => (StatusCode::BAD_REQUEST, "malformed payload").into_response(),
        Responder::BadSignature => {
            ([(codec::HASH_HEADER, "AAAA")], body).into_response()
        }
        Responder::Hang => {
            tokio::time::sleep(std::time::Duration::from_secs(300)).await;
            (StatusCode::OK, body).into_response()
        }
    }
}
