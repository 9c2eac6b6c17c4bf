use crate::config::AgentConfig;
use crate::worker::ReportJob;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;
use tally_common::codec;
use tally_common::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("collector unreachable at {url}: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("collector answered {url} with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("failed to compress payload: {0}")]
    Compress(#[from] std::io::Error),
}

impl DeliveryError {
    /// Transport failures and 5xx answers are worth another attempt.
    fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Unreachable { .. } => true,
            DeliveryError::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// HTTP delivery of report jobs to the collector.
pub struct MetricSender {
    client: reqwest::Client,
    update_url: String,
    updates_url: String,
    key: Option<String>,
    attempts: u32,
    base_delay: Duration,
}

impl MetricSender {
    pub fn new(config: &AgentConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let base = config.base_url();
        Ok(Self {
            client,
            update_url: format!("{base}/update"),
            updates_url: format!("{base}/updates/"),
            key: config.signing_key().map(str::to_string),
            attempts: config.delivery_attempts.max(1),
            base_delay: Duration::from_millis(100),
        })
    }

    /// Base of the exponential backoff between attempts (`base * 2^attempt`).
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Posts every metric to `/update`, then the whole set to `/updates/`.
    /// The report counts as delivered only if every request succeeded.
    pub async fn send_report(&self, report: &ReportJob) -> Result<(), DeliveryError> {
        let metrics = report.metrics();
        for metric in &metrics {
            self.post_json(&self.update_url, metric).await?;
        }
        self.post_json(&self.updates_url, &metrics).await?;
        tracing::debug!(count = metrics.len(), "Report sent");
        Ok(())
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<(), DeliveryError> {
        let body = codec::encode(payload)?;
        let signature = self
            .key
            .as_deref()
            .map(|key| codec::sign(&body, key.as_bytes()));
        let compressed = codec::compress(&body)?;

        let mut attempt = 0u32;
        loop {
            match self.post_once(url, &compressed, signature.as_deref()).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt + 1 < self.attempts => {
                    let delay = self.base_delay * 2u32.pow(attempt);
                    tracing::warn!(
                        url,
                        attempt = attempt + 1,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "Delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_once(
        &self,
        url: &str,
        compressed: &[u8],
        signature: Option<&str>,
    ) -> Result<(), DeliveryError> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, codec::GZIP)
            .header(ACCEPT_ENCODING, codec::GZIP)
            .body(compressed.to_vec());
        if let Some(signature) = signature {
            request = request.header(codec::HASH_HEADER, signature);
        }

        let unreachable = |source| DeliveryError::Unreachable {
            url: url.to_string(),
            source,
        };
        let response = request.send().await.map_err(unreachable)?;

        let status = response.status();
        let gzipped = response
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .is_some_and(codec::lists_gzip);
        let response_signature = response
            .headers()
            .get(codec::HASH_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let raw = response.bytes().await.map_err(unreachable)?;
        let body = if gzipped {
            codec::decompress(&raw)?
        } else {
            raw.to_vec()
        };

        if !status.is_success() {
            return Err(DeliveryError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        if let (Some(key), Some(signature)) = (self.key.as_deref(), response_signature) {
            if !codec::verify(&body, &signature, key.as_bytes()) {
                tracing::warn!(url, "Response signature mismatch");
                return Err(CodecError::IntegrityMismatch.into());
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CaptureServer, Responder};
    use std::collections::HashMap;
    use tally_common::Metric;

    fn sender_for(server: &CaptureServer, key: Option<&str>, attempts: u32) -> MetricSender {
        let config = AgentConfig {
            server_address: server.address(),
            key: key.map(str::to_string),
            delivery_attempts: attempts,
            ..AgentConfig::default()
        };
        MetricSender::new(&config)
            .unwrap()
            .with_base_delay(Duration::from_millis(1))
    }

    fn report() -> ReportJob {
        ReportJob {
            snapshot: HashMap::from([
                ("Alloc".to_string(), 15.135),
                ("RandomValue".to_string(), 0.25),
            ]),
            poll_count: 3,
        }
    }

    #[tokio::test]
    async fn report_posts_each_metric_then_batch() {
        let server = CaptureServer::start(Responder::Ok).await;
        sender_for(&server, None, 3).send_report(&report()).await.unwrap();

        let requests = server.requests();
        let paths: Vec<_> = requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, ["/update", "/update", "/update", "/updates/"]);

        let single: Metric = tally_common::codec::decode(&requests[2].body).unwrap();
        assert_eq!(single, Metric::counter("PollCount", 3));

        let batch: Vec<Metric> = tally_common::codec::decode(&requests[3].body).unwrap();
        assert_eq!(
            batch,
            vec![
                Metric::gauge("Alloc", 15.135),
                Metric::gauge("RandomValue", 0.25),
                Metric::counter("PollCount", 3),
            ]
        );

        for request in &requests {
            assert_eq!(request.content_encoding.as_deref(), Some("gzip"));
            assert!(request.signature.is_none());
        }
    }

    #[tokio::test]
    async fn signs_uncompressed_payload() {
        let server = CaptureServer::start(Responder::Ok).await;
        sender_for(&server, Some("secret"), 3)
            .send_report(&report())
            .await
            .unwrap();

        for request in server.requests() {
            let signature = request.signature.expect("signature header");
            assert!(codec::verify(&request.body, &signature, b"secret"));
        }
    }

    #[tokio::test]
    async fn retries_server_errors_within_budget() {
        let server = CaptureServer::start(Responder::FailFirst(2)).await;
        let sender = sender_for(&server, None, 3);
        sender
            .post_json(&sender.update_url, &Metric::gauge("Alloc", 1.0))
            .await
            .unwrap();
        assert_eq!(server.requests().len(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let server = CaptureServer::start(Responder::FailFirst(10)).await;
        let sender = sender_for(&server, None, 3);
        let err = sender
            .post_json(&sender.update_url, &Metric::gauge("Alloc", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Status { status: 500, .. }));
        assert_eq!(server.requests().len(), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = CaptureServer::start(Responder::BadRequest).await;
        let err = sender_for(&server, None, 3)
            .send_report(&report())
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Status { status: 400, .. }));
        assert_eq!(server.requests().len(), 1);
    }

    #[tokio::test]
    async fn rejects_tampered_response_signature() {
        let server = CaptureServer::start(Responder::BadSignature).await;
        let err = sender_for(&server, Some("secret"), 3)
            .send_report(&report())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Codec(CodecError::IntegrityMismatch)
        ));
    }

    #[tokio::test]
    async fn unreachable_collector_fails() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let config = AgentConfig {
            server_address: address,
            ..AgentConfig::default()
        };
        let sender = MetricSender::new(&config)
            .unwrap()
            .with_base_delay(Duration::from_millis(1));
        let err = sender.send_report(&report()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::Unreachable { .. }));
    }
}
