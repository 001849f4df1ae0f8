//! Streaming transport for catalog archives.
//!
//! [`Transport`] fetches a remote resource chunk by chunk with byte-level
//! progress reporting and decompresses gzip payloads incrementally. Both
//! operations check a [`CancellationToken`] between chunks, so a caller can
//! abort a long download without committing any partial state downstream.

use std::io::Read;

use bytes::{Bytes, BytesMut};
use flate2::read::GzDecoder;
use futures::StreamExt;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Emit download progress at least every this many percent when the total
/// size is known.
const PROGRESS_PERCENT_STEP: u64 = 5;

/// Emit download progress every this many bytes when the total size is
/// unknown.
const PROGRESS_BYTE_STEP: u64 = 50 * 1024;

/// Read size for streaming decompression.
const DECOMPRESS_CHUNK: usize = 64 * 1024;

/// Primary error type for the [`Transport`]
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to send GET {url} request: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server responded with status {code} for {url}")]
    Status { code: StatusCode, url: String },

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("failed to decompress gzip stream: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("decompressed data is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T, E = TransportError> = std::result::Result<T, E>;

/// HTTP transport with chunked reads, progress reporting, and cooperative
/// cancellation.
#[derive(Debug, Clone, Default)]
pub struct Transport {
    http_client: reqwest::Client,
}

impl Transport {
    /// Create a new [`Transport`] with a default HTTP client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch `url`, reading the response body incrementally.
    ///
    /// `report` receives `(percent, message)` pairs: at least every 5% of
    /// the total when the server sends a content length, otherwise every
    /// 50 KiB, and always a final 100%. Fails with
    /// [`TransportError::Status`] on a non-success response, naming the
    /// status code, and with [`TransportError::Cancelled`] when `cancel`
    /// fires between chunks.
    pub async fn fetch_with_progress<F>(
        &self,
        url: &str,
        cancel: &CancellationToken,
        report: F,
    ) -> Result<Bytes>
    where
        F: Fn(u8, &str) + Send + Sync,
    {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })?;
        let code = response.status();
        if !code.is_success() {
            return Err(TransportError::Status {
                code,
                url: url.to_string(),
            });
        }

        let total = response.content_length().filter(|len| *len > 0);
        let mut body = match total {
            Some(len) => BytesMut::with_capacity(len as usize),
            None => BytesMut::new(),
        };
        let mut last_percent = 0u64;
        let mut last_reported_bytes = 0u64;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                debug!(url, "download cancelled");
                return Err(TransportError::Cancelled);
            }
            let chunk = chunk.map_err(TransportError::Body)?;
            body.extend_from_slice(&chunk);
            let received = body.len() as u64;

            match total {
                Some(total) => {
                    let percent = received * 100 / total;
                    if percent >= last_percent + PROGRESS_PERCENT_STEP {
                        last_percent = percent;
                        report(
                            percent.min(100) as u8,
                            &format!("Read {} of {}", kib(received), kib(total)),
                        );
                    }
                }
                None => {
                    if received >= last_reported_bytes + PROGRESS_BYTE_STEP {
                        last_reported_bytes = received;
                        let estimate = (received / PROGRESS_BYTE_STEP).min(99) as u8;
                        report(estimate, &format!("Read {}", kib(received)));
                    }
                }
            }
        }

        let received = body.len() as u64;
        report(100, &format!("Read {}", kib(received)));
        debug!(url, bytes = received, "download complete");
        Ok(body.freeze())
    }

    /// Decompress a gzip payload incrementally, reporting progress over the
    /// decompressed byte count, and return the UTF-8 text.
    ///
    /// The input length is used to estimate the decompressed size for the
    /// percent value; the final report is always 100. Yields to the
    /// scheduler between chunks and fails with
    /// [`TransportError::Cancelled`] when `cancel` fires.
    pub async fn decompress_with_progress<F>(
        &self,
        compressed: &[u8],
        cancel: &CancellationToken,
        report: F,
    ) -> Result<String>
    where
        F: Fn(u8, &str) + Send + Sync,
    {
        let estimated_total = (compressed.len() as u64).saturating_mul(4).max(1);
        let mut decoder = GzDecoder::new(compressed);
        let mut out = Vec::new();
        let mut buf = vec![0u8; DECOMPRESS_CHUNK];
        let mut last_percent = 0u64;

        loop {
            if cancel.is_cancelled() {
                debug!("decompression cancelled");
                return Err(TransportError::Cancelled);
            }
            let n = decoder.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);

            let decompressed = out.len() as u64;
            let percent = (decompressed * 100 / estimated_total).min(99);
            if percent >= last_percent + PROGRESS_PERCENT_STEP {
                last_percent = percent;
                report(percent as u8, &format!("Decompressed {}", kib(decompressed)));
            }
            tokio::task::yield_now().await;
        }

        report(100, &format!("Decompressed {}", kib(out.len() as u64)));
        Ok(String::from_utf8(out)?)
    }
}

fn kib(bytes: u64) -> String {
    format!("{} KiB", bytes.div_ceil(1024))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use flate2::Compression;
    use flate2::write::GzEncoder;
    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct Reports(Mutex<Vec<u8>>);

    impl Reports {
        fn push(&self, percent: u8) {
            self.0.lock().unwrap().push(percent);
        }

        fn percents(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test_log::test(tokio::test)]
    async fn fetch_returns_body_and_final_progress() {
        let mut server = mockito::Server::new_async().await;
        let body = vec![7u8; 256 * 1024];
        let mock = server
            .mock("GET", "/catalog.lcx.json.gz")
            .with_status(200)
            .with_body(body.clone())
            .create_async()
            .await;

        let transport = Transport::new();
        let reports = Reports::default();
        let url = format!("{}/catalog.lcx.json.gz", server.url());
        let fetched = transport
            .fetch_with_progress(&url, &CancellationToken::new(), |pct, _msg| {
                reports.push(pct);
            })
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(fetched.len(), body.len());
        let percents = reports.percents();
        assert_eq!(percents.last(), Some(&100));
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test_log::test(tokio::test)]
    async fn fetch_fails_with_status_code_on_http_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .create_async()
            .await;

        let transport = Transport::new();
        let url = format!("{}/missing", server.url());
        let err = transport
            .fetch_with_progress(&url, &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();

        match err {
            TransportError::Status { code, .. } => assert_eq!(code, StatusCode::NOT_FOUND),
            other => panic!("expected Status error, got {other:?}"),
        }
        assert!(err.to_string().contains("404"));
    }

    #[test_log::test(tokio::test)]
    async fn fetch_honors_cancellation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/catalog")
            .with_status(200)
            .with_body("payload")
            .create_async()
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let transport = Transport::new();
        let url = format!("{}/catalog", server.url());
        let err = transport
            .fetch_with_progress(&url, &cancel, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }

    #[test_log::test(tokio::test)]
    async fn decompress_round_trips_text() {
        let text = "{\"hello\": \"bricks\"}".repeat(20_000);
        let compressed = gzip(text.as_bytes());

        let transport = Transport::new();
        let reports = Reports::default();
        let decompressed = transport
            .decompress_with_progress(&compressed, &CancellationToken::new(), |pct, _msg| {
                reports.push(pct);
            })
            .await
            .unwrap();

        assert_eq!(decompressed, text);
        assert_eq!(reports.percents().last(), Some(&100));
    }

    #[test_log::test(tokio::test)]
    async fn decompress_honors_cancellation() {
        let compressed = gzip(b"data");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let transport = Transport::new();
        let err = transport
            .decompress_with_progress(&compressed, &cancel, |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Cancelled));
    }

    #[test_log::test(tokio::test)]
    async fn decompress_rejects_corrupt_input() {
        let transport = Transport::new();
        let err = transport
            .decompress_with_progress(b"not gzip at all", &CancellationToken::new(), |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Decompress(_)));
    }
}
