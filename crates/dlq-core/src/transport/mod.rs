//! HTTP transport: HEAD probing and resumable, streamed GETs.

pub mod resume_token;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

pub use resume_token::{ResumeToken, Validator};

use crate::retry::TransportError;

/// Result of a HEAD probe: the metadata needed to plan and safely resume a
/// download.
#[derive(Debug, Clone)]
pub struct HeadResult {
    pub content_length: Option<i64>,
    pub accept_ranges: bool,
    pub validator: Validator,
}

/// A single fetch to perform: where to write, and what (if anything) to
/// resume from.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub task_id: Uuid,
    pub url: String,
    pub dest_tmp_path: PathBuf,
    pub resume: Option<ResumeToken>,
}

/// Emitted on the progress channel as bytes arrive; the scheduler folds
/// these into `DownloadTask::bytes_downloaded` and the Aggregator's
/// sliding window.
#[derive(Debug, Clone, Copy)]
pub struct TransportEvent {
    pub bytes_downloaded: i64,
    pub total_bytes: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub bytes_downloaded: i64,
    pub total_bytes: i64,
    pub validator: Validator,
}

/// Abstraction over "talk to the network", so the scheduler can be driven
/// by a fake implementation in tests without a real server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn probe(&self, url: &str) -> Result<HeadResult, TransportError>;

    /// Streams `request.url` into `request.dest_tmp_path`, appending if
    /// `request.resume` is set and still valid. `cancel` flips to `true` on
    /// pause or user cancellation; the fetch stops at the next chunk
    /// boundary and returns `TransportError::Cancelled`.
    async fn fetch(
        &self,
        request: FetchRequest,
        progress: mpsc::UnboundedSender<TransportEvent>,
        cancel: watch::Receiver<bool>,
    ) -> Result<FetchOutcome, TransportError>;
}

/// `reqwest`-backed Transport. One `Client` is shared across every task so
/// connections pool.
pub struct HttpTransport {
    client: reqwest::Client,
    stall_timeout: Duration,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, stall_timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| TransportError::InternalInvariant(e.to_string()))?;
        Ok(Self { client, stall_timeout })
    }

    /// `retry::classify`'s `parse_retry_after` looks for a `"retry after
    /// <seconds>"` token in the message; this appends it whenever the
    /// server sent a delta-seconds `Retry-After` header (the HTTP-date form
    /// isn't handled, same limitation as the parser).
    fn retry_after_suffix(headers: &reqwest::header::HeaderMap) -> String {
        headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(|secs| format!(" (retry after {secs})"))
            .unwrap_or_default()
    }

    fn to_transport_error(err: reqwest::Error) -> TransportError {
        if err.is_connect() || err.is_timeout() {
            TransportError::ConnectionLost(err.to_string())
        } else if let Some(status) = err.status() {
            TransportError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            TransportError::NetworkUnavailable
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self, url: &str) -> Result<HeadResult, TransportError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(Self::to_transport_error)?;

        if !response.status().is_success() {
            let suffix = Self::retry_after_suffix(response.headers());
            return Err(TransportError::Http {
                status: response.status().as_u16(),
                message: format!("{}{suffix}", response.status()),
            });
        }

        let headers = response.headers();
        let content_length = response.content_length().map(|n| n as i64);
        let accept_ranges = headers
            .get(reqwest::header::ACCEPT_RANGES)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("bytes"))
            .unwrap_or(false);
        let etag = headers
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = headers
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(HeadResult {
            content_length,
            accept_ranges,
            validator: Validator { etag, last_modified },
        })
    }

    async fn fetch(
        &self,
        request: FetchRequest,
        progress: mpsc::UnboundedSender<TransportEvent>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<FetchOutcome, TransportError> {
        let resume_from = request.resume.as_ref().map(|r| r.next_offset).unwrap_or(0);

        let mut builder = self.client.get(&request.url);
        if resume_from > 0 {
            builder = builder.header(reqwest::header::RANGE, format!("bytes={resume_from}-"));
        }

        let response = builder.send().await.map_err(Self::to_transport_error)?;

        if resume_from > 0 && response.status() != reqwest::StatusCode::PARTIAL_CONTENT {
            // Server ignored our Range header; the file behind this URL is
            // no longer resumable from where we left off.
            return Err(TransportError::ValidatorChanged);
        }
        if !response.status().is_success() && response.status() != reqwest::StatusCode::PARTIAL_CONTENT {
            let suffix = Self::retry_after_suffix(response.headers());
            return Err(TransportError::Http {
                status: response.status().as_u16(),
                message: format!("{}{suffix}", response.status()),
            });
        }

        let headers = response.headers().clone();
        let etag = headers
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = headers
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let validator = Validator { etag, last_modified };

        if let Some(token) = &request.resume {
            if token.validator.changed(&validator) {
                return Err(TransportError::ValidatorChanged);
            }
        }

        let body_len = response.content_length().map(|n| n as i64).unwrap_or(0);
        let total_bytes = resume_from + body_len;

        if let Some(parent) = request.dest_tmp_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TransportError::DiskIo(e.to_string()))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&request.dest_tmp_path)
            .await
            .map_err(|e| TransportError::DiskIo(e.to_string()))?;
        file.seek(std::io::SeekFrom::Start(resume_from as u64))
            .await
            .map_err(|e| TransportError::DiskIo(e.to_string()))?;

        let mut bytes_downloaded = resume_from;
        let mut stream = response.bytes_stream();

        loop {
            if *cancel.borrow() {
                file.flush().await.ok();
                return Err(TransportError::Cancelled);
            }

            let next = tokio::time::timeout(self.stall_timeout, stream.next());
            let chunk = match next.await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(Self::to_transport_error(e)),
                Ok(None) => break,
                Err(_) => return Err(TransportError::ConnectionLost("stalled: no bytes received".into())),
            };

            file.write_all(&chunk).await.map_err(|_| TransportError::DiskFull {
                path: request.dest_tmp_path.display().to_string(),
            })?;
            bytes_downloaded += chunk.len() as i64;

            let _ = progress.send(TransportEvent {
                bytes_downloaded,
                total_bytes: if total_bytes > 0 { Some(total_bytes) } else { None },
            });
        }

        file.flush().await.map_err(|e| TransportError::DiskIo(e.to_string()))?;

        Ok(FetchOutcome {
            bytes_downloaded,
            total_bytes: if total_bytes > 0 { total_bytes } else { bytes_downloaded },
            validator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_tracks_etag_and_last_modified_independently() {
        let probed = HeadResult {
            content_length: Some(1024),
            accept_ranges: true,
            validator: Validator {
                etag: Some("\"abc\"".into()),
                last_modified: Some("Tue, 01 Jan 2030 00:00:00 GMT".into()),
            },
        };
        assert!(probed.accept_ranges);
        assert_eq!(probed.content_length, Some(1024));
    }

    #[test]
    fn retry_after_suffix_reads_delta_seconds_header() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(HttpTransport::retry_after_suffix(&headers), " (retry after 30)");
    }

    #[test]
    fn retry_after_suffix_is_empty_without_the_header() {
        let headers = reqwest::header::HeaderMap::new();
        assert_eq!(HttpTransport::retry_after_suffix(&headers), "");
    }

    #[test]
    fn retry_after_suffix_round_trips_through_classify() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "30".parse().unwrap());
        let message = format!("429 Too Many Requests{}", HttpTransport::retry_after_suffix(&headers));
        let err = TransportError::Http { status: 429, message };
        match crate::retry::classify(&err) {
            crate::retry::ErrorKind::HttpTransient { retry_after: Some(30), .. } => {}
            other => panic!("unexpected: {other:?}"),
        }
    }
}
