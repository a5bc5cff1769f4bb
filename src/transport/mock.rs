//! A scripted transport, suitable for testing session and interceptor behavior
//! without touching the network.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_core::future::BoxFuture;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Version};
use http_body_util::BodyExt as _;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::body::UploadAborted;
use crate::error::{ErrorKind, TransferError};

use super::{Progress, Transport, TransferReport, TransferRequest, TransferSink};

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
    chunks: Vec<Bytes>,
    chunk_delay: Option<Duration>,
    error: Option<TransferError>,
    redirect: Option<(String, u32)>,
}

impl MockResponse {
    /// A reply with the given status code and no body.
    pub fn new(status: u16) -> Self {
        let reason = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|status| status.canonical_reason())
            .unwrap_or_default()
            .to_owned();

        Self {
            status,
            reason,
            headers: Vec::new(),
            chunks: Vec::new(),
            chunk_delay: None,
            error: None,
            redirect: None,
        }
    }

    /// A `200 OK` reply with `body` delivered in one chunk.
    pub fn ok<B: Into<Bytes>>(body: B) -> Self {
        Self::new(200).chunk(body)
    }

    /// A reply that fails before any response arrives.
    pub fn failure(error: TransferError) -> Self {
        let mut response = Self::new(0);
        response.reason.clear();
        response.error = Some(error);
        response
    }

    /// Add a response header.
    pub fn header<N: Into<String>, V: Into<String>>(mut self, name: N, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Append a body chunk. Chunks are delivered to the sink one at a time.
    pub fn chunk<B: Into<Bytes>>(mut self, chunk: B) -> Self {
        self.chunks.push(chunk.into());
        self
    }

    /// Wait this long before delivering each chunk.
    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Fail with `error` after all chunks were delivered.
    pub fn error(mut self, error: TransferError) -> Self {
        self.error = Some(error);
        self
    }

    /// Report the reply as the result of `count` redirects ending at `url`.
    pub fn redirected<S: Into<String>>(mut self, url: S, count: u32) -> Self {
        self.redirect = Some((url.into(), count));
        self
    }
}

/// A request seen by a [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Request method.
    pub method: Method,
    /// Request URL, including the query string.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// The full request body.
    pub body: Bytes,
}

#[derive(Debug, Default)]
struct Script {
    queue: VecDeque<MockResponse>,
    fallback: Option<MockResponse>,
    requests: Vec<RecordedRequest>,
}

/// A transport which replays scripted replies in order.
///
/// Clones share the same script and request log, so a test can keep one handle
/// while a session owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
}

impl MockTransport {
    /// A transport with an empty script. Transfers fail with
    /// [`ErrorKind::Internal`] until replies are queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport which answers every request with `response`.
    pub fn always(response: MockResponse) -> Self {
        let transport = Self::new();
        transport.script.lock().fallback = Some(response);
        transport
    }

    /// Queue a reply for the next unanswered request.
    pub fn respond(&self, response: MockResponse) -> &Self {
        self.script.lock().queue.push_back(response);
        self
    }

    /// Requests performed so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.script.lock().requests.clone()
    }

    fn next_response(&self) -> Option<MockResponse> {
        let mut script = self.script.lock();
        script.queue.pop_front().or_else(|| script.fallback.clone())
    }
}

impl Transport for MockTransport {
    fn perform<'t>(
        &'t mut self,
        request: TransferRequest,
        sink: &'t mut dyn TransferSink,
    ) -> BoxFuture<'t, TransferReport> {
        Box::pin(async move {
            let started = Instant::now();
            let cancel = request.cancel.clone();
            let mut report = TransferReport {
                effective_url: request.url.clone(),
                ..Default::default()
            };

            let outcome = if cancel.is_cancelled() {
                Err(TransferError::cancelled())
            } else {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(TransferError::cancelled()),
                    outcome = self.replay(request, &mut *sink, &mut report) => outcome,
                }
            };

            if matches!(&outcome, Err(error) if error.kind() == ErrorKind::Cancelled) {
                cancel.acknowledge();
            }

            report.status = outcome;
            report.elapsed = started.elapsed();
            report
        })
    }
}

impl MockTransport {
    async fn replay(
        &self,
        request: TransferRequest,
        sink: &mut dyn TransferSink,
        report: &mut TransferReport,
    ) -> Result<(), TransferError> {
        let TransferRequest {
            method,
            url,
            headers,
            body,
            ..
        } = request;

        let upload = body.collect().await.map_err(|error| {
            if error.downcast_ref::<UploadAborted>().is_some() {
                TransferError::callback_abort()
            } else {
                TransferError::new(ErrorKind::SendFailure, error.to_string())
            }
        })?;
        let upload = upload.to_bytes();
        report.uploaded = upload.len() as u64;

        self.script.lock().requests.push(RecordedRequest {
            method,
            url,
            headers,
            body: upload,
        });

        let Some(response) = self.next_response() else {
            return Err(TransferError::new(
                ErrorKind::Internal,
                "no scripted response left",
            ));
        };
        tracing::trace!(status = response.status, "replaying scripted response");

        if response.status == 0 {
            return response.error.map_or(Ok(()), Err);
        }

        report.status_code = response.status;
        report.reason = response.reason.clone();
        report.version = Some(Version::HTTP_11);
        if let Some((url, count)) = &response.redirect {
            report.effective_url = url.clone();
            report.redirect_count = *count;
        }

        let status_line = format!("HTTP/1.1 {} {}\r\n", response.status, response.reason);
        if !sink.on_header(&status_line) {
            return Err(TransferError::callback_abort());
        }
        for (name, value) in &response.headers {
            if !sink.on_header(&format!("{name}: {value}\r\n")) {
                return Err(TransferError::callback_abort());
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                report.headers.append(name, value);
            }
        }
        if !sink.on_header("\r\n") {
            return Err(TransferError::callback_abort());
        }

        let total: u64 = response.chunks.iter().map(|chunk| chunk.len() as u64).sum();
        for chunk in &response.chunks {
            if let Some(delay) = response.chunk_delay {
                tokio::time::sleep(delay).await;
            }

            report.downloaded += chunk.len() as u64;
            if !sink.on_data(chunk) {
                return Err(TransferError::callback_abort());
            }

            let progress = Progress {
                download_total: Some(total),
                download_now: report.downloaded,
                upload_total: Some(report.uploaded),
                upload_now: report.uploaded,
            };
            if !sink.on_progress(progress) {
                return Err(TransferError::callback_abort());
            }
        }

        response.error.map_or(Ok(()), Err)
    }
}
