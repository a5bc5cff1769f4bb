//! The network layer driven by a [`Session`](crate::Session).
//!
//! A [`Transport`] performs one configured transfer at a time. While it runs it
//! reports what it receives through a [`TransferSink`], and when it finishes it
//! returns a [`TransferReport`] with the raw outcome. Failures are part of the
//! report, never a panic or an early return.
//!
//! [`HyperTransport`] is the default implementation. With the `mocks` feature a
//! scripted [`MockTransport`](mock::MockTransport) is available for tests.

use std::fmt;
use std::time::Duration;

use futures_core::future::BoxFuture;
use http::{HeaderMap, Method, Version};

use crate::body::RequestBody;
use crate::cancel::CancelToken;
use crate::error::TransferError;
pub use crate::options::TransportOptions;

mod connect;
mod engine;
#[cfg(any(test, feature = "mocks"))]
pub mod mock;
#[cfg(feature = "tls")]
mod tls;

pub use self::engine::{HyperTransport, TransportConfig};

/// Byte counters passed to progress observers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Expected response body size, when announced.
    pub download_total: Option<u64>,
    /// Response body bytes received so far.
    pub download_now: u64,
    /// Expected request body size, when known.
    pub upload_total: Option<u64>,
    /// Request body bytes sent so far.
    pub upload_now: u64,
}

/// What a debug trace entry contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebugKind {
    /// Informational text from the transport.
    Text,
    /// Response status line and headers.
    HeaderIn,
    /// Request line and headers.
    HeaderOut,
    /// Response body bytes.
    DataIn,
    /// Request body bytes.
    DataOut,
}

/// Receives events while a transfer runs.
///
/// Methods returning `bool` stop the transfer when they return `false`, and the
/// transfer then finishes with [`ErrorKind::CallbackAbort`](crate::ErrorKind::CallbackAbort).
pub trait TransferSink: Send {
    /// One response header line, including the status line and the final blank
    /// line, each with its trailing `\r\n`.
    fn on_header(&mut self, line: &str) -> bool;

    /// A chunk of the response body, in transfer order.
    fn on_data(&mut self, data: &[u8]) -> bool;

    /// Updated byte counters.
    fn on_progress(&mut self, progress: Progress) -> bool {
        let _ = progress;
        true
    }

    /// A debug trace entry.
    fn on_debug(&mut self, kind: DebugKind, data: &[u8]) {
        let _ = (kind, data);
    }
}

/// A fully prepared request.
#[derive(Debug)]
pub struct TransferRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL, including query parameters. Validated by the transport.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: RequestBody,
    /// Network settings.
    pub options: TransportOptions,
    /// Cancellation signal checked while the transfer runs.
    pub cancel: CancelToken,
}

/// The raw outcome of a transfer.
#[derive(Debug, Clone)]
pub struct TransferReport {
    /// `Ok` when the transfer completed, otherwise the reason it did not.
    pub status: Result<(), TransferError>,
    /// Final HTTP status code, `0` when no response was received.
    pub status_code: u16,
    /// Reason phrase of the final response.
    pub reason: String,
    /// URL of the final response, after redirects.
    pub effective_url: String,
    /// Headers of the final response.
    pub headers: HeaderMap,
    /// Protocol version of the final response.
    pub version: Option<Version>,
    /// Number of redirects followed.
    pub redirect_count: u32,
    /// Request body bytes sent.
    pub uploaded: u64,
    /// Response body bytes received.
    pub downloaded: u64,
    /// Time from the start of the transfer until it finished.
    pub elapsed: Duration,
}

impl Default for TransferReport {
    fn default() -> Self {
        Self {
            status: Ok(()),
            status_code: 0,
            reason: String::new(),
            effective_url: String::new(),
            headers: HeaderMap::new(),
            version: None,
            redirect_count: 0,
            uploaded: 0,
            downloaded: 0,
            elapsed: Duration::ZERO,
        }
    }
}

impl TransferReport {
    /// A report for a transfer that failed before any response arrived.
    pub fn failed<S: Into<String>>(url: S, error: TransferError) -> Self {
        Self {
            status: Err(error),
            effective_url: url.into(),
            ..Default::default()
        }
    }

    /// The error descriptor, [`ErrorKind::Ok`](crate::ErrorKind::Ok) on success.
    pub fn error(&self) -> TransferError {
        match &self.status {
            Ok(()) => TransferError::default(),
            Err(error) => error.clone(),
        }
    }
}

/// Performs transfers.
///
/// A transport is owned by one session at a time and performs one transfer at a
/// time; the `&mut self` receiver enforces this. It may keep state between
/// transfers.
pub trait Transport: Send + fmt::Debug {
    /// Run `request` to completion, reporting progress to `sink`.
    fn perform<'t>(
        &'t mut self,
        request: TransferRequest,
        sink: &'t mut dyn TransferSink,
    ) -> BoxFuture<'t, TransferReport>;
}

impl<T> Transport for Box<T>
where
    T: Transport + ?Sized,
{
    fn perform<'t>(
        &'t mut self,
        request: TransferRequest,
        sink: &'t mut dyn TransferSink,
    ) -> BoxFuture<'t, TransferReport> {
        (**self).perform(request, sink)
    }
}
