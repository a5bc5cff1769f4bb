//! Error types.
//!
//! Failures that happen on the wire (connect errors, timeouts, callbacks asking to
//! stop) are never returned as `Err`: they are captured in the [`TransferError`]
//! carried by every [`Response`][crate::Response]. Only mistakes in how a request
//! was configured surface as [`Error`] from the verb call itself.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Classification of a transfer outcome.
///
/// Each kind carries a stable numeric code, available via [`ErrorKind::code`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The transfer completed.
    #[default]
    Ok,
    /// A TCP connection could not be established.
    ConnectionFailure,
    /// The server closed the connection without sending a response.
    EmptyResponse,
    /// The host name could not be resolved.
    HostResolutionFailure,
    /// An internal error in the client.
    Internal,
    /// The URL could not be parsed or uses an unknown scheme.
    InvalidUrl,
    /// Reading the response failed mid-transfer.
    ReceiveError,
    /// Sending the request failed.
    SendFailure,
    /// A configured timeout elapsed.
    Timeout,
    /// The proxy refused or failed to tunnel the request.
    ProxyFailure,
    /// The TLS handshake or certificate validation failed.
    Tls,
    /// The scheme or HTTP version is not supported by the transport.
    UnsupportedProtocol,
    /// The redirect limit was exceeded.
    TooManyRedirects,
    /// A user callback returned `false`.
    CallbackAbort,
    /// The transfer was cancelled through its cancellation token.
    Cancelled,
    /// Any other failure.
    Unknown,
}

impl ErrorKind {
    /// Numeric code for this kind. `0` means success.
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::Ok => 0,
            ErrorKind::ConnectionFailure => 1,
            ErrorKind::EmptyResponse => 2,
            ErrorKind::HostResolutionFailure => 3,
            ErrorKind::Internal => 4,
            ErrorKind::InvalidUrl => 5,
            ErrorKind::ReceiveError => 6,
            ErrorKind::SendFailure => 7,
            ErrorKind::Timeout => 8,
            ErrorKind::ProxyFailure => 9,
            ErrorKind::Tls => 10,
            ErrorKind::UnsupportedProtocol => 11,
            ErrorKind::TooManyRedirects => 12,
            ErrorKind::CallbackAbort => 13,
            ErrorKind::Cancelled => 14,
            ErrorKind::Unknown => 1000,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Ok => "ok",
            ErrorKind::ConnectionFailure => "connection failure",
            ErrorKind::EmptyResponse => "empty response",
            ErrorKind::HostResolutionFailure => "host resolution failure",
            ErrorKind::Internal => "internal error",
            ErrorKind::InvalidUrl => "invalid url",
            ErrorKind::ReceiveError => "receive error",
            ErrorKind::SendFailure => "send failure",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ProxyFailure => "proxy failure",
            ErrorKind::Tls => "tls error",
            ErrorKind::UnsupportedProtocol => "unsupported protocol",
            ErrorKind::TooManyRedirects => "too many redirects",
            ErrorKind::CallbackAbort => "aborted by callback",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error descriptor of a finished transfer.
///
/// A default descriptor has kind [`ErrorKind::Ok`] and an empty message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransferError {
    kind: ErrorKind,
    message: String,
}

impl TransferError {
    /// Create a descriptor of the given kind.
    pub fn new<S: Into<String>>(kind: ErrorKind, message: S) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Shorthand for a failed transfer that wraps a source error.
    pub(crate) fn build<E>(kind: ErrorKind, context: &str, error: E) -> Self
    where
        E: std::error::Error,
    {
        Self::new(kind, format!("{context}: {error}"))
    }

    /// Returns a closure for use with `map_err`.
    pub(crate) fn msg<E>(kind: ErrorKind, context: &'static str) -> impl FnOnce(E) -> Self
    where
        E: std::error::Error,
    {
        move |error| Self::build(kind, context, error)
    }

    pub(crate) fn callback_abort() -> Self {
        Self::new(ErrorKind::CallbackAbort, "transfer aborted by callback")
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "transfer cancelled")
    }

    /// The kind of failure, or [`ErrorKind::Ok`].
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Numeric code of the kind.
    pub fn code(&self) -> u32 {
        self.kind.code()
    }

    /// Human readable detail. Empty on success.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the transfer did not fail.
    pub fn is_ok(&self) -> bool {
        self.kind == ErrorKind::Ok
    }
}

/// A session was configured in a way that can not be executed.
///
/// Raised at prepare time, before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// A write callback and an SSE callback are both installed.
    #[error("a write callback and an SSE callback can not both be configured")]
    ConflictingSinks,

    /// A batch mixes download entries with other verbs.
    #[error("download entries can not be mixed with other verbs in one batch")]
    MixedDownload,

    /// A download was requested without a write callback to receive the body.
    #[error("download requires a write callback")]
    MissingDownloadSink,

    /// A configured header name is not valid HTTP.
    #[error("invalid header name: {0:?}")]
    InvalidHeaderName(String),

    /// A configured header value is not valid HTTP.
    #[error("invalid value for header {0:?}")]
    InvalidHeaderValue(String),

    /// A multipart file part could not be read.
    #[error("multipart file {path:?}: {message}")]
    MultipartFile {
        /// Path of the file.
        path: String,
        /// Reason the read failed.
        message: String,
    },
}

/// Error returned by verb calls and interceptors.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// The request configuration is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// An interceptor failed without producing a response.
    #[error("interceptor: {0}")]
    Interceptor(Arc<dyn std::error::Error + Send + Sync + 'static>),
}

impl Error {
    /// Wrap an arbitrary error raised by an interceptor.
    pub fn interceptor<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync + 'static>>,
    {
        Error::Interceptor(Arc::from(error.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use static_assertions::assert_impl_all;

    assert_impl_all!(Error: Send, Sync, Clone);
    assert_impl_all!(TransferError: Send, Sync, Clone, Default);

    #[test]
    fn default_descriptor_is_ok() {
        let error = TransferError::default();
        assert!(error.is_ok());
        assert_eq!(error.code(), 0);
        assert_eq!(error.message(), "");
    }

    #[test]
    fn codes_are_distinct() {
        let kinds = [
            ErrorKind::Ok,
            ErrorKind::ConnectionFailure,
            ErrorKind::EmptyResponse,
            ErrorKind::HostResolutionFailure,
            ErrorKind::Internal,
            ErrorKind::InvalidUrl,
            ErrorKind::ReceiveError,
            ErrorKind::SendFailure,
            ErrorKind::Timeout,
            ErrorKind::ProxyFailure,
            ErrorKind::Tls,
            ErrorKind::UnsupportedProtocol,
            ErrorKind::TooManyRedirects,
            ErrorKind::CallbackAbort,
            ErrorKind::Cancelled,
            ErrorKind::Unknown,
        ];
        let mut codes: Vec<u32> = kinds.iter().map(|k| k.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let error = TransferError::new(ErrorKind::Timeout, "after 10 ms");
        assert_eq!(error.to_string(), "timeout: after 10 ms");
    }

    #[test]
    fn interceptor_error_wraps_message() {
        let error = Error::interceptor("retry budget exhausted");
        assert_eq!(error.to_string(), "interceptor: retry budget exhausted");
    }
}
