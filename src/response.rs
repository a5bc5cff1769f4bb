//! The result record of a completed request.

use std::fmt;
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue, Version};

use crate::cookies::Cookies;
use crate::error::TransferError;
use crate::transport::TransferReport;

/// What a request produced.
///
/// A response is returned for every completed transfer, including failed ones: check
/// [`Response::error`] before trusting the status code. A response is a plain value;
/// the session keeps no reference to it.
#[derive(Clone, Default)]
pub struct Response {
    status_code: u16,
    reason: String,
    status_line: String,
    version: Option<Version>,
    url: String,
    elapsed: Duration,
    headers: HeaderMap,
    raw_header: String,
    cookies: Cookies,
    text: String,
    uploaded: u64,
    downloaded: u64,
    redirect_count: u32,
    error: TransferError,
}

impl Response {
    /// Start building a response by hand, e.g. inside an interceptor.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::default()
    }

    pub(crate) fn from_transfer(report: TransferReport, text: String, raw_header: String) -> Self {
        let status_line = raw_header
            .lines()
            .next()
            .map(str::to_owned)
            .unwrap_or_default();
        let cookies = Cookies::from_headers(&report.headers);
        let error = report.error();

        Self {
            status_code: report.status_code,
            reason: report.reason,
            status_line,
            version: report.version,
            url: report.effective_url,
            elapsed: report.elapsed,
            headers: report.headers,
            raw_header,
            cookies,
            text,
            uploaded: report.uploaded,
            downloaded: report.downloaded,
            redirect_count: report.redirect_count,
            error,
        }
    }

    /// HTTP status code, `0` when no response was received.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Reason phrase from the status line.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The status line as received, without the line ending.
    pub fn status_line(&self) -> &str {
        &self.status_line
    }

    /// Protocol version of the final response.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// The final URL, after redirects.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wall time spent on the transfer.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Response headers. Lookups are case-insensitive.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A single header value, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The raw header block, status line included.
    pub fn raw_header(&self) -> &str {
        &self.raw_header
    }

    /// Cookies set by the response.
    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    /// The buffered body.
    ///
    /// Empty when a write or SSE callback consumed the body instead.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the response, returning the buffered body.
    pub fn into_text(self) -> String {
        self.text
    }

    /// Request body bytes sent.
    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded
    }

    /// Response body bytes received.
    pub fn downloaded_bytes(&self) -> u64 {
        self.downloaded
    }

    /// Redirects followed before the final response.
    pub fn redirect_count(&self) -> u32 {
        self.redirect_count
    }

    /// The transfer outcome. [`ErrorKind::Ok`](crate::ErrorKind::Ok) on success.
    pub fn error(&self) -> &TransferError {
        &self.error
    }

    /// True when the transfer succeeded and the status is 2xx.
    pub fn is_success(&self) -> bool {
        self.error.is_ok() && (200..300).contains(&self.status_code)
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status_code", &self.status_code)
            .field("url", &self.url)
            .field("elapsed", &self.elapsed)
            .field("downloaded", &self.downloaded)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// Builds a [`Response`] without performing a transfer.
#[derive(Debug, Default)]
pub struct ResponseBuilder {
    response: Response,
}

impl ResponseBuilder {
    /// Set the status code. The reason phrase defaults to the canonical one.
    pub fn status(mut self, status: u16) -> Self {
        self.response.status_code = status;
        if let Some(reason) = http::StatusCode::from_u16(status)
            .ok()
            .and_then(|status| status.canonical_reason())
        {
            self.response.reason = reason.to_owned();
        }
        self
    }

    /// Override the reason phrase.
    pub fn reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.response.reason = reason.into();
        self
    }

    /// Set the final URL.
    pub fn url<S: Into<String>>(mut self, url: S) -> Self {
        self.response.url = url.into();
        self
    }

    /// Add a header. Invalid names or values are skipped.
    pub fn header<K: AsRef<str>, V: AsRef<str>>(mut self, name: K, value: V) -> Self {
        match (
            HeaderName::from_bytes(name.as_ref().as_bytes()),
            HeaderValue::from_str(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.response.headers.append(name, value);
            }
            _ => tracing::warn!(name = name.as_ref(), "skipping invalid response header"),
        }
        self
    }

    /// Set the body text.
    pub fn text<S: Into<String>>(mut self, text: S) -> Self {
        self.response.text = text.into();
        self
    }

    /// Set the elapsed time.
    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.response.elapsed = elapsed;
        self
    }

    /// Set the error descriptor.
    pub fn error(mut self, error: TransferError) -> Self {
        self.response.error = error;
        self
    }

    /// Finish the response. Header-derived fields are filled in here.
    pub fn build(self) -> Response {
        let mut response = self.response;
        response.version.get_or_insert(Version::HTTP_11);
        response.downloaded = response.text.len() as u64;
        response.cookies = Cookies::from_headers(&response.headers);

        if response.status_code != 0 {
            response.status_line = format!("HTTP/1.1 {} {}", response.status_code, response.reason)
                .trim_end()
                .to_owned();
            let mut raw = format!("{}\r\n", response.status_line);
            for (name, value) in &response.headers {
                raw.push_str(&format!(
                    "{}: {}\r\n",
                    name,
                    String::from_utf8_lossy(value.as_bytes())
                ));
            }
            raw.push_str("\r\n");
            response.raw_header = raw;
        }

        response
    }
}
