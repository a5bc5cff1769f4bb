//! The default transport: a hyper client connection per transfer, behind tower
//! middleware for redirects, decompression, default headers and timeouts.

use std::error::Error as StdError;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_core::future::BoxFuture;
use http::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, HOST, PROXY_AUTHORIZATION, USER_AGENT};
use http::uri::Port;
use http::{Request, Response, Uri, Version};
use http_body::Frame;
use http_body_util::BodyExt as _;
use hyper::body::Incoming;
use tokio::time::Instant;
use tower::{ServiceBuilder, ServiceExt as _};
use tower_http::decompression::DecompressionLayer;
use tower_http::follow_redirect::policy::{Action, Attempt, FilterCredentials, Policy};
use tower_http::follow_redirect::{FollowRedirectLayer, RequestUri};
use tower_http::set_header::SetRequestHeaderLayer;
use tracing::{debug, trace};

use crate::body::{RequestBody, UploadAborted};
use crate::bridge::io::TokioIo;
use crate::bridge::rt::TokioExecutor;
use crate::error::{ErrorKind, TransferError};
use crate::options::{HttpVersion, LowSpeed, Redirect};
use crate::service::TimeoutLayer;
use crate::BoxError;

use super::connect::{Connection, Connector, Stream};
use super::{DebugKind, Progress, Transport, TransferReport, TransferRequest, TransferSink};

/// Settings shared by every transfer of a [`HyperTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// `User-Agent` sent when the request does not set one.
    pub user_agent: HeaderValue,

    /// Idle time before TCP keep-alive probes start.
    pub keep_alive: Option<Duration>,

    /// Whether to disable Nagle's algorithm.
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: HeaderValue::from_static(concat!("courier/", env!("CARGO_PKG_VERSION"))),
            keep_alive: Some(Duration::from_secs(60)),
            nodelay: true,
        }
    }
}

/// The default [`Transport`], built on hyper.
///
/// Every transfer opens a fresh connection. Redirects are followed through
/// `tower-http`, and each hop opens its own connection.
///
/// The transport needs a tokio runtime with I/O and time drivers. Blocking verbs
/// provide one per thread; futures from [`Transfer::perform`](crate::session::Transfer::perform)
/// must be polled inside one.
#[derive(Debug, Clone, Default)]
pub struct HyperTransport {
    config: Arc<TransportConfig>,
}

impl HyperTransport {
    /// A transport with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport with a custom configuration.
    pub fn with_config(config: TransportConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// The transport configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

impl Transport for HyperTransport {
    fn perform<'t>(
        &'t mut self,
        request: TransferRequest,
        sink: &'t mut dyn TransferSink,
    ) -> BoxFuture<'t, TransferReport> {
        Box::pin(perform(self.config.clone(), request, sink))
    }
}

/// What is known about a transfer so far.
#[derive(Debug)]
struct TransferState {
    effective_url: String,
    status_code: u16,
    reason: String,
    headers: HeaderMap,
    version: Option<Version>,
    redirects: Arc<AtomicUsize>,
    uploaded: Arc<AtomicU64>,
    downloaded: u64,
}

impl TransferState {
    fn new(url: &str) -> Self {
        Self {
            effective_url: url.to_owned(),
            status_code: 0,
            reason: String::new(),
            headers: HeaderMap::new(),
            version: None,
            redirects: Arc::default(),
            uploaded: Arc::default(),
            downloaded: 0,
        }
    }

    fn finish(self, status: Result<(), TransferError>, elapsed: Duration) -> TransferReport {
        TransferReport {
            status,
            status_code: self.status_code,
            reason: self.reason,
            effective_url: self.effective_url,
            headers: self.headers,
            version: self.version,
            redirect_count: self.redirects.load(Ordering::Relaxed) as u32,
            uploaded: self.uploaded.load(Ordering::Relaxed),
            downloaded: self.downloaded,
            elapsed,
        }
    }
}

#[tracing::instrument(name = "transfer", skip_all, fields(method = %request.method, url = %request.url))]
async fn perform(
    config: Arc<TransportConfig>,
    request: TransferRequest,
    sink: &mut dyn TransferSink,
) -> TransferReport {
    let started = Instant::now();
    let cancel = request.cancel.clone();
    let mut state = TransferState::new(&request.url);

    let outcome = if cancel.is_cancelled() {
        Err(TransferError::cancelled())
    } else {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::cancelled()),
            outcome = run(config, request, &mut *sink, &mut state) => outcome,
        }
    };

    match &outcome {
        Ok(()) => {
            debug!(status = state.status_code, bytes = state.downloaded, "transfer complete");
            sink.on_debug(DebugKind::Text, b"Transfer complete\n");
        }
        Err(error) => {
            if error.kind() == ErrorKind::Cancelled {
                cancel.acknowledge();
            }
            debug!(%error, "transfer failed");
            sink.on_debug(DebugKind::Text, format!("{error}\n").as_bytes());
        }
    }

    state.finish(outcome, started.elapsed())
}

async fn run(
    config: Arc<TransportConfig>,
    request: TransferRequest,
    sink: &mut dyn TransferSink,
    state: &mut TransferState,
) -> Result<(), TransferError> {
    let TransferRequest {
        method,
        url,
        headers,
        body,
        options,
        ..
    } = request;

    let uri = parse_url(&url)?;
    state.effective_url = uri.to_string();
    sink.on_debug(DebugKind::Text, format!("Requesting {uri}\n").as_bytes());

    let deadline = options.timeout.map(|timeout| Instant::now() + timeout);
    let low_speed = options.low_speed;
    let upload_total = http_body::Body::size_hint(&body).exact();

    let mut http_request = Request::new(body.with_counter(state.uploaded.clone()));
    *http_request.method_mut() = method;
    *http_request.uri_mut() = uri;
    *http_request.headers_mut() = headers;
    sink.on_debug(DebugKind::HeaderOut, request_head(&http_request).as_bytes());

    let service = ServiceBuilder::new()
        .layer(TimeoutLayer::new(response_timeout, options.timeout))
        .layer(FollowRedirectLayer::with_policy(CountingPolicy::new(
            options.redirect,
            state.redirects.clone(),
        )))
        .layer(
            DecompressionLayer::new()
                .gzip(options.decompress)
                .deflate(options.decompress)
                .br(options.decompress),
        )
        .layer(SetRequestHeaderLayer::if_not_present(
            USER_AGENT,
            config.user_agent.clone(),
        ))
        .service(HttpService::new(Connector::new(options, config)));

    let response = service.oneshot(http_request).await?;
    let (parts, body) = response.into_parts();

    state.status_code = parts.status.as_u16();
    state.reason = parts
        .extensions
        .get::<hyper::ext::ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| parts.status.canonical_reason().map(str::to_owned))
        .unwrap_or_default();
    state.version = Some(parts.version);
    if let Some(RequestUri(uri)) = parts.extensions.get::<RequestUri>() {
        state.effective_url = uri.to_string();
    }

    let mut head = format!(
        "{:?} {} {}\r\n",
        parts.version, state.status_code, state.reason
    );
    if !sink.on_header(&head) {
        return Err(TransferError::callback_abort());
    }
    for (name, value) in &parts.headers {
        let line = format!("{}: {}\r\n", name, String::from_utf8_lossy(value.as_bytes()));
        if !sink.on_header(&line) {
            return Err(TransferError::callback_abort());
        }
        head.push_str(&line);
    }
    if !sink.on_header("\r\n") {
        return Err(TransferError::callback_abort());
    }
    head.push_str("\r\n");
    sink.on_debug(DebugKind::HeaderIn, head.as_bytes());

    let download_total = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok());
    state.headers = parts.headers;

    let mut body = std::pin::pin!(body);
    let mut meter = SpeedMeter::new(low_speed);
    while let Some(frame) = next_frame(&mut body, deadline, low_speed).await? {
        let Ok(data) = frame.into_data() else {
            continue;
        };

        state.downloaded += data.len() as u64;
        trace!(bytes = data.len(), "received chunk");
        sink.on_debug(DebugKind::DataIn, &data);
        if !sink.on_data(&data) {
            debug!("write callback aborted transfer");
            return Err(TransferError::callback_abort());
        }

        let progress = Progress {
            download_total,
            download_now: state.downloaded,
            upload_total,
            upload_now: state.uploaded.load(Ordering::Relaxed),
        };
        if !sink.on_progress(progress) {
            debug!("progress callback aborted transfer");
            return Err(TransferError::callback_abort());
        }

        meter.record(data.len())?;
    }

    Ok(())
}

fn response_timeout() -> TransferError {
    TransferError::new(ErrorKind::Timeout, "timed out waiting for the response")
}

/// Wait for the next body frame, bounded by the transfer deadline and the low
/// speed window.
async fn next_frame<B>(
    body: &mut B,
    deadline: Option<Instant>,
    low_speed: Option<LowSpeed>,
) -> Result<Option<Frame<Bytes>>, TransferError>
where
    B: http_body::Body<Data = Bytes> + Unpin,
    B::Error: Into<BoxError>,
{
    let stall = low_speed.map(|low_speed| Instant::now() + low_speed.time);
    let limit = match (deadline, stall) {
        (Some(deadline), Some(stall)) if stall < deadline => Some((stall, "transfer stalled")),
        (Some(deadline), _) => Some((deadline, "transfer timed out")),
        (None, Some(stall)) => Some((stall, "transfer stalled")),
        (None, None) => None,
    };

    let frame = match limit {
        Some((at, reason)) => tokio::time::timeout_at(at, body.frame())
            .await
            .map_err(|_| TransferError::new(ErrorKind::Timeout, reason))?,
        None => body.frame().await,
    };

    match frame {
        None => Ok(None),
        Some(Ok(frame)) => Ok(Some(frame)),
        Some(Err(error)) => {
            let error: BoxError = error.into();
            Err(TransferError::new(
                ErrorKind::ReceiveError,
                format!("reading response body: {error}"),
            ))
        }
    }
}

/// Tracks the average rate over consecutive low speed windows.
#[derive(Debug)]
struct SpeedMeter {
    limit: Option<LowSpeed>,
    window_start: Instant,
    window_bytes: u64,
}

impl SpeedMeter {
    fn new(limit: Option<LowSpeed>) -> Self {
        Self {
            limit,
            window_start: Instant::now(),
            window_bytes: 0,
        }
    }

    fn record(&mut self, bytes: usize) -> Result<(), TransferError> {
        let Some(limit) = self.limit else {
            return Ok(());
        };

        self.window_bytes += bytes as u64;
        let elapsed = self.window_start.elapsed();
        if elapsed < limit.time {
            return Ok(());
        }

        let rate = self.window_bytes as f64 / elapsed.as_secs_f64();
        if rate < limit.limit as f64 {
            return Err(TransferError::new(
                ErrorKind::Timeout,
                format!(
                    "transfer speed {rate:.0} bytes/s below {} bytes/s for {} ms",
                    limit.limit,
                    limit.time.as_millis()
                ),
            ));
        }

        self.window_start = Instant::now();
        self.window_bytes = 0;
        Ok(())
    }
}

/// Follows redirects up to a maximum, counting hops in a shared counter.
#[derive(Debug, Clone)]
struct CountingPolicy {
    follow: bool,
    maximum: usize,
    hops: Arc<AtomicUsize>,
    credentials: Option<FilterCredentials>,
}

impl CountingPolicy {
    fn new(redirect: Redirect, hops: Arc<AtomicUsize>) -> Self {
        Self {
            follow: redirect.follow,
            maximum: redirect.maximum,
            hops,
            credentials: (!redirect.keep_credentials).then(FilterCredentials::new),
        }
    }
}

impl Policy<RequestBody, TransferError> for CountingPolicy {
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, TransferError> {
        if !self.follow {
            return Ok(Action::Stop);
        }

        if self.hops.load(Ordering::Relaxed) >= self.maximum {
            return Err(TransferError::new(
                ErrorKind::TooManyRedirects,
                format!("maximum ({}) redirects followed", self.maximum),
            ));
        }

        if let Some(filter) = &mut self.credentials {
            Policy::<RequestBody, TransferError>::redirect(filter, attempt)?;
        }

        self.hops.fetch_add(1, Ordering::Relaxed);
        trace!(status = %attempt.status(), location = %attempt.location(), "following redirect");
        Ok(Action::Follow)
    }

    fn on_request(&mut self, request: &mut Request<RequestBody>) {
        if let Some(filter) = &mut self.credentials {
            Policy::<RequestBody, TransferError>::on_request(filter, request);
        }
    }

    fn clone_body(&self, body: &RequestBody) -> Option<RequestBody> {
        body.try_clone()
    }
}

/// Opens a connection and sends one request over it.
#[derive(Debug, Clone)]
struct HttpService {
    connector: Arc<Connector>,
}

impl HttpService {
    fn new(connector: Connector) -> Self {
        Self {
            connector: Arc::new(connector),
        }
    }
}

impl tower::Service<Request<RequestBody>> for HttpService {
    type Response = Response<Incoming>;
    type Error = TransferError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<RequestBody>) -> Self::Future {
        let connector = self.connector.clone();
        Box::pin(async move { send(&connector, request).await })
    }
}

#[tracing::instrument(name = "send", skip_all, fields(uri = %request.uri()))]
async fn send(
    connector: &Connector,
    mut request: Request<RequestBody>,
) -> Result<Response<Incoming>, TransferError> {
    check_scheme(request.uri())?;
    let scheme = request.uri().scheme_str().unwrap_or("http").to_owned();

    let Connection { stream, proxied } = connector.connect(request.uri()).await?;
    let prior_knowledge = connector.options().version == HttpVersion::Http2PriorKnowledge;

    if stream.negotiated_h2() || prior_knowledge {
        *request.version_mut() = Version::HTTP_2;
        let mut sender = handshake_h2(stream).await?;
        return sender.send_request(request).await.map_err(request_error);
    }

    set_host_header(&mut request)?;
    if proxied {
        if let Some(auth) = connector.options().proxy_auth.header_value(&scheme) {
            let value = HeaderValue::from_str(&auth)
                .map_err(TransferError::msg(ErrorKind::ProxyFailure, "proxy credentials"))?;
            request.headers_mut().insert(PROXY_AUTHORIZATION, value);
        }
    } else {
        origin_form(request.uri_mut());
    }

    *request.version_mut() = Version::HTTP_11;
    let mut sender = handshake_h1(stream).await?;
    sender.send_request(request).await.map_err(request_error)
}

async fn handshake_h1(
    stream: Stream,
) -> Result<hyper::client::conn::http1::SendRequest<RequestBody>, TransferError> {
    trace!("handshake h1");
    let (sender, conn) = hyper::client::conn::http1::Builder::new()
        .handshake(TokioIo::new(stream))
        .await
        .map_err(TransferError::msg(
            ErrorKind::ConnectionFailure,
            "http/1.1 handshake",
        ))?;
    tokio::spawn(async {
        if let Err(err) = conn.await {
            tracing::debug!(%err, "h1 connection driver error");
        }
    });
    trace!("handshake complete");
    Ok(sender)
}

async fn handshake_h2(
    stream: Stream,
) -> Result<hyper::client::conn::http2::SendRequest<RequestBody>, TransferError> {
    trace!("handshake h2");
    let (sender, conn) = hyper::client::conn::http2::Builder::new(TokioExecutor::new())
        .handshake(TokioIo::new(stream))
        .await
        .map_err(TransferError::msg(
            ErrorKind::ConnectionFailure,
            "http/2 handshake",
        ))?;
    tokio::spawn(async {
        if let Err(err) = conn.await {
            tracing::debug!(%err, "h2 connection driver error");
        }
    });
    trace!("handshake complete");
    Ok(sender)
}

/// Parse and validate the request URL.
fn parse_url(url: &str) -> Result<Uri, TransferError> {
    let parsed = url::Url::parse(url).map_err(TransferError::msg(ErrorKind::InvalidUrl, url_context(url)))?;
    if !parsed.has_host() {
        return Err(TransferError::new(ErrorKind::InvalidUrl, format!("{url:?} has no host")));
    }

    let uri: Uri = parsed
        .as_str()
        .parse()
        .map_err(TransferError::msg(ErrorKind::InvalidUrl, "invalid url"))?;
    check_scheme(&uri)?;
    Ok(uri)
}

fn url_context(url: &str) -> &'static str {
    if url.is_empty() {
        "no url configured"
    } else {
        "invalid url"
    }
}

fn check_scheme(uri: &Uri) -> Result<(), TransferError> {
    match uri.scheme_str() {
        Some("http") | Some("https") => Ok(()),
        Some(other) => Err(TransferError::new(
            ErrorKind::UnsupportedProtocol,
            format!("unsupported scheme {other:?}"),
        )),
        None => Err(TransferError::new(ErrorKind::InvalidUrl, "missing scheme")),
    }
}

fn request_error(error: hyper::Error) -> TransferError {
    if find_source::<UploadAborted>(&error).is_some() {
        return TransferError::callback_abort();
    }

    let kind = if error.is_timeout() {
        ErrorKind::Timeout
    } else if error.is_incomplete_message() {
        ErrorKind::EmptyResponse
    } else if error.is_parse() || error.is_parse_status() {
        ErrorKind::ReceiveError
    } else {
        ErrorKind::SendFailure
    };

    TransferError::build(kind, "sending request", error)
}

fn find_source<'e, E: StdError + 'static>(error: &'e (dyn StdError + 'static)) -> Option<&'e E> {
    let mut current = Some(error);
    while let Some(error) = current {
        if let Some(found) = error.downcast_ref::<E>() {
            return Some(found);
        }
        current = error.source();
    }
    None
}

/// Render the request line and headers for debug observers.
fn request_head<B>(request: &Request<B>) -> String {
    let target = request
        .uri()
        .path_and_query()
        .map(|path| path.as_str())
        .unwrap_or("/");
    let mut head = format!("{} {} HTTP/1.1\r\n", request.method(), target);
    if let Some(authority) = request.uri().authority() {
        head.push_str(&format!("Host: {authority}\r\n"));
    }
    for (name, value) in request.headers() {
        head.push_str(&format!(
            "{}: {}\r\n",
            name,
            String::from_utf8_lossy(value.as_bytes())
        ));
    }
    head.push_str("\r\n");
    head
}

/// Convert the URI to origin-form, if it is not already.
///
/// This form of the URI has no scheme or authority, and contains just
/// the path, usually used in HTTP/1 requests.
fn origin_form(uri: &mut Uri) {
    *uri = match uri.path_and_query() {
        Some(path) if path.as_str() != "/" => {
            let mut parts = ::http::uri::Parts::default();
            parts.path_and_query = Some(path.clone());
            Uri::from_parts(parts).unwrap_or_default()
        }
        _none_or_just_slash => Uri::default(),
    };
}

/// Returns the port if it is not the default port for the scheme.
fn get_non_default_port(uri: &Uri) -> Option<Port<&str>> {
    match (uri.port().map(|p| p.as_u16()), uri.scheme_str() == Some("https")) {
        (Some(443), true) => None,
        (Some(80), false) => None,
        _ => uri.port(),
    }
}

/// Set the Host header on the request if it is not already set,
/// using the authority from the URI.
fn set_host_header<B>(request: &mut Request<B>) -> Result<(), TransferError> {
    if request.headers().contains_key(HOST) {
        return Ok(());
    }

    let uri = request.uri();
    let hostname = uri
        .host()
        .ok_or_else(|| TransferError::new(ErrorKind::InvalidUrl, "missing host"))?;
    let host = match get_non_default_port(uri) {
        Some(port) => format!("{hostname}:{port}"),
        None => hostname.to_owned(),
    };
    let value = HeaderValue::from_str(&host)
        .map_err(TransferError::msg(ErrorKind::InvalidUrl, "host header"))?;
    request.headers_mut().insert(HOST, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;
    use std::net::SocketAddr;

    use http_body_util::Full;
    use hyper::service::service_fn;
    use tokio::net::TcpListener;

    use crate::cancel::CancelToken;
    use crate::options::TransportOptions;

    #[derive(Debug, Default)]
    struct Collect {
        headers: Vec<String>,
        data: Vec<u8>,
        abort_after: Option<usize>,
    }

    impl TransferSink for Collect {
        fn on_header(&mut self, line: &str) -> bool {
            self.headers.push(line.to_owned());
            true
        }

        fn on_data(&mut self, data: &[u8]) -> bool {
            self.data.extend_from_slice(data);
            self.abort_after.map_or(true, |limit| self.data.len() < limit)
        }
    }

    async fn serve<F, Fut>(handler: F) -> SocketAddr
    where
        F: Fn(Request<Incoming>) -> Fut + Clone + Send + 'static,
        Fut: std::future::Future<Output = Response<Full<Bytes>>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (stream, _) = listener.accept().await.unwrap();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |request| {
                        let response = handler(request);
                        async move { Ok::<_, Infallible>(response.await) }
                    });
                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .await;
                });
            }
        });
        addr
    }

    fn request(url: String, options: TransportOptions) -> TransferRequest {
        TransferRequest {
            method: http::Method::GET,
            url,
            headers: HeaderMap::new(),
            body: RequestBody::empty(),
            options,
            cancel: CancelToken::new(),
        }
    }

    #[test]
    fn test_set_host_header() {
        let mut request = Request::new(());
        *request.uri_mut() = "http://example.com".parse().unwrap();
        set_host_header(&mut request).unwrap();
        assert_eq!(request.headers().get(HOST).unwrap(), "example.com");

        let mut request = Request::new(());
        *request.uri_mut() = "http://example.com:8080".parse().unwrap();
        set_host_header(&mut request).unwrap();
        assert_eq!(request.headers().get(HOST).unwrap(), "example.com:8080");

        let mut request = Request::new(());
        *request.uri_mut() = "https://example.com:443".parse().unwrap();
        set_host_header(&mut request).unwrap();
        assert_eq!(request.headers().get(HOST).unwrap(), "example.com");
    }

    #[test]
    fn test_origin_form() {
        let mut uri: Uri = "http://example.com/a/b?c=d".parse().unwrap();
        origin_form(&mut uri);
        assert_eq!(uri, "/a/b?c=d");

        let mut uri: Uri = "http://example.com".parse().unwrap();
        origin_form(&mut uri);
        assert_eq!(uri, "/");
    }

    #[test]
    fn url_validation() {
        assert_eq!(parse_url("").unwrap_err().kind(), ErrorKind::InvalidUrl);
        assert_eq!(parse_url("not a url").unwrap_err().kind(), ErrorKind::InvalidUrl);
        assert_eq!(
            parse_url("ftp://example.com/file").unwrap_err().kind(),
            ErrorKind::UnsupportedProtocol
        );
        assert_eq!(parse_url("http://example.com").unwrap(), "http://example.com/");
    }

    #[tokio::test]
    async fn get_collects_headers_and_body() {
        let _ = tracing_subscriber::fmt::try_init();

        let addr = serve(|_| async {
            Response::builder()
                .header("x-test", "yes")
                .body(Full::new(Bytes::from_static(b"hello")))
                .unwrap()
        })
        .await;

        let mut sink = Collect::default();
        let report = HyperTransport::new()
            .perform(
                request(format!("http://{addr}/greeting"), TransportOptions::default()),
                &mut sink,
            )
            .await;

        assert!(report.status.is_ok(), "{:?}", report.status);
        assert_eq!(report.status_code, 200);
        assert_eq!(report.reason, "OK");
        assert_eq!(report.downloaded, 5);
        assert_eq!(report.redirect_count, 0);
        assert_eq!(report.headers.get("x-test").unwrap(), "yes");
        assert_eq!(sink.data, b"hello");
        assert_eq!(sink.headers.first().unwrap(), "HTTP/1.1 200 OK\r\n");
        assert_eq!(sink.headers.last().unwrap(), "\r\n");
    }

    #[tokio::test]
    async fn redirects_are_counted_and_limited() {
        let addr = serve(|request: Request<Incoming>| async move {
            let hop: u32 = request.uri().path()[1..].parse().unwrap_or(0);
            if hop < 3 {
                Response::builder()
                    .status(302)
                    .header("location", format!("/{}", hop + 1))
                    .body(Full::default())
                    .unwrap()
            } else {
                Response::new(Full::new(Bytes::from_static(b"done")))
            }
        })
        .await;

        let mut sink = Collect::default();
        let report = HyperTransport::new()
            .perform(request(format!("http://{addr}/0"), TransportOptions::default()), &mut sink)
            .await;
        assert!(report.status.is_ok());
        assert_eq!(report.redirect_count, 3);
        assert_eq!(report.effective_url, format!("http://{addr}/3"));

        let mut options = TransportOptions::default();
        options.redirect = Redirect::new(2);
        let report = HyperTransport::new()
            .perform(request(format!("http://{addr}/0"), options), &mut Collect::default())
            .await;
        assert_eq!(report.error().kind(), ErrorKind::TooManyRedirects);

        let mut options = TransportOptions::default();
        options.redirect = Redirect::none();
        let report = HyperTransport::new()
            .perform(request(format!("http://{addr}/0"), options), &mut Collect::default())
            .await;
        assert!(report.status.is_ok());
        assert_eq!(report.status_code, 302);
        assert_eq!(report.redirect_count, 0);
    }

    #[tokio::test]
    async fn sink_abort_is_reported() {
        let addr = serve(|_| async { Response::new(Full::new(Bytes::from(vec![b'x'; 1024]))) }).await;

        let mut sink = Collect {
            abort_after: Some(1),
            ..Default::default()
        };
        let report = HyperTransport::new()
            .perform(request(format!("http://{addr}/"), TransportOptions::default()), &mut sink)
            .await;
        assert_eq!(report.error().kind(), ErrorKind::CallbackAbort);
        assert!(!sink.data.is_empty());
    }

    #[tokio::test]
    async fn slow_response_times_out() {
        let addr = serve(|_| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Response::new(Full::default())
        })
        .await;

        let mut options = TransportOptions::default();
        options.timeout = Some(Duration::from_millis(50));
        let report = HyperTransport::new()
            .perform(request(format!("http://{addr}/"), options), &mut Collect::default())
            .await;
        assert_eq!(report.error().kind(), ErrorKind::Timeout);
        assert_eq!(report.status_code, 0);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let mut request = request("http://127.0.0.1:9/".to_owned(), TransportOptions::default());
        request.cancel.cancel();
        let token = request.cancel.clone();

        let report = HyperTransport::new().perform(request, &mut Collect::default()).await;
        assert_eq!(report.error().kind(), ErrorKind::Cancelled);
        assert!(token.is_acknowledged());
    }
}
