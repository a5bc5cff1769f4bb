//! Per-session configuration.
//!
//! Every configurable value is a small type that converts into a [`Directive`].
//! [`Session::set`](crate::Session::set) applies one directive, replacing whatever
//! that directive was set to before.
//!
//! ```
//! use std::time::Duration;
//! use courier::options::{Header, Parameters, Timeout};
//! use courier::Session;
//!
//! let mut session = Session::new();
//! session.set("http://localhost:8080/search");
//! session.set(Parameters::new([("q", "rust")]));
//! session.set(Header::from_iter([("Accept", "application/json")]));
//! session.set(Timeout(Duration::from_secs(5)));
//! ```

mod network;
mod request;

pub use self::network::{
    ConnectTimeout, HttpVersion, Interface, LocalPort, LocalPortRange, LowSpeed, Proxies,
    ProxyAuthentication, Redirect, Resolve, SslOptions, Timeout, TransportOptions,
};
pub use self::request::{
    AcceptEncoding, Authentication, Bearer, Body, Header, MultiRange, Multipart, Parameters,
    Part, PartContent, Payload, Range, ReserveSize, Url, UserAgent,
};
pub use crate::cookies::{Cookie, Cookies};

use crate::callbacks::{
    DebugCallback, HeaderCallback, ProgressCallback, ReadCallback, SseCallback, WriteCallback,
};

/// One configuration value for a [`Session`](crate::Session).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum Directive {
    /// Request target.
    Url(Url),
    /// Query parameters.
    Parameters(Parameters),
    /// Request headers.
    Header(Header),
    /// Raw request body.
    Body(Body),
    /// Form-encoded request body.
    Payload(Payload),
    /// Multipart request body.
    Multipart(Multipart),
    /// Body streamed from a callback.
    Read(ReadCallback),
    /// Basic credentials.
    Authentication(Authentication),
    /// Bearer token.
    Bearer(Bearer),
    /// Request cookies.
    Cookies(Cookies),
    /// `User-Agent` header.
    UserAgent(UserAgent),
    /// Content encoding negotiation.
    AcceptEncoding(AcceptEncoding),
    /// Whole-transfer timeout.
    Timeout(Timeout),
    /// Connect timeout.
    ConnectTimeout(ConnectTimeout),
    /// Minimum transfer rate.
    LowSpeed(LowSpeed),
    /// Redirect policy.
    Redirect(Redirect),
    /// Protocol version.
    HttpVersion(HttpVersion),
    /// Proxies.
    Proxies(Proxies),
    /// Proxy credentials.
    ProxyAuthentication(ProxyAuthentication),
    /// TLS settings.
    Ssl(SslOptions),
    /// A single byte range.
    Range(Range),
    /// Several byte ranges.
    MultiRange(MultiRange),
    /// Local interface.
    Interface(Interface),
    /// Local port.
    LocalPort(LocalPort),
    /// Local port range.
    LocalPortRange(LocalPortRange),
    /// Address overrides.
    Resolve(Vec<Resolve>),
    /// Response buffer capacity.
    ReserveSize(ReserveSize),
    /// Body sink.
    Write(WriteCallback),
    /// Server-sent event sink.
    Sse(SseCallback),
    /// Header line observer.
    HeaderCallback(HeaderCallback),
    /// Progress observer.
    Progress(ProgressCallback),
    /// Debug trace observer.
    Debug(DebugCallback),
}

macro_rules! directive_from {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Directive {
                fn from(value: $ty) -> Self {
                    Directive::$variant(value)
                }
            }
        )*
    };
}

directive_from!(
    Url(Url),
    Parameters(Parameters),
    Header(Header),
    Body(Body),
    Payload(Payload),
    Multipart(Multipart),
    Read(ReadCallback),
    Authentication(Authentication),
    Bearer(Bearer),
    Cookies(Cookies),
    UserAgent(UserAgent),
    AcceptEncoding(AcceptEncoding),
    Timeout(Timeout),
    ConnectTimeout(ConnectTimeout),
    LowSpeed(LowSpeed),
    Redirect(Redirect),
    HttpVersion(HttpVersion),
    Proxies(Proxies),
    ProxyAuthentication(ProxyAuthentication),
    Ssl(SslOptions),
    Range(Range),
    MultiRange(MultiRange),
    Interface(Interface),
    LocalPort(LocalPort),
    LocalPortRange(LocalPortRange),
    Resolve(Vec<Resolve>),
    ReserveSize(ReserveSize),
    Write(WriteCallback),
    Sse(SseCallback),
    HeaderCallback(HeaderCallback),
    Progress(ProgressCallback),
    Debug(DebugCallback),
);

impl From<&str> for Directive {
    fn from(value: &str) -> Self {
        Directive::Url(value.into())
    }
}

impl From<String> for Directive {
    fn from(value: String) -> Self {
        Directive::Url(value.into())
    }
}

impl From<Resolve> for Directive {
    fn from(value: Resolve) -> Self {
        Directive::Resolve(vec![value])
    }
}

/// Where the request body comes from. Body directives replace each other.
#[derive(Debug, Clone)]
pub(crate) enum BodySource {
    Raw(Body),
    Payload(Payload),
    Multipart(Multipart),
    Read(ReadCallback),
}

/// Credentials for the `Authorization` header.
#[derive(Debug, Clone)]
pub(crate) enum Credentials {
    Basic(Authentication),
    Bearer(Bearer),
}

impl Credentials {
    pub(crate) fn header_value(&self) -> String {
        match self {
            Credentials::Basic(auth) => auth.header_value(),
            Credentials::Bearer(token) => token.header_value(),
        }
    }
}

/// Callbacks installed on a session.
#[derive(Debug, Clone, Default)]
pub(crate) struct Callbacks {
    pub(crate) write: Option<WriteCallback>,
    pub(crate) sse: Option<SseCallback>,
    pub(crate) header: Option<HeaderCallback>,
    pub(crate) progress: Option<ProgressCallback>,
    pub(crate) debug: Option<DebugCallback>,
}

/// The accumulated configuration of a session.
#[derive(Debug, Clone, Default)]
pub(crate) struct SessionOptions {
    pub(crate) url: Url,
    pub(crate) parameters: Parameters,
    pub(crate) header: Header,
    pub(crate) body: Option<BodySource>,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) cookies: Cookies,
    pub(crate) user_agent: Option<UserAgent>,
    pub(crate) accept_encoding: AcceptEncoding,
    pub(crate) range: Option<String>,
    pub(crate) reserve_size: usize,
    pub(crate) transport: TransportOptions,
    pub(crate) callbacks: Callbacks,
}

impl SessionOptions {
    pub(crate) fn apply(&mut self, directive: Directive) {
        match directive {
            Directive::Url(url) => self.url = url,
            Directive::Parameters(parameters) => self.parameters = parameters,
            Directive::Header(header) => self.header = header,
            Directive::Body(body) => self.body = Some(BodySource::Raw(body)),
            Directive::Payload(payload) => self.body = Some(BodySource::Payload(payload)),
            Directive::Multipart(multipart) => self.body = Some(BodySource::Multipart(multipart)),
            Directive::Read(read) => self.body = Some(BodySource::Read(read)),
            Directive::Authentication(auth) => self.credentials = Some(Credentials::Basic(auth)),
            Directive::Bearer(token) => self.credentials = Some(Credentials::Bearer(token)),
            Directive::Cookies(cookies) => self.cookies = cookies,
            Directive::UserAgent(agent) => self.user_agent = Some(agent),
            Directive::AcceptEncoding(encoding) => {
                self.transport.decompress = encoding.decompress();
                self.accept_encoding = encoding;
            }
            Directive::Timeout(Timeout(timeout)) => self.transport.timeout = Some(timeout),
            Directive::ConnectTimeout(ConnectTimeout(timeout)) => {
                self.transport.connect_timeout = Some(timeout)
            }
            Directive::LowSpeed(low_speed) => self.transport.low_speed = Some(low_speed),
            Directive::Redirect(redirect) => self.transport.redirect = redirect,
            Directive::HttpVersion(version) => self.transport.version = version,
            Directive::Proxies(proxies) => self.transport.proxies = proxies,
            Directive::ProxyAuthentication(auth) => self.transport.proxy_auth = auth,
            Directive::Ssl(ssl) => self.transport.ssl = ssl,
            Directive::Range(range) => self.range = Some(range.header_value()),
            Directive::MultiRange(ranges) => self.range = Some(ranges.header_value()),
            Directive::Interface(interface) => self.transport.interface = Some(interface),
            Directive::LocalPort(LocalPort(port)) => self.transport.local_port = Some(port),
            Directive::LocalPortRange(LocalPortRange(range)) => {
                self.transport.local_port_range = Some(range)
            }
            Directive::Resolve(resolve) => self.transport.resolve = resolve,
            Directive::ReserveSize(ReserveSize(size)) => self.reserve_size = size,
            Directive::Write(callback) => self.callbacks.write = Some(callback),
            Directive::Sse(callback) => self.callbacks.sse = Some(callback),
            Directive::HeaderCallback(callback) => self.callbacks.header = Some(callback),
            Directive::Progress(callback) => self.callbacks.progress = Some(callback),
            Directive::Debug(callback) => self.callbacks.debug = Some(callback),
        }
    }
}
