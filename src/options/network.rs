//! Directives that control how the transport reaches the server.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use super::request::basic_auth;

/// Limit on the whole transfer, from connect to the last body byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout(pub Duration);

impl From<Duration> for Timeout {
    fn from(value: Duration) -> Self {
        Timeout(value)
    }
}

/// Limit on establishing the TCP (and TLS) connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectTimeout(pub Duration);

impl From<Duration> for ConnectTimeout {
    fn from(value: Duration) -> Self {
        ConnectTimeout(value)
    }
}

/// Abort when fewer than `limit` bytes per second arrive for `time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LowSpeed {
    /// Minimum average transfer rate, in bytes per second.
    pub limit: u64,
    /// Window over which the rate is measured.
    pub time: Duration,
}

impl LowSpeed {
    /// Create a low speed limit.
    pub fn new(limit: u64, time: Duration) -> Self {
        Self { limit, time }
    }
}

/// Redirect handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Redirect {
    /// Follow `Location` headers.
    pub follow: bool,
    /// Maximum number of hops before the transfer fails.
    pub maximum: usize,
    /// Keep sending `Authorization` and `Cookie` headers when a redirect changes host.
    pub keep_credentials: bool,
}

impl Default for Redirect {
    fn default() -> Self {
        Self {
            follow: true,
            maximum: 50,
            keep_credentials: false,
        }
    }
}

impl Redirect {
    /// Follow up to `maximum` redirects.
    pub fn new(maximum: usize) -> Self {
        Self {
            maximum,
            ..Default::default()
        }
    }

    /// Never follow redirects.
    pub fn none() -> Self {
        Self {
            follow: false,
            ..Default::default()
        }
    }
}

/// HTTP protocol version selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpVersion {
    /// HTTP/2 when negotiated through TLS ALPN, otherwise HTTP/1.1.
    #[default]
    Auto,
    /// HTTP/1.1 only.
    Http1,
    /// Offer HTTP/2 over TLS, falling back to HTTP/1.1.
    Http2,
    /// HTTP/2 without negotiation, also over plain TCP.
    Http2PriorKnowledge,
}

/// Proxy URLs keyed by the scheme of the request they apply to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proxies {
    proxies: HashMap<String, String>,
}

impl Proxies {
    /// Create from `(scheme, proxy url)` pairs.
    pub fn new<I, S, U>(proxies: I) -> Self
    where
        I: IntoIterator<Item = (S, U)>,
        S: Into<String>,
        U: Into<String>,
    {
        Self {
            proxies: proxies
                .into_iter()
                .map(|(scheme, url)| (scheme.into(), url.into()))
                .collect(),
        }
    }

    /// The proxy for a request scheme.
    pub fn get(&self, scheme: &str) -> Option<&str> {
        self.proxies.get(scheme).map(String::as_str)
    }

    /// True when no proxy is configured.
    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

/// Credentials for proxies, keyed by request scheme.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProxyAuthentication {
    credentials: HashMap<String, (String, String)>,
}

impl fmt::Debug for ProxyAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.credentials.keys()).finish()
    }
}

impl ProxyAuthentication {
    /// Create from `(scheme, username, password)` triples.
    pub fn new<I, S, U, P>(credentials: I) -> Self
    where
        I: IntoIterator<Item = (S, U, P)>,
        S: Into<String>,
        U: Into<String>,
        P: Into<String>,
    {
        Self {
            credentials: credentials
                .into_iter()
                .map(|(scheme, user, password)| (scheme.into(), (user.into(), password.into())))
                .collect(),
        }
    }

    /// The `Proxy-Authorization` value for a request scheme.
    pub(crate) fn header_value(&self, scheme: &str) -> Option<String> {
        self.credentials
            .get(scheme)
            .map(|(user, password)| basic_auth(user, password))
    }
}

/// TLS settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SslOptions {
    /// Verify the server certificate chain and name.
    pub verify_peer: bool,
    /// PEM bundle of trust anchors to use instead of the platform store.
    pub ca_bundle: Option<PathBuf>,
    /// PEM client certificate chain.
    pub client_cert: Option<PathBuf>,
    /// PEM private key for the client certificate.
    pub client_key: Option<PathBuf>,
}

impl Default for SslOptions {
    fn default() -> Self {
        Self {
            verify_peer: true,
            ca_bundle: None,
            client_cert: None,
            client_key: None,
        }
    }
}

impl SslOptions {
    /// Default settings: verification on, platform trust store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn certificate verification on or off.
    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    /// Trust the certificates in this PEM file.
    pub fn ca_bundle<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    /// Present a client certificate.
    pub fn client_cert<C: Into<PathBuf>, K: Into<PathBuf>>(mut self, cert: C, key: K) -> Self {
        self.client_cert = Some(cert.into());
        self.client_key = Some(key.into());
        self
    }
}

/// Local interface for outgoing connections: an IP address or a device name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface(pub String);

impl From<&str> for Interface {
    fn from(value: &str) -> Self {
        Interface(value.to_owned())
    }
}

/// First local port to bind outgoing connections to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPort(pub u16);

/// Number of ports, starting at [`LocalPort`], to try when binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalPortRange(pub u16);

/// Resolve `host` to `addr` for the given ports instead of asking DNS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolve {
    /// Host name as it appears in the URL.
    pub host: String,
    /// Address to connect to.
    pub addr: IpAddr,
    /// Ports the override applies to. Empty means 80 and 443.
    pub ports: Vec<u16>,
}

impl Resolve {
    /// Override a host for ports 80 and 443.
    pub fn new<H: Into<String>>(host: H, addr: IpAddr) -> Self {
        Self {
            host: host.into(),
            addr,
            ports: Vec::new(),
        }
    }

    /// Restrict the override to specific ports.
    pub fn with_ports<I: IntoIterator<Item = u16>>(mut self, ports: I) -> Self {
        self.ports = ports.into_iter().collect();
        self
    }

    pub(crate) fn matches(&self, host: &str, port: u16) -> bool {
        let ports_match = if self.ports.is_empty() {
            port == 80 || port == 443
        } else {
            self.ports.contains(&port)
        };
        ports_match && self.host.eq_ignore_ascii_case(host)
    }
}

/// Everything the transport needs to know besides the request message itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportOptions {
    /// Whole-transfer limit.
    pub timeout: Option<Duration>,
    /// Connection establishment limit.
    pub connect_timeout: Option<Duration>,
    /// Minimum transfer rate.
    pub low_speed: Option<LowSpeed>,
    /// Redirect handling.
    pub redirect: Redirect,
    /// Protocol version selection.
    pub version: HttpVersion,
    /// Proxies by scheme.
    pub proxies: Proxies,
    /// Proxy credentials by scheme.
    pub proxy_auth: ProxyAuthentication,
    /// TLS settings.
    pub ssl: SslOptions,
    /// Local interface to bind.
    pub interface: Option<Interface>,
    /// Local port to bind.
    pub local_port: Option<u16>,
    /// Number of local ports to try.
    pub local_port_range: Option<u16>,
    /// Address overrides.
    pub resolve: Vec<Resolve>,
    /// Transparently decode compressed responses.
    pub decompress: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            connect_timeout: None,
            low_speed: None,
            redirect: Redirect::default(),
            version: HttpVersion::Auto,
            proxies: Proxies::default(),
            proxy_auth: ProxyAuthentication::default(),
            ssl: SslOptions::default(),
            interface: None,
            local_port: None,
            local_port_range: None,
            resolve: Vec::new(),
            decompress: true,
        }
    }
}
