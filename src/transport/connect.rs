//! Establishing the byte stream a transfer runs over.
//!
//! This covers name resolution (with overrides), local binding, proxies and TLS.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::Uri;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _, ReadBuf};
use tokio::net::{TcpSocket, TcpStream};
use tracing::{trace, warn, Instrument as _};

use crate::error::{ErrorKind, TransferError};
use crate::options::{Interface, TransportOptions};

use super::engine::TransportConfig;

const MAX_TUNNEL_RESPONSE: usize = 16 * 1024;

/// A connected stream, possibly wrapped in TLS.
#[derive(Debug)]
#[pin_project::pin_project(project = StreamProj)]
pub(super) enum Stream {
    Plain(#[pin] TcpStream),
    #[cfg(feature = "tls")]
    Tls(#[pin] Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl Stream {
    /// True when TLS negotiated HTTP/2 through ALPN.
    pub(super) fn negotiated_h2(&self) -> bool {
        match self {
            Stream::Plain(_) => false,
            #[cfg(feature = "tls")]
            Stream::Tls(stream) => stream.get_ref().1.alpn_protocol() == Some(&b"h2"[..]),
        }
    }
}

impl AsyncRead for Stream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.project() {
            StreamProj::Plain(stream) => stream.poll_read(cx, buf),
            #[cfg(feature = "tls")]
            StreamProj::Tls(stream) => stream.poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Stream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.project() {
            StreamProj::Plain(stream) => stream.poll_write(cx, buf),
            #[cfg(feature = "tls")]
            StreamProj::Tls(stream) => stream.poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            StreamProj::Plain(stream) => stream.poll_flush(cx),
            #[cfg(feature = "tls")]
            StreamProj::Tls(stream) => stream.poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.project() {
            StreamProj::Plain(stream) => stream.poll_shutdown(cx),
            #[cfg(feature = "tls")]
            StreamProj::Tls(stream) => stream.poll_shutdown(cx),
        }
    }
}

/// A stream ready for the HTTP handshake.
#[derive(Debug)]
pub(super) struct Connection {
    pub(super) stream: Stream,

    /// The stream leads to a plain HTTP proxy, so requests use absolute-form.
    pub(super) proxied: bool,
}

/// Opens connections for one transfer.
#[derive(Debug)]
pub(super) struct Connector {
    options: TransportOptions,
    config: Arc<TransportConfig>,
}

impl Connector {
    pub(super) fn new(options: TransportOptions, config: Arc<TransportConfig>) -> Self {
        Self { options, config }
    }

    pub(super) fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Connect to the origin of `uri`, honouring proxies and the connect timeout.
    #[tracing::instrument(name = "connect", skip_all, fields(uri = %uri))]
    pub(super) async fn connect(&self, uri: &Uri) -> Result<Connection, TransferError> {
        match self.options.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.establish(uri))
                .await
                .unwrap_or_else(|_| {
                    trace!(timeout=?limit, "connection timed out");
                    Err(TransferError::new(
                        ErrorKind::Timeout,
                        format!("connection timed out after {} ms", limit.as_millis()),
                    ))
                }),
            None => self.establish(uri).await,
        }
    }

    async fn establish(&self, uri: &Uri) -> Result<Connection, TransferError> {
        let scheme = uri.scheme_str().unwrap_or("http");
        let secure = scheme == "https";
        let (host, port) = get_host_and_port(uri)?;

        let Some(proxy) = self.options.proxies.get(scheme) else {
            let tcp = self.tcp(&host, port).await?;
            let stream = if secure {
                self.secure(&host, tcp).await?
            } else {
                Stream::Plain(tcp)
            };
            return Ok(Connection {
                stream,
                proxied: false,
            });
        };

        let proxy_uri = parse_proxy(proxy)?;
        let (proxy_host, proxy_port) = get_host_and_port(&proxy_uri)?;
        trace!(proxy.host = %proxy_host, proxy.port = proxy_port, "connecting through proxy");

        let tcp = self.tcp(&proxy_host, proxy_port).await.map_err(|error| {
            TransferError::new(
                ErrorKind::ProxyFailure,
                format!("proxy {proxy_host}:{proxy_port}: {}", error.message()),
            )
        })?;

        if secure {
            let auth = self.options.proxy_auth.header_value(scheme);
            let tcp = tunnel(tcp, &host, port, auth.as_deref()).await?;
            Ok(Connection {
                stream: self.secure(&host, tcp).await?,
                proxied: false,
            })
        } else {
            Ok(Connection {
                stream: Stream::Plain(tcp),
                proxied: true,
            })
        }
    }

    #[cfg(feature = "tls")]
    async fn secure(&self, host: &str, tcp: TcpStream) -> Result<Stream, TransferError> {
        let config = super::tls::client_config(&self.options.ssl, self.options.version)?;
        let stream = super::tls::handshake(config, host, tcp).await?;
        Ok(Stream::Tls(Box::new(stream)))
    }

    #[cfg(not(feature = "tls"))]
    async fn secure(&self, _host: &str, _tcp: TcpStream) -> Result<Stream, TransferError> {
        Err(TransferError::new(
            ErrorKind::UnsupportedProtocol,
            "https requires the `tls` feature",
        ))
    }

    async fn tcp(&self, host: &str, port: u16) -> Result<TcpStream, TransferError> {
        let addrs = self.resolve(host, port).await?;

        let mut failure = None;
        for addr in addrs {
            match self.attempt(addr).await {
                Ok(stream) => {
                    trace!(peer.addr = %addr, "tcp connected");
                    return Ok(stream);
                }
                Err(error) => {
                    trace!(%addr, %error, "tcp connect attempt failed");
                    failure = Some(error);
                }
            }
        }

        Err(failure.unwrap_or_else(|| {
            TransferError::new(
                ErrorKind::HostResolutionFailure,
                format!("no addresses for {host}"),
            )
        }))
    }

    async fn resolve(&self, host: &str, port: u16) -> Result<Vec<SocketAddr>, TransferError> {
        if let Some(resolve) = self
            .options
            .resolve
            .iter()
            .find(|resolve| resolve.matches(host, port))
        {
            trace!(%host, addr = %resolve.addr, "using resolve override");
            return Ok(vec![SocketAddr::new(resolve.addr, port)]);
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }

        let addrs: Vec<_> = tokio::net::lookup_host((host, port))
            .instrument(tracing::trace_span!("dns", %host))
            .await
            .map_err(TransferError::msg(
                ErrorKind::HostResolutionFailure,
                "dns resolution",
            ))?
            .collect();
        trace!(count = addrs.len(), "resolved");
        Ok(addrs)
    }

    async fn attempt(&self, addr: SocketAddr) -> Result<TcpStream, TransferError> {
        let socket = self
            .socket(&addr)
            .map_err(TransferError::msg(ErrorKind::ConnectionFailure, "tcp socket"))?;

        socket
            .connect(addr)
            .instrument(tracing::trace_span!("tcp", remote.addr = %addr))
            .await
            .map_err(TransferError::msg(
                ErrorKind::ConnectionFailure,
                "tcp connect error",
            ))
    }

    fn socket(&self, addr: &SocketAddr) -> io::Result<TcpSocket> {
        use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};

        let socket = Socket::new(Domain::for_address(*addr), Type::STREAM, Some(Protocol::TCP))?;
        tracing::trace!("tcp socket opened");

        let guard = tracing::trace_span!("socket_options").entered();

        // Tokio requires O_NONBLOCK on sockets it adopts.
        socket.set_nonblocking(true)?;

        if let Some(duration) = self.config.keep_alive {
            let keepalive = TcpKeepalive::new().with_time(duration);
            if let Err(error) = socket.set_tcp_keepalive(&keepalive) {
                warn!("tcp set_keepalive error: {}", error);
            }
        }

        if self.config.nodelay {
            if let Err(error) = socket.set_nodelay(true) {
                warn!("tcp set_nodelay error: {}", error);
            }
        }

        bind_local(&socket, addr, &self.options)?;
        drop(guard);

        Ok(TcpSocket::from_std_stream(socket.into()))
    }
}

/// Parse a proxy URL, defaulting to `http://` when no scheme is given.
fn parse_proxy(proxy: &str) -> Result<Uri, TransferError> {
    let proxy = if proxy.contains("://") {
        proxy.to_owned()
    } else {
        format!("http://{proxy}")
    };

    proxy
        .parse()
        .map_err(TransferError::msg(ErrorKind::ProxyFailure, "invalid proxy url"))
}

pub(super) fn get_host_and_port(uri: &Uri) -> Result<(Box<str>, u16), TransferError> {
    let host = uri
        .host()
        .ok_or_else(|| TransferError::new(ErrorKind::InvalidUrl, "missing host"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = match uri.port_u16() {
        Some(port) => port,
        None => match uri.scheme_str() {
            Some("https") => 443,
            _ => 80,
        },
    };

    Ok((host.into(), port))
}

fn bind_local(
    socket: &socket2::Socket,
    dst_addr: &SocketAddr,
    options: &TransportOptions,
) -> io::Result<()> {
    let mut ip = match dst_addr {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    let mut bind_address = false;

    if let Some(Interface(interface)) = &options.interface {
        match interface.parse::<IpAddr>() {
            Ok(addr) => {
                ip = addr;
                bind_address = true;
            }
            Err(_) => bind_device(socket, interface)?,
        }
    }

    match options.local_port {
        Some(first) => {
            let count = options.local_port_range.unwrap_or(1).max(1);
            let mut failure = None;
            for offset in 0..count {
                let Some(port) = first.checked_add(offset) else {
                    break;
                };
                match socket.bind(&SocketAddr::new(ip, port).into()) {
                    Ok(()) => {
                        trace!(port, "bound local port");
                        return Ok(());
                    }
                    Err(error) => failure = Some(error),
                }
            }
            Err(failure.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::AddrInUse, "no local port available")
            }))
        }
        None if bind_address => socket.bind(&SocketAddr::new(ip, 0).into()),
        None => Ok(()),
    }
}

#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
fn bind_device(socket: &socket2::Socket, interface: &str) -> io::Result<()> {
    socket.bind_device(Some(interface.as_bytes()))
}

#[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
fn bind_device(_socket: &socket2::Socket, interface: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("binding to device {interface:?} is not supported on this platform"),
    ))
}

/// Ask an HTTP proxy to open a tunnel to `host:port`.
#[tracing::instrument(level = "trace", skip(stream, auth))]
async fn tunnel(
    mut stream: TcpStream,
    host: &str,
    port: u16,
    auth: Option<&str>,
) -> Result<TcpStream, TransferError> {
    let authority = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    };

    let mut request = format!("CONNECT {authority} HTTP/1.1\r\nHost: {authority}\r\n");
    if let Some(auth) = auth {
        request.push_str(&format!("Proxy-Authorization: {auth}\r\n"));
    }
    request.push_str("\r\n");

    stream
        .write_all(request.as_bytes())
        .await
        .map_err(TransferError::msg(ErrorKind::ProxyFailure, "proxy tunnel write"))?;

    let mut response = Vec::with_capacity(256);
    let mut buffer = [0u8; 512];
    while !response.windows(4).any(|window| window == b"\r\n\r\n") {
        let n = stream
            .read(&mut buffer)
            .await
            .map_err(TransferError::msg(ErrorKind::ProxyFailure, "proxy tunnel read"))?;
        if n == 0 {
            return Err(TransferError::new(
                ErrorKind::ProxyFailure,
                "proxy closed the connection during CONNECT",
            ));
        }
        response.extend_from_slice(&buffer[..n]);
        if response.len() > MAX_TUNNEL_RESPONSE {
            return Err(TransferError::new(
                ErrorKind::ProxyFailure,
                "proxy CONNECT response headers too large",
            ));
        }
    }

    let response = String::from_utf8_lossy(&response);
    let status_line = response.lines().next().unwrap_or_default();
    let success = status_line
        .split_whitespace()
        .nth(1)
        .is_some_and(|code| code.starts_with('2') && code.len() == 3);

    if success {
        trace!(status = status_line, "proxy tunnel established");
        Ok(stream)
    } else {
        Err(TransferError::new(
            ErrorKind::ProxyFailure,
            format!("proxy refused CONNECT: {status_line}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::net::TcpListener;

    use crate::options::Resolve;

    fn connector(options: TransportOptions) -> Connector {
        Connector::new(options, Arc::new(TransportConfig::default()))
    }

    #[test]
    fn test_get_host_and_port() {
        let uri: Uri = "http://example.com".parse().unwrap();
        assert_eq!(get_host_and_port(&uri).unwrap(), ("example.com".into(), 80));

        let uri: Uri = "https://example.com".parse().unwrap();
        assert_eq!(
            get_host_and_port(&uri).unwrap(),
            ("example.com".into(), 443)
        );

        let uri: Uri = "http://[::1]:8080".parse().unwrap();
        assert_eq!(get_host_and_port(&uri).unwrap(), ("::1".into(), 8080));

        let uri: Uri = "/relative".parse().unwrap();
        assert_eq!(
            get_host_and_port(&uri).unwrap_err().kind(),
            ErrorKind::InvalidUrl
        );
    }

    #[test]
    fn proxy_without_scheme() {
        assert_eq!(parse_proxy("localhost:3128").unwrap().scheme_str(), Some("http"));
    }

    #[tokio::test]
    async fn resolve_override_wins() {
        let mut options = TransportOptions::default();
        options.resolve = vec![Resolve::new("example.test", IpAddr::from([10, 1, 2, 3]))];
        let addrs = connector(options).resolve("example.test", 80).await.unwrap();
        assert_eq!(addrs, vec![SocketAddr::from(([10, 1, 2, 3], 80))]);
    }

    #[tokio::test]
    async fn refused_connection() {
        let _ = tracing_subscriber::fmt::try_init();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let uri: Uri = format!("http://{addr}/").parse().unwrap();
        let error = connector(TransportOptions::default())
            .connect(&uri)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ConnectionFailure);
    }

    #[tokio::test]
    async fn tunnel_through_proxy() {
        let _ = tracing_subscriber::fmt::try_init();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let proxy = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 1024];
            let n = stream.read(&mut request).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&request[..n]).into_owned()
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        tunnel(stream, "example.com", 443, Some("Basic dTpw"))
            .await
            .unwrap();

        let request = proxy.await.unwrap();
        assert!(request.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(request.contains("Proxy-Authorization: Basic dTpw\r\n"));
    }

    #[tokio::test]
    async fn tunnel_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 1024];
            let _ = stream.read(&mut request).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n")
                .await
                .unwrap();
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let error = tunnel(stream, "example.com", 443, None).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::ProxyFailure);
        assert!(error.message().contains("407"));
    }
}
