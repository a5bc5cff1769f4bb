//! A local HTTP server shared by the integration tests.
//!
//! The server runs on its own thread and runtime, so blocking client calls made by
//! the tests never share an event loop with it.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Duration;

use bytes::Bytes;
use courier::bridge::io::TokioIo;
use futures_util::stream;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::service::service_fn;

type Body = UnsyncBoxBody<Bytes, Infallible>;

/// Frames of the `/sse` stream, split so that events straddle chunk boundaries.
pub const SSE_CHUNKS: &[&str] = &[
    ": keep-alive\n\nevent: greeting\nda",
    "ta: hello\ndata: wor",
    "ld\nid: 1\n\n",
    "retry: soon\ndata: second\r\n\r\n",
    "event: done\ndata: bye\n\n",
];

/// Handle to the running server.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
}

impl TestServer {
    /// An absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// The server for this test binary, started on first use.
pub fn server() -> &'static TestServer {
    static SERVER: OnceLock<TestServer> = OnceLock::new();
    SERVER.get_or_init(start)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

fn start() -> TestServer {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind test server");
    listener
        .set_nonblocking(true)
        .expect("set test listener non-blocking");
    let addr = listener.local_addr().expect("test server address");

    std::thread::Builder::new()
        .name("courier-test-server".into())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("test server runtime");
            runtime.block_on(accept(listener));
        })
        .expect("spawn test server");

    TestServer { addr }
}

async fn accept(listener: std::net::TcpListener) {
    let listener = tokio::net::TcpListener::from_std(listener).expect("tokio listener");
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            continue;
        };
        tokio::spawn(async move {
            let service = service_fn(|request| async move { Ok::<_, Infallible>(route(request).await) });
            let _ = hyper::server::conn::http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await;
        });
    }
}

fn full<B: Into<Bytes>>(body: B) -> Body {
    Full::new(body.into()).boxed_unsync()
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain")
        .body(full(body))
        .expect("valid response")
}

fn query(request: &Request<Incoming>, key: &str) -> Option<String> {
    let query = request.uri().query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
}

fn chunked<I>(chunks: I, delay: Duration, content_type: &'static str) -> Response<Body>
where
    I: IntoIterator<Item = Bytes> + Send + 'static,
    I::IntoIter: Send,
{
    let frames = stream::unfold(chunks.into_iter(), move |mut chunks| async move {
        let chunk = chunks.next()?;
        tokio::time::sleep(delay).await;
        Some((Ok::<_, Infallible>(Frame::data(chunk)), chunks))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(StreamBody::new(frames).boxed_unsync())
        .expect("valid response")
}

async fn route(request: Request<Incoming>) -> Response<Body> {
    let path = request.uri().path().to_owned();
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    match segments.as_slice() {
        ["hello"] => text(StatusCode::OK, "Hello world!"),

        ["sse"] => chunked(
            SSE_CHUNKS.iter().map(|chunk| Bytes::from_static(chunk.as_bytes())),
            Duration::from_millis(10),
            "text/event-stream",
        ),

        // Ten chunks of 1 KiB each, slowly.
        ["chunks"] => chunked(
            (0..10u8).map(|n| Bytes::from(vec![b'a' + n; 1024])),
            Duration::from_millis(20),
            "application/octet-stream",
        ),

        ["delay", millis] => {
            let millis = millis.parse().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(millis)).await;
            text(StatusCode::OK, format!("waited {millis}ms"))
        }

        ["redirect", remaining] => {
            let remaining: u32 = remaining.parse().unwrap_or(0);
            let location = if remaining <= 1 {
                "/hello".to_owned()
            } else {
                format!("/redirect/{}", remaining - 1)
            };
            Response::builder()
                .status(StatusCode::FOUND)
                .header(header::LOCATION, location)
                .body(full(""))
                .expect("valid response")
        }

        ["status", code] => {
            let status = code
                .parse()
                .ok()
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::BAD_REQUEST);
            text(status, status.canonical_reason().unwrap_or_default())
        }

        ["cookies", "set"] => Response::builder()
            .header(header::SET_COOKIE, "session=abc123; Path=/; HttpOnly")
            .header(header::SET_COOKIE, "theme=dark; Max-Age=3600")
            .body(full("cookies set"))
            .expect("valid response"),

        // Reports the request line, selected headers and the body.
        ["echo"] => {
            let method = request.method().clone();
            let mut lines = vec![format!("method: {method}")];
            if let Some(query) = request.uri().query() {
                lines.push(format!("query: {query}"));
            }
            let mut names: Vec<_> = request.headers().keys().map(|name| name.as_str().to_owned()).collect();
            names.sort();
            names.dedup();
            for name in names {
                let values: Vec<_> = request
                    .headers()
                    .get_all(name.as_str())
                    .iter()
                    .filter_map(|value| value.to_str().ok())
                    .collect();
                lines.push(format!("{name}: {}", values.join(", ")));
            }

            let body = match request.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(_) => return text(StatusCode::BAD_REQUEST, "unreadable body"),
            };
            if method != Method::HEAD {
                lines.push(format!("body: {}", String::from_utf8_lossy(&body)));
            }
            text(StatusCode::OK, lines.join("\n"))
        }

        ["size"] => match query(&request, "bytes").and_then(|bytes| bytes.parse::<usize>().ok()) {
            Some(bytes) => text(StatusCode::OK, vec![b'x'; bytes]),
            None => text(StatusCode::BAD_REQUEST, "missing bytes"),
        },

        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

/// The value of `name` in an `/echo` response.
pub fn echoed<'r>(body: &'r str, name: &str) -> Option<&'r str> {
    body.lines().find_map(|line| {
        let (key, value) = line.split_once(": ")?;
        (key == name).then_some(value)
    })
}
