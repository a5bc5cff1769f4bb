use std::net::IpAddr;
use std::time::Duration;

use courier::options::{
    Authentication, Bearer, Body, Header, Multipart, Parameters, Part, Payload, Redirect, Resolve,
    Timeout, UserAgent,
};
use courier::{ErrorKind, Session};

mod common;

use common::{echoed, init_tracing, server};

#[test]
fn get_hello() {
    init_tracing();

    let mut session = Session::new();
    session.set(server().url("/hello"));
    let response = session.get().unwrap();

    assert!(response.error().is_ok(), "{}", response.error());
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.reason(), "OK");
    assert_eq!(response.status_line(), "HTTP/1.1 200 OK");
    assert_eq!(response.text(), "Hello world!");
    assert_eq!(response.url(), server().url("/hello"));
    assert_eq!(response.header("Content-Type"), Some("text/plain"));
    assert_eq!(response.downloaded_bytes(), 12);
    assert_eq!(response.redirect_count(), 0);
    assert!(response.raw_header().starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.raw_header().ends_with("\r\n\r\n"));
    assert!(response.elapsed() > Duration::ZERO);
}

#[test]
fn one_shot_function() {
    init_tracing();

    let response = courier::get([server().url("/hello")]).unwrap();
    assert_eq!(response.text(), "Hello world!");
}

#[test]
fn session_is_reusable() {
    init_tracing();

    let mut session = Session::new();
    session.set(server().url("/hello"));
    assert_eq!(session.get().unwrap().text(), "Hello world!");

    session.set(server().url("/status/404"));
    let response = session.get().unwrap();
    assert!(response.error().is_ok());
    assert_eq!(response.status_code(), 404);
    assert!(!response.is_success());
    assert!(session.is_idle());
}

#[test]
fn follows_redirects() {
    init_tracing();

    let mut session = Session::new();
    session.set(server().url("/redirect/3"));
    let response = session.get().unwrap();

    assert!(response.error().is_ok(), "{}", response.error());
    assert_eq!(response.redirect_count(), 3);
    assert_eq!(response.url(), server().url("/hello"));
    assert_eq!(response.text(), "Hello world!");
    assert!(response.raw_header().starts_with("HTTP/1.1 200 OK"));
}

#[test]
fn redirect_limit() {
    init_tracing();

    let mut session = Session::new();
    session.set(server().url("/redirect/3")).set(Redirect::new(1));
    let response = session.get().unwrap();
    assert_eq!(response.error().kind(), ErrorKind::TooManyRedirects);
}

#[test]
fn redirects_disabled() {
    init_tracing();

    let mut session = Session::new();
    session.set(server().url("/redirect/2")).set(Redirect::none());
    let response = session.get().unwrap();

    assert!(response.error().is_ok());
    assert_eq!(response.status_code(), 302);
    assert_eq!(response.header("location"), Some("/redirect/1"));
    assert_eq!(response.redirect_count(), 0);
}

#[test]
fn parameters_and_headers_reach_server() {
    init_tracing();

    let mut session = Session::new();
    session
        .set(server().url("/echo"))
        .set(Parameters::new([("q", "rust"), ("page", "2")]))
        .set(Header::from_iter([("X-Trace", "abc")]))
        .set(Authentication::new("user", "pass"));
    let response = session.get().unwrap();
    let body = response.text();

    assert_eq!(echoed(body, "method"), Some("GET"));
    assert_eq!(echoed(body, "query"), Some("q=rust&page=2"));
    assert_eq!(echoed(body, "x-trace"), Some("abc"));
    assert_eq!(echoed(body, "authorization"), Some("Basic dXNlcjpwYXNz"));
    assert!(echoed(body, "user-agent").unwrap().starts_with("courier/"));
    assert_eq!(echoed(body, "body"), Some(""));
}

#[test]
fn user_agent_and_bearer() {
    init_tracing();

    let mut session = Session::new();
    session
        .set(server().url("/echo"))
        .set(UserAgent::from("integration-test/1.0"))
        .set(Bearer::new("t0ken"));
    let body = session.get().unwrap().into_text();

    assert_eq!(echoed(&body, "user-agent"), Some("integration-test/1.0"));
    assert_eq!(echoed(&body, "authorization"), Some("Bearer t0ken"));
}

#[test]
fn post_form_payload() {
    init_tracing();

    let response = courier::post([
        courier::Directive::from(server().url("/echo")),
        Payload::new([("name", "courier"), ("lang", "rust")]).into(),
    ])
    .unwrap();
    let body = response.text();

    assert_eq!(echoed(body, "method"), Some("POST"));
    assert_eq!(
        echoed(body, "content-type"),
        Some("application/x-www-form-urlencoded")
    );
    assert_eq!(echoed(body, "body"), Some("name=courier&lang=rust"));
    assert_eq!(response.uploaded_bytes(), 22);
}

#[test]
fn put_raw_body() {
    init_tracing();

    let mut session = Session::new();
    session
        .set(server().url("/echo"))
        .set(Body::from(r#"{"id":1}"#).with_content_type("application/json"));
    let body = session.put().unwrap().into_text();

    assert_eq!(echoed(&body, "method"), Some("PUT"));
    assert_eq!(echoed(&body, "content-type"), Some("application/json"));
    assert_eq!(echoed(&body, "body"), Some(r#"{"id":1}"#));
}

#[test]
fn multipart_upload() {
    init_tracing();

    let mut session = Session::new();
    session.set(server().url("/echo")).set(Multipart::new([
        Part::text("name", "courier"),
        Part::buffer("upload", "file contents", "notes.txt"),
    ]));
    let body = session.post().unwrap().into_text();

    assert!(echoed(&body, "content-type")
        .unwrap()
        .starts_with("multipart/form-data; boundary="));
    assert!(body.contains(r#"name="name""#));
    assert!(body.contains(r#"filename="notes.txt""#));
    assert!(body.contains("file contents"));
}

#[test]
fn head_and_delete() {
    init_tracing();

    let mut session = Session::new();
    session.set(server().url("/hello"));
    let head = session.head().unwrap();
    assert_eq!(head.status_code(), 200);
    assert_eq!(head.text(), "");

    session.set(server().url("/echo"));
    let body = session.delete().unwrap().into_text();
    assert_eq!(echoed(&body, "method"), Some("DELETE"));
}

#[test]
fn response_cookies() {
    init_tracing();

    let response = courier::get([server().url("/cookies/set")]).unwrap();
    let cookies = response.cookies();

    assert_eq!(cookies.len(), 2);
    assert_eq!(cookies.get("session"), Some("abc123"));
    assert_eq!(cookies.get("theme"), Some("dark"));
}

#[test]
fn whole_transfer_timeout() {
    init_tracing();

    let mut session = Session::new();
    session
        .set(server().url("/delay/2000"))
        .set(Timeout(Duration::from_millis(100)));
    let response = session.get().unwrap();

    assert_eq!(response.error().kind(), ErrorKind::Timeout);
    assert!(response.elapsed() < Duration::from_millis(1500));
}

#[test]
fn refused_connection() {
    init_tracing();

    let response = courier::get(["http://127.0.0.1:1/"]).unwrap();
    assert_eq!(response.error().kind(), ErrorKind::ConnectionFailure);
    assert_eq!(response.status_code(), 0);
}

#[test]
fn invalid_urls() {
    init_tracing();

    let response = courier::get(["not a url"]).unwrap();
    assert_eq!(response.error().kind(), ErrorKind::InvalidUrl);

    let response = courier::get(["ftp://127.0.0.1/file"]).unwrap();
    assert_eq!(response.error().kind(), ErrorKind::UnsupportedProtocol);
}

#[test]
fn resolve_override() {
    init_tracing();

    let port = server().addr().port();
    let mut session = Session::new();
    session
        .set(format!("http://courier.invalid:{port}/hello"))
        .set(Resolve::new("courier.invalid", IpAddr::from([127, 0, 0, 1])).with_ports([port]));
    let response = session.get().unwrap();

    assert!(response.error().is_ok(), "{}", response.error());
    assert_eq!(response.text(), "Hello world!");
}
