use std::sync::Arc;

use courier::callbacks::{DebugCallback, HeaderCallback, ProgressCallback, SseCallback, WriteCallback};
use courier::options::ReserveSize;
use courier::sse::ServerSentEvent;
use courier::transport::DebugKind;
use courier::{ErrorKind, Session};
use parking_lot::Mutex;

mod common;

use common::{init_tracing, server};

fn collect_events(stop_after: Option<usize>) -> (courier::Response, Vec<ServerSentEvent>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();

    let mut session = Session::new();
    session.set(server().url("/sse")).set(SseCallback::new(move |event| {
        let mut events = sink.lock();
        events.push(event);
        stop_after.map_or(true, |limit| events.len() < limit)
    }));
    let response = session.get().unwrap();

    let events = std::mem::take(&mut *events.lock());
    (response, events)
}

#[test]
fn sse_events_across_chunks() {
    init_tracing();

    let (response, events) = collect_events(None);
    assert!(response.error().is_ok(), "{}", response.error());
    assert_eq!(response.header("content-type"), Some("text/event-stream"));
    assert_eq!(response.text(), "");
    assert!(response.downloaded_bytes() > 0);

    assert_eq!(events.len(), 3);

    assert_eq!(events[0].event, "greeting");
    assert_eq!(events[0].data, "hello\nworld");
    assert_eq!(events[0].id.as_deref(), Some("1"));

    assert_eq!(events[1].event, "message");
    assert_eq!(events[1].data, "second");
    assert_eq!(events[1].id, None);
    assert_eq!(events[1].retry, None);

    assert_eq!(events[2].event, "done");
    assert_eq!(events[2].data, "bye");
}

#[test]
fn sse_callback_stops_stream() {
    init_tracing();

    let (response, events) = collect_events(Some(1));
    assert_eq!(response.error().kind(), ErrorKind::CallbackAbort);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event, "greeting");
}

#[test]
fn write_callback_receives_body() {
    init_tracing();

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = received.clone();

    let mut session = Session::new();
    session
        .set(server().url("/chunks"))
        .set(ReserveSize(16 * 1024))
        .set(WriteCallback::new(move |data| {
            sink.lock().extend_from_slice(data);
            true
        }));
    let response = session.get().unwrap();

    assert!(response.error().is_ok(), "{}", response.error());
    assert_eq!(response.text(), "");
    assert_eq!(response.downloaded_bytes(), 10 * 1024);

    let received = received.lock();
    assert_eq!(received.len(), 10 * 1024);
    assert!(received[..1024].iter().all(|&b| b == b'a'));
    assert!(received[9 * 1024..].iter().all(|&b| b == b'j'));
}

#[test]
fn write_callback_aborts_transfer() {
    init_tracing();

    let received = Arc::new(Mutex::new(0usize));
    let sink = received.clone();

    let mut session = Session::new();
    session
        .set(server().url("/chunks"))
        .set(WriteCallback::new(move |data| {
            *sink.lock() += data.len();
            false
        }));
    let response = session.get().unwrap();

    assert_eq!(response.error().kind(), ErrorKind::CallbackAbort);
    assert!(*received.lock() <= 1024);
}

#[test]
fn download_to_callback() {
    init_tracing();

    let received = Arc::new(Mutex::new(0usize));
    let sink = received.clone();

    let mut session = Session::new();
    session
        .set(server().url("/size?bytes=50000"))
        .set(WriteCallback::new(move |data| {
            *sink.lock() += data.len();
            true
        }));
    let response = session.download().unwrap();

    assert!(response.error().is_ok(), "{}", response.error());
    assert_eq!(response.status_code(), 200);
    assert_eq!(*received.lock(), 50_000);
    assert_eq!(response.text(), "");
}

#[test]
fn progress_reports_counts() {
    init_tracing();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();

    let mut session = Session::new();
    session
        .set(server().url("/size?bytes=4096"))
        .set(ProgressCallback::new(move |progress| {
            sink.lock().push(progress);
            true
        }));
    let response = session.get().unwrap();
    assert!(response.error().is_ok());

    let seen = seen.lock();
    let last = seen.last().unwrap();
    assert_eq!(last.download_now, 4096);
    assert_eq!(last.download_total, Some(4096));
    assert!(seen
        .windows(2)
        .all(|pair| pair[0].download_now <= pair[1].download_now));
}

#[test]
fn progress_can_abort() {
    init_tracing();

    let mut session = Session::new();
    session
        .set(server().url("/chunks"))
        .set(ProgressCallback::new(|progress| progress.download_now < 2048));
    let response = session.get().unwrap();
    assert_eq!(response.error().kind(), ErrorKind::CallbackAbort);
}

#[test]
fn header_callback_sees_lines() {
    init_tracing();

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();

    let mut session = Session::new();
    session
        .set(server().url("/hello"))
        .set(HeaderCallback::new(move |line| {
            sink.lock().push(line.to_owned());
            true
        }));
    let response = session.get().unwrap();
    assert_eq!(response.text(), "Hello world!");

    let lines = lines.lock();
    assert_eq!(lines.first().map(String::as_str), Some("HTTP/1.1 200 OK\r\n"));
    assert_eq!(lines.last().map(String::as_str), Some("\r\n"));
    assert!(lines
        .iter()
        .any(|line| line.eq_ignore_ascii_case("content-type: text/plain\r\n")));
}

#[test]
fn debug_callback_traces_transfer() {
    init_tracing();

    let kinds = Arc::new(Mutex::new(Vec::new()));
    let sink = kinds.clone();

    let mut session = Session::new();
    session
        .set(server().url("/hello"))
        .set(DebugCallback::new(move |kind, _| sink.lock().push(kind)));
    session.get().unwrap();

    let kinds = kinds.lock();
    assert!(kinds.contains(&DebugKind::Text));
    assert!(kinds.contains(&DebugKind::HeaderOut));
    assert!(kinds.contains(&DebugKind::HeaderIn));
    assert!(kinds.contains(&DebugKind::DataIn));
}
