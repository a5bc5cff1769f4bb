//! Incremental decoder for `text/event-stream` bodies.
//!
//! The decoder accepts arbitrary byte chunks. Chunk boundaries do not need to line
//! up with lines, frames, or even UTF-8 characters: incomplete input is buffered
//! until the rest of it arrives.
//!
//! ```
//! use courier::sse::SseDecoder;
//!
//! let mut decoder = SseDecoder::new();
//! assert_eq!(decoder.feed(b"event: tick\nda").count(), 0);
//!
//! let events: Vec<_> = decoder.feed(b"ta: 1\n\n").collect();
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].event, "tick");
//! assert_eq!(events[0].data, "1");
//! ```

use std::fmt;

/// Event type used when a frame does not carry an `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One event parsed from a server-sent event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSentEvent {
    /// The `id:` field of the frame, if any.
    pub id: Option<String>,

    /// The `event:` field of the frame, or `"message"`.
    pub event: String,

    /// All `data:` lines of the frame joined with `\n`.
    pub data: String,

    /// The `retry:` hint in milliseconds, if it was a valid integer.
    pub retry: Option<u64>,
}

impl fmt::Display for ServerSentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.event, self.data)
    }
}

/// Fields of the frame currently being assembled.
#[derive(Debug, Default)]
struct PartialEvent {
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
    retry: Option<u64>,
}

impl PartialEvent {
    fn take(&mut self) -> Option<ServerSentEvent> {
        let partial = std::mem::take(self);
        if partial.data.is_empty() {
            return None;
        }

        Some(ServerSentEvent {
            id: partial.id,
            event: partial.event.unwrap_or_else(|| DEFAULT_EVENT.to_owned()),
            data: partial.data.join("\n"),
            retry: partial.retry,
        })
    }
}

/// Resumable parser for server-sent events.
///
/// State lives as long as one response stream. A frame that is still missing its
/// terminating blank line when the decoder is dropped or [reset](SseDecoder::reset)
/// is discarded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    consumed: usize,
    event: PartialEvent,
    last_event_id: Option<String>,
}

impl SseDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return the events it completes.
    ///
    /// The iterator is lazy: lines are parsed as it is advanced. Events that are not
    /// pulled before the iterator is dropped stay queued and are produced by the next
    /// call to `feed`.
    pub fn feed(&mut self, chunk: &[u8]) -> Events<'_> {
        if self.consumed > 0 {
            self.buffer.drain(..self.consumed);
            self.consumed = 0;
        }
        self.buffer.extend_from_slice(chunk);
        Events { decoder: self }
    }

    /// The most recent non-empty `id:` seen on this stream.
    ///
    /// Unlike [`ServerSentEvent::id`] this survives across frames, which makes it
    /// suitable for a `Last-Event-ID` header when reconnecting.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Drop all buffered input and any partially assembled frame.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// True when there is no buffered input and no partial frame.
    pub fn is_idle(&self) -> bool {
        self.consumed == self.buffer.len()
            && self.event.data.is_empty()
            && self.event.event.is_none()
            && self.event.id.is_none()
            && self.event.retry.is_none()
    }

    fn next_line(&mut self) -> Option<String> {
        let pending = &self.buffer[self.consumed..];
        let end = pending.iter().position(|&b| b == b'\n')?;
        let mut line = &pending[..end];
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }
        let line = String::from_utf8_lossy(line).into_owned();
        self.consumed += end + 1;
        Some(line)
    }

    fn process(&mut self, line: &str) -> Option<ServerSentEvent> {
        if line.is_empty() {
            return self.event.take();
        }

        // Indentation before the field name is not significant.
        let line = line.trim_start_matches([' ', '\t']);
        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event.event = (!value.is_empty()).then(|| value.to_owned()),
            "data" => self.event.data.push(value.to_owned()),
            "id" => {
                // An empty id neither sets nor clears the current one.
                if !value.is_empty() && !value.contains('\0') {
                    self.event.id = Some(value.to_owned());
                    self.last_event_id = Some(value.to_owned());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(retry) = value.parse() {
                        self.event.retry = Some(retry);
                    }
                }
            }
            _ => {
                tracing::trace!(field, "ignoring unknown sse field");
            }
        }

        None
    }
}

/// Iterator over the events completed by a [`SseDecoder::feed`] call.
#[derive(Debug)]
pub struct Events<'d> {
    decoder: &'d mut SseDecoder,
}

impl Iterator for Events<'_> {
    type Item = ServerSentEvent;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(line) = self.decoder.next_line() {
            if let Some(event) = self.decoder.process(&line) {
                return Some(event);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &[u8]) -> Vec<ServerSentEvent> {
        SseDecoder::new().feed(input).collect()
    }

    fn decode_split(input: &[u8], size: usize) -> Vec<ServerSentEvent> {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in input.chunks(size) {
            events.extend(decoder.feed(chunk));
        }
        events
    }

    const STREAM: &[u8] = b": keep-alive\n\
        id: 1\n\
        event: update\n\
        data: {\"a\":1}\n\
        \n\
        data: first\r\n\
        data: second\r\n\
        retry: 1500\r\n\
        \r\n\
        id: 3\n\
        data: caf\xc3\xa9\n\
        \n";

    #[test]
    fn decodes_full_stream() {
        let events = decode_all(STREAM);
        assert_eq!(events.len(), 3);

        assert_eq!(events[0].id.as_deref(), Some("1"));
        assert_eq!(events[0].event, "update");
        assert_eq!(events[0].data, "{\"a\":1}");
        assert_eq!(events[0].retry, None);

        assert_eq!(events[1].id, None);
        assert_eq!(events[1].event, DEFAULT_EVENT);
        assert_eq!(events[1].data, "first\nsecond");
        assert_eq!(events[1].retry, Some(1500));

        assert_eq!(events[2].data, "café");
    }

    #[test]
    fn any_split_matches_whole() {
        let whole = decode_all(STREAM);
        for size in 1..STREAM.len() {
            assert_eq!(decode_split(STREAM, size), whole, "chunk size {size}");
        }
    }

    #[test]
    fn frame_without_data_is_not_emitted() {
        let events = decode_all(b"event: ping\nid: 7\nretry: 10\n\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
        assert_eq!(events[0].event, DEFAULT_EVENT);
        assert_eq!(events[0].id, None);
        assert_eq!(events[0].retry, None);
    }

    #[test]
    fn comments_contribute_nothing() {
        let events = decode_all(b":data: nope\ndata: yes\n: event: nope\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "yes");
        assert_eq!(events[0].event, DEFAULT_EVENT);
    }

    #[test]
    fn data_lines_join_in_order() {
        let events = decode_all(b"data: a\ndata: b\ndata:c\n\n");
        assert_eq!(events[0].data, "a\nb\nc");
    }

    #[test]
    fn indented_fields_are_recognised() {
        let events = decode_all(b"data: a\n data: b\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a\nb");

        let events = decode_all(b"\tevent: tick\n   \n  : note\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "tick");
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn empty_event_type_means_message() {
        let events = decode_all(b"event:\ndata: x\n\nevent: a\nevent: \ndata: y\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, DEFAULT_EVENT);
        assert_eq!(events[1].event, DEFAULT_EVENT);
    }

    #[test]
    fn only_one_leading_space_is_stripped() {
        let events = decode_all(b"data:  padded\n\n");
        assert_eq!(events[0].data, " padded");
    }

    #[test]
    fn invalid_retry_is_ignored() {
        for retry in ["abc", "-5", "+5", "1.5", ""] {
            let input = format!("retry: {retry}\ndata: x\n\n");
            let events = decode_all(input.as_bytes());
            assert_eq!(events.len(), 1, "retry {retry:?}");
            assert_eq!(events[0].retry, None, "retry {retry:?}");
        }
    }

    #[test]
    fn last_event_field_wins() {
        let events = decode_all(b"event: a\nevent: b\ndata: x\n\n");
        assert_eq!(events[0].event, "b");
    }

    #[test]
    fn empty_id_is_ignored() {
        let mut decoder = SseDecoder::new();
        let events: Vec<_> = decoder.feed(b"id: 5\nid:\ndata: x\n\n").collect();
        assert_eq!(events[0].id.as_deref(), Some("5"));
        assert_eq!(decoder.last_event_id(), Some("5"));

        let events: Vec<_> = decoder.feed(b"id:\ndata: y\n\n").collect();
        assert_eq!(events[0].id, None);
        assert_eq!(decoder.last_event_id(), Some("5"));
    }

    #[test]
    fn unknown_fields_and_bare_names() {
        let events = decode_all(b"foo: bar\ndata\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "");
    }

    #[test]
    fn incomplete_frame_is_held() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.feed(b"data: partial\n").count(), 0);
        assert!(!decoder.is_idle());
        assert_eq!(decoder.feed(b"data: more").count(), 0);

        let events: Vec<_> = decoder.feed(b"\n\n").collect();
        assert_eq!(events[0].data, "partial\nmore");
        assert!(decoder.is_idle());
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut decoder = SseDecoder::new();
        assert_eq!(decoder.feed(b"data: lost\n").count(), 0);
        decoder.reset();
        let events: Vec<_> = decoder.feed(b"\ndata: kept\n\n").collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "kept");
    }

    #[test]
    fn unpulled_events_survive_to_next_feed() {
        let mut decoder = SseDecoder::new();
        let mut events = decoder.feed(b"data: 1\n\ndata: 2\n\n");
        assert_eq!(events.next().unwrap().data, "1");
        drop(events);

        let rest: Vec<_> = decoder.feed(b"data: 3\n\n").collect();
        let data: Vec<_> = rest.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, ["2", "3"]);
    }
}
