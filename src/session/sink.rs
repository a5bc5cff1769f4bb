//! Routing of transfer events to the session's installed sink and callbacks.

use crate::callbacks::{DebugCallback, HeaderCallback, ProgressCallback, SseCallback, WriteCallback};
use crate::error::ConfigurationError;
use crate::options::Callbacks;
use crate::sse::SseDecoder;
use crate::transport::{DebugKind, Progress, TransferSink};

/// Where body bytes go. Exactly one is active per transfer.
#[derive(Debug)]
enum Body {
    Buffer(Vec<u8>),
    Write(WriteCallback),
    Sse {
        callback: SseCallback,
        decoder: SseDecoder,
    },
}

/// The [`TransferSink`] a session hands to its transport.
#[derive(Debug)]
pub(crate) struct SessionSink {
    body: Body,
    raw_header: String,
    header: Option<HeaderCallback>,
    progress: Option<ProgressCallback>,
    debug: Option<DebugCallback>,
}

impl SessionSink {
    /// Pick the body sink from the installed callbacks.
    pub(crate) fn new(callbacks: &Callbacks, reserve: usize) -> Result<Self, ConfigurationError> {
        let body = match (&callbacks.write, &callbacks.sse) {
            (Some(_), Some(_)) => return Err(ConfigurationError::ConflictingSinks),
            (Some(write), None) => Body::Write(write.clone()),
            (None, Some(sse)) => Body::Sse {
                callback: sse.clone(),
                decoder: SseDecoder::new(),
            },
            (None, None) => Body::Buffer(Vec::with_capacity(reserve)),
        };

        Ok(Self {
            body,
            raw_header: String::new(),
            header: callbacks.header.clone(),
            progress: callbacks.progress.clone(),
            debug: callbacks.debug.clone(),
        })
    }

    /// The buffered body text and the raw header block.
    pub(crate) fn finish(self) -> (String, String) {
        let text = match self.body {
            Body::Buffer(buffer) => match String::from_utf8(buffer) {
                Ok(text) => text,
                Err(error) => String::from_utf8_lossy(error.as_bytes()).into_owned(),
            },
            Body::Write(_) => String::new(),
            Body::Sse { decoder, .. } => {
                if !decoder.is_idle() {
                    tracing::debug!("discarding incomplete server-sent event");
                }
                String::new()
            }
        };
        (text, self.raw_header)
    }
}

impl TransferSink for SessionSink {
    fn on_header(&mut self, line: &str) -> bool {
        if line.starts_with("HTTP/") {
            // A new status line starts a new header block.
            self.raw_header.clear();
        }
        self.raw_header.push_str(line);
        self.header.as_ref().map_or(true, |callback| callback.call(line))
    }

    fn on_data(&mut self, data: &[u8]) -> bool {
        match &mut self.body {
            Body::Buffer(buffer) => {
                buffer.extend_from_slice(data);
                true
            }
            Body::Write(callback) => callback.call(data),
            Body::Sse { callback, decoder } => {
                for event in decoder.feed(data) {
                    tracing::trace!(event = %event.event, "server-sent event");
                    if !callback.call(event) {
                        return false;
                    }
                }
                true
            }
        }
    }

    fn on_progress(&mut self, progress: Progress) -> bool {
        self.progress
            .as_ref()
            .map_or(true, |callback| callback.call(progress))
    }

    fn on_debug(&mut self, kind: DebugKind, data: &[u8]) {
        if let Some(callback) = &self.debug {
            callback.call(kind, data);
        }
    }
}
