//! User callbacks that can be attached to a session.
//!
//! Callbacks are shared, cloneable handles around a closure. They run synchronously
//! on whichever thread drives the transfer. Callbacks that return `bool` stop the
//! transfer when they return `false`; the response then reports
//! [`ErrorKind::CallbackAbort`][crate::ErrorKind::CallbackAbort].

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::sse::ServerSentEvent;
use crate::transport::{DebugKind, Progress};

macro_rules! callback_debug {
    ($name:ident) => {
        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name)).finish()
            }
        }
    };
}

type WriteFn = dyn FnMut(&[u8]) -> bool + Send;

/// Receives body bytes as they arrive, in transfer order.
#[derive(Clone)]
pub struct WriteCallback(Arc<Mutex<WriteFn>>);

callback_debug!(WriteCallback);

impl WriteCallback {
    /// Wrap a closure. Return `false` to abort the transfer.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&[u8]) -> bool + Send + 'static,
    {
        Self(Arc::new(Mutex::new(callback)))
    }

    /// Write every chunk to `writer`. A write error aborts the transfer.
    pub fn from_writer<W>(mut writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self::new(move |data| match writer.write_all(data) {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!(%error, "write callback sink failed");
                false
            }
        })
    }

    pub(crate) fn call(&self, data: &[u8]) -> bool {
        let mut callback = self.0.lock();
        (*callback)(data)
    }
}

type SseFn = dyn FnMut(ServerSentEvent) -> bool + Send;

/// Receives decoded server-sent events. Return `false` to abort the transfer.
#[derive(Clone)]
pub struct SseCallback(Arc<Mutex<SseFn>>);

callback_debug!(SseCallback);

impl SseCallback {
    /// Wrap a closure.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(ServerSentEvent) -> bool + Send + 'static,
    {
        Self(Arc::new(Mutex::new(callback)))
    }

    pub(crate) fn call(&self, event: ServerSentEvent) -> bool {
        let mut callback = self.0.lock();
        (*callback)(event)
    }
}

/// Result of asking a [`ReadCallback`] for more upload data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    /// This many bytes were written into the buffer.
    Data(usize),
    /// The upload body is complete.
    Done,
    /// Stop the transfer.
    Abort,
}

type ReadFn = dyn FnMut(&mut [u8]) -> ReadResult + Send;

/// Supplies the request body incrementally.
#[derive(Clone)]
pub struct ReadCallback {
    size: Option<u64>,
    callback: Arc<Mutex<ReadFn>>,
}

impl fmt::Debug for ReadCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadCallback")
            .field("size", &self.size)
            .finish()
    }
}

impl ReadCallback {
    /// Wrap a closure that fills the buffer it is given.
    ///
    /// When `size` is known it is sent as the `Content-Length`, otherwise the body is
    /// sent chunked.
    pub fn new<F>(size: Option<u64>, callback: F) -> Self
    where
        F: FnMut(&mut [u8]) -> ReadResult + Send + 'static,
    {
        Self {
            size,
            callback: Arc::new(Mutex::new(callback)),
        }
    }

    /// The announced body size, if any.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    pub(crate) fn call(&self, buffer: &mut [u8]) -> ReadResult {
        let mut callback = self.callback.lock();
        (*callback)(buffer)
    }
}

type HeaderFn = dyn FnMut(&str) -> bool + Send;

/// Receives the status line and each response header line, including the trailing
/// `\r\n`.
#[derive(Clone)]
pub struct HeaderCallback(Arc<Mutex<HeaderFn>>);

callback_debug!(HeaderCallback);

impl HeaderCallback {
    /// Wrap a closure. Return `false` to abort the transfer.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(&str) -> bool + Send + 'static,
    {
        Self(Arc::new(Mutex::new(callback)))
    }

    pub(crate) fn call(&self, line: &str) -> bool {
        let mut callback = self.0.lock();
        (*callback)(line)
    }
}

type ProgressFn = dyn FnMut(Progress) -> bool + Send;

/// Receives byte counters after every chunk.
#[derive(Clone)]
pub struct ProgressCallback(Arc<Mutex<ProgressFn>>);

callback_debug!(ProgressCallback);

impl ProgressCallback {
    /// Wrap a closure. Return `false` to abort the transfer.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(Progress) -> bool + Send + 'static,
    {
        Self(Arc::new(Mutex::new(callback)))
    }

    pub(crate) fn call(&self, progress: Progress) -> bool {
        let mut callback = self.0.lock();
        (*callback)(progress)
    }
}

type DebugFn = dyn FnMut(DebugKind, &[u8]) + Send;

/// Receives a trace of the transfer: informational text, headers and body data.
#[derive(Clone)]
pub struct DebugCallback(Arc<Mutex<DebugFn>>);

callback_debug!(DebugCallback);

impl DebugCallback {
    /// Wrap a closure.
    pub fn new<F>(callback: F) -> Self
    where
        F: FnMut(DebugKind, &[u8]) + Send + 'static,
    {
        Self(Arc::new(Mutex::new(callback)))
    }

    pub(crate) fn call(&self, kind: DebugKind, data: &[u8]) {
        let mut callback = self.0.lock();
        (*callback)(kind, data)
    }
}
