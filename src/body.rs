//! Request bodies handed to a [`Transport`](crate::transport::Transport).
//!
//! A [`RequestBody`] implements [`http_body::Body`], so it can be sent through any
//! hyper connection. It is either empty, a buffer that is already in memory, or a
//! stream pulled from a [`ReadCallback`].

use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http_body::{Frame, SizeHint};
use thiserror::Error;

use crate::callbacks::{ReadCallback, ReadResult};
use crate::BoxError;

const READ_CHUNK: usize = 16 * 1024;

/// The upload was stopped because the read callback returned [`ReadResult::Abort`].
#[derive(Debug, Error)]
#[error("read callback aborted the upload")]
pub struct UploadAborted {
    _priv: (),
}

/// A request body.
///
/// Bodies can be created from [`Bytes`], [`String`], `Vec<u8>` or a `&'static str`
/// with [`From`], or streamed from a callback with [`RequestBody::from_read`].
#[derive(Debug, Default)]
pub struct RequestBody {
    inner: InnerBody,
    sent: Arc<AtomicU64>,
}

impl RequestBody {
    /// An empty body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A body pulled from `callback` as the transport writes it.
    pub fn from_read(callback: ReadCallback) -> Self {
        Self {
            inner: InnerBody::Read {
                remaining: callback.size(),
                callback,
                done: false,
            },
            sent: Arc::default(),
        }
    }

    /// Share a counter of bytes handed to the transport.
    pub fn with_counter(mut self, sent: Arc<AtomicU64>) -> Self {
        self.sent = sent;
        self
    }

    /// Bytes handed to the transport so far.
    pub fn bytes_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Duplicate the body so it can be replayed, e.g. after a `307` redirect.
    ///
    /// Streamed bodies can not be replayed and return `None`.
    pub fn try_clone(&self) -> Option<Self> {
        let inner = match &self.inner {
            InnerBody::Empty => InnerBody::Empty,
            InnerBody::Full(data) => InnerBody::Full(data.clone()),
            InnerBody::Read { .. } => return None,
        };

        Some(Self {
            inner,
            sent: self.sent.clone(),
        })
    }
}

impl From<Bytes> for RequestBody {
    fn from(body: Bytes) -> Self {
        Self {
            inner: if body.is_empty() {
                InnerBody::Empty
            } else {
                InnerBody::Full(Some(body))
            },
            sent: Arc::default(),
        }
    }
}

impl From<String> for RequestBody {
    fn from(body: String) -> Self {
        Bytes::from(body).into()
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(body: Vec<u8>) -> Self {
        Bytes::from(body).into()
    }
}

impl From<&'static str> for RequestBody {
    fn from(body: &'static str) -> Self {
        Bytes::from_static(body.as_bytes()).into()
    }
}

#[derive(Default)]
enum InnerBody {
    #[default]
    Empty,
    Full(Option<Bytes>),
    Read {
        callback: ReadCallback,
        remaining: Option<u64>,
        done: bool,
    },
}

impl fmt::Debug for InnerBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InnerBody::Empty => f.debug_struct("Empty").finish(),
            InnerBody::Full(_) => f.debug_struct("Full").finish(),
            InnerBody::Read { remaining, .. } => f
                .debug_struct("Read")
                .field("remaining", remaining)
                .finish(),
        }
    }
}

impl http_body::Body for RequestBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let frame = match &mut this.inner {
            InnerBody::Empty => None,
            InnerBody::Full(data) => data.take(),
            InnerBody::Read {
                callback,
                remaining,
                done,
            } => {
                if *done {
                    return Poll::Ready(None);
                }

                let mut buffer = BytesMut::zeroed(READ_CHUNK);
                match callback.call(&mut buffer) {
                    ReadResult::Data(n) if n > 0 => {
                        buffer.truncate(n.min(READ_CHUNK));
                        if let Some(remaining) = remaining {
                            *remaining = remaining.saturating_sub(buffer.len() as u64);
                            *done = *remaining == 0;
                        }
                        Some(buffer.freeze())
                    }
                    ReadResult::Data(_) | ReadResult::Done => {
                        *done = true;
                        None
                    }
                    ReadResult::Abort => {
                        *done = true;
                        tracing::debug!("read callback aborted upload");
                        return Poll::Ready(Some(Err(UploadAborted { _priv: () }.into())));
                    }
                }
            }
        };

        Poll::Ready(frame.map(|data| {
            this.sent.fetch_add(data.len() as u64, Ordering::Relaxed);
            Ok(Frame::data(data))
        }))
    }

    fn is_end_stream(&self) -> bool {
        match &self.inner {
            InnerBody::Empty => true,
            InnerBody::Full(data) => data.is_none(),
            InnerBody::Read { done, .. } => *done,
        }
    }

    fn size_hint(&self) -> SizeHint {
        match &self.inner {
            InnerBody::Empty => SizeHint::with_exact(0),
            InnerBody::Full(data) => {
                SizeHint::with_exact(data.as_ref().map(|data| data.len() as u64).unwrap_or(0))
            }
            InnerBody::Read {
                remaining: Some(remaining),
                ..
            } => SizeHint::with_exact(*remaining),
            InnerBody::Read { .. } => SizeHint::default(),
        }
    }
}
