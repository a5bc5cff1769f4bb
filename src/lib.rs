//! Courier
//!
//! A session-oriented HTTP client. Configure a [`Session`], call a verb, get a
//! [`Response`]. Bodies can be buffered, streamed to a callback, or decoded as
//! server-sent events; requests can run blocking, on a background [`Scheduler`],
//! or concurrently in a [`MultiPerform`] batch, and [interceptors](interceptor) can
//! wrap any of them.
//!
//! ```no_run
//! use courier::callbacks::SseCallback;
//! use courier::Session;
//!
//! let mut session = Session::new();
//! session.set("http://localhost:8080/events");
//! session.set(SseCallback::new(|event| {
//!     println!("{}: {}", event.event, event.data);
//!     event.event != "done"
//! }));
//! let response = session.get()?;
//! println!("stream ended: {}", response.error());
//! # Ok::<(), courier::Error>(())
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod api;
pub mod body;
pub mod bridge;
pub mod callbacks;
pub mod cancel;
pub mod cookies;
pub mod error;
pub mod interceptor;
pub mod multi;
pub mod options;
pub mod response;
pub mod scheduler;
pub mod session;
pub(crate) mod service;
pub mod sse;
pub mod transport;

pub use api::*;
pub use cancel::CancelToken;
pub use error::{ConfigurationError, Error, ErrorKind, TransferError};
pub use interceptor::{Interceptor, MultiInterceptor};
pub use multi::MultiPerform;
pub use options::Directive;
pub use response::Response;
pub use scheduler::{AsyncHandle, CancellableHandle, CancellationResult, Scheduler};
pub use session::{Session, Verb};

/// A type-erased error, as used by request bodies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;
