//! The request session.
//!
//! A [`Session`] accumulates configuration and runs one request at a time through
//! three phases:
//!
//! 1. **Prepare** turns the configuration into a [`Transfer`], taking the session's
//!    transport with it. Configuration mistakes are reported here, before any I/O.
//! 2. **Perform** runs the transfer, routing body bytes to exactly one sink: the
//!    internal buffer, a [`WriteCallback`](crate::callbacks::WriteCallback), or a
//!    [`SseCallback`](crate::callbacks::SseCallback) through an
//!    [`SseDecoder`](crate::sse::SseDecoder).
//! 3. **Complete** returns the transport to the session and assembles the
//!    [`Response`].
//!
//! The verb methods (`get`, `post`, ...) run all three phases, wrapped by any
//! attached [interceptors](crate::interceptor). Callers with their own event loop
//! can drive the phases directly with [`Session::prepare`], [`Transfer::perform`]
//! and [`Session::complete`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use http::header::{
    HeaderName, HeaderValue, ACCEPT_ENCODING, AUTHORIZATION, CONTENT_TYPE, COOKIE, RANGE,
    USER_AGENT,
};
use http::{HeaderMap, Method};

use crate::body::RequestBody;
use crate::bridge::rt;
use crate::cancel::CancelToken;
use crate::error::{ConfigurationError, Error};
use crate::interceptor::{Interceptor, Proceed};
use crate::options::{BodySource, Directive, Multipart, SessionOptions};
use crate::response::Response;
use crate::scheduler::{AsyncHandle, CancellableHandle, Scheduler};
use crate::transport::{HyperTransport, TransferRequest, Transport};

mod sink;
mod transfer;

use self::sink::SessionSink;
pub use self::transfer::{Completed, Transfer};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// The HTTP operation a session performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
    /// A `GET` whose body goes to the session's write callback.
    Download,
}

impl Verb {
    /// The request method sent for this verb.
    pub fn method(self) -> Method {
        match self {
            Verb::Get | Verb::Download => Method::GET,
            Verb::Post => Method::POST,
            Verb::Put => Method::PUT,
            Verb::Patch => Method::PATCH,
            Verb::Delete => Method::DELETE,
            Verb::Head => Method::HEAD,
            Verb::Options => Method::OPTIONS,
        }
    }

    fn sends_body(self) -> bool {
        !matches!(self, Verb::Get | Verb::Head | Verb::Download)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verb::Download => f.write_str("DOWNLOAD"),
            verb => f.write_str(verb.method().as_str()),
        }
    }
}

/// A configurable, reusable HTTP request.
///
/// Configure with [`Session::set`], then call a verb. The session can be
/// reconfigured and reused once the verb returns.
///
/// ```no_run
/// use courier::options::{Parameters, Timeout};
/// use courier::Session;
/// use std::time::Duration;
///
/// let mut session = Session::new();
/// session
///     .set("http://localhost:8080/search")
///     .set(Parameters::new([("q", "courier")]))
///     .set(Timeout(Duration::from_secs(5)));
///
/// let response = session.get()?;
/// println!("{}: {}", response.status_code(), response.text());
/// # Ok::<(), courier::Error>(())
/// ```
pub struct Session {
    id: u64,
    options: SessionOptions,
    transport: Option<Box<dyn Transport>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    cancel: Option<CancelToken>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("url", &self.options.url.as_str())
            .field("transport", &self.transport)
            .field("interceptors", &self.interceptors.len())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A session using the default [`HyperTransport`].
    pub fn new() -> Self {
        Self::with_transport(HyperTransport::new())
    }

    /// A session using a custom transport.
    pub fn with_transport<T: Transport + 'static>(transport: T) -> Self {
        Self {
            id: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
            options: SessionOptions::default(),
            transport: Some(Box::new(transport)),
            interceptors: Vec::new(),
            cancel: None,
        }
    }

    /// Apply one configuration directive, replacing its previous value.
    pub fn set<D: Into<Directive>>(&mut self, directive: D) -> &mut Self {
        self.options.apply(directive.into());
        self
    }

    /// Apply several directives in order.
    pub fn set_all<I>(&mut self, directives: I) -> &mut Self
    where
        I: IntoIterator,
        I::Item: Into<Directive>,
    {
        for directive in directives {
            self.set(directive);
        }
        self
    }

    /// The configured URL, without query parameters.
    pub fn url(&self) -> &str {
        self.options.url.as_str()
    }

    /// Attach an interceptor. Interceptors run in the order they were attached.
    pub fn add_interceptor<I: Interceptor + 'static>(&mut self, interceptor: I) -> &mut Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// True when no transfer is outstanding.
    pub fn is_idle(&self) -> bool {
        self.transport.is_some()
    }

    /// Run `verb` through the interceptor chain, blocking until it completes.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async context, or while a prepared transfer
    /// has not been completed.
    pub fn execute(&mut self, verb: Verb) -> Result<Response, Error> {
        let interceptors = self.interceptors.clone();
        Proceed::new(&interceptors, verb).proceed(self)
    }

    /// The end of the interceptor chain: one full prepare, perform, complete cycle.
    pub(crate) fn perform_now(&mut self, verb: Verb) -> Result<Response, Error> {
        let transfer = self.prepare(verb)?;
        let completed = rt::block_on(transfer.perform());
        Ok(self.complete(completed))
    }

    /// Configure a transfer for `verb` without running it.
    ///
    /// The session's transport moves into the returned [`Transfer`]. Every call must
    /// be matched by exactly one [`Session::complete`]. Interceptors are not run.
    ///
    /// # Panics
    ///
    /// Panics when a previous transfer has not been completed yet.
    #[track_caller]
    pub fn prepare(&mut self, verb: Verb) -> Result<Transfer, Error> {
        let Some(transport) = self.transport.take() else {
            panic!("Session::prepare called while a transfer is outstanding; call Session::complete first");
        };

        match self.build(verb) {
            Ok((request, sink)) => Ok(Transfer {
                session: self.id,
                verb,
                transport,
                request,
                sink,
            }),
            Err(error) => {
                self.transport = Some(transport);
                tracing::debug!(%verb, %error, "prepare failed");
                Err(error.into())
            }
        }
    }

    /// Finish the cycle started by [`Session::prepare`] and assemble the response.
    ///
    /// # Panics
    ///
    /// Panics when no transfer is outstanding, or when `completed` came from a
    /// different session.
    #[track_caller]
    pub fn complete(&mut self, completed: Completed) -> Response {
        assert!(
            self.transport.is_none() && completed.session == self.id,
            "Session::complete called without a matching Session::prepare"
        );

        let Completed {
            transport,
            report,
            sink,
            ..
        } = completed;
        self.transport = Some(transport);

        let (text, raw_header) = sink.finish();
        let response = Response::from_transfer(report, text, raw_header);
        tracing::debug!(
            status = response.status_code(),
            error = %response.error(),
            elapsed = ?response.elapsed(),
            "transfer completed"
        );
        response
    }

    /// Return a prepared transfer's transport without running it.
    pub(crate) fn abandon(&mut self, transfer: Transfer) {
        assert!(
            self.transport.is_none() && transfer.session == self.id,
            "abandoned transfer does not belong to this session"
        );
        self.transport = Some(transfer.into_transport());
    }

    pub(crate) fn set_cancel_token(&mut self, token: Option<CancelToken>) {
        self.cancel = token;
    }

    /// Run `verb` on `scheduler`, moving the session into the task.
    pub fn spawn(self, scheduler: &Scheduler, verb: Verb) -> AsyncHandle<Result<Response, Error>> {
        let mut session = self;
        scheduler.submit(move || session.execute(verb))
    }

    /// Run `verb` on `scheduler` with a handle that can cancel it.
    pub fn spawn_cancellable(
        self,
        scheduler: &Scheduler,
        verb: Verb,
    ) -> CancellableHandle<Result<Response, Error>> {
        let mut session = self;
        scheduler.submit_cancellable(move |token| {
            session.set_cancel_token(Some(token));
            session.execute(verb)
        })
    }

    /// Run `verb` on `scheduler` and pass the result to `callback` on the worker.
    pub fn spawn_callback<F, R>(self, scheduler: &Scheduler, verb: Verb, callback: F) -> AsyncHandle<R>
    where
        F: FnOnce(Result<Response, Error>) -> R + Send + 'static,
        R: Clone + Send + Sync + 'static,
    {
        let mut session = self;
        scheduler.submit(move || callback(session.execute(verb)))
    }

    fn build(&self, verb: Verb) -> Result<(TransferRequest, SessionSink), ConfigurationError> {
        let options = &self.options;
        if verb == Verb::Download && options.callbacks.write.is_none() {
            return Err(ConfigurationError::MissingDownloadSink);
        }

        let sink = SessionSink::new(&options.callbacks, options.reserve_size)?;
        let url = options.parameters.apply_to(options.url.as_str());

        let mut headers = HeaderMap::new();
        for (name, value) in options.header.iter() {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| ConfigurationError::InvalidHeaderName(name.to_owned()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ConfigurationError::InvalidHeaderValue(name.to_owned()))?;
            headers.insert(header, value);
        }

        if let Some(credentials) = &options.credentials {
            set_default(&mut headers, AUTHORIZATION, &credentials.header_value())?;
        }
        if !options.cookies.is_empty() {
            set_default(&mut headers, COOKIE, &options.cookies.header_value())?;
        }
        if let Some(agent) = &options.user_agent {
            set_default(&mut headers, USER_AGENT, &agent.0)?;
        }
        if let Some(encoding) = options.accept_encoding.header_value() {
            set_default(&mut headers, ACCEPT_ENCODING, &encoding)?;
        }
        if let Some(range) = &options.range {
            set_default(&mut headers, RANGE, range)?;
        }

        let body = match &options.body {
            Some(source) if verb.sends_body() => request_body(source, &mut headers)?,
            _ => RequestBody::empty(),
        };

        let request = TransferRequest {
            method: verb.method(),
            url,
            headers,
            body,
            options: options.transport.clone(),
            cancel: self.cancel.clone().unwrap_or_default(),
        };
        Ok((request, sink))
    }
}

macro_rules! verbs {
    ($($verb:ident => $blocking:ident, $async_name:ident, $cancellable:ident, $callback:ident;)*) => {
        impl Session {
            $(
                #[doc = concat!("Perform a [`Verb::", stringify!($verb), "`] request, blocking until it completes.")]
                ///
                /// # Panics
                ///
                /// Panics when called from inside an async context.
                pub fn $blocking(&mut self) -> Result<Response, Error> {
                    self.execute(Verb::$verb)
                }

                #[doc = concat!("Perform a [`Verb::", stringify!($verb), "`] request on the global scheduler.")]
                pub fn $async_name(self) -> AsyncHandle<Result<Response, Error>> {
                    self.spawn(Scheduler::global(), Verb::$verb)
                }

                #[doc = concat!("Perform a cancellable [`Verb::", stringify!($verb), "`] request on the global scheduler.")]
                pub fn $cancellable(self) -> CancellableHandle<Result<Response, Error>> {
                    self.spawn_cancellable(Scheduler::global(), Verb::$verb)
                }

                #[doc = concat!("Perform a [`Verb::", stringify!($verb), "`] request on the global scheduler and hand the result to `callback`.")]
                pub fn $callback<F, R>(self, callback: F) -> AsyncHandle<R>
                where
                    F: FnOnce(Result<Response, Error>) -> R + Send + 'static,
                    R: Clone + Send + Sync + 'static,
                {
                    self.spawn_callback(Scheduler::global(), Verb::$verb, callback)
                }
            )*
        }
    };
}

verbs! {
    Get => get, get_async, get_cancellable, get_callback;
    Post => post, post_async, post_cancellable, post_callback;
    Put => put, put_async, put_cancellable, put_callback;
    Patch => patch, patch_async, patch_cancellable, patch_callback;
    Delete => delete, delete_async, delete_cancellable, delete_callback;
    Head => head, head_async, head_cancellable, head_callback;
    Options => options, options_async, options_cancellable, options_callback;
    Download => download, download_async, download_cancellable, download_callback;
}

fn set_default(
    headers: &mut HeaderMap,
    name: HeaderName,
    value: &str,
) -> Result<(), ConfigurationError> {
    if headers.contains_key(&name) {
        return Ok(());
    }

    let value = HeaderValue::from_str(value)
        .map_err(|_| ConfigurationError::InvalidHeaderValue(name.to_string()))?;
    headers.insert(name, value);
    Ok(())
}

fn request_body(
    source: &BodySource,
    headers: &mut HeaderMap,
) -> Result<RequestBody, ConfigurationError> {
    match source {
        BodySource::Raw(body) => {
            if let Some(content_type) = body.content_type() {
                set_default(headers, CONTENT_TYPE, content_type)?;
            }
            Ok(body.data().clone().into())
        }
        BodySource::Payload(payload) => {
            set_default(headers, CONTENT_TYPE, "application/x-www-form-urlencoded")?;
            Ok(payload.encode().into())
        }
        BodySource::Multipart(multipart) => {
            let boundary = Multipart::boundary();
            let data = multipart.encode(&boundary)?;
            set_default(
                headers,
                CONTENT_TYPE,
                &format!("multipart/form-data; boundary={boundary}"),
            )?;
            Ok(data.into())
        }
        BodySource::Read(callback) => Ok(RequestBody::from_read(callback.clone())),
    }
}
