//! Middleware around the perform step of sessions and batches.
//!
//! An [`Interceptor`] receives the session and a [`Proceed`] continuation for the
//! rest of the chain. Interceptors run in the order they were attached: the first
//! one sees the request first and the response last.
//!
//! ```no_run
//! use courier::interceptor::Proceed;
//! use courier::options::Header;
//! use courier::{Error, Response, Session};
//!
//! let mut session = Session::new();
//! session.set("http://localhost:8080/");
//! session.add_interceptor(|session: &mut Session, proceed: Proceed<'_>| -> Result<Response, Error> {
//!     session.set(Header::from_iter([("X-Trace", "on")]));
//!     let response = proceed.proceed(session)?;
//!     tracing::info!(status = response.status_code(), "intercepted");
//!     Ok(response)
//! });
//! let response = session.get()?;
//! # Ok::<(), Error>(())
//! ```
//!
//! An interceptor may return a response without calling `proceed`, call it more
//! than once (each call is a fresh transfer), or run a different verb with
//! [`Proceed::proceed_with`]. The verb the caller asked for is not changed.

use std::fmt;
use std::sync::Arc;

use crate::error::Error;
use crate::multi::MultiPerform;
use crate::response::Response;
use crate::session::{Session, Verb};

/// Wraps the perform step of a [`Session`].
pub trait Interceptor: Send + Sync {
    /// Handle one request. Call `proceed` to run the rest of the chain.
    fn intercept(&self, session: &mut Session, proceed: Proceed<'_>) -> Result<Response, Error>;
}

impl<F> Interceptor for F
where
    F: Fn(&mut Session, Proceed<'_>) -> Result<Response, Error> + Send + Sync,
{
    fn intercept(&self, session: &mut Session, proceed: Proceed<'_>) -> Result<Response, Error> {
        self(session, proceed)
    }
}

/// The rest of a session's interceptor chain.
#[derive(Clone, Copy)]
pub struct Proceed<'c> {
    chain: &'c [Arc<dyn Interceptor>],
    verb: Verb,
}

impl fmt::Debug for Proceed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proceed")
            .field("remaining", &self.chain.len())
            .field("verb", &self.verb)
            .finish()
    }
}

impl<'c> Proceed<'c> {
    pub(crate) fn new(chain: &'c [Arc<dyn Interceptor>], verb: Verb) -> Self {
        Self { chain, verb }
    }

    /// The verb the rest of the chain will run.
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// Run the rest of the chain with the current verb.
    pub fn proceed(&self, session: &mut Session) -> Result<Response, Error> {
        self.proceed_with(session, self.verb)
    }

    /// Run the rest of the chain with a different verb.
    pub fn proceed_with(&self, session: &mut Session, verb: Verb) -> Result<Response, Error> {
        match self.chain.split_first() {
            Some((next, rest)) => next.intercept(session, Proceed::new(rest, verb)),
            None => session.perform_now(verb),
        }
    }
}

/// Wraps the perform step of a [`MultiPerform`] batch.
pub trait MultiInterceptor: Send + Sync {
    /// Handle one batch run. Call `proceed` to run the rest of the chain.
    fn intercept(
        &self,
        multi: &mut MultiPerform,
        proceed: MultiProceed<'_>,
    ) -> Result<Vec<Response>, Error>;
}

impl<F> MultiInterceptor for F
where
    F: Fn(&mut MultiPerform, MultiProceed<'_>) -> Result<Vec<Response>, Error> + Send + Sync,
{
    fn intercept(
        &self,
        multi: &mut MultiPerform,
        proceed: MultiProceed<'_>,
    ) -> Result<Vec<Response>, Error> {
        self(multi, proceed)
    }
}

/// The rest of a batch's interceptor chain.
#[derive(Clone, Copy)]
pub struct MultiProceed<'c> {
    chain: &'c [Arc<dyn MultiInterceptor>],
    verb: Option<Verb>,
}

impl fmt::Debug for MultiProceed<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiProceed")
            .field("remaining", &self.chain.len())
            .field("verb", &self.verb)
            .finish()
    }
}

impl<'c> MultiProceed<'c> {
    pub(crate) fn new(chain: &'c [Arc<dyn MultiInterceptor>], verb: Option<Verb>) -> Self {
        Self { chain, verb }
    }

    /// The verb every entry will run, or `None` when each entry uses its own.
    pub fn verb(&self) -> Option<Verb> {
        self.verb
    }

    /// Run the rest of the chain.
    pub fn proceed(&self, multi: &mut MultiPerform) -> Result<Vec<Response>, Error> {
        self.run(multi, self.verb)
    }

    /// Run the rest of the chain with one verb for every entry.
    pub fn proceed_with(&self, multi: &mut MultiPerform, verb: Verb) -> Result<Vec<Response>, Error> {
        self.run(multi, Some(verb))
    }

    fn run(&self, multi: &mut MultiPerform, verb: Option<Verb>) -> Result<Vec<Response>, Error> {
        match self.chain.split_first() {
            Some((next, rest)) => next.intercept(multi, MultiProceed::new(rest, verb)),
            None => multi.perform_now(verb),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    use crate::transport::mock::{MockResponse, MockTransport};

    #[derive(Debug)]
    struct Logging {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Interceptor for Logging {
        fn intercept(&self, session: &mut Session, proceed: Proceed<'_>) -> Result<Response, Error> {
            self.log.lock().push(format!("{} before", self.name));
            let response = proceed.proceed(session);
            self.log.lock().push(format!("{} after", self.name));
            response
        }
    }

    #[test]
    fn chain_nests_in_attach_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut session = Session::with_transport(MockTransport::always(MockResponse::ok("")));
        session.set("http://mock.test/");
        session
            .add_interceptor(Logging {
                name: "a",
                log: log.clone(),
            })
            .add_interceptor(Logging {
                name: "b",
                log: log.clone(),
            });

        session.get().unwrap();
        assert_eq!(
            *log.lock(),
            vec!["a before", "b before", "b after", "a after"]
        );
    }

    #[test]
    fn short_circuit_skips_transfer() {
        let transport = MockTransport::always(MockResponse::ok("network"));
        let mut session = Session::with_transport(transport.clone());
        session.set("http://mock.test/");
        session.add_interceptor(|_: &mut Session, _: Proceed<'_>| -> Result<Response, Error> {
            Ok(Response::builder().status(203).text("cached").build())
        });

        let response = session.get().unwrap();
        assert_eq!(response.text(), "cached");
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn proceed_with_changes_verb_for_this_call_only() {
        let transport = MockTransport::always(MockResponse::ok(""));
        let mut session = Session::with_transport(transport.clone());
        session.set("http://mock.test/");
        session.add_interceptor(|session: &mut Session, proceed: Proceed<'_>| -> Result<Response, Error> {
            proceed.proceed_with(session, Verb::Head)?;
            proceed.proceed(session)
        });

        session.get().unwrap();
        let methods: Vec<_> = transport
            .requests()
            .into_iter()
            .map(|request| request.method)
            .collect();
        assert_eq!(methods, vec![http::Method::HEAD, http::Method::GET]);
    }
}
