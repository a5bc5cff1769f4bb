//! Running several sessions concurrently on one thread.
//!
//! A [`MultiPerform`] holds an ordered list of sessions, each with a verb. Running
//! the batch prepares every session, drives all transfers together on a single
//! event loop, and completes them in submission order. A failed entry only
//! affects its own [`Response`].

use std::fmt;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::bridge::rt;
use crate::error::{ConfigurationError, Error};
use crate::interceptor::{MultiInterceptor, MultiProceed};
use crate::response::Response;
use crate::session::{Session, Transfer, Verb};

/// A batch of sessions performed together.
///
/// ```no_run
/// use courier::{MultiPerform, Session, Verb};
///
/// let mut multi = MultiPerform::new();
/// for url in ["http://localhost:8080/a", "http://localhost:8080/b"] {
///     let mut session = Session::new();
///     session.set(url);
///     multi.add_session(session, Verb::Get);
/// }
///
/// for response in multi.perform()? {
///     println!("{} {}", response.url(), response.status_code());
/// }
/// # Ok::<(), courier::Error>(())
/// ```
#[derive(Default)]
pub struct MultiPerform {
    entries: Vec<(Session, Verb)>,
    interceptors: Vec<Arc<dyn MultiInterceptor>>,
}

impl fmt::Debug for MultiPerform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiPerform")
            .field("entries", &self.entries)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

impl MultiPerform {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a session to run with `verb`.
    pub fn add_session(&mut self, session: Session, verb: Verb) -> &mut Self {
        self.entries.push((session, verb));
        self
    }

    /// Remove and return the entry at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove_session(&mut self, index: usize) -> Session {
        self.entries.remove(index).0
    }

    /// The entries, in submission order.
    pub fn sessions(&self) -> impl Iterator<Item = (&Session, Verb)> {
        self.entries.iter().map(|(session, verb)| (session, *verb))
    }

    /// Mutable access to the entries, e.g. for reconfiguring between runs.
    pub fn sessions_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.entries.iter_mut().map(|(session, _)| session)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Take the sessions back.
    pub fn into_sessions(self) -> Vec<Session> {
        self.entries.into_iter().map(|(session, _)| session).collect()
    }

    /// Attach an interceptor around batch runs.
    pub fn add_interceptor<I: MultiInterceptor + 'static>(&mut self, interceptor: I) -> &mut Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Run every entry with its own verb, blocking until all have completed.
    ///
    /// Responses are returned in submission order.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async context.
    pub fn perform(&mut self) -> Result<Vec<Response>, Error> {
        self.execute(None)
    }

    fn execute(&mut self, verb: Option<Verb>) -> Result<Vec<Response>, Error> {
        let interceptors = self.interceptors.clone();
        MultiProceed::new(&interceptors, verb).proceed(self)
    }

    /// The end of the interceptor chain.
    pub(crate) fn perform_now(&mut self, verb: Option<Verb>) -> Result<Vec<Response>, Error> {
        let transfers = self.prepare_all(verb)?;
        tracing::debug!(count = transfers.len(), "performing batch");

        let completed = rt::block_on(join_all(transfers.into_iter().map(Transfer::perform)));

        Ok(self
            .entries
            .iter_mut()
            .zip(completed)
            .map(|((session, _), completed)| session.complete(completed))
            .collect())
    }

    fn prepare_all(&mut self, verb: Option<Verb>) -> Result<Vec<Transfer>, Error> {
        let verbs: Vec<Verb> = self
            .entries
            .iter()
            .map(|(_, own)| verb.unwrap_or(*own))
            .collect();

        let downloads = verbs.iter().filter(|verb| **verb == Verb::Download).count();
        if downloads > 0 && downloads < verbs.len() {
            return Err(ConfigurationError::MixedDownload.into());
        }

        let mut transfers = Vec::with_capacity(self.entries.len());
        let mut failure = None;
        for ((session, _), verb) in self.entries.iter_mut().zip(verbs) {
            match session.prepare(verb) {
                Ok(transfer) => transfers.push(transfer),
                Err(error) => {
                    failure = Some(error);
                    break;
                }
            }
        }

        if let Some(error) = failure {
            for ((session, _), transfer) in self.entries.iter_mut().zip(transfers) {
                session.abandon(transfer);
            }
            return Err(error);
        }
        Ok(transfers)
    }
}

macro_rules! batch_verbs {
    ($($verb:ident => $name:ident;)*) => {
        impl MultiPerform {
            $(
                #[doc = concat!("Run every entry as a [`Verb::", stringify!($verb), "`], blocking until all have completed.")]
                pub fn $name(&mut self) -> Result<Vec<Response>, Error> {
                    self.execute(Some(Verb::$verb))
                }
            )*
        }
    };
}

batch_verbs! {
    Get => get;
    Post => post;
    Put => put;
    Patch => patch;
    Delete => delete;
    Head => head;
    Options => options;
    Download => download;
}
