//! A prepared transfer, detached from its session while it runs.

use std::fmt;

use crate::cancel::CancelToken;
use crate::error::TransferError;
use crate::transport::{TransferReport, TransferRequest, Transport};

use super::sink::SessionSink;
use super::Verb;

/// A request configured by [`Session::prepare`](super::Session::prepare), ready to run.
///
/// The transfer owns the session's transport until it is handed back with
/// [`Session::complete`](super::Session::complete). Drive it with
/// [`Transfer::perform`] on any tokio runtime.
pub struct Transfer {
    pub(super) session: u64,
    pub(super) verb: Verb,
    pub(super) transport: Box<dyn Transport>,
    pub(super) request: TransferRequest,
    pub(super) sink: SessionSink,
}

impl Transfer {
    /// The verb this transfer was prepared for.
    pub fn verb(&self) -> Verb {
        self.verb
    }

    /// The request URL, query string included.
    pub fn url(&self) -> &str {
        &self.request.url
    }

    /// A token that stops this transfer when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.request.cancel.clone()
    }

    /// Run the transfer to completion.
    ///
    /// Sink callbacks run on the task polling this future. The future never fails:
    /// transport errors are recorded in the returned [`Completed`].
    pub async fn perform(self) -> Completed {
        let Transfer {
            session,
            verb,
            mut transport,
            request,
            mut sink,
        } = self;

        tracing::debug!(%verb, url = %request.url, "performing transfer");
        let report = transport.perform(request, &mut sink).await;

        Completed {
            session,
            transport,
            report,
            sink,
        }
    }

    pub(super) fn into_transport(self) -> Box<dyn Transport> {
        self.transport
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("session", &self.session)
            .field("verb", &self.verb)
            .field("url", &self.request.url)
            .finish_non_exhaustive()
    }
}

/// A finished transfer, to be handed back to [`Session::complete`](super::Session::complete).
pub struct Completed {
    pub(super) session: u64,
    pub(super) transport: Box<dyn Transport>,
    pub(super) report: TransferReport,
    pub(super) sink: SessionSink,
}

impl Completed {
    /// The raw outcome reported by the transport.
    pub fn report(&self) -> &TransferReport {
        &self.report
    }

    /// The transfer error descriptor, [`ErrorKind::Ok`](crate::ErrorKind::Ok) on success.
    pub fn error(&self) -> TransferError {
        self.report.error()
    }
}

impl fmt::Debug for Completed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completed")
            .field("session", &self.session)
            .field("status", &self.report.status)
            .field("status_code", &self.report.status_code)
            .finish_non_exhaustive()
    }
}
