//! Completion handles for scheduled work.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, ThreadId};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt as _, Shared};
use thiserror::Error;
use tokio::sync::watch;

use crate::bridge::rt;
use crate::cancel::CancelToken;

/// Why a handle did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsyncError {
    /// The work was cancelled before it produced a result.
    #[error("task was cancelled")]
    Cancelled,

    /// The work panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Where a handle's work is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleStatus {
    /// Queued, not started.
    Pending,
    /// Running on a worker.
    Running,
    /// Finished with a value.
    Completed,
    /// Cancelled before producing a value.
    Cancelled,
    /// The work panicked.
    Panicked,
}

/// Outcome of [`CancellableHandle::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancellationResult {
    /// The work was stopped: either it never started, or the running transfer
    /// acknowledged the cancellation before it finished on its own.
    Cancelled,
    /// The work had already finished; its result is unaffected.
    TooLate,
}

enum Slot<T> {
    Pending,
    Running(ThreadId),
    Completed(T),
    Cancelled,
    Panicked(String),
}

impl<T> Slot<T> {
    fn status(&self) -> HandleStatus {
        match self {
            Slot::Pending => HandleStatus::Pending,
            Slot::Running(_) => HandleStatus::Running,
            Slot::Completed(_) => HandleStatus::Completed,
            Slot::Cancelled => HandleStatus::Cancelled,
            Slot::Panicked(_) => HandleStatus::Panicked,
        }
    }

    fn is_finished(&self) -> bool {
        !matches!(self, Slot::Pending | Slot::Running(_))
    }
}

impl<T: Clone> Slot<T> {
    fn result(&self) -> Option<Result<T, AsyncError>> {
        match self {
            Slot::Pending | Slot::Running(_) => None,
            Slot::Completed(value) => Some(Ok(value.clone())),
            Slot::Cancelled => Some(Err(AsyncError::Cancelled)),
            Slot::Panicked(message) => Some(Err(AsyncError::Panicked(message.clone()))),
        }
    }
}

type Outcome<T> = Shared<BoxFuture<'static, Result<T, AsyncError>>>;

/// A handle to work submitted to a [`Scheduler`](super::Scheduler).
///
/// Handles are cheap to clone; every clone observes the same result, which is
/// computed once. Wait for it by blocking with [`AsyncHandle::wait`] or by
/// awaiting the handle.
pub struct AsyncHandle<T> {
    slot: Arc<watch::Sender<Slot<T>>>,
    outcome: Outcome<T>,
}

impl<T> Clone for AsyncHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            outcome: self.outcome.clone(),
        }
    }
}

impl<T> fmt::Debug for AsyncHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncHandle")
            .field("status", &self.status())
            .finish()
    }
}

impl<T> AsyncHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        let (slot, mut receiver) = watch::channel(Slot::Pending);
        let outcome = async move {
            match receiver.wait_for(Slot::is_finished).await {
                Ok(slot) => slot.result().unwrap_or(Err(AsyncError::Cancelled)),
                // Every sender is gone, so the work can never report back.
                Err(_) => Err(AsyncError::Cancelled),
            }
        }
        .boxed()
        .shared();

        Self {
            slot: Arc::new(slot),
            outcome,
        }
    }
}

impl<T> AsyncHandle<T> {
    /// Where the work currently is.
    pub fn status(&self) -> HandleStatus {
        self.slot.borrow().status()
    }

    /// True once the work completed, was cancelled, or panicked.
    pub fn is_finished(&self) -> bool {
        self.slot.borrow().is_finished()
    }

    /// Run `work` unless the handle was cancelled first.
    ///
    /// `token` decides how a finished run is recorded: when the transfer stopped
    /// because of it, the handle resolves as cancelled.
    pub(crate) fn run<F>(&self, token: Option<&CancelToken>, work: F)
    where
        F: FnOnce() -> T,
    {
        let worker = thread::current().id();
        let started = self.slot.send_if_modified(|slot| match slot {
            Slot::Pending => {
                *slot = Slot::Running(worker);
                true
            }
            _ => false,
        });
        if !started {
            tracing::trace!("skipping cancelled task");
            return;
        }

        let slot = match catch_unwind(AssertUnwindSafe(work)) {
            Ok(_) if token.is_some_and(CancelToken::is_acknowledged) => Slot::Cancelled,
            Ok(value) => Slot::Completed(value),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(%message, "scheduled task panicked");
                Slot::Panicked(message)
            }
        };
        self.slot.send_replace(slot);
    }

    /// Mark a queued task as cancelled. Returns the status it had.
    fn cancel_pending(&self) -> HandleStatus {
        let mut previous = HandleStatus::Pending;
        self.slot.send_if_modified(|slot| {
            previous = slot.status();
            if matches!(slot, Slot::Pending) {
                *slot = Slot::Cancelled;
                true
            } else {
                false
            }
        });
        previous
    }

    /// True when the work is running on the calling thread.
    fn is_running_here(&self) -> bool {
        matches!(*self.slot.borrow(), Slot::Running(worker) if worker == thread::current().id())
    }
}

impl<T: Clone> AsyncHandle<T> {
    /// Block until the work finishes and return its result.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async context; await the handle there.
    pub fn wait(&self) -> Result<T, AsyncError> {
        rt::block_on(self.outcome.clone())
    }

    /// Block for at most `timeout`. Returns `None` if the work is still running.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async context.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, AsyncError>> {
        rt::block_on(tokio::time::timeout(timeout, self.outcome.clone())).ok()
    }

    /// The result, if the work has finished.
    pub fn try_result(&self) -> Option<Result<T, AsyncError>> {
        self.slot.borrow().result()
    }
}

impl<T: Clone> Future for AsyncHandle<T> {
    type Output = Result<T, AsyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.outcome).poll(cx)
    }
}

/// An [`AsyncHandle`] whose work can be cancelled.
///
/// Dereferences to the underlying [`AsyncHandle`] for waiting and status.
pub struct CancellableHandle<T> {
    handle: AsyncHandle<T>,
    token: CancelToken,
}

impl<T> Clone for CancellableHandle<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            token: self.token.clone(),
        }
    }
}

impl<T> fmt::Debug for CancellableHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableHandle")
            .field("status", &self.handle.status())
            .field("cancel_requested", &self.token.is_cancelled())
            .finish()
    }
}

impl<T> CancellableHandle<T> {
    pub(crate) fn new(handle: AsyncHandle<T>, token: CancelToken) -> Self {
        Self { handle, token }
    }

    /// The underlying handle.
    pub fn handle(&self) -> &AsyncHandle<T> {
        &self.handle
    }
}

impl<T: Clone> CancellableHandle<T> {
    /// Cancel the work.
    ///
    /// Queued work never starts. Running work is asked to stop, and this call blocks
    /// until it unwinds; the result is [`CancellationResult::Cancelled`] only if the
    /// transfer stopped because of the request. Finished work is left alone.
    ///
    /// Called from inside the work itself, e.g. from a transfer callback, the stop is
    /// requested and `Cancelled` is returned without waiting. The handle then
    /// resolves once the work returns.
    ///
    /// # Panics
    ///
    /// Panics when it has to wait and is called from within an async context.
    pub fn cancel(&self) -> CancellationResult {
        match self.handle.cancel_pending() {
            HandleStatus::Pending | HandleStatus::Cancelled => {
                tracing::debug!("cancelled task");
                return CancellationResult::Cancelled;
            }
            HandleStatus::Completed | HandleStatus::Panicked => {
                return CancellationResult::TooLate;
            }
            HandleStatus::Running => {}
        }

        self.token.cancel();
        if self.handle.is_running_here() {
            tracing::debug!("cancel requested from inside the running task");
            return CancellationResult::Cancelled;
        }

        let _ = self.handle.wait();
        match self.handle.status() {
            HandleStatus::Cancelled => CancellationResult::Cancelled,
            _ => CancellationResult::TooLate,
        }
    }
}

impl<T> std::ops::Deref for CancellableHandle<T> {
    type Target = AsyncHandle<T>;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl<T: Clone> Future for CancellableHandle<T> {
    type Output = Result<T, AsyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
