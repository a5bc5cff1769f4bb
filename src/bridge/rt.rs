use std::cell::OnceCell;
use std::future::Future;

use hyper::rt::Executor;
use tokio::runtime::{Builder, Runtime};

/// A tokio executor for running futures within hyper.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioExecutor;

impl TokioExecutor {
    /// Create a new tokio executor.
    pub fn new() -> Self {
        Self
    }
}

impl<F> Executor<F> for TokioExecutor
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, future: F) {
        tokio::spawn(future);
    }
}

thread_local! {
    static RUNTIME: OnceCell<Runtime> = const { OnceCell::new() };
}

/// Drive `future` to completion on this thread's transfer runtime.
///
/// Each thread that runs blocking transfers lazily gets its own current-thread
/// runtime, which lives until the thread exits. Everything spawned while the
/// future runs (connection drivers) runs on the same thread.
///
/// Scheduler workers may call this: they are outside any async context even though
/// they belong to a runtime's blocking pool.
///
/// # Panics
///
/// Panics when called from within an async context. Use the `*_async` variants
/// or [`Transfer::perform`](crate::session::Transfer::perform) there instead.
/// Also panics if the thread's runtime cannot be created.
#[track_caller]
pub fn block_on<F: Future>(future: F) -> F::Output {
    RUNTIME.with(|cell| {
        let runtime = cell.get_or_init(|| {
            tracing::trace!("starting transfer runtime for this thread");
            Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("tokio runtime for blocking transfers")
        });
        runtime.block_on(future)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_is_reused() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        block_on(async move {
            tokio::spawn(async move {
                let _ = tx.send(5);
            });
        });

        // The task spawned above only runs if the runtime survived.
        let value = block_on(rx).unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn spawned_tasks_run() {
        let value = block_on(async { tokio::spawn(async { 7 }).await.unwrap() });
        assert_eq!(value, 7);
    }

    #[tokio::test]
    #[should_panic(expected = "Cannot start a runtime from within a runtime")]
    async fn nested_block_on_panics() {
        block_on(async {});
    }
}
