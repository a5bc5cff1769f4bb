//! A bounded pool of worker threads for running sessions in the background.
//!
//! Work runs on the blocking pool of a scheduler-owned tokio runtime. Submitting
//! never blocks: work waits in FIFO order for the next free thread. Threads are
//! started on demand up to [`SchedulerConfig::max_workers`] and exit after
//! [`SchedulerConfig::idle_timeout`] without work.
//!
//! Each unit of work runs on exactly one thread. Pool threads are outside any async
//! context, so the blocking verbs of a [`Session`](crate::Session) work inside
//! submitted closures.

use std::fmt;
use std::io;
use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio_util::task::TaskTracker;

use crate::cancel::CancelToken;

mod handle;

pub use self::handle::{AsyncError, AsyncHandle, CancellableHandle, CancellationResult, HandleStatus};

static GLOBAL: OnceLock<Scheduler> = OnceLock::new();

/// Sizing of a [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on concurrent workers.
    pub max_workers: usize,

    /// How long an idle worker waits for work before exiting.
    pub idle_timeout: Duration,

    /// Name given to worker threads.
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism().map_or(4, |n| n.get());
        Self {
            max_workers: parallelism.max(4),
            idle_timeout: Duration::from_secs(60),
            thread_name: "courier-worker".to_owned(),
        }
    }
}

/// Errors from creating the global scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The global scheduler was already initialised.
    #[error("the global scheduler is already initialised")]
    AlreadyInitialized,

    /// The scheduler's runtime could not be started.
    #[error("failed to start the scheduler runtime")]
    Runtime(#[from] io::Error),
}

/// A pool of worker threads.
///
/// Owned schedulers finish queued work when dropped. The [global](Scheduler::global)
/// scheduler lives until the process exits.
pub struct Scheduler {
    runtime: Option<Runtime>,
    handle: Handle,
    tracker: TaskTracker,
    config: SchedulerConfig,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.tracker.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler. `max_workers` is raised to at least one.
    pub fn new(mut config: SchedulerConfig) -> io::Result<Self> {
        config.max_workers = config.max_workers.max(1);

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.max_workers)
            .thread_keep_alive(config.idle_timeout)
            .thread_name(config.thread_name.clone())
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        Ok(Self {
            runtime: Some(runtime),
            handle,
            tracker: TaskTracker::new(),
            config,
        })
    }

    /// The process-wide scheduler, created with the default configuration on first
    /// use unless [`Scheduler::init_global`] ran first.
    ///
    /// # Panics
    ///
    /// Panics if the scheduler's runtime cannot be started.
    pub fn global() -> &'static Scheduler {
        GLOBAL.get_or_init(|| {
            Scheduler::new(SchedulerConfig::default())
                .unwrap_or_else(|error| panic!("failed to start the global scheduler: {error}"))
        })
    }

    /// Create the process-wide scheduler with `config`.
    pub fn init_global(config: SchedulerConfig) -> Result<&'static Scheduler, SchedulerError> {
        if GLOBAL.get().is_some() {
            return Err(SchedulerError::AlreadyInitialized);
        }

        let scheduler = Scheduler::new(config)?;
        GLOBAL
            .set(scheduler)
            .map_err(|_| SchedulerError::AlreadyInitialized)?;
        Ok(Scheduler::global())
    }

    /// The configuration in use.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of submitted jobs that have not finished yet.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Queue `work` and return a handle to its result.
    pub fn submit<F, T>(&self, work: F) -> AsyncHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let handle = AsyncHandle::new();
        let slot = handle.clone();
        self.spawn(move || slot.run(None, work));
        handle
    }

    /// Queue `work` with a cancellation token it should install on its transfers.
    pub fn submit_cancellable<F, T>(&self, work: F) -> CancellableHandle<T>
    where
        F: FnOnce(CancelToken) -> T + Send + 'static,
        T: Clone + Send + Sync + 'static,
    {
        let token = CancelToken::new();
        let handle = AsyncHandle::new();

        let slot = handle.clone();
        let task_token = token.clone();
        self.spawn(move || {
            let token = task_token.clone();
            slot.run(Some(&task_token), move || work(token))
        });

        CancellableHandle::new(handle, token)
    }

    fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.tracker.token();
        self.handle.spawn_blocking(move || {
            let _token = token;
            job()
        });
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.tracker.close();
        let Some(runtime) = self.runtime.take() else {
            return;
        };

        if Handle::try_current().is_ok() {
            if !self.tracker.is_empty() {
                tracing::warn!(
                    pending = self.tracker.len(),
                    "scheduler dropped inside a runtime, abandoning queued work"
                );
            }
            runtime.shutdown_background();
            return;
        }

        runtime.block_on(self.tracker.wait());
    }
}
