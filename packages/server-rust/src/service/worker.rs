//! Background worker for queued tasks.
//!
//! Provides a generic `BackgroundWorker<R>` that processes tasks from a
//! bounded mpsc channel via a `BackgroundRunnable` implementation. The event
//! bus uses a pool of these for asynchronous delivery.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

/// Tasks a worker buffers before `try_submit` reports it full.
pub const WORKER_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// BackgroundRunnable trait
// ---------------------------------------------------------------------------

/// Trait for task handlers executed by `BackgroundWorker`.
#[async_trait]
pub trait BackgroundRunnable: Send + 'static {
    /// The type of task this runnable processes.
    type Task: Send + 'static;

    /// Process a single task.
    async fn run(&mut self, task: Self::Task);
}

// ---------------------------------------------------------------------------
// BackgroundWorker
// ---------------------------------------------------------------------------

/// Why a task could not be queued.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("worker queue is full")]
    Full,
    #[error("worker is not running")]
    Stopped,
}

/// Generic background worker that processes tasks via an mpsc channel.
///
/// The spawned task runs each queued task in order until `stop` is called,
/// then finishes whatever was already accepted.
pub struct BackgroundWorker<R: BackgroundRunnable> {
    tx: Option<mpsc::Sender<R::Task>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl<R: BackgroundRunnable> BackgroundWorker<R> {
    /// Start the worker. Must be called inside a tokio runtime.
    pub fn start(runnable: R) -> Self {
        Self::with_capacity(runnable, WORKER_CHANNEL_CAPACITY)
    }

    fn with_capacity(mut runnable: R, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<R::Task>(capacity);
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    task = rx.recv() => {
                        match task {
                            Some(t) => runnable.run(t).await,
                            None => break,
                        }
                    }
                    _ = &mut shutdown_rx => {
                        // Finish what was already accepted.
                        rx.close();
                        while let Some(t) = rx.recv().await {
                            runnable.run(t).await;
                        }
                        break;
                    }
                }
            }
        });

        Self {
            tx: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Submit a task without waiting.
    ///
    /// # Errors
    ///
    /// Returns the task back with [`SubmitError::Full`] or
    /// [`SubmitError::Stopped`] so the caller can run it elsewhere.
    pub fn try_submit(&self, task: R::Task) -> Result<(), (R::Task, SubmitError)> {
        let Some(tx) = &self.tx else {
            return Err((task, SubmitError::Stopped));
        };
        tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(task) => (task, SubmitError::Full),
            mpsc::error::TrySendError::Closed(task) => (task, SubmitError::Stopped),
        })
    }

    /// Stop the worker after it drains queued tasks.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "background worker terminated abnormally");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
