//! Bounded fan-out/fan-in of transfers over a work list.

use std::{
    num::NonZeroUsize,
    sync::Arc,
    time::{Duration, Instant},
};

use color_eyre::{
    eyre::{ensure, WrapErr as _},
    Result,
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinSet,
    time::timeout,
};
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info_span, Instrument as _};

use crate::{
    backend::Transferable,
    progress::{ProgressState, ProgressTracker},
};

pub const DEFAULT_MAX_WORKERS: NonZeroUsize = NonZeroUsize::new(5).unwrap();
/// Upper bound for a single item, in both directions.
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Maximum number of transfers in flight at once.
    pub max_workers: NonZeroUsize,
    /// A transfer running longer than this is aborted and counted as failed.
    pub item_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            item_timeout: DEFAULT_ITEM_TIMEOUT,
        }
    }
}

/// The result of attempting to transfer one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome<I> {
    Success { item: I },
    Failure { item: I, reason: String },
}

impl<I> TransferOutcome<I> {
    pub fn item(&self) -> &I {
        match self {
            Self::Success { item } | Self::Failure { item, .. } => item,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferError<I> {
    pub item: I,
    pub reason: String,
}

/// Aggregate of a whole run.
#[derive(Debug, Clone)]
pub struct DispatchResult<I> {
    pub succeeded: usize,
    pub failed: usize,
    /// In completion order.
    pub errors: Vec<TransferError<I>>,
    /// From the first dispatched item to the last completion.
    pub elapsed: Duration,
}

impl<I> DispatchResult<I> {
    fn empty() -> Self {
        Self {
            succeeded: 0,
            failed: 0,
            errors: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    /// True when nothing failed. Note that an empty run is also a success here.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

/// Handed to the progress callback once per finished item.
#[derive(Debug)]
pub struct Completion<I> {
    pub outcome: TransferOutcome<I>,
    /// Counters right after this completion was recorded.
    pub progress: ProgressState,
}

/// Runs a [`Transferable`] over a work list with a fixed number of workers.
#[derive(Debug)]
pub struct Dispatcher<T> {
    backend: Arc<T>,
    config: DispatchConfig,
}

impl<T: Transferable> Dispatcher<T> {
    pub fn new(backend: T, config: DispatchConfig) -> Self {
        Self {
            backend: Arc::new(backend),
            config,
        }
    }

    pub fn backend(&self) -> &T {
        &self.backend
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Transfers every item and returns once all of them have finished.
    ///
    /// Failures of individual items, including panics and timeouts, are reported in
    /// the result and never stop the other items. `on_completion` is called from the
    /// calling task, once per item, in completion order.
    ///
    /// An empty `items` returns immediately without touching the backend.
    ///
    /// Dropping the returned future aborts all in-flight transfers.
    pub async fn run(
        &self,
        items: Vec<T::Item>,
        mut on_completion: impl FnMut(&Completion<T::Item>),
    ) -> Result<DispatchResult<T::Item>> {
        let Some(total) = NonZeroUsize::new(items.len()) else {
            debug!("empty work list, nothing to dispatch");
            return Ok(DispatchResult::empty());
        };
        let tracker = ProgressTracker::new(total);
        let n_workers = self.config.max_workers.min(total);
        debug!(total = total.get(), n_workers = n_workers.get(), "starting dispatch");

        let start = Instant::now();
        let queue = Arc::new(Mutex::new(items.into_iter()));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();
        for worker_id in 0..n_workers.get() {
            let backend = Arc::clone(&self.backend);
            let queue = Arc::clone(&queue);
            let outcome_tx = outcome_tx.clone();
            let item_timeout = self.config.item_timeout;

            workers.spawn(
                async move {
                    loop {
                        let next = { queue.lock().await.next() };
                        let Some(item) = next else {
                            break;
                        };
                        let outcome =
                            transfer_isolated(&backend, item, item_timeout).await;
                        if outcome_tx.send(outcome).is_err() {
                            // receiver is gone, nobody is waiting for results
                            break;
                        }
                    }
                }
                .instrument(info_span!("worker", worker_id)),
            );
        }
        drop(outcome_tx); // Without this, receiver will never be cancelled

        let mut errors = Vec::new();
        while let Some(outcome) = outcome_rx.recv().await {
            let progress = if outcome.is_success() {
                tracker.record_success()
            } else {
                tracker.record_failure()
            };
            let completion = Completion { outcome, progress };
            on_completion(&completion);
            if let TransferOutcome::Failure { item, reason } = completion.outcome {
                errors.push(TransferError { item, reason });
            }
        }
        while let Some(res) = workers.join_next().await {
            res.wrap_err("dispatch worker panicked")?;
        }
        let elapsed = start.elapsed();

        let state = tracker.snapshot();
        ensure!(
            state.is_done(),
            "only {} of {} items completed",
            state.completed(),
            state.total
        );
        ensure!(
            state.failed == errors.len(),
            "counted {} failures but collected {} errors",
            state.failed,
            errors.len()
        );

        Ok(DispatchResult {
            succeeded: state.succeeded,
            failed: state.failed,
            errors,
            elapsed,
        })
    }
}

/// Runs one transfer in its own task, so that neither a panic nor a hang can escape
/// into the worker.
async fn transfer_isolated<T: Transferable>(
    backend: &Arc<T>,
    item: T::Item,
    item_timeout: Duration,
) -> TransferOutcome<T::Item> {
    let mut task = AbortOnDropHandle::new(tokio::spawn({
        let backend = Arc::clone(backend);
        let item = item.clone();
        async move { backend.transfer(&item).await }
    }));

    let reason = match timeout(item_timeout, &mut task).await {
        Ok(Ok(Ok(()))) => return TransferOutcome::Success { item },
        Ok(Ok(Err(err))) => format!("{err:#}"),
        Ok(Err(join_err)) => format!("transfer task failed: {join_err}"),
        Err(_elapsed) => format!(
            "timeout ({} exceeded)",
            humantime::format_duration(item_timeout)
        ),
    };
    debug!(%item, %reason, "transfer failed");

    TransferOutcome::Failure {
        item,
        reason: if reason.is_empty() {
            "unknown error".to_owned()
        } else {
            reason
        },
    }
}
