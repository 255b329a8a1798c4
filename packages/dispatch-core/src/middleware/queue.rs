//! Queue middleware: a bounded FIFO queue decoupling request submission from
//! execution, drained by a single background worker.
//!
//! Every request passing through this stage is serialized into one execution
//! stream: the stage beneath it is never invoked concurrently from the same
//! instance. This is the mechanism the partition stage relies on for
//! per-partition ordering.
//!
//! Submitters suspend at two points: on a full queue (backpressure) and on
//! the work item's completion slot. Both waits race the request's own
//! cancellation token. Items whose token is already cancelled when dequeued
//! are skipped without resolution, and items still queued when the stage
//! stops are abandoned; in both cases the slot's sender half is dropped, so
//! the submitter unblocks with [`DispatchError::QueueStopped`] unless its own
//! token won the race first.

use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::operation::{DispatchError, OpaqueResponse, OperationRequest};
use crate::stage::DispatchStage;

// ---------------------------------------------------------------------------
// StageState
// ---------------------------------------------------------------------------

/// Lifecycle state of a stage that owns background work.
///
/// State machine: `NotStarted -> Running -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Constructed; the worker is not running yet. Submissions already
    /// buffer into the bounded queue, up to its capacity.
    NotStarted,
    /// The worker loop is draining the queue.
    Running,
    /// Shutdown signalled; the worker exits at its next queue read.
    Draining,
    /// The worker task has finished. Items never dequeued are abandoned.
    Stopped,
}

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// One in-flight request while queued: the request (which carries its own
/// cancellation token) plus the single-assignment completion slot. The worker
/// loop is the only writer of the slot.
struct WorkItem {
    request: OperationRequest,
    completion: oneshot::Sender<Result<OpaqueResponse, DispatchError>>,
}

// ---------------------------------------------------------------------------
// QueueStage
// ---------------------------------------------------------------------------

/// Bounded-queue middleware with a dedicated single-worker drain loop.
pub struct QueueStage {
    next: Arc<dyn DispatchStage>,
    queue_tx: mpsc::Sender<WorkItem>,
    /// Present until `start` hands it to the worker task.
    receiver: Mutex<Option<mpsc::Receiver<WorkItem>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    state: ArcSwap<StageState>,
}

impl QueueStage {
    /// Creates a stopped-at-`NotStarted` queue stage wrapping `next`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(next: Arc<dyn DispatchStage>, capacity: usize) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        Self {
            next,
            queue_tx,
            receiver: Mutex::new(Some(queue_rx)),
            worker: Mutex::new(None),
            shutdown: CancellationToken::new(),
            state: ArcSwap::from_pointee(StageState::NotStarted),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> StageState {
        **self.state.load()
    }
}

#[async_trait]
impl DispatchStage for QueueStage {
    async fn execute(&self, request: OperationRequest) -> Result<OpaqueResponse, DispatchError> {
        let cancellation = request.cancellation().clone();
        let (completion, resolved) = oneshot::channel();
        let item = WorkItem { request, completion };

        // Bounded write: suspend while the queue is full, unless the caller's
        // own cancellation fires first (the item is then never enqueued).
        tokio::select! {
            biased;
            () = cancellation.cancelled() => return Err(DispatchError::SubmissionCancelled),
            sent = self.queue_tx.send(item) => {
                if sent.is_err() {
                    return Err(DispatchError::QueueStopped);
                }
            }
        }

        // Suspend on the completion slot. Skipped and abandoned items never
        // get a resolution, so this wait must race the caller's own token;
        // a dropped slot means the stage stopped out from under the request.
        tokio::select! {
            biased;
            () = cancellation.cancelled() => Err(DispatchError::SubmissionCancelled),
            resolution = resolved => match resolution {
                Ok(result) => result,
                Err(_) => Err(DispatchError::QueueStopped),
            },
        }
    }

    async fn start(&self) -> anyhow::Result<()> {
        let receiver = self.receiver.lock().take();
        let Some(receiver) = receiver else {
            anyhow::bail!("queue stage already started");
        };
        let worker = tokio::spawn(run_request_loop(
            Arc::clone(&self.next),
            receiver,
            self.shutdown.clone(),
        ));
        *self.worker.lock() = Some(worker);
        self.state.store(Arc::new(StageState::Running));
        Ok(())
    }

    fn signal_stop(&self) {
        self.state.store(Arc::new(StageState::Draining));
        self.shutdown.cancel();
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.signal_stop();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            worker.await?;
        }
        self.state.store(Arc::new(StageState::Stopped));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Worker loop
// ---------------------------------------------------------------------------

/// Drains the queue in strict FIFO order until shutdown is signalled or every
/// sender is gone. A failing request resolves its own completion slot and
/// never terminates the loop.
async fn run_request_loop(
    next: Arc<dyn DispatchStage>,
    mut queue: mpsc::Receiver<WorkItem>,
    shutdown: CancellationToken,
) {
    debug!("queue worker started");
    loop {
        let item = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            item = queue.recv() => match item {
                Some(item) => item,
                None => break,
            },
        };

        if item.request.cancellation().is_cancelled() {
            // Skipped without resolution; the submitter observes its own token.
            trace!(
                request_type = item.request.payload_type_name(),
                "skipping cancelled work item"
            );
            continue;
        }

        let result = next.execute(item.request).await;
        // The submitter may have stopped waiting; nothing to do then.
        let _ = item.completion.send(result);
    }
    debug!("queue worker exiting");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
