//! Single-flight cooperative scheduler for host-side asynchronous work.
//!
//! Operations are queued with [`OperationScheduler::enqueue`] from any thread
//! and driven by [`OperationScheduler::tick`], called once per simulation tick
//! from the host's main thread. At most one operation makes progress per tick:
//! the head of the queue is started or polled, everything behind it waits
//! untouched. An operation that never finishes therefore stalls the queue;
//! there is no timeout.

use log::{debug, error};
use std::sync::{Mutex, PoisonError};
use tokio::sync::oneshot::{self, error::TryRecvError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    NotStarted,
    Running,
    Done,
}

/// A unit of work the scheduler can start, poll and conclude
pub trait Operation: Send {
    fn label(&self) -> &str;

    fn state(&self) -> OperationState;

    /// Kicks off the work; must not block
    fn start(&mut self);

    /// Checks for completion without blocking
    fn poll(&mut self) -> OperationState;

    /// Hands the result to the completion callback
    fn conclude(self: Box<Self>);
}

type Work<R> = Box<dyn FnOnce() -> R + Send>;
type Callback<R> = Box<dyn FnOnce(R) + Send>;

/// Runs a closure off the main thread and reports back through a callback
///
/// The closure runs on tokio's blocking pool when started inside a runtime,
/// otherwise on a dedicated thread.
pub struct BackgroundOperation<R> {
    label: String,
    work: Option<Work<R>>,
    receiver: Option<oneshot::Receiver<R>>,
    result: Option<R>,
    on_complete: Option<Callback<R>>,
    state: OperationState,
}

impl<R: Send + 'static> BackgroundOperation<R> {
    pub fn new(
        label: &str,
        work: impl FnOnce() -> R + Send + 'static,
        on_complete: impl FnOnce(R) + Send + 'static,
    ) -> Self {
        Self {
            label: label.to_string(),
            work: Some(Box::new(work)),
            receiver: None,
            result: None,
            on_complete: Some(Box::new(on_complete)),
            state: OperationState::NotStarted,
        }
    }
}

impl<R: Send + 'static> Operation for BackgroundOperation<R> {
    fn label(&self) -> &str {
        &self.label
    }

    fn state(&self) -> OperationState {
        self.state
    }

    fn start(&mut self) {
        let Some(work) = self.work.take() else {
            return;
        };
        let (sender, receiver) = oneshot::channel();
        let job = move || {
            let _ = sender.send(work());
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            }
            Err(_) => {
                std::thread::spawn(job);
            }
        }

        self.receiver = Some(receiver);
        self.state = OperationState::Running;
    }

    fn poll(&mut self) -> OperationState {
        if let Some(receiver) = self.receiver.as_mut() {
            match receiver.try_recv() {
                Ok(result) => {
                    self.result = Some(result);
                    self.receiver = None;
                    self.state = OperationState::Done;
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Closed) => {
                    error!("Operation {} ended without a result", self.label);
                    self.receiver = None;
                    self.state = OperationState::Done;
                }
            }
        }
        self.state
    }

    fn conclude(self: Box<Self>) {
        let this = *self;
        if let (Some(result), Some(on_complete)) = (this.result, this.on_complete) {
            on_complete(result);
        }
    }
}

/// Queue of operations advanced strictly one at a time
#[derive(Default)]
pub struct OperationScheduler {
    pending: Mutex<Vec<Box<dyn Operation>>>,
}

impl OperationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an operation; safe from any thread
    pub fn enqueue(&self, operation: impl Operation + 'static) {
        self.enqueue_boxed(Box::new(operation));
    }

    pub fn enqueue_boxed(&self, operation: Box<dyn Operation>) {
        debug!("Queued operation {}", operation.label());
        self.lock_pending().push(operation);
    }

    /// Advances the head of the queue by one step
    ///
    /// Completion callbacks run after the queue lock is released, so they
    /// may enqueue further operations.
    pub fn tick(&self) {
        let mut concluded = Vec::new();
        {
            let mut pending = self.lock_pending();
            let snapshot = std::mem::take(&mut *pending);
            let mut progressed = false;

            for mut operation in snapshot {
                if progressed {
                    pending.push(operation);
                    continue;
                }
                progressed = true;

                match operation.state() {
                    OperationState::NotStarted => {
                        debug!("Starting operation {}", operation.label());
                        operation.start();
                        pending.push(operation);
                    }
                    OperationState::Running => {
                        if operation.poll() == OperationState::Done {
                            concluded.push(operation);
                        } else {
                            pending.push(operation);
                        }
                    }
                    OperationState::Done => concluded.push(operation),
                }
            }
        }

        for operation in concluded {
            debug!("Concluding operation {}", operation.label());
            operation.conclude();
        }
    }

    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_len() == 0
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, Vec<Box<dyn Operation>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
