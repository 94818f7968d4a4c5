//! Per-run execution context
//!
//! Every state invocation receives a [`RunContext`]. It is how a node ends
//! the run (`finish`), observes cancellation, and reaches the shared
//! [`RuntimeProperties`] blackboard. Cloning is cheap; all clones observe
//! the same run.

use crate::properties::RuntimeProperties;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug)]
struct ContextInner {
    run_id: Uuid,
    finished: AtomicBool,
    round: AtomicUsize,
    cancel: CancellationToken,
    properties: RuntimeProperties,
}

/// Handle to the run a state is executing in
#[derive(Debug, Clone)]
pub struct RunContext {
    inner: Arc<ContextInner>,
}

impl RunContext {
    pub(crate) fn new(cancel: CancellationToken, properties: RuntimeProperties) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                run_id: Uuid::new_v4(),
                finished: AtomicBool::new(false),
                round: AtomicUsize::new(0),
                cancel,
                properties,
            }),
        }
    }

    /// A context not attached to any engine
    ///
    /// Useful for calling [`State::invoke`](crate::State::invoke) directly in
    /// unit tests.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new(), RuntimeProperties::new())
    }

    /// Unique id of this run
    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    /// End the run successfully once the current round's dispatch drains
    pub fn finish(&self) {
        self.inner.finished.store(true, Ordering::SeqCst);
    }

    /// Whether some state has called [`finish`](Self::finish)
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::SeqCst)
    }

    /// Raise the cancellation signal for this run
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    /// Whether the run has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// The run's cancellation token, e.g. to `select!` on inside a long invocation
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// The shared blackboard
    pub fn properties(&self) -> &RuntimeProperties {
        &self.inner.properties
    }

    /// Round currently being dispatched, starting at 1
    pub fn round(&self) -> usize {
        self.inner.round.load(Ordering::SeqCst)
    }

    pub(crate) fn set_round(&self, round: usize) {
        self.inner.round.store(round, Ordering::SeqCst);
    }
}
