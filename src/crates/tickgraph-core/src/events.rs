//! Run events for external watchers
//!
//! The scheduler reports lifecycle transitions (a state entering or leaving
//! the active set, a round completing, a run ending) to every subscriber of
//! its engine. Events are advisory: they mirror what the scheduler did and
//! are never consulted by it. A subscriber that drops its receiver is
//! forgotten on the next emit.
//!
//! ```rust,ignore
//! let mut events = engine.subscribe();
//! tokio::spawn(async move {
//!     while let Some(event) = events.recv().await {
//!         if let RunEvent::StateEntered { name, .. } = event {
//!             println!("-> {}", name);
//!         }
//!     }
//! });
//! ```

use crate::scheduler::RunStatus;
use crate::state::StateId;
use crate::token::ProcessId;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// One observable scheduler transition
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// A run was seeded at its entry state
    RunStarted {
        /// Run identifier
        run_id: Uuid,
        /// Entry state
        entry: StateId,
    },

    /// A process token arrived at a state
    StateEntered {
        /// Run identifier
        run_id: Uuid,
        /// Round the state will be dispatched in
        round: usize,
        /// State id
        state: StateId,
        /// State name
        name: String,
        /// Arriving token
        process_id: ProcessId,
    },

    /// A state left the active set
    StateExited {
        /// Run identifier
        run_id: Uuid,
        /// Round the state was dispatched in
        round: usize,
        /// State id
        state: StateId,
        /// State name
        name: String,
    },

    /// A round finished routing
    RoundCompleted {
        /// Run identifier
        run_id: Uuid,
        /// Round number, starting at 1
        round: usize,
        /// States dispatched this round
        dispatched: usize,
        /// Process tokens routed to the next round
        routed: usize,
    },

    /// The run reached a terminal status
    RunFinished {
        /// Run identifier
        run_id: Uuid,
        /// How it ended
        status: RunStatus,
        /// Rounds ticked
        rounds: usize,
    },

    /// The run failed
    RunFailed {
        /// Run identifier
        run_id: Uuid,
        /// Rendered error
        error: String,
    },
}

impl RunEvent {
    /// Run the event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::StateEntered { run_id, .. }
            | Self::StateExited { run_id, .. }
            | Self::RoundCompleted { run_id, .. }
            | Self::RunFinished { run_id, .. }
            | Self::RunFailed { run_id, .. } => *run_id,
        }
    }
}

/// Fan-out of run events to subscribers
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<RunEvent>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self) -> mpsc::UnboundedReceiver<RunEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub(crate) fn emit(&self, event: RunEvent) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
