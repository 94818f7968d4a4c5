//! Process and result tokens
//!
//! A [`ProcessToken`] is one unit of in-flight work: it is created for the
//! seed input of a run and every time an edge fires, and it is owned by
//! exactly one state slot at a time. Invoking a state consumes the tokens that
//! arrived at it and produces [`ResultToken`]s tagged with the arriving
//! tokens' ids, so lineage survives fan-out and fan-in.

use crate::state::StateId;
use std::any::Any;
use std::fmt;
use uuid::Uuid;

/// Type-erased payload travelling between states
pub(crate) type ErasedValue = Box<dyn Any + Send + Sync>;

/// Unique identity of a process token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(Uuid);

impl ProcessId {
    /// Generate a fresh id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying uuid
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work routed to a state
pub struct ProcessToken {
    id: ProcessId,
    parent: Option<ProcessId>,
    target: StateId,
    pub(crate) payload: ErasedValue,
    retry_budget: u32,
    retries: u32,
}

impl ProcessToken {
    pub(crate) fn new(
        target: StateId,
        payload: ErasedValue,
        parent: Option<ProcessId>,
        retry_budget: u32,
    ) -> Self {
        Self {
            id: ProcessId::new(),
            parent,
            target,
            payload,
            retry_budget,
            retries: 0,
        }
    }

    /// Unique id of this token
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Id of the process whose result spawned this token, if any
    pub fn parent(&self) -> Option<ProcessId> {
        self.parent
    }

    /// State this token is destined for
    pub fn target(&self) -> StateId {
        self.target
    }

    /// Retries allowed for this token
    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Retries already spent
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Whether another attempt is within budget
    pub fn can_retry(&self) -> bool {
        self.retries < self.retry_budget
    }

    /// Spend one retry
    pub fn record_retry(&mut self) {
        self.retries += 1;
    }

    /// Borrow the payload as `T`
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for ProcessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessToken")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("target", &self.target)
            .field("retries", &self.retries)
            .field("retry_budget", &self.retry_budget)
            .finish()
    }
}

/// Output of one state invocation
pub struct ResultToken {
    process_id: ProcessId,
    merged: Vec<ProcessId>,
    pub(crate) payload: ErasedValue,
}

impl ResultToken {
    pub(crate) fn new(process_id: ProcessId, merged: Vec<ProcessId>, payload: ErasedValue) -> Self {
        Self {
            process_id,
            merged,
            payload,
        }
    }

    /// Id of the process token that produced this result
    ///
    /// For a combining invocation this is the first arrival of the round.
    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    /// Every process id folded into this result
    ///
    /// One entry for an ordinary invocation, all arrivals of the round for a
    /// combining one.
    pub fn merged(&self) -> &[ProcessId] {
        &self.merged
    }

    /// Borrow the payload as `T`
    pub fn payload<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Take the payload as `T`, returning the token unchanged on a type mismatch
    pub fn into_payload<T: 'static>(self) -> std::result::Result<T, Self> {
        match self.payload.downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(payload) => Err(Self { payload, ..self }),
        }
    }
}

impl fmt::Debug for ResultToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultToken")
            .field("process_id", &self.process_id)
            .field("merged", &self.merged)
            .finish()
    }
}
