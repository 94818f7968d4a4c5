//! Edges (transitions) between states
//!
//! An edge is a predicate over the source state's output, an optional
//! converter, and a target. Edges are type-erased once registered; the typed
//! closures are wrapped here so the scheduler can evaluate them against
//! erased result payloads. Type compatibility is checked by the graph at
//! registration time, so the downcasts below cannot fail for a wired graph.

use crate::state::{Payload, StateId};
use crate::token::ErasedValue;
use std::any::Any;
use std::fmt;

type ErasedPredicate = Box<dyn Fn(&(dyn Any + Send + Sync)) -> bool + Send + Sync>;
type ErasedConverter = Box<dyn Fn(&(dyn Any + Send + Sync)) -> Option<ErasedValue> + Send + Sync>;

/// Where a firing edge sends its token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeTarget {
    /// Route a new process token to this state
    State(StateId),
    /// Retire the result: nothing is routed and the lineage ends here
    Exit,
}

/// A registered transition
pub(crate) struct Edge {
    target: EdgeTarget,
    predicate: ErasedPredicate,
    converter: ErasedConverter,
    converts: bool,
}

impl Edge {
    /// Edge forwarding a clone of the output unchanged
    pub(crate) fn passthrough<O, P>(target: EdgeTarget, predicate: P) -> Self
    where
        O: Payload,
        P: Fn(&O) -> bool + Send + Sync + 'static,
    {
        let mut edge = Self::converting(target, predicate, |value: &O| value.clone());
        edge.converts = false;
        edge
    }

    /// Edge running `converter` on the output before routing it
    pub(crate) fn converting<O, N, P, C>(target: EdgeTarget, predicate: P, converter: C) -> Self
    where
        O: Payload,
        N: Payload,
        P: Fn(&O) -> bool + Send + Sync + 'static,
        C: Fn(&O) -> N + Send + Sync + 'static,
    {
        Self {
            target,
            predicate: Box::new(move |payload: &(dyn Any + Send + Sync)| {
                payload
                    .downcast_ref::<O>()
                    .map(|value| predicate(value))
                    .unwrap_or(false)
            }),
            converter: Box::new(move |payload: &(dyn Any + Send + Sync)| {
                payload
                    .downcast_ref::<O>()
                    .map(|value| Box::new(converter(value)) as ErasedValue)
            }),
            converts: true,
        }
    }

    pub(crate) fn target(&self) -> EdgeTarget {
        self.target
    }

    pub(crate) fn has_converter(&self) -> bool {
        self.converts
    }

    /// Evaluate the predicate against an output payload
    pub(crate) fn matches(&self, payload: &(dyn Any + Send + Sync)) -> bool {
        (self.predicate)(payload)
    }

    /// Build the payload of the token this edge routes
    pub(crate) fn convert(&self, payload: &(dyn Any + Send + Sync)) -> Option<ErasedValue> {
        (self.converter)(payload)
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("target", &self.target)
            .field("converts", &self.converts)
            .finish()
    }
}
