//! States: the typed computation nodes of a graph
//!
//! A state declares its input and output payload types through the
//! [`State`] trait's associated types. Those declarations are turned into
//! [`TypeDescriptor`]s when the state is added to a [`Graph`](crate::Graph),
//! which is what edge registration and run pinning check against.
//!
//! # Invocation policies
//!
//! ```text
//! combine_input = false (default)      combine_input = true
//!
//!   t1 ──► invoke(t1) ──► r1             t1 ─┐
//!   t2 ──► invoke(t2) ──► r2             t2 ─┼─► invoke(t1,t2,t3) ──► r
//!   t3 ──► invoke(t3) ──► r3             t3 ─┘
//! ```
//!
//! A non-combining state runs its computation once per arrived token and
//! each result keeps the identity of the token that caused it. A combining
//! state runs once per round over every arrival of that round; this is the
//! fan-in barrier.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use tickgraph_core::{Input, Result, RunContext, State};
//!
//! struct Sum;
//!
//! #[async_trait]
//! impl State for Sum {
//!     type Input = i64;
//!     type Output = i64;
//!
//!     fn name(&self) -> &str {
//!         "sum"
//!     }
//!
//!     fn combine_input(&self) -> bool {
//!         true
//!     }
//!
//!     async fn invoke(&self, input: Input<i64>, _ctx: &RunContext) -> Result<i64> {
//!         Ok(input.into_iter().sum())
//!     }
//! }
//! ```

use crate::context::RunContext;
use crate::error::{GraphError, Result};
use crate::token::{ErasedValue, ProcessId, ProcessToken};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

/// Bound shared by every value that flows along an edge
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

/// Static description of a payload type
#[derive(Debug, Clone, Copy)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
}

impl TypeDescriptor {
    /// Describe `T`
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Type id of the described type
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Human-readable type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether a value of type `other` may be delivered where `self` is declared
    pub fn is_assignable_from(&self, other: &TypeDescriptor) -> bool {
        self.id == other.id
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeDescriptor {}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Identity of a state inside one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub(crate) usize);

impl StateId {
    /// Position of the state in its graph
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed handle to a registered state
///
/// Carries the state's payload types so [`Graph::connect`](crate::Graph::connect)
/// can check wiring at compile time. Converts into a plain [`StateId`].
pub struct StateHandle<I, O> {
    id: StateId,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O> StateHandle<I, O> {
    pub(crate) fn new(id: StateId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    /// The untyped id
    pub fn id(&self) -> StateId {
        self.id
    }
}

impl<I, O> Clone for StateHandle<I, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I, O> Copy for StateHandle<I, O> {}

impl<I, O> fmt::Debug for StateHandle<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StateHandle").field(&self.id).finish()
    }
}

impl<I, O> From<StateHandle<I, O>> for StateId {
    fn from(handle: StateHandle<I, O>) -> Self {
        handle.id
    }
}

impl<I, O> From<&StateHandle<I, O>> for StateId {
    fn from(handle: &StateHandle<I, O>) -> Self {
        handle.id
    }
}

/// Payloads handed to one invocation
///
/// Always holds at least one value. A non-combining state receives exactly
/// one; a combining state receives every arrival of the round.
#[derive(Debug, Clone)]
pub struct Input<T> {
    first: T,
    rest: Vec<T>,
    process_ids: Vec<ProcessId>,
}

impl<T> Input<T> {
    /// Input holding a single value, e.g. to call a state directly in tests
    pub fn single(value: T) -> Self {
        Self {
            first: value,
            rest: Vec::new(),
            process_ids: vec![ProcessId::new()],
        }
    }

    /// Number of arrivals folded into this input
    pub fn count(&self) -> usize {
        1 + self.rest.len()
    }

    /// The first (for a non-combining state, the only) value
    pub fn value(&self) -> &T {
        &self.first
    }

    /// Take the first (for a non-combining state, the only) value
    pub fn into_value(self) -> T {
        self.first
    }

    /// Iterate over every arrived value
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        std::iter::once(&self.first).chain(self.rest.iter())
    }

    /// Take every arrived value
    pub fn into_values(self) -> Vec<T> {
        let mut values = Vec::with_capacity(self.count());
        values.push(self.first);
        values.extend(self.rest);
        values
    }

    /// Ids of the process tokens behind the values, in the same order
    pub fn process_ids(&self) -> &[ProcessId] {
        &self.process_ids
    }
}

impl<T> IntoIterator for Input<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_values().into_iter()
    }
}

/// The node contract
///
/// `invoke` is the only required operation. External collaborators (an agent
/// loop, a subprocess runner, a pure transform) embed themselves in a graph
/// by implementing it.
#[async_trait]
pub trait State: Send + Sync + 'static {
    /// Declared input type
    type Input: Payload;
    /// Declared output type
    type Output: Payload;

    /// Name used in logs, events and errors
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Fire once per round over all arrivals instead of once per arrival
    fn combine_input(&self) -> bool {
        false
    }

    /// Run the computation
    async fn invoke(&self, input: Input<Self::Input>, ctx: &RunContext) -> Result<Self::Output>;

    /// Called once per arriving process token, before the round dispatches
    fn on_enter(&self, _input: &Self::Input, _ctx: &RunContext) {}

    /// Called when the state leaves the active set at the end of a round
    fn on_exit(&self, _ctx: &RunContext) {}
}

/// Closure-backed state
///
/// ```rust
/// use tickgraph_core::{FnState, Input};
///
/// let plus3 = FnState::new("plus3", |input: Input<i64>, _ctx| {
///     Box::pin(async move { Ok(input.into_value() + 3) })
/// });
/// ```
pub struct FnState<I, O, F> {
    name: String,
    combine: bool,
    func: F,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I, O, F> FnState<I, O, F>
where
    I: Payload,
    O: Payload,
    F: Fn(Input<I>, RunContext) -> BoxFuture<'static, Result<O>> + Send + Sync + 'static,
{
    /// A non-combining state running `func`
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            combine: false,
            func,
            _marker: PhantomData,
        }
    }

    /// A combining (fan-in) state running `func`
    pub fn combining(name: impl Into<String>, func: F) -> Self {
        Self {
            combine: true,
            ..Self::new(name, func)
        }
    }
}

#[async_trait]
impl<I, O, F> State for FnState<I, O, F>
where
    I: Payload,
    O: Payload,
    F: Fn(Input<I>, RunContext) -> BoxFuture<'static, Result<O>> + Send + Sync + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn combine_input(&self) -> bool {
        self.combine
    }

    async fn invoke(&self, input: Input<I>, ctx: &RunContext) -> Result<O> {
        (self.func)(input, ctx.clone()).await
    }
}

/// Object-safe view of a [`State`] with erased payloads
#[async_trait]
pub(crate) trait ErasedState: Send + Sync {
    fn name(&self) -> &str;

    fn input_type(&self) -> TypeDescriptor;

    fn output_type(&self) -> TypeDescriptor;

    fn combine_input(&self) -> bool;

    fn enter(&self, payload: &ErasedValue, ctx: &RunContext);

    fn exit(&self, ctx: &RunContext);

    async fn invoke(&self, tokens: &[ProcessToken], ctx: &RunContext) -> Result<ErasedValue>;
}

pub(crate) struct StateAdapter<S>(pub(crate) S);

#[async_trait]
impl<S: State> ErasedState for StateAdapter<S> {
    fn name(&self) -> &str {
        self.0.name()
    }

    fn input_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<S::Input>()
    }

    fn output_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<S::Output>()
    }

    fn combine_input(&self) -> bool {
        self.0.combine_input()
    }

    fn enter(&self, payload: &ErasedValue, ctx: &RunContext) {
        if let Some(input) = payload.downcast_ref::<S::Input>() {
            self.0.on_enter(input, ctx);
        }
    }

    fn exit(&self, ctx: &RunContext) {
        self.0.on_exit(ctx);
    }

    async fn invoke(&self, tokens: &[ProcessToken], ctx: &RunContext) -> Result<ErasedValue> {
        let mut values = Vec::with_capacity(tokens.len());
        for token in tokens {
            let value = token.payload::<S::Input>().cloned().ok_or_else(|| {
                GraphError::type_mismatch(
                    format!("input of '{}'", self.0.name()),
                    std::any::type_name::<S::Input>(),
                    "unexpected payload",
                )
            })?;
            values.push(value);
        }

        let mut values = values.into_iter();
        let first = values
            .next()
            .ok_or_else(|| GraphError::EmptyDispatch(self.0.name().to_string()))?;
        let input = Input {
            first,
            rest: values.collect(),
            process_ids: tokens.iter().map(ProcessToken::id).collect(),
        };

        let output = self.0.invoke(input, ctx).await?;
        Ok(Box::new(output))
    }
}
