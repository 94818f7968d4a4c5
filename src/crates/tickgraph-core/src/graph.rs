//! Graph construction and edge wiring
//!
//! A [`Graph`] owns its states and their outgoing edges. States are added
//! once and referred to by [`StateId`] (or a typed [`StateHandle`]) from
//! then on. Every edge is type-checked when it is registered:
//!
//! - the predicate's argument type must be the source state's declared output
//! - the target's declared input must be the predicate type, or the
//!   converter's output type when a converter is supplied
//!
//! A violating registration returns [`GraphError::TypeMismatch`] and leaves
//! the graph unchanged, so wiring errors never reach a run.
//!
//! # Example
//!
//! ```rust
//! use tickgraph_core::{Graph, Input};
//!
//! # fn main() -> tickgraph_core::Result<()> {
//! let mut graph = Graph::new();
//! let parse = graph.add_fn_state("parse", |input: Input<String>, _ctx| {
//!     Box::pin(async move {
//!         input
//!             .into_value()
//!             .parse::<i64>()
//!             .map_err(|e| tickgraph_core::GraphError::node_execution("parse", e.to_string()))
//!     })
//! });
//! let plus3 = graph.add_fn_state("plus3", |input: Input<i64>, _ctx| {
//!     Box::pin(async move { Ok(input.into_value() + 3) })
//! });
//!
//! graph
//!     .add_edge(parse, |_: &i64| true, plus3)?
//!     .add_exit_edge(plus3, |_: &i64| true)?;
//!
//! // A String-typed predicate does not fit parse's i64 output
//! assert!(graph.add_edge(parse, |_: &String| true, plus3).is_err());
//! # Ok(())
//! # }
//! ```

use crate::context::RunContext;
use crate::edge::{Edge, EdgeTarget};
use crate::error::{GraphError, Result};
use crate::state::{
    ErasedState, FnState, Input, Payload, State, StateAdapter, StateHandle, StateId,
    TypeDescriptor,
};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// A registered state and its outgoing edges
pub(crate) struct Node {
    pub(crate) state: Arc<dyn ErasedState>,
    pub(crate) edges: Vec<Edge>,
}

/// A directed graph of typed states
#[derive(Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a state
    pub fn add_state<S: State>(&mut self, state: S) -> StateHandle<S::Input, S::Output> {
        let id = StateId(self.nodes.len());
        self.nodes.push(Node {
            state: Arc::new(StateAdapter(state)),
            edges: Vec::new(),
        });
        StateHandle::new(id)
    }

    /// Register a non-combining closure state
    pub fn add_fn_state<I, O, F>(&mut self, name: impl Into<String>, func: F) -> StateHandle<I, O>
    where
        I: Payload,
        O: Payload,
        F: Fn(Input<I>, RunContext) -> BoxFuture<'static, Result<O>> + Send + Sync + 'static,
    {
        self.add_state(FnState::new(name, func))
    }

    /// Register a combining (fan-in) closure state
    pub fn add_combining_fn_state<I, O, F>(
        &mut self,
        name: impl Into<String>,
        func: F,
    ) -> StateHandle<I, O>
    where
        I: Payload,
        O: Payload,
        F: Fn(Input<I>, RunContext) -> BoxFuture<'static, Result<O>> + Send + Sync + 'static,
    {
        self.add_state(FnState::combining(name, func))
    }

    /// Route `from`'s output unchanged to `to` whenever `predicate` holds
    ///
    /// `O` must be `from`'s declared output and `to`'s declared input.
    pub fn add_edge<O, P>(
        &mut self,
        from: impl Into<StateId>,
        predicate: P,
        to: impl Into<StateId>,
    ) -> Result<&mut Self>
    where
        O: Payload,
        P: Fn(&O) -> bool + Send + Sync + 'static,
    {
        let (from, to) = (from.into(), to.into());
        self.check_source::<O>(from)?;
        self.check_target(from, to, TypeDescriptor::of::<O>())?;
        self.nodes[from.0]
            .edges
            .push(Edge::passthrough(EdgeTarget::State(to), predicate));
        Ok(self)
    }

    /// Route `converter(output)` to `to` whenever `predicate` holds
    ///
    /// `O` must be `from`'s declared output and `N` `to`'s declared input.
    pub fn add_edge_with<O, N, P, C>(
        &mut self,
        from: impl Into<StateId>,
        predicate: P,
        converter: C,
        to: impl Into<StateId>,
    ) -> Result<&mut Self>
    where
        O: Payload,
        N: Payload,
        P: Fn(&O) -> bool + Send + Sync + 'static,
        C: Fn(&O) -> N + Send + Sync + 'static,
    {
        let (from, to) = (from.into(), to.into());
        self.check_source::<O>(from)?;
        self.check_target(from, to, TypeDescriptor::of::<N>())?;
        self.nodes[from.0].edges.push(Edge::converting(
            EdgeTarget::State(to),
            predicate,
            converter,
        ));
        Ok(self)
    }

    /// Retire `from`'s results whenever `predicate` holds
    ///
    /// A matching result is not routed anywhere and is not self-looped;
    /// this is how a terminal state declares itself done.
    pub fn add_exit_edge<O, P>(&mut self, from: impl Into<StateId>, predicate: P) -> Result<&mut Self>
    where
        O: Payload,
        P: Fn(&O) -> bool + Send + Sync + 'static,
    {
        let from = from.into();
        self.check_source::<O>(from)?;
        self.nodes[from.0]
            .edges
            .push(Edge::passthrough(EdgeTarget::Exit, predicate));
        Ok(self)
    }

    /// Type-safe [`add_edge`](Self::add_edge) between two typed handles
    pub fn connect<A, B, C, P>(
        &mut self,
        from: StateHandle<A, B>,
        predicate: P,
        to: StateHandle<B, C>,
    ) -> Result<&mut Self>
    where
        B: Payload,
        P: Fn(&B) -> bool + Send + Sync + 'static,
    {
        self.add_edge(from, predicate, to)
    }

    /// Number of states
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no states
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Name of a state
    pub fn state_name(&self, id: impl Into<StateId>) -> Result<&str> {
        Ok(self.node(id.into())?.state.name())
    }

    /// Declared input type of a state
    pub fn input_type(&self, id: impl Into<StateId>) -> Result<TypeDescriptor> {
        Ok(self.node(id.into())?.state.input_type())
    }

    /// Declared output type of a state
    pub fn output_type(&self, id: impl Into<StateId>) -> Result<TypeDescriptor> {
        Ok(self.node(id.into())?.state.output_type())
    }

    /// Number of outgoing edges of a state
    pub fn edge_count(&self, id: impl Into<StateId>) -> Result<usize> {
        Ok(self.node(id.into())?.edges.len())
    }

    /// Targets of a state's outgoing edges, in registration order
    pub fn edge_targets(&self, id: impl Into<StateId>) -> Result<Vec<EdgeTarget>> {
        Ok(self
            .node(id.into())?
            .edges
            .iter()
            .map(Edge::target)
            .collect())
    }

    pub(crate) fn node(&self, id: StateId) -> Result<&Node> {
        self.nodes.get(id.0).ok_or(GraphError::UnknownState(id.0))
    }

    fn check_source<O: Payload>(&self, from: StateId) -> Result<()> {
        let source = self.node(from)?.state.as_ref();
        let declared = source.output_type();
        let provided = TypeDescriptor::of::<O>();
        if declared != provided {
            return Err(GraphError::type_mismatch(
                format!("edge predicate on '{}'", source.name()),
                declared.name(),
                provided.name(),
            ));
        }
        Ok(())
    }

    fn check_target(&self, from: StateId, to: StateId, routed: TypeDescriptor) -> Result<()> {
        let source = self.node(from)?.state.as_ref();
        let target = self.node(to)?.state.as_ref();
        let declared = target.input_type();
        if !declared.is_assignable_from(&routed) {
            return Err(GraphError::type_mismatch(
                format!("edge '{}' -> '{}'", source.name(), target.name()),
                declared.name(),
                routed.name(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for (index, node) in self.nodes.iter().enumerate() {
            list.entry(&format_args!(
                "#{} {} ({} -> {}, {} edges)",
                index,
                node.state.name(),
                node.state.input_type(),
                node.state.output_type(),
                node.edges.len()
            ));
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_state(graph: &mut Graph, name: &str) -> StateHandle<i32, i32> {
        graph.add_fn_state(name.to_string(), |input: Input<i32>, _ctx| {
            Box::pin(async move { Ok(input.into_value()) })
        })
    }

    fn text_state(graph: &mut Graph, name: &str) -> StateHandle<String, String> {
        graph.add_fn_state(name.to_string(), |input: Input<String>, _ctx| {
            Box::pin(async move { Ok(input.into_value()) })
        })
    }

    #[test]
    fn test_add_states_assigns_sequential_ids() {
        let mut graph = Graph::new();
        let a = int_state(&mut graph, "a");
        let b = text_state(&mut graph, "b");
        assert_eq!(a.id().index(), 0);
        assert_eq!(b.id().index(), 1);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.state_name(b).unwrap(), "b");
        assert_eq!(graph.input_type(b).unwrap(), TypeDescriptor::of::<String>());
    }

    #[test]
    fn test_edge_rejects_incompatible_target() {
        let mut graph = Graph::new();
        let a = int_state(&mut graph, "a");
        let b = text_state(&mut graph, "b");

        let err = graph.add_edge(a, |_: &i32| true, b).unwrap_err();
        assert!(matches!(
            err,
            GraphError::TypeMismatch { ref context, expected, found }
                if context == "edge 'a' -> 'b'"
                    && expected == "alloc::string::String"
                    && found == "i32"
        ));
        assert_eq!(graph.edge_count(a).unwrap(), 0);
    }

    #[test]
    fn test_edge_rejects_predicate_of_wrong_type() {
        let mut graph = Graph::new();
        let a = int_state(&mut graph, "a");
        let b = text_state(&mut graph, "b");
        assert!(graph.add_edge(a, |_: &String| true, b).is_err());
        assert!(graph.add_exit_edge(a, |_: &String| true).is_err());
    }

    #[test]
    fn test_converter_makes_edge_compatible() {
        let mut graph = Graph::new();
        let a = int_state(&mut graph, "a");
        let b = text_state(&mut graph, "b");

        graph
            .add_edge_with(a, |_: &i32| true, |v: &i32| v.to_string(), b)
            .unwrap();
        assert_eq!(graph.edge_count(a).unwrap(), 1);

        // The converter's output type is what the target is checked against
        assert!(graph
            .add_edge_with(a, |_: &i32| true, |v: &i32| *v as i64, b)
            .is_err());
    }

    #[test]
    fn test_connect_and_chaining() {
        let mut graph = Graph::new();
        let a = int_state(&mut graph, "a");
        let b = int_state(&mut graph, "b");

        graph
            .connect(a, |v: &i32| *v > 0, b)
            .unwrap()
            .add_exit_edge(b, |_: &i32| true)
            .unwrap();
        assert_eq!(graph.edge_targets(a).unwrap(), vec![EdgeTarget::State(b.id())]);
        assert_eq!(graph.edge_targets(b).unwrap(), vec![EdgeTarget::Exit]);
    }

    #[test]
    fn test_unknown_state() {
        let mut graph = Graph::new();
        let a = int_state(&mut graph, "a");
        let stray = StateId(7);
        assert!(matches!(
            graph.add_edge(a, |_: &i32| true, stray),
            Err(GraphError::UnknownState(7))
        ));
        assert!(matches!(graph.state_name(stray), Err(GraphError::UnknownState(7))));
    }
}
