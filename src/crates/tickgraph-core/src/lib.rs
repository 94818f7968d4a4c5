//! # tickgraph-core - Typed dataflow graphs with tick scheduling
//!
//! A directed graph of typed computation nodes ("states") joined by
//! conditional edges, executed in synchronized rounds ("ticks") with
//! automatic fan-out to every matching edge and fan-in barriers for states
//! that combine several arrivals.
//!
//! ## Core Concepts
//!
//! ### 1. States
//!
//! A [`State`] declares its input and output payload types and implements
//! `invoke`. Closures work too, via [`Graph::add_fn_state`]. A state marked
//! `combine_input` fires once per round over every arrival of that round;
//! any other state fires once per arriving token.
//!
//! ### 2. Edges
//!
//! An edge is a predicate over the source's output, an optional converter,
//! and a target (a state or the exit sentinel). Types are checked when the
//! edge is registered, so a wired graph cannot deliver a payload of the
//! wrong type. A result that matches no edge re-enters its own state.
//!
//! ### 3. Rounds
//!
//! Each round dispatches every active state concurrently (bounded by a
//! global worker budget), waits for all of them, routes every result along
//! every matching edge, exits the round's states, and activates the targets.
//! A run ends when a state calls [`RunContext::finish`], when no state is
//! left active, or when it is cancelled.
//!
//! ## Quick Start
//!
//! ```rust
//! use tickgraph_core::{Engine, Graph, GraphError, Input};
//!
//! # #[tokio::main]
//! # async fn main() -> tickgraph_core::Result<()> {
//! let mut graph = Graph::new();
//!
//! let parse = graph.add_fn_state("parse", |input: Input<String>, _ctx| {
//!     Box::pin(async move {
//!         input
//!             .into_value()
//!             .parse::<i64>()
//!             .map_err(|e| GraphError::node_execution("parse", e.to_string()))
//!     })
//! });
//! let plus3 = graph.add_fn_state("plus3", |input: Input<i64>, _ctx| {
//!     Box::pin(async move { Ok(input.into_value() + 3) })
//! });
//! let plus4 = graph.add_fn_state("plus4", |input: Input<i64>, _ctx| {
//!     Box::pin(async move { Ok(input.into_value() + 4) })
//! });
//! let sum = graph.add_combining_fn_state("sum", |input: Input<i64>, _ctx| {
//!     Box::pin(async move { Ok(input.into_iter().sum::<i64>()) })
//! });
//!
//! graph
//!     .add_edge(parse, |_: &i64| true, plus3)?
//!     .add_edge(parse, |_: &i64| true, plus4)?
//!     .add_edge(plus3, |_: &i64| true, sum)?
//!     .add_edge(plus4, |_: &i64| true, sum)?
//!     .add_exit_edge(sum, |_: &i64| true)?;
//!
//! let engine = Engine::new(graph);
//! let mut run = engine.typed::<String, i64>();
//! run.set_entry(parse)?.set_result(sum)?;
//!
//! assert_eq!(run.run("3".to_string()).await?, vec![13]);
//! assert_eq!(
//!     run.run_batch(vec!["3".to_string(), "2".to_string()]).await?,
//!     vec![vec![13], vec![11]]
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`state`] - The node contract, typed handles, closure states
//! - [`graph`] - Graph construction and type-checked edge wiring
//! - [`token`] - Process and result tokens (lineage)
//! - [`engine`] / [`run`] - Shared run resources and the typed run wrapper
//! - [`context`] / [`properties`] - Per-run context and the shared blackboard
//! - [`events`] - Observability events for external watchers
//! - [`config`] / [`retry`] - Engine limits and the token retry policy
//! - [`error`] - Error types

pub mod config;
pub mod context;
pub mod edge;
pub mod engine;
pub mod error;
pub mod events;
pub mod graph;
pub mod properties;
pub mod retry;
pub mod run;
pub mod state;
pub mod token;

mod executor;
mod scheduler;

pub use config::{EngineConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_RETRY_BUDGET};
pub use context::RunContext;
pub use edge::EdgeTarget;
pub use engine::Engine;
pub use error::{GraphError, Result};
pub use events::RunEvent;
pub use graph::Graph;
pub use properties::RuntimeProperties;
pub use retry::RetryPolicy;
pub use run::{Run, RunReport};
pub use scheduler::RunStatus;
pub use state::{FnState, Input, Payload, State, StateHandle, StateId, TypeDescriptor};
pub use token::{ProcessId, ProcessToken, ResultToken};
