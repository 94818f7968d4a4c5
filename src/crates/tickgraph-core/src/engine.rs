//! The engine: a wired graph plus everything its runs share
//!
//! An [`Engine`] freezes a [`Graph`] and owns the resources every run over
//! it shares: the configuration, the global worker budget, the
//! [`RuntimeProperties`] blackboard and the event subscribers. It is cheap
//! to clone. Typed entry points are obtained with [`Engine::typed`].
//!
//! # Example
//!
//! ```rust
//! use tickgraph_core::{Engine, Graph, Input};
//!
//! # #[tokio::main]
//! # async fn main() -> tickgraph_core::Result<()> {
//! let mut graph = Graph::new();
//! let double = graph.add_fn_state("double", |input: Input<i64>, _ctx| {
//!     Box::pin(async move { Ok(input.into_value() * 2) })
//! });
//! graph.add_exit_edge(double, |_: &i64| true)?;
//!
//! let engine = Engine::new(graph);
//! let mut run = engine.typed::<i64, i64>();
//! run.set_entry(double)?.set_result(double)?;
//!
//! assert_eq!(run.run(21).await?, vec![42]);
//! # Ok(())
//! # }
//! ```

use crate::config::EngineConfig;
use crate::context::RunContext;
use crate::error::Result;
use crate::events::{EventBus, RunEvent};
use crate::executor::TaskExecutor;
use crate::graph::Graph;
use crate::properties::RuntimeProperties;
use crate::run::Run;
use crate::scheduler::{Limits, Outcome, Scheduler};
use crate::state::{Payload, StateId};
use crate::token::ErasedValue;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct EngineInner {
    graph: Graph,
    config: EngineConfig,
    executor: Arc<TaskExecutor>,
    properties: RuntimeProperties,
    events: EventBus,
}

/// Executable graph with shared run resources
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Freeze `graph` with the default configuration
    pub fn new(graph: Graph) -> Self {
        Self::build(graph, EngineConfig::default())
    }

    /// Freeze `graph` with `config`, rejecting invalid limits
    pub fn with_config(graph: Graph, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(graph, config))
    }

    fn build(graph: Graph, config: EngineConfig) -> Self {
        let executor = Arc::new(TaskExecutor::new(
            config.max_concurrency,
            config.retry.clone(),
        ));
        Self {
            inner: Arc::new(EngineInner {
                graph,
                config,
                executor,
                properties: RuntimeProperties::new(),
                events: EventBus::default(),
            }),
        }
    }

    /// The frozen graph
    pub fn graph(&self) -> &Graph {
        &self.inner.graph
    }

    /// Effective configuration
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Blackboard shared by every run of this engine
    pub fn properties(&self) -> &RuntimeProperties {
        &self.inner.properties
    }

    /// Receive [`RunEvent`]s of every subsequent run
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<RunEvent> {
        self.inner.events.subscribe()
    }

    /// A typed run wrapper with input `I` and output `O`
    pub fn typed<I: Payload, O: Payload>(&self) -> Run<I, O> {
        Run::new(self.clone())
    }

    /// Drive one run to its end
    pub(crate) async fn execute_erased(
        &self,
        entry: StateId,
        result: StateId,
        seed: ErasedValue,
        cancel: CancellationToken,
    ) -> Result<Outcome> {
        let inner = &self.inner;
        let ctx = RunContext::new(cancel, inner.properties.clone());
        let limits = Limits {
            max_rounds: inner.config.max_rounds,
            retry_budget: inner.config.default_retry_budget,
        };
        Scheduler::new(
            &inner.graph,
            &inner.executor,
            &inner.events,
            ctx,
            limits,
            result,
        )
        .run(entry, seed)
        .await
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("graph", &self.inner.graph)
            .field("config", &self.inner.config)
            .field("idle_workers", &self.inner.executor.available_permits())
            .finish()
    }
}
