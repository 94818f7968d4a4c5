//! Tick scheduler: bulk-synchronous rounds over the active set
//!
//! One [`Scheduler`] drives one run. It owns the run's active set, a map
//! from state to that state's round slot (tokens that arrived, results it
//! produced), and repeats the superstep below until the run ends:
//!
//! ```text
//!            ┌──────────────────────────────────────────────┐
//!            │ 1. dispatch  every active state, concurrently │
//!            │              (global worker budget)           │
//!            │ 2. check     finish() / stop() raised?        │──► Finished / Cancelled
//!            │ 3. route     evaluate edges of every result   │
//!            │ 4. exit      every state active this round    │
//!            │ 5. activate  enter each routed token          │
//!            └──────────────────────┬───────────────────────┘
//!                                   │ no active state left ──► Drained
//!                                   └─► next round
//! ```
//!
//! All invocations of round N complete before anything of round N+1 is
//! dispatched, which is what makes a combining state see exactly the
//! arrivals of one round.
//!
//! # Lifecycle
//!
//! `Initializing → Ticking → Done`. Every terminal path, including failure
//! and the round limit, exits all active states first.

use crate::context::RunContext;
use crate::edge::EdgeTarget;
use crate::error::{GraphError, Result};
use crate::events::{EventBus, RunEvent};
use crate::executor::TaskExecutor;
use crate::graph::Graph;
use crate::state::StateId;
use crate::token::{ErasedValue, ProcessToken, ResultToken};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// A state called [`RunContext::finish`]
    Finished,
    /// No state was left active: every lineage exited
    Drained,
    /// The run's cancellation signal was raised
    Cancelled,
}

impl RunStatus {
    /// Whether the run completed normally
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Finished | Self::Drained)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Finished => "finished",
            Self::Drained => "drained",
            Self::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Terminal outcome of one scheduler run
#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) run_id: Uuid,
    pub(crate) status: RunStatus,
    pub(crate) rounds: usize,
    pub(crate) results: Vec<ResultToken>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initializing,
    Ticking,
    Done,
}

/// A result together with the tokens it consumed
struct Produced {
    result: ResultToken,
    inputs: Vec<ProcessToken>,
}

/// Round state of one active state
#[derive(Default)]
struct StateSlot {
    input_processes: Vec<ProcessToken>,
    output_results: Vec<Produced>,
}

/// What a dispatched task hands back
struct Invocation {
    state: StateId,
    tokens: Vec<ProcessToken>,
    output: Result<ErasedValue>,
}

/// Limits the scheduler enforces for one run
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub(crate) max_rounds: usize,
    pub(crate) retry_budget: u32,
}

pub(crate) struct Scheduler<'a> {
    graph: &'a Graph,
    executor: &'a Arc<TaskExecutor>,
    events: &'a EventBus,
    ctx: RunContext,
    limits: Limits,
    result_state: StateId,
    active: BTreeMap<StateId, StateSlot>,
    phase: Phase,
    round: usize,
    results: Vec<ResultToken>,
}

impl<'a> Scheduler<'a> {
    pub(crate) fn new(
        graph: &'a Graph,
        executor: &'a Arc<TaskExecutor>,
        events: &'a EventBus,
        ctx: RunContext,
        limits: Limits,
        result_state: StateId,
    ) -> Self {
        Self {
            graph,
            executor,
            events,
            ctx,
            limits,
            result_state,
            active: BTreeMap::new(),
            phase: Phase::Initializing,
            round: 0,
            results: Vec::new(),
        }
    }

    /// Seed `entry` with `seed` and tick until the run ends
    #[tracing::instrument(
        name = "run",
        skip_all,
        fields(run_id = %self.ctx.run_id(), entry = %entry)
    )]
    pub(crate) async fn run(mut self, entry: StateId, seed: ErasedValue) -> Result<Outcome> {
        self.events.emit(RunEvent::RunStarted {
            run_id: self.ctx.run_id(),
            entry,
        });
        let token = ProcessToken::new(entry, seed, None, self.limits.retry_budget);
        self.enter(token)?;
        self.transition(Phase::Ticking);

        loop {
            if self.ctx.is_cancelled() {
                return Ok(self.terminate(RunStatus::Cancelled));
            }
            if self.active.is_empty() {
                return Ok(self.terminate(RunStatus::Drained));
            }
            if self.round >= self.limits.max_rounds {
                let limit = self.limits.max_rounds;
                return Err(self.fail(GraphError::RoundLimitExceeded { limit }));
            }

            self.round += 1;
            self.ctx.set_round(self.round);
            let dispatched = self.active.len();
            tracing::debug!(round = self.round, states = dispatched, "Dispatching round");

            if let Err(error) = self.dispatch().await {
                return Err(self.fail(error));
            }

            if self.ctx.is_finished() {
                self.harvest();
                return Ok(self.terminate(RunStatus::Finished));
            }
            if self.ctx.is_cancelled() {
                self.harvest();
                return Ok(self.terminate(RunStatus::Cancelled));
            }

            let routed = match self.route() {
                Ok(routed) => routed,
                Err(error) => return Err(self.fail(error)),
            };
            self.harvest();
            self.exit_all();

            tracing::debug!(round = self.round, routed = routed.len(), "Round complete");
            self.events.emit(RunEvent::RoundCompleted {
                run_id: self.ctx.run_id(),
                round: self.round,
                dispatched,
                routed: routed.len(),
            });

            for token in routed {
                if let Err(error) = self.enter(token) {
                    return Err(self.fail(error));
                }
            }
        }
    }

    /// Step 1: invoke every active state and wait for all of them
    async fn dispatch(&mut self) -> Result<()> {
        let mut spawned = Vec::new();

        for (&id, slot) in self.active.iter_mut() {
            let node = self.graph.node(id)?;
            let tokens = std::mem::take(&mut slot.input_processes);
            if tokens.is_empty() {
                return Err(GraphError::EmptyDispatch(node.state.name().to_string()));
            }

            let batches: Vec<Vec<ProcessToken>> = if node.state.combine_input() {
                vec![tokens]
            } else {
                tokens.into_iter().map(|token| vec![token]).collect()
            };

            for mut tokens in batches {
                let state = Arc::clone(&node.state);
                let executor = Arc::clone(self.executor);
                let ctx = self.ctx.clone();
                let handle = tokio::spawn(async move {
                    let output = executor.execute(state.as_ref(), &mut tokens, &ctx).await;
                    Invocation {
                        state: id,
                        tokens,
                        output,
                    }
                });
                spawned.push((id, handle));
            }
        }

        let (ids, handles): (Vec<_>, Vec<_>) = spawned.into_iter().unzip();
        let joined = join_all(handles).await;

        let mut first_error = None;
        for (id, joined) in ids.into_iter().zip(joined) {
            let invocation = match joined {
                Ok(invocation) => invocation,
                Err(join_error) => {
                    let name = self.graph.node(id)?.state.name().to_string();
                    tracing::error!(state = %name, error = %join_error, "State task panicked");
                    first_error.get_or_insert(GraphError::node_execution(
                        name,
                        format!("task panicked: {}", join_error),
                    ));
                    continue;
                }
            };

            let Invocation {
                state,
                tokens,
                output,
            } = invocation;
            match output {
                Ok(payload) => {
                    let merged: Vec<_> = tokens.iter().map(ProcessToken::id).collect();
                    let process_id = *merged.first().ok_or_else(|| {
                        GraphError::EmptyDispatch(
                            self.graph
                                .node(state)
                                .map(|node| node.state.name().to_string())
                                .unwrap_or_default(),
                        )
                    })?;
                    self.active
                        .entry(state)
                        .or_default()
                        .output_results
                        .push(Produced {
                            result: ResultToken::new(process_id, merged, payload),
                            inputs: tokens,
                        });
                }
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Step 3: evaluate every outgoing edge against every result of the round
    ///
    /// Every matching edge fires. A result matching no edge re-enters its
    /// state with the inputs that produced it.
    fn route(&mut self) -> Result<Vec<ProcessToken>> {
        let budget = self.limits.retry_budget;
        let mut routed = Vec::new();

        for (&id, slot) in self.active.iter_mut() {
            let node = self.graph.node(id)?;

            for produced in slot.output_results.iter_mut() {
                let payload = &*produced.result.payload;
                let mut matched = false;

                for edge in &node.edges {
                    if !edge.matches(payload) {
                        continue;
                    }
                    matched = true;
                    if let EdgeTarget::State(target) = edge.target() {
                        let value = edge.convert(payload).ok_or_else(|| {
                            GraphError::type_mismatch(
                                format!("edge from '{}'", node.state.name()),
                                node.state.output_type().name(),
                                "unexpected payload",
                            )
                        })?;
                        tracing::trace!(
                            from = node.state.name(),
                            to = %target,
                            converted = edge.has_converter(),
                            "Edge fired"
                        );
                        routed.push(ProcessToken::new(
                            target,
                            value,
                            Some(produced.result.process_id()),
                            budget,
                        ));
                    }
                }

                if !matched {
                    tracing::debug!(state = node.state.name(), "No edge matched, re-entering state");
                    for input in produced.inputs.drain(..) {
                        let parent = input.id();
                        routed.push(ProcessToken::new(id, input.payload, Some(parent), budget));
                    }
                }
            }
        }

        Ok(routed)
    }

    /// Move the result state's results of this round into the run output
    fn harvest(&mut self) {
        if let Some(slot) = self.active.get_mut(&self.result_state) {
            self.results
                .extend(slot.output_results.drain(..).map(|produced| produced.result));
        }
    }

    /// Step 5 for one token: activate its target and hand the token over
    fn enter(&mut self, token: ProcessToken) -> Result<()> {
        let target = token.target();
        let node = self.graph.node(target)?;
        node.state.enter(&token.payload, &self.ctx);

        self.events.emit(RunEvent::StateEntered {
            run_id: self.ctx.run_id(),
            round: self.round + 1,
            state: target,
            name: node.state.name().to_string(),
            process_id: token.id(),
        });

        self.active
            .entry(target)
            .or_default()
            .input_processes
            .push(token);
        Ok(())
    }

    /// Step 4: exit every state active this round and clear the active set
    fn exit_all(&mut self) {
        let active = std::mem::take(&mut self.active);
        for id in active.into_keys() {
            if let Ok(node) = self.graph.node(id) {
                node.state.exit(&self.ctx);
                self.events.emit(RunEvent::StateExited {
                    run_id: self.ctx.run_id(),
                    round: self.round,
                    state: id,
                    name: node.state.name().to_string(),
                });
            }
        }
    }

    fn terminate(mut self, status: RunStatus) -> Outcome {
        self.exit_all();
        self.transition(Phase::Done);
        tracing::info!(status = %status, rounds = self.round, results = self.results.len(), "Run ended");
        self.events.emit(RunEvent::RunFinished {
            run_id: self.ctx.run_id(),
            status,
            rounds: self.round,
        });
        Outcome {
            run_id: self.ctx.run_id(),
            status,
            rounds: self.round,
            results: self.results,
        }
    }

    fn fail(mut self, error: GraphError) -> GraphError {
        self.exit_all();
        self.transition(Phase::Done);
        tracing::error!(rounds = self.round, error = %error, "Run failed");
        self.events.emit(RunEvent::RunFailed {
            run_id: self.ctx.run_id(),
            error: error.to_string(),
        });
        error
    }

    fn transition(&mut self, next: Phase) {
        tracing::trace!(from = ?self.phase, to = ?next, "Scheduler phase");
        self.phase = next;
    }
}
