//! Typed run wrapper
//!
//! [`Run<I, O>`] pins an entry state accepting `I` and a result state
//! producing `O`, and checks both pins against the graph when they are set.
//! It then offers three ways to execute:
//!
//! | Method | Returns | Cancellation |
//! |--------|---------|--------------|
//! | [`execute`](Run::execute) | [`RunReport`] with status, rounds, results | `status == Cancelled` |
//! | [`run`](Run::run) | result payloads | `Err(GraphError::Cancelled)` |
//! | [`run_batch`](Run::run_batch) | one result list per input, in input order | `Err(GraphError::Cancelled)` |
//!
//! Batch executions run concurrently (at most `batch_concurrency` at once)
//! with independent token lineages; only the engine's blackboard is shared.

use crate::engine::Engine;
use crate::error::{GraphError, Result};
use crate::scheduler::RunStatus;
use crate::state::{Payload, StateId, TypeDescriptor};
use futures::stream::{self, StreamExt};
use std::fmt;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Outcome of one typed execution
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport<O> {
    /// Run identifier, as seen in events and logs
    pub run_id: Uuid,
    /// How the run ended
    pub status: RunStatus,
    /// Rounds dispatched
    pub rounds: usize,
    /// Payloads of every result token the result state produced
    pub results: Vec<O>,
}

/// Typed entry point into an [`Engine`]
pub struct Run<I, O> {
    engine: Engine,
    entry: Option<StateId>,
    result: Option<StateId>,
    cancel: CancellationToken,
    _marker: PhantomData<fn(I) -> O>,
}

impl<I: Payload, O: Payload> Run<I, O> {
    pub(crate) fn new(engine: Engine) -> Self {
        Self {
            engine,
            entry: None,
            result: None,
            cancel: CancellationToken::new(),
            _marker: PhantomData,
        }
    }

    /// Pin the state each input is delivered to
    ///
    /// Fails unless the state's declared input type is `I`.
    pub fn set_entry(&mut self, state: impl Into<StateId>) -> Result<&mut Self> {
        let state = state.into();
        let declared = self.engine.graph().input_type(state)?;
        let wanted = TypeDescriptor::of::<I>();
        if !declared.is_assignable_from(&wanted) {
            return Err(GraphError::type_mismatch(
                format!("entry state '{}'", self.engine.graph().state_name(state)?),
                declared.name(),
                wanted.name(),
            ));
        }
        self.entry = Some(state);
        Ok(self)
    }

    /// Pin the state whose results are collected
    ///
    /// Fails unless the state's declared output type is `O`.
    pub fn set_result(&mut self, state: impl Into<StateId>) -> Result<&mut Self> {
        let state = state.into();
        let declared = self.engine.graph().output_type(state)?;
        let wanted = TypeDescriptor::of::<O>();
        if !wanted.is_assignable_from(&declared) {
            return Err(GraphError::type_mismatch(
                format!("result state '{}'", self.engine.graph().state_name(state)?),
                wanted.name(),
                declared.name(),
            ));
        }
        self.result = Some(state);
        Ok(self)
    }

    /// Pinned entry state
    pub fn entry(&self) -> Option<StateId> {
        self.entry
    }

    /// Pinned result state
    pub fn result(&self) -> Option<StateId> {
        self.result
    }

    /// Run one input and report how it ended
    pub async fn execute(&self, input: I) -> Result<RunReport<O>> {
        self.execute_with(input, self.cancel.child_token()).await
    }

    async fn execute_with(&self, input: I, cancel: CancellationToken) -> Result<RunReport<O>> {
        let entry = self.entry.ok_or(GraphError::MissingEntry)?;
        let result = self.result.ok_or(GraphError::MissingResult)?;

        let outcome = self
            .engine
            .execute_erased(entry, result, Box::new(input), cancel)
            .await?;

        let results = outcome
            .results
            .into_iter()
            .map(|token| {
                token.into_payload::<O>().map_err(|_| {
                    GraphError::type_mismatch(
                        "collected result",
                        std::any::type_name::<O>(),
                        "unexpected payload",
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(RunReport {
            run_id: outcome.run_id,
            status: outcome.status,
            rounds: outcome.rounds,
            results,
        })
    }

    /// Run one input and return the result state's payloads
    ///
    /// Order within one run is unspecified when a non-combining state
    /// produced several results.
    pub async fn run(&self, input: I) -> Result<Vec<O>> {
        self.run_with(input, self.cancel.child_token()).await
    }

    async fn run_with(&self, input: I, cancel: CancellationToken) -> Result<Vec<O>> {
        let report = self.execute_with(input, cancel).await?;
        match report.status {
            RunStatus::Cancelled => Err(GraphError::Cancelled),
            RunStatus::Finished | RunStatus::Drained => Ok(report.results),
        }
    }

    /// Run every input as an independent execution
    ///
    /// Executions race each other, at most `batch_concurrency` at once. The
    /// i-th entry of the returned list always belongs to the i-th input.
    /// A failing execution fails the batch. Its siblings are cancelled and
    /// still run to a terminal state (exiting their active states) before
    /// the error is returned. The reported error is the first failure in
    /// input order other than the cancellation it caused.
    pub async fn run_batch(&self, inputs: impl IntoIterator<Item = I>) -> Result<Vec<Vec<O>>> {
        if self.entry.is_none() {
            return Err(GraphError::MissingEntry);
        }
        if self.result.is_none() {
            return Err(GraphError::MissingResult);
        }

        let batch = self.cancel.child_token();
        let concurrency = self.engine.config().batch_concurrency.max(1);
        let outcomes: Vec<Result<Vec<O>>> = stream::iter(inputs)
            .map(|input| {
                let batch = &batch;
                async move {
                    let outcome = self.run_with(input, batch.child_token()).await;
                    if let Err(error) = &outcome {
                        if !matches!(error, GraphError::Cancelled) && !batch.is_cancelled() {
                            tracing::warn!(error = %error, "Batch execution failed, cancelling siblings");
                            batch.cancel();
                        }
                    }
                    outcome
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut cancelled = false;
        let mut results = Vec::with_capacity(outcomes.len());
        let mut failure = None;
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(GraphError::Cancelled) => cancelled = true,
                Err(error) => {
                    failure.get_or_insert(error);
                }
            }
        }

        match (failure, cancelled) {
            (Some(error), _) => Err(error),
            (None, true) => Err(GraphError::Cancelled),
            (None, false) => Ok(results),
        }
    }

    /// Raise the cancellation signal of every execution started by this wrapper
    ///
    /// In-flight invocations are allowed to finish; the runs halt before
    /// their next dispatch. Later executions are cancelled immediately.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether [`stop`](Self::stop) has been called
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl<I, O> fmt::Debug for Run<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Run")
            .field("entry", &self.entry)
            .field("result", &self.result)
            .field("stopped", &self.cancel.is_cancelled())
            .finish()
    }
}
