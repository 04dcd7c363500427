//! The executor
//!
//! A [`CompiledGraph`] runs as a single-pass stream of [`StepResult`]s.
//! After each node the executor applies the node's delta, awaits the
//! checkpoint write, and only then emits the step. A consumer that has
//! seen a `completed` step can rely on its snapshot being durable.
//!
//! Resume is stateless on the executor side: load a checkpoint, hand the
//! state back to [`run`], and the run continues at the paused node's
//! successor. The paused node itself is not re-executed; its work
//! happened before the pause was checkpointed.
//!
//! [`run`]: CompiledGraph::run

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use stepgraph_checkpoint::{Checkpointer, ExecutionState};

use crate::error::{GraphError, Result};
use crate::graph::{EdgeKind, NodeSpec, Route, END};
use crate::node::{NodeContext, NodeOutcome};
use crate::stream::{StepResult, StepStream};

/// Validated, immutable graph ready to execute
///
/// Cloning is cheap; clones share the same node table and can run
/// concurrently against independent states.
#[derive(Clone)]
pub struct CompiledGraph {
    inner: Arc<GraphInner>,
}

pub(crate) struct GraphInner {
    start: String,
    nodes: HashMap<String, NodeSpec>,
}

impl GraphInner {
    /// Next node after `node_id`, or `None` when the run ends there
    fn route_after(&self, node_id: &str, state: &ExecutionState) -> Result<Option<String>> {
        let spec = self
            .nodes
            .get(node_id)
            .ok_or_else(|| GraphError::InvalidRoute {
                node: node_id.to_string(),
                target: node_id.to_string(),
            })?;
        match &spec.edge {
            EdgeKind::Terminal => Ok(None),
            EdgeKind::Direct(to) if to == END => Ok(None),
            EdgeKind::Direct(to) => Ok(Some(to.clone())),
            EdgeKind::Conditional { router, targets } => match router(state) {
                Route::End => Ok(None),
                Route::To(target) if target == END => Ok(None),
                Route::To(target) => {
                    if targets.contains(&target) && self.nodes.contains_key(&target) {
                        Ok(Some(target))
                    } else {
                        Err(GraphError::InvalidRoute {
                            node: node_id.to_string(),
                            target,
                        })
                    }
                }
            },
        }
    }
}

/// Per-run execution options
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Where to persist a snapshot after every node. `None` runs
    /// without durability.
    pub checkpointer: Option<Arc<dyn Checkpointer>>,
    /// Cooperative cancellation for the whole run
    pub cancel: CancellationToken,
    /// Observer invoked with every step before it is emitted
    pub on_step: Option<Arc<dyn Fn(&StepResult) + Send + Sync>>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpointer(mut self, checkpointer: Arc<dyn Checkpointer>) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, on_step: impl Fn(&StepResult) + Send + Sync + 'static) -> Self {
        self.on_step = Some(Arc::new(on_step));
        self
    }
}

impl std::fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOptions")
            .field("checkpointer", &self.checkpointer.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .field("on_step", &self.on_step.is_some())
            .finish()
    }
}

async fn persist(
    options: &RunOptions,
    execution_id: &str,
    state: &ExecutionState,
    label: &str,
) -> Result<()> {
    if let Some(checkpointer) = &options.checkpointer {
        checkpointer.save(execution_id, state, Some(label)).await?;
    }
    Ok(())
}

impl CompiledGraph {
    pub(crate) fn new(start: String, nodes: HashMap<String, NodeSpec>) -> Self {
        Self {
            inner: Arc::new(GraphInner { start, nodes }),
        }
    }

    /// Execute the graph against `initial`, yielding one settled
    /// [`StepResult`] per node in execution order.
    ///
    /// The stream ends after a terminal edge, a `Paused` step, a
    /// `Failed` step, or cancellation. Failures never surface as panics
    /// or stream errors; they are `Failed` items.
    ///
    /// If `initial.paused_node` is set (a state loaded from a pause
    /// checkpoint), execution resumes at that node's successor.
    pub fn run(&self, initial: ExecutionState, options: RunOptions) -> StepStream {
        let inner = Arc::clone(&self.inner);
        Box::pin(stream! {
            let mut state = initial;
            let execution_id = state.execution_id.clone();

            let mut current = match state.paused_node.take() {
                Some(paused) => {
                    state.touch();
                    tracing::info!(
                        execution_id = %execution_id,
                        paused_node = %paused,
                        "resuming after pause"
                    );
                    match inner.route_after(&paused, &state) {
                        Ok(Some(next)) => next,
                        Ok(None) => {
                            tracing::info!(
                                execution_id = %execution_id,
                                "paused node was terminal; run complete"
                            );
                            return;
                        }
                        Err(err) => {
                            let step = StepResult::failed(&paused, state.clone(), err.to_string());
                            if let Some(observer) = &options.on_step {
                                observer(&step);
                            }
                            yield step;
                            return;
                        }
                    }
                }
                None => {
                    tracing::info!(
                        execution_id = %execution_id,
                        start = %inner.start,
                        "starting run"
                    );
                    inner.start.clone()
                }
            };

            loop {
                if options.cancel.is_cancelled() {
                    tracing::info!(
                        execution_id = %execution_id,
                        next = %current,
                        "run cancelled"
                    );
                    return;
                }

                // Unknown ids cannot survive compile, but a dynamic
                // Route outcome is validated below and resume re-enters
                // here, so keep the check.
                let Some(spec) = inner.nodes.get(&current) else {
                    let err = GraphError::InvalidRoute {
                        node: current.clone(),
                        target: current.clone(),
                    };
                    let step = StepResult::failed(&current, state.clone(), err.to_string());
                    if let Some(observer) = &options.on_step {
                        observer(&step);
                    }
                    yield step;
                    return;
                };

                tracing::debug!(execution_id = %execution_id, node = %current, "running node");
                let ctx = NodeContext {
                    cancel: options.cancel.clone(),
                };

                let mut attempts: u32 = 0;
                let outcome = loop {
                    attempts += 1;
                    match (spec.handler)(state.clone(), ctx.clone()).await {
                        Ok(outcome) => break Ok(outcome),
                        Err(err) => {
                            if let Some(policy) = &spec.retry {
                                if policy.should_retry(attempts) && !options.cancel.is_cancelled() {
                                    let delay = policy.delay(attempts - 1);
                                    tracing::warn!(
                                        node = %current,
                                        attempt = attempts,
                                        delay_ms = delay.as_millis() as u64,
                                        error = %err,
                                        "node failed; retrying"
                                    );
                                    tokio::time::sleep(delay).await;
                                    continue;
                                }
                            }
                            break Err(err);
                        }
                    }
                };

                match outcome {
                    Err(err) => {
                        tracing::error!(node = %current, error = %err, "node failed");
                        let step = StepResult::failed(&current, state.clone(), err.to_string());
                        if let Some(observer) = &options.on_step {
                            observer(&step);
                        }
                        yield step;
                        return;
                    }
                    Ok(NodeOutcome::Pause { reason }) => {
                        state.paused_node = Some(current.clone());
                        state.touch();
                        if let Err(err) = persist(&options, &execution_id, &state, &current).await {
                            let step = StepResult::failed(&current, state.clone(), err.to_string());
                            if let Some(observer) = &options.on_step {
                                observer(&step);
                            }
                            yield step;
                            return;
                        }
                        tracing::info!(node = %current, reason = %reason, "run paused");
                        let step = StepResult::paused(&current, state.clone(), reason);
                        if let Some(observer) = &options.on_step {
                            observer(&step);
                        }
                        yield step;
                        return;
                    }
                    Ok(NodeOutcome::Route { to }) => {
                        state.touch();
                        let next = if to == END {
                            None
                        } else if inner.nodes.contains_key(&to) {
                            Some(to)
                        } else {
                            let err = GraphError::InvalidRoute {
                                node: current.clone(),
                                target: to,
                            };
                            let step =
                                StepResult::failed(&current, state.clone(), err.to_string());
                            if let Some(observer) = &options.on_step {
                                observer(&step);
                            }
                            yield step;
                            return;
                        };
                        if let Err(err) = persist(&options, &execution_id, &state, &current).await {
                            let step = StepResult::failed(&current, state.clone(), err.to_string());
                            if let Some(observer) = &options.on_step {
                                observer(&step);
                            }
                            yield step;
                            return;
                        }
                        let step = StepResult::completed(&current, state.clone());
                        if let Some(observer) = &options.on_step {
                            observer(&step);
                        }
                        yield step;
                        match next {
                            Some(next) => current = next,
                            None => {
                                tracing::info!(execution_id = %execution_id, "run complete");
                                return;
                            }
                        }
                    }
                    Ok(NodeOutcome::Delta(delta)) => {
                        state.apply(delta);
                        let next = match inner.route_after(&current, &state) {
                            Ok(next) => next,
                            Err(err) => {
                                let step =
                                    StepResult::failed(&current, state.clone(), err.to_string());
                                if let Some(observer) = &options.on_step {
                                    observer(&step);
                                }
                                yield step;
                                return;
                            }
                        };
                        if let Err(err) = persist(&options, &execution_id, &state, &current).await {
                            let step = StepResult::failed(&current, state.clone(), err.to_string());
                            if let Some(observer) = &options.on_step {
                                observer(&step);
                            }
                            yield step;
                            return;
                        }
                        let step = StepResult::completed(&current, state.clone());
                        if let Some(observer) = &options.on_step {
                            observer(&step);
                        }
                        yield step;
                        match next {
                            Some(next) => current = next,
                            None => {
                                tracing::info!(execution_id = %execution_id, "run complete");
                                return;
                            }
                        }
                    }
                }
            }
        })
    }

    /// Drive [`run`] to completion and return the final state.
    ///
    /// A `Failed` final step becomes [`GraphError::NodeExecution`]; a
    /// `Paused` final step returns the paused state as-is. A run that
    /// produced no steps (cancelled before the first node, or resumed
    /// past the end) returns the input state unchanged.
    ///
    /// [`run`]: CompiledGraph::run
    pub async fn invoke(
        &self,
        initial: ExecutionState,
        options: RunOptions,
    ) -> Result<ExecutionState> {
        let mut fallback = initial.clone();
        fallback.paused_node = None;
        let mut steps = self.run(initial, options);
        let mut last: Option<StepResult> = None;
        while let Some(step) = steps.next().await {
            last = Some(step);
        }
        match last {
            Some(step) if step.status == crate::stream::StepStatus::Failed => {
                Err(GraphError::NodeExecution {
                    node: step.node_id,
                    error: step.error.unwrap_or_else(|| "unknown error".into()),
                })
            }
            Some(step) => Ok(step.state),
            None => Ok(fallback),
        }
    }
}
