//! Graph definition and validation
//!
//! A [`GraphBuilder`] collects nodes and edges, then [`compile`] checks
//! the wiring once and freezes it into a [`CompiledGraph`]. All
//! structural errors (duplicate ids, unknown targets, missing start)
//! surface here; a compiled graph cannot fail on wiring mid-run.
//! Cycles are legal and expected for iterate-until-done workflows;
//! termination is the workflow's responsibility, via a conditional
//! edge that eventually routes to [`END`].
//!
//! [`compile`]: GraphBuilder::compile

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use stepgraph_checkpoint::ExecutionState;

use crate::compiled::CompiledGraph;
use crate::error::{GraphError, Result};
use crate::node::{NodeContext, NodeHandler, NodeOutcome};
use crate::retry::RetryPolicy;

/// Sentinel target that terminates the run
pub const END: &str = "__end__";

/// Routing decision returned by a conditional edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Continue at the named node
    To(String),
    /// Terminate the run successfully
    End,
}

impl Route {
    pub fn to(target: impl Into<String>) -> Self {
        Self::To(target.into())
    }
}

/// Router function for conditional edges. Read-only: routing must not
/// mutate state.
pub type Router = Arc<dyn Fn(&ExecutionState) -> Route + Send + Sync>;

/// How execution leaves a node
#[derive(Clone)]
pub(crate) enum EdgeKind {
    /// Always continue at the named node (or END)
    Direct(String),
    /// Ask the router; it may only pick from the declared targets
    Conditional { router: Router, targets: Vec<String> },
    /// No edge registered: the run ends after this node
    Terminal,
}

/// One node of a compiled graph
#[derive(Clone)]
pub(crate) struct NodeSpec {
    pub handler: NodeHandler,
    pub retry: Option<RetryPolicy>,
    pub edge: EdgeKind,
}

/// Mutable graph under construction
#[derive(Default)]
pub struct GraphBuilder {
    start: Option<String>,
    nodes: Vec<(String, NodeHandler, Option<RetryPolicy>)>,
    edges: HashMap<String, EdgeKind>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node with no retry policy
    pub fn add_node<F, Fut>(&mut self, id: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(ExecutionState, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutcome>> + Send + 'static,
    {
        self.push_node(id.into(), handler, None)
    }

    /// Register a node whose transient failures are retried
    pub fn add_node_with_retry<F, Fut>(
        &mut self,
        id: impl Into<String>,
        handler: F,
        retry: RetryPolicy,
    ) -> &mut Self
    where
        F: Fn(ExecutionState, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutcome>> + Send + 'static,
    {
        self.push_node(id.into(), handler, Some(retry))
    }

    fn push_node<F, Fut>(&mut self, id: String, handler: F, retry: Option<RetryPolicy>) -> &mut Self
    where
        F: Fn(ExecutionState, NodeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<NodeOutcome>> + Send + 'static,
    {
        let handler: NodeHandler = Arc::new(move |state, ctx| Box::pin(handler(state, ctx)));
        self.nodes.push((id, handler, retry));
        self
    }

    /// Register an unconditional edge. `to` may be [`END`].
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.insert(from.into(), EdgeKind::Direct(to.into()));
        self
    }

    /// Register a conditional edge. The router is consulted after `from`
    /// completes and may only return one of `targets` (or [`Route::End`]).
    pub fn add_conditional_edge<F, I, S>(
        &mut self,
        from: impl Into<String>,
        router: F,
        targets: I,
    ) -> &mut Self
    where
        F: Fn(&ExecutionState) -> Route + Send + Sync + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.edges.insert(
            from.into(),
            EdgeKind::Conditional {
                router: Arc::new(router),
                targets: targets.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Name the node every fresh run starts at
    pub fn set_start(&mut self, id: impl Into<String>) -> &mut Self {
        self.start = Some(id.into());
        self
    }

    /// Validate the wiring and freeze the graph
    pub fn compile(self) -> Result<CompiledGraph> {
        let start = self
            .start
            .ok_or_else(|| GraphError::InvalidGraph("start node not set".into()))?;

        let mut nodes: HashMap<String, NodeSpec> = HashMap::with_capacity(self.nodes.len());
        for (id, handler, retry) in self.nodes {
            if id == END {
                return Err(GraphError::InvalidGraph(format!(
                    "'{END}' is a reserved node id"
                )));
            }
            if nodes.contains_key(&id) {
                return Err(GraphError::InvalidGraph(format!("duplicate node id '{id}'")));
            }
            nodes.insert(
                id,
                NodeSpec {
                    handler,
                    retry,
                    edge: EdgeKind::Terminal,
                },
            );
        }

        if !nodes.contains_key(&start) {
            return Err(GraphError::InvalidGraph(format!(
                "start node '{start}' is not registered"
            )));
        }

        for (from, edge) in self.edges {
            match &edge {
                EdgeKind::Direct(to) => {
                    if to != END && !nodes.contains_key(to) {
                        return Err(GraphError::InvalidGraph(format!(
                            "edge from '{from}' targets unknown node '{to}'"
                        )));
                    }
                }
                EdgeKind::Conditional { targets, .. } => {
                    if targets.is_empty() {
                        return Err(GraphError::InvalidGraph(format!(
                            "conditional edge from '{from}' declares no targets"
                        )));
                    }
                    for target in targets {
                        if target != END && !nodes.contains_key(target) {
                            return Err(GraphError::InvalidGraph(format!(
                                "conditional edge from '{from}' declares unknown target '{target}'"
                            )));
                        }
                    }
                }
                EdgeKind::Terminal => {}
            }
            let Some(spec) = nodes.get_mut(&from) else {
                return Err(GraphError::InvalidGraph(format!(
                    "edge registered for unknown node '{from}'"
                )));
            };
            spec.edge = edge;
        }

        warn_on_unreachable(&start, &nodes);

        Ok(CompiledGraph::new(start, nodes))
    }
}

/// Unreachable nodes are suspicious but legal; a run simply never
/// visits them.
fn warn_on_unreachable(start: &str, nodes: &HashMap<String, NodeSpec>) {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut pending = vec![start];
    while let Some(id) = pending.pop() {
        if !seen.insert(id) {
            continue;
        }
        let Some(spec) = nodes.get(id) else { continue };
        match &spec.edge {
            EdgeKind::Direct(to) if to != END => pending.push(to),
            EdgeKind::Conditional { targets, .. } => {
                pending.extend(targets.iter().filter(|t| *t != END).map(String::as_str));
            }
            _ => {}
        }
    }
    for id in nodes.keys() {
        if !seen.contains(id.as_str()) {
            tracing::warn!(node = %id, "node is unreachable from the start node");
        }
    }
}
