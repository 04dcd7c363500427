//! End-to-end executor tests against real checkpoint backends

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use stepgraph_core::{
    Checkpointer, ExecutionState, FileCheckpointer, GraphBuilder, MemoryCheckpointer, NodeOutcome,
    Route, RunOptions, StateDelta, StepStatus, END,
};

fn pipeline() -> stepgraph_core::CompiledGraph {
    let mut builder = GraphBuilder::new();
    builder
        .add_node("fetch", |_state, _ctx| async {
            Ok(StateDelta::new().with_output("fetch", json!("raw data")).into())
        })
        .add_node("transform", |state, _ctx| async move {
            let fetched = state.output("fetch").cloned().unwrap_or(json!(null));
            Ok(StateDelta::new()
                .with_output("transform", json!(format!("cleaned {fetched}")))
                .into())
        })
        .add_node("publish", |_state, _ctx| async {
            Ok(StateDelta::new().with_output("publish", json!("shipped")).into())
        })
        .add_edge("fetch", "transform")
        .add_edge("transform", "publish")
        .add_edge("publish", END)
        .set_start("fetch");
    builder.compile().unwrap()
}

#[tokio::test]
async fn every_completed_step_is_on_disk_before_it_is_emitted() {
    let dir = TempDir::new().unwrap();
    let saver = Arc::new(FileCheckpointer::new(dir.path()));
    let graph = pipeline();

    let mut steps = graph.run(
        ExecutionState::new("run-1"),
        RunOptions::new().with_checkpointer(saver.clone()),
    );
    while let Some(step) = steps.next().await {
        assert_eq!(step.status, StepStatus::Completed);
        // The checkpoint for this step must already be loadable.
        let snapshot = saver
            .load_by_label("run-1", &step.node_id)
            .await
            .unwrap()
            .expect("step emitted before its checkpoint landed");
        assert_eq!(snapshot.outputs, step.state.outputs);
    }

    let labels = saver.list("run-1").await.unwrap();
    assert_eq!(labels.len(), 3);
    for node in ["fetch", "transform", "publish"] {
        assert!(labels.contains(&node.to_string()));
    }

    let latest = saver.load("run-1").await.unwrap().unwrap();
    assert_eq!(latest.output("publish"), Some(&json!("shipped")));
    assert_eq!(latest.output("fetch"), Some(&json!("raw data")));
}

fn approval_graph() -> stepgraph_core::CompiledGraph {
    let mut builder = GraphBuilder::new();
    builder
        .add_node("draft", |_state, _ctx| async {
            Ok(StateDelta::new().with_output("draft", json!("v1")).into())
        })
        .add_node("review", |state, _ctx| async move {
            if state.field("approved") == Some(&json!(true)) {
                Ok(StateDelta::new().with_output("review", json!("approved")).into())
            } else {
                Ok(NodeOutcome::pause("waiting for reviewer sign-off"))
            }
        })
        .add_node("ship", |_state, _ctx| async {
            Ok(StateDelta::new().with_output("ship", json!("released")).into())
        })
        .add_edge("draft", "review")
        .add_edge("review", "ship")
        .add_edge("ship", END)
        .set_start("draft");
    builder.compile().unwrap()
}

#[tokio::test]
async fn pause_checkpoints_and_resume_continues_at_the_successor() {
    let dir = TempDir::new().unwrap();
    let saver = Arc::new(FileCheckpointer::new(dir.path()));
    let graph = approval_graph();

    // First run stops at the review pause.
    let steps: Vec<_> = graph
        .run(
            ExecutionState::new("run-1"),
            RunOptions::new().with_checkpointer(saver.clone()),
        )
        .collect()
        .await;
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[1].status, StepStatus::Paused);
    assert_eq!(
        steps[1].pause_reason.as_deref(),
        Some("waiting for reviewer sign-off")
    );

    // The pause snapshot is durable and records where the run stopped.
    let mut resumed = saver.load("run-1").await.unwrap().unwrap();
    assert_eq!(resumed.paused_node.as_deref(), Some("review"));

    // A human (or another process) supplies the missing input, then the
    // run picks up at the node after the pause. "review" is not re-run.
    resumed.set_field("approved", json!(true));
    let steps: Vec<_> = graph
        .run(resumed, RunOptions::new().with_checkpointer(saver.clone()))
        .collect()
        .await;
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].node_id, "ship");
    assert_eq!(steps[0].status, StepStatus::Completed);
    assert_eq!(steps[0].state.output("ship"), Some(&json!("released")));
    assert!(steps[0].state.paused_node.is_none());
}

#[tokio::test]
async fn cyclic_graph_iterates_until_the_router_says_done() {
    let mut builder = GraphBuilder::new();
    builder
        .add_node("work", |state, _ctx| async move {
            let done = state
                .field("iterations")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            Ok(StateDelta::new().with_field("iterations", json!(done + 1)).into())
        })
        .add_conditional_edge(
            "work",
            |state| {
                let done = state
                    .field("iterations")
                    .and_then(|v| v.as_i64())
                    .unwrap_or(0);
                if done < 4 {
                    Route::to("work")
                } else {
                    Route::End
                }
            },
            ["work", END],
        )
        .set_start("work");
    let graph = builder.compile().unwrap();

    let saver = Arc::new(MemoryCheckpointer::new());
    let steps: Vec<_> = graph
        .run(
            ExecutionState::new("loop-run"),
            RunOptions::new().with_checkpointer(saver.clone()),
        )
        .collect()
        .await;

    assert_eq!(steps.len(), 4);
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed));
    assert_eq!(
        steps.last().unwrap().state.field("iterations"),
        Some(&json!(4))
    );

    // Same node id on every iteration, so the label is overwritten and
    // the latest snapshot wins.
    let latest = saver.load("loop-run").await.unwrap().unwrap();
    assert_eq!(latest.field("iterations"), Some(&json!(4)));
}

#[tokio::test]
async fn crash_recovery_resumes_from_the_latest_snapshot() {
    let dir = TempDir::new().unwrap();
    let graph = pipeline();

    // Simulate a crash after the second node by cancelling mid-run.
    {
        let saver = Arc::new(FileCheckpointer::new(dir.path()));
        let cancel = CancellationToken::new();
        let mut steps = graph.run(
            ExecutionState::new("run-9"),
            RunOptions::new()
                .with_checkpointer(saver)
                .with_cancel(cancel.clone()),
        );
        steps.next().await.unwrap();
        steps.next().await.unwrap();
        cancel.cancel();
        assert!(steps.next().await.is_none());
    }

    // A fresh process loads the latest snapshot. The first two nodes'
    // outputs survive; only the remaining work needs to run. Here the
    // caller knows "publish" is next and routes there directly.
    let saver = Arc::new(FileCheckpointer::new(dir.path()));
    let mut recovered = saver.load("run-9").await.unwrap().unwrap();
    assert!(recovered.output("transform").is_some());
    assert!(recovered.output("publish").is_none());

    recovered.paused_node = Some("transform".into());
    let steps: Vec<_> = graph
        .run(recovered, RunOptions::new().with_checkpointer(saver.clone()))
        .collect()
        .await;
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].node_id, "publish");

    let latest = saver.load("run-9").await.unwrap().unwrap();
    assert_eq!(latest.output("publish"), Some(&json!("shipped")));
}

#[tokio::test]
async fn checkpoint_failure_surfaces_as_a_failed_step() {
    // Point the file backend at a path that cannot be a directory.
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("occupied");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let saver = Arc::new(FileCheckpointer::new(&blocker));
    let graph = pipeline();

    let steps: Vec<_> = graph
        .run(
            ExecutionState::new("run-1"),
            RunOptions::new().with_checkpointer(saver),
        )
        .collect()
        .await;
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].status, StepStatus::Failed);
    assert!(steps[0].error.is_some());
}
