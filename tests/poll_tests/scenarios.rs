//! Stories about single polling sessions

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shardkeeper::actions::{ClusterAction, DeleteIndices};
use shardkeeper::client::{SnapshotState, TaskStatus};
use shardkeeper::retry::retry_residual;
use shardkeeper::wait::{
    FailureReason, PollLoop, PollOutcome, PollRequest, Progress, WaitBudget, WaitTarget,
};
use shardkeeper::Error;

use super::{names, FakeCluster, Script};

fn snapshot_target() -> WaitTarget {
    WaitTarget::Snapshot {
        repository: "backups".to_string(),
        name: "nightly".to_string(),
    }
}

// ==========================================================================
// Story Tests: A session ends in exactly one outcome
// ==========================================================================

/// Story: an operator waits on a snapshot that finishes on the third check
#[tokio::test(start_paused = true)]
async fn story_snapshot_completes_after_three_checks() {
    let cluster = FakeCluster {
        snapshot_states: Script::new(vec![
            SnapshotState::InProgress,
            SnapshotState::InProgress,
            SnapshotState::Success,
        ]),
        ..FakeCluster::new()
    };

    let request = PollRequest::new(snapshot_target(), 1, WaitBudget::Unbounded).unwrap();
    let report = PollLoop::new(&cluster).run_poll(request).await;

    assert_eq!(report.outcome, PollOutcome::Completed);
    assert_eq!(report.checks, 3);
    assert_eq!(cluster.snapshot_states.reads(), 3);
    assert_eq!(report.elapsed, Duration::from_secs(2));
    assert!(report.into_result().is_ok());
}

/// Story: a reindex task records an error on the first check
///
/// The session stops immediately with the cluster's own error text and
/// issues no further queries.
#[tokio::test(start_paused = true)]
async fn story_reindex_error_fails_on_first_check() {
    let failed = TaskStatus {
        completed: true,
        error: Some(serde_json::json!({"type": "index_not_found_exception", "reason": "no such index [src]"})),
        ..Default::default()
    };
    let cluster = FakeCluster {
        tasks: Script::new(vec![failed]),
        ..FakeCluster::new()
    };

    let target = WaitTarget::Reindex {
        task_id: "node-1:42".to_string(),
    };
    let request = PollRequest::new(target, 9, WaitBudget::Unbounded).unwrap();
    let report = PollLoop::new(&cluster).run_poll(request).await;

    assert_eq!(
        report.outcome,
        PollOutcome::Failed(FailureReason::Operation("no such index [src]".to_string()))
    );
    assert_eq!(cluster.tasks.reads(), 1);
    assert_eq!(report.elapsed, Duration::ZERO);

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, Error::OperationFailed { ref reason, .. } if reason == "no such index [src]"));
}

/// Story: a restore never produces its second index within the budget
///
/// Checks land at t=0, 2 and 4; the next one at t=6 would overrun the 5s
/// budget, so the session stops without issuing it.
#[tokio::test(start_paused = true)]
async fn story_restore_times_out_without_overrunning_budget() {
    let cluster = FakeCluster {
        indices: Script::new(vec![names(&["idx-a"])]),
        ..FakeCluster::new()
    };

    let expected: BTreeSet<String> = names(&["idx-a", "idx-b"]).into_iter().collect();
    let request = PollRequest::new(
        WaitTarget::Restore { indices: expected },
        2,
        WaitBudget::Bounded(Duration::from_secs(5)),
    )
    .unwrap();
    let report = PollLoop::new(&cluster).run_poll(request).await;

    assert_eq!(report.outcome, PollOutcome::TimedOut);
    assert_eq!(cluster.indices.reads(), 3);
    assert_eq!(report.elapsed, Duration::from_secs(4));
    assert_eq!(
        report.last_progress.as_deref(),
        Some("found 1 of 2 expected indices")
    );

    let err = report.into_result().unwrap_err();
    assert!(matches!(err, Error::Timeout { ref max_wait, .. } if max_wait == "5s"));
}

/// Story: a zero interval is a configuration mistake, not a busy loop
#[test]
fn story_zero_interval_is_rejected() {
    let err = PollRequest::new(snapshot_target(), 0, WaitBudget::Unbounded).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

/// Story: progress is reported to the caller's sink on every check
#[tokio::test(start_paused = true)]
async fn story_progress_reaches_injected_sink() {
    let cluster = FakeCluster {
        snapshot_states: Script::new(vec![SnapshotState::InProgress, SnapshotState::Partial]),
        ..FakeCluster::new()
    };
    let seen: Arc<Mutex<Vec<(u32, Duration)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = seen.clone();

    let request = PollRequest::new(snapshot_target(), 9, WaitBudget::Unbounded).unwrap();
    let report = PollLoop::new(&cluster)
        .with_progress(Arc::new(move |p: &Progress| {
            sink_seen.lock().unwrap().push((p.check, p.elapsed));
        }))
        .run_poll(request)
        .await;

    assert!(report.is_completed());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![(1, Duration::ZERO), (2, Duration::from_secs(9))]
    );
}

// ==========================================================================
// Story Tests: Deleting indices retries only what is left
// ==========================================================================

/// Story: one of three indices survives the first bulk delete
#[tokio::test]
async fn story_residual_delete_succeeds_on_second_attempt() {
    let mut attempts: Vec<Vec<String>> = Vec::new();
    let outcome = retry_residual("delete_indices", 3, names(&["a", "b", "c"]), |pending| {
        attempts.push(pending.clone());
        let left = if attempts.len() == 1 {
            names(&["b"])
        } else {
            Vec::new()
        };
        async move { Ok(left) }
    })
    .await
    .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.attempts, 2);
    assert_eq!(attempts, vec![names(&["a", "b", "c"]), names(&["b"])]);
}

/// Story: the same residual retry, seen through the delete action
#[tokio::test]
async fn story_delete_action_retries_surviving_index() {
    let cluster = Arc::new(FakeCluster {
        indices: Script::new(vec![names(&["b", "keep"]), names(&["keep"])]),
        ..FakeCluster::new()
    });

    DeleteIndices::new(cluster.clone(), names(&["a", "b", "c"]))
        .do_action()
        .await
        .unwrap();

    assert_eq!(
        cluster.calls(),
        vec!["delete_indices a,b,c".to_string(), "delete_indices b".to_string()]
    );
}
