//! Stories about actions handing over to the poll loop

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use shardkeeper::actions::{
    Alias, Close, ClusterAction, CreateIndex, ForceMerge, Replicas, Restore, RestoreOptions,
    Rollover, Snapshot, SnapshotOptions,
};
use shardkeeper::client::{ClusterHealth, HealthStatus, SnapshotInfo, SnapshotState};
use shardkeeper::config::WaitOptions;
use shardkeeper::wait::PollOutcome;
use shardkeeper::Error;

use super::{names, FakeCluster, Script};

fn restorable(indices: &[&str]) -> Vec<SnapshotInfo> {
    vec![SnapshotInfo {
        name: "nightly".to_string(),
        state: SnapshotState::Success,
        indices: names(indices),
        start_time_in_millis: Some(1_700_000_000_000),
    }]
}

// ==========================================================================
// Story Tests: Snapshot and restore
// ==========================================================================

/// Story: a snapshot is created once and watched until it succeeds
#[tokio::test(start_paused = true)]
async fn story_snapshot_is_created_then_watched() {
    let cluster = Arc::new(FakeCluster {
        snapshot_states: Script::new(vec![
            SnapshotState::InProgress,
            SnapshotState::InProgress,
            SnapshotState::Success,
        ]),
        ..FakeCluster::new()
    });

    let start = tokio::time::Instant::now();
    Snapshot::new(
        cluster.clone(),
        names(&["logs-1", "logs-2"]),
        "backups",
        "nightly",
        SnapshotOptions::default(),
    )
    .unwrap()
    .do_action()
    .await
    .unwrap();

    assert_eq!(cluster.calls(), vec!["create_snapshot backups/nightly".to_string()]);
    // Default interval of 9s, two waits between three checks
    assert_eq!(start.elapsed(), Duration::from_secs(18));
}

/// Story: a restore that produced only some indices is a warning
#[tokio::test(start_paused = true)]
async fn story_partial_restore_warns_but_succeeds() {
    let cluster = Arc::new(FakeCluster {
        snapshots: restorable(&["idx-a", "idx-b"]),
        indices: Script::new(vec![names(&["idx-a"])]),
        ..FakeCluster::new()
    });
    let restore = Restore::new(
        cluster.clone(),
        "backups",
        &cluster.snapshots,
        None,
        RestoreOptions::default(),
    )
    .unwrap()
    .with_wait(WaitOptions::waiting(2).with_max_wait(5));

    let report = restore.run().await.unwrap();
    assert_eq!(report.outcome, Some(PollOutcome::TimedOut));
    assert!(report.is_partial());
    assert_eq!(report.missing, names(&["idx-b"]));

    restore.do_action().await.unwrap();
}

/// Story: a restore that produced nothing at all is an error
#[tokio::test(start_paused = true)]
async fn story_empty_restore_is_failed_execution() {
    let cluster = Arc::new(FakeCluster {
        snapshots: restorable(&["idx-a", "idx-b"]),
        indices: Script::new(vec![Vec::new()]),
        ..FakeCluster::new()
    });

    let err = Restore::new(
        cluster.clone(),
        "backups",
        &cluster.snapshots,
        Some("nightly"),
        RestoreOptions::default(),
    )
    .unwrap()
    .with_wait(WaitOptions::waiting(2).with_max_wait(5))
    .do_action()
    .await
    .unwrap_err();

    assert!(matches!(err, Error::FailedExecution(_)));
}

/// Story: renamed indices are what the restore waits for
#[tokio::test(start_paused = true)]
async fn story_renamed_restore_waits_for_new_names() {
    let cluster = Arc::new(FakeCluster {
        snapshots: restorable(&["logs-1"]),
        indices: Script::new(vec![Vec::new(), names(&["logs-1", "restored-logs-1"])]),
        ..FakeCluster::new()
    });
    let options = RestoreOptions {
        rename_pattern: Some("(.+)".to_string()),
        rename_replacement: Some("restored-$1".to_string()),
        ..RestoreOptions::default()
    };

    let restore = Restore::new(cluster.clone(), "backups", &cluster.snapshots, None, options)
        .unwrap()
        .with_wait(WaitOptions::waiting(3));
    assert_eq!(restore.expected_indices(), names(&["restored-logs-1"]).as_slice());

    let report = restore.run().await.unwrap();
    assert_eq!(report.outcome, Some(PollOutcome::Completed));
    assert!(report.all_restored());
}

// ==========================================================================
// Story Tests: Replica and index maintenance
// ==========================================================================

/// Story: replicas that can never be allocated run into the budget
#[tokio::test(start_paused = true)]
async fn story_red_replicas_time_out() {
    let cluster = Arc::new(FakeCluster {
        health: Script::new(vec![ClusterHealth::with_status(HealthStatus::Red)]),
        replicas: 2,
        ..FakeCluster::new()
    });

    let err = Replicas::new(cluster.clone(), names(&["logs-1"]), 2)
        .with_wait(WaitOptions::waiting(3).with_max_wait(10))
        .do_action()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Timeout { ref max_wait, .. } if max_wait == "10s"));
    // Checks at t=0, 3, 6 and 9; one at t=12 would overrun the budget
    assert_eq!(cluster.health.reads(), 4);
}

/// Story: closing with alias removal runs the three steps in order
#[tokio::test]
async fn story_close_removes_aliases_then_flushes_then_closes() {
    let cluster = Arc::new(FakeCluster::new());

    Close::new(cluster.clone(), names(&["a", "b"]))
        .with_delete_aliases(true)
        .do_action()
        .await
        .unwrap();

    assert_eq!(
        cluster.calls(),
        vec![
            "delete_aliases a,b".to_string(),
            "flush_indices a,b".to_string(),
            "close_indices a,b".to_string(),
        ]
    );
}

/// Story: force merges go one index at a time
#[tokio::test(start_paused = true)]
async fn story_forcemerge_merges_each_index() {
    let cluster = Arc::new(FakeCluster::new());

    ForceMerge::new(cluster.clone(), names(&["a", "b"]), 1)
        .unwrap()
        .with_delay(Duration::from_secs(5))
        .do_action()
        .await
        .unwrap();

    assert_eq!(
        cluster.calls(),
        vec!["forcemerge a 1".to_string(), "forcemerge b 1".to_string()]
    );
}

/// Story: an index is created under its literal name
#[tokio::test]
async fn story_create_index() {
    let cluster = Arc::new(FakeCluster::new());

    CreateIndex::new(cluster.clone(), "archive", json!({"settings": {}}))
        .unwrap()
        .do_action()
        .await
        .unwrap();

    assert_eq!(cluster.calls(), vec!["create_index archive".to_string()]);
}

// ==========================================================================
// Story Tests: Aliases
// ==========================================================================

/// Story: yesterday's index leaves the alias and today's joins it in one call
#[tokio::test]
async fn story_alias_swaps_indices_atomically() {
    let mut cluster = FakeCluster::new();
    cluster.aliases.insert("logs-1".to_string(), names(&["current"]));
    let cluster = Arc::new(cluster);

    let mut alias = Alias::new(cluster.clone(), "current", None).unwrap();
    alias.add(&names(&["logs-2"]), false).unwrap();
    alias.remove(&names(&["logs-1"]), false).await.unwrap();
    alias.do_action().await.unwrap();

    assert_eq!(cluster.calls(), vec!["update_aliases 2".to_string()]);
}

/// Story: a rollover dry run changes nothing; the real one rolls the alias
#[tokio::test]
async fn story_rollover_dry_run_then_roll() {
    let mut cluster = FakeCluster::new();
    cluster.aliases.insert("logs-000001".to_string(), names(&["writer"]));
    let cluster = Arc::new(cluster);
    let rollover = Rollover::new(cluster.clone(), "writer", json!({"max_docs": 1}), None).unwrap();

    let preview = rollover.dry_run().await.unwrap();
    assert!(preview.dry_run);
    assert!(cluster.calls().is_empty());

    rollover.do_action().await.unwrap();
    assert_eq!(cluster.calls(), vec!["rollover writer".to_string()]);
}
