//! Property tests for budget accounting and index chunking

use std::time::Duration;

use proptest::prelude::*;
use shardkeeper::actions::{chunk_index_list, MAX_CSV_LEN};
use shardkeeper::client::SnapshotState;
use shardkeeper::wait::{PollLoop, PollOutcome, PollReport, PollRequest, WaitBudget, WaitTarget};

use super::{FakeCluster, Script};

/// Run one snapshot wait on a paused single-threaded runtime
fn run_snapshot_wait(states: Vec<SnapshotState>, interval: u64, budget: WaitBudget) -> PollReport {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();
    let cluster = FakeCluster {
        snapshot_states: Script::new(states),
        ..FakeCluster::new()
    };
    let target = WaitTarget::Snapshot {
        repository: "backups".to_string(),
        name: "nightly".to_string(),
    };
    let request = PollRequest::new(target, interval, budget).unwrap();
    runtime.block_on(PollLoop::new(&cluster).run_poll(request))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// A session that never completes stops on the last check that fits in
    /// the budget and never sleeps past it.
    #[test]
    fn stuck_operation_never_overruns_budget(interval in 1u64..30, max_wait in 0u64..300) {
        let report = run_snapshot_wait(
            vec![SnapshotState::InProgress],
            interval,
            WaitBudget::Bounded(Duration::from_secs(max_wait)),
        );

        let expected_checks = (max_wait / interval) as u32 + 1;
        prop_assert_eq!(report.outcome, PollOutcome::TimedOut);
        prop_assert_eq!(report.checks, expected_checks);
        prop_assert!(report.elapsed <= Duration::from_secs(max_wait));
        prop_assert_eq!(report.elapsed, Duration::from_secs((max_wait / interval) * interval));
    }

    /// Completion is detected on exactly the check that first sees it.
    #[test]
    fn completion_is_seen_on_first_terminal_check(pending in 0usize..20, interval in 1u64..60) {
        let mut states = vec![SnapshotState::InProgress; pending];
        states.push(SnapshotState::Success);

        let report = run_snapshot_wait(states, interval, WaitBudget::Unbounded);

        prop_assert_eq!(report.outcome, PollOutcome::Completed);
        prop_assert_eq!(report.checks as usize, pending + 1);
        prop_assert_eq!(report.elapsed, Duration::from_secs(pending as u64 * interval));
    }

    /// Chunking keeps order and every request stays within the URL limit.
    #[test]
    fn chunks_preserve_order_within_limit(
        indices in prop::collection::vec("[a-z0-9][a-z0-9._-]{0,200}", 0..400)
    ) {
        let chunks = chunk_index_list(&indices);

        for chunk in &chunks {
            prop_assert!(!chunk.is_empty());
            prop_assert!(chunk.join(",").len() <= MAX_CSV_LEN);
        }
        let flattened: Vec<String> = chunks.into_iter().flatten().collect();
        prop_assert_eq!(flattened, indices);
    }
}
