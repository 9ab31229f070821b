//! The polling session driver

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::predicate::{
    AllocationComplete, CompletionPredicate, ReindexComplete, ReplicasSynced, RestoreComplete,
    RoutingComplete, SnapshotComplete,
};
use super::{
    FailureReason, PollOutcome, PollReport, PollRequest, PollState, Progress, ProgressSink,
    WaitBudget, WaitTarget,
};
use crate::client::ClusterClient;

/// Runs polling sessions against a cluster
///
/// A session queries the cluster, evaluates the predicate for the request's
/// operation kind, and either stops or sleeps for the poll interval. Elapsed
/// time is measured from the start of the session. After each check that is
/// not terminal, a bounded session stops with [`PollOutcome::TimedOut`] when
/// the next check would land past the budget, so it never sleeps beyond it.
pub struct PollLoop<'a> {
    client: &'a dyn ClusterClient,
    sink: ProgressSink,
}

impl<'a> PollLoop<'a> {
    /// Poll loop reporting progress only through tracing
    pub fn new(client: &'a dyn ClusterClient) -> Self {
        Self {
            client,
            sink: Arc::new(|_: &Progress| {}),
        }
    }

    /// Also deliver every progress observation to `sink`
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.sink = sink;
        self
    }

    /// Run a session to a terminal outcome
    ///
    /// Consumes the request; a new session needs a new request.
    pub async fn run_poll(&self, request: PollRequest) -> PollReport {
        match request.target().clone() {
            WaitTarget::Allocation { indices } => {
                self.run(request, AllocationComplete::new(indices)).await
            }
            WaitTarget::ClusterRouting => self.run(request, RoutingComplete).await,
            WaitTarget::Replicas { indices, count } => {
                self.run(request, ReplicasSynced::new(indices, count)).await
            }
            WaitTarget::Snapshot { repository, name } => {
                self.run(request, SnapshotComplete::new(repository, name)).await
            }
            WaitTarget::Restore { indices } => {
                self.run(request, RestoreComplete::new(indices)).await
            }
            WaitTarget::Reindex { task_id } => {
                self.run(request, ReindexComplete::new(task_id)).await
            }
        }
    }

    /// Run a session with an explicit predicate
    pub async fn run<P>(&self, request: PollRequest, predicate: P) -> PollReport
    where
        P: CompletionPredicate,
    {
        let kind = request.kind();
        let interval = request.poll_interval();
        let budget = request.budget();
        let start = Instant::now();

        let mut state = PollState::Pending;
        let mut checks: u32 = 0;
        let mut last_progress: Option<String> = None;

        let finish = |outcome: PollOutcome, checks: u32, last_progress: Option<String>| {
            PollReport {
                kind,
                outcome,
                checks,
                elapsed: start.elapsed(),
                last_progress,
                budget,
            }
        };

        debug!(
            operation = %kind,
            interval_secs = interval.as_secs(),
            budget = %budget,
            "Starting completion wait"
        );

        loop {
            state.advance(PollState::Checking);
            checks += 1;

            let observed = match predicate.observe(self.client).await {
                Ok(observed) => observed,
                Err(e) => {
                    error!(
                        operation = %kind,
                        check = checks,
                        error = %e,
                        "Completion check failed"
                    );
                    state.advance(PollState::Failed);
                    return finish(
                        PollOutcome::Failed(FailureReason::Query(e.to_string())),
                        checks,
                        last_progress,
                    );
                }
            };

            let elapsed = start.elapsed();
            let description = predicate.describe(&observed);
            debug!(
                operation = %kind,
                check = checks,
                elapsed_secs = elapsed.as_secs(),
                state = ?state,
                progress = %description,
                "Checked completion"
            );
            (self.sink)(&Progress {
                kind,
                check: checks,
                elapsed,
                description: description.clone(),
            });
            last_progress = Some(description);

            if let Some(reason) = predicate.failure(&observed) {
                error!(operation = %kind, reason = %reason, "Operation failed on the cluster");
                state.advance(PollState::Failed);
                return finish(
                    PollOutcome::Failed(FailureReason::Operation(reason)),
                    checks,
                    last_progress,
                );
            }

            if predicate.is_done(&observed) {
                info!(
                    operation = %kind,
                    checks,
                    elapsed_secs = elapsed.as_secs(),
                    "Operation complete"
                );
                state.advance(PollState::Completed);
                return finish(PollOutcome::Completed, checks, last_progress);
            }

            if exhausted(budget, elapsed, interval) {
                warn!(
                    operation = %kind,
                    checks,
                    budget = %budget,
                    "Stopped waiting before completion; the operation may still be running"
                );
                state.advance(PollState::TimedOut);
                return finish(PollOutcome::TimedOut, checks, last_progress);
            }

            tokio::time::sleep(interval).await;
        }
    }
}

fn exhausted(budget: WaitBudget, elapsed: Duration, interval: Duration) -> bool {
    match budget {
        WaitBudget::Bounded(max_wait) => elapsed + interval > max_wait,
        WaitBudget::Unbounded => false,
    }
}
