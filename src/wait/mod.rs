//! Completion tracking for asynchronous cluster operations
//!
//! Shard relocation, replica sync, snapshot creation, snapshot restore and
//! reindex tasks all run on the cluster after the request that started them
//! has returned. This module watches them to a terminal state:
//!
//! - [`PollRequest`] describes one session: what to wait for ([`WaitTarget`]),
//!   how often to check, and how long to wait at most ([`WaitBudget`]).
//! - [`CompletionPredicate`] decides, per operation kind, whether the
//!   observed cluster state means done, failed, or still running.
//! - [`PollLoop`] drives the checks and produces a [`PollReport`].
//!
//! Sessions are strictly sequential. Transport errors end a session as
//! [`PollOutcome::Failed`]; the loop never retries on its own.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::WaitOptions;
use crate::{Error, Result};

mod poll;
mod predicate;

pub use poll::PollLoop;
pub use predicate::{
    AllocationComplete, CompletionPredicate, ReindexComplete, ReplicaState, ReplicasSynced,
    RestoreComplete, RestoreState, RoutingComplete, SnapshotComplete,
};

/// Kind of asynchronous operation being waited on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Shard relocation after index allocation settings change
    Allocation,
    /// Cluster-wide relocation after routing settings change
    ClusterRouting,
    /// Replica allocation after a replica count change
    Replicas,
    /// Snapshot creation
    Snapshot,
    /// Snapshot restore
    Restore,
    /// Reindex task
    Reindex,
}

impl OperationKind {
    /// Every kind, in declaration order
    pub const ALL: [OperationKind; 6] = [
        Self::Allocation,
        Self::ClusterRouting,
        Self::Replicas,
        Self::Snapshot,
        Self::Restore,
        Self::Reindex,
    ];

    /// Snake-case name, as used in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allocation => "allocation",
            Self::ClusterRouting => "cluster_routing",
            Self::Replicas => "replicas",
            Self::Snapshot => "snapshot",
            Self::Restore => "restore",
            Self::Reindex => "reindex",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                Error::configuration(format!(
                    "'{}' is not a waitable operation; expected one of allocation, \
                     cluster_routing, replicas, snapshot, restore, reindex",
                    s
                ))
            })
    }
}

/// What a polling session waits for, with the identifiers each kind needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitTarget {
    /// No relocating shards for these indices
    Allocation {
        /// Indices whose allocation settings changed
        indices: Vec<String>,
    },
    /// No relocating shards anywhere in the cluster
    ClusterRouting,
    /// Every index carries `count` replicas and they are all allocated
    Replicas {
        /// Indices whose replica count changed
        indices: Vec<String>,
        /// Requested replicas per primary
        count: u32,
    },
    /// The snapshot reaches a terminal state
    Snapshot {
        /// Repository holding the snapshot
        repository: String,
        /// Snapshot name
        name: String,
    },
    /// Every expected index exists and is fully recovered
    Restore {
        /// Index names the restore should produce
        indices: BTreeSet<String>,
    },
    /// The task is no longer running
    Reindex {
        /// Task handle returned when the reindex was submitted
        task_id: String,
    },
}

impl WaitTarget {
    /// Operation kind this target belongs to
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Allocation { .. } => OperationKind::Allocation,
            Self::ClusterRouting => OperationKind::ClusterRouting,
            Self::Replicas { .. } => OperationKind::Replicas,
            Self::Snapshot { .. } => OperationKind::Snapshot,
            Self::Restore { .. } => OperationKind::Restore,
            Self::Reindex { .. } => OperationKind::Reindex,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::Allocation { indices } | Self::Replicas { indices, .. } if indices.is_empty() => {
                Err(Error::missing_argument(format!(
                    "{} wait needs at least one index",
                    self.kind()
                )))
            }
            Self::Snapshot { repository, .. } if repository.is_empty() => {
                Err(Error::missing_argument("snapshot wait needs a repository"))
            }
            Self::Snapshot { name, .. } if name.is_empty() => {
                Err(Error::missing_argument("snapshot wait needs a snapshot name"))
            }
            Self::Restore { indices } if indices.is_empty() => Err(Error::missing_argument(
                "restore wait needs the expected index names",
            )),
            Self::Reindex { task_id } if task_id.is_empty() => {
                Err(Error::missing_argument("reindex wait needs a task id"))
            }
            _ => Ok(()),
        }
    }
}

/// Upper limit on how long a session may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitBudget {
    /// Stop with [`PollOutcome::TimedOut`] once this much time has passed
    Bounded(Duration),
    /// Never time out.
    ///
    /// Only a completed or failed operation ends the session, so a stuck
    /// operation hangs the calling process. Callers opt into this explicitly.
    Unbounded,
}

impl fmt::Display for WaitBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bounded(d) => write!(f, "{}s", d.as_secs()),
            Self::Unbounded => f.write_str("unbounded"),
        }
    }
}

/// Descriptor of one polling session
///
/// Not `Clone`: [`PollLoop::run_poll`] consumes it, so a request cannot be
/// reused after its session ends.
#[derive(Debug)]
pub struct PollRequest {
    target: WaitTarget,
    poll_interval: Duration,
    budget: WaitBudget,
}

impl PollRequest {
    /// Validate and build a request
    ///
    /// A zero interval is rejected rather than coerced to a minimum.
    pub fn new(target: WaitTarget, poll_interval_secs: u64, budget: WaitBudget) -> Result<Self> {
        if poll_interval_secs == 0 {
            return Err(Error::configuration(
                "poll interval must be at least 1 second",
            ));
        }
        target.validate()?;
        Ok(Self {
            target,
            poll_interval: Duration::from_secs(poll_interval_secs),
            budget,
        })
    }

    /// Build a request from serialized wait options
    pub fn from_options(target: WaitTarget, options: &WaitOptions) -> Result<Self> {
        Self::new(target, options.wait_interval, options.budget()?)
    }

    /// Operation kind being waited on
    pub fn kind(&self) -> OperationKind {
        self.target.kind()
    }

    /// What the session waits for
    pub fn target(&self) -> &WaitTarget {
        &self.target
    }

    /// Time between checks
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Time budget
    pub fn budget(&self) -> WaitBudget {
        self.budget
    }
}

/// Why a session failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Querying the cluster failed
    Query(String),
    /// The cluster reported the operation itself as failed
    Operation(String),
}

impl FailureReason {
    /// The failure text
    pub fn message(&self) -> &str {
        match self {
            Self::Query(m) | Self::Operation(m) => m,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query(m) => write!(f, "query failed: {}", m),
            Self::Operation(m) => write!(f, "operation failed: {}", m),
        }
    }
}

/// Terminal result of a polling session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The operation finished
    Completed,
    /// The budget ran out; the operation may still be running
    TimedOut,
    /// A query failed or the operation failed
    Failed(FailureReason),
}

impl PollOutcome {
    /// Terminal session state matching this outcome
    pub fn state(&self) -> PollState {
        match self {
            Self::Completed => PollState::Completed,
            Self::TimedOut => PollState::TimedOut,
            Self::Failed(_) => PollState::Failed,
        }
    }
}

/// Session lifecycle: `Pending -> Checking -> {Completed | TimedOut | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// Built, not yet queried
    Pending,
    /// At least one check made, not yet terminal
    Checking,
    /// Terminal: done
    Completed,
    /// Terminal: budget exhausted
    TimedOut,
    /// Terminal: failed
    Failed,
}

impl PollState {
    /// Terminal states have no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::TimedOut | Self::Failed)
    }

    /// Move to `next`, unless already terminal
    pub fn advance(&mut self, next: PollState) {
        if !self.is_terminal() {
            *self = next;
        }
    }
}

/// One progress observation, delivered to the [`ProgressSink`] every check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Operation kind being waited on
    pub kind: OperationKind,
    /// 1-based check number
    pub check: u32,
    /// Time since the session started
    pub elapsed: Duration,
    /// Human-readable state description
    pub description: String,
}

/// Callback receiving every [`Progress`] observation
pub type ProgressSink = Arc<dyn Fn(&Progress) + Send + Sync>;

/// Everything known about a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// Operation kind waited on
    pub kind: OperationKind,
    /// Terminal outcome
    pub outcome: PollOutcome,
    /// Number of state queries issued
    pub checks: u32,
    /// Time from session start to the terminal decision
    pub elapsed: Duration,
    /// Last progress description seen, if any check succeeded
    pub last_progress: Option<String>,
    /// Budget the session ran under
    pub budget: WaitBudget,
}

impl PollReport {
    /// Whether the operation finished
    pub fn is_completed(&self) -> bool {
        self.outcome == PollOutcome::Completed
    }

    /// Convert to `Ok(())` on completion, or the matching [`Error`]
    pub fn into_result(self) -> Result<()> {
        match self.outcome {
            PollOutcome::Completed => Ok(()),
            PollOutcome::TimedOut => Err(Error::Timeout {
                operation: self.kind.to_string(),
                max_wait: self.budget.to_string(),
            }),
            PollOutcome::Failed(FailureReason::Query(message)) => {
                Err(Error::transport(self.kind.as_str(), message))
            }
            PollOutcome::Failed(FailureReason::Operation(reason)) => Err(Error::OperationFailed {
                operation: self.kind.to_string(),
                reason,
            }),
        }
    }
}
