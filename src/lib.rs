//! Shardkeeper - lifecycle actions for search-cluster indices and snapshots
//!
//! Shardkeeper issues lifecycle operations against a search cluster and,
//! where the cluster finishes them asynchronously, watches them until they
//! complete, fail, or run out of time.
//!
//! # Architecture
//!
//! Every action follows the same shape:
//! - Validate arguments up front, before any request is made
//! - Issue one mutating request per index chunk
//! - Optionally hand over to a [`wait::PollLoop`] session that re-checks a
//!   completion predicate on a fixed interval within a bounded budget
//!
//! A timed-out session means "we stopped watching", never "the cluster gave
//! up". Actions decide whether that is fatal.
//!
//! # Modules
//!
//! - [`actions`] - Lifecycle actions (snapshot, restore, reindex, delete, ...)
//! - [`wait`] - Completion tracking: predicates, poll loop and outcomes
//! - [`client`] - Cluster REST API trait and HTTP implementation
//! - [`retry`] - Backoff retry and residual-set retry helpers
//! - [`config`] - Client configuration and wait options
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod actions;
pub mod client;
pub mod config;
pub mod error;
pub mod retry;
pub mod wait;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
