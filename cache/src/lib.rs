//! A concurrent, cost-based adaptive object cache with an elastic upper bound.
//!
//! Callers hand the cache shared objects (`Arc<T>`) together with a callback.
//! The cache tracks each object by identity, scores it by how often and how
//! recently it was touched, and periodically evicts the coldest objects once
//! their combined cost exceeds a ceiling that stretches under load and decays
//! back afterwards. Each evicted object's callback runs exactly once.
//!
//! # Features
//! - **High Concurrency**: A sharded identity map; no lock is ever held across
//!   an eviction pass or a user callback.
//! - **Elastic Ceiling**: Every access raises the cost ceiling; every pass
//!   decays it exponentially into `[min_cost, max_cost]`, slower when the
//!   cache is keeping most of what it sees.
//! - **Single-Flight Eviction**: At most one pass is scheduled or running at a
//!   time, gated by a minimum inter-pass delay, with optional eager follow-ups.
//! - **Pluggable Execution**: Passes run on a background thread, inline, or on
//!   a Tokio runtime (`tokio` feature).
//! - **Recoverable Values**: `RecoverableValue` saves state on eviction and
//!   rebuilds the value on the next read.
//! - **Observability**: `tracing` events and lock-free metrics.

// Public modules that form the API
pub mod builder;
pub mod error;
pub mod handles;
pub mod listener;
pub mod metrics;
pub mod recoverable;
pub mod runtime;

// Internal, crate-only modules
mod bound;
mod entry;
mod rank;
mod shared;
mod store;
mod task;
mod time;

// Re-export the primary user-facing types for convenience
pub use builder::{CostCacheBuilder, CostCacheOptions};
pub use error::ConfigError;
pub use handles::CostCache;
pub use listener::{EvictionListener, EvictionReason};
pub use metrics::MetricsSnapshot;
pub use recoverable::{RecoverableValue, RecoverySource};
pub use runtime::{InlineSpawner, PassSpawner, ThreadSpawner};
pub use task::pass::PassReport;

#[cfg(feature = "tokio")]
pub use runtime::TokioSpawner;
