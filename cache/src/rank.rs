//! The decay-aware hotness score used to order eviction candidates.
//!
//! `rank = log10(access_count) - seconds_since_last_access / fade_out`
//!
//! Ten accesses buy roughly `fade_out` seconds of inactivity, and the score
//! keeps falling linearly for as long as an entry goes untouched.

use crate::entry::CacheEntry;
use crate::time;

use std::sync::Arc;
use std::time::Duration;

/// The reference fade-out horizon.
pub(crate) const DEFAULT_FADE_OUT: Duration = Duration::from_secs(10);

/// Scores an entry from its raw counters. Higher means hotter.
#[inline]
pub(crate) fn rank(access_count: u64, idle_nanos: u64, fade_out_secs: f64) -> f64 {
  let frequency = (access_count.max(1) as f64).log10();
  frequency - time::nanos_to_secs(idle_nanos) / fade_out_secs
}

/// Scores an entry as seen at `now`.
#[inline]
pub(crate) fn rank_entry<T: ?Sized>(entry: &CacheEntry<T>, now: u64, fade_out_secs: f64) -> f64 {
  let idle = time::nanos_between(entry.last_accessed(), now);
  rank(entry.access_count(), idle, fade_out_secs)
}

/// An entry paired with the rank it had when an eviction pass looked at it.
pub(crate) struct RankedEntry<T: ?Sized> {
  pub(crate) rank: f64,
  pub(crate) entry: Arc<CacheEntry<T>>,
}

/// Sorts hottest first. Ties keep their snapshot order.
pub(crate) fn sort_hottest_first<T: ?Sized>(ranked: &mut [RankedEntry<T>]) {
  ranked.sort_by(|a, b| b.rank.total_cmp(&a.rank));
}
