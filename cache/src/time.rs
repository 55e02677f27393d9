use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

// The single, static reference point for all time calculations in the cache.
// It is initialized lazily on its first use.
static CACHE_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

// Process-wide id sources. Ids start at 1 so that 0 never names anything.
static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_ITEM_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonic nanoseconds elapsed since the cache epoch.
///
/// Timestamps are stored as plain `u64`s so that entries can keep them in
/// atomics.
#[inline]
pub(crate) fn now_nanos() -> u64 {
  Instant::now()
    .saturating_duration_since(*CACHE_EPOCH)
    .as_nanos() as u64
}

/// Nanoseconds between `earlier` and `now`, zero if `earlier` is in the future
/// (possible when a racing writer stamped a slightly later time).
#[inline]
pub(crate) fn nanos_between(earlier: u64, now: u64) -> u64 {
  now.saturating_sub(earlier)
}

#[inline]
pub(crate) fn nanos_to_secs(nanos: u64) -> f64 {
  nanos as f64 / 1_000_000_000.0
}

#[inline]
pub(crate) fn nanos_to_millis(nanos: u64) -> f64 {
  nanos as f64 / 1_000_000.0
}

#[inline]
pub(crate) fn duration_to_nanos(duration: Duration) -> u64 {
  u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Hands out the next cache instance id.
#[inline]
pub(crate) fn next_cache_id() -> u64 {
  NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Hands out the next cache entry id. Ids are unique across every cache in
/// the process.
#[inline]
pub(crate) fn next_item_id() -> u64 {
  NEXT_ITEM_ID.fetch_add(1, Ordering::Relaxed)
}
