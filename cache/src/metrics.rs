use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// A thread-safe, internal metrics collector for the cache.
/// All fields are atomic to allow for lock-free updates.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Access traffic ---
  pub(crate) accesses: CachePadded<AtomicU64>,
  pub(crate) hits: CachePadded<AtomicU64>,
  pub(crate) inserts: CachePadded<AtomicU64>,

  // --- Eviction passes ---
  pub(crate) passes: CachePadded<AtomicU64>,
  pub(crate) protected_skips: CachePadded<AtomicU64>,
  pub(crate) cost_computations: CachePadded<AtomicU64>,

  // --- Removals ---
  pub(crate) evicted_by_capacity: CachePadded<AtomicU64>,
  pub(crate) evicted_by_clear: CachePadded<AtomicU64>,
  pub(crate) invalidations: CachePadded<AtomicU64>,

  // --- Timestamps for Uptime ---
  created_at: Instant,
}

// Manual implementation of Default to handle the non-default `Instant`.
impl Default for Metrics {
  fn default() -> Self {
    Self {
      accesses: CachePadded::new(AtomicU64::new(0)),
      hits: CachePadded::new(AtomicU64::new(0)),
      inserts: CachePadded::new(AtomicU64::new(0)),
      passes: CachePadded::new(AtomicU64::new(0)),
      protected_skips: CachePadded::new(AtomicU64::new(0)),
      cost_computations: CachePadded::new(AtomicU64::new(0)),
      evicted_by_capacity: CachePadded::new(AtomicU64::new(0)),
      evicted_by_clear: CachePadded::new(AtomicU64::new(0)),
      invalidations: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

/// Gauges owned by other components, sampled at snapshot time.
pub(crate) struct Gauges {
  pub(crate) len: usize,
  pub(crate) ceiling: f64,
  pub(crate) hit_rate: f64,
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &AtomicU64, by: u64) {
    if by > 0 {
      counter.fetch_add(by, Ordering::Relaxed);
    }
  }

  /// Creates a point-in-time snapshot of the current metrics.
  pub(crate) fn snapshot(&self, gauges: Gauges) -> MetricsSnapshot {
    MetricsSnapshot {
      accesses: self.accesses.load(Ordering::Relaxed),
      hits: self.hits.load(Ordering::Relaxed),
      inserts: self.inserts.load(Ordering::Relaxed),
      passes: self.passes.load(Ordering::Relaxed),
      protected_skips: self.protected_skips.load(Ordering::Relaxed),
      cost_computations: self.cost_computations.load(Ordering::Relaxed),
      evicted_by_capacity: self.evicted_by_capacity.load(Ordering::Relaxed),
      evicted_by_clear: self.evicted_by_clear.load(Ordering::Relaxed),
      invalidations: self.invalidations.load(Ordering::Relaxed),
      len: gauges.len,
      ceiling: gauges.ceiling,
      hit_rate: gauges.hit_rate,
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time, public-facing snapshot of the cache's metrics.
#[derive(Clone)]
pub struct MetricsSnapshot {
  /// Total `add_or_access` calls.
  pub accesses: u64,
  /// Accesses to an item that was already tracked.
  pub hits: u64,
  /// Accesses that started tracking a new item.
  pub inserts: u64,
  /// Completed eviction passes.
  pub passes: u64,
  /// Entries a pass skipped because they were still in their grace period.
  pub protected_skips: u64,
  /// Calls made to the cost function.
  pub cost_computations: u64,
  /// Items removed by eviction passes.
  pub evicted_by_capacity: u64,
  /// Items removed by `clear`.
  pub evicted_by_clear: u64,
  /// Items removed by `invalidate`.
  pub invalidations: u64,
  /// Items tracked when the snapshot was taken.
  pub len: usize,
  /// The elastic cost ceiling when the snapshot was taken.
  pub ceiling: f64,
  /// The keep ratio recorded by the most recent eviction pass.
  pub hit_rate: f64,
  /// The number of seconds the cache has been running.
  pub uptime_secs: u64,
}

impl MetricsSnapshot {
  /// Share of accesses that found the item already tracked.
  pub fn hit_ratio(&self) -> f64 {
    if self.accesses == 0 {
      0.0
    } else {
      self.hits as f64 / self.accesses as f64
    }
  }
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("accesses", &self.accesses)
      .field("hits", &self.hits)
      .field("hit_ratio", &format!("{:.2}%", self.hit_ratio() * 100.0))
      .field("inserts", &self.inserts)
      .field("passes", &self.passes)
      .field("protected_skips", &self.protected_skips)
      .field("cost_computations", &self.cost_computations)
      .field("evicted_by_capacity", &self.evicted_by_capacity)
      .field("evicted_by_clear", &self.evicted_by_clear)
      .field("invalidations", &self.invalidations)
      .field("len", &self.len)
      .field("ceiling", &self.ceiling)
      .field("hit_rate", &format!("{:.2}%", self.hit_rate * 100.0))
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}
