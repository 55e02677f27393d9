use crate::builder::validate_bounds;
use crate::error::ConfigError;
use crate::metrics::MetricsSnapshot;
use crate::shared::CacheShared;
use crate::task::pass::PassReport;

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A thread-safe, cost-based adaptive object cache.
///
/// Items are tracked by identity (`Arc` allocation), not by value. Cloning the
/// handle is cheap and every clone refers to the same cache.
pub struct CostCache<T: ?Sized> {
  pub(crate) shared: Arc<CacheShared<T>>,
}

impl<T: ?Sized> Clone for CostCache<T> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T: ?Sized> fmt::Debug for CostCache<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CostCache")
      .field("shared", &self.shared)
      .finish()
  }
}

impl<T: ?Sized> CostCache<T> {
  /// The process-unique id of this cache.
  pub fn id(&self) -> u64 {
    self.shared.id
  }

  /// Number of tracked items.
  pub fn len(&self) -> usize {
    self.shared.store.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Whether this exact allocation is currently tracked.
  pub fn contains(&self, item: &Arc<T>) -> bool {
    self.shared.store.get(item).is_some()
  }

  /// The current elastic cost ceiling.
  pub fn current_ceiling(&self) -> f64 {
    self.shared.bound.current()
  }

  /// The keep ratio recorded by the most recent eviction pass.
  pub fn hit_rate(&self) -> f64 {
    self.shared.bound.hit_rate()
  }

  pub fn min_count(&self) -> usize {
    self.shared.min_count()
  }

  /// The `(min_cost, max_cost)` range of the ceiling.
  pub fn cost_bounds(&self) -> (u64, u64) {
    self.shared.bound.bounds()
  }

  /// Changes the ceiling range. Takes effect at the next pass.
  pub fn set_cost_bounds(&self, min_cost: u64, max_cost: u64) -> Result<(), ConfigError> {
    validate_bounds(min_cost, max_cost)?;
    self.shared.bound.set_bounds(min_cost, max_cost);
    tracing::debug!(
      cache_id = self.shared.id,
      min_cost,
      max_cost,
      "cost bounds changed"
    );
    Ok(())
  }

  /// Changes the retained-entry floor. Takes effect at the next pass.
  pub fn set_min_count(&self, min_count: usize) {
    self.shared.min_count.store(min_count, Ordering::Relaxed);
    tracing::debug!(cache_id = self.shared.id, min_count, "min count changed");
  }

  /// Returns a snapshot of the cache's performance metrics.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics_snapshot()
  }
}

impl<T> CostCache<T>
where
  T: ?Sized + Send + Sync + 'static,
{
  /// Tracks `item`, or records another access if it is already tracked.
  ///
  /// `on_evicted` is registered only when this call starts tracking the item;
  /// on later accesses it is dropped unused. It runs exactly once, on whatever
  /// thread removes the item.
  ///
  /// Never blocks on eviction: at most, this call wins the task slot and hands
  /// a pass to the configured spawner.
  pub fn add_or_access<F>(&self, item: Arc<T>, on_evicted: F)
  where
    F: FnOnce(Arc<T>) + Send + 'static,
  {
    self.shared.add_or_access(item, Box::new(on_evicted));
  }

  /// `add_or_access` without an eviction callback.
  pub fn access(&self, item: Arc<T>) {
    self.add_or_access(item, |_| {});
  }

  /// Removes every tracked item, firing each one's eviction callback once.
  pub fn clear(&self) {
    self.shared.clear();
  }

  /// Removes one item, firing its eviction callback. Returns `false` if the
  /// item was not tracked or another thread removed it first.
  pub fn invalidate(&self, item: &Arc<T>) -> bool {
    self.shared.invalidate(item)
  }

  /// Runs an eviction pass now, on this thread, ignoring the inter-pass delay.
  ///
  /// Returns `None` if another pass currently owns the task slot.
  pub fn evict_now(&self) -> Option<PassReport> {
    let ticket = self.shared.gate.try_acquire()?;
    Some(self.shared.run_with_ticket(ticket))
  }
}
