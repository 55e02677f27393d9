use crate::bound::UpperBound;
use crate::entry::{CacheEntry, EvictAction};
use crate::listener::{EvictionListener, EvictionReason};
use crate::metrics::{Gauges, Metrics, MetricsSnapshot};
use crate::runtime::{Job, PassSpawner};
use crate::store::IdentityStore;
use crate::task::gate::{PassGate, PassTicket};
use crate::task::pass::{self, PassReport};
use crate::time;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// The owner-supplied cost measure.
pub(crate) type CostFn<T> = Arc<dyn Fn(&T) -> u64 + Send + Sync>;

/// The internal, thread-safe core of the cache.
pub(crate) struct CacheShared<T: ?Sized> {
  pub(crate) id: u64,
  pub(crate) store: IdentityStore<T>,
  pub(crate) bound: UpperBound,
  pub(crate) gate: Arc<PassGate>,
  pub(crate) metrics: Metrics,
  pub(crate) cost_fn: CostFn<T>,
  pub(crate) spawner: Arc<dyn PassSpawner>,
  pub(crate) listener: Option<Arc<dyn EvictionListener<T>>>,
  pub(crate) min_count: AtomicUsize,
  pub(crate) window: Duration,
  pub(crate) window_nanos: u64,
  pub(crate) fade_out_secs: f64,
  pub(crate) eager_eviction: bool,
}

impl<T: ?Sized> fmt::Debug for CacheShared<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheShared")
      .field("id", &self.id)
      .field("len", &self.store.len())
      .field("min_count", &self.min_count())
      .field("bound", &self.bound)
      .field("gate", &self.gate)
      .field("window", &self.window)
      .field("eager_eviction", &self.eager_eviction)
      .finish_non_exhaustive()
  }
}

impl<T: ?Sized> Drop for CacheShared<T> {
  fn drop(&mut self) {
    tracing::debug!(
      cache_id = self.id,
      remaining = self.store.len(),
      "cost cache dropped"
    );
  }
}

impl<T: ?Sized> CacheShared<T> {
  #[inline]
  pub(crate) fn min_count(&self) -> usize {
    self.min_count.load(Ordering::Relaxed)
  }

  pub(crate) fn metrics_snapshot(&self) -> MetricsSnapshot {
    self.metrics.snapshot(Gauges {
      len: self.store.len(),
      ceiling: self.bound.current(),
      hit_rate: self.bound.hit_rate(),
    })
  }
}

impl<T> CacheShared<T>
where
  T: ?Sized + Send + Sync + 'static,
{
  /// Tracks `item` (registering `on_evicted` on first insertion only) or
  /// records another access to it, then maybe launches an eviction pass.
  pub(crate) fn add_or_access(self: &Arc<Self>, item: Arc<T>, on_evicted: EvictAction<T>) {
    let (entry, inserted) = self.store.insert_or_update(
      &item,
      || CacheEntry::new(Arc::clone(&item), on_evicted),
      |entry| entry.record_access(),
    );

    Metrics::incr(&self.metrics.accesses, 1);
    if inserted {
      Metrics::incr(&self.metrics.inserts, 1);
    } else {
      Metrics::incr(&self.metrics.hits, 1);
    }
    tracing::trace!(
      cache_id = self.id,
      item_id = entry.item_id(),
      inserted,
      "item accessed"
    );

    self.bound.bump();
    self.maybe_schedule_pass();
  }

  /// Launches a pass if the cache is above its floor, the inter-pass delay
  /// has elapsed and this caller wins the task slot. Never waits.
  fn maybe_schedule_pass(self: &Arc<Self>) {
    if self.store.len() <= self.min_count() {
      return;
    }
    if !self.gate.window_elapsed(time::now_nanos(), self.window_nanos) {
      return;
    }
    if let Some(ticket) = self.gate.try_acquire() {
      self.launch(ticket, None);
    }
  }

  /// Hands a pass to the spawner. The job only holds a weak reference, so a
  /// dropped cache never runs another pass; the ticket is released either way.
  fn launch(self: &Arc<Self>, ticket: PassTicket, delay: Option<Duration>) {
    let cache = Arc::downgrade(self);
    let job: Job = Box::new(move || {
      if let Some(shared) = cache.upgrade() {
        shared.run_with_ticket(ticket);
      }
    });

    match delay {
      Some(delay) => self.spawner.spawn_after(delay, job),
      None => self.spawner.spawn(job),
    }
  }

  /// Runs one pass while owning the task slot, then releases it.
  pub(crate) fn run_with_ticket(self: &Arc<Self>, ticket: PassTicket) -> PassReport {
    ticket.begin();
    let report = pass::run(self);
    drop(ticket);

    if self.eager_eviction {
      self.maybe_schedule_follow_up(&report);
    }
    report
  }

  /// Queues a delayed pass when sustained pressure means waiting for the next
  /// access would be too slow.
  fn maybe_schedule_follow_up(self: &Arc<Self>, report: &PassReport) {
    let (min_cost, _) = self.bound.bounds();
    if self.store.len() <= self.min_count() || report.head_cost <= min_cost {
      return;
    }
    if let Some(ticket) = self.gate.try_acquire() {
      tracing::trace!(
        cache_id = self.id,
        delay_ms = self.window.as_millis() as u64,
        head_cost = report.head_cost,
        "scheduling eager follow-up pass"
      );
      self.launch(ticket, Some(self.window));
    }
  }

  /// Removes `entry` and, only if this call won the removal, fires its
  /// eviction action and the cache-wide listener.
  pub(crate) fn evict(&self, entry: &Arc<CacheEntry<T>>, reason: EvictionReason) -> bool {
    if !self.store.remove_entry(entry) {
      return false;
    }

    let counter = match reason {
      EvictionReason::Capacity => &self.metrics.evicted_by_capacity,
      EvictionReason::Cleared => &self.metrics.evicted_by_clear,
      EvictionReason::Invalidated => &self.metrics.invalidations,
    };
    Metrics::incr(counter, 1);

    if let Some(action) = entry.take_evict_action() {
      action(Arc::clone(entry.item()));
    }
    if let Some(listener) = &self.listener {
      listener.on_evict(entry.item(), reason);
    }
    true
  }

  /// Removes every tracked item one at a time. Items inserted concurrently
  /// may or may not survive.
  pub(crate) fn clear(&self) {
    let mut cleared = 0usize;
    for entry in self.store.snapshot() {
      if self.evict(&entry, EvictionReason::Cleared) {
        cleared += 1;
      }
    }
    tracing::debug!(cache_id = self.id, cleared, "cost cache cleared");
  }

  pub(crate) fn invalidate(&self, item: &Arc<T>) -> bool {
    match self.store.get(item) {
      Some(entry) => self.evict(&entry, EvictionReason::Invalidated),
      None => false,
    }
  }
}
