use crate::time;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// The callback run when an entry leaves the cache.
pub(crate) type EvictAction<T> = Box<dyn FnOnce(Arc<T>) + Send + 'static>;

/// Sentinel stored in `CacheEntry::cost` until the cost is first computed.
const COST_UNINITIALIZED: u64 = u64::MAX;

/// Per-item bookkeeping for a tracked object.
///
/// Everything except the eviction action is atomic, so readers and the
/// eviction pass never lock an entry. Counters are approximate under races.
pub(crate) struct CacheEntry<T: ?Sized> {
  /// The tracked object. Holding it keeps its address (the identity key) stable.
  item: Arc<T>,
  item_id: u64,
  access_count: AtomicU64,
  /// Last access timestamp in nanoseconds since the cache epoch.
  last_accessed: AtomicU64,
  /// Creation timestamp in nanoseconds since the cache epoch.
  created_at: u64,
  /// Memoized cost, `COST_UNINITIALIZED` until first computed.
  cost: AtomicU64,
  /// Taken exactly once, by whoever wins the removal of this entry.
  evict_action: Mutex<Option<EvictAction<T>>>,
}

impl<T: ?Sized> fmt::Debug for CacheEntry<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheEntry")
      .field("item_id", &self.item_id)
      .field("access_count", &self.access_count())
      .field("last_accessed", &self.last_accessed())
      .field("created_at", &self.created_at())
      .field("cost", &self.memoized_cost())
      .finish_non_exhaustive()
  }
}

impl<T: ?Sized> CacheEntry<T> {
  /// Creates a new `CacheEntry` for a first-time insertion.
  pub(crate) fn new(item: Arc<T>, evict_action: EvictAction<T>) -> Self {
    let now = time::now_nanos();
    Self {
      item,
      item_id: time::next_item_id(),
      access_count: AtomicU64::new(1),
      last_accessed: AtomicU64::new(now),
      created_at: now,
      cost: AtomicU64::new(COST_UNINITIALIZED),
      evict_action: Mutex::new(Some(evict_action)),
    }
  }

  #[inline]
  pub(crate) fn item(&self) -> &Arc<T> {
    &self.item
  }

  #[inline]
  pub(crate) fn item_id(&self) -> u64 {
    self.item_id
  }

  #[inline]
  pub(crate) fn access_count(&self) -> u64 {
    self.access_count.load(Ordering::Relaxed)
  }

  #[inline]
  pub(crate) fn last_accessed(&self) -> u64 {
    self.last_accessed.load(Ordering::Relaxed)
  }

  #[inline]
  pub(crate) fn created_at(&self) -> u64 {
    self.created_at
  }

  /// Records a repeated access: bumps the counter and the access timestamp.
  #[inline]
  pub(crate) fn record_access(&self) {
    self.access_count.fetch_add(1, Ordering::Relaxed);
    self
      .last_accessed
      .fetch_max(time::now_nanos(), Ordering::Relaxed);
  }

  /// Whether the entry is still inside its grace period at `now`.
  #[inline]
  pub(crate) fn is_protected(&self, now: u64, window_nanos: u64) -> bool {
    time::nanos_between(self.created_at, now) < window_nanos
  }

  /// Returns the memoized cost if it was already computed.
  #[inline]
  pub(crate) fn memoized_cost(&self) -> Option<u64> {
    match self.cost.load(Ordering::Acquire) {
      COST_UNINITIALIZED => None,
      cost => Some(cost),
    }
  }

  /// Returns the entry's cost, computing it with `cost_fn` on first use.
  ///
  /// The second element is `true` when this call ran `cost_fn`. Two racing
  /// callers may both compute; the first stored value wins and both return it.
  pub(crate) fn cost_with<F>(&self, cost_fn: F) -> (u64, bool)
  where
    F: FnOnce(&T) -> u64,
  {
    if let Some(cost) = self.memoized_cost() {
      return (cost, false);
    }

    // The sentinel is reserved; a real cost that large saturates just below it.
    let computed = cost_fn(&*self.item).min(COST_UNINITIALIZED - 1);
    match self.cost.compare_exchange(
      COST_UNINITIALIZED,
      computed,
      Ordering::AcqRel,
      Ordering::Acquire,
    ) {
      Ok(_) => (computed, true),
      Err(stored) => (stored, true),
    }
  }

  /// Takes the eviction action out of the entry. Returns `None` if it was
  /// already taken.
  #[inline]
  pub(crate) fn take_evict_action(&self) -> Option<EvictAction<T>> {
    self.evict_action.lock().take()
  }
}
