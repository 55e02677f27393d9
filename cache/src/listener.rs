use std::fmt;
use std::sync::Arc;

/// Describes the reason an item was removed from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
  /// An eviction pass judged the item too cold to keep under the current ceiling.
  Capacity,
  /// The item was removed by `clear`.
  Cleared,
  /// The item was removed explicitly with `invalidate`.
  Invalidated,
}

impl fmt::Display for EvictionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EvictionReason::Capacity => write!(f, "evicted due to cost ceiling"),
      EvictionReason::Cleared => write!(f, "removed by clear"),
      EvictionReason::Invalidated => write!(f, "manually invalidated"),
    }
  }
}

/// A listener that can be registered with the cache to observe every
/// eviction, in addition to the per-item callback given to `add_or_access`.
///
/// `on_evict` runs on the thread that removed the item, after the item's own
/// callback, and never while a store lock is held.
pub trait EvictionListener<T: ?Sized>: Send + Sync {
  fn on_evict(&self, item: &Arc<T>, reason: EvictionReason);
}
