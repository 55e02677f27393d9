//! Values that the cache may drop under pressure and that rebuild themselves
//! from saved state on demand.
//!
//! A `RecoverableValue` registers its instance with a `CostCache`. When the
//! cache evicts the instance, the value saves its recoverable state (once per
//! value, ever) and keeps only a weak reference. Later reads reuse the instance
//! if something else still holds it, otherwise they recover a fresh one from
//! the saved state and register it again.

use crate::handles::CostCache;

use std::fmt;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;

/// Knows how to persist and rebuild a `T`.
pub trait RecoverySource<T>: Send + Sync + 'static {
  /// The saved form of a value.
  type Saved: Send + Sync + 'static;

  /// Captures everything needed to rebuild `value`.
  fn save(&self, value: &T) -> Self::Saved;

  /// Rebuilds a value from its saved form.
  fn recover(&self, saved: &Self::Saved) -> T;
}

enum Slot<T, Saved> {
  Materialized(Arc<T>),
  NotMaterialized { saved: Arc<Saved>, weak: Weak<T> },
}

struct Inner<T, S: RecoverySource<T>> {
  source: S,
  cache: CostCache<T>,
  /// Written only by promote/demote transitions.
  slot: RwLock<Slot<T, S::Saved>>,
  saved: OnceCell<Arc<S::Saved>>,
}

/// A cache-managed value that survives eviction through its `RecoverySource`.
pub struct RecoverableValue<T, S: RecoverySource<T>> {
  inner: Arc<Inner<T, S>>,
}

impl<T, S: RecoverySource<T>> Clone for RecoverableValue<T, S> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T, S: RecoverySource<T>> fmt::Debug for RecoverableValue<T, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RecoverableValue")
      .field("materialized", &self.is_materialized())
      .field("saved", &self.is_saved())
      .finish()
  }
}

impl<T, S: RecoverySource<T>> RecoverableValue<T, S> {
  /// Whether the value currently holds a strong reference to its instance.
  pub fn is_materialized(&self) -> bool {
    matches!(&*self.inner.slot.read(), Slot::Materialized(_))
  }

  /// Whether the recoverable state has been saved.
  pub fn is_saved(&self) -> bool {
    self.inner.saved.get().is_some()
  }
}

impl<T, S> RecoverableValue<T, S>
where
  T: Send + Sync + 'static,
  S: RecoverySource<T>,
{
  /// Wraps a freshly built value and registers it with `cache`.
  pub fn new(value: T, source: S, cache: &CostCache<T>) -> Self {
    let value = Arc::new(value);
    let inner = Arc::new(Inner {
      source,
      cache: cache.clone(),
      slot: RwLock::new(Slot::Materialized(Arc::clone(&value))),
      saved: OnceCell::new(),
    });
    inner.register(value);
    Self { inner }
  }

  /// Returns the instance without recovering it: the materialized value, or
  /// the evicted instance if something else still keeps it alive.
  pub fn try_get_value(&self) -> Option<Arc<T>> {
    let value = match &*self.inner.slot.read() {
      Slot::Materialized(value) => Some(Arc::clone(value)),
      Slot::NotMaterialized { weak, .. } => weak.upgrade(),
    }?;
    Some(self.inner.promote(value))
  }

  /// Returns the instance, recovering it from saved state if needed.
  pub fn get_value(&self) -> Arc<T> {
    if let Some(value) = self.try_get_value() {
      return value;
    }

    let saved = match &*self.inner.slot.read() {
      Slot::Materialized(value) => return Arc::clone(value),
      Slot::NotMaterialized { saved, .. } => Arc::clone(saved),
    };
    // Recovery runs outside the lock; if another reader wins the race, its
    // instance is used and ours is dropped.
    let recovered = Arc::new(self.inner.source.recover(&saved));
    self.inner.promote(recovered)
  }
}

impl<T, S> Inner<T, S>
where
  T: Send + Sync + 'static,
  S: RecoverySource<T>,
{
  /// Tracks `value` in the cache; eviction demotes it. The callback holds
  /// only a weak reference so the cache never keeps the value alive.
  fn register(self: &Arc<Self>, value: Arc<T>) {
    let this = Arc::downgrade(self);
    self.cache.add_or_access(value, move |evicted| {
      if let Some(inner) = this.upgrade() {
        inner.demote(&evicted);
      }
    });
  }

  /// Makes `candidate` the materialized instance unless another one already
  /// is, and returns whichever instance ends up materialized.
  fn promote(self: &Arc<Self>, candidate: Arc<T>) -> Arc<T> {
    let value = {
      let mut slot = self.slot.write();
      match &*slot {
        Slot::Materialized(current) => Arc::clone(current),
        Slot::NotMaterialized { .. } => {
          *slot = Slot::Materialized(Arc::clone(&candidate));
          candidate
        }
      }
    };
    self.register(Arc::clone(&value));
    value
  }

  /// Saves the state (first eviction only) and drops the strong reference.
  fn demote(&self, evicted: &Arc<T>) {
    let saved = self
      .saved
      .get_or_init(|| Arc::new(self.source.save(evicted)));

    let mut slot = self.slot.write();
    if let Slot::Materialized(current) = &*slot {
      if Arc::ptr_eq(current, evicted) {
        *slot = Slot::NotMaterialized {
          saved: Arc::clone(saved),
          weak: Arc::downgrade(evicted),
        };
      }
    }
  }
}
