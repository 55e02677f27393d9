use crate::entry::CacheEntry;

use core::fmt;
use std::collections::hash_map::{Entry, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;

type Shard<T> = RwLock<HashMap<usize, Arc<CacheEntry<T>>, ahash::RandomState>>;

/// The identity key of a tracked item: the address of its `Arc` allocation.
///
/// Stable for as long as the store holds the entry, because the entry keeps a
/// strong reference to the item.
#[inline]
pub(crate) fn identity_of<T: ?Sized>(item: &Arc<T>) -> usize {
  Arc::as_ptr(item).cast::<()>() as usize
}

/// A map from item identity to `CacheEntry`, partitioned into multiple,
/// independently locked shards.
///
/// Locks are held only for the duration of a single map operation; no caller
/// code ever runs under a shard lock.
pub(crate) struct IdentityStore<T: ?Sized> {
  shards: Box<[CachePadded<Shard<T>>]>,
  hasher: ahash::RandomState,
  len: CachePadded<AtomicUsize>,
}

impl<T: ?Sized> fmt::Debug for IdentityStore<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("IdentityStore")
      .field("num_shards", &self.shards.len())
      .field("len", &self.len())
      .finish()
  }
}

impl<T: ?Sized> IdentityStore<T> {
  /// Creates a new store. `num_shards` must be a non-zero power of two.
  pub(crate) fn new(num_shards: usize) -> Self {
    let hasher = ahash::RandomState::new();
    let shards = (0..num_shards)
      .map(|_| CachePadded::new(RwLock::new(HashMap::with_hasher(hasher.clone()))))
      .collect::<Vec<_>>();

    Self {
      shards: shards.into_boxed_slice(),
      hasher,
      len: CachePadded::new(AtomicUsize::new(0)),
    }
  }

  #[inline]
  fn shard_for(&self, key: usize) -> &Shard<T> {
    let hash = self.hasher.hash_one(key);
    &self.shards[hash as usize & (self.shards.len() - 1)]
  }

  /// Number of tracked items. Exact when no writer is mid-operation.
  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.len.load(Ordering::Acquire)
  }

  pub(crate) fn get(&self, item: &Arc<T>) -> Option<Arc<CacheEntry<T>>> {
    let key = identity_of(item);
    self.shard_for(key).read().get(&key).cloned()
  }

  /// Inserts `create()` if `item` is not tracked, otherwise applies `update`
  /// to the existing entry. Returns the entry now in the map and whether it
  /// was inserted by this call.
  ///
  /// `update` runs after the shard lock is released.
  pub(crate) fn insert_or_update<F, U>(
    &self,
    item: &Arc<T>,
    create: F,
    update: U,
  ) -> (Arc<CacheEntry<T>>, bool)
  where
    F: FnOnce() -> CacheEntry<T>,
    U: FnOnce(&CacheEntry<T>),
  {
    let key = identity_of(item);
    let shard = self.shard_for(key);

    // Fast path: the item is usually already tracked.
    let existing = shard.read().get(&key).cloned();
    if let Some(entry) = existing {
      update(&entry);
      return (entry, false);
    }

    let mut guard = shard.write();
    let outcome = match guard.entry(key) {
      Entry::Occupied(occupied) => (occupied.get().clone(), false),
      Entry::Vacant(vacant) => {
        let entry = Arc::new(create());
        vacant.insert(entry.clone());
        self.len.fetch_add(1, Ordering::AcqRel);
        (entry, true)
      }
    };
    drop(guard);

    if !outcome.1 {
      update(&outcome.0);
    }
    outcome
  }

  /// Removes `entry` only if it is still the one tracked for its item.
  ///
  /// Exactly one of any number of racing callers gets `true`.
  pub(crate) fn remove_entry(&self, entry: &Arc<CacheEntry<T>>) -> bool {
    let key = identity_of(entry.item());
    let mut guard = self.shard_for(key).write();
    match guard.entry(key) {
      Entry::Occupied(occupied) if Arc::ptr_eq(occupied.get(), entry) => {
        occupied.remove();
        self.len.fetch_sub(1, Ordering::AcqRel);
        true
      }
      _ => false,
    }
  }

  /// A point-in-time copy of every tracked entry, taken one shard at a time.
  ///
  /// Concurrent writers are never blocked for longer than one shard copy.
  pub(crate) fn snapshot(&self) -> Vec<Arc<CacheEntry<T>>> {
    let mut entries = Vec::with_capacity(self.len());
    for shard in self.shards.iter() {
      entries.extend(shard.read().values().cloned());
    }
    entries
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Barrier;
  use std::thread;

  fn new_entry(item: &Arc<String>) -> CacheEntry<String> {
    CacheEntry::new(item.clone(), Box::new(|_| {}))
  }

  #[test]
  fn test_identity_not_value_equality() {
    let store = IdentityStore::<String>::new(4);
    let a = Arc::new("same".to_string());
    let b = Arc::new("same".to_string());

    store.insert_or_update(&a, || new_entry(&a), |_| {});
    store.insert_or_update(&b, || new_entry(&b), |_| {});

    assert_eq!(store.len(), 2);
    assert!(store.get(&a).is_some());
    assert!(store.get(&Arc::clone(&a)).is_some());
  }

  #[test]
  fn test_second_insert_updates_existing_entry() {
    let store = IdentityStore::<String>::new(1);
    let a = Arc::new("a".to_string());

    let (first, inserted) = store.insert_or_update(&a, || new_entry(&a), |_| {});
    assert!(inserted);
    let (second, inserted) = store.insert_or_update(
      &a,
      || panic!("must not create twice"),
      |entry| entry.record_access(),
    );
    assert!(!inserted);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.access_count(), 2);
  }

  #[test]
  fn test_concurrent_inserts_create_one_entry() {
    let store = Arc::new(IdentityStore::<String>::new(8));
    let item = Arc::new("contended".to_string());
    let created = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
      .map(|_| {
        let store = store.clone();
        let item = item.clone();
        let created = created.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
          barrier.wait();
          for _ in 0..100 {
            store.insert_or_update(
              &item,
              || {
                created.fetch_add(1, Ordering::Relaxed);
                new_entry(&item)
              },
              |entry| entry.record_access(),
            );
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(store.len(), 1);
    assert_eq!(created.load(Ordering::Relaxed), 1);
    assert_eq!(store.get(&item).unwrap().access_count(), 1600);
  }

  #[test]
  fn test_remove_entry_has_single_winner() {
    let store = Arc::new(IdentityStore::<String>::new(2));
    let item = Arc::new("victim".to_string());
    let (entry, _) = store.insert_or_update(&item, || new_entry(&item), |_| {});
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let store = store.clone();
        let entry = entry.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
          barrier.wait();
          store.remove_entry(&entry)
        })
      })
      .collect();
    let winners = handles
      .into_iter()
      .map(|h| h.join().unwrap())
      .filter(|won| *won)
      .count();

    assert_eq!(winners, 1);
    assert_eq!(store.len(), 0);
  }

  #[test]
  fn test_remove_entry_ignores_replaced_entry() {
    let store = IdentityStore::<String>::new(1);
    let item = Arc::new("item".to_string());
    let (stale, _) = store.insert_or_update(&item, || new_entry(&item), |_| {});
    assert!(store.remove_entry(&stale));
    let (fresh, _) = store.insert_or_update(&item, || new_entry(&item), |_| {});

    assert!(!store.remove_entry(&stale));
    assert!(store.get(&item).is_some());
    assert!(store.remove_entry(&fresh));
    assert!(store.get(&item).is_none());
  }

  #[test]
  fn test_snapshot_sees_every_entry() {
    let store = IdentityStore::<String>::new(4);
    let items: Vec<_> = (0..50).map(|i| Arc::new(i.to_string())).collect();
    for item in &items {
      store.insert_or_update(item, || new_entry(item), |_| {});
    }
    assert_eq!(store.snapshot().len(), 50);
  }
}
