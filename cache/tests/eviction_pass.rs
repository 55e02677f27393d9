mod common;

use common::{blob, blob_cost, manual_builder, retained_cost, Blob, DiscardingSpawner, EvictionLog};
use fibre_costcache::{CostCache, CostCacheBuilder, InlineSpawner};
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

#[test]
fn test_small_cache_keeps_everything() {
  let log = EvictionLog::new();
  let cache = CostCacheBuilder::new(blob_cost)
    .min_count(2)
    .cost_bounds(100, 300)
    .cooling_rate(0.01)
    .fixed_increment(50)
    .data_collection_window(Duration::ZERO)
    .spawner(InlineSpawner)
    .build()
    .unwrap();

  let items: Vec<_> = (0..5).map(|i| blob(format!("a{i}"), 10)).collect();
  for item in &items {
    cache.add_or_access(Arc::clone(item), log.callback());
  }

  let report = cache.evict_now().expect("slot should be free");
  assert_eq!(report.evicted, 0);
  assert_eq!(cache.len(), 5);
  assert_eq!(log.total(), 0);
}

#[test]
fn test_growth_evicts_oldest_and_respects_ceiling() {
  let log = EvictionLog::new();
  let cache = CostCacheBuilder::new(blob_cost)
    .min_count(2)
    .cost_bounds(100, 300)
    .cooling_rate(0.01)
    .fixed_increment(50)
    .data_collection_window(Duration::ZERO)
    .spawner(InlineSpawner)
    .build()
    .unwrap();

  let mut items: Vec<_> = (0..5).map(|i| blob(format!("a{i}"), 10)).collect();
  items.extend((0..30).map(|i| blob(format!("b{i}"), 10)));
  for item in &items {
    cache.add_or_access(Arc::clone(item), log.callback());
  }
  cache.evict_now().expect("slot should be free");

  assert!(retained_cost(&cache, &items) <= 300);
  assert!(cache.len() >= 2);
  // Equal counts, so the least recently added go first.
  for i in 0..5 {
    assert_eq!(log.count_of(&format!("a{i}")), 1, "a{i} should be evicted");
  }
  assert!(cache.contains(&items[34]));
  assert_eq!(log.total() + cache.len(), 35);
  assert!(log.counts().values().all(|&count| count == 1));
}

#[test]
fn test_forced_pass_cuts_at_ceiling() {
  let log = EvictionLog::new();
  let cache = manual_builder()
    .min_count(2)
    .cost_bounds(100, 300)
    .cooling_rate(0.01)
    .fixed_increment(50)
    .build()
    .unwrap();

  let items: Vec<_> = (0..35).map(|i| blob(format!("item-{i}"), 10)).collect();
  for item in &items {
    cache.add_or_access(Arc::clone(item), log.callback());
  }
  let report = cache.evict_now().unwrap();

  assert_eq!(report.examined, 35);
  assert_eq!(report.ranked, 35);
  assert!(report.evicted >= 6);
  assert!(report.ceiling <= 300.0 && report.ceiling >= 100.0);
  assert!(report.retained_cost <= 300);
  assert_eq!(report.retained_cost, retained_cost(&cache, &items));
  for i in 0..6 {
    assert_eq!(log.count_of(&format!("item-{i}")), 1);
  }
}

#[test]
fn test_min_count_floor() {
  let log = EvictionLog::new();
  let cache = manual_builder()
    .min_count(3)
    .cost_bounds(0, 0)
    .fixed_increment(0)
    .build()
    .unwrap();

  let items: Vec<_> = (0..10).map(|i| blob(format!("item-{i}"), 10)).collect();
  for item in &items {
    cache.add_or_access(Arc::clone(item), log.callback());
  }

  let report = cache.evict_now().unwrap();
  assert_eq!(report.evicted, 7);
  assert_eq!(report.head_cost, 30);
  assert_eq!(cache.len(), 3);
  // The newest entries rank highest.
  for item in &items[7..] {
    assert!(cache.contains(item));
  }

  // At the floor a pass is a no-op.
  let report = cache.evict_now().unwrap();
  assert_eq!(report.evicted, 0);
  assert_eq!(cache.len(), 3);
}

#[test]
fn test_hit_rate_tracks_last_pass() {
  let cache = manual_builder()
    .min_count(3)
    .cost_bounds(0, 0)
    .fixed_increment(0)
    .build()
    .unwrap();
  assert_eq!(cache.hit_rate(), 1.0);

  for i in 0..10 {
    cache.access(blob(format!("item-{i}"), 10));
  }
  let report = cache.evict_now().unwrap();

  assert!((report.hit_rate - 0.3).abs() < 1e-9);
  assert!((cache.hit_rate() - 0.3).abs() < 1e-9);

  // A pass with nothing to rank leaves the rate alone.
  cache.evict_now().unwrap();
  assert!((cache.hit_rate() - 0.3).abs() < 1e-9);
}

#[test]
fn test_grace_period_protects_new_entries() {
  let log = EvictionLog::new();
  let cache = CostCacheBuilder::new(blob_cost)
    .min_count(0)
    .cost_bounds(0, 0)
    .fixed_increment(0)
    .data_collection_window(Duration::from_millis(200))
    .spawner(InlineSpawner)
    .build()
    .unwrap();

  let old: Vec<_> = (0..5).map(|i| blob(format!("old-{i}"), 10)).collect();
  for item in &old {
    cache.add_or_access(Arc::clone(item), log.callback());
  }

  let report = cache.evict_now().unwrap();
  assert_eq!(report.protected, 5);
  assert_eq!(report.evicted, 0);
  assert_eq!(cache.len(), 5);

  thread::sleep(Duration::from_millis(250));
  let fresh = blob("fresh", 10);
  cache.add_or_access(Arc::clone(&fresh), log.callback());
  cache.evict_now().unwrap();

  for item in &old {
    assert!(!cache.contains(item));
  }
  assert!(cache.contains(&fresh));
  assert_eq!(log.total(), 5);
  assert!(cache.metrics().protected_skips >= 6);
}

#[test]
fn test_hot_item_outlives_cold_ones() {
  let log = EvictionLog::new();
  let cache = CostCacheBuilder::new(blob_cost)
    .min_count(1)
    .cost_bounds(30, 30)
    .fixed_increment(0)
    .data_collection_window(Duration::ZERO)
    .spawner(InlineSpawner)
    .build()
    .unwrap();

  let hot = blob("hot", 10);
  for _ in 0..20 {
    cache.add_or_access(Arc::clone(&hot), log.callback());
  }
  thread::sleep(Duration::from_millis(5));

  let cold: Vec<_> = (0..5).map(|i| blob(format!("cold-{i}"), 10)).collect();
  for item in &cold {
    cache.add_or_access(Arc::clone(item), log.callback());
    thread::sleep(Duration::from_millis(2));
  }

  assert!(cache.contains(&hot));
  assert!(cache.contains(&cold[4]));
  assert_eq!(log.count_of("hot"), 0);
  assert_eq!(log.count_of("cold-0"), 1);
  assert!(retained_cost(&cache, &cold) + hot.size <= 30);
}

#[test]
fn test_cost_computed_once_per_entry() {
  let cache = manual_builder().min_count(0).build().unwrap();
  let items: Vec<_> = (0..4).map(|i| blob(format!("item-{i}"), 1)).collect();
  for item in &items {
    cache.access(Arc::clone(item));
  }

  cache.evict_now().unwrap();
  cache.evict_now().unwrap();
  cache.evict_now().unwrap();

  assert_eq!(cache.len(), 4);
  assert_eq!(cache.metrics().cost_computations, 4);
}

#[test]
fn test_ceiling_stays_in_bounds() {
  let cache = manual_builder()
    .min_count(0)
    .cost_bounds(1_000, 5_000)
    .fixed_increment(700)
    .build()
    .unwrap();
  let items: Vec<_> = (0..50).map(|i| blob(format!("item-{i}"), 100)).collect();

  for (round, chunk) in items.chunks(7).enumerate() {
    for item in chunk {
      cache.access(Arc::clone(item));
    }
    let report = cache.evict_now().unwrap();
    assert!(
      (1_000.0..=5_000.0).contains(&report.ceiling),
      "round {round}: ceiling {} out of bounds",
      report.ceiling
    );
    assert!(report.retained_cost as f64 <= report.ceiling.max(100.0));
  }
}

#[test]
fn test_runtime_reconfiguration() {
  let log = EvictionLog::new();
  let cache = manual_builder()
    .min_count(5)
    .cost_bounds(1_000, 10_000)
    .build()
    .unwrap();
  for i in 0..8 {
    cache.add_or_access(blob(format!("item-{i}"), 10), log.callback());
  }
  assert_eq!(cache.evict_now().unwrap().evicted, 0);

  assert!(cache.set_cost_bounds(10, 5).is_err());
  assert_eq!(cache.cost_bounds(), (1_000, 10_000));

  cache.set_cost_bounds(0, 0).unwrap();
  assert_eq!(cache.cost_bounds(), (0, 0));
  cache.evict_now().unwrap();
  assert_eq!(cache.len(), 5);

  cache.set_min_count(1);
  assert_eq!(cache.min_count(), 1);
  cache.evict_now().unwrap();
  assert_eq!(cache.len(), 1);
  assert_eq!(log.total(), 7);
}

#[test]
fn test_pass_holds_its_ceiling_while_accesses_race() {
  // Every cost computation touches the hot item, so the live ceiling climbs
  // far past `max_cost` while the pass is walking its candidates.
  let handle: Arc<OnceLock<CostCache<Blob>>> = Arc::new(OnceLock::new());
  let hot = blob("hot", 10);
  let (cost_handle, cost_hot) = (Arc::clone(&handle), Arc::clone(&hot));
  let cache = CostCacheBuilder::new(move |b: &Blob| {
    if let Some(cache) = cost_handle.get() {
      cache.access(Arc::clone(&cost_hot));
    }
    b.size
  })
  .min_count(0)
  .cost_bounds(0, 100)
  .fixed_increment(1_000)
  .data_collection_window(Duration::ZERO)
  .spawner(DiscardingSpawner)
  .build()
  .unwrap();
  assert!(handle.set(cache.clone()).is_ok());

  let log = EvictionLog::new();
  let items: Vec<_> = (0..50).map(|i| blob(format!("item-{i}"), 10)).collect();
  for item in &items {
    cache.add_or_access(Arc::clone(item), log.callback());
  }
  cache.access(Arc::clone(&hot));

  let report = cache.evict_now().unwrap();
  assert!(report.ceiling <= 100.0);
  assert!(cache.current_ceiling() > 100.0);
  assert!(report.evicted > 0);
  assert_eq!(report.spared, 0);
  assert!(
    report.retained_cost as f64 <= report.ceiling + 10.0,
    "kept {} against a ceiling of {}",
    report.retained_cost,
    report.ceiling
  );
  assert!(cache.contains(&hot));
  assert_eq!(log.total(), report.evicted);
}
