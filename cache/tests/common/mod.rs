#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fibre_costcache::runtime::Job;
use fibre_costcache::{CostCache, CostCacheBuilder, PassSpawner};

/// A named payload whose cost is its declared size.
#[derive(Debug)]
pub struct Blob {
  pub name: String,
  pub size: u64,
}

pub fn blob(name: impl Into<String>, size: u64) -> Arc<Blob> {
  Arc::new(Blob {
    name: name.into(),
    size,
  })
}

pub fn blob_cost(blob: &Blob) -> u64 {
  blob.size
}

/// Drops every job it is given, so passes only happen through `evict_now`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardingSpawner;

impl PassSpawner for DiscardingSpawner {
  fn spawn(&self, _job: Job) {}

  fn spawn_after(&self, _delay: Duration, _job: Job) {}
}

/// A builder with no spontaneous passes and no grace period.
pub fn manual_builder() -> CostCacheBuilder<Blob> {
  CostCacheBuilder::new(blob_cost)
    .data_collection_window(Duration::ZERO)
    .spawner(DiscardingSpawner)
}

/// Counts eviction callbacks per blob name.
#[derive(Clone, Default)]
pub struct EvictionLog {
  counts: Arc<Mutex<HashMap<String, usize>>>,
  order: Arc<Mutex<Vec<String>>>,
}

impl EvictionLog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn callback(&self) -> impl FnOnce(Arc<Blob>) + Send + 'static {
    let log = self.clone();
    move |evicted| {
      *log.counts.lock().unwrap().entry(evicted.name.clone()).or_insert(0) += 1;
      log.order.lock().unwrap().push(evicted.name.clone());
    }
  }

  pub fn count_of(&self, name: &str) -> usize {
    self.counts.lock().unwrap().get(name).copied().unwrap_or(0)
  }

  pub fn total(&self) -> usize {
    self.order.lock().unwrap().len()
  }

  pub fn order(&self) -> Vec<String> {
    self.order.lock().unwrap().clone()
  }

  pub fn counts(&self) -> HashMap<String, usize> {
    self.counts.lock().unwrap().clone()
  }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if condition() {
      return true;
    }
    thread::sleep(Duration::from_millis(5));
  }
  condition()
}

pub fn retained_cost(cache: &CostCache<Blob>, items: &[Arc<Blob>]) -> u64 {
  items
    .iter()
    .filter(|item| cache.contains(item))
    .map(|item| item.size)
    .sum()
}
