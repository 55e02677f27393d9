use crate::bound::{UpperBound, DEFAULT_HIT_RATE_THRESHOLD};
use crate::error::ConfigError;
use crate::handles::CostCache;
use crate::listener::EvictionListener;
use crate::metrics::Metrics;
use crate::rank::DEFAULT_FADE_OUT;
use crate::runtime::{PassSpawner, ThreadSpawner};
use crate::shared::{CacheShared, CostFn};
use crate::store::IdentityStore;
use crate::task::gate::PassGate;
use crate::time;

use core::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

/// Every numeric tunable of a cost cache, in a form that can be loaded from
/// configuration files (with the `serde` feature).
///
/// Durations are whole milliseconds.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CostCacheOptions {
  /// Entries a pass always keeps, however cold.
  pub min_count: usize,
  /// Floor of the elastic ceiling.
  pub min_cost: u64,
  /// Cap of the elastic ceiling, enforced at each decay step.
  pub max_cost: u64,
  /// Exponential decay rate of the ceiling, per millisecond.
  pub cooling_rate: f64,
  /// Amount every access adds to the ceiling.
  pub fixed_increment: u64,
  /// Minimum delay between passes, and the grace period of new entries.
  pub data_collection_window_ms: u64,
  /// Schedule follow-up passes under sustained pressure.
  pub eager_eviction: bool,
  /// Idle time that costs an entry one point of rank (a tenfold access count).
  pub fade_out_ms: u64,
  /// Keep ratio above which the ceiling cools at full speed.
  pub hit_rate_threshold: f64,
  /// Store shard count; derived from the CPU count when `None`.
  pub shards: Option<usize>,
}

impl Default for CostCacheOptions {
  fn default() -> Self {
    Self {
      min_count: 10,
      min_cost: 1 << 20,
      max_cost: 1 << 26,
      cooling_rate: 0.0001,
      fixed_increment: 1 << 10,
      data_collection_window_ms: 500,
      eager_eviction: false,
      fade_out_ms: DEFAULT_FADE_OUT.as_millis() as u64,
      hit_rate_threshold: DEFAULT_HIT_RATE_THRESHOLD,
      shards: None,
    }
  }
}

/// A builder for creating `CostCache` instances.
pub struct CostCacheBuilder<T: ?Sized> {
  options: CostCacheOptions,
  cost_fn: CostFn<T>,
  spawner: Option<Arc<dyn PassSpawner>>,
  listener: Option<Arc<dyn EvictionListener<T>>>,
}

// Manual Debug implementation for CostCacheBuilder.
impl<T: ?Sized> fmt::Debug for CostCacheBuilder<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CostCacheBuilder")
      .field("options", &self.options)
      .field("has_spawner", &self.spawner.is_some())
      .field("has_listener", &self.listener.is_some())
      .finish_non_exhaustive()
  }
}

impl<T: ?Sized> CostCacheBuilder<T> {
  /// Creates a new builder with default settings. `cost_fn` measures an
  /// item; it is called at most once per tracked entry and must not panic.
  pub fn new<F>(cost_fn: F) -> Self
  where
    F: Fn(&T) -> u64 + Send + Sync + 'static,
  {
    Self::from_options(CostCacheOptions::default(), cost_fn)
  }

  /// Creates a builder pre-populated from `options`.
  pub fn from_options<F>(options: CostCacheOptions, cost_fn: F) -> Self
  where
    F: Fn(&T) -> u64 + Send + Sync + 'static,
  {
    Self {
      options,
      cost_fn: Arc::new(cost_fn),
      spawner: None,
      listener: None,
    }
  }

  /// Sets how many entries every pass keeps regardless of cost.
  pub fn min_count(mut self, min_count: usize) -> Self {
    self.options.min_count = min_count;
    self
  }

  /// Sets the `[min_cost, max_cost]` range of the elastic ceiling.
  pub fn cost_bounds(mut self, min_cost: u64, max_cost: u64) -> Self {
    self.options.min_cost = min_cost;
    self.options.max_cost = max_cost;
    self
  }

  /// Sets the ceiling's exponential decay rate, per millisecond.
  pub fn cooling_rate(mut self, rate: f64) -> Self {
    self.options.cooling_rate = rate;
    self
  }

  /// Sets how much every access raises the ceiling.
  pub fn fixed_increment(mut self, increment: u64) -> Self {
    self.options.fixed_increment = increment;
    self
  }

  /// Sets both the minimum delay between passes and the grace period of new
  /// entries. Kept at millisecond granularity, rounded up.
  pub fn data_collection_window(mut self, window: Duration) -> Self {
    self.options.data_collection_window_ms = millis_rounded_up(window);
    self
  }

  /// Enables follow-up passes that do not wait for new accesses.
  pub fn eager_eviction(mut self, enabled: bool) -> Self {
    self.options.eager_eviction = enabled;
    self
  }

  /// Sets the idle time that costs an entry one point of rank. Kept at
  /// millisecond granularity, rounded up.
  pub fn fade_out(mut self, fade_out: Duration) -> Self {
    self.options.fade_out_ms = millis_rounded_up(fade_out);
    self
  }

  /// Sets the keep ratio above which the ceiling cools at full speed.
  pub fn hit_rate_threshold(mut self, threshold: f64) -> Self {
    self.options.hit_rate_threshold = threshold;
    self
  }

  /// Sets the number of store shards. Rounded up to a power of two.
  pub fn shards(mut self, shards: usize) -> Self {
    self.options.shards = Some(shards);
    self
  }

  /// Sets where eviction passes run. Defaults to `ThreadSpawner`.
  pub fn spawner<S>(mut self, spawner: S) -> Self
  where
    S: PassSpawner,
  {
    self.spawner = Some(Arc::new(spawner));
    self
  }

  /// Sets a cache-wide eviction listener.
  pub fn eviction_listener<Listener>(mut self, listener: Listener) -> Self
  where
    Listener: EvictionListener<T> + 'static,
  {
    self.listener = Some(Arc::new(listener));
    self
  }

  /// The options as currently configured.
  pub fn options(&self) -> &CostCacheOptions {
    &self.options
  }

  /// Validates the builder configuration.
  pub(crate) fn validate(&self) -> Result<usize, ConfigError> {
    let options = &self.options;
    validate_bounds(options.min_cost, options.max_cost)?;
    if !options.cooling_rate.is_finite() || options.cooling_rate < 0.0 {
      return Err(ConfigError::InvalidCoolingRate(options.cooling_rate));
    }
    if options.fade_out_ms == 0 {
      return Err(ConfigError::InvalidFadeOut);
    }
    if !(0.0..=1.0).contains(&options.hit_rate_threshold) {
      return Err(ConfigError::InvalidHitRateThreshold(options.hit_rate_threshold));
    }
    match options.shards {
      Some(0) => Err(ConfigError::ZeroShards),
      Some(shards) => Ok(shards.next_power_of_two()),
      None => Ok((num_cpus::get() * 4).max(1).next_power_of_two()),
    }
  }
}

impl<T> CostCacheBuilder<T>
where
  T: ?Sized + Send + Sync + 'static,
{
  /// Builds the cache.
  pub fn build(self) -> Result<CostCache<T>, ConfigError> {
    let shards = self.validate()?;
    let options = self.options;
    let window = Duration::from_millis(options.data_collection_window_ms);

    let shared = CacheShared {
      id: time::next_cache_id(),
      store: IdentityStore::new(shards),
      bound: UpperBound::new(
        options.min_cost,
        options.max_cost,
        options.cooling_rate,
        options.fixed_increment,
        options.hit_rate_threshold,
      ),
      gate: Arc::new(PassGate::new()),
      metrics: Metrics::new(),
      cost_fn: self.cost_fn,
      spawner: self.spawner.unwrap_or_else(|| Arc::new(ThreadSpawner)),
      listener: self.listener,
      min_count: AtomicUsize::new(options.min_count),
      window,
      window_nanos: time::duration_to_nanos(window),
      fade_out_secs: options.fade_out_ms as f64 / 1_000.0,
      eager_eviction: options.eager_eviction,
    };

    tracing::debug!(
      cache_id = shared.id,
      min_count = options.min_count,
      min_cost = options.min_cost,
      max_cost = options.max_cost,
      cooling_rate = options.cooling_rate,
      fixed_increment = options.fixed_increment,
      window_ms = options.data_collection_window_ms,
      eager_eviction = options.eager_eviction,
      shards,
      "cost cache created"
    );

    Ok(CostCache {
      shared: Arc::new(shared),
    })
  }
}

/// Whole milliseconds in `duration`, rounding any sub-millisecond remainder
/// up so that a non-zero duration never becomes zero.
fn millis_rounded_up(duration: Duration) -> u64 {
  let millis = duration.as_millis() + u128::from(duration.subsec_nanos() % 1_000_000 != 0);
  u64::try_from(millis).unwrap_or(u64::MAX)
}

pub(crate) fn validate_bounds(min_cost: u64, max_cost: u64) -> Result<(), ConfigError> {
  if min_cost > max_cost {
    return Err(ConfigError::MinCostExceedsMaxCost {
      min: min_cost,
      max: max_cost,
    });
  }
  Ok(())
}
