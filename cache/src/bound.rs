//! The elastic cost ceiling.
//!
//! Every access pushes the ceiling up by a fixed increment without clamping,
//! so a burst can overshoot `max_cost`. Every eviction pass pulls it back down
//! with exponential decay over the wall-clock time since the previous pass and
//! clamps it into `[min_cost, max_cost]`.

use crate::time;

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// When the hit rate is poor the ceiling cools this many times slower, so a
/// genuinely larger working set is not thrashed.
pub(crate) const SLOW_COOLING_DIVISOR: f64 = 5.0;

/// The reference hit-rate threshold above which the ceiling cools at full speed.
pub(crate) const DEFAULT_HIT_RATE_THRESHOLD: f64 = 0.8;

/// One decay step: `ceiling * e^(-rate * elapsed_ms)`, clamped to the bounds.
///
/// Never panics, even if a concurrent reconfiguration briefly leaves
/// `min_cost > max_cost`; the floor wins in that case.
#[inline]
pub(crate) fn decayed(ceiling: f64, cooling_rate: f64, elapsed_ms: f64, min_cost: f64, max_cost: f64) -> f64 {
  let cooled = ceiling * (-cooling_rate * elapsed_ms.max(0.0)).exp();
  cooled.min(max_cost).max(min_cost)
}

#[derive(Debug)]
pub(crate) struct UpperBound {
  /// Current ceiling, stored as `f64` bits.
  ceiling: CachePadded<AtomicU64>,
  min_cost: AtomicU64,
  max_cost: AtomicU64,
  cooling_rate: f64,
  fixed_increment: f64,
  hit_rate_threshold: f64,
  /// Keep ratio of the most recent pass, stored as `f64` bits.
  hit_rate: AtomicU64,
  /// When the ceiling last decayed, in nanoseconds since the cache epoch.
  last_decay: AtomicU64,
}

impl UpperBound {
  pub(crate) fn new(
    min_cost: u64,
    max_cost: u64,
    cooling_rate: f64,
    fixed_increment: u64,
    hit_rate_threshold: f64,
  ) -> Self {
    Self {
      ceiling: CachePadded::new(AtomicU64::new((min_cost as f64).to_bits())),
      min_cost: AtomicU64::new(min_cost),
      max_cost: AtomicU64::new(max_cost),
      cooling_rate,
      fixed_increment: fixed_increment as f64,
      hit_rate_threshold,
      // Nothing has been judged yet, so assume the cache is doing well.
      hit_rate: AtomicU64::new(1.0f64.to_bits()),
      last_decay: AtomicU64::new(time::now_nanos()),
    }
  }

  #[inline]
  pub(crate) fn current(&self) -> f64 {
    f64::from_bits(self.ceiling.load(Ordering::Acquire))
  }

  #[inline]
  pub(crate) fn bounds(&self) -> (u64, u64) {
    (
      self.min_cost.load(Ordering::Relaxed),
      self.max_cost.load(Ordering::Relaxed),
    )
  }

  /// Takes effect at the next decay step.
  pub(crate) fn set_bounds(&self, min_cost: u64, max_cost: u64) {
    self.max_cost.store(max_cost, Ordering::Relaxed);
    self.min_cost.store(min_cost, Ordering::Relaxed);
  }

  /// Raises the ceiling by the fixed increment. Called on every access.
  #[inline]
  pub(crate) fn bump(&self) {
    if self.fixed_increment == 0.0 {
      return;
    }
    let increment = self.fixed_increment;
    let _ = self
      .ceiling
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
        Some((f64::from_bits(bits) + increment).to_bits())
      });
  }

  #[inline]
  pub(crate) fn hit_rate(&self) -> f64 {
    f64::from_bits(self.hit_rate.load(Ordering::Relaxed))
  }

  /// Records how much of what the last pass looked at it decided to keep.
  pub(crate) fn record_hit_rate(&self, kept: usize, examined: usize) {
    if examined == 0 {
      return;
    }
    let rate = kept as f64 / examined as f64;
    self.hit_rate.store(rate.to_bits(), Ordering::Relaxed);
  }

  /// The cooling rate to use given the last recorded hit rate.
  #[inline]
  pub(crate) fn effective_cooling_rate(&self) -> f64 {
    if self.hit_rate() > self.hit_rate_threshold {
      self.cooling_rate
    } else {
      self.cooling_rate / SLOW_COOLING_DIVISOR
    }
  }

  /// Decays the ceiling by the time elapsed since the previous decay and
  /// returns the new value. Bumps that race with the decay are not lost.
  pub(crate) fn decay(&self, now: u64) -> f64 {
    let previous = self.last_decay.swap(now, Ordering::AcqRel);
    let elapsed_ms = time::nanos_to_millis(time::nanos_between(previous, now));
    self.decay_by(elapsed_ms)
  }

  pub(crate) fn decay_by(&self, elapsed_ms: f64) -> f64 {
    let rate = self.effective_cooling_rate();
    let (min_cost, max_cost) = self.bounds();
    let (min_cost, max_cost) = (min_cost as f64, max_cost as f64);

    let mut next = 0.0;
    let _ = self
      .ceiling
      .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
        next = decayed(f64::from_bits(bits), rate, elapsed_ms, min_cost, max_cost);
        Some(next.to_bits())
      });
    next
  }
}
