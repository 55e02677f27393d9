use crate::time;

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Where the single eviction slot currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum PassState {
  Idle = 0,
  Scheduled = 1,
  Running = 2,
}

impl PassState {
  fn from_u8(raw: u8) -> Self {
    match raw {
      1 => PassState::Scheduled,
      2 => PassState::Running,
      _ => PassState::Idle,
    }
  }
}

/// The task slot: at most one eviction pass is scheduled or running at a time.
pub(crate) struct PassGate {
  state: AtomicU8,
  /// When the last pass finished, in nanoseconds since the cache epoch.
  last_completed: AtomicU64,
}

impl fmt::Debug for PassGate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PassGate")
      .field("state", &self.state())
      .field("last_completed", &self.last_completed())
      .finish()
  }
}

impl PassGate {
  /// A fresh gate counts as having just completed a pass, so the first pass
  /// waits out one data collection window like every later one.
  pub(crate) fn new() -> Self {
    Self {
      state: AtomicU8::new(PassState::Idle as u8),
      last_completed: AtomicU64::new(time::now_nanos()),
    }
  }

  #[inline]
  pub(crate) fn state(&self) -> PassState {
    PassState::from_u8(self.state.load(Ordering::Acquire))
  }

  #[inline]
  pub(crate) fn last_completed(&self) -> u64 {
    self.last_completed.load(Ordering::Acquire)
  }

  /// Whether at least `window_nanos` have passed since the last pass finished.
  #[inline]
  pub(crate) fn window_elapsed(&self, now: u64, window_nanos: u64) -> bool {
    time::nanos_between(self.last_completed(), now) >= window_nanos
  }

  /// Claims the slot. Only one caller wins until the returned ticket drops.
  pub(crate) fn try_acquire(self: &Arc<Self>) -> Option<PassTicket> {
    self
      .state
      .compare_exchange(
        PassState::Idle as u8,
        PassState::Scheduled as u8,
        Ordering::AcqRel,
        Ordering::Acquire,
      )
      .ok()
      .map(|_| PassTicket { gate: Arc::clone(self) })
  }
}

/// Ownership of the task slot.
///
/// Dropping the ticket, including during a panic unwind, stamps the completion
/// time and returns the slot to `Idle`.
#[must_use = "the slot is released as soon as the ticket is dropped"]
pub(crate) struct PassTicket {
  gate: Arc<PassGate>,
}

impl fmt::Debug for PassTicket {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PassTicket").field("gate", &self.gate).finish()
  }
}

impl PassTicket {
  /// Marks the pass as running on the current thread.
  pub(crate) fn begin(&self) {
    self
      .gate
      .state
      .store(PassState::Running as u8, Ordering::Release);
  }
}

impl Drop for PassTicket {
  fn drop(&mut self) {
    self
      .gate
      .last_completed
      .fetch_max(time::now_nanos(), Ordering::AcqRel);
    self
      .gate
      .state
      .store(PassState::Idle as u8, Ordering::Release);
  }
}
