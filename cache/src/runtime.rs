//! Executors for eviction passes.
//!
//! A pass is launched by whichever caller wins the task slot. The spawner
//! decides where the pass body actually runs.

use std::thread;
use std::time::Duration;

/// A type-erased unit of background work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// A trait for running eviction passes off (or on) the caller's thread.
pub trait PassSpawner: Send + Sync + 'static {
  /// Runs `job` as soon as possible.
  fn spawn(&self, job: Job);

  /// Runs `job` after `delay`. Used for eager follow-up passes.
  ///
  /// The default implementation sleeps inside the spawned job.
  fn spawn_after(&self, delay: Duration, job: Job) {
    self.spawn(Box::new(move || {
      thread::sleep(delay);
      job();
    }));
  }
}

/// Runs each pass on a short-lived, named OS thread. The default spawner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl PassSpawner for ThreadSpawner {
  fn spawn(&self, job: Job) {
    let spawned = thread::Builder::new()
      .name("fibre-costcache-evict".to_string())
      .spawn(job);
    if let Err(err) = spawned {
      // The ticket inside the dropped job releases the slot; the next access retries.
      tracing::warn!(error = %err, "failed to spawn eviction thread");
    }
  }
}

/// Runs each pass synchronously on the thread that won the task slot.
///
/// Deterministic, at the price of occasionally making an access pay for a
/// pass. Delayed follow-up passes still go to a background thread so an
/// access never sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineSpawner;

impl PassSpawner for InlineSpawner {
  fn spawn(&self, job: Job) {
    job();
  }

  fn spawn_after(&self, delay: Duration, job: Job) {
    ThreadSpawner.spawn_after(delay, job);
  }
}

#[cfg(feature = "tokio")]
pub struct TokioSpawner(tokio::runtime::Handle);

#[cfg(feature = "tokio")]
impl TokioSpawner {
  /// Creates a spawner that uses the current Tokio runtime context.
  /// Panics if called outside of a Tokio runtime.
  pub fn new() -> Self {
    Self(tokio::runtime::Handle::current())
  }

  /// Creates a spawner bound to an explicit runtime handle.
  pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
    Self(handle)
  }
}

#[cfg(feature = "tokio")]
impl PassSpawner for TokioSpawner {
  fn spawn(&self, job: Job) {
    // Passes call user code (cost functions, eviction callbacks) that may block.
    drop(self.0.spawn_blocking(job));
  }

  fn spawn_after(&self, delay: Duration, job: Job) {
    let handle = self.0.clone();
    self.0.spawn(async move {
      tokio::time::sleep(delay).await;
      drop(handle.spawn_blocking(job));
    });
  }
}
