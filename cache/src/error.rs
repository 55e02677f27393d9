use thiserror::Error;

/// Errors raised by invalid cache configuration.
///
/// These are programmer errors; they are reported when the cache is built or
/// reconfigured rather than surfacing later as odd eviction behavior.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
  /// The lower cost bound is above the upper one.
  #[error("min cost {min} exceeds max cost {max}")]
  MinCostExceedsMaxCost { min: u64, max: u64 },
  /// The cooling rate is negative, NaN or infinite.
  #[error("cooling rate must be finite and non-negative, got {0}")]
  InvalidCoolingRate(f64),
  /// The rank fade-out horizon is zero.
  #[error("fade-out duration cannot be zero")]
  InvalidFadeOut,
  /// The hit-rate threshold is outside `[0, 1]`.
  #[error("hit rate threshold must be within [0, 1], got {0}")]
  InvalidHitRateThreshold(f64),
  /// The cache was configured with zero shards.
  #[error("shard count cannot be zero")]
  ZeroShards,
}
