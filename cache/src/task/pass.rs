use crate::entry::CacheEntry;
use crate::listener::EvictionReason;
use crate::metrics::Metrics;
use crate::rank::{self, RankedEntry};
use crate::shared::CacheShared;
use crate::time;

/// What one eviction pass saw and did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
  /// Entries in the snapshot.
  pub examined: usize,
  /// Entries skipped because they were still in their grace period.
  pub protected: usize,
  /// Entries ranked as eviction candidates.
  pub ranked: usize,
  /// Candidates past the cut line that were kept because the running cost was
  /// still under this pass's ceiling.
  pub spared: usize,
  /// Entries this pass actually removed.
  pub evicted: usize,
  /// Cost of the ranked entries the pass kept.
  pub retained_cost: u64,
  /// Cumulative cost of the first `min_count` ranked entries.
  pub head_cost: u64,
  /// The ceiling after this pass decayed it.
  pub ceiling: f64,
  /// The keep ratio recorded for the next decay step.
  pub hit_rate: f64,
}

/// Runs one eviction pass over `shared`.
///
/// The caller must own the task slot. Ranks come from a point-in-time
/// snapshot, so an entry touched mid-pass may still be evicted on its stale
/// rank.
pub(crate) fn run<T>(shared: &CacheShared<T>) -> PassReport
where
  T: ?Sized + Send + Sync + 'static,
{
  let now = time::now_nanos();
  let ceiling = shared.bound.decay(now);
  let min_count = shared.min_count();
  Metrics::incr(&shared.metrics.passes, 1);

  let mut report = PassReport {
    ceiling,
    hit_rate: shared.bound.hit_rate(),
    ..PassReport::default()
  };

  if shared.store.len() <= min_count {
    return report;
  }

  let snapshot = shared.store.snapshot();
  report.examined = snapshot.len();

  let mut ranked = Vec::with_capacity(snapshot.len());
  for entry in snapshot {
    if entry.is_protected(now, shared.window_nanos) {
      report.protected += 1;
      continue;
    }
    ranked.push(RankedEntry {
      rank: rank::rank_entry(&entry, now, shared.fade_out_secs),
      entry,
    });
  }
  rank::sort_hottest_first(&mut ranked);
  report.ranked = ranked.len();
  Metrics::incr(&shared.metrics.protected_skips, report.protected as u64);

  let cost_of = |entry: &CacheEntry<T>| -> u64 {
    let (cost, computed) = entry.cost_with(|item| (shared.cost_fn)(item));
    if computed {
      Metrics::incr(&shared.metrics.cost_computations, 1);
    }
    cost
  };

  let mut condemned = 0usize;
  if ranked.len() > min_count {
    // Keep the hottest prefix until it fills the ceiling, never fewer than
    // `min_count` entries. The entry that crosses the ceiling starts the
    // candidate range.
    let mut accumulated = 0u64;
    let mut cut = ranked.len();
    for (index, candidate) in ranked.iter().enumerate() {
      let before = accumulated;
      accumulated = accumulated.saturating_add(cost_of(&candidate.entry));
      if index < min_count {
        report.head_cost = accumulated;
      }
      if index >= min_count && accumulated as f64 >= ceiling {
        cut = index;
        report.retained_cost = before;
        break;
      }
    }
    if cut == ranked.len() {
      report.retained_cost = accumulated;
    }

    // Walk the candidates against this pass's ceiling, not the live one:
    // accesses racing with the pass bump the live value past `max_cost`.
    let mut running = accumulated;
    for candidate in ranked.iter().skip(cut) {
      if (running as f64) < ceiling {
        let cost = cost_of(&candidate.entry);
        running = running.saturating_add(cost);
        report.retained_cost = report.retained_cost.saturating_add(cost);
        report.spared += 1;
        continue;
      }

      condemned += 1;
      if shared.evict(&candidate.entry, EvictionReason::Capacity) {
        report.evicted += 1;
        tracing::trace!(
          cache_id = shared.id,
          item_id = candidate.entry.item_id(),
          rank = candidate.rank,
          cost = candidate.entry.memoized_cost(),
          "evicted cold item"
        );
      }
    }
  } else {
    for candidate in &ranked {
      report.head_cost = report.head_cost.saturating_add(cost_of(&candidate.entry));
    }
    report.retained_cost = report.head_cost;
  }

  shared
    .bound
    .record_hit_rate(ranked.len() - condemned, ranked.len());
  report.hit_rate = shared.bound.hit_rate();

  tracing::debug!(
    cache_id = shared.id,
    examined = report.examined,
    protected = report.protected,
    evicted = report.evicted,
    retained_cost = report.retained_cost,
    ceiling = report.ceiling,
    hit_rate = report.hit_rate,
    "eviction pass finished"
  );
  report
}
