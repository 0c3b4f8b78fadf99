//! Weighted random provider selection

use crate::core::types::ProviderRecord;
use rand::Rng;

/// Source of randomness for weighted draws.
///
/// Injectable so selection is deterministic under test; production wiring
/// uses [`ThreadRngSource`].
pub trait RandomSource: Send + Sync {
    /// Uniform draw from `[0, upper)`. Callers guarantee `upper > 0`.
    fn next_in(&self, upper: u64) -> u64;
}

/// Default source backed by the thread-local RNG.
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn next_in(&self, upper: u64) -> u64 {
        rand::thread_rng().gen_range(0..upper)
    }
}

/// Proportional random choice among candidates by configured weight.
///
/// Draws a value in `[0, total)` and walks the candidates subtracting each
/// weight until the remainder goes negative. A zero-weight candidate can
/// therefore never win while the total is positive; with a zero total the
/// first candidate is returned deterministically. A single candidate short
/// circuits the draw entirely.
pub fn weighted_pick<'a>(
    candidates: &'a [ProviderRecord],
    rng: &dyn RandomSource,
) -> &'a ProviderRecord {
    debug_assert!(!candidates.is_empty());
    if candidates.len() == 1 {
        return &candidates[0];
    }

    let total: u64 = candidates.iter().map(|p| p.weight as u64).sum();
    if total == 0 {
        return &candidates[0];
    }

    let mut remaining = rng.next_in(total) as i64;
    for candidate in candidates {
        remaining -= candidate.weight as i64;
        if remaining < 0 {
            return candidate;
        }
    }
    // The draw is strictly below the total, so the walk ends inside the loop.
    &candidates[candidates.len() - 1]
}
