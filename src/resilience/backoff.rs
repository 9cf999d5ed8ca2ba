//! Exponential backoff with full jitter.

use std::time::Duration;
use rand::Rng;

/// Upper bound of the backoff window for a zero-based `attempt`:
/// `min(cap, base * 2^attempt)`.
pub fn backoff_ceiling(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let exponential = 2u32
        .checked_pow(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(cap);

    exponential.min(cap)
}

/// Sample a delay uniformly from `[0, backoff_ceiling(attempt)]`.
pub fn full_jitter<R: Rng + ?Sized>(
    attempt: u32,
    base: Duration,
    cap: Duration,
    rng: &mut R,
) -> Duration {
    let ceiling = backoff_ceiling(attempt, base, cap);
    let ceiling_nanos = u64::try_from(ceiling.as_nanos()).unwrap_or(u64::MAX);

    if ceiling_nanos == 0 {
        return Duration::ZERO;
    }

    Duration::from_nanos(rng.gen_range(0..=ceiling_nanos))
}
