//! Deterministic failure injection around a real operation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::FaultConfig;
use crate::resilience::retries::ApiError;

/// Failure profile for a [`FaultInjector`].
#[derive(Debug, Clone, PartialEq)]
pub struct FaultProfile {
    /// Probability in `[0, 1]` that a call outside the burst fails.
    pub failure_rate: f64,
    /// Status code carried by injected failures.
    pub status_code: u16,
    /// 1-based call number where the forced outage starts.
    pub burst_at: Option<u64>,
    /// Number of consecutive calls the outage lasts.
    pub burst_duration: u64,
    pub seed: u64,
}

impl Default for FaultProfile {
    fn default() -> Self {
        Self {
            failure_rate: 0.3,
            status_code: 429,
            burst_at: None,
            burst_duration: 3,
            seed: 0,
        }
    }
}

impl From<&FaultConfig> for FaultProfile {
    fn from(config: &FaultConfig) -> Self {
        Self {
            failure_rate: config.failure_rate,
            status_code: config.status_code,
            burst_at: config.burst_at,
            burst_duration: config.burst_duration,
            seed: config.seed,
        }
    }
}

impl FaultProfile {
    /// Every call fails with `status_code`.
    pub fn always(status_code: u16) -> Self {
        Self {
            failure_rate: 1.0,
            status_code,
            ..Self::default()
        }
    }

    /// Only the burst window fails.
    pub fn burst(status_code: u16, burst_at: u64, burst_duration: u64) -> Self {
        Self {
            failure_rate: 0.0,
            status_code,
            burst_at: Some(burst_at),
            burst_duration,
            ..Self::default()
        }
    }

    fn in_burst(&self, call: u64) -> bool {
        self.burst_at
            .is_some_and(|start| start <= call && call < start.saturating_add(self.burst_duration))
    }
}

/// Wraps `F` and fails it according to a [`FaultProfile`].
pub struct FaultInjector<F> {
    inner: F,
    profile: FaultProfile,
    rng: Mutex<StdRng>,
    calls: AtomicU64,
}

impl<F, T> FaultInjector<F>
where
    F: Fn() -> T,
{
    pub fn new(inner: F, profile: FaultProfile) -> Self {
        let rng = StdRng::seed_from_u64(profile.seed);
        Self {
            inner,
            profile,
            rng: Mutex::new(rng),
            calls: AtomicU64::new(0),
        }
    }

    /// Invoke the wrapped operation unless this call is chosen to fail.
    pub fn call(&self) -> Result<T, ApiError> {
        // Number the call and draw its roll under one lock so call N always gets roll N.
        let (call, roll) = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            (call, rng.gen::<f64>())
        };

        if self.profile.in_burst(call) || roll < self.profile.failure_rate {
            tracing::trace!(call, status_code = self.profile.status_code, "Injecting fault");
            return Err(ApiError::new(
                self.profile.status_code,
                format!("Injected fault (call #{})", call),
            ));
        }

        Ok((self.inner)())
    }

    /// Calls seen so far, failed or not.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn profile(&self) -> &FaultProfile {
        &self.profile
    }
}
