//! Minimum-interval admission gate.
//!
//! A request is admitted only if at least `min_interval` has passed since the
//! previous *admitted* request. Rejections never move the window.

use crate::config::types::{Result, SandboxError};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_accepted: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_accepted: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Admit a request arriving now.
    pub fn try_acquire(&self) -> Result<()> {
        self.try_acquire_at(Instant::now())
    }

    /// Admit a request arriving at `now`.
    ///
    /// Check and update happen under one lock, so of two concurrent callers
    /// inside the same window exactly one is admitted.
    pub fn try_acquire_at(&self, now: Instant) -> Result<()> {
        let mut last = self
            .last_accepted
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(previous) = *last {
            let elapsed = now.saturating_duration_since(previous);
            if elapsed < self.min_interval {
                let remaining = self.min_interval - elapsed;
                return Err(SandboxError::RateLimited {
                    retry_after_ms: remaining.as_millis().max(1) as u64,
                });
            }
        }

        *last = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_request_is_admitted() {
        let limiter = RateLimiter::new(Duration::from_millis(1000));
        assert!(limiter.try_acquire().is_ok());
    }

    #[test]
    fn request_inside_window_is_rejected() {
        let limiter = RateLimiter::new(Duration::from_millis(1000));
        let t0 = Instant::now();
        limiter.try_acquire_at(t0).unwrap();

        let err = limiter
            .try_acquire_at(t0 + Duration::from_millis(400))
            .unwrap_err();
        match err {
            SandboxError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 600),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejection_does_not_reset_window() {
        let limiter = RateLimiter::new(Duration::from_millis(1000));
        let t0 = Instant::now();
        limiter.try_acquire_at(t0).unwrap();
        assert!(limiter.try_acquire_at(t0 + Duration::from_millis(900)).is_err());
        // measured from t0, not from the rejected attempt
        assert!(limiter.try_acquire_at(t0 + Duration::from_millis(1000)).is_ok());
    }

    #[test]
    fn zero_interval_admits_everything() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(limiter.try_acquire_at(t0).is_ok());
        assert!(limiter.try_acquire_at(t0).is_ok());
    }

    #[test]
    fn concurrent_callers_admit_exactly_one() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || limiter.try_acquire().is_ok())
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(admitted, 1);
    }
}
