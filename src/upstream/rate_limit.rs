//! Fixed-window token bucket guarding outbound calls

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{FmpError, Result};

struct Bucket {
    tokens: u32,
    window_start: Instant,
}

/// Token bucket refilled to capacity at the start of every window
pub struct RateLimiter {
    capacity: u32,
    window: Duration,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                window_start: Instant::now(),
            }),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Take one token, or report how long until the next refill
    pub fn try_acquire(&self) -> Result<()> {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> Result<()> {
        let mut bucket = self.bucket.lock();
        let elapsed = now.saturating_duration_since(bucket.window_start);
        if elapsed >= self.window {
            // Align to slice boundaries so idle periods don't shift the grid
            let slices = elapsed.as_nanos() / self.window.as_nanos().max(1);
            let advance = u32::try_from(slices)
                .ok()
                .and_then(|n| self.window.checked_mul(n))
                .unwrap_or(elapsed);
            bucket.window_start = bucket.window_start.checked_add(advance).unwrap_or(now);
            bucket.tokens = self.capacity;
        }

        if bucket.tokens == 0 {
            let wait = bucket
                .window_start
                .checked_add(self.window)
                .map_or(self.window, |end| end.saturating_duration_since(now));
            return Err(FmpError::RateLimited(wait.as_secs().max(1)));
        }
        bucket.tokens -= 1;
        Ok(())
    }

    /// Tokens left in the current window
    pub fn available(&self) -> u32 {
        self.bucket.lock().tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausts_then_rejects() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire().is_ok());
        assert!(limiter.try_acquire().is_ok());
        let err = limiter.try_acquire().unwrap_err();
        assert!(matches!(err, FmpError::RateLimited(secs) if secs >= 1 && secs <= 60));
        assert_eq!(limiter.available(), 0);
    }

    #[test]
    fn test_refills_to_capacity_not_beyond() {
        let limiter = RateLimiter::new(3, Duration::from_millis(100));
        let start = Instant::now();
        limiter.try_acquire_at(start).unwrap();
        // Several idle windows later the bucket holds exactly `capacity`
        let later = start + Duration::from_millis(450);
        limiter.try_acquire_at(later).unwrap();
        assert_eq!(limiter.available(), 2);
    }

    #[test]
    fn test_zero_capacity_always_rejects() {
        let limiter = RateLimiter::new(0, Duration::from_secs(1));
        assert!(limiter.try_acquire().is_err());
    }

    #[test]
    fn test_huge_window_rejects_without_overflow() {
        let limiter = RateLimiter::new(1, Duration::from_secs(u64::MAX));
        assert!(limiter.try_acquire().is_ok());
        let err = limiter.try_acquire().unwrap_err();
        assert!(matches!(err, FmpError::RateLimited(secs) if secs >= 1));
    }
}
