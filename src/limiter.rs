//! Sliding-window rate limiter shared across download workers
//!
//! One instance gates every outbound request in the download path. The
//! critical section covers only the window trim/check/append and is never
//! held across a network call.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Window length over which admissions are counted
const WINDOW: Duration = Duration::from_secs(60);

/// Sliding one-minute window admission control
pub struct RateLimiter {
    max_requests: usize,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter admitting at most `max_requests` per trailing minute
    pub fn new(max_requests: usize) -> Self {
        Self {
            max_requests,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns how long the caller must wait before issuing a request
    ///
    /// `Duration::ZERO` means the request may proceed now. Otherwise the
    /// caller sleeps the returned duration and calls `admit` again; the wait
    /// is the time until the oldest window entry expires.
    pub fn admit(&self) -> Duration {
        self.admit_at(Instant::now())
    }

    fn admit_at(&self, now: Instant) -> Duration {
        let mut window = self.window.lock().unwrap();
        Self::trim(&mut window, now);

        if window.len() >= self.max_requests {
            let oldest = *window.front().expect("non-empty window at capacity");
            let expires = oldest + WINDOW;
            return expires.saturating_duration_since(now) + Duration::from_millis(100);
        }

        Duration::ZERO
    }

    /// Records that a request was actually issued
    pub fn record(&self) {
        self.record_at(Instant::now());
    }

    fn record_at(&self, now: Instant) {
        let mut window = self.window.lock().unwrap();
        window.push_back(now);
    }

    /// Current number of admissions in the trailing window
    pub fn current_rate(&self) -> usize {
        let mut window = self.window.lock().unwrap();
        Self::trim(&mut window, Instant::now());
        window.len()
    }

    fn trim(window: &mut VecDeque<Instant>, now: Instant) {
        while let Some(front) = window.front() {
            if now.duration_since(*front) >= WINDOW {
                window.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_under_limit() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            assert_eq!(limiter.admit(), Duration::ZERO);
            limiter.record();
        }
        assert_eq!(limiter.current_rate(), 5);
    }

    #[test]
    fn test_blocks_at_limit() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.record_at(start);
        }

        let wait = limiter.admit_at(start + Duration::from_secs(1));
        // Oldest entry expires after the full window passes
        assert!(wait >= Duration::from_secs(58));
        assert!(wait <= Duration::from_secs(60));
    }

    #[test]
    fn test_window_expiry_frees_slot() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();
        limiter.record_at(start);
        limiter.record_at(start);

        // Just past the window the oldest entries are trimmed
        let later = start + Duration::from_secs(61);
        assert_eq!(limiter.admit_at(later), Duration::ZERO);
    }

    #[test]
    fn test_rate_bound_over_burst() {
        // Inject far more admission attempts than the cap allows in well
        // under a second; the required waits must cover the excess.
        let limiter = RateLimiter::new(10);
        let start = Instant::now();

        let mut admitted = 0;
        let mut total_wait = Duration::ZERO;
        for _ in 0..30 {
            let wait = limiter.admit_at(start);
            if wait == Duration::ZERO {
                limiter.record_at(start);
                admitted += 1;
            } else {
                total_wait += wait;
            }
        }

        assert_eq!(admitted, 10);
        // 20 rejected attempts each needed to wait out the window
        assert!(total_wait >= Duration::from_secs(20 * 60));
    }

    #[test]
    fn test_shared_across_threads() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(100));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                for _ in 0..20 {
                    if limiter.admit() == Duration::ZERO {
                        limiter.record();
                    }
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(limiter.current_rate() <= 100);
    }
}
