//! Shared types for the HTTP layer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::core_state::CoreState;
use crate::models::{Admin, User};

const PER_MINUTE: u32 = 30;
const PER_HOUR: u32 = 500;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self {
            core,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new())),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Caller contexts: injected by auth middleware
// ═══════════════════════════════════════════════════════════

/// Signed-in member, loaded fresh from the database for each request.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user: User,
}

/// Signed-in administrator.
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub admin: Admin,
}

// ═══════════════════════════════════════════════════════════
// Rate limiter: per-client sliding window
// ═══════════════════════════════════════════════════════════

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Sliding-window limits on credential attempts, keyed by client address.
///
/// Each client keeps the instants of its admitted attempts from the last
/// hour, oldest first. A periodic sweep forgets clients whose window has
/// emptied, so the map only holds recently active addresses.
pub struct RateLimiter {
    attempts: HashMap<String, VecDeque<Instant>>,
    per_minute: usize,
    per_hour: usize,
    last_sweep: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(PER_MINUTE, PER_HOUR)
    }

    pub fn with_limits(per_minute: u32, per_hour: u32) -> Self {
        Self {
            attempts: HashMap::new(),
            per_minute: per_minute as usize,
            per_hour: per_hour as usize,
            last_sweep: Instant::now(),
        }
    }

    /// Admit one attempt from `client`, or return the Retry-After seconds.
    pub fn check(&mut self, client: &str) -> Result<(), u64> {
        self.check_at(client, Instant::now())
    }

    fn check_at(&mut self, client: &str, now: Instant) -> Result<(), u64> {
        if now.duration_since(self.last_sweep) >= SWEEP_INTERVAL {
            self.sweep(now);
        }

        let window = self.attempts.entry(client.to_string()).or_default();
        drop_expired(window, now);

        let last_minute = window
            .iter()
            .rev()
            .take_while(|at| now.duration_since(**at) < MINUTE)
            .count();
        let verdict = if last_minute >= self.per_minute {
            Err(MINUTE.as_secs())
        } else if window.len() >= self.per_hour {
            Err(HOUR.as_secs())
        } else {
            window.push_back(now);
            Ok(())
        };

        if window.is_empty() {
            self.attempts.remove(client);
        }
        verdict
    }

    fn sweep(&mut self, now: Instant) {
        let before = self.attempts.len();
        self.attempts.retain(|_, window| {
            drop_expired(window, now);
            !window.is_empty()
        });
        self.last_sweep = now;
        tracing::debug!(
            forgotten = before - self.attempts.len(),
            tracked = self.attempts.len(),
            "Rate limiter swept"
        );
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.attempts.len()
    }
}

fn drop_expired(window: &mut VecDeque<Instant>, now: Instant) {
    while window
        .front()
        .is_some_and(|at| now.duration_since(*at) >= HOUR)
    {
        window.pop_front();
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limiter_allows_within_limit() {
        let mut limiter = RateLimiter::new();
        for _ in 0..PER_MINUTE {
            assert!(limiter.check("10.0.0.1").is_ok());
        }
    }

    #[test]
    fn rate_limiter_blocks_after_minute_limit() {
        let mut limiter = RateLimiter::new();
        for _ in 0..PER_MINUTE {
            limiter.check("10.0.0.1").unwrap();
        }
        assert_eq!(limiter.check("10.0.0.1"), Err(60));
    }

    #[test]
    fn rate_limiter_hour_limit() {
        let mut limiter = RateLimiter::with_limits(100, 3);
        for _ in 0..3 {
            limiter.check("c").unwrap();
        }
        assert_eq!(limiter.check("c"), Err(3600));
    }

    #[test]
    fn minute_window_slides() {
        let mut limiter = RateLimiter::with_limits(2, 100);
        let start = Instant::now();
        limiter.check_at("c", start).unwrap();
        limiter.check_at("c", start + Duration::from_secs(10)).unwrap();
        assert_eq!(limiter.check_at("c", start + Duration::from_secs(30)), Err(60));
        assert!(limiter.check_at("c", start + Duration::from_secs(61)).is_ok());
    }

    #[test]
    fn idle_clients_are_forgotten() {
        let mut limiter = RateLimiter::with_limits(5, 50);
        let start = Instant::now();
        for client in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            limiter.check_at(client, start).unwrap();
        }
        assert_eq!(limiter.tracked_clients(), 3);

        let later = start + HOUR + SWEEP_INTERVAL;
        limiter.check_at("10.0.0.9", later).unwrap();
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn rejected_client_with_no_budget_is_not_kept() {
        let mut limiter = RateLimiter::with_limits(0, 10);
        assert_eq!(limiter.check("10.0.0.1"), Err(60));
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn rate_limiter_tracks_clients_separately() {
        let mut limiter = RateLimiter::with_limits(1, 10);
        limiter.check("a").unwrap();
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
    }
}
