//! # Rate Limit Module
//!
//! Token-bucket admission control for a single method.
//!
//! A bucket configured with `rate` and `frequency` holds at most `rate`
//! tokens and refills by `rate` tokens once per elapsed `frequency`: a single
//! burst per interval, not a smooth trickle. Refill is computed lazily from
//! the number of whole intervals elapsed since the bucket was created, so no
//! background timer is needed.
//!
//! Two admission primitives are offered:
//!
//! - [`RateLimiter::try_take`] never blocks; it either takes the tokens or
//!   reports that none were taken.
//! - [`RateLimiter::wait`] reserves tokens and sleeps until they are due,
//!   but never for longer than one refill interval. If the reservation
//!   cannot be honored within that bound it fails without taking anything.
//!
//! ```rust
//! use methodchain::rate_limit::RateLimiter;
//! use std::time::Duration;
//!
//! let bucket = RateLimiter::try_new(2, Duration::from_secs(1)).unwrap();
//! assert!(bucket.try_take(1));
//! assert!(bucket.try_take(1));
//! assert!(!bucket.try_take(1));
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

use crate::metrics::millis;

/// Returned by [`RateLimiter::wait`] when tokens cannot be granted within one interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleError {
    /// Tokens that were asked for
    pub requested: u64,
    /// Bucket capacity
    pub capacity: u64,
}

impl fmt::Display for ThrottleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rate limit exceeded: {} token(s) not available within one refill interval (capacity {})",
            self.requested, self.capacity
        )
    }
}

impl std::error::Error for ThrottleError {}

#[derive(Debug)]
struct BucketState {
    /// May go negative while waiters hold reservations
    available: i64,
    /// Last tick at which the bucket was refilled
    latest_tick: u64,
}

/// Token bucket with burst refill
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u64,
    quantum: u64,
    interval: Duration,
    start: Instant,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a full bucket allowing `rate` requests per `frequency`.
    ///
    /// Returns `None` if `rate` is zero, does not fit the internal counter,
    /// or `frequency` is zero.
    #[must_use]
    pub fn try_new(rate: u64, frequency: Duration) -> Option<Self> {
        Self::starting_at(rate, frequency, Instant::now())
    }

    pub(crate) fn starting_at(rate: u64, frequency: Duration, start: Instant) -> Option<Self> {
        if rate == 0 || frequency.is_zero() {
            return None;
        }
        let available = i64::try_from(rate).ok()?;
        Some(Self {
            capacity: rate,
            quantum: rate,
            interval: frequency,
            start,
            state: Mutex::new(BucketState {
                available,
                latest_tick: 0,
            }),
        })
    }

    /// Maximum number of tokens the bucket holds
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Refill interval
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Tokens available right now; negative while reservations are outstanding
    #[must_use]
    pub fn available(&self) -> i64 {
        self.available_at(Instant::now())
    }

    /// Take `n` tokens if they are all available; never blocks
    #[must_use]
    pub fn try_take(&self, n: u64) -> bool {
        self.try_take_at(n, Instant::now())
    }

    /// Take up to `n` tokens and return how many were taken; never blocks
    #[must_use]
    pub fn take_available(&self, n: u64) -> u64 {
        self.take_available_at(n, Instant::now())
    }

    /// Wait until `n` tokens are granted.
    ///
    /// Sleeps the calling thread for at most one refill interval and returns
    /// how long it slept. Fails immediately, taking nothing, when `n` exceeds
    /// the capacity or when earlier reservations push the grant past the
    /// next refill.
    pub fn wait(&self, n: u64) -> Result<Duration, ThrottleError> {
        let wait = self.reserve_at(n, Instant::now(), self.interval)?;
        if !wait.is_zero() {
            debug!(
                tokens = n,
                wait_ms = millis(wait),
                "Waiting for rate limiter tokens"
            );
            std::thread::sleep(wait);
        }
        Ok(wait)
    }

    fn tick(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.start).as_nanos();
        u64::try_from(elapsed / self.interval.as_nanos()).unwrap_or(u64::MAX)
    }

    fn tick_time(&self, tick: u64) -> Option<Instant> {
        let nanos = self.interval.as_nanos().checked_mul(u128::from(tick))?;
        let nanos = u64::try_from(nanos).ok()?;
        self.start.checked_add(Duration::from_nanos(nanos))
    }

    fn adjust(&self, state: &mut BucketState, now: Instant) {
        let tick = self.tick(now);
        if tick <= state.latest_tick {
            return;
        }
        let capacity = self.capacity as i64;
        if state.available < capacity {
            let refill = (tick - state.latest_tick).saturating_mul(self.quantum);
            let refill = i64::try_from(refill).unwrap_or(i64::MAX);
            state.available = state.available.saturating_add(refill).min(capacity);
        }
        state.latest_tick = tick;
    }

    pub(crate) fn available_at(&self, now: Instant) -> i64 {
        let mut state = self.state.lock();
        self.adjust(&mut state, now);
        state.available
    }

    pub(crate) fn try_take_at(&self, n: u64, now: Instant) -> bool {
        if n == 0 {
            return true;
        }
        let Ok(wanted) = i64::try_from(n) else {
            return false;
        };
        let mut state = self.state.lock();
        self.adjust(&mut state, now);
        if state.available >= wanted {
            state.available -= wanted;
            true
        } else {
            false
        }
    }

    pub(crate) fn take_available_at(&self, n: u64, now: Instant) -> u64 {
        let mut state = self.state.lock();
        self.adjust(&mut state, now);
        if state.available <= 0 {
            return 0;
        }
        let taken = n.min(state.available as u64);
        state.available -= taken as i64;
        taken
    }

    /// Reserve `n` tokens and return how long until they are due.
    ///
    /// Nothing is reserved when the wait would exceed `max_wait`.
    pub(crate) fn reserve_at(
        &self,
        n: u64,
        now: Instant,
        max_wait: Duration,
    ) -> Result<Duration, ThrottleError> {
        let denied = ThrottleError {
            requested: n,
            capacity: self.capacity,
        };
        if n == 0 {
            return Ok(Duration::ZERO);
        }
        if n > self.capacity {
            return Err(denied);
        }
        let wanted = n as i64;

        let mut state = self.state.lock();
        self.adjust(&mut state, now);

        let remaining = state.available - wanted;
        if remaining >= 0 {
            state.available = remaining;
            return Ok(Duration::ZERO);
        }

        // Whole refills needed to cover the deficit
        let deficit = remaining.unsigned_abs();
        let ticks = deficit.div_ceil(self.quantum);
        let due = state
            .latest_tick
            .checked_add(ticks)
            .and_then(|tick| self.tick_time(tick))
            .ok_or(denied)?;
        let wait = due.saturating_duration_since(now);
        if wait > max_wait {
            return Err(denied);
        }
        state.available = remaining;
        Ok(wait)
    }
}
