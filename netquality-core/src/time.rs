//! Monotonic time source of the estimator.
//!
//! Every timestamp handled by this crate is an [`Instant`]. There is no
//! wall-clock time anywhere, including in the cache bookkeeping, so the
//! estimator is insensitive to clock skew.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

/// Source of the current monotonic time.
///
/// The estimator never calls [`Instant::now`] directly so that tests and
/// simulations can drive time explicitly (see [`ManualClock`]).
pub trait Clock: Send {
    fn now(&self) -> Instant;
}

/// The [`Clock`] backed by [`Instant::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A [`Clock`] that only moves when told to.
///
/// Clones share the same time: advancing one clone advances all of them.
/// This allows a test to keep a handle on the clock given to an
/// estimator.
///
/// ```
/// # use netquality_core::time::{Clock, ManualClock};
/// # use std::time::Duration;
/// let clock = ManualClock::new();
/// let handle = clock.clone();
///
/// let t0 = clock.now();
/// handle.advance(Duration::from_secs(2));
///
/// assert_eq!(clock.now() - t0, Duration::from_secs(2));
/// ```
#[derive(Clone)]
pub struct ManualClock {
    origin: Instant,
    /// elapsed microseconds since `origin`
    elapsed: Arc<AtomicU64>,
}

/// use total ordering, the clock is only ever touched from the owner
/// of the estimator and the test driving it.
const ORDERING: Ordering = Ordering::SeqCst;

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// move the clock forward by `duration`
    ///
    /// The clock is precise up to the micro second, the remaining nano
    /// seconds are truncated.
    pub fn advance(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        let _ = self
            .elapsed
            .fetch_update(ORDERING, ORDERING, |e| Some(e.saturating_add(micros)));
    }

    /// how much time has been advanced since the clock was created
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed.load(ORDERING))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("elapsed", &self.elapsed())
            .finish()
    }
}
