use core::fmt;

use portable_atomic::{AtomicU64, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, Layout, Result, TimeSource,
    clock::{ClockSource, Stamp},
};

/// A logical clock that never issues the same timestamp twice.
///
/// Each call either adopts the wall clock (when it has moved past the last
/// issued value) or advances the last issued value by the batch size. Every
/// batch therefore owns its timestamp outright and may use sequences
/// `0..amount`. Under sustained load the issued timestamps drift ahead of the
/// wall clock until demand drops.
///
/// The state is a single [`AtomicU64`] updated with a compare-and-swap loop.
pub struct LogicalClock<T: TimeSource> {
    #[cfg(feature = "cache-padded")]
    last_issued: crossbeam_utils::CachePadded<AtomicU64>,
    #[cfg(not(feature = "cache-padded"))]
    last_issued: AtomicU64,
    epoch: u64,
    time: T,
}

impl<T: TimeSource> LogicalClock<T> {
    /// Creates a logical clock seeded with the current time.
    pub fn new(layout: &Layout, time: T) -> Self {
        let seed = time.current_millis();
        Self {
            #[cfg(feature = "cache-padded")]
            last_issued: crossbeam_utils::CachePadded::new(AtomicU64::new(seed)),
            #[cfg(not(feature = "cache-padded"))]
            last_issued: AtomicU64::new(seed),
            epoch: layout.epoch(),
            time,
        }
    }

    /// Returns the next timestamp and stores it.
    ///
    /// If the wall clock is ahead of the last issued value, the wall clock is
    /// adopted. Otherwise the last issued value is advanced by `increment`.
    /// Values returned by successive calls strictly increase as long as
    /// `increment > 0`.
    ///
    /// # Example
    /// ```
    /// use snowdrift::{Layout, LogicalClock, TimeSource};
    ///
    /// struct Stuck;
    /// impl TimeSource for Stuck {
    ///     fn current_millis(&self) -> u64 {
    ///         1_700_000_000_000
    ///     }
    /// }
    ///
    /// let clock = LogicalClock::new(&Layout::DEFAULT, Stuck);
    /// assert_eq!(clock.get_and_increment(10), 1_700_000_000_010);
    /// assert_eq!(clock.get_and_increment(10), 1_700_000_000_020);
    /// ```
    pub fn get_and_increment(&self, increment: u64) -> u64 {
        let mut last = self.last_issued.load(Ordering::Acquire);
        loop {
            let now = self.time.current_millis();
            let next = if now > last { now } else { last + increment };
            match self.last_issued.compare_exchange_weak(
                last,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }

    /// The last timestamp handed out.
    pub fn last_issued(&self) -> u64 {
        self.last_issued.load(Ordering::Acquire)
    }
}

impl<T: TimeSource> ClockSource for LogicalClock<T> {
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn stamp(&self, amount: u64) -> Result<Stamp> {
        let now = self.time.current_millis();
        if now < self.epoch {
            return Err(Error::ClockBehindEpoch {
                now,
                epoch: self.epoch,
            });
        }
        Ok(Stamp {
            millis: self.get_and_increment(amount.max(1)),
            sequence: 0,
        })
    }
}

impl<T: TimeSource> fmt::Debug for LogicalClock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogicalClock")
            .field("last_issued", &self.last_issued())
            .field("epoch", &self.epoch)
            .finish_non_exhaustive()
    }
}
