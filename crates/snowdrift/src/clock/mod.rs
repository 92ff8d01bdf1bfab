//! Timestamp issuance for batches.
//!
//! A [`ClockSource`] hands the batch builder a [`Stamp`]: the base timestamp
//! shared by every ID of a batch and the first sequence number the batch may
//! use. Two modes exist:
//!
//! - [`WallClock`] follows the system clock and carves disjoint sequence
//!   ranges out of each millisecond, so batches built in the same millisecond
//!   never overlap.
//! - [`LogicalClock`] gives every batch its own timestamp, advancing ahead of
//!   the wall clock when batches are requested faster than it ticks.
//!
//! Both are the only shared mutable state touched while issuing IDs, and both
//! keep their critical section to a handful of instructions.

mod logical;
#[cfg(test)]
mod tests;
mod wall;

pub use logical::*;
pub use wall::*;

use crate::{Layout, Result, SystemClock, TimeSource};

/// Base timestamp and first sequence number for one batch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Stamp {
    /// Milliseconds since the Unix epoch.
    pub millis: u64,
    /// First sequence value reserved for the batch.
    pub sequence: u64,
}

/// Issues a [`Stamp`] for a batch of `amount` IDs.
pub trait ClockSource {
    /// Reserves room for `amount` IDs.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ClockBehindEpoch`] if the underlying time source
    /// reads earlier than the layout epoch.
    fn stamp(&self, amount: u64) -> Result<Stamp>;
}

/// Which clock a generator runs on.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClockMode {
    /// Follow the system clock; see [`WallClock`].
    #[default]
    Wall,
    /// Serialize timestamps through a shared counter; see [`LogicalClock`].
    Logical,
}

/// A clock source selected at runtime by [`ClockMode`].
#[derive(Debug)]
pub enum Clock<T: TimeSource = SystemClock> {
    Wall(WallClock<T>),
    Logical(LogicalClock<T>),
}

impl<T: TimeSource> Clock<T> {
    pub fn new(mode: ClockMode, layout: &Layout, time: T) -> Self {
        match mode {
            ClockMode::Wall => Self::Wall(WallClock::new(layout, time)),
            ClockMode::Logical => Self::Logical(LogicalClock::new(layout, time)),
        }
    }

    pub const fn mode(&self) -> ClockMode {
        match self {
            Self::Wall(_) => ClockMode::Wall,
            Self::Logical(_) => ClockMode::Logical,
        }
    }
}

impl<T: TimeSource> ClockSource for Clock<T> {
    fn stamp(&self, amount: u64) -> Result<Stamp> {
        match self {
            Self::Wall(clock) => clock.stamp(amount),
            Self::Logical(clock) => clock.stamp(amount),
        }
    }
}
