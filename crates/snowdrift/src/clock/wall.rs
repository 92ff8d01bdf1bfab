use core::fmt;

use parking_lot::Mutex;
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, Layout, Result, TimeSource,
    clock::{ClockSource, Stamp},
};

#[derive(Debug)]
struct Window {
    millis: u64,
    next_sequence: u64,
}

/// A clock that follows the system time and shares each millisecond's
/// sequence space between batches.
///
/// Every batch built within the same millisecond receives a disjoint range of
/// sequence numbers. When a millisecond cannot fit the requested batch, the
/// reservation moves to the following millisecond, so timestamps run ahead of
/// the system clock only while more than one sequence space per millisecond is
/// being requested. A system clock that steps backwards keeps reserving from
/// the last window instead of reusing old timestamps.
pub struct WallClock<T: TimeSource> {
    window: Mutex<Window>,
    epoch: u64,
    sequence_space: u64,
    time: T,
}

impl<T: TimeSource> WallClock<T> {
    pub fn new(layout: &Layout, time: T) -> Self {
        Self {
            window: Mutex::new(Window {
                millis: 0,
                next_sequence: 0,
            }),
            epoch: layout.epoch(),
            sequence_space: layout.sequence_space() as u64,
            time,
        }
    }
}

impl<T: TimeSource> ClockSource for WallClock<T> {
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    fn stamp(&self, amount: u64) -> Result<Stamp> {
        let now = self.time.current_millis();
        if now < self.epoch {
            return Err(Error::ClockBehindEpoch {
                now,
                epoch: self.epoch,
            });
        }

        let mut window = self.window.lock();
        if now > window.millis {
            *window = Window {
                millis: now,
                next_sequence: 0,
            };
        }
        if window.next_sequence + amount > self.sequence_space {
            // This millisecond is spent; borrow the next one.
            *window = Window {
                millis: window.millis + 1,
                next_sequence: 0,
            };
        }

        let stamp = Stamp {
            millis: window.millis,
            sequence: window.next_sequence,
        };
        window.next_sequence += amount;
        Ok(stamp)
    }
}

impl<T: TimeSource> fmt::Debug for WallClock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WallClock")
            .field("epoch", &self.epoch)
            .field("sequence_space", &self.sequence_space)
            .finish_non_exhaustive()
    }
}
