use crate::TimeSource;
use std::time::{SystemTime, UNIX_EPOCH};

/// Reads [`SystemTime::now`] on every call.
///
/// A system clock set before 1970 reads as `0`, which clock sources reject as
/// being behind the layout epoch.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_EPOCH;

    #[test]
    fn system_clock_is_past_default_epoch() {
        assert!(SystemClock.current_millis() > DEFAULT_EPOCH);
    }
}
