use crate::{DEFAULT_EPOCH, TimeSource};
use std::sync::atomic::{AtomicU64, Ordering};

/// A time source that only moves when told to.
#[derive(Debug)]
pub struct MockTime {
    millis: AtomicU64,
}

impl MockTime {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// A fixed instant shortly after the default epoch.
    pub fn after_epoch(offset: u64) -> Self {
        Self::new(DEFAULT_EPOCH + offset)
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl TimeSource for MockTime {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
