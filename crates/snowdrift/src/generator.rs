//! The public face of the crate: an [`IdGenerator`] assembled from a
//! [`GeneratorConfig`].
//!
//! ```
//! use snowdrift::{BufferStrategy, ClockMode, GeneratorConfig};
//!
//! let generator = GeneratorConfig::default()
//!     .with_identity(1, 1)
//!     .with_clock(ClockMode::Logical)
//!     .with_strategy(BufferStrategy::BatchCache)
//!     .with_batch_size(500)
//!     .build()
//!     .unwrap();
//!
//! let a = generator.next_id();
//! let b = generator.next_id();
//! assert!(a < b);
//!
//! let parts = generator.decode(b);
//! assert_eq!((parts.datacenter_id, parts.worker_id), (1, 1));
//! ```

use crate::{
    BatchBuilder, BatchCache, Clock, ClockMode, DoubleBufferPool, Error, IdBuffer, IdParts,
    Identity, Layout, Result, SystemClock, TimeSource,
};
use core::fmt;
use std::{thread, time::Duration};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// How pre-built IDs are held between batch builds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum BufferStrategy {
    /// A shared [`DoubleBufferPool`].
    #[default]
    DoubleBuffer,
    /// A per-thread [`BatchCache`].
    BatchCache,
}

/// A type-erased buffer, used by generators built from a [`GeneratorConfig`].
pub type DynBuffer = Box<dyn IdBuffer + Send + Sync>;

/// Startup configuration for an [`IdGenerator`].
///
/// Nothing is validated until [`GeneratorConfig::build`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GeneratorConfig {
    pub layout: Layout,
    pub datacenter_id: u64,
    pub worker_id: u64,
    pub clock: ClockMode,
    pub strategy: BufferStrategy,
    /// Size of each queue in the double-buffer pool.
    pub capacity: usize,
    /// IDs built per refill of a batch cache.
    pub batch_size: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            layout: Layout::DEFAULT,
            datacenter_id: 1,
            worker_id: 1,
            clock: ClockMode::Wall,
            strategy: BufferStrategy::DoubleBuffer,
            capacity: 2000,
            batch_size: 1000,
        }
    }
}

impl GeneratorConfig {
    #[must_use]
    pub const fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    #[must_use]
    pub const fn with_identity(mut self, datacenter_id: u64, worker_id: u64) -> Self {
        self.datacenter_id = datacenter_id;
        self.worker_id = worker_id;
        self
    }

    #[must_use]
    pub const fn with_clock(mut self, clock: ClockMode) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: BufferStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Validates the configuration and builds a generator on the system
    /// clock.
    ///
    /// With [`BufferStrategy::DoubleBuffer`] both queues are filled before
    /// this returns.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIdentity`] if either id does not fit the layout.
    /// - [`Error::InvalidCapacity`] if the capacity or batch size of the
    ///   selected strategy is out of range.
    /// - [`Error::ClockBehindEpoch`] if the initial pool fill fails.
    pub fn build(&self) -> Result<IdGenerator> {
        self.build_with_time(SystemClock)
    }

    /// Like [`GeneratorConfig::build`], reading time from `time`.
    ///
    /// # Errors
    ///
    /// See [`GeneratorConfig::build`].
    pub fn build_with_time<T>(&self, time: T) -> Result<IdGenerator>
    where
        T: TimeSource + Send + Sync + 'static,
    {
        let identity = Identity::new(&self.layout, self.datacenter_id, self.worker_id)?;
        let clock = Clock::new(self.clock, &self.layout, time);
        let builder = BatchBuilder::new(self.layout, identity, clock);

        let buffer: DynBuffer = match self.strategy {
            BufferStrategy::DoubleBuffer => Box::new(DoubleBufferPool::new(builder, self.capacity)?),
            BufferStrategy::BatchCache => Box::new(BatchCache::new(builder, self.batch_size)?),
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            datacenter_id = self.datacenter_id,
            worker_id = self.worker_id,
            clock = ?self.clock,
            strategy = ?self.strategy,
            "id generator ready"
        );

        Ok(IdGenerator::new(buffer, self.layout, identity))
    }
}

/// Parses a caller-supplied amount for [`IdGenerator::next_ids`].
///
/// # Errors
///
/// Returns [`Error::InvalidAmount`] for zero or negative values.
///
/// # Example
/// ```
/// use snowdrift::{Error, validate_amount};
///
/// assert_eq!(validate_amount(3), Ok(3));
/// assert_eq!(validate_amount(-5), Err(Error::InvalidAmount { amount: -5 }));
/// ```
pub fn validate_amount(amount: i64) -> Result<usize> {
    match usize::try_from(amount) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::InvalidAmount { amount }),
    }
}

/// Number of immediate retries before a failing buffer is given a millisecond
/// to recover.
const SPIN_RETRIES: u32 = 16;

fn backoff(attempt: u32) {
    if attempt < SPIN_RETRIES {
        thread::yield_now();
    } else {
        thread::sleep(Duration::from_millis(1));
    }
}

/// A thread-safe Snowflake ID generator.
///
/// Cloning is not supported; share it behind an `Arc`.
pub struct IdGenerator<B = DynBuffer> {
    buffer: B,
    layout: Layout,
    identity: Identity,
}

impl<B: IdBuffer> IdGenerator<B> {
    /// Wraps an existing buffer. `layout` and `identity` must be the ones the
    /// buffer's builder was created with; they are only used for
    /// [`IdGenerator::decode`] and reporting.
    pub const fn new(buffer: B, layout: Layout, identity: Identity) -> Self {
        Self {
            buffer,
            layout,
            identity,
        }
    }

    /// Returns the next ID.
    ///
    /// Never fails: if the buffer had to build a batch and the clock was
    /// unusable, the error is logged and the call retries until it succeeds.
    pub fn next_id(&self) -> u64 {
        let mut attempt = 0;
        loop {
            match self.buffer.try_next_id() {
                Ok(id) => return id,
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    {
                        if attempt == 0 {
                            tracing::warn!("id generation failed, retrying: {_e}");
                        }
                    }
                    backoff(attempt);
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    /// A fallible version of [`Self::next_id`] that makes a single attempt.
    ///
    /// # Errors
    ///
    /// Returns the buffer's error if a batch build failed.
    pub fn try_next_id(&self) -> Result<u64> {
        self.buffer.try_next_id()
    }

    /// Returns exactly `amount` IDs.
    ///
    /// Internal failures are retried like [`Self::next_id`], keeping IDs that
    /// were already taken.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAmount`] if `amount` is zero.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_ids(&self, amount: usize) -> Result<Vec<u64>> {
        if amount == 0 {
            return Err(Error::InvalidAmount { amount: 0 });
        }

        let mut ids = Vec::with_capacity(amount);
        while ids.len() < amount {
            match self.buffer.try_next_ids(amount - ids.len()) {
                Ok(chunk) => ids.extend(chunk),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        taken = ids.len(),
                        amount,
                        "bulk id generation failed, retrying: {_e}"
                    );
                    // Make progress through the retrying single path before
                    // the next bulk attempt.
                    ids.push(self.next_id());
                }
            }
        }
        Ok(ids)
    }

    /// A fallible version of [`Self::next_ids`] that makes a single attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAmount`] if `amount` is zero, or the buffer's
    /// error if a batch build failed.
    pub fn try_next_ids(&self, amount: usize) -> Result<Vec<u64>> {
        if amount == 0 {
            return Err(Error::InvalidAmount { amount: 0 });
        }
        self.buffer.try_next_ids(amount)
    }

    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    pub const fn buffer(&self) -> &B {
        &self.buffer
    }

    /// Splits an ID back into its fields using this generator's layout.
    pub const fn decode(&self, id: u64) -> IdParts {
        self.layout.decode(id)
    }
}

impl<B> fmt::Debug for IdGenerator<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdGenerator")
            .field("layout", &self.layout)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_EPOCH, mock::MockTime};
    use std::collections::HashSet;
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    };
    use std::thread::scope;

    fn all_configs() -> Vec<GeneratorConfig> {
        let mut configs = Vec::new();
        for clock in [ClockMode::Wall, ClockMode::Logical] {
            for strategy in [BufferStrategy::DoubleBuffer, BufferStrategy::BatchCache] {
                configs.push(
                    GeneratorConfig::default()
                        .with_clock(clock)
                        .with_strategy(strategy),
                );
            }
        }
        configs
    }

    #[test]
    fn default_config_matches_service_defaults() {
        let config = GeneratorConfig::default();
        assert_eq!(config.layout, Layout::DEFAULT);
        assert_eq!((config.datacenter_id, config.worker_id), (1, 1));
        assert_eq!(config.clock, ClockMode::Wall);
        assert_eq!(config.strategy, BufferStrategy::DoubleBuffer);
        assert_eq!(config.capacity, 2000);
        assert_eq!(config.batch_size, 1000);
    }

    #[test]
    fn build_rejects_bad_identity() {
        let err = GeneratorConfig::default()
            .with_identity(32, 0)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentity { .. }));
    }

    #[test]
    fn build_rejects_bad_sizes_for_the_selected_strategy() {
        let pool = GeneratorConfig::default().with_capacity(0).build();
        assert!(matches!(pool, Err(Error::InvalidCapacity { .. })));

        let cache = GeneratorConfig::default()
            .with_strategy(BufferStrategy::BatchCache)
            .with_batch_size(5000)
            .build();
        assert!(matches!(cache, Err(Error::InvalidCapacity { .. })));

        // Only the selected strategy's size is checked.
        assert!(
            GeneratorConfig::default()
                .with_strategy(BufferStrategy::BatchCache)
                .with_capacity(0)
                .build()
                .is_ok()
        );
    }

    #[test]
    fn build_fails_when_clock_precedes_epoch() {
        let err = GeneratorConfig::default()
            .build_with_time(MockTime::new(DEFAULT_EPOCH - 1))
            .unwrap_err();
        assert!(matches!(err, Error::ClockBehindEpoch { .. }));
    }

    #[test]
    fn next_ids_rejects_zero() {
        let generator = GeneratorConfig::default().build().unwrap();
        assert_eq!(
            generator.next_ids(0),
            Err(Error::InvalidAmount { amount: 0 })
        );
        assert_eq!(
            generator.try_next_ids(0),
            Err(Error::InvalidAmount { amount: 0 })
        );
    }

    #[test]
    fn validate_amount_rejects_non_positive() {
        assert_eq!(validate_amount(1), Ok(1));
        assert_eq!(validate_amount(100_000), Ok(100_000));
        assert_eq!(validate_amount(0), Err(Error::InvalidAmount { amount: 0 }));
        assert_eq!(validate_amount(-5), Err(Error::InvalidAmount { amount: -5 }));
    }

    #[test]
    fn next_ids_returns_exact_length() {
        for config in all_configs() {
            let generator = config.build().unwrap();
            for amount in [1, 3, 999, 4096, 10_000] {
                let ids = generator.next_ids(amount).unwrap();
                assert_eq!(ids.len(), amount, "{config:?}");
                assert_eq!(ids.iter().collect::<HashSet<_>>().len(), amount);
            }
        }
    }

    #[test]
    fn single_and_bulk_ids_share_identity() {
        for config in all_configs() {
            let generator = config.with_identity(7, 21).build().unwrap();
            let single = generator.next_id();
            let bulk = generator.next_ids(1).unwrap();
            assert_eq!(bulk.len(), 1);
            for id in [single, bulk[0]] {
                let parts = generator.decode(id);
                assert_eq!(parts.datacenter_id, 7);
                assert_eq!(parts.worker_id, 21);
                assert!(parts.timestamp >= DEFAULT_EPOCH);
            }
            assert_ne!(single, bulk[0]);
        }
    }

    #[test]
    fn ids_are_unique_across_threads_for_every_config() {
        const THREADS: usize = 8;
        const IDS_PER_THREAD: usize = 10_000;

        for config in all_configs() {
            let generator = config.build().unwrap();
            let seen = Mutex::new(HashSet::with_capacity(THREADS * IDS_PER_THREAD));

            scope(|s| {
                for _ in 0..THREADS {
                    s.spawn(|| {
                        let ids: Vec<u64> =
                            (0..IDS_PER_THREAD).map(|_| generator.next_id()).collect();
                        seen.lock().unwrap().extend(ids);
                    });
                }
            });

            assert_eq!(
                seen.lock().unwrap().len(),
                THREADS * IDS_PER_THREAD,
                "{config:?}"
            );
        }
    }

    /// Fails a fixed number of calls before delegating.
    struct Flaky<B> {
        inner: B,
        failures: AtomicUsize,
    }

    impl<B: IdBuffer> IdBuffer for Flaky<B> {
        fn try_next_id(&self) -> Result<u64> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::ClockBehindEpoch {
                    now: 0,
                    epoch: DEFAULT_EPOCH,
                });
            }
            self.inner.try_next_id()
        }

        fn try_next_ids(&self, amount: usize) -> Result<Vec<u64>> {
            (0..amount).map(|_| self.try_next_id()).collect()
        }
    }

    fn flaky(failures: usize) -> IdGenerator<Flaky<BatchCache<Clock>>> {
        let layout = Layout::DEFAULT;
        let identity = Identity::new(&layout, 1, 1).unwrap();
        let builder = BatchBuilder::new(
            layout,
            identity,
            Clock::new(ClockMode::Wall, &layout, SystemClock),
        );
        let inner = BatchCache::new(builder, 100).unwrap();
        IdGenerator::new(
            Flaky {
                inner,
                failures: AtomicUsize::new(failures),
            },
            layout,
            identity,
        )
    }

    #[test]
    fn next_id_retries_through_failures() {
        let generator = flaky(3);
        assert!(generator.try_next_id().is_err());
        generator.next_id();
        assert_eq!(generator.buffer().failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn next_ids_retries_through_failures() {
        let generator = flaky(40);
        let ids = generator.next_ids(50).unwrap();
        assert_eq!(ids.len(), 50);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), 50);
    }

    #[test]
    fn generator_is_shareable() {
        let generator = Arc::new(GeneratorConfig::default().build().unwrap());
        let handle = {
            let generator = Arc::clone(&generator);
            thread::spawn(move || generator.next_id())
        };
        let theirs = handle.join().unwrap();
        assert_ne!(theirs, generator.next_id());
    }
}
