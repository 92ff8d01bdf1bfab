//! Per-caller batch caches.
//!
//! Each execution context owns a private run of pending IDs and only touches
//! the shared clock when that run is exhausted. [`LocalBatchCache`] is the
//! owned form for callers that can hold onto it (a worker loop, a dedicated
//! thread). [`BatchCache`] keeps one per thread behind a thread-keyed map for
//! callers that only have a shared reference; a thread's entry is freed when
//! the thread exits.

use crate::{BatchBuilder, ClockSource, Error, Result, buffer::IdBuffer};
use core::{cell::RefCell, fmt};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    sync::{Arc, Weak},
    thread::{self, ThreadId},
};

/// A batch cache owned by a single execution context.
pub struct LocalBatchCache<C> {
    builder: Arc<BatchBuilder<C>>,
    batch_size: usize,
    // Reversed so `pop` hands out the smallest pending ID.
    pending: Vec<u64>,
}

fn check_batch_size<C: ClockSource>(builder: &BatchBuilder<C>, batch_size: usize) -> Result<()> {
    let max = builder.layout().sequence_space();
    if batch_size == 0 || batch_size > max {
        return Err(Error::InvalidCapacity {
            capacity: batch_size,
            max,
        });
    }
    Ok(())
}

impl<C: ClockSource> LocalBatchCache<C> {
    /// Creates an empty cache that refills `batch_size` IDs at a time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `batch_size` is zero or exceeds
    /// the layout's sequence space.
    pub fn new(builder: Arc<BatchBuilder<C>>, batch_size: usize) -> Result<Self> {
        check_batch_size(&builder, batch_size)?;
        Ok(Self::unchecked(builder, batch_size))
    }

    const fn unchecked(builder: Arc<BatchBuilder<C>>, batch_size: usize) -> Self {
        Self {
            builder,
            batch_size,
            pending: Vec::new(),
        }
    }

    fn refill(&mut self, amount: usize) -> Result<()> {
        let mut ids = self.builder.build(amount)?.into_ids();
        ids.reverse();
        self.pending = ids;
        #[cfg(feature = "tracing")]
        tracing::trace!(amount, "batch cache refilled");
        Ok(())
    }

    /// Takes one ID, building a batch of `batch_size` first if the cache is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns an error if a batch had to be built and the clock failed.
    pub fn next_id(&mut self) -> Result<u64> {
        loop {
            if let Some(id) = self.pending.pop() {
                return Ok(id);
            }
            self.refill(self.batch_size)?;
        }
    }

    /// Takes `amount` IDs in ascending order per batch.
    ///
    /// An empty cache is refilled with `max(batch_size, remaining)` IDs,
    /// capped at the sequence space, until the request is satisfied.
    ///
    /// # Errors
    ///
    /// Returns an error if a batch had to be built and the clock failed.
    pub fn next_ids(&mut self, amount: usize) -> Result<Vec<u64>> {
        let max = self.builder.layout().sequence_space();
        let mut ids = Vec::with_capacity(amount);
        while ids.len() < amount {
            let remaining = amount - ids.len();
            if self.pending.is_empty() {
                self.refill(remaining.max(self.batch_size).min(max))?;
            }
            let take = remaining.min(self.pending.len());
            let start = self.pending.len() - take;
            ids.extend(self.pending.drain(start..).rev());
        }
        Ok(ids)
    }

    /// IDs left before the next refill.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl<C> fmt::Debug for LocalBatchCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBatchCache")
            .field("batch_size", &self.batch_size)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

/// Removes a thread's entry from a [`BatchCache`] when that thread exits.
trait EvictThread {
    fn evict_thread(&self, thread: ThreadId);
}

/// Caches registered by the current thread, evicted from its destructor.
struct ExitGuard {
    thread: ThreadId,
    caches: RefCell<Vec<Weak<dyn EvictThread>>>,
}

impl ExitGuard {
    fn register(&self, cache: Weak<dyn EvictThread>) {
        let mut caches = self.caches.borrow_mut();
        caches.retain(|known| known.strong_count() > 0);
        if !caches.iter().any(|known| Weak::ptr_eq(known, &cache)) {
            caches.push(cache);
        }
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        for cache in self.caches.get_mut().drain(..) {
            if let Some(cache) = cache.upgrade() {
                cache.evict_thread(self.thread);
            }
        }
    }
}

thread_local! {
    static EXIT_GUARD: ExitGuard = ExitGuard {
        thread: thread::current().id(),
        caches: RefCell::new(Vec::new()),
    };
}

type Slot<C> = Arc<Mutex<LocalBatchCache<C>>>;

struct Contexts<C> {
    slots: DashMap<ThreadId, Slot<C>>,
}

impl<C> EvictThread for Contexts<C> {
    fn evict_thread(&self, thread: ThreadId) {
        self.slots.remove(&thread);
    }
}

/// A shared handle that gives every calling thread its own
/// [`LocalBatchCache`].
///
/// Threads never read each other's entries; the map only routes a call to
/// the caller's cache, and the map's lock is released before that cache
/// builds a batch. An entry lives until its thread exits or calls
/// [`BatchCache::evict_current`], so memory tracks the live threads that have
/// called in, at most one batch each.
///
/// ## See Also
/// - [`DoubleBufferPool`](crate::DoubleBufferPool)
pub struct BatchCache<C> {
    builder: Arc<BatchBuilder<C>>,
    batch_size: usize,
    contexts: Arc<Contexts<C>>,
}

impl<C: ClockSource + 'static> BatchCache<C> {
    /// # Errors
    ///
    /// Returns [`Error::InvalidCapacity`] if `batch_size` is zero or exceeds
    /// the layout's sequence space.
    pub fn new(builder: BatchBuilder<C>, batch_size: usize) -> Result<Self> {
        check_batch_size(&builder, batch_size)?;
        Ok(Self {
            builder: Arc::new(builder),
            batch_size,
            contexts: Arc::new(Contexts {
                slots: DashMap::new(),
            }),
        })
    }

    /// Returns a detached cache sharing this cache's builder. It is not
    /// registered in the thread map.
    pub fn local(&self) -> LocalBatchCache<C> {
        LocalBatchCache::unchecked(Arc::clone(&self.builder), self.batch_size)
    }

    fn current_slot(&self) -> Slot<C> {
        let thread = thread::current().id();
        // Bound first so the shard guard is released before a miss inserts.
        let existing = self
            .contexts
            .slots
            .get(&thread)
            .map(|slot| Arc::clone(slot.value()));

        existing.unwrap_or_else(|| {
            let slot = Arc::new(Mutex::new(self.local()));
            self.contexts.slots.insert(thread, Arc::clone(&slot));

            let contexts: Arc<dyn EvictThread> = self.contexts.clone();
            // Fails only while this thread's locals are being torn down; the
            // entry then stays until `evict_current` or drop.
            let _ = EXIT_GUARD.try_with(|guard| guard.register(Arc::downgrade(&contexts)));
            slot
        })
    }

    fn with_current<R>(&self, f: impl FnOnce(&mut LocalBatchCache<C>) -> R) -> R {
        let slot = self.current_slot();
        let mut cache = slot.lock();
        f(&mut cache)
    }

    /// Drops the calling thread's cache, returning how many pending IDs were
    /// discarded.
    pub fn evict_current(&self) -> Option<usize> {
        self.contexts
            .slots
            .remove(&thread::current().id())
            .map(|(_, slot)| slot.lock().pending())
    }

    /// Number of live threads currently holding a cache.
    pub fn contexts(&self) -> usize {
        self.contexts.slots.len()
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn builder(&self) -> &BatchBuilder<C> {
        &self.builder
    }
}

impl<C: ClockSource + 'static> IdBuffer for BatchCache<C> {
    fn try_next_id(&self) -> Result<u64> {
        self.with_current(LocalBatchCache::next_id)
    }

    fn try_next_ids(&self, amount: usize) -> Result<Vec<u64>> {
        self.with_current(|cache| cache.next_ids(amount))
    }
}

impl<C> fmt::Debug for BatchCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCache")
            .field("batch_size", &self.batch_size)
            .field("contexts", &self.contexts.slots.len())
            .finish_non_exhaustive()
    }
}
