//! Double-buffered ID pool.
//!
//! The pool keeps two pre-filled queues. Callers drain `active`; when it runs
//! dry the first caller to take an ID from `standby` promotes it to `active`
//! and signals the refill worker, which builds a fresh `standby` in the
//! background. Only when both queues are empty does a caller build a batch
//! itself.
//!
//! ## Concurrency
//!
//! - Queues are lock-free bounded MPMC queues shared by every caller.
//! - The queue references live behind a `RwLock`. Popping takes the read
//!   lock; promotion and installation take the write lock and check that the
//!   queues they replace are still the ones they observed.
//! - Refills run on one dedicated thread per pool. An in-flight flag makes
//!   them single-flight: a depletion that happens while a refill is pending is
//!   coalesced into it.
//! - Synchronous rebuilds are serialized so a burst of callers hitting an
//!   empty pool builds one batch, not one each.

use crate::{BatchBuilder, ClockSource, Error, Result, buffer::IdBuffer};
use core::fmt;
use crossbeam_channel::{Receiver, Sender};
use crossbeam_queue::ArrayQueue;
use parking_lot::{Mutex, RwLock};
use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

type Queue = ArrayQueue<u64>;

struct Slots {
    active: Arc<Queue>,
    standby: Option<Arc<Queue>>,
}

#[derive(Default)]
struct Counters {
    promotions: AtomicU64,
    refills_requested: AtomicU64,
    refills_coalesced: AtomicU64,
    refills_completed: AtomicU64,
    refills_failed: AtomicU64,
    sync_rebuilds: AtomicU64,
    refills_inflight: AtomicU64,
    peak_refills_inflight: AtomicU64,
}

/// A point-in-time copy of a pool's counters.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Times `standby` was promoted to `active`.
    pub promotions: u64,
    /// Refills handed to the refill worker.
    pub refills_requested: u64,
    /// Refill requests dropped because one was already in flight.
    pub refills_coalesced: u64,
    pub refills_completed: u64,
    pub refills_failed: u64,
    /// Times a caller found both queues empty and built `active` itself.
    pub sync_rebuilds: u64,
    /// Highest number of refills observed running at once.
    pub peak_refills_inflight: u64,
}

struct Shared<C> {
    builder: BatchBuilder<C>,
    capacity: usize,
    slots: RwLock<Slots>,
    rebuild: Mutex<()>,
    refilling: AtomicBool,
    counters: Counters,
}

impl<C: ClockSource> Shared<C> {
    fn fill(&self) -> Result<Arc<Queue>> {
        let batch = self.builder.build(self.capacity)?;
        let queue = ArrayQueue::new(self.capacity);
        for id in batch {
            // Sized to the batch, never full.
            let _ = queue.push(id);
        }
        Ok(Arc::new(queue))
    }

    fn refill_standby(&self) {
        let inflight = self.counters.refills_inflight.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters
            .peak_refills_inflight
            .fetch_max(inflight, Ordering::AcqRel);

        let result = self.fill();

        {
            let mut slots = self.slots.write();
            match result {
                Ok(queue) => {
                    slots.standby = Some(queue);
                    self.counters.refills_completed.fetch_add(1, Ordering::Relaxed);
                    #[cfg(feature = "tracing")]
                    tracing::trace!(capacity = self.capacity, "standby refilled");
                }
                Err(_e) => {
                    self.counters.refills_failed.fetch_add(1, Ordering::Relaxed);
                    #[cfg(feature = "tracing")]
                    tracing::error!("standby refill failed, falling back to synchronous rebuilds: {_e}");
                }
            }
            // Cleared under the write lock so a caller promoting the queue we
            // just installed can always schedule the next refill.
            self.refilling.store(false, Ordering::Release);
        }

        self.counters.refills_inflight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Long-running loop of the refill worker thread.
///
/// Each message is one refill of `standby`. The loop ends when the pool drops
/// its sender.
fn refill_loop<C: ClockSource>(shared: Arc<Shared<C>>, rx: Receiver<()>) {
    #[cfg(feature = "tracing")]
    tracing::trace!("refill worker started");

    while rx.recv().is_ok() {
        shared.refill_standby();
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("refill worker stopped");
}

/// A double-buffered pool of pre-built IDs.
///
/// ## Recommended When
/// - Many threads or tasks share one generator
/// - Tail latency matters more than memory: two full queues are kept
///
/// ## See Also
/// - [`BatchCache`](crate::BatchCache)
pub struct DoubleBufferPool<C>
where
    C: ClockSource + Send + Sync + 'static,
{
    shared: Arc<Shared<C>>,
    refill_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl<C> DoubleBufferPool<C>
where
    C: ClockSource + Send + Sync + 'static,
{
    /// Builds both queues synchronously and starts the refill worker.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidCapacity`] if `capacity` is zero or larger than the
    ///   layout's sequence space.
    /// - Any error from building the two initial batches.
    pub fn new(builder: BatchBuilder<C>, capacity: usize) -> Result<Self> {
        let max = builder.layout().sequence_space();
        if capacity == 0 || capacity > max {
            return Err(Error::InvalidCapacity { capacity, max });
        }

        let mut shared = Shared {
            builder,
            capacity,
            slots: RwLock::new(Slots {
                active: Arc::new(ArrayQueue::new(1)),
                standby: None,
            }),
            rebuild: Mutex::new(()),
            refilling: AtomicBool::new(false),
            counters: Counters::default(),
        };
        let active = shared.fill()?;
        let standby = shared.fill()?;
        *shared.slots.get_mut() = Slots {
            active,
            standby: Some(standby),
        };

        let shared = Arc::new(shared);
        let (refill_tx, refill_rx) = crossbeam_channel::bounded(1);
        let worker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || refill_loop(shared, refill_rx))
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(capacity, "double-buffer pool ready");

        Ok(Self {
            shared,
            refill_tx: Some(refill_tx),
            worker: Some(worker),
        })
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn builder(&self) -> &BatchBuilder<C> {
        &self.shared.builder
    }

    /// IDs currently waiting in `active` and `standby`.
    pub fn available(&self) -> (usize, usize) {
        let slots = self.shared.slots.read();
        (
            slots.active.len(),
            slots.standby.as_ref().map_or(0, |q| q.len()),
        )
    }

    /// Whether a refill is scheduled or running.
    pub fn is_refilling(&self) -> bool {
        self.shared.refilling.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        let c = &self.shared.counters;
        PoolStats {
            promotions: c.promotions.load(Ordering::Relaxed),
            refills_requested: c.refills_requested.load(Ordering::Relaxed),
            refills_coalesced: c.refills_coalesced.load(Ordering::Relaxed),
            refills_completed: c.refills_completed.load(Ordering::Relaxed),
            refills_failed: c.refills_failed.load(Ordering::Relaxed),
            sync_rebuilds: c.sync_rebuilds.load(Ordering::Relaxed),
            peak_refills_inflight: c.peak_refills_inflight.load(Ordering::Relaxed),
        }
    }

    /// Takes one ID following the active, standby, rebuild precedence.
    fn take_one(&self) -> Result<u64> {
        loop {
            let (active, standby) = {
                let slots = self.shared.slots.read();
                if let Some(id) = slots.active.pop() {
                    return Ok(id);
                }
                (Arc::clone(&slots.active), slots.standby.clone())
            };

            if let Some(standby) = standby {
                if let Some(id) = standby.pop() {
                    self.promote(&active, &standby);
                    return Ok(id);
                }
            }

            self.rebuild_active(&active)?;
        }
    }

    /// Makes `standby` the active queue, unless another caller already did.
    fn promote(&self, drained: &Arc<Queue>, standby: &Arc<Queue>) {
        let promoted = {
            let mut slots = self.shared.slots.write();
            let current = Arc::ptr_eq(&slots.active, drained)
                && slots
                    .standby
                    .as_ref()
                    .is_some_and(|q| Arc::ptr_eq(q, standby));
            if current {
                slots.active = Arc::clone(standby);
                slots.standby = None;
            }
            current
        };

        if promoted {
            self.shared
                .counters
                .promotions
                .fetch_add(1, Ordering::Relaxed);
            self.request_refill();
        }
    }

    /// Builds a new active queue on the caller's thread.
    fn rebuild_active(&self, drained: &Arc<Queue>) -> Result<()> {
        let _rebuilding = self.shared.rebuild.lock();

        // Someone may have promoted or rebuilt while we waited for the lock.
        if !Arc::ptr_eq(&self.shared.slots.read().active, drained) {
            return Ok(());
        }

        let queue = self.shared.fill()?;
        self.shared
            .counters
            .sync_rebuilds
            .fetch_add(1, Ordering::Relaxed);

        let needs_standby = {
            let mut slots = self.shared.slots.write();
            let standby_empty = slots.standby.as_ref().is_none_or(|q| q.is_empty());
            if Arc::ptr_eq(&slots.active, drained) {
                slots.active = queue;
            } else if standby_empty {
                // Active was replaced while we built; keep the batch as standby.
                slots.standby = Some(queue);
                return Ok(());
            }
            standby_empty
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            capacity = self.shared.capacity,
            "both buffers drained, rebuilt active synchronously"
        );

        if needs_standby {
            self.request_refill();
        }
        Ok(())
    }

    /// Signals the refill worker unless a refill is already in flight.
    fn request_refill(&self) {
        let counters = &self.shared.counters;
        if self
            .shared
            .refilling
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            counters.refills_coalesced.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // The channel holds one message and the flag admits one sender, so
        // this only fails once the worker is gone.
        let sent = self
            .refill_tx
            .as_ref()
            .is_some_and(|tx| tx.try_send(()).is_ok());

        if sent {
            counters.refills_requested.fetch_add(1, Ordering::Relaxed);
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!("refill worker unavailable, standby stays empty");
            self.shared.refilling.store(false, Ordering::Release);
        }
    }
}

impl<C> IdBuffer for DoubleBufferPool<C>
where
    C: ClockSource + Send + Sync + 'static,
{
    fn try_next_id(&self) -> Result<u64> {
        self.take_one()
    }

    fn try_next_ids(&self, amount: usize) -> Result<Vec<u64>> {
        let mut ids = Vec::with_capacity(amount);
        while ids.len() < amount {
            {
                let slots = self.shared.slots.read();
                while ids.len() < amount {
                    match slots.active.pop() {
                        Some(id) => ids.push(id),
                        None => break,
                    }
                }
            }
            if ids.len() < amount {
                ids.push(self.take_one()?);
            }
        }
        Ok(ids)
    }
}

impl<C> Drop for DoubleBufferPool<C>
where
    C: ClockSource + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        drop(self.refill_tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("refill worker panicked");
            }
        }
    }
}

impl<C> fmt::Debug for DoubleBufferPool<C>
where
    C: ClockSource + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (active, standby) = self.available();
        f.debug_struct("DoubleBufferPool")
            .field("capacity", &self.shared.capacity)
            .field("active", &active)
            .field("standby", &standby)
            .field("refilling", &self.is_refilling())
            .finish_non_exhaustive()
    }
}
