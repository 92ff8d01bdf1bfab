use crate::{ClockSource, Error, Identity, Layout, Result};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// IDs built together from one [`Stamp`](crate::Stamp).
///
/// Every ID shares `base_timestamp`; sequence values are consecutive starting
/// at the stamp's first sequence, so the IDs are in ascending order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    base_timestamp: u64,
    ids: Vec<u64>,
}

impl Batch {
    pub const fn base_timestamp(&self) -> u64 {
        self.base_timestamp
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[u64] {
        &self.ids
    }

    pub fn into_ids(self) -> Vec<u64> {
        self.ids
    }
}

impl IntoIterator for Batch {
    type Item = u64;
    type IntoIter = std::vec::IntoIter<u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.ids.into_iter()
    }
}

/// Builds [`Batch`]es for one identity on top of a [`ClockSource`].
///
/// The builder itself holds no mutable state; the only synchronization is the
/// single clock call per batch.
#[derive(Debug)]
pub struct BatchBuilder<C> {
    layout: Layout,
    identity: Identity,
    clock: C,
}

impl<C: ClockSource> BatchBuilder<C> {
    pub const fn new(layout: Layout, identity: Identity, clock: C) -> Self {
        Self {
            layout,
            identity,
            clock,
        }
    }

    /// Builds `amount` IDs sharing one base timestamp.
    ///
    /// # Errors
    ///
    /// - [`Error::BatchTooLarge`] if `amount` exceeds the layout's sequence
    ///   space.
    /// - [`Error::ClockBehindEpoch`] if the clock cannot issue a timestamp.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn build(&self, amount: usize) -> Result<Batch> {
        let max = self.layout.sequence_space();
        if amount > max {
            return Err(Error::BatchTooLarge { amount, max });
        }

        let stamp = self.clock.stamp(amount as u64)?;
        let datacenter_id = self.identity.datacenter_id();
        let worker_id = self.identity.worker_id();
        let ids = (0..amount as u64)
            .map(|i| {
                self.layout
                    .encode(stamp.millis, datacenter_id, worker_id, stamp.sequence + i)
            })
            .collect();

        Ok(Batch {
            base_timestamp: stamp.millis,
            ids,
        })
    }

    pub const fn layout(&self) -> &Layout {
        &self.layout
    }

    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    pub const fn clock(&self) -> &C {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DEFAULT_EPOCH, LogicalClock, WallClock, mock::MockTime};

    fn identity() -> Identity {
        Identity::new(&Layout::DEFAULT, 3, 9).unwrap()
    }

    #[test]
    fn batch_shares_timestamp_and_counts_sequence() {
        let time = MockTime::after_epoch(1000);
        let layout = Layout::DEFAULT;
        let builder = BatchBuilder::new(layout, identity(), LogicalClock::new(&layout, &time));

        let batch = builder.build(5).unwrap();
        assert_eq!(batch.len(), 5);
        for (i, id) in batch.ids().iter().enumerate() {
            let parts = layout.decode(*id);
            assert_eq!(parts.timestamp, batch.base_timestamp());
            assert_eq!(parts.datacenter_id, 3);
            assert_eq!(parts.worker_id, 9);
            assert_eq!(parts.sequence, i as u64);
        }
        assert!(batch.ids().windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn wall_batches_in_one_millisecond_do_not_collide() {
        let time = MockTime::after_epoch(1000);
        let layout = Layout::DEFAULT;
        let builder = BatchBuilder::new(layout, identity(), WallClock::new(&layout, &time));

        let first = builder.build(2000).unwrap();
        let second = builder.build(2000).unwrap();
        assert_eq!(first.base_timestamp(), DEFAULT_EPOCH + 1000);
        assert_eq!(second.base_timestamp(), DEFAULT_EPOCH + 1000);
        assert!(first.ids().last() < second.ids().first());
    }

    #[test]
    fn full_sequence_space_is_allowed() {
        let time = MockTime::after_epoch(0);
        let layout = Layout::DEFAULT;
        let builder = BatchBuilder::new(layout, identity(), LogicalClock::new(&layout, &time));
        assert_eq!(builder.build(4096).unwrap().len(), 4096);
    }

    #[test]
    fn oversized_batch_is_rejected() {
        let time = MockTime::after_epoch(0);
        let layout = Layout::DEFAULT;
        let builder = BatchBuilder::new(layout, identity(), LogicalClock::new(&layout, &time));
        assert_eq!(
            builder.build(4097),
            Err(Error::BatchTooLarge {
                amount: 4097,
                max: 4096
            })
        );
    }

    #[test]
    fn empty_batch_is_empty() {
        let time = MockTime::after_epoch(0);
        let layout = Layout::DEFAULT;
        let builder = BatchBuilder::new(layout, identity(), WallClock::new(&layout, &time));
        assert!(builder.build(0).unwrap().is_empty());
    }
}
