//! Buffer strategies that sit between callers and the [`BatchBuilder`].
//!
//! - [`DoubleBufferPool`]: two shared queues; one serves while the other is
//!   refilled in the background.
//! - [`BatchCache`]: one private batch per calling thread.
//!
//! [`BatchBuilder`]: crate::BatchBuilder

mod cache;
mod pool;

pub use cache::*;
pub use pool::*;

use crate::Result;

/// A source of pre-built IDs.
pub trait IdBuffer {
    /// Takes one ID.
    ///
    /// # Errors
    ///
    /// Returns an error only if a synchronous rebuild was required and the
    /// batch could not be built (e.g. the clock reads before the epoch).
    fn try_next_id(&self) -> Result<u64>;

    /// Takes `amount` IDs. An `amount` of zero yields an empty vector.
    ///
    /// # Errors
    ///
    /// Same as [`IdBuffer::try_next_id`].
    fn try_next_ids(&self, amount: usize) -> Result<Vec<u64>>;
}

impl<B: IdBuffer + ?Sized> IdBuffer for Box<B> {
    fn try_next_id(&self) -> Result<u64> {
        (**self).try_next_id()
    }

    fn try_next_ids(&self, amount: usize) -> Result<Vec<u64>> {
        (**self).try_next_ids(amount)
    }
}
