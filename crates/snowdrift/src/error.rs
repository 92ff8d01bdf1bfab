/// Result alias used throughout `snowdrift`.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All errors that `snowdrift` can produce.
///
/// Configuration variants (`InvalidLayout`, `InvalidIdentity`,
/// `InvalidCapacity`) are only returned while constructing a generator and are
/// meant to abort startup. `InvalidAmount` is the only error a caller can see
/// once a generator is running; the remaining variants surface from batch
/// building and are absorbed by the buffer strategies.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The bit widths do not fit in a 63-bit payload, or a field has no bits.
    #[error(
        "invalid layout: datacenter ({datacenter_bits}) + worker ({worker_bits}) + sequence ({sequence_bits}) bits must each be > 0 and sum to <= 63"
    )]
    InvalidLayout {
        datacenter_bits: u8,
        worker_bits: u8,
        sequence_bits: u8,
    },

    /// A datacenter or worker id does not fit in its bit field.
    #[error("invalid {field}: {value} (max = {max})")]
    InvalidIdentity {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// A buffer or cache size is zero or exceeds the sequence space.
    #[error("invalid capacity: {capacity} (must be within 1..={max})")]
    InvalidCapacity { capacity: usize, max: usize },

    /// `next_ids` was called with a non-positive amount.
    #[error("invalid amount: {amount} (must be a positive integer)")]
    InvalidAmount { amount: i64 },

    /// A batch larger than the sequence space would wrap and repeat ids.
    #[error("batch of {amount} exceeds the sequence space of {max}")]
    BatchTooLarge { amount: usize, max: usize },

    /// The wall clock reads earlier than the layout epoch.
    #[error("clock reads {now} ms, which is before the epoch {epoch} ms")]
    ClockBehindEpoch { now: u64, epoch: u64 },
}
