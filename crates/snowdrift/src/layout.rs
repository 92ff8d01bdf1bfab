use crate::{Error, Result};

/// Default epoch: Friday, January 1, 2021 00:00:00 UTC
pub const DEFAULT_EPOCH: u64 = 1_609_459_200_000;

/// The bit layout of a 64-bit Snowflake ID.
///
/// With [`Layout::DEFAULT`]:
///
/// ```text
///  Bit Index:  63           63 62            22 21              17 16          12 11             0
///              +--------------+----------------+------------------+--------------+---------------+
///  Field:      | reserved (1) | timestamp (41) | datacenter ID (5)| worker ID (5)| sequence (12) |
///              +--------------+----------------+------------------+--------------+---------------+
///              |<----------- MSB ------------------ 64 bits ------------------ LSB ------------->|
/// ```
///
/// The timestamp field stores milliseconds elapsed since [`Layout::epoch`].
/// Shifts and masks are derived once at construction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Layout {
    epoch: u64,
    datacenter_bits: u8,
    worker_bits: u8,
    sequence_bits: u8,
    worker_shift: u8,
    datacenter_shift: u8,
    timestamp_shift: u8,
    sequence_mask: u64,
    worker_mask: u64,
    datacenter_mask: u64,
}

/// The decoded fields of an ID.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdParts {
    /// Milliseconds since the Unix epoch (the layout epoch is added back).
    pub timestamp: u64,
    pub datacenter_id: u64,
    pub worker_id: u64,
    pub sequence: u64,
}

impl Default for Layout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl Layout {
    /// 5 datacenter bits, 5 worker bits, 12 sequence bits, [`DEFAULT_EPOCH`].
    pub const DEFAULT: Self = Self::derive(DEFAULT_EPOCH, 5, 5, 12);

    /// Creates a layout from an epoch (ms since the Unix epoch) and field
    /// widths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidLayout`] if any width is zero or the widths sum
    /// to more than 63 bits.
    ///
    /// # Example
    /// ```
    /// use snowdrift::Layout;
    ///
    /// let layout = Layout::new(0, 4, 6, 10).unwrap();
    /// assert_eq!(layout.sequence_space(), 1024);
    /// assert!(Layout::new(0, 20, 20, 24).is_err());
    /// ```
    pub const fn new(
        epoch: u64,
        datacenter_bits: u8,
        worker_bits: u8,
        sequence_bits: u8,
    ) -> Result<Self> {
        let total = datacenter_bits as u16 + worker_bits as u16 + sequence_bits as u16;
        if datacenter_bits == 0 || worker_bits == 0 || sequence_bits == 0 || total > 63 {
            return Err(Error::InvalidLayout {
                datacenter_bits,
                worker_bits,
                sequence_bits,
            });
        }
        Ok(Self::derive(epoch, datacenter_bits, worker_bits, sequence_bits))
    }

    const fn derive(epoch: u64, datacenter_bits: u8, worker_bits: u8, sequence_bits: u8) -> Self {
        Self {
            epoch,
            datacenter_bits,
            worker_bits,
            sequence_bits,
            worker_shift: sequence_bits,
            datacenter_shift: sequence_bits + worker_bits,
            timestamp_shift: sequence_bits + worker_bits + datacenter_bits,
            sequence_mask: (1 << sequence_bits) - 1,
            worker_mask: (1 << worker_bits) - 1,
            datacenter_mask: (1 << datacenter_bits) - 1,
        }
    }

    /// Returns a copy of this layout anchored at a different epoch.
    #[must_use]
    pub const fn with_epoch(self, epoch: u64) -> Self {
        Self::derive(epoch, self.datacenter_bits, self.worker_bits, self.sequence_bits)
    }

    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    pub const fn sequence_mask(&self) -> u64 {
        self.sequence_mask
    }

    pub const fn timestamp_shift(&self) -> u8 {
        self.timestamp_shift
    }

    pub const fn datacenter_shift(&self) -> u8 {
        self.datacenter_shift
    }

    pub const fn worker_shift(&self) -> u8 {
        self.worker_shift
    }

    pub const fn max_datacenter_id(&self) -> u64 {
        self.datacenter_mask
    }

    pub const fn max_worker_id(&self) -> u64 {
        self.worker_mask
    }

    /// Number of distinct sequence values per timestamp. This is the largest
    /// batch that can be built without repeating an ID.
    pub const fn sequence_space(&self) -> usize {
        (self.sequence_mask + 1) as usize
    }

    /// Packs the fields into an ID.
    ///
    /// `sequence` is masked to the sequence field; keeping batches within
    /// [`Self::sequence_space`] is the caller's job.
    ///
    /// # Panics
    ///
    /// Panics if `base_timestamp` is earlier than the layout epoch. Clock
    /// sources reject such readings before they reach the encoder.
    ///
    /// # Example
    /// ```
    /// use snowdrift::{DEFAULT_EPOCH, Layout};
    ///
    /// let id = Layout::DEFAULT.encode(DEFAULT_EPOCH + 1000, 1, 1, 0);
    /// assert_eq!(id, 4_194_439_168);
    /// ```
    #[inline]
    pub const fn encode(
        &self,
        base_timestamp: u64,
        datacenter_id: u64,
        worker_id: u64,
        sequence: u64,
    ) -> u64 {
        assert!(
            base_timestamp >= self.epoch,
            "timestamp precedes the layout epoch"
        );
        ((base_timestamp - self.epoch) << self.timestamp_shift)
            | (datacenter_id << self.datacenter_shift)
            | (worker_id << self.worker_shift)
            | (sequence & self.sequence_mask)
    }

    /// Splits an ID back into its fields.
    pub const fn decode(&self, id: u64) -> IdParts {
        IdParts {
            timestamp: (id >> self.timestamp_shift) + self.epoch,
            datacenter_id: (id >> self.datacenter_shift) & self.datacenter_mask,
            worker_id: (id >> self.worker_shift) & self.worker_mask,
            sequence: id & self.sequence_mask,
        }
    }
}
