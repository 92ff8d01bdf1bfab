use crate::{Error, Layout, Result};

/// The static `(datacenter, worker)` identity stamped into every ID.
///
/// Validated once against a [`Layout`]; two processes sharing an identity will
/// produce colliding IDs.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identity {
    datacenter_id: u64,
    worker_id: u64,
}

impl Identity {
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentity`] if either id does not fit in its
    /// field of `layout`.
    pub const fn new(layout: &Layout, datacenter_id: u64, worker_id: u64) -> Result<Self> {
        if datacenter_id > layout.max_datacenter_id() {
            return Err(Error::InvalidIdentity {
                field: "datacenter_id",
                value: datacenter_id,
                max: layout.max_datacenter_id(),
            });
        }
        if worker_id > layout.max_worker_id() {
            return Err(Error::InvalidIdentity {
                field: "worker_id",
                value: worker_id,
                max: layout.max_worker_id(),
            });
        }
        Ok(Self {
            datacenter_id,
            worker_id,
        })
    }

    pub const fn datacenter_id(&self) -> u64 {
        self.datacenter_id
    }

    pub const fn worker_id(&self) -> u64 {
        self.worker_id
    }
}
