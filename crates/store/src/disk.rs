//! Disk space accounting for the operator volume

use appfw_errors::{Error, StorageError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Tracks the bytes still available for staging downloads.
///
/// One tracker serves the whole operator; the pipeline takes it as a
/// dependency so tests can run against an isolated budget.
#[derive(Debug)]
pub struct DiskSpaceTracker {
    available: AtomicU64,
}

impl DiskSpaceTracker {
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            available: AtomicU64::new(capacity),
        }
    }

    #[must_use]
    pub fn available(&self) -> u64 {
        self.available.load(Ordering::Acquire)
    }

    /// Reserve `size` bytes ahead of a download.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientDiskSpace` without modifying the counter when
    /// the budget cannot cover the reservation. The caller leaves the
    /// worker Pending rather than failing it.
    pub fn reserve(&self, size: u64) -> Result<(), Error> {
        let mut current = self.available.load(Ordering::Acquire);
        loop {
            if current < size {
                return Err(StorageError::InsufficientDiskSpace {
                    required: size,
                    available: current,
                }
                .into());
            }
            match self.available.compare_exchange_weak(
                current,
                current - size,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    /// Return `size` bytes to the budget after a package is deleted or a
    /// download is abandoned.
    pub fn release(&self, size: u64) {
        self.available.fetch_add(size, Ordering::AcqRel);
    }
}
