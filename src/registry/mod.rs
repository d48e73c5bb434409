//! Descriptor-keyed table of in-flight requests.
//!
//! The facility reports completions by descriptor, so the registry is the
//! demultiplexer between a `(fd, ret)` pair and the request it finishes.
//!
//! # Guarantees
//!
//! - A descriptor maps to at most one request. [`insert`](PendingRegistry::insert)
//!   refuses to overwrite a live entry.
//! - [`take`](PendingRegistry::take) is the only removal path. A second `take`
//!   of the same key returns `None`, so a duplicated completion cannot release a
//!   request twice.
//!
//! # Example
//!
//! ```rust
//! use std::os::fd::OwnedFd;
//! use safer_aio::buffer::{AllocationStrategy, IoBuffer};
//! use safer_aio::operation::AsyncFileRequest;
//! use safer_aio::PendingRegistry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut registry = PendingRegistry::new();
//! let fd = OwnedFd::from(std::fs::File::open("/dev/null")?);
//! let buffer = IoBuffer::allocate(16, AllocationStrategy::Heap)?;
//! let request = AsyncFileRequest::read(fd.into(), buffer, 0, "/dev/null", None);
//! let key = request.fd();
//!
//! registry.insert(request)?;
//! assert!(registry.contains(key));
//! assert!(registry.take(key).is_some());
//! assert!(registry.take(key).is_none());
//! # Ok(())
//! # }
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::os::unix::io::RawFd;

use crate::error::DuplicateKey;
use crate::operation::AsyncFileRequest;

#[cfg(test)]
mod tests;

/// Registry of pending requests keyed by descriptor.
///
/// Not synchronized on its own; the engine keeps it behind a mutex and never
/// holds that mutex while running user callbacks.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    pending: HashMap<RawFd, AsyncFileRequest>,
}

impl PendingRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }

    /// Create an empty registry sized for `capacity` requests.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: HashMap::with_capacity(capacity),
        }
    }

    /// Register `request` under its descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateKey`] if the descriptor already has a pending request.
    /// The rejected request is dropped, releasing whatever it owned; the live
    /// request is not touched.
    pub fn insert(&mut self, request: AsyncFileRequest) -> Result<(), DuplicateKey> {
        let fd = request.fd();
        match self.pending.entry(fd) {
            Entry::Occupied(_) => Err(DuplicateKey { fd }),
            Entry::Vacant(slot) => {
                slot.insert(request);
                Ok(())
            }
        }
    }

    /// Remove and return the request for `fd`.
    pub fn take(&mut self, fd: RawFd) -> Option<AsyncFileRequest> {
        self.pending.remove(&fd)
    }

    /// Returns true if `fd` has a pending request.
    pub fn contains(&self, fd: RawFd) -> bool {
        self.pending.contains_key(&fd)
    }

    /// Look at the pending request for `fd` without removing it.
    pub fn get(&self, fd: RawFd) -> Option<&AsyncFileRequest> {
        self.pending.get(&fd)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Descriptors with pending requests, in no particular order.
    pub fn descriptors(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.pending.keys().copied()
    }
}
