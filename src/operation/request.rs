//! The pending request record.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use crate::buffer::IoBuffer;
use crate::operation::handler::{Handler, ReadHandler, WriteHandler};
use crate::operation::types::{OperationKind, ReleasePolicy};

/// The descriptor a request transfers through.
#[derive(Debug)]
pub enum Descriptor {
    /// Opened by the engine; closed when the request is released.
    Owned(OwnedFd),
    /// Owned by the caller; never closed by the engine.
    Borrowed(RawFd),
}

impl Descriptor {
    /// Raw descriptor value, also the registry key.
    #[inline]
    pub fn raw(&self) -> RawFd {
        match self {
            Descriptor::Owned(fd) => fd.as_raw_fd(),
            Descriptor::Borrowed(fd) => *fd,
        }
    }

    /// Release policy implied by ownership.
    #[inline]
    pub fn release_policy(&self) -> ReleasePolicy {
        match self {
            Descriptor::Owned(_) => ReleasePolicy::OneShot,
            Descriptor::Borrowed(_) => ReleasePolicy::Retain,
        }
    }
}

impl From<OwnedFd> for Descriptor {
    fn from(fd: OwnedFd) -> Self {
        Descriptor::Owned(fd)
    }
}

/// One outstanding asynchronous transfer.
///
/// The request exclusively owns its buffer and, under
/// [`ReleasePolicy::OneShot`], its descriptor. Dropping the request releases
/// both, so the single `take` from the registry is also the single release.
pub struct AsyncFileRequest {
    descriptor: Descriptor,
    kind: OperationKind,
    buffer: IoBuffer,
    requested_length: usize,
    offset: u64,
    path_token: PathBuf,
    callback: Option<Handler>,
}

impl AsyncFileRequest {
    /// A read of `buffer.len()` bytes at `offset`.
    pub fn read(
        descriptor: Descriptor,
        buffer: IoBuffer,
        offset: u64,
        path_token: impl Into<PathBuf>,
        callback: Option<ReadHandler>,
    ) -> Self {
        Self {
            descriptor,
            kind: OperationKind::Read,
            requested_length: buffer.len(),
            buffer,
            offset,
            path_token: path_token.into(),
            callback: callback.map(Handler::Read),
        }
    }

    /// A write of the whole of `buffer` at `offset`.
    pub fn write(
        descriptor: Descriptor,
        buffer: IoBuffer,
        offset: u64,
        path_token: impl Into<PathBuf>,
        callback: Option<WriteHandler>,
    ) -> Self {
        Self {
            descriptor,
            kind: OperationKind::Write,
            requested_length: buffer.len(),
            buffer,
            offset,
            path_token: path_token.into(),
            callback: callback.map(Handler::Write),
        }
    }

    /// Registry key.
    #[inline]
    pub fn fd(&self) -> RawFd {
        self.descriptor.raw()
    }

    /// Transfer direction.
    #[inline]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Whether the descriptor is closed on release.
    #[inline]
    pub fn release_policy(&self) -> ReleasePolicy {
        self.descriptor.release_policy()
    }

    /// Bytes the caller asked to transfer.
    #[inline]
    pub fn requested_length(&self) -> usize {
        self.requested_length
    }

    /// Transfer offset.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Path or name handed back to the callback.
    pub fn path(&self) -> &Path {
        &self.path_token
    }

    /// The request buffer.
    pub fn buffer(&self) -> &IoBuffer {
        &self.buffer
    }

    /// Returns true if a handler is attached.
    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Length submitted to the facility.
    ///
    /// One-shot reads submit the whole buffer capacity so page-rounded direct
    /// reads stay legal; everything else submits exactly the requested length.
    pub fn transfer_len(&self) -> usize {
        match (self.kind, self.release_policy()) {
            (OperationKind::Read, ReleasePolicy::OneShot) => self.buffer.transfer_len(),
            _ => self.requested_length,
        }
    }

    /// Pointer handed to the facility. Stable for the life of the request.
    pub(crate) fn buffer_ptr(&mut self) -> *mut u8 {
        self.buffer.as_mut_ptr()
    }

    pub(crate) fn take_callback(&mut self) -> Option<Handler> {
        self.callback.take()
    }
}

impl std::fmt::Debug for AsyncFileRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncFileRequest")
            .field("fd", &self.fd())
            .field("kind", &self.kind)
            .field("release_policy", &self.release_policy())
            .field("requested_length", &self.requested_length)
            .field("offset", &self.offset)
            .field("path", &self.path_token)
            .field("has_callback", &self.has_callback())
            .finish()
    }
}
