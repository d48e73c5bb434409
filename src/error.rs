//! Error types for submission and completion of asynchronous file requests.
//!
//! Two families exist because they travel differently:
//!
//! - [`AioError`] is returned synchronously from every submission call. It aborts
//!   that one submission and never affects the engine or other pending requests.
//! - [`CompletionError`] describes an anomaly detected while dispatching a kernel
//!   completion. It is never returned to a caller; the dispatcher logs it, counts
//!   it in [`EngineStats`](crate::EngineStats) and forwards it to the optional
//!   error reporter, then moves on to the next completion.

use std::io;
use std::os::unix::io::RawFd;
use std::path::PathBuf;

use thiserror::Error;

use crate::operation::OperationKind;

/// Result type alias for safer-aio operations.
pub type Result<T> = std::result::Result<T, AioError>;

/// A second request was submitted on a descriptor that already has one pending.
///
/// Returned by [`PendingRegistry::insert`](crate::PendingRegistry::insert). The
/// live request is left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("descriptor {fd} already has a pending request")]
pub struct DuplicateKey {
    /// The descriptor that was already registered
    pub fd: RawFd,
}

/// Errors reported synchronously by submission and configuration calls.
#[derive(Debug, Error)]
pub enum AioError {
    /// The I/O buffer could not be allocated.
    #[error("failed to allocate a {size} byte I/O buffer")]
    Allocation {
        /// Requested buffer size in bytes
        size: usize,
    },

    /// The target path could not be opened.
    #[error("failed to open {}: {source}", path.display())]
    Open {
        /// Path passed to the submission call
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// The opened file could not be stat'ed.
    #[error("failed to stat {}: {source}", path.display())]
    Stat {
        /// Path passed to the submission call
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// A whole-file read targeted an empty file.
    #[error("{} is empty", path.display())]
    EmptyFile {
        /// Path passed to the submission call
        path: PathBuf,
    },

    /// A whole-file read targeted a file above the configured ceiling.
    #[error("{} is {size} bytes, above the {max} byte limit for whole-file reads", path.display())]
    FileTooLarge {
        /// Path passed to the submission call
        path: PathBuf,
        /// Size reported by fstat
        size: u64,
        /// Configured ceiling
        max: usize,
    },

    /// A write was submitted with no bytes.
    #[error("write payload is empty")]
    EmptyPayload,

    /// A write payload exceeds the configured ceiling.
    #[error("write payload of {size} bytes is above the {max} byte limit")]
    PayloadTooLarge {
        /// Payload length
        size: usize,
        /// Configured ceiling
        max: usize,
    },

    /// The request could not be registered.
    #[error("failed to register request: {0}")]
    Registration(#[from] DuplicateKey),

    /// A descriptor-level call was given a negative descriptor.
    #[error("invalid file descriptor {fd}")]
    InvalidDescriptor {
        /// The rejected descriptor
        fd: RawFd,
    },

    /// A descriptor-level call asked for zero bytes or more than the ceiling.
    #[error("transfer length {len} is outside 1..={max}")]
    InvalidLength {
        /// Requested length
        len: usize,
        /// Configured ceiling
        max: usize,
    },

    /// Submitting would exceed the facility's in-flight event capacity.
    #[error("{in_flight} of {capacity} completion slots in use")]
    CapacityExceeded {
        /// Operations currently in flight
        in_flight: usize,
        /// Configured maximum
        capacity: usize,
    },

    /// The asynchronous I/O facility rejected or failed an operation.
    #[error("{backend} backend error: {source}")]
    Backend {
        /// Backend name
        backend: &'static str,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The operation was queued but the facility could not hand it over yet.
    ///
    /// The operation counts as in flight and still completes; its buffer and
    /// descriptor must stay alive until then.
    #[error("{backend} queued the operation but could not submit it yet: {source}")]
    SubmitDeferred {
        /// Backend name
        backend: &'static str,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Standard I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Anomalies detected while dispatching a completion.
///
/// Only [`ShortTransfer`](Self::ShortTransfer) lets the callback run; every
/// other variant ends processing of that completion after the request's
/// resources are released.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The facility reported a completion for a descriptor with no pending request.
    #[error("completion for descriptor {fd} has no pending request")]
    MissingRequest {
        /// Descriptor carried by the completion
        fd: RawFd,
    },

    /// A read completed but no callback was registered to consume it.
    #[error("read on descriptor {fd} completed without a callback")]
    MissingCallback {
        /// Descriptor of the request
        fd: RawFd,
    },

    /// The kernel reported the transfer as failed.
    #[error("{kind} on descriptor {fd} failed: {source}")]
    IoCompletion {
        /// Descriptor of the request
        fd: RawFd,
        /// Operation that failed
        kind: OperationKind,
        /// Positive errno
        code: i32,
        /// The errno as an `io::Error`
        #[source]
        source: io::Error,
    },

    /// Fewer bytes than requested were transferred. Non-fatal.
    #[error("{kind} on descriptor {fd} transferred {transferred} of {requested} bytes")]
    ShortTransfer {
        /// Descriptor of the request
        fd: RawFd,
        /// Operation that came up short
        kind: OperationKind,
        /// Bytes actually transferred
        transferred: usize,
        /// Bytes requested
        requested: usize,
    },

    /// The user callback returned an error or panicked.
    #[error("{kind} callback for descriptor {fd} failed: {reason}")]
    CallbackInvocation {
        /// Descriptor of the request
        fd: RawFd,
        /// Operation whose callback failed
        kind: OperationKind,
        /// Error message or panic payload
        reason: String,
    },
}

impl CompletionError {
    /// Build an [`IoCompletion`](Self::IoCompletion) from a negated errno.
    pub(crate) fn from_ret(fd: RawFd, kind: OperationKind, ret: i64) -> Self {
        let code = i32::try_from(-ret).unwrap_or(libc::EIO);
        CompletionError::IoCompletion {
            fd,
            kind,
            code,
            source: io::Error::from_raw_os_error(code),
        }
    }

    /// Whether the anomaly ends processing of its completion before the callback runs.
    pub fn is_fatal_for_request(&self) -> bool {
        !matches!(self, CompletionError::ShortTransfer { .. })
    }

    /// Descriptor the anomaly refers to.
    pub fn fd(&self) -> RawFd {
        match *self {
            CompletionError::MissingRequest { fd }
            | CompletionError::MissingCallback { fd }
            | CompletionError::IoCompletion { fd, .. }
            | CompletionError::ShortTransfer { fd, .. }
            | CompletionError::CallbackInvocation { fd, .. } => fd,
        }
    }
}

// Errors cross the reactor thread boundary inside reporters and worker results.
static_assertions::assert_impl_all!(AioError: Send, Sync);
static_assertions::assert_impl_all!(CompletionError: Send, Sync);
