//! Asynchronous I/O facilities.
//!
//! A [`Backend`] accepts positional reads and writes against raw descriptors and
//! later reports each one as a [`RawCompletion`]: the descriptor it ran on and a
//! signed result, negative errno on failure or bytes transferred on success.
//!
//! # Backend Types
//!
//! - **io_uring** ([`IoUringBackend`]): kernel-native asynchronous I/O, Linux 5.1+
//! - **thread pool** ([`ThreadPoolBackend`]): worker threads issuing `pread` /
//!   `pwrite`, available wherever io_uring is not (older kernels, seccomp-
//!   restricted containers, non-Linux Unix)
//!
//! Both bound the number of operations in flight; a submission past that bound
//! fails with [`AioError::CapacityExceeded`] instead of being dropped.

use std::io;
use std::os::unix::io::RawFd;

use log::debug;

use crate::config::{AioConfig, BackendKind};
use crate::error::{AioError, Result};
use crate::operation::OperationKind;

pub mod io_uring;
pub mod thread_pool;

pub use self::io_uring::IoUringBackend;
pub use self::thread_pool::ThreadPoolBackend;

/// A finished operation as reported by the facility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCompletion {
    /// Descriptor the operation ran on
    pub fd: RawFd,
    /// Negative errno, or bytes transferred
    pub ret: i64,
}

impl RawCompletion {
    /// Build a completion from a syscall-style return value.
    pub fn new(fd: RawFd, ret: i64) -> Self {
        Self { fd, ret }
    }

    /// Returns true if the operation failed.
    pub fn is_error(&self) -> bool {
        self.ret < 0
    }
}

/// Trait for asynchronous I/O facilities.
///
/// Completions are identified by descriptor, so callers must never have two
/// operations in flight on the same descriptor.
pub trait Backend: Send {
    /// Queue a transfer and hand it to the kernel or a worker.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - `buffer_ptr` points to at least `buffer_len` bytes, writable for reads
    /// - the buffer stays valid and unmoved until the matching completion is
    ///   returned from [`try_complete`](Self::try_complete) or
    ///   [`wait_for_completion`](Self::wait_for_completion)
    /// - `fd` stays open until then, and has no other operation in flight
    ///
    /// # Errors
    ///
    /// - [`AioError::CapacityExceeded`] when `capacity()` operations are in flight
    /// - [`AioError::Backend`] when the facility rejects the operation
    /// - [`AioError::SubmitDeferred`] when the operation was queued but not yet
    ///   handed over; it counts as in flight and completes like any other, so
    ///   the safety requirements above still hold
    unsafe fn submit_operation(
        &mut self,
        kind: OperationKind,
        fd: RawFd,
        offset: u64,
        buffer_ptr: *mut u8,
        buffer_len: usize,
    ) -> Result<()>;

    /// Collect up to `max` finished operations without blocking.
    fn try_complete(&mut self, max: usize) -> Result<Vec<RawCompletion>>;

    /// Block until at least one operation finishes, then collect up to `max`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidInput` I/O error if nothing is in flight.
    fn wait_for_completion(&mut self, max: usize) -> Result<Vec<RawCompletion>>;

    /// Operations submitted and not yet collected.
    fn operations_in_flight(&self) -> usize;

    /// Maximum operations in flight.
    fn capacity(&self) -> usize;

    /// Backend name for logs and errors.
    fn name(&self) -> &'static str;
}

/// Returns true if an io_uring instance can be created on this system.
///
/// io_uring is often disabled by seccomp in containers even on new kernels.
pub fn is_io_uring_available() -> bool {
    #[cfg(target_os = "linux")]
    {
        IoUringBackend::new(2).is_ok()
    }

    #[cfg(not(target_os = "linux"))]
    {
        false
    }
}

/// Create the facility selected by `config`.
///
/// [`BackendKind::Auto`] tries io_uring first and falls back to the thread
/// pool if the ring cannot be created.
pub fn create_backend(config: &AioConfig) -> Result<Box<dyn Backend>> {
    let facility = &config.facility;

    match facility.backend {
        BackendKind::IoUring => Ok(Box::new(IoUringBackend::new(facility.max_events)?)),
        BackendKind::ThreadPool => Ok(Box::new(ThreadPoolBackend::new(
            facility.worker_threads,
            facility.max_events as usize,
        )?)),
        BackendKind::Auto => match IoUringBackend::new(facility.max_events) {
            Ok(backend) => Ok(Box::new(backend)),
            Err(e) => {
                debug!("io_uring unavailable ({e}), falling back to thread pool");
                Ok(Box::new(ThreadPoolBackend::new(
                    facility.worker_threads,
                    facility.max_events as usize,
                )?))
            }
        },
    }
}

pub(crate) fn nothing_in_flight(backend: &'static str) -> AioError {
    AioError::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{backend}: no operations in flight to wait for"),
    ))
}

pub(crate) fn capacity_exceeded(in_flight: usize, capacity: usize) -> AioError {
    AioError::CapacityExceeded {
        in_flight,
        capacity,
    }
}

/// Check the arguments every facility needs before touching the kernel.
pub(crate) fn check_submission(
    backend: &'static str,
    fd: RawFd,
    buffer_ptr: *mut u8,
    buffer_len: usize,
) -> Result<()> {
    if fd < 0 {
        return Err(AioError::InvalidDescriptor { fd });
    }
    if buffer_ptr.is_null() || buffer_len == 0 || buffer_len > u32::MAX as usize {
        return Err(AioError::Backend {
            backend,
            source: io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid buffer of {buffer_len} bytes"),
            ),
        });
    }
    Ok(())
}
