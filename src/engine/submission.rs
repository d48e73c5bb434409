//! Submission paths.
//!
//! Every path validates and allocates before touching the registry, and
//! unwinds the registry entry if the facility refuses the operation, so a
//! failed submission leaves no descriptor open and nothing registered. An
//! operation the facility queued but could not enter yet stays registered
//! until its completion is dispatched.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use log::{debug, warn};

use crate::buffer::{AllocationStrategy, IoBuffer};
use crate::error::{AioError, Result};
use crate::operation::{
    AsyncFileRequest, Descriptor, HandlerResult, OperationKind, ReadHandler, ReadOutcome,
    WriteHandler, WriteOutcome,
};

use super::{AioEngine, EngineShared};

impl AioEngine {
    /// Read the whole of `path` and hand its bytes to `on_read`.
    ///
    /// The file is opened, stat'ed and sized inline; the transfer itself
    /// completes on the reactor. Returns the descriptor the request is
    /// registered under.
    ///
    /// # Errors
    ///
    /// - [`AioError::Open`] / [`AioError::Stat`] when the file is unusable
    /// - [`AioError::EmptyFile`] for a zero-length file
    /// - [`AioError::FileTooLarge`] above `transfer.max_file_size`
    /// - [`AioError::Allocation`], [`AioError::CapacityExceeded`],
    ///   [`AioError::Backend`] from the lower layers
    pub fn read_file<P, F>(&self, path: P, on_read: F) -> Result<RawFd>
    where
        P: AsRef<Path>,
        F: FnOnce(ReadOutcome<'_>) -> HandlerResult + Send + 'static,
    {
        let path = path.as_ref();
        let transfer = &self.shared.config.transfer;

        let file = open_for_read(path, transfer.direct_io).map_err(|source| AioError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let size = file
            .metadata()
            .map_err(|source| AioError::Stat {
                path: path.to_path_buf(),
                source,
            })?
            .len();

        if size == 0 {
            return Err(AioError::EmptyFile {
                path: path.to_path_buf(),
            });
        }
        if size > transfer.max_file_size as u64 {
            return Err(AioError::FileTooLarge {
                path: path.to_path_buf(),
                size,
                max: transfer.max_file_size,
            });
        }

        let buffer = IoBuffer::allocate(
            size as usize,
            AllocationStrategy::for_reads(transfer.direct_io),
        )?;
        let on_read: ReadHandler = Box::new(on_read);
        let request =
            AsyncFileRequest::read(OwnedFd::from(file).into(), buffer, 0, path, Some(on_read));
        self.shared.submit(request)
    }

    /// Replace the contents of `path` with `data`, without a completion callback.
    pub fn write_file<P: AsRef<Path>>(&self, path: P, data: &[u8]) -> Result<RawFd> {
        self.write_whole_file(path.as_ref(), data, None)
    }

    /// Replace the contents of `path` with `data` and call `on_written` when done.
    ///
    /// `data` is copied; the caller may drop it as soon as this returns.
    ///
    /// # Errors
    ///
    /// - [`AioError::EmptyPayload`] for empty `data`
    /// - [`AioError::PayloadTooLarge`] above `transfer.max_file_size`
    /// - [`AioError::Open`] if the file cannot be created or truncated
    pub fn write_file_with<P, F>(&self, path: P, data: &[u8], on_written: F) -> Result<RawFd>
    where
        P: AsRef<Path>,
        F: FnOnce(WriteOutcome<'_>) -> HandlerResult + Send + 'static,
    {
        let on_written: WriteHandler = Box::new(on_written);
        self.write_whole_file(path.as_ref(), data, Some(on_written))
    }

    fn write_whole_file(
        &self,
        path: &Path,
        data: &[u8],
        on_written: Option<WriteHandler>,
    ) -> Result<RawFd> {
        let transfer = &self.shared.config.transfer;
        check_payload(data, transfer.max_file_size)?;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(transfer.file_mode)
            .open(path)
            .map_err(|source| AioError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let buffer = IoBuffer::copy_from(data, AllocationStrategy::for_writes())?;
        let request =
            AsyncFileRequest::write(OwnedFd::from(file).into(), buffer, 0, path, on_written);
        self.shared.submit(request)
    }

    /// Read `len` bytes at `offset` from a descriptor the caller keeps open.
    ///
    /// `name` is handed back to the callback in place of a path. The engine
    /// never closes `fd`; it must stay open until the callback has run.
    pub fn read_at<N, F>(
        &self,
        fd: RawFd,
        len: usize,
        offset: u64,
        name: N,
        on_read: F,
    ) -> Result<()>
    where
        N: Into<PathBuf>,
        F: FnOnce(ReadOutcome<'_>) -> HandlerResult + Send + 'static,
    {
        let transfer = &self.shared.config.transfer;
        check_descriptor(fd)?;
        if len == 0 || len > transfer.max_file_size {
            return Err(AioError::InvalidLength {
                len,
                max: transfer.max_file_size,
            });
        }

        let buffer = IoBuffer::allocate(len, AllocationStrategy::for_reads(transfer.direct_io))?;
        let on_read: ReadHandler = Box::new(on_read);
        let request =
            AsyncFileRequest::read(Descriptor::Borrowed(fd), buffer, offset, name, Some(on_read));
        self.shared.submit(request).map(drop)
    }

    /// Write `data` at `offset` to a descriptor the caller keeps open.
    pub fn write_at<N, F>(
        &self,
        fd: RawFd,
        data: &[u8],
        offset: u64,
        name: N,
        on_written: F,
    ) -> Result<()>
    where
        N: Into<PathBuf>,
        F: FnOnce(WriteOutcome<'_>) -> HandlerResult + Send + 'static,
    {
        check_descriptor(fd)?;
        let max = self.shared.config.transfer.max_file_size;
        if data.is_empty() || data.len() > max {
            return Err(AioError::InvalidLength {
                len: data.len(),
                max,
            });
        }

        let buffer = IoBuffer::copy_from(data, AllocationStrategy::for_writes())?;
        let on_written: WriteHandler = Box::new(on_written);
        let request = AsyncFileRequest::write(
            Descriptor::Borrowed(fd),
            buffer,
            offset,
            name,
            Some(on_written),
        );
        self.shared.submit(request).map(drop)
    }
}

impl EngineShared {
    /// Register `request` and hand it to the facility.
    pub(crate) fn submit(self: &Arc<Self>, mut request: AsyncFileRequest) -> Result<RawFd> {
        let fd = request.fd();
        let kind = request.kind();
        let offset = request.offset();
        let len = request.transfer_len();
        // The buffer is heap-backed, so the pointer survives the move into the registry.
        let ptr = request.buffer_ptr();

        self.registry.lock().insert(request)?;

        let submitted = self
            .ensure_started()
            .and_then(|()| self.submit_to_facility(kind, fd, offset, ptr, len));
        match submitted {
            Ok(()) => {}
            // Queued with the facility: the entry stays until its completion.
            Err(AioError::SubmitDeferred { backend, source }) => {
                warn!("{kind} on fd={fd} queued on {backend} but not yet entered: {source}");
            }
            Err(e) => {
                // Dropping the entry closes an owned descriptor and frees the buffer.
                self.registry.lock().take(fd);
                debug!("{kind} on fd={fd} not submitted: {e}");
                return Err(e);
            }
        }

        self.stats.record_submission(kind);
        debug!("submitted {kind} of {len} bytes on fd={fd}");
        Ok(fd)
    }

    fn submit_to_facility(
        &self,
        kind: OperationKind,
        fd: RawFd,
        offset: u64,
        ptr: *mut u8,
        len: usize,
    ) -> Result<()> {
        let mut facility = self.facility.lock();
        let backend = facility.backend.as_mut().ok_or_else(|| {
            AioError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "asynchronous I/O facility is not running",
            ))
        })?;

        // SAFETY: the buffer belongs to a registered request. It is freed only
        // after its completion is dispatched, after the facility has drained on
        // engine drop, or by `submit` when this call fails.
        let result = unsafe { backend.submit_operation(kind, fd, offset, ptr, len) };
        self.in_flight
            .store(backend.operations_in_flight(), Ordering::Release);
        result
    }
}

fn open_for_read(path: &Path, direct_io: bool) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true);

    #[cfg(target_os = "linux")]
    if direct_io {
        options.custom_flags(libc::O_DIRECT);
    }
    #[cfg(not(target_os = "linux"))]
    let _ = direct_io;

    options.open(path)
}

fn check_payload(data: &[u8], max: usize) -> Result<()> {
    if data.is_empty() {
        return Err(AioError::EmptyPayload);
    }
    if data.len() > max {
        return Err(AioError::PayloadTooLarge {
            size: data.len(),
            max,
        });
    }
    Ok(())
}

fn check_descriptor(fd: RawFd) -> Result<()> {
    if fd < 0 {
        return Err(AioError::InvalidDescriptor { fd });
    }
    Ok(())
}
