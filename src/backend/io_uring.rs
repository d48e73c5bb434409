//! io_uring backend implementation.

use std::io;
use std::os::unix::io::RawFd;

use crate::backend::{capacity_exceeded, check_submission, nothing_in_flight, Backend, RawCompletion};
use crate::error::{AioError, Result};
use crate::operation::OperationKind;

#[cfg(target_os = "linux")]
use ::io_uring::{opcode, types, IoUring};

const NAME: &str = "io_uring";

/// io_uring-based facility.
///
/// Each operation is tagged with its descriptor as `user_data`, so the
/// completion queue reports `(fd, ret)` directly.
#[cfg(target_os = "linux")]
pub struct IoUringBackend {
    ring: IoUring,
    in_flight: usize,
    capacity: usize,
}

#[cfg(target_os = "linux")]
impl IoUringBackend {
    /// Create a ring with room for `entries` operations.
    pub fn new(entries: u32) -> Result<Self> {
        let ring = IoUring::new(entries).map_err(|source| AioError::Backend {
            backend: NAME,
            source,
        })?;
        Ok(Self {
            ring,
            in_flight: 0,
            capacity: entries as usize,
        })
    }

    fn collect(&mut self, max: usize) -> Vec<RawCompletion> {
        let mut completions = Vec::new();

        for cqe in self.ring.completion().take(max) {
            let fd = cqe.user_data() as RawFd;
            completions.push(RawCompletion::new(fd, i64::from(cqe.result())));
        }

        self.in_flight -= completions.len().min(self.in_flight);
        completions
    }
}

#[cfg(target_os = "linux")]
impl Backend for IoUringBackend {
    unsafe fn submit_operation(
        &mut self,
        kind: OperationKind,
        fd: RawFd,
        offset: u64,
        buffer_ptr: *mut u8,
        buffer_len: usize,
    ) -> Result<()> {
        check_submission(NAME, fd, buffer_ptr, buffer_len)?;
        if self.in_flight >= self.capacity {
            return Err(capacity_exceeded(self.in_flight, self.capacity));
        }

        let len = buffer_len as u32;
        let entry = match kind {
            OperationKind::Read => opcode::Read::new(types::Fd(fd), buffer_ptr, len)
                .offset(offset)
                .build()
                .user_data(fd as u64),
            OperationKind::Write => opcode::Write::new(types::Fd(fd), buffer_ptr, len)
                .offset(offset)
                .build()
                .user_data(fd as u64),
        };

        // SAFETY: the caller guarantees the buffer and descriptor outlive the
        // operation, which is all the entry refers to.
        unsafe {
            self.ring
                .submission()
                .push(&entry)
                .map_err(|_| capacity_exceeded(self.in_flight, self.capacity))?;
        }

        // The entry is visible to the kernel from here on; it is in flight even
        // if entering the ring fails, and the next enter picks it up.
        self.in_flight += 1;
        loop {
            match self.ring.submit() {
                Ok(_) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(AioError::SubmitDeferred {
                        backend: NAME,
                        source,
                    })
                }
            }
        }
    }

    fn try_complete(&mut self, max: usize) -> Result<Vec<RawCompletion>> {
        Ok(self.collect(max))
    }

    fn wait_for_completion(&mut self, max: usize) -> Result<Vec<RawCompletion>> {
        if self.in_flight == 0 {
            return Err(nothing_in_flight(NAME));
        }

        loop {
            match self.ring.submit_and_wait(1) {
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => {
                    return Err(AioError::Backend {
                        backend: NAME,
                        source,
                    })
                }
            }
        }

        Ok(self.collect(max))
    }

    fn operations_in_flight(&self) -> usize {
        self.in_flight
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn name(&self) -> &'static str {
        NAME
    }
}

/// Stub implementation for non-Linux platforms
#[cfg(not(target_os = "linux"))]
pub struct IoUringBackend;

#[cfg(not(target_os = "linux"))]
impl IoUringBackend {
    /// Always fails: io_uring is Linux-only.
    pub fn new(_entries: u32) -> Result<Self> {
        Err(AioError::Backend {
            backend: NAME,
            source: io::Error::new(
                io::ErrorKind::Unsupported,
                "io_uring is only supported on Linux",
            ),
        })
    }
}

#[cfg(not(target_os = "linux"))]
impl Backend for IoUringBackend {
    unsafe fn submit_operation(
        &mut self,
        _kind: OperationKind,
        fd: RawFd,
        _offset: u64,
        buffer_ptr: *mut u8,
        buffer_len: usize,
    ) -> Result<()> {
        check_submission(NAME, fd, buffer_ptr, buffer_len)?;
        Err(capacity_exceeded(0, 0))
    }

    fn try_complete(&mut self, _max: usize) -> Result<Vec<RawCompletion>> {
        Ok(Vec::new())
    }

    fn wait_for_completion(&mut self, _max: usize) -> Result<Vec<RawCompletion>> {
        Err(nothing_in_flight(NAME))
    }

    fn operations_in_flight(&self) -> usize {
        0
    }

    fn capacity(&self) -> usize {
        0
    }

    fn name(&self) -> &'static str {
        "io_uring (unsupported)"
    }
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom, Write};
    use std::os::unix::io::AsRawFd;

    fn ring_or_skip() -> Option<IoUringBackend> {
        match IoUringBackend::new(8) {
            Ok(ring) => Some(ring),
            Err(e) => {
                eprintln!("skipping io_uring test: {e}");
                None
            }
        }
    }

    #[test]
    fn read_reports_descriptor_and_length() {
        let Some(mut backend) = ring_or_skip() else {
            return;
        };
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"ring data").unwrap();
        file.seek(SeekFrom::Start(0)).unwrap();

        let mut buffer = vec![0u8; 64];
        unsafe {
            backend
                .submit_operation(
                    OperationKind::Read,
                    file.as_raw_fd(),
                    0,
                    buffer.as_mut_ptr(),
                    buffer.len(),
                )
                .unwrap();
        }
        assert_eq!(backend.operations_in_flight(), 1);

        let completions = backend.wait_for_completion(16).unwrap();
        assert_eq!(completions, vec![RawCompletion::new(file.as_raw_fd(), 9)]);
        assert_eq!(&buffer[..9], b"ring data");
        assert_eq!(backend.operations_in_flight(), 0);
    }

    #[test]
    fn bad_descriptor_completes_with_errno() {
        let Some(mut backend) = ring_or_skip() else {
            return;
        };
        let (read_end, write_end) = {
            let mut fds = [0; 2];
            assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
            (fds[0], fds[1])
        };
        unsafe { libc::close(write_end) };

        // Writing to the read end of a pipe fails with EBADF.
        let mut buffer = vec![1u8; 4];
        unsafe {
            backend
                .submit_operation(OperationKind::Write, read_end, 0, buffer.as_mut_ptr(), 4)
                .unwrap();
        }
        let completions = backend.wait_for_completion(16).unwrap();
        unsafe { libc::close(read_end) };

        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].ret, -(libc::EBADF as i64));
    }

    #[test]
    fn wait_with_nothing_in_flight_fails() {
        let Some(mut backend) = ring_or_skip() else {
            return;
        };
        assert!(backend.wait_for_completion(1).is_err());
        assert_eq!(backend.name(), "io_uring");
        assert_eq!(backend.capacity(), 8);
    }
}
