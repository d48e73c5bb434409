//! Worker-thread facility for systems without io_uring.
//!
//! Jobs go to a shared channel; each worker issues a blocking `pread` or
//! `pwrite` and posts the syscall result back as a [`RawCompletion`]. The
//! submitting side counts operations in flight, so the capacity bound holds
//! exactly as it does for the ring.

use std::io;
use std::os::unix::io::RawFd;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use log::{debug, warn};

use crate::backend::{capacity_exceeded, check_submission, nothing_in_flight, Backend, RawCompletion};
use crate::error::{AioError, Result};
use crate::operation::OperationKind;

const NAME: &str = "thread_pool";

/// Buffer pointer moved to a worker.
///
/// The submitter guarantees the buffer outlives the job, see
/// [`Backend::submit_operation`].
#[derive(Clone, Copy)]
struct SendPtr(*mut u8);

// SAFETY: the pointer is only dereferenced by the one worker running the job,
// while the submitter keeps the buffer alive and untouched.
unsafe impl Send for SendPtr {}

struct Job {
    kind: OperationKind,
    fd: RawFd,
    offset: u64,
    buffer: SendPtr,
    len: usize,
}

impl Job {
    fn run(self) -> RawCompletion {
        let offset = self.offset as libc::off_t;
        loop {
            // SAFETY: buffer validity and length are guaranteed by the submitter.
            let ret = unsafe {
                match self.kind {
                    OperationKind::Read => {
                        libc::pread(self.fd, self.buffer.0.cast(), self.len, offset)
                    }
                    OperationKind::Write => {
                        libc::pwrite(self.fd, self.buffer.0.cast(), self.len, offset)
                    }
                }
            };

            if ret >= 0 {
                return RawCompletion::new(self.fd, ret as i64);
            }

            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            let code = err.raw_os_error().unwrap_or(libc::EIO);
            return RawCompletion::new(self.fd, -i64::from(code));
        }
    }
}

/// Facility backed by a fixed set of worker threads.
pub struct ThreadPoolBackend {
    jobs: Option<Sender<Job>>,
    done: Receiver<RawCompletion>,
    workers: Vec<JoinHandle<()>>,
    in_flight: usize,
    capacity: usize,
}

impl ThreadPoolBackend {
    /// Spawn `worker_threads` workers accepting up to `capacity` operations in flight.
    pub fn new(worker_threads: usize, capacity: usize) -> Result<Self> {
        if worker_threads == 0 {
            return Err(AioError::InvalidConfig(
                "thread pool needs at least one worker".to_string(),
            ));
        }
        if capacity == 0 {
            return Err(AioError::InvalidConfig(
                "thread pool capacity must be non-zero".to_string(),
            ));
        }

        let (job_tx, job_rx) = unbounded::<Job>();
        let (done_tx, done_rx) = unbounded::<RawCompletion>();

        let mut workers = Vec::with_capacity(worker_threads);
        for id in 0..worker_threads {
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("safer-aio-worker-{id}"))
                .spawn(move || {
                    while let Ok(job) = jobs.recv() {
                        if done.send(job.run()).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|source| AioError::Backend {
                    backend: NAME,
                    source,
                })?;
            workers.push(handle);
        }
        debug!("started {worker_threads} I/O workers, capacity {capacity}");

        Ok(Self {
            jobs: Some(job_tx),
            done: done_rx,
            workers,
            in_flight: 0,
            capacity,
        })
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn disconnected() -> AioError {
        AioError::Backend {
            backend: NAME,
            source: io::Error::new(io::ErrorKind::BrokenPipe, "worker threads exited"),
        }
    }

    fn drain(&mut self, mut completions: Vec<RawCompletion>, max: usize) -> Vec<RawCompletion> {
        while completions.len() < max {
            match self.done.try_recv() {
                Ok(completion) => completions.push(completion),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        self.in_flight -= completions.len().min(self.in_flight);
        completions
    }
}

impl Backend for ThreadPoolBackend {
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

        let job = Job {
            kind,
            fd,
            offset,
            buffer: SendPtr(buffer_ptr),
            len: buffer_len,
        };
        let jobs = self.jobs.as_ref().ok_or_else(Self::disconnected)?;
        jobs.send(job).map_err(|_| Self::disconnected())?;
        self.in_flight += 1;

        Ok(())
    }

    fn try_complete(&mut self, max: usize) -> Result<Vec<RawCompletion>> {
        Ok(self.drain(Vec::new(), max))
    }

    fn wait_for_completion(&mut self, max: usize) -> Result<Vec<RawCompletion>> {
        if self.in_flight == 0 {
            return Err(nothing_in_flight(NAME));
        }

        let first = self.done.recv().map_err(|_| Self::disconnected())?;
        Ok(self.drain(vec![first], max.max(1)))
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

impl Drop for ThreadPoolBackend {
    fn drop(&mut self) {
        // Closing the job channel lets workers finish what is queued and exit.
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.join() {
                warn!("I/O worker panicked: {e:?}");
            }
        }
    }
}
