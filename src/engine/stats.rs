//! Engine statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::CompletionError;
use crate::operation::{OperationKind, ReleasePolicy};

/// Point-in-time counters for one engine.
///
/// Counters are monotonic since engine creation; `pending` and `in_flight`
/// are gauges sampled when the snapshot was taken.
///
/// # Examples
///
/// ```rust
/// # use safer_aio::EngineStats;
/// let stats = EngineStats {
///     reads_submitted: 3,
///     writes_submitted: 1,
///     completions: 4,
///     io_failures: 1,
///     ..EngineStats::default()
/// };
/// assert_eq!(stats.submitted(), 4);
/// assert_eq!(stats.completion_errors(), 1);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Reads handed to the facility
    pub reads_submitted: u64,
    /// Writes handed to the facility
    pub writes_submitted: u64,
    /// Completions that matched a pending request
    pub completions: u64,
    /// Completions with no pending request
    pub missing_requests: u64,
    /// Reads completed without a callback
    pub missing_callbacks: u64,
    /// Transfers the kernel reported as failed
    pub io_failures: u64,
    /// Transfers that moved fewer bytes than requested
    pub short_transfers: u64,
    /// Callbacks that returned an error or panicked
    pub callback_failures: u64,
    /// Bytes delivered to read callbacks
    pub bytes_read: u64,
    /// Bytes reported written
    pub bytes_written: u64,
    /// Descriptors closed on release
    pub descriptors_closed: u64,
    /// Request buffers freed
    pub buffers_released: u64,
    /// Requests currently registered
    pub pending: usize,
    /// Operations currently held by the facility
    pub in_flight: usize,
}

impl EngineStats {
    /// Total submissions of either kind.
    pub fn submitted(&self) -> u64 {
        self.reads_submitted + self.writes_submitted
    }

    /// Fatal completion-time reports. Short transfers are not counted.
    pub fn completion_errors(&self) -> u64 {
        self.missing_requests + self.missing_callbacks + self.io_failures + self.callback_failures
    }
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    reads_submitted: AtomicU64,
    writes_submitted: AtomicU64,
    completions: AtomicU64,
    missing_requests: AtomicU64,
    missing_callbacks: AtomicU64,
    io_failures: AtomicU64,
    short_transfers: AtomicU64,
    callback_failures: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    descriptors_closed: AtomicU64,
    buffers_released: AtomicU64,
}

fn bump(counter: &AtomicU64, by: u64) {
    counter.fetch_add(by, Ordering::Relaxed);
}

impl StatsCounters {
    pub(crate) fn record_submission(&self, kind: OperationKind) {
        match kind {
            OperationKind::Read => bump(&self.reads_submitted, 1),
            OperationKind::Write => bump(&self.writes_submitted, 1),
        }
    }

    pub(crate) fn record_completion(&self) {
        bump(&self.completions, 1);
    }

    pub(crate) fn record_transfer(&self, kind: OperationKind, bytes: usize) {
        match kind {
            OperationKind::Read => bump(&self.bytes_read, bytes as u64),
            OperationKind::Write => bump(&self.bytes_written, bytes as u64),
        }
    }

    pub(crate) fn record_error(&self, error: &CompletionError) {
        let counter = match error {
            CompletionError::MissingRequest { .. } => &self.missing_requests,
            CompletionError::MissingCallback { .. } => &self.missing_callbacks,
            CompletionError::IoCompletion { .. } => &self.io_failures,
            CompletionError::ShortTransfer { .. } => &self.short_transfers,
            CompletionError::CallbackInvocation { .. } => &self.callback_failures,
        };
        bump(counter, 1);
    }

    pub(crate) fn record_release(&self, policy: ReleasePolicy) {
        bump(&self.buffers_released, 1);
        if policy == ReleasePolicy::OneShot {
            bump(&self.descriptors_closed, 1);
        }
    }

    pub(crate) fn snapshot(&self, pending: usize, in_flight: usize) -> EngineStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        EngineStats {
            reads_submitted: load(&self.reads_submitted),
            writes_submitted: load(&self.writes_submitted),
            completions: load(&self.completions),
            missing_requests: load(&self.missing_requests),
            missing_callbacks: load(&self.missing_callbacks),
            io_failures: load(&self.io_failures),
            short_transfers: load(&self.short_transfers),
            callback_failures: load(&self.callback_failures),
            bytes_read: load(&self.bytes_read),
            bytes_written: load(&self.bytes_written),
            descriptors_closed: load(&self.descriptors_closed),
            buffers_released: load(&self.buffers_released),
            pending,
            in_flight,
        }
    }
}
