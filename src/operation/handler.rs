//! Completion handlers and the values they receive.

use std::path::Path;

/// Value returned by completion handlers.
///
/// An `Err` is reported as a callback failure; it never causes a retry.
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Handler invoked when a read completes.
pub type ReadHandler = Box<dyn FnOnce(ReadOutcome<'_>) -> HandlerResult + Send>;

/// Handler invoked when a write completes.
pub type WriteHandler = Box<dyn FnOnce(WriteOutcome<'_>) -> HandlerResult + Send>;

/// A stored completion handler, one signature per operation kind.
pub enum Handler {
    /// Receives the path and the bytes read
    Read(ReadHandler),
    /// Receives the path
    Write(WriteHandler),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Read(_) => f.write_str("Handler::Read"),
            Handler::Write(_) => f.write_str("Handler::Write"),
        }
    }
}

/// What a read handler sees.
///
/// `content` borrows the request buffer. The buffer is freed as soon as the
/// handler returns, so copy anything that must outlive the call.
#[derive(Debug, Clone, Copy)]
pub struct ReadOutcome<'a> {
    path: &'a Path,
    content: &'a [u8],
    requested: usize,
}

impl<'a> ReadOutcome<'a> {
    pub(crate) fn new(path: &'a Path, content: &'a [u8], requested: usize) -> Self {
        Self {
            path,
            content,
            requested,
        }
    }

    /// Path or name the request was submitted with.
    pub fn path(&self) -> &'a Path {
        self.path
    }

    /// Bytes actually transferred.
    pub fn content(&self) -> &'a [u8] {
        self.content
    }

    /// Number of bytes transferred.
    pub fn transferred(&self) -> usize {
        self.content.len()
    }

    /// Number of bytes requested.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// True if fewer bytes arrived than were requested.
    pub fn is_short(&self) -> bool {
        self.content.len() < self.requested
    }
}

/// What a write handler sees.
#[derive(Debug, Clone, Copy)]
pub struct WriteOutcome<'a> {
    path: &'a Path,
    written: usize,
    requested: usize,
}

impl<'a> WriteOutcome<'a> {
    pub(crate) fn new(path: &'a Path, written: usize, requested: usize) -> Self {
        Self {
            path,
            written,
            requested,
        }
    }

    /// Path or name the request was submitted with.
    pub fn path(&self) -> &'a Path {
        self.path
    }

    /// Number of bytes written.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Number of bytes requested.
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// True if fewer bytes were written than requested.
    pub fn is_short(&self) -> bool {
        self.written < self.requested
    }
}
