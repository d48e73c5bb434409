//! # Safer-AIO: one-shot asynchronous file I/O on a host event loop
//!
//! Whole-file reads and writes that complete through callbacks. A submission
//! opens and sizes the file inline, parks the request in a descriptor-keyed
//! registry and hands the transfer to an asynchronous I/O facility; the host's
//! event loop later drains the facility and the engine runs the callback,
//! then frees the buffer and closes the descriptor.
//!
//! ## Key Features
//!
//! - **Two facilities**: io_uring on Linux, or a worker pool issuing
//!   `pread`/`pwrite` where io_uring is unavailable
//! - **Lazy bootstrap**: the facility is created and registered with the
//!   reactor on first use, exactly once per engine
//! - **Bounded**: at most `max_events` operations in flight; anything beyond
//!   fails synchronously with [`AioError::CapacityExceeded`]
//! - **Leak-free**: every submission failure and every completion path
//!   releases the request's buffer and descriptor
//! - **Contained failures**: completion-time anomalies, including panicking
//!   callbacks, are logged, counted and reported without disturbing other
//!   requests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use safer_aio::{AioConfig, AioEngine, EventLoop};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let event_loop = EventLoop::new();
//! let engine = AioEngine::new(event_loop.reactor(), AioConfig::default())?;
//!
//! engine.write_file("/tmp/greeting.txt", b"hello")?;
//! event_loop.run()?;
//!
//! engine.read_file("/tmp/greeting.txt", |outcome| {
//!     assert_eq!(outcome.content(), b"hello");
//!     Ok(())
//! })?;
//! event_loop.run()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use safer_aio::{BackendKind, ConfigBuilder};
//!
//! let config = ConfigBuilder::new()
//!     .backend(BackendKind::ThreadPool)
//!     .worker_threads(2)
//!     .max_events(32)
//!     .max_file_size(1 << 20)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.facility.max_events, 32);
//! ```
//!
//! ## Platform Support
//!
//! - **Linux 5.1+**: io_uring, with automatic fallback to the worker pool when
//!   the ring cannot be created (for example under seccomp)
//! - **Other Unix**: worker pool only
//!
//! Descriptors passed to [`AioEngine::read_at`] and [`AioEngine::write_at`]
//! are used as given. The caller owns them and must keep them open until the
//! callback has run.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod backend; // io_uring and worker-pool facilities
pub mod buffer;
pub mod config;
pub mod engine; // Submission, bootstrap and completion dispatch
pub mod error;
pub mod logging;
pub mod operation;
pub mod reactor; // Event loop integration
pub mod registry; // Pending requests keyed by descriptor

pub use backend::{is_io_uring_available, Backend, RawCompletion};
pub use buffer::{AllocationStrategy, IoBuffer};
pub use config::{AioConfig, BackendKind, ConfigBuilder, FacilityConfig, TransferConfig};
pub use engine::{AioEngine, EngineStats};
pub use error::{AioError, CompletionError, DuplicateKey, Result};
pub use logging::initialize_logger;
pub use operation::{
    HandlerResult, OperationKind, ReadHandler, ReadOutcome, ReleasePolicy, WriteHandler,
    WriteOutcome,
};
pub use reactor::{CompletionSource, EventLoop, Reactor, SourceId};
pub use registry::PendingRegistry;
