//! Request records and completion handlers.
//!
//! An [`AsyncFileRequest`] is created by the submission layer, parked in the
//! [`PendingRegistry`](crate::PendingRegistry) while the facility works on it,
//! and consumed by the dispatcher when its completion arrives. Its
//! [`Handler`] is a boxed closure whose signature is fixed by the operation
//! kind, so dispatch is a direct call with no lookup.
//!
//! ```rust
//! use safer_aio::operation::{ReadHandler, ReadOutcome};
//!
//! let on_read: ReadHandler = Box::new(|outcome: ReadOutcome<'_>| {
//!     println!("{}: {} bytes", outcome.path().display(), outcome.transferred());
//!     Ok(())
//! });
//! # drop(on_read);
//! ```

pub mod handler;
pub mod request;
pub mod types;

pub use handler::{Handler, HandlerResult, ReadHandler, ReadOutcome, WriteHandler, WriteOutcome};
pub use request::{AsyncFileRequest, Descriptor};
pub use types::{OperationKind, ReleasePolicy};
