//! Host event loop integration.
//!
//! The engine does not own a loop. It registers itself with a [`Reactor`] as a
//! [`CompletionSource`] and the reactor calls back into it whenever the host
//! decides to drain I/O completions. [`EventLoop`] is the minimal reactor this
//! crate ships with; hosts with their own loop implement [`Reactor`] instead.
//!
//! # Example
//!
//! ```rust,no_run
//! use safer_aio::{AioConfig, AioEngine, EventLoop};
//!
//! # fn main() -> safer_aio::Result<()> {
//! let event_loop = EventLoop::new();
//! let engine = AioEngine::new(event_loop.reactor(), AioConfig::default())?;
//!
//! engine.read_file("/etc/hostname", |outcome| {
//!     println!("{} bytes", outcome.content().len());
//!     Ok(())
//! })?;
//!
//! event_loop.run()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::error::Result;

/// Handle returned by [`Reactor::register_completion_source`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Raw identifier value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Something that produces completion events for the reactor to deliver.
pub trait CompletionSource: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Operations submitted and not yet dispatched.
    fn in_flight(&self) -> usize;

    /// Dispatch up to `max_events` completions.
    ///
    /// With `block` set, waits until at least one is available, provided
    /// something is in flight. Returns how many were dispatched.
    fn poll_completions(&self, max_events: usize, block: bool) -> Result<usize>;
}

/// The narrow surface the engine needs from a host event loop.
pub trait Reactor: Send + Sync {
    /// Register `source`, draining at most `max_events` completions per turn.
    ///
    /// The reactor may poll `source` before this returns.
    fn register_completion_source(
        &self,
        max_events: usize,
        source: Arc<dyn CompletionSource>,
    ) -> Result<SourceId>;

    /// Remove a source. Unknown ids are ignored.
    fn deregister_completion_source(&self, id: SourceId);

    /// Returns true if the loop has been asked to run.
    fn is_armed(&self) -> bool;

    /// Ask the loop to run.
    fn arm(&self);
}

struct Registration {
    id: SourceId,
    max_events: usize,
    source: Arc<dyn CompletionSource>,
}

#[derive(Default)]
struct LoopInner {
    sources: Mutex<Vec<Registration>>,
    next_id: AtomicU64,
    armed: AtomicBool,
}

/// Minimal single-threaded reactor.
///
/// Cloning yields another handle to the same loop. Sources are called without
/// the loop's lock held, so completion callbacks may register new work.
#[derive(Clone, Default)]
pub struct EventLoop {
    inner: Arc<LoopInner>,
}

impl EventLoop {
    /// Create an unarmed loop with no sources.
    pub fn new() -> Self {
        Self::default()
    }

    /// This loop as a shared [`Reactor`].
    pub fn reactor(&self) -> Arc<dyn Reactor> {
        Arc::new(self.clone())
    }

    /// Number of registered sources.
    pub fn source_count(&self) -> usize {
        self.inner.sources.lock().len()
    }

    /// Operations in flight across all sources.
    pub fn in_flight(&self) -> usize {
        self.snapshot().iter().map(|(_, s)| s.in_flight()).sum()
    }

    fn snapshot(&self) -> Vec<(usize, Arc<dyn CompletionSource>)> {
        self.inner
            .sources
            .lock()
            .iter()
            .map(|r| (r.max_events, Arc::clone(&r.source)))
            .collect()
    }

    fn drain(sources: &[(usize, Arc<dyn CompletionSource>)]) -> Result<usize> {
        let mut dispatched = 0;
        for (max_events, source) in sources {
            dispatched += source.poll_completions(*max_events, false)?;
        }
        Ok(dispatched)
    }

    /// Dispatch whatever is ready without blocking.
    pub fn poll(&self) -> Result<usize> {
        Self::drain(&self.snapshot())
    }

    /// Dispatch one batch, blocking until at least one completion arrives.
    ///
    /// Returns `Ok(0)` immediately if nothing is in flight.
    pub fn run_once(&self) -> Result<usize> {
        let sources = self.snapshot();

        let ready = Self::drain(&sources)?;
        if ready > 0 {
            return Ok(ready);
        }

        for (max_events, source) in &sources {
            if source.in_flight() > 0 {
                trace!("blocking on {}", source.name());
                return source.poll_completions(*max_events, true);
            }
        }
        Ok(0)
    }

    /// Arm the loop and run it until no source has work in flight.
    ///
    /// Work submitted by callbacks keeps the loop running. Returns the total
    /// number of completions dispatched; the loop is disarmed on exit.
    pub fn run(&self) -> Result<usize> {
        self.arm();
        let mut total = 0;

        while self.in_flight() > 0 {
            total += self.run_once()?;
        }

        self.inner.armed.store(false, Ordering::Release);
        debug!("event loop idle after {total} completions");
        Ok(total)
    }
}

impl Reactor for EventLoop {
    fn register_completion_source(
        &self,
        max_events: usize,
        source: Arc<dyn CompletionSource>,
    ) -> Result<SourceId> {
        let id = SourceId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        debug!("registered {} as {id} ({max_events} events per turn)", source.name());
        self.inner.sources.lock().push(Registration {
            id,
            max_events: max_events.max(1),
            source,
        });
        Ok(id)
    }

    fn deregister_completion_source(&self, id: SourceId) {
        self.inner.sources.lock().retain(|r| r.id != id);
    }

    fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::Acquire)
    }

    fn arm(&self) {
        self.inner.armed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("sources", &self.source_count())
            .field("armed", &self.is_armed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    /// Source that completes one queued item per poll, up to `max_events`.
    #[derive(Default)]
    struct CountingSource {
        queued: AtomicUsize,
        blocking_polls: AtomicUsize,
    }

    impl CompletionSource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        fn in_flight(&self) -> usize {
            self.queued.load(Ordering::SeqCst)
        }

        fn poll_completions(&self, max_events: usize, block: bool) -> Result<usize> {
            if block {
                self.blocking_polls.fetch_add(1, Ordering::SeqCst);
            }
            let queued = self.queued.load(Ordering::SeqCst);
            let n = queued.min(max_events);
            self.queued.fetch_sub(n, Ordering::SeqCst);
            Ok(n)
        }
    }

    #[test]
    fn register_and_deregister() {
        let event_loop = EventLoop::new();
        let a = event_loop
            .register_completion_source(4, Arc::new(CountingSource::default()))
            .unwrap();
        let b = event_loop
            .register_completion_source(4, Arc::new(CountingSource::default()))
            .unwrap();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
        assert_eq!(a.to_string(), format!("source#{}", a.as_u64()));
        assert_eq!(event_loop.source_count(), 2);

        event_loop.deregister_completion_source(a);
        event_loop.deregister_completion_source(a);
        assert_eq!(event_loop.source_count(), 1);
    }

    #[test]
    fn arm_is_sticky_until_run_finishes() {
        let event_loop = EventLoop::new();
        assert!(!event_loop.is_armed());
        event_loop.arm();
        event_loop.arm();
        assert!(event_loop.is_armed());

        event_loop.run().unwrap();
        assert!(!event_loop.is_armed());
    }

    #[test]
    fn poll_respects_max_events() {
        let event_loop = EventLoop::new();
        let source = Arc::new(CountingSource::default());
        source.queued.store(10, Ordering::SeqCst);
        event_loop
            .register_completion_source(3, source.clone())
            .unwrap();

        assert_eq!(event_loop.poll().unwrap(), 3);
        assert_eq!(event_loop.in_flight(), 7);
    }

    #[test]
    fn run_drains_everything() {
        let event_loop = EventLoop::new();
        let source = Arc::new(CountingSource::default());
        source.queued.store(10, Ordering::SeqCst);
        event_loop
            .register_completion_source(4, source.clone())
            .unwrap();

        assert_eq!(event_loop.run().unwrap(), 10);
        assert_eq!(event_loop.in_flight(), 0);
        assert_eq!(source.blocking_polls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn run_once_with_nothing_in_flight() {
        let event_loop = EventLoop::new();
        event_loop
            .register_completion_source(4, Arc::new(CountingSource::default()))
            .unwrap();
        assert_eq!(event_loop.run_once().unwrap(), 0);
        assert_eq!(event_loop.run().unwrap(), 0);
    }
}
