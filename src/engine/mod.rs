//! The asynchronous file engine.
//!
//! [`AioEngine`] ties the pieces together:
//!
//! - submission (`read_file`, `write_file`, `read_at`, `write_at`) opens and
//!   validates, allocates the buffer, registers the request and hands it to
//!   the facility
//! - the facility is created on first use and registered with the host
//!   [`Reactor`] as a [`CompletionSource`](crate::reactor::CompletionSource)
//! - the dispatcher runs on whichever thread drives the reactor, resolves each
//!   `(fd, ret)` pair through the [`PendingRegistry`], invokes the callback
//!   and releases the request
//!
//! Handles are cheap to clone and share one engine. Neither the registry lock
//! nor the facility lock is held while a callback runs, so callbacks may
//! submit further requests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::backend::{self, Backend};
use crate::config::AioConfig;
use crate::error::{CompletionError, Result};
use crate::reactor::{Reactor, SourceId};
use crate::registry::PendingRegistry;

mod dispatch;
pub mod stats;
mod submission;


pub use stats::EngineStats;

use dispatch::EngineSource;
use stats::StatsCounters;

/// Creates the facility when the engine starts.
pub type BackendFactory = Box<dyn Fn(&AioConfig) -> Result<Box<dyn Backend>> + Send + Sync>;

/// Receives every completion-time anomaly.
pub type ErrorReporter = Arc<dyn Fn(&CompletionError) + Send + Sync>;

#[derive(Default)]
struct Facility {
    backend: Option<Box<dyn Backend>>,
    source: Option<SourceId>,
}

pub(crate) struct EngineShared {
    config: AioConfig,
    reactor: Arc<dyn Reactor>,
    registry: Mutex<PendingRegistry>,
    facility: Mutex<Facility>,
    startup: Mutex<()>,
    factory: BackendFactory,
    stats: StatsCounters,
    in_flight: AtomicUsize,
    reporter: RwLock<Option<ErrorReporter>>,
}

/// Handle to an asynchronous file engine.
#[derive(Clone)]
pub struct AioEngine {
    shared: Arc<EngineShared>,
}

impl AioEngine {
    /// Create an engine bound to `reactor`.
    ///
    /// Nothing is started until the first submission or an explicit
    /// [`ensure_started`](Self::ensure_started).
    ///
    /// # Errors
    ///
    /// Returns [`AioError::InvalidConfig`](crate::AioError::InvalidConfig) if
    /// `config` fails validation.
    pub fn new(reactor: Arc<dyn Reactor>, config: AioConfig) -> Result<Self> {
        Self::with_backend_factory(reactor, config, Box::new(backend::create_backend))
    }

    /// Create an engine whose facility is built by `factory`.
    pub fn with_backend_factory(
        reactor: Arc<dyn Reactor>,
        config: AioConfig,
        factory: BackendFactory,
    ) -> Result<Self> {
        config.validate()?;
        let capacity = config.facility.max_events as usize;

        Ok(Self {
            shared: Arc::new(EngineShared {
                config,
                reactor,
                registry: Mutex::new(PendingRegistry::with_capacity(capacity)),
                facility: Mutex::new(Facility::default()),
                startup: Mutex::new(()),
                factory,
                stats: StatsCounters::default(),
                in_flight: AtomicUsize::new(0),
                reporter: RwLock::new(None),
            }),
        })
    }

    /// Start the facility and register with the reactor, once.
    ///
    /// Later calls return immediately. A failed start leaves the engine
    /// unstarted, so the next call retries.
    pub fn ensure_started(&self) -> Result<()> {
        self.shared.ensure_started()
    }

    /// Returns true once the facility is running.
    pub fn is_started(&self) -> bool {
        self.shared.facility.lock().backend.is_some()
    }

    /// Name of the running facility, if started.
    pub fn backend_name(&self) -> Option<&'static str> {
        self.shared.facility.lock().backend.as_ref().map(|b| b.name())
    }

    /// Engine configuration.
    pub fn config(&self) -> &AioConfig {
        &self.shared.config
    }

    /// Snapshot of the engine counters.
    pub fn stats(&self) -> EngineStats {
        let pending = self.shared.registry.lock().len();
        self.shared
            .stats
            .snapshot(pending, self.shared.in_flight.load(Ordering::Acquire))
    }

    /// Number of registered requests.
    pub fn pending_requests(&self) -> usize {
        self.shared.registry.lock().len()
    }

    /// Returns true if `fd` has a request in flight.
    pub fn is_pending(&self, fd: std::os::unix::io::RawFd) -> bool {
        self.shared.registry.lock().contains(fd)
    }

    /// Install a hook that receives every completion-time anomaly.
    ///
    /// The hook runs on the reactor thread after the anomaly is logged and
    /// counted. It replaces any previous hook.
    pub fn set_error_reporter<F>(&self, reporter: F)
    where
        F: Fn(&CompletionError) + Send + Sync + 'static,
    {
        let reporter: ErrorReporter = Arc::new(reporter);
        *self.shared.reporter.write() = Some(reporter);
    }

    /// Remove the error hook.
    pub fn clear_error_reporter(&self) {
        *self.shared.reporter.write() = None;
    }
}

impl fmt::Debug for AioEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AioEngine")
            .field("started", &self.is_started())
            .field("pending", &self.pending_requests())
            .field("config", &self.shared.config)
            .finish()
    }
}

impl EngineShared {
    fn ensure_started(self: &Arc<Self>) -> Result<()> {
        // Serializes starts; the facility lock stays free while the reactor
        // registers the source, since a reactor may poll it right away.
        let _startup = self.startup.lock();
        if self.facility.lock().backend.is_some() {
            return Ok(());
        }

        let backend = (self.factory)(&self.config)?;
        let name = backend.name();
        let source = Arc::new(EngineSource::new(Arc::downgrade(self), name));
        let id = self
            .reactor
            .register_completion_source(self.config.facility.max_events as usize, source)?;

        {
            let mut facility = self.facility.lock();
            facility.backend = Some(backend);
            facility.source = Some(id);
        }

        if !self.reactor.is_armed() {
            self.reactor.arm();
        }
        info!(
            "asynchronous file engine started on {name} ({} events)",
            self.config.facility.max_events
        );
        Ok(())
    }

    /// Log, count and forward a completion-time anomaly.
    pub(crate) fn report(&self, error: CompletionError) {
        warn!("{error}");
        self.stats.record_error(&error);

        let reporter = self.reporter.read().clone();
        if let Some(reporter) = reporter {
            reporter(&error);
        }
    }
}

impl Drop for EngineShared {
    fn drop(&mut self) {
        let facility = self.facility.get_mut();
        let Some(backend) = facility.backend.as_mut() else {
            return;
        };

        // Buffers are freed with the registry; the facility must be done with them first.
        let max = self.config.facility.max_events as usize;
        let mut drained = true;
        while backend.operations_in_flight() > 0 {
            match backend.wait_for_completion(max) {
                Ok(done) => debug!("discarded {} completions on shutdown", done.len()),
                Err(e) => {
                    warn!("failed to drain {} on shutdown: {e}", backend.name());
                    drained = false;
                    break;
                }
            }
        }

        let registry = std::mem::take(self.registry.get_mut());
        if drained {
            if !registry.is_empty() {
                warn!("dropping engine with {} undispatched requests", registry.len());
            }
        } else {
            // The facility may still write into these buffers.
            warn!(
                "leaking {} requests still owned by {}",
                registry.len(),
                backend.name()
            );
            std::mem::forget(registry);
        }
        if let Some(id) = facility.source.take() {
            self.reactor.deregister_completion_source(id);
        }
    }
}

static_assertions::assert_impl_all!(AioEngine: Send, Sync, Clone);
