//! Completion dispatch.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Weak;

use log::trace;

use crate::backend::RawCompletion;
use crate::error::{CompletionError, Result};
use crate::operation::{AsyncFileRequest, Handler, ReadOutcome, WriteOutcome};
use crate::reactor::CompletionSource;

use super::EngineShared;

/// The engine as seen by the reactor.
///
/// Holds a weak reference so the reactor never keeps a dropped engine alive.
pub(crate) struct EngineSource {
    engine: Weak<EngineShared>,
    name: String,
}

impl EngineSource {
    pub(crate) fn new(engine: Weak<EngineShared>, backend: &str) -> Self {
        Self {
            engine,
            name: format!("safer-aio/{backend}"),
        }
    }
}

impl CompletionSource for EngineSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn in_flight(&self) -> usize {
        self.engine
            .upgrade()
            .map_or(0, |engine| engine.in_flight.load(Ordering::Acquire))
    }

    fn poll_completions(&self, max_events: usize, block: bool) -> Result<usize> {
        let Some(engine) = self.engine.upgrade() else {
            return Ok(0);
        };
        engine.poll_completions(max_events, block)
    }
}

impl EngineShared {
    /// Drain up to `max_events` completions from the facility and dispatch them.
    pub(crate) fn poll_completions(&self, max_events: usize, block: bool) -> Result<usize> {
        let completions = {
            let mut facility = self.facility.lock();
            let Some(backend) = facility.backend.as_mut() else {
                return Ok(0);
            };
            let completions = if block && backend.operations_in_flight() > 0 {
                backend.wait_for_completion(max_events)?
            } else {
                backend.try_complete(max_events)?
            };
            self.in_flight
                .store(backend.operations_in_flight(), Ordering::Release);
            completions
        };

        let count = completions.len();
        for completion in completions {
            self.dispatch(completion);
        }
        Ok(count)
    }

    /// Resolve one `(fd, ret)` pair to its request and finish it.
    pub(crate) fn dispatch(&self, completion: RawCompletion) {
        let RawCompletion { fd, ret } = completion;
        trace!("completion fd={fd} ret={ret}");

        let taken = self.registry.lock().take(fd);
        let Some(mut request) = taken else {
            self.report(CompletionError::MissingRequest { fd });
            return;
        };
        self.stats.record_completion();

        self.complete(&mut request, ret);
        self.release(request);
    }

    fn complete(&self, request: &mut AsyncFileRequest, ret: i64) {
        let fd = request.fd();
        let kind = request.kind();
        let requested = request.requested_length();

        let callback = request.take_callback();
        if kind.requires_callback() && callback.is_none() {
            self.report(CompletionError::MissingCallback { fd });
            return;
        }

        if ret < 0 {
            self.report(CompletionError::from_ret(fd, kind, ret));
            return;
        }

        let transferred = usize::try_from(ret).unwrap_or(usize::MAX);
        if transferred < requested {
            self.report(CompletionError::ShortTransfer {
                fd,
                kind,
                transferred,
                requested,
            });
        }

        let Some(handler) = callback else {
            self.stats.record_transfer(kind, transferred);
            return;
        };

        let request = &*request;
        let result = catch_unwind(AssertUnwindSafe(|| match handler {
            Handler::Read(on_read) => {
                let content = request.buffer().filled(transferred);
                self.stats.record_transfer(kind, content.len());
                on_read(ReadOutcome::new(request.path(), content, requested))
            }
            Handler::Write(on_written) => {
                self.stats.record_transfer(kind, transferred);
                on_written(WriteOutcome::new(request.path(), transferred, requested))
            }
        }));

        let reason = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };
        self.report(CompletionError::CallbackInvocation { fd, kind, reason });
    }

    /// Free the buffer and, for one-shot requests, close the descriptor.
    fn release(&self, request: AsyncFileRequest) {
        let policy = request.release_policy();
        trace!("releasing fd={} ({policy})", request.fd());
        drop(request);
        self.stats.record_release(policy);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
