//! Logging setup.
//!
//! The crate itself only emits through the [`log`] facade: `info` when an engine
//! starts its facility, `debug` per submission, `trace` per completion and `warn`
//! for every completion-time anomaly. Hosts that do not install their own logger
//! can call [`initialize_logger`].

use std::sync::Once;

use env_logger::Builder;
use log::LevelFilter;

static INIT: Once = Once::new();

/// Install an `env_logger` backend once per process.
///
/// Defaults to `info` for this crate and `warn` elsewhere; `RUST_LOG` overrides
/// both. Safe to call repeatedly and from tests running in parallel.
pub fn initialize_logger() {
    INIT.call_once_force(|_| {
        let mut builder = Builder::new();

        builder
            .filter_level(LevelFilter::Warn)
            .filter_module("safer_aio", LevelFilter::Info)
            .format_timestamp_millis()
            .parse_default_env();

        // Another logger may already be installed by the host.
        let _ = builder.try_init();
    });
}
