//! Configuration for the asynchronous file engine.
//!
//! The defaults reproduce the reference policy: at most 128 operations in
//! flight and whole-file transfers of at most 4 MiB. Presets cover direct I/O
//! and memory-constrained hosts; [`ConfigBuilder`] adjusts individual knobs.

use crate::error::{AioError, Result};

/// Default maximum number of in-flight events.
pub const DEFAULT_MAX_EVENTS: u32 = 128;

/// Default ceiling for whole-file transfers (4 MiB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 4 * 1024 * 1024;

/// Largest queue depth accepted by [`AioConfig::validate`].
pub const MAX_EVENTS_LIMIT: u32 = 4096;

/// Which asynchronous I/O facility the engine starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Prefer io_uring, fall back to the worker pool if it cannot be created.
    #[default]
    Auto,
    /// Kernel io_uring only (Linux 5.1+).
    IoUring,
    /// Worker threads issuing positional reads and writes.
    ThreadPool,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Auto => write!(f, "auto"),
            BackendKind::IoUring => write!(f, "io_uring"),
            BackendKind::ThreadPool => write!(f, "thread_pool"),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default)]
pub struct AioConfig {
    /// Asynchronous I/O facility configuration
    pub facility: FacilityConfig,
    /// Transfer policy configuration
    pub transfer: TransferConfig,
}

/// Settings for the asynchronous I/O facility.
#[derive(Debug, Clone)]
pub struct FacilityConfig {
    /// Facility to start
    pub backend: BackendKind,
    /// Maximum operations in flight, also the completion batch size per reactor turn
    pub max_events: u32,
    /// Worker threads for the thread-pool facility
    pub worker_threads: usize,
}

/// Size and open-mode policy applied at submission time.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Largest file or payload accepted by whole-file operations
    pub max_file_size: usize,
    /// Open reads with `O_DIRECT` and use page-aligned, page-rounded buffers
    pub direct_io: bool,
    /// Permission bits for files created by writes
    pub file_mode: u32,
}

impl Default for FacilityConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Auto,
            max_events: DEFAULT_MAX_EVENTS,
            worker_threads: 4,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            direct_io: false,
            file_mode: 0o644,
        }
    }
}

impl AioConfig {
    /// Configuration that bypasses the page cache for reads.
    ///
    /// Requires a filesystem that supports `O_DIRECT`; tmpfs does not.
    pub fn direct_io() -> Self {
        Self {
            facility: FacilityConfig::default(),
            transfer: TransferConfig {
                direct_io: true,
                ..TransferConfig::default()
            },
        }
    }

    /// Small queue and a single worker for constrained hosts.
    pub fn low_memory() -> Self {
        Self {
            facility: FacilityConfig {
                backend: BackendKind::Auto,
                max_events: 16,
                worker_threads: 1,
            },
            transfer: TransferConfig {
                max_file_size: 1024 * 1024,
                ..TransferConfig::default()
            },
        }
    }

    /// Check that every setting is usable.
    pub fn validate(&self) -> Result<()> {
        if self.facility.max_events == 0 {
            return Err(AioError::InvalidConfig(
                "max_events must be greater than 0".to_string(),
            ));
        }

        if self.facility.max_events > MAX_EVENTS_LIMIT {
            return Err(AioError::InvalidConfig(format!(
                "max_events must not exceed {MAX_EVENTS_LIMIT}"
            )));
        }

        if self.facility.worker_threads == 0 && self.facility.backend != BackendKind::IoUring {
            return Err(AioError::InvalidConfig(
                "worker_threads must be greater than 0 when the thread pool may be used"
                    .to_string(),
            ));
        }

        if self.transfer.max_file_size == 0 {
            return Err(AioError::InvalidConfig(
                "max_file_size must be greater than 0".to_string(),
            ));
        }

        // Submission lengths travel to the kernel as u32.
        if self.transfer.max_file_size > u32::MAX as usize {
            return Err(AioError::InvalidConfig(format!(
                "max_file_size must not exceed {}",
                u32::MAX
            )));
        }

        if self.transfer.file_mode > 0o7777 {
            return Err(AioError::InvalidConfig(format!(
                "file_mode {:o} is not a permission mask",
                self.transfer.file_mode
            )));
        }

        Ok(())
    }
}

/// Builder for [`AioConfig`].
///
/// ```rust
/// use safer_aio::{BackendKind, ConfigBuilder};
///
/// let config = ConfigBuilder::new()
///     .backend(BackendKind::ThreadPool)
///     .max_events(32)
///     .max_file_size(64 * 1024)
///     .build()
///     .unwrap();
/// assert_eq!(config.facility.max_events, 32);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: AioConfig,
}

impl ConfigBuilder {
    /// Start from [`AioConfig::default`].
    pub fn new() -> Self {
        Self {
            config: AioConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: AioConfig) -> Self {
        Self { config }
    }

    /// Select the facility.
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.facility.backend = backend;
        self
    }

    /// Set the in-flight event capacity.
    pub fn max_events(mut self, max_events: u32) -> Self {
        self.config.facility.max_events = max_events;
        self
    }

    /// Set the worker count for the thread-pool facility.
    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.config.facility.worker_threads = worker_threads;
        self
    }

    /// Set the whole-file size ceiling.
    pub fn max_file_size(mut self, max_file_size: usize) -> Self {
        self.config.transfer.max_file_size = max_file_size;
        self
    }

    /// Enable or disable direct I/O for reads.
    pub fn direct_io(mut self, direct_io: bool) -> Self {
        self.config.transfer.direct_io = direct_io;
        self
    }

    /// Set the creation mode for written files.
    pub fn file_mode(mut self, file_mode: u32) -> Self {
        self.config.transfer.file_mode = file_mode;
        self
    }

    /// Validate and return the configuration.
    pub fn build(self) -> Result<AioConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.facility.max_events, 128);
        assert_eq!(config.transfer.max_file_size, 4_194_304);
        assert_eq!(config.facility.backend, BackendKind::Auto);
        assert!(!config.transfer.direct_io);
    }

    #[test]
    fn test_presets_validate() {
        let direct = AioConfig::direct_io();
        assert!(direct.validate().is_ok());
        assert!(direct.transfer.direct_io);

        let small = AioConfig::low_memory();
        assert!(small.validate().is_ok());
        assert_eq!(small.facility.worker_threads, 1);
    }

    #[test]
    fn test_zero_events_rejected() {
        let result = ConfigBuilder::new().max_events(0).build();
        assert!(matches!(result, Err(AioError::InvalidConfig(_))));
    }

    #[test]
    fn test_events_above_limit_rejected() {
        let result = ConfigBuilder::new().max_events(MAX_EVENTS_LIMIT + 1).build();
        assert!(matches!(result, Err(AioError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_workers_allowed_for_io_uring_only() {
        assert!(ConfigBuilder::new()
            .backend(BackendKind::IoUring)
            .worker_threads(0)
            .build()
            .is_ok());
        assert!(ConfigBuilder::new()
            .backend(BackendKind::Auto)
            .worker_threads(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_file_size_bounds() {
        assert!(ConfigBuilder::new().max_file_size(0).build().is_err());
        assert!(ConfigBuilder::new().max_file_size(1).build().is_ok());
    }

    #[test]
    fn test_bad_file_mode() {
        assert!(ConfigBuilder::new().file_mode(0o10000).build().is_err());
    }

    #[test]
    fn test_builder_from_config() {
        let config = ConfigBuilder::from_config(AioConfig::low_memory())
            .direct_io(true)
            .build()
            .unwrap();
        assert!(config.transfer.direct_io);
        assert_eq!(config.facility.max_events, 16);
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(BackendKind::Auto.to_string(), "auto");
        assert_eq!(BackendKind::IoUring.to_string(), "io_uring");
        assert_eq!(BackendKind::ThreadPool.to_string(), "thread_pool");
    }
}
