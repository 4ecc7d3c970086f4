//! Configuration for AtlasDB
//!
//! Centralized configuration with sensible defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Path designator that opens an engine without a backing log file
pub const MEMORY_PATH: &str = ":memory:";

/// Main configuration for an AtlasDB instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the append-only log file
    pub path: PathBuf,

    /// Keep everything in memory; no log is opened or written
    pub in_memory: bool,

    // -------------------------------------------------------------------------
    // Log Configuration
    // -------------------------------------------------------------------------
    /// Sync policy: how often to fsync the log
    pub sync_policy: SyncPolicy,

    /// Shrink once the log has grown by this percentage since the last shrink
    pub auto_shrink_percentage: u64,

    /// Never auto-shrink a log smaller than this (in bytes)
    pub auto_shrink_min_size: u64,

    /// Turn automatic shrinking off entirely
    pub auto_shrink_disabled: bool,

    // -------------------------------------------------------------------------
    // Background Configuration
    // -------------------------------------------------------------------------
    /// How often the background task sweeps expired items
    pub sweep_interval: Duration,
}

/// Log sync policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Never fsync; rely on the OS to write buffers out
    Never,

    /// fsync from the background task, at most once per second
    EverySecond,

    /// fsync inside every commit (safest, slowest)
    Always,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./atlasdb.db"),
            in_memory: false,
            sync_policy: SyncPolicy::EverySecond,
            auto_shrink_percentage: 100,
            auto_shrink_min_size: 32 * 1024 * 1024, // 32 MB
            auto_shrink_disabled: false,
            sweep_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Config for the given path; `":memory:"` selects in-memory mode
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            in_memory: path == Path::new(MEMORY_PATH),
            path: path.to_path_buf(),
            ..Self::default()
        }
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the log file path (`":memory:"` selects in-memory mode)
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        self.config.in_memory = path == Path::new(MEMORY_PATH);
        self.config.path = path.to_path_buf();
        self
    }

    /// Run without a backing log
    pub fn in_memory(mut self, in_memory: bool) -> Self {
        self.config.in_memory = in_memory;
        self
    }

    /// Set the log sync policy
    pub fn sync_policy(mut self, policy: SyncPolicy) -> Self {
        self.config.sync_policy = policy;
        self
    }

    /// Set the growth percentage that triggers an automatic shrink
    pub fn auto_shrink_percentage(mut self, percentage: u64) -> Self {
        self.config.auto_shrink_percentage = percentage;
        self
    }

    /// Set the minimum log size (in bytes) before auto-shrink is considered
    pub fn auto_shrink_min_size(mut self, size: u64) -> Self {
        self.config.auto_shrink_min_size = size;
        self
    }

    /// Disable automatic shrinking
    pub fn auto_shrink_disabled(mut self, disabled: bool) -> Self {
        self.config.auto_shrink_disabled = disabled;
        self
    }

    /// Set the expiration sweep interval
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
