//! Configuration for flightfs
//!
//! Centralized configuration with sensible defaults. Descriptor table sizes
//! are read once when a backend is constructed; the tables never grow.

use std::time::Duration;

/// Main configuration shared by the backends
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Block-Device Backend
    // -------------------------------------------------------------------------
    /// Number of file descriptor slots
    pub max_open_files: usize,

    /// Number of directory descriptor slots
    pub max_open_dirs: usize,

    /// Largest single transfer handed to the medium when the caller's buffer
    /// is not safe for direct hardware transfer (bytes)
    pub max_io_size: usize,

    /// Pause before the remount attempt of a retried operation
    pub retry_delay: Duration,

    /// Medium sector size used for capacity reporting (bytes)
    pub sector_size: u64,

    /// Size of the DMA-safe scratch buffer handed to the formatter (bytes)
    pub format_work_size: usize,

    /// Directories re-created after every successful remount
    pub mount_dirs: Vec<String>,

    // -------------------------------------------------------------------------
    // Archive Backend
    // -------------------------------------------------------------------------
    /// Number of file descriptor slots
    pub romfs_max_open_files: usize,

    /// Number of directory descriptor slots
    pub romfs_max_open_dirs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_open_files: 16,
            max_open_dirs: 8,
            max_io_size: 4096,
            retry_delay: Duration::from_millis(100),
            sector_size: 512,
            format_work_size: 512,
            mount_dirs: Vec::new(),
            romfs_max_open_files: 4,
            romfs_max_open_dirs: 4,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the number of block-device file slots
    pub fn max_open_files(mut self, count: usize) -> Self {
        self.config.max_open_files = count;
        self
    }

    /// Set the number of block-device directory slots
    pub fn max_open_dirs(mut self, count: usize) -> Self {
        self.config.max_open_dirs = count;
        self
    }

    /// Set the chunk size used for buffers that are not DMA-safe (in bytes)
    pub fn max_io_size(mut self, size: usize) -> Self {
        self.config.max_io_size = size.max(1);
        self
    }

    /// Set the pause taken before a retry remount
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Set the sector size (in bytes)
    pub fn sector_size(mut self, size: u64) -> Self {
        self.config.sector_size = size;
        self
    }

    /// Set the formatter scratch buffer size (in bytes)
    pub fn format_work_size(mut self, size: usize) -> Self {
        self.config.format_work_size = size;
        self
    }

    /// Add a directory to re-create after each remount
    pub fn mount_dir(mut self, path: impl Into<String>) -> Self {
        self.config.mount_dirs.push(path.into());
        self
    }

    /// Set the number of archive file slots
    pub fn romfs_max_open_files(mut self, count: usize) -> Self {
        self.config.romfs_max_open_files = count;
        self
    }

    /// Set the number of archive directory slots
    pub fn romfs_max_open_dirs(mut self, count: usize) -> Self {
        self.config.romfs_max_open_dirs = count;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
