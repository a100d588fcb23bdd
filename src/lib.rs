//! # flightfs
//!
//! Descriptor-based filesystem backends for flight-control firmware:
//! - A read-only archive backend serving in-memory decompressed files
//! - A FAT backend on a removable card with remount-and-resume recovery
//! - Chunked, DMA-safety-aware transfers and an asynchronous format job
//! - One POSIX-style contract and error taxonomy across both
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Path Router (external)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Backend trait
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐       ┌──────────┐
//!   │ RomfsBackend│          │ FatBackend  │──────▶│ RealTime │
//!   │   (Mutex)   │          │ (Reentrant) │       └──────────┘
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │ remount / retry once
//!          ▼                        ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   Archive   │          │   Medium    │
//!   │  (decoder)  │          │ (FAT driver)│
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod types;

pub mod backend;
pub mod fat;
pub mod medium;
pub mod romfs;
pub mod rt;
pub mod table;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use backend::Backend;
pub use config::Config;
pub use error::{FsError, Result};
pub use fat::FatBackend;
pub use romfs::{Archive, MemoryArchive, RomfsBackend};
pub use types::{
    DirEntry, DirHandle, FileData, FileHandle, FileType, FormatStatus, OpenFlags, Stat, Whence,
};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of flightfs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
