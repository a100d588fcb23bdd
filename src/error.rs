//! Error types for flightfs
//!
//! Every backend operation reports failure through [`FsError`], which carries
//! a POSIX-style classification. [`FsError::errno`] yields the integer code a
//! C-facing dispatcher would store in `errno`.

use thiserror::Error;

/// Result type alias using FsError
pub type Result<T> = std::result::Result<T, FsError>;

/// POSIX error numbers (Linux numbering)
pub mod errno {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const ENXIO: i32 = 6;
    pub const EBADF: i32 = 9;
    pub const ENOMEM: i32 = 12;
    pub const EACCES: i32 = 13;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const EINVAL: i32 = 22;
    pub const ENFILE: i32 = 23;
    pub const EMFILE: i32 = 24;
    pub const ENOSPC: i32 = 28;
    pub const EROFS: i32 = 30;
    pub const EBADMSG: i32 = 74;
}

/// Unified error type for filesystem operations
#[derive(Debug, Error)]
pub enum FsError {
    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("no such file or directory")]
    NotFound,

    #[error("file exists")]
    Exists,

    #[error("no such device or address")]
    NoDevice,

    // -------------------------------------------------------------------------
    // Handle Errors
    // -------------------------------------------------------------------------
    #[error("bad file handle")]
    BadHandle,

    #[error("too many open files in backend")]
    TooManyOpen,

    #[error("too many open files on medium")]
    MediumTooManyOpen,

    // -------------------------------------------------------------------------
    // Access Errors
    // -------------------------------------------------------------------------
    #[error("read-only filesystem")]
    ReadOnly,

    #[error("permission denied")]
    PermissionDenied,

    #[error("operation not permitted")]
    NotPermitted,

    #[error("invalid argument")]
    InvalidArgument,

    // -------------------------------------------------------------------------
    // Medium Errors
    // -------------------------------------------------------------------------
    #[error("input/output error")]
    Io,

    #[error("device or resource busy")]
    Busy,

    #[error("no space left on device")]
    NoSpace,

    #[error("out of memory")]
    OutOfMemory,

    #[error("bad message")]
    BadMessage,

    // -------------------------------------------------------------------------
    // Host-side Errors (archive image files)
    // -------------------------------------------------------------------------
    #[error("host IO error: {0}")]
    HostIo(#[from] std::io::Error),

    #[error("archive image error: {0}")]
    Image(String),
}

impl FsError {
    /// POSIX error number for this error
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => errno::ENOENT,
            FsError::Exists => errno::EEXIST,
            FsError::NoDevice => errno::ENXIO,
            FsError::BadHandle => errno::EBADF,
            FsError::TooManyOpen => errno::ENFILE,
            FsError::MediumTooManyOpen => errno::EMFILE,
            FsError::ReadOnly => errno::EROFS,
            FsError::PermissionDenied => errno::EACCES,
            FsError::NotPermitted => errno::EPERM,
            FsError::InvalidArgument => errno::EINVAL,
            FsError::Io | FsError::HostIo(_) => errno::EIO,
            FsError::Busy => errno::EBUSY,
            FsError::NoSpace => errno::ENOSPC,
            FsError::OutOfMemory => errno::ENOMEM,
            FsError::BadMessage | FsError::Image(_) => errno::EBADMSG,
        }
    }
}
