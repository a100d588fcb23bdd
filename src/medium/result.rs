//! Native result codes and their POSIX translation

use crate::error::FsError;

/// Result of a medium primitive
pub type FatResult<T> = std::result::Result<T, FatError>;

/// Non-success result codes of the FAT driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatError {
    /// (1) Hard error in the low level disk I/O layer
    DiskErr,
    /// (2) Assertion failed
    IntErr,
    /// (3) The physical drive cannot work
    NotReady,
    /// (4) Could not find the file
    NoFile,
    /// (5) Could not find the path
    NoPath,
    /// (6) The path name format is invalid
    InvalidName,
    /// (7) Access denied or directory full
    Denied,
    /// (8) Object already exists
    Exist,
    /// (9) The file/directory object is invalid
    InvalidObject,
    /// (10) The physical drive is write protected
    WriteProtected,
    /// (11) The logical drive number is invalid
    InvalidDrive,
    /// (12) The volume has no work area
    NotEnabled,
    /// (13) There is no valid FAT volume
    NoFilesystem,
    /// (14) mkfs aborted due to a parameter error
    MkfsAborted,
    /// (15) Could not get a grant to access the volume in time
    Timeout,
    /// (16) Rejected by the file sharing policy
    Locked,
    /// (17) Long file name working buffer could not be allocated
    NotEnoughCore,
    /// (18) Too many open files on the volume
    TooManyOpenFiles,
    /// (19) Given parameter is invalid
    InvalidParameter,
    /// Any code outside the declared set
    Other(u8),
}

impl FatError {
    /// Decode a raw driver code; 0 is success
    pub fn from_code(code: u8) -> FatResult<()> {
        let err = match code {
            0 => return Ok(()),
            1 => FatError::DiskErr,
            2 => FatError::IntErr,
            3 => FatError::NotReady,
            4 => FatError::NoFile,
            5 => FatError::NoPath,
            6 => FatError::InvalidName,
            7 => FatError::Denied,
            8 => FatError::Exist,
            9 => FatError::InvalidObject,
            10 => FatError::WriteProtected,
            11 => FatError::InvalidDrive,
            12 => FatError::NotEnabled,
            13 => FatError::NoFilesystem,
            14 => FatError::MkfsAborted,
            15 => FatError::Timeout,
            16 => FatError::Locked,
            17 => FatError::NotEnoughCore,
            18 => FatError::TooManyOpenFiles,
            19 => FatError::InvalidParameter,
            other => FatError::Other(other),
        };
        Err(err)
    }

    /// Raw driver code
    pub fn code(self) -> u8 {
        match self {
            FatError::DiskErr => 1,
            FatError::IntErr => 2,
            FatError::NotReady => 3,
            FatError::NoFile => 4,
            FatError::NoPath => 5,
            FatError::InvalidName => 6,
            FatError::Denied => 7,
            FatError::Exist => 8,
            FatError::InvalidObject => 9,
            FatError::WriteProtected => 10,
            FatError::InvalidDrive => 11,
            FatError::NotEnabled => 12,
            FatError::NoFilesystem => 13,
            FatError::MkfsAborted => 14,
            FatError::Timeout => 15,
            FatError::Locked => 16,
            FatError::NotEnoughCore => 17,
            FatError::TooManyOpenFiles => 18,
            FatError::InvalidParameter => 19,
            FatError::Other(code) => code,
        }
    }
}

/// Map a driver result code onto the POSIX taxonomy
pub fn translate(err: FatError) -> FsError {
    match err {
        FatError::DiskErr => FsError::Io,
        FatError::IntErr => FsError::NotPermitted,
        FatError::NotReady => FsError::Busy,
        FatError::NoFile | FatError::NoPath => FsError::NotFound,
        FatError::InvalidName => FsError::InvalidArgument,
        FatError::Denied => FsError::PermissionDenied,
        FatError::Exist => FsError::Exists,
        FatError::InvalidObject => FsError::InvalidArgument,
        FatError::WriteProtected => FsError::ReadOnly,
        FatError::InvalidDrive | FatError::NoFilesystem => FsError::NoDevice,
        FatError::NotEnabled => FsError::NoSpace,
        FatError::MkfsAborted | FatError::InvalidParameter => FsError::InvalidArgument,
        FatError::Timeout | FatError::Locked => FsError::Busy,
        FatError::NotEnoughCore => FsError::OutOfMemory,
        FatError::TooManyOpenFiles => FsError::MediumTooManyOpen,
        FatError::Other(_) => FsError::BadMessage,
    }
}

impl From<FatError> for FsError {
    fn from(err: FatError) -> Self {
        translate(err)
    }
}
