//! Read-Only Archive Backend Tests
//!
//! Tests verify:
//! - Read-only enforcement on every mutating operation
//! - Reads and offset clamping
//! - Directory enumeration of nested names
//! - Whole-file loads sharing the decoder buffer

use flightfs::error::errno;
use flightfs::types::mode;
use flightfs::{
    Backend, Config, FileType, FormatStatus, FsError, MemoryArchive, OpenFlags, RomfsBackend,
    Whence,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn sample_archive() -> MemoryArchive {
    MemoryArchive::builder()
        .file("a.txt", "0123456789")
        .file("sub/b.txt", "bee")
        .file("sub/c.txt", "sea")
        .file("sub/deep/d.txt", "dee")
        .build()
}

fn setup() -> RomfsBackend<MemoryArchive> {
    RomfsBackend::new(sample_archive(), &Config::default())
}

fn list(backend: &RomfsBackend<MemoryArchive>, dir: &str) -> Vec<(String, FileType)> {
    let handle = backend.opendir(dir).unwrap();
    let mut entries = Vec::new();
    while let Some(entry) = backend.readdir(handle).unwrap() {
        entries.push((entry.name, entry.kind));
    }
    backend.closedir(handle).unwrap();
    entries
}

// =============================================================================
// Open / Close Tests
// =============================================================================

#[test]
fn test_open_rejects_write_intent() {
    let backend = setup();
    for flags in [
        OpenFlags::WRONLY,
        OpenFlags::RDWR,
        OpenFlags::RDONLY | OpenFlags::CREAT,
        OpenFlags::RDONLY | OpenFlags::TRUNC,
    ] {
        let err = backend.open("a.txt", flags).unwrap_err();
        assert_eq!(err.errno(), errno::EROFS);
    }
}

#[test]
fn test_open_missing_file() {
    let backend = setup();
    let result = backend.open("nope.txt", OpenFlags::RDONLY);
    assert!(matches!(result, Err(FsError::NotFound)));
}

#[test]
fn test_open_accepts_leading_slash() {
    let backend = setup();
    let fd = backend.open("/sub/b.txt", OpenFlags::RDONLY).unwrap();
    backend.close(fd).unwrap();
}

#[test]
fn test_open_table_full() {
    let config = Config::builder().romfs_max_open_files(2).build();
    let backend = RomfsBackend::new(sample_archive(), &config);

    let first = backend.open("a.txt", OpenFlags::RDONLY).unwrap();
    let _second = backend.open("a.txt", OpenFlags::RDONLY).unwrap();
    let err = backend.open("a.txt", OpenFlags::RDONLY).unwrap_err();
    assert_eq!(err.errno(), errno::ENFILE);

    backend.close(first).unwrap();
    let reused = backend.open("sub/c.txt", OpenFlags::RDONLY).unwrap();
    assert_eq!(reused, first);
}

#[test]
fn test_close_twice() {
    let backend = setup();
    let fd = backend.open("a.txt", OpenFlags::RDONLY).unwrap();
    backend.close(fd).unwrap();
    assert!(matches!(backend.close(fd), Err(FsError::BadHandle)));
    let mut buf = [0u8; 4];
    assert!(matches!(backend.read(fd, &mut buf), Err(FsError::BadHandle)));
}

// =============================================================================
// Read / Seek Tests
// =============================================================================

#[test]
fn test_read_whole_file() {
    let backend = setup();
    let fd = backend.open("a.txt", OpenFlags::RDONLY).unwrap();

    let mut buf = [0u8; 32];
    assert_eq!(backend.read(fd, &mut buf).unwrap(), 10);
    assert_eq!(&buf[..10], b"0123456789");
    assert_eq!(backend.read(fd, &mut buf).unwrap(), 0);
}

#[test]
fn test_read_in_pieces() {
    let backend = setup();
    let fd = backend.open("a.txt", OpenFlags::RDONLY).unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(backend.read(fd, &mut buf).unwrap(), 4);
    assert_eq!(&buf, b"0123");
    assert_eq!(backend.read(fd, &mut buf).unwrap(), 4);
    assert_eq!(&buf, b"4567");
    assert_eq!(backend.read(fd, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"89");
}

#[test]
fn test_read_after_seek_end_is_empty() {
    let backend = setup();
    let fd = backend.open("a.txt", OpenFlags::RDONLY).unwrap();

    assert_eq!(backend.lseek(fd, 0, Whence::End).unwrap(), 10);
    let mut buf = [0u8; 8];
    assert_eq!(backend.read(fd, &mut buf).unwrap(), 0);
}

#[test]
fn test_seek_set_negative_rejected() {
    let backend = setup();
    let fd = backend.open("a.txt", OpenFlags::RDONLY).unwrap();
    let err = backend.lseek(fd, -1, Whence::Set).unwrap_err();
    assert_eq!(err.errno(), errno::EINVAL);
}

#[test]
fn test_seek_offsets_stay_in_bounds() {
    let backend = setup();
    let fd = backend.open("a.txt", OpenFlags::RDONLY).unwrap();

    let offsets = [i64::MIN, -11, -10, -1, 0, 1, 5, 10, 11, i64::MAX];
    for whence in [Whence::Set, Whence::Cur, Whence::End] {
        for offset in offsets {
            backend.lseek(fd, 3, Whence::Set).unwrap();
            if let Ok(position) = backend.lseek(fd, offset, whence) {
                assert!(position <= 10, "{:?} {} -> {}", whence, offset, position);
            }
        }
    }
}

#[test]
fn test_seek_clamps() {
    let backend = setup();
    let fd = backend.open("a.txt", OpenFlags::RDONLY).unwrap();

    assert_eq!(backend.lseek(fd, 100, Whence::Set).unwrap(), 10);
    assert_eq!(backend.lseek(fd, -100, Whence::Cur).unwrap(), 0);
    assert_eq!(backend.lseek(fd, 7, Whence::Cur).unwrap(), 7);
    assert_eq!(backend.lseek(fd, -3, Whence::End).unwrap(), 7);
    assert_eq!(backend.lseek(fd, 5, Whence::End).unwrap(), 10);

    backend.lseek(fd, 6, Whence::Set).unwrap();
    let mut buf = [0u8; 2];
    backend.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"67");
}

#[test]
fn test_fsync_checks_handle() {
    let backend = setup();
    let fd = backend.open("a.txt", OpenFlags::RDONLY).unwrap();
    backend.fsync(fd).unwrap();
    backend.close(fd).unwrap();
    assert!(matches!(backend.fsync(fd), Err(FsError::BadHandle)));
}

// =============================================================================
// Read-Only Enforcement Tests
// =============================================================================

#[test]
fn test_mutations_fail_read_only() {
    let backend = setup();
    let fd = backend.open("a.txt", OpenFlags::RDONLY).unwrap();

    assert!(matches!(backend.write(fd, b"x"), Err(FsError::ReadOnly)));
    assert!(matches!(backend.write(fd, b""), Err(FsError::ReadOnly)));
    assert!(matches!(backend.unlink("a.txt"), Err(FsError::ReadOnly)));
    assert!(matches!(backend.unlink("missing"), Err(FsError::ReadOnly)));
    assert!(matches!(backend.mkdir("new"), Err(FsError::ReadOnly)));
    assert!(matches!(backend.rename("a.txt", "b"), Err(FsError::ReadOnly)));
    assert!(matches!(backend.set_mtime("a.txt", 0), Err(FsError::ReadOnly)));
    assert!(matches!(backend.format(), Err(FsError::ReadOnly)));
}

#[test]
fn test_capacity_and_format_queries() {
    let backend = setup();
    assert_eq!(backend.disk_free("/").unwrap(), 0);
    assert_eq!(backend.disk_space("/").unwrap(), 0);
    assert!(!backend.supports_format());
    assert_eq!(backend.format_status(), FormatStatus::Idle);
    assert_eq!(backend.bytes_until_fsync(flightfs::FileHandle::new(0)), 0);
}

// =============================================================================
// Stat Tests
// =============================================================================

#[test]
fn test_stat_file() {
    let backend = setup();
    let stat = backend.stat("/sub/b.txt").unwrap();
    assert_eq!(stat.size, 3);
    assert!(stat.is_file());
    assert_eq!(stat.mode & mode::ALL_W, 0);
}

#[test]
fn test_stat_directories() {
    let backend = setup();
    assert!(backend.stat("/").unwrap().is_dir());
    assert!(backend.stat("sub").unwrap().is_dir());
    assert!(backend.stat("sub/deep").unwrap().is_dir());
}

#[test]
fn test_stat_missing() {
    let backend = setup();
    assert!(matches!(backend.stat("su"), Err(FsError::NotFound)));
    assert!(matches!(backend.stat("sub/zzz"), Err(FsError::NotFound)));
}

// =============================================================================
// Directory Tests
// =============================================================================

#[test]
fn test_list_root() {
    let backend = setup();
    assert_eq!(
        list(&backend, "/"),
        vec![
            ("a.txt".to_string(), FileType::Regular),
            ("sub".to_string(), FileType::Directory),
        ]
    );
}

#[test]
fn test_list_subdirectory() {
    let backend = setup();
    assert_eq!(
        list(&backend, "sub"),
        vec![
            ("b.txt".to_string(), FileType::Regular),
            ("c.txt".to_string(), FileType::Regular),
            ("deep".to_string(), FileType::Directory),
        ]
    );
    assert_eq!(
        list(&backend, "/sub/deep/"),
        vec![("d.txt".to_string(), FileType::Regular)]
    );
}

#[test]
fn test_opendir_missing() {
    let backend = setup();
    assert!(matches!(backend.opendir("nope"), Err(FsError::NotFound)));
    // A file is not a directory
    assert!(matches!(backend.opendir("a.txt"), Err(FsError::NotFound)));
}

#[test]
fn test_readdir_after_closedir() {
    let backend = setup();
    let handle = backend.opendir("/").unwrap();
    backend.closedir(handle).unwrap();
    assert!(matches!(backend.readdir(handle), Err(FsError::BadHandle)));
    assert!(matches!(backend.closedir(handle), Err(FsError::BadHandle)));
}

#[test]
fn test_opendir_table_full() {
    let config = Config::builder().romfs_max_open_dirs(1).build();
    let backend = RomfsBackend::new(sample_archive(), &config);

    let _held = backend.opendir("/").unwrap();
    let err = backend.opendir("sub").unwrap_err();
    assert_eq!(err.errno(), errno::ENFILE);
}

#[test]
fn test_readdir_exhausted_stays_exhausted() {
    let backend = setup();
    let handle = backend.opendir("sub/deep").unwrap();
    assert!(backend.readdir(handle).unwrap().is_some());
    assert!(backend.readdir(handle).unwrap().is_none());
    assert!(backend.readdir(handle).unwrap().is_none());
}

// =============================================================================
// Load File Tests
// =============================================================================

#[test]
fn test_load_file_is_terminated() {
    let backend = setup();
    let data = backend.load_file("/a.txt").unwrap();

    assert_eq!(data.len(), 10);
    assert_eq!(data.as_bytes(), b"0123456789");
    assert_eq!(data.as_bytes_with_nul().last(), Some(&0));
    assert_eq!(data.as_str(), Some("0123456789"));
}

#[test]
fn test_load_missing_file() {
    let backend = setup();
    assert!(matches!(backend.load_file("zzz"), Err(FsError::NotFound)));
}

#[test]
fn test_load_file_does_not_use_handles() {
    let config = Config::builder().romfs_max_open_files(0).build();
    let backend = RomfsBackend::new(sample_archive(), &config);
    assert_eq!(backend.load_file("sub/c.txt").unwrap().as_str(), Some("sea"));
}
