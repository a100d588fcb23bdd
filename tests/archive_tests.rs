//! Archive Image Tests
//!
//! Tests verify:
//! - Builder naming and ordering
//! - Directory listing with de-duplicated sub-directories
//! - Image save/load and checksum validation

use std::fs;
use std::path::PathBuf;

use flightfs::romfs::{Archive, MemoryArchive};
use flightfs::FsError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_image() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("romfs.img");
    (temp_dir, path)
}

fn sample_archive() -> MemoryArchive {
    MemoryArchive::builder()
        .file("/scripts/init.lua", "print('hi')")
        .file("defaults.parm", "FRAME_CLASS 1\n")
        .file("scripts/modules/util.lua", "return {}")
        .build()
}

fn listing(archive: &MemoryArchive, dir: &str) -> Vec<String> {
    let mut cursor = 0;
    let mut names = Vec::new();
    while let Some(name) = archive.dir_list(dir, &mut cursor) {
        names.push(name.to_string());
    }
    names
}

// =============================================================================
// Builder Tests
// =============================================================================

#[test]
fn test_builder_sorts_and_strips_names() {
    let archive = sample_archive();
    let names: Vec<&str> = archive.names().collect();
    assert_eq!(
        names,
        vec!["defaults.parm", "scripts/init.lua", "scripts/modules/util.lua"]
    );
    assert_eq!(archive.len(), 3);
}

#[test]
fn test_builder_replaces_duplicate_names() {
    let archive = MemoryArchive::builder()
        .file("a", "first")
        .file("/a", "second")
        .build();
    assert_eq!(archive.len(), 1);
    assert_eq!(archive.find_size("a"), Some(6));
}

#[test]
fn test_find_decompress_is_terminated() {
    let archive = sample_archive();
    let data = archive.find_decompress("defaults.parm").unwrap();
    assert_eq!(&data[..], b"FRAME_CLASS 1\n\0");
    assert_eq!(archive.find_size("defaults.parm"), Some(14));
    assert!(archive.find_decompress("missing").is_none());
    assert!(archive.find_size("missing").is_none());
}

#[test]
fn test_empty_archive() {
    let archive = MemoryArchive::builder().build();
    assert!(archive.is_empty());
    assert!(listing(&archive, "").is_empty());
}

// =============================================================================
// Listing Tests
// =============================================================================

#[test]
fn test_listing_root_reports_each_subdirectory_once() {
    let archive = sample_archive();
    assert_eq!(
        listing(&archive, ""),
        vec!["defaults.parm", "scripts/init.lua"]
    );
}

#[test]
fn test_listing_subdirectory() {
    let archive = sample_archive();
    assert_eq!(
        listing(&archive, "scripts"),
        vec!["scripts/init.lua", "scripts/modules/util.lua"]
    );
    assert!(listing(&archive, "script").is_empty());
}

// =============================================================================
// Image Tests
// =============================================================================

#[test]
fn test_save_and_load_image() {
    let (_temp, path) = setup_temp_image();
    let archive = sample_archive();

    archive.save(&path).unwrap();
    assert!(path.exists());

    let loaded = MemoryArchive::load(&path).unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(
        loaded.find_decompress("scripts/init.lua").unwrap(),
        archive.find_decompress("scripts/init.lua").unwrap()
    );
}

#[test]
fn test_load_detects_corrupted_contents() {
    let (_temp, path) = setup_temp_image();
    sample_archive().save(&path).unwrap();

    // The last byte belongs to the contents of the last entry
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, &bytes).unwrap();

    let result = MemoryArchive::load(&path);
    assert!(matches!(result, Err(FsError::Image(_))));
}

#[test]
fn test_load_rejects_truncated_image() {
    let image = sample_archive().to_image().unwrap();
    let result = MemoryArchive::from_image(&image[..image.len() / 2]);
    assert!(matches!(result, Err(FsError::Image(_))));
}

#[test]
fn test_load_rejects_unknown_version() {
    let mut image = sample_archive().to_image().unwrap();
    image[0] = 0x7F;
    let result = MemoryArchive::from_image(&image);
    assert!(matches!(result, Err(FsError::Image(_))));
}

#[test]
fn test_load_missing_file() {
    let (_temp, path) = setup_temp_image();
    let result = MemoryArchive::load(&path);
    assert!(matches!(result, Err(FsError::HostIo(_))));
}
