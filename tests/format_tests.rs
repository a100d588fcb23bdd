//! Format Job Tests
//!
//! Tests verify:
//! - A request is accepted immediately and stays pending until the io task runs
//! - Terminal states are final
//! - The medium is remounted whatever the outcome
//! - Mount directories exist again on the fresh volume

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use flightfs::medium::{SimControl, SimMedium};
use flightfs::rt::{HostRealTime, ManualRealTime};
use flightfs::{Backend, Config, FatBackend, FormatStatus, FsError, OpenFlags};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup() -> (FatBackend<SimMedium>, SimControl, Arc<ManualRealTime>) {
    let medium = SimMedium::new()
        .with_file("/APM/LOGS/1.BIN", b"log")
        .with_file("/defaults.parm", b"X 1\n");
    let control = medium.control();
    let rt = Arc::new(ManualRealTime::new());
    let config = Config::builder().mount_dir("/APM").build();
    let backend = FatBackend::new(medium, rt.clone(), config);
    (backend, control, rt)
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_initial_status_is_idle() {
    let (backend, _control, _rt) = setup();
    assert!(backend.supports_format());
    assert_eq!(backend.format_status(), FormatStatus::Idle);
}

#[test]
fn test_request_is_pending_until_task_runs() {
    let (backend, control, rt) = setup();

    backend.format().unwrap();
    assert_eq!(backend.format_status(), FormatStatus::Pending);
    assert_eq!(rt.pending(), 1);

    for _ in 0..5 {
        assert!(!backend.format_status().is_finished());
    }
    assert_eq!(control.format_count(), 0);
    assert!(backend.stat("/defaults.parm").is_ok());

    assert_eq!(rt.run_pending(), 1);
    assert_eq!(backend.format_status(), FormatStatus::Success);
    assert_eq!(control.format_count(), 1);
}

#[test]
fn test_format_erases_and_remounts() {
    let (backend, control, rt) = setup();

    backend.format().unwrap();
    rt.run_pending();

    assert!(matches!(backend.stat("/defaults.parm"), Err(FsError::NotFound)));
    assert!(!backend.remount_needed());
    assert_eq!(control.stop_count(), 1);
    assert_eq!(control.mount_count(), 1);

    // The fresh volume is usable straight away
    let fd = backend
        .open("/new.txt", OpenFlags::WRONLY | OpenFlags::CREAT)
        .unwrap();
    backend.write(fd, b"fresh").unwrap();
    backend.close(fd).unwrap();
}

#[test]
fn test_format_recreates_mount_dirs() {
    let (backend, _control, rt) = setup();
    assert!(backend.stat("/APM").unwrap().is_dir());

    backend.format().unwrap();
    rt.run_pending();

    assert_eq!(backend.format_status(), FormatStatus::Success);
    assert!(backend.stat("/APM").unwrap().is_dir());
    assert!(backend.stat("/APM/LOGS").is_err());

    // Logging can start straight away
    let fd = backend
        .open("/APM/1.BIN", OpenFlags::WRONLY | OpenFlags::CREAT)
        .unwrap();
    backend.close(fd).unwrap();
}

#[test]
fn test_second_request_while_pending_is_busy() {
    let (backend, _control, rt) = setup();

    backend.format().unwrap();
    assert!(matches!(backend.format(), Err(FsError::Busy)));
    assert_eq!(rt.pending(), 1);
}

#[test]
fn test_terminal_status_is_final() {
    let (backend, _control, rt) = setup();
    backend.format().unwrap();
    rt.run_pending();

    for _ in 0..5 {
        assert_eq!(backend.format_status(), FormatStatus::Success);
    }
    // Running the queue again has nothing to do
    assert_eq!(rt.run_pending(), 0);
    assert_eq!(backend.format_status(), FormatStatus::Success);
}

#[test]
fn test_format_can_be_requested_again_after_completion() {
    let (backend, control, rt) = setup();
    backend.format().unwrap();
    rt.run_pending();

    backend.format().unwrap();
    assert_eq!(backend.format_status(), FormatStatus::Pending);
    rt.run_pending();
    assert_eq!(backend.format_status(), FormatStatus::Success);
    assert_eq!(control.format_count(), 2);
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_mkfs_failure_still_remounts() {
    let (backend, control, rt) = setup();
    control.set_mkfs_fails(true);

    backend.format().unwrap();
    rt.run_pending();

    assert_eq!(backend.format_status(), FormatStatus::Failure);
    assert_eq!(control.format_count(), 0);
    assert_eq!(control.mount_count(), 1);
    assert!(!backend.remount_needed());
    assert!(backend.stat("/defaults.parm").is_ok());
}

#[test]
fn test_no_dma_memory_fails_format() {
    let (backend, control, rt) = setup();
    control.set_dma_exhausted(true);

    backend.format().unwrap();
    rt.run_pending();

    assert_eq!(backend.format_status(), FormatStatus::Failure);
    assert_eq!(control.format_count(), 0);
}

#[test]
fn test_format_with_card_removed() {
    let (backend, control, rt) = setup();
    control.set_present(false);

    backend.format().unwrap();
    rt.run_pending();

    assert_eq!(backend.format_status(), FormatStatus::Failure);
    assert!(backend.remount_needed());

    control.set_present(true);
    assert!(backend.stat("/defaults.parm").is_ok());
    assert!(!backend.remount_needed());
}

// =============================================================================
// Host Scheduler Tests
// =============================================================================

#[test]
fn test_format_on_io_thread() {
    let medium = SimMedium::new().with_file("/a.txt", b"a");
    let rt = Arc::new(HostRealTime::new());
    let backend = FatBackend::new(medium, rt, Config::default());

    backend.format().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !backend.format_status().is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(backend.format_status(), FormatStatus::Success);
    assert!(backend.stat("/a.txt").is_err());
}
