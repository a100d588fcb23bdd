//! Remount-and-resume
//!
//! Re-initializes the card, re-creates the mount directories, then reopens
//! every file that was open before the fault at the offset it had reached.
//! Files that cannot be reopened stay in the table as dead handles; a later
//! successful remount tries them again.

use tracing::{debug, info, warn};

use super::{FatBackend, FatState, OpenFile};
use crate::medium::{AccessMode, FatError, FileObject, Medium};

impl<M: Medium + 'static> FatBackend<M> {
    /// Stop and re-initialize the medium, then resume open files
    ///
    /// Returns false, leaving `remount_needed` set, if the medium does not
    /// come back.
    pub(super) fn remount_file_system(&self) -> bool {
        let guard = self.shared.state.lock();

        {
            let mut state = guard.borrow_mut();
            // A stop has already happened if a previous attempt failed
            if !state.remount_needed {
                state.medium.stop();
            }
            if !state.medium.remount() {
                if !state.remount_needed {
                    warn!("medium remount failed");
                }
                state.remount_needed = true;
                return false;
            }
            state.remount_needed = false;
        }

        let mut state = guard.borrow_mut();
        state.create_mount_dirs(&self.shared.config.mount_dirs);
        let FatState { medium, files, .. } = &mut *state;
        let mut resumed = 0;
        for (index, file) in files.iter_mut() {
            if reopen(medium, index, file) {
                resumed += 1;
            }
        }
        info!(resumed, open = files.len(), "medium remounted");
        true
    }
}

impl<M: Medium> FatState<M> {
    /// Re-create the configured mount directories on a freshly mounted medium
    pub(super) fn create_mount_dirs(&mut self, dirs: &[String]) {
        for dir in dirs {
            match self.medium.mkdir(dir) {
                Ok(()) | Err(FatError::Exist) => {}
                Err(e) => {
                    warn!(dir = %dir, "mount directory not created: {}", e.code());
                }
            }
        }
    }
}

/// Reopen one file on a freshly mounted medium and seek back to its offset
fn reopen<M: Medium>(medium: &mut M, index: usize, file: &mut OpenFile<M::File>) -> bool {
    let offset = file
        .lost_offset
        .take()
        .unwrap_or_else(|| file.obj.position());

    let mut mode = file.access;
    // Create/truncate flags from the first open are not replayed; a writer
    // only needs its file to exist
    if mode.contains(AccessMode::WRITE) {
        mode |= AccessMode::OPEN_ALWAYS;
    }

    file.obj = M::File::default();
    let resumed = medium
        .open(&mut file.obj, &file.path, mode)
        .and_then(|()| medium.lseek(&mut file.obj, offset));

    match resumed {
        Ok(()) => {
            debug!(fd = index, path = %file.path, offset, "file resumed");
            true
        }
        Err(e) => {
            warn!(fd = index, path = %file.path, "reopen failed: {}", e.code());
            let _ = medium.close(&mut file.obj);
            file.obj = M::File::default();
            file.lost_offset = Some(offset);
            false
        }
    }
}
