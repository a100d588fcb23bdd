//! Asynchronous format job
//!
//! `format()` only marks the request pending and queues this handler on the
//! io thread. The handler holds the backend lock for the whole
//! mkfs-and-remount sequence, so filesystem calls made meanwhile wait for it.

use std::sync::atomic::Ordering;

use tracing::{info, warn};

use super::Shared;
use crate::medium::{FatError, Medium};
use crate::types::FormatStatus;

impl<M: Medium> Shared<M> {
    pub(super) fn format_status(&self) -> FormatStatus {
        FormatStatus::from_u8(self.format_status.load(Ordering::SeqCst))
    }

    fn set_format_status(&self, status: FormatStatus) {
        self.format_status.store(status as u8, Ordering::SeqCst);
    }

    /// Io-thread handler: runs only if a request is pending
    pub(super) fn run_format(&self) {
        if self.format_status() != FormatStatus::Pending {
            return;
        }

        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        self.set_format_status(FormatStatus::InProgress);
        info!("formatting volume");

        let outcome = match state.medium.dma_alloc(self.config.format_work_size) {
            Some(mut work) => state.medium.mkfs(&mut work),
            None => {
                warn!("no DMA-safe memory for the format work buffer");
                Err(FatError::NotEnoughCore)
            }
        };

        match outcome {
            Ok(()) => {
                self.set_format_status(FormatStatus::Success);
                info!("format complete");
            }
            Err(e) => {
                self.set_format_status(FormatStatus::Failure);
                warn!("format failed: {}", e.code());
            }
        }

        state.medium.stop();
        let mounted = state.medium.remount();
        state.remount_needed = !mounted;
        if mounted {
            state.create_mount_dirs(&self.config.mount_dirs);
        } else {
            warn!("medium did not come back after format");
        }
    }
}
