//! Busy-file cleanup for incompletely removed keys.
//!
//! Removing a key while files are still open under it leaves the key in the
//! "incompletely removed" state. Processes holding those files are torn down
//! asynchronously by the platform, so a detached task retries the removal on
//! a doubling backoff instead of blocking the evicting caller. The task owns
//! copies of everything it needs, has no cancellation channel, and reports
//! only through the log: fire-and-forget by design.

use crate::modern::MountHandle;
use keyseal_core::KeysealResult;
use keyseal_provider::{KeySpecifier, KeyStatus, RemovalFlags};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// First retry delay.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(3200);
/// No attempt is issued once the would-be delay exceeds this, bounding the
/// schedule to 3200, 6400, 12800, 25600, 51200 ms.
pub const MAX_BACKOFF: Duration = Duration::from_millis(51200);

/// Kernel operations the reaper needs; implemented by [`MountHandle`] and by
/// scripted mocks in tests.
pub(crate) trait EvictionOps {
    fn key_status(&self, spec: &KeySpecifier) -> KeysealResult<KeyStatus>;
    fn remove_key(&self, spec: &KeySpecifier) -> KeysealResult<RemovalFlags>;
}

/// Terminal state of one reaper run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaperOutcome {
    /// The key is no longer pending removal (cleaned up here or elsewhere).
    Cleared,
    /// Every attempt still found busy files.
    TimedOut,
    /// A kernel call failed; the run stopped with a diagnostic.
    Aborted,
}

pub(crate) struct BusyFileReaper<E: EvictionOps> {
    ops: E,
    spec: KeySpecifier,
    ref_display: String,
    keyring_mutex: Arc<Mutex<()>>,
}

impl<E: EvictionOps> BusyFileReaper<E> {
    pub(crate) fn new(
        ops: E,
        spec: KeySpecifier,
        ref_display: String,
        keyring_mutex: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            ops,
            spec,
            ref_display,
            keyring_mutex,
        }
    }

    /// Drive the retry schedule to a terminal state. Sleeping happens through
    /// `sleep` and never while holding the keyring mutex, so concurrent
    /// install/evict calls only wait for the brief kernel calls themselves.
    pub(crate) fn run(self, mut sleep: impl FnMut(Duration)) -> ReaperOutcome {
        let mut wait = INITIAL_BACKOFF;
        let mut total_wait = Duration::ZERO;
        while wait <= MAX_BACKOFF {
            total_wait += wait;
            sleep(wait);

            let _lock = self.keyring_mutex.lock().unwrap();

            let status = match self.ops.key_status(&self.spec) {
                Ok(status) => status,
                Err(err) => {
                    error!(
                        "failed to get status for fscrypt key with ref {}: {err}",
                        self.ref_display
                    );
                    return ReaperOutcome::Aborted;
                }
            };
            if status != KeyStatus::IncompletelyRemoved {
                debug!(
                    "key status changed, cancelling busy file cleanup for key with ref {}",
                    self.ref_display
                );
                return ReaperOutcome::Cleared;
            }

            let flags = match self.ops.remove_key(&self.spec) {
                Ok(flags) => flags,
                Err(err) => {
                    error!(
                        "failed to clean up busy files for fscrypt key with ref {}: {err}",
                        self.ref_display
                    );
                    return ReaperOutcome::Aborted;
                }
            };
            if flags.other_users {
                // Should never happen: keys are only added and removed as root.
                error!(
                    "unexpected case: key with ref {} is still added by other users",
                    self.ref_display
                );
            } else if !flags.files_busy {
                info!(
                    "successfully cleaned up busy files for key with ref {} after waiting {}ms",
                    self.ref_display,
                    total_wait.as_millis()
                );
                return ReaperOutcome::Cleared;
            }
            warn!(
                "files still open after waiting {}ms; key with ref {} still has unlocked files",
                total_wait.as_millis(),
                self.ref_display
            );
            wait *= 2;
        }
        error!(
            "waiting for files to close never completed; files using key with ref {} were not locked",
            self.ref_display
        );
        ReaperOutcome::TimedOut
    }
}

/// Spawn the detached cleanup task for a key whose removal left busy files.
/// The thread owns everything it touches; the handle is dropped on purpose.
pub(crate) fn spawn_busy_file_reaper(
    mountpoint: PathBuf,
    spec: KeySpecifier,
    ref_display: String,
    keyring_mutex: Arc<Mutex<()>>,
) {
    let spawned = thread::Builder::new()
        .name("keyseal-busy-files".to_string())
        .spawn(move || {
            let handle = match MountHandle::open(&mountpoint) {
                Ok(handle) => handle,
                Err(err) => {
                    error!("failed to open {} to evict key: {err}", mountpoint.display());
                    return;
                }
            };
            BusyFileReaper::new(handle, spec, ref_display, keyring_mutex).run(thread::sleep);
        });
    if let Err(err) = spawned {
        error!("failed to spawn busy file cleanup thread: {err}");
    }
}
