//! One-time detection of the modern key management ioctls.

use log::{debug, info, warn};
use std::ffi::CString;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::abi::FS_IOC_ADD_ENCRYPTION_KEY;

/// Write-once "modern keyring ioctls are supported" flag.
///
/// The probe runs at most once per instance, on first use, and the result is
/// reused by every later caller; concurrent first use computes it exactly
/// once. The probing closure is injected so tests can count invocations.
pub struct KeyringCapability {
    cell: OnceLock<bool>,
    probe: Box<dyn Fn() -> bool + Send + Sync>,
}

/// Process-wide probe result. The probe answers a property of the running
/// kernel, so the first caller's answer holds for every later capability
/// instance and is never invalidated.
static MODERN_SUPPORTED: OnceLock<bool> = OnceLock::new();

impl KeyringCapability {
    /// Capability backed by the real kernel probe against `probe_path`,
    /// memoized for the process lifetime.
    pub fn detect(probe_path: PathBuf) -> Self {
        Self::with_probe(move || {
            *MODERN_SUPPORTED.get_or_init(|| detect_modern_support(&probe_path))
        })
    }

    /// Capability backed by an arbitrary probe.
    pub fn with_probe(probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            cell: OnceLock::new(),
            probe: Box::new(probe),
        }
    }

    pub fn modern_supported(&self) -> bool {
        *self.cell.get_or_init(|| (self.probe)())
    }
}

/// Probe for `FS_IOC_ADD_ENCRYPTION_KEY` by issuing it with a null argument:
/// `ENOTTY` means the ioctl does not exist, while any other error (normally
/// `EFAULT`, from the null argument) proves it does. There is no need to
/// probe the remove ioctl separately; it is available whenever add is, and
/// the kernel supports the ioctls either on all fscrypt-capable filesystems
/// or on none.
fn detect_modern_support(probe_path: &Path) -> bool {
    let c_path = match CString::new(probe_path.as_os_str().as_bytes()) {
        Ok(path) => path,
        Err(_) => {
            warn!(
                "invalid keyring probe path {}; assuming no modern keyring support",
                probe_path.display()
            );
            return false;
        }
    };

    // SAFETY: the path pointer is valid for the duration of the call; the fd
    // is owned below.
    let fd = unsafe {
        libc::open(
            c_path.as_ptr(),
            libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC,
        )
    };
    if fd < 0 {
        warn!(
            "failed to open {} for keyring support probe: {}; assuming no modern keyring support",
            probe_path.display(),
            io::Error::last_os_error()
        );
        return false;
    }
    // SAFETY: fd is a freshly opened descriptor we exclusively own.
    let _fd = unsafe { OwnedFd::from_raw_fd(fd) };

    // SAFETY: a null argument is the whole point of the probe; the kernel
    // rejects it without dereferencing anything on unsupported kernels.
    let rc = unsafe {
        libc::ioctl(
            fd,
            FS_IOC_ADD_ENCRYPTION_KEY,
            std::ptr::null_mut::<libc::c_void>(),
        )
    };
    if rc != 0 {
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ENOTTY) => {
                info!(
                    "kernel doesn't support FS_IOC_ADD_ENCRYPTION_KEY; falling back to session keyring"
                );
                return false;
            }
            Some(libc::EFAULT) => {}
            _ => warn!("unexpected error from FS_IOC_ADD_ENCRYPTION_KEY probe: {err}"),
        }
    }
    debug!("detected support for FS_IOC_ADD_ENCRYPTION_KEY");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn probe_runs_at_most_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let capability = {
            let calls = Arc::clone(&calls);
            KeyringCapability::with_probe(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            })
        };

        for _ in 0..5 {
            assert!(capability.modern_supported());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn probe_runs_at_most_once_under_concurrent_first_use() {
        let calls = Arc::new(AtomicUsize::new(0));
        let capability = {
            let calls = Arc::clone(&calls);
            Arc::new(KeyringCapability::with_probe(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            }))
        };

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let capability = Arc::clone(&capability);
                std::thread::spawn(move || capability.modern_supported())
            })
            .collect();
        for handle in handles {
            assert!(!handle.join().unwrap());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
