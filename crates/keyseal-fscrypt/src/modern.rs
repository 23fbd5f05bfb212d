//! Per-filesystem key management ioctl path.

use crate::abi::{
    self, fscrypt_add_key_arg, fscrypt_get_key_status_arg, fscrypt_key_specifier,
    fscrypt_remove_key_arg, ADD_KEY_ARG_SPEC_U_OFFSET, ADD_KEY_ARG_SIZE,
    FSCRYPT_ADD_KEY_FLAG_HW_WRAPPED, FSCRYPT_KEY_SPEC_TYPE_IDENTIFIER,
    FS_IOC_ADD_ENCRYPTION_KEY, FS_IOC_GET_ENCRYPTION_KEY_STATUS, FS_IOC_REMOVE_ENCRYPTION_KEY,
};
use crate::reaper::EvictionOps;
use keyseal_core::{key_ref_display, KeysealError, KeysealResult};
use keyseal_provider::{
    EncryptionOptions, EncryptionPolicy, KeySpecifier, KeyStatus, RemovalFlags,
    KEY_IDENTIFIER_SIZE,
};
use log::debug;
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// Directory handle on the filesystem whose keyring is being operated on.
pub(crate) struct MountHandle {
    fd: OwnedFd,
    path: PathBuf,
}

impl MountHandle {
    pub(crate) fn open(mountpoint: &Path) -> KeysealResult<Self> {
        let c_path = CString::new(mountpoint.as_os_str().as_bytes())
            .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
        // SAFETY: the path pointer is valid for the duration of the call; the
        // returned fd is owned below.
        let fd = unsafe {
            libc::open(
                c_path.as_ptr(),
                libc::O_RDONLY | libc::O_DIRECTORY | libc::O_CLOEXEC,
            )
        };
        if fd < 0 {
            return Err(KeysealError::kernel(
                format!("opening {}", mountpoint.display()),
                io::Error::last_os_error(),
            ));
        }
        // SAFETY: fd is a freshly opened descriptor we exclusively own.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            path: mountpoint.to_path_buf(),
        })
    }

    fn ioctl(
        &self,
        op: &'static str,
        request: libc::c_ulong,
        arg: *mut libc::c_void,
    ) -> KeysealResult<()> {
        // SAFETY: the argument points at a live, correctly-sized buffer for
        // the given request.
        let rc = unsafe { libc::ioctl(self.fd.as_raw_fd(), request, arg) };
        if rc != 0 {
            return Err(KeysealError::kernel(
                format!("{op} on {}", self.path.display()),
                io::Error::last_os_error(),
            ));
        }
        Ok(())
    }

    /// Issue the remove-key ioctl and report the removal status flags.
    pub(crate) fn remove_key(&self, spec: &KeySpecifier) -> KeysealResult<RemovalFlags> {
        let mut arg = fscrypt_remove_key_arg::zeroed();
        arg.key_spec = fscrypt_key_specifier::from(spec);
        self.ioctl(
            "FS_IOC_REMOVE_ENCRYPTION_KEY",
            FS_IOC_REMOVE_ENCRYPTION_KEY,
            &mut arg as *mut _ as *mut libc::c_void,
        )?;
        Ok(abi::removal_flags_from_raw(arg.removal_status_flags))
    }

    /// Issue the key-status ioctl.
    pub(crate) fn key_status(&self, spec: &KeySpecifier) -> KeysealResult<KeyStatus> {
        let mut arg = fscrypt_get_key_status_arg::zeroed();
        arg.key_spec = fscrypt_key_specifier::from(spec);
        self.ioctl(
            "FS_IOC_GET_ENCRYPTION_KEY_STATUS",
            FS_IOC_GET_ENCRYPTION_KEY_STATUS,
            &mut arg as *mut _ as *mut libc::c_void,
        )?;
        Ok(abi::key_status_from_raw(arg.status))
    }
}

impl EvictionOps for MountHandle {
    fn key_status(&self, spec: &KeySpecifier) -> KeysealResult<KeyStatus> {
        MountHandle::key_status(self, spec)
    }

    fn remove_key(&self, spec: &KeySpecifier) -> KeysealResult<RemovalFlags> {
        MountHandle::remove_key(self, spec)
    }
}

/// Add `key` to `mountpoint`'s keyring. For v1, `v1_ref` carries the locally
/// derived descriptor; for v2 it is `None` and the kernel computes the
/// identifier, which becomes the returned policy's key reference.
pub(crate) fn install_key(
    mountpoint: &Path,
    options: &EncryptionOptions,
    key: &[u8],
    v1_ref: Option<&[u8]>,
) -> KeysealResult<EncryptionPolicy> {
    let mut header = fscrypt_add_key_arg::zeroed();
    match v1_ref {
        Some(raw_ref) => {
            let descriptor: [u8; 8] = raw_ref.try_into().map_err(|_| {
                keyseal_provider::PolicyError::InvalidReferenceSize {
                    version: 1,
                    got: raw_ref.len(),
                }
            })?;
            header.key_spec = fscrypt_key_specifier::from(&KeySpecifier::Descriptor(descriptor));
        }
        None => {
            // Identifier left zeroed: the kernel fills it in.
            header.key_spec.type_ = FSCRYPT_KEY_SPEC_TYPE_IDENTIFIER;
        }
    }
    if options.use_hw_wrapped_key {
        header.__flags |= FSCRYPT_ADD_KEY_FLAG_HW_WRAPPED;
    }
    header.raw_size = key.len() as u32;

    // The argument buffer carries the raw key, so it lives in an auto-zeroing
    // allocation for its whole lifetime.
    let mut arg = Zeroizing::new(vec![0u8; ADD_KEY_ARG_SIZE + key.len()]);
    arg[..ADD_KEY_ARG_SIZE].copy_from_slice(header.as_bytes());
    arg[ADD_KEY_ARG_SIZE..].copy_from_slice(key);

    let handle = MountHandle::open(mountpoint)?;
    handle.ioctl(
        "FS_IOC_ADD_ENCRYPTION_KEY",
        FS_IOC_ADD_ENCRYPTION_KEY,
        arg.as_mut_ptr() as *mut libc::c_void,
    )?;

    let key_raw_ref = match v1_ref {
        Some(raw_ref) => raw_ref.to_vec(),
        None => {
            // Read back the identifier the kernel computed.
            arg[ADD_KEY_ARG_SPEC_U_OFFSET..ADD_KEY_ARG_SPEC_U_OFFSET + KEY_IDENTIFIER_SIZE]
                .to_vec()
        }
    };

    debug!(
        "installed fscrypt key with ref {} to {}",
        key_ref_display(&key_raw_ref),
        mountpoint.display()
    );
    EncryptionPolicy::new(options.clone(), key_raw_ref).map_err(Into::into)
}
