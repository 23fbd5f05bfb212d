//! Thin wrappers over the kernel key-management syscalls.
//!
//! The legacy fscrypt protocol needs "logon"-type keys and a search for a
//! "keyring"-type entry, which the ecosystem keyutils bindings do not
//! express, so `add_key(2)` and `keyctl(2)` are invoked directly.

use std::ffi::CString;
use std::io;

/// Kernel key serial number.
pub(crate) type KeySerial = i32;

/// Special id resolving to the caller's session keyring.
pub(crate) const KEY_SPEC_SESSION_KEYRING: KeySerial = -3;

const KEYCTL_UNLINK: libc::c_int = 9;
const KEYCTL_SEARCH: libc::c_int = 10;

pub(crate) const KEY_TYPE_KEYRING: &str = "keyring";
pub(crate) const KEY_TYPE_LOGON: &str = "logon";

fn cstring(value: &str) -> io::Result<CString> {
    CString::new(value).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))
}

/// `add_key(2)`: insert `payload` as a key of `key_type` named `description`
/// into `keyring`, returning the new key's serial.
pub(crate) fn add_key(
    key_type: &str,
    description: &str,
    payload: &[u8],
    keyring: KeySerial,
) -> io::Result<KeySerial> {
    let key_type = cstring(key_type)?;
    let description = cstring(description)?;
    // SAFETY: pointers reference NUL-terminated strings and a live payload
    // slice for the duration of the call.
    let serial = unsafe {
        libc::syscall(
            libc::SYS_add_key,
            key_type.as_ptr(),
            description.as_ptr(),
            payload.as_ptr() as *const libc::c_void,
            payload.len(),
            keyring,
        )
    };
    if serial < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(serial as KeySerial)
}

/// `keyctl(KEYCTL_SEARCH)`: recursively search `keyring` for a key of
/// `key_type` named `description`.
pub(crate) fn keyctl_search(
    keyring: KeySerial,
    key_type: &str,
    description: &str,
) -> io::Result<KeySerial> {
    let key_type = cstring(key_type)?;
    let description = cstring(description)?;
    // SAFETY: pointers reference NUL-terminated strings for the duration of
    // the call; the destination keyring argument is 0 (no implicit link).
    let serial = unsafe {
        libc::syscall(
            libc::SYS_keyctl,
            KEYCTL_SEARCH,
            keyring,
            key_type.as_ptr(),
            description.as_ptr(),
            0,
        )
    };
    if serial < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(serial as KeySerial)
}

/// `keyctl(KEYCTL_UNLINK)`: unlink `key` from `keyring`.
pub(crate) fn keyctl_unlink(key: KeySerial, keyring: KeySerial) -> io::Result<()> {
    // SAFETY: no pointers involved.
    let rc = unsafe { libc::syscall(libc::SYS_keyctl, KEYCTL_UNLINK, key, keyring) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
