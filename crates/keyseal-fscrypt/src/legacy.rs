//! Legacy global session keyring path.
//!
//! Used for v1 policies on kernels without the per-filesystem key management
//! ioctls. The raw key is inserted once per filesystem-type name prefix so
//! every fscrypt-capable filesystem driver can find it under its own alias.

use crate::abi::{
    FSCRYPT_MAX_KEY_SIZE, LEGACY_KEY_PAYLOAD_SIZE, LEGACY_KEY_RAW_OFFSET, LEGACY_KEY_SIZE_OFFSET,
};
use crate::keyctl::{self, KeySerial, KEY_SPEC_SESSION_KEYRING, KEY_TYPE_KEYRING, KEY_TYPE_LOGON};
use keyseal_core::{KeysealError, KeysealResult};
use log::{debug, warn};
#[cfg(test)]
use std::sync::Mutex;
use zeroize::Zeroizing;

/// Filesystem-type aliases a key is inserted under.
pub(crate) const NAME_PREFIXES: &[&str] = &["ext4", "f2fs", "fscrypt"];

/// Description of the session sub-keyring holding every fscrypt key.
const LEGACY_KEYRING_DESC: &str = "fscrypt";

/// Seam over the key-management syscalls so alias semantics are testable
/// without a kernel keyring.
pub(crate) trait SessionKeyctl {
    fn find_fscrypt_keyring(&self) -> KeysealResult<KeySerial>;
    fn add_logon_key(
        &self,
        description: &str,
        payload: &[u8],
        keyring: KeySerial,
    ) -> KeysealResult<KeySerial>;
    fn search_logon_key(&self, keyring: KeySerial, description: &str)
        -> KeysealResult<KeySerial>;
    fn unlink_key(&self, key: KeySerial, keyring: KeySerial) -> KeysealResult<()>;
}

/// Real syscall-backed implementation.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SysKeyctl;

impl SessionKeyctl for SysKeyctl {
    fn find_fscrypt_keyring(&self) -> KeysealResult<KeySerial> {
        keyctl::keyctl_search(KEY_SPEC_SESSION_KEYRING, KEY_TYPE_KEYRING, LEGACY_KEYRING_DESC)
            .map_err(|err| KeysealError::kernel("searching for the fscrypt session keyring", err))
    }

    fn add_logon_key(
        &self,
        description: &str,
        payload: &[u8],
        keyring: KeySerial,
    ) -> KeysealResult<KeySerial> {
        keyctl::add_key(KEY_TYPE_LOGON, description, payload, keyring)
            .map_err(|err| KeysealError::kernel(format!("add_key {description}"), err))
    }

    fn search_logon_key(
        &self,
        keyring: KeySerial,
        description: &str,
    ) -> KeysealResult<KeySerial> {
        keyctl::keyctl_search(keyring, KEY_TYPE_LOGON, description)
            .map_err(|err| KeysealError::kernel(format!("searching for key {description}"), err))
    }

    fn unlink_key(&self, key: KeySerial, keyring: KeySerial) -> KeysealResult<()> {
        keyctl::keyctl_unlink(key, keyring)
            .map_err(|err| KeysealError::kernel(format!("unlinking key serial {key}"), err))
    }
}

/// Build the keyring description for one filesystem-type alias.
pub(crate) fn build_legacy_key_name(prefix: &str, raw_ref: &[u8]) -> String {
    format!("{prefix}:{}", hex::encode(raw_ref))
}

/// Install/evict path over the global session keyring.
#[derive(Debug)]
pub(crate) struct LegacyKeyringAdapter<K: SessionKeyctl = SysKeyctl> {
    keyctl: K,
}

impl<K: SessionKeyctl> LegacyKeyringAdapter<K> {
    pub(crate) fn new(keyctl: K) -> Self {
        Self { keyctl }
    }

    /// Insert `key` under every filesystem-type alias. The first failing
    /// alias fails the whole install; aliases already inserted are left in
    /// place (no rollback).
    pub(crate) fn install_key(&self, key: &[u8], raw_ref: &[u8]) -> KeysealResult<()> {
        if key.len() != FSCRYPT_MAX_KEY_SIZE {
            return Err(KeysealError::LegacyKeySize { got: key.len() });
        }

        // Assemble the kernel payload directly inside an auto-zeroing buffer
        // so the key bytes never land in a plain allocation. The mode field
        // stays 0.
        let mut payload = Zeroizing::new(vec![0u8; LEGACY_KEY_PAYLOAD_SIZE]);
        payload[LEGACY_KEY_RAW_OFFSET..LEGACY_KEY_RAW_OFFSET + key.len()].copy_from_slice(key);
        payload[LEGACY_KEY_SIZE_OFFSET..LEGACY_KEY_SIZE_OFFSET + 4]
            .copy_from_slice(&(key.len() as u32).to_ne_bytes());

        let keyring = self.keyctl.find_fscrypt_keyring()?;
        for prefix in NAME_PREFIXES {
            let description = build_legacy_key_name(prefix, raw_ref);
            let serial = self.keyctl.add_logon_key(&description, &payload, keyring)?;
            debug!("added key {serial} ({description}) to keyring {keyring}");
        }
        Ok(())
    }

    /// Unlink every filesystem-type alias. Per-alias failures are logged and
    /// collected; the remaining aliases are still attempted, and any failure
    /// makes the overall result an error.
    pub(crate) fn evict_key(&self, raw_ref: &[u8]) -> KeysealResult<()> {
        let keyring = self.keyctl.find_fscrypt_keyring()?;
        let mut failed = Vec::new();
        for prefix in NAME_PREFIXES {
            let description = build_legacy_key_name(prefix, raw_ref);
            let serial = match self.keyctl.search_logon_key(keyring, &description) {
                Ok(serial) => serial,
                Err(err) => {
                    warn!("failed to find key {description} in keyring {keyring}: {err}");
                    failed.push(description);
                    continue;
                }
            };

            // Unlink rather than revoke or invalidate: unlinking is no less
            // secure and sidesteps kernels that keep stray references to
            // revoked keyring entries.
            match self.keyctl.unlink_key(serial, keyring) {
                Ok(()) => debug!("unlinked key with serial {serial} ref {description}"),
                Err(err) => {
                    warn!("failed to unlink key with serial {serial} ref {description}: {err}");
                    failed.push(description);
                }
            }
        }

        if failed.is_empty() {
            Ok(())
        } else {
            Err(KeysealError::LegacyEviction { failed })
        }
    }
}

/// Call recorder used by the alias-semantics tests.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct MockKeyctl {
    pub fail_add_for: Option<String>,
    pub fail_search_for: Vec<String>,
    pub fail_unlink_for: Vec<String>,
    pub added: Mutex<Vec<(String, Vec<u8>)>>,
    pub unlinked: Mutex<Vec<String>>,
}

#[cfg(test)]
impl SessionKeyctl for MockKeyctl {
    fn find_fscrypt_keyring(&self) -> KeysealResult<KeySerial> {
        Ok(1000)
    }

    fn add_logon_key(
        &self,
        description: &str,
        payload: &[u8],
        _keyring: KeySerial,
    ) -> KeysealResult<KeySerial> {
        if self.fail_add_for.as_deref() == Some(description) {
            return Err(KeysealError::kernel(
                format!("add_key {description}"),
                std::io::Error::from_raw_os_error(libc::EDQUOT),
            ));
        }
        let mut added = self.added.lock().unwrap();
        added.push((description.to_string(), payload.to_vec()));
        Ok(added.len() as KeySerial)
    }

    fn search_logon_key(
        &self,
        _keyring: KeySerial,
        description: &str,
    ) -> KeysealResult<KeySerial> {
        if self.fail_search_for.iter().any(|d| d == description) {
            return Err(KeysealError::kernel(
                format!("searching for key {description}"),
                std::io::Error::from_raw_os_error(libc::ENOENT),
            ));
        }
        Ok(42)
    }

    fn unlink_key(&self, _key: KeySerial, _keyring: KeySerial) -> KeysealResult<()> {
        Ok(())
    }
}
