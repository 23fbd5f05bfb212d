//! System keyring manager: capability-checked dispatch between the modern
//! and legacy paths, serialized by one process-wide mutex.

use crate::legacy::{LegacyKeyringAdapter, SysKeyctl};
use crate::modern::{self, MountHandle};
use crate::probe::KeyringCapability;
use crate::reaper::spawn_busy_file_reaper;
use keyseal_core::{derive_key_reference, key_ref_display, KeysealConfig, KeysealError};
use keyseal_provider::{
    EncryptionOptions, EncryptionPolicy, Eviction, KeySpecifier, KeyringProvider, PolicyError,
};
use log::{debug, error, warn};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Keyring backend for the running kernel.
///
/// All keyring-mutating operations, including the detached busy-file cleanup
/// task's retries, serialize on the same mutex: install and evict race inside
/// the kernel keyring subsystem otherwise, even across unrelated keys. The
/// mutex is held per discrete kernel call, never across a sleep.
pub struct SystemKeyring {
    keyring_mutex: Arc<Mutex<()>>,
    capability: KeyringCapability,
    legacy: LegacyKeyringAdapter,
}

impl SystemKeyring {
    /// Backend probing the kernel through `config.probe_path`.
    pub fn new(config: &KeysealConfig) -> Self {
        Self::with_capability(KeyringCapability::detect(config.probe_path.clone()))
    }

    /// Backend with a caller-supplied capability cell.
    pub fn with_capability(capability: KeyringCapability) -> Self {
        Self {
            keyring_mutex: Arc::new(Mutex::new(())),
            capability,
            legacy: LegacyKeyringAdapter::new(SysKeyctl),
        }
    }
}

/// Compute the key reference backing a v1 policy. Hardware-wrapped keys only
/// keep the first half of the buffer stable across boots (the second half is
/// an ephemeral wrapping), so only that half feeds the reference.
fn derive_v1_ref(options: &EncryptionOptions, key: &[u8]) -> Vec<u8> {
    let stable = if options.use_hw_wrapped_key {
        &key[..key.len() / 2]
    } else {
        key
    };
    derive_key_reference(stable).to_vec()
}

impl KeyringProvider for SystemKeyring {
    type Error = KeysealError;

    fn install_key(
        &self,
        mountpoint: &Path,
        options: &EncryptionOptions,
        key: &[u8],
    ) -> Result<EncryptionPolicy, KeysealError> {
        let _lock = self.keyring_mutex.lock().unwrap();
        match options.version {
            1 => {
                let raw_ref = derive_v1_ref(options, key);
                if !self.capability.modern_supported() {
                    self.legacy.install_key(key, &raw_ref)?;
                    return EncryptionPolicy::new(options.clone(), raw_ref).map_err(Into::into);
                }
                modern::install_key(mountpoint, options, key, Some(&raw_ref))
            }
            2 => modern::install_key(mountpoint, options, key, None),
            other => Err(PolicyError::UnsupportedVersion(other).into()),
        }
    }

    fn evict_key(
        &self,
        mountpoint: &Path,
        policy: &EncryptionPolicy,
    ) -> Result<Eviction, KeysealError> {
        let _lock = self.keyring_mutex.lock().unwrap();
        if policy.options.version == 1 && !self.capability.modern_supported() {
            self.legacy.evict_key(&policy.key_raw_ref)?;
            return Ok(Eviction::Complete);
        }

        let spec = KeySpecifier::for_policy(policy)?;
        let handle = MountHandle::open(mountpoint)?;
        let flags = handle.remove_key(&spec)?;

        let ref_display = key_ref_display(&policy.key_raw_ref);
        debug!(
            "evicted fscrypt key with ref {ref_display} from {}",
            mountpoint.display()
        );
        if flags.other_users {
            // Should never happen: keys are only added and removed as root.
            error!("unexpected case: key with ref {ref_display} is still added by other users");
        } else if flags.files_busy {
            warn!(
                "files still open after removing key with ref {ref_display}; \
                 punting busy file cleanup to a worker thread"
            );
            spawn_busy_file_reaper(
                mountpoint.to_path_buf(),
                spec,
                ref_display,
                Arc::clone(&self.keyring_mutex),
            );
            return Ok(Eviction::PendingBusyFiles);
        }
        Ok(Eviction::Complete)
    }

    fn modern_supported(&self) -> bool {
        self.capability.modern_supported()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_reference_uses_whole_key() {
        let key = [0x5Au8; 64];
        let reference = derive_v1_ref(&EncryptionOptions::v1(), &key);
        assert_eq!(reference, derive_key_reference(&key).to_vec());
    }

    #[test]
    fn hardware_wrapped_v1_reference_uses_first_half_only() {
        let mut key = [0x5Au8; 64];
        let options = EncryptionOptions {
            version: 1,
            use_hw_wrapped_key: true,
            flags: 0,
        };
        let reference = derive_v1_ref(&options, &key);
        assert_eq!(reference, derive_key_reference(&key[..32]).to_vec());

        // Mutating the ephemeral second half must not change the reference.
        key[63] ^= 0xFF;
        assert_eq!(reference, derive_v1_ref(&options, &key));
    }

    #[test]
    fn install_rejects_unknown_policy_versions_before_any_kernel_call() {
        let keyring = SystemKeyring::with_capability(KeyringCapability::with_probe(|| {
            panic!("capability must not be probed for an invalid version")
        }));
        let options = EncryptionOptions {
            version: 3,
            use_hw_wrapped_key: false,
            flags: 0,
        };
        let err = keyring
            .install_key(Path::new("/nonexistent"), &options, &[0u8; 64])
            .unwrap_err();
        assert!(matches!(
            err,
            KeysealError::Policy(PolicyError::UnsupportedVersion(3))
        ));
    }

    #[test]
    fn modern_supported_reflects_the_capability_cell() {
        let keyring = SystemKeyring::with_capability(KeyringCapability::with_probe(|| false));
        assert!(!keyring.modern_supported());
        let keyring = SystemKeyring::with_capability(KeyringCapability::with_probe(|| true));
        assert!(keyring.modern_supported());
    }
}
