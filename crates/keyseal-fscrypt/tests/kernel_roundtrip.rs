//! Kernel round-trip coverage.
//!
//! Needs root and a mounted fscrypt-capable filesystem; opt in by pointing
//! KEYSEAL_TEST_MOUNT at its mountpoint, e.g.
//! `KEYSEAL_TEST_MOUNT=/mnt/scratch cargo test -p keyseal-fscrypt`.
//! Without the variable the tests skip themselves so the default suite stays
//! hermetic.

use keyseal_core::{KeysealConfig, MAX_KEY_SIZE};
use keyseal_fscrypt::SystemKeyring;
use keyseal_provider::{
    EncryptionOptions, Eviction, KeyringProvider, KEY_DESCRIPTOR_SIZE, KEY_IDENTIFIER_SIZE,
};
use rand::rngs::OsRng;
use rand::RngCore;
use std::path::PathBuf;

fn test_mount() -> Option<PathBuf> {
    match std::env::var_os("KEYSEAL_TEST_MOUNT") {
        Some(mount) => Some(PathBuf::from(mount)),
        None => {
            eprintln!("skipping kernel round-trip test: KEYSEAL_TEST_MOUNT is not set");
            None
        }
    }
}

fn fresh_key() -> Vec<u8> {
    let mut key = vec![0u8; MAX_KEY_SIZE];
    OsRng.fill_bytes(&mut key);
    key
}

#[test]
fn v2_install_then_evict_round_trip() {
    let Some(mount) = test_mount() else { return };
    let config = KeysealConfig {
        probe_path: mount.clone(),
    };
    let keyring = SystemKeyring::new(&config);
    assert!(
        keyring.modern_supported(),
        "v2 round trip needs the modern key management ioctls"
    );

    let policy = keyring
        .install_key(&mount, &EncryptionOptions::v2(), &fresh_key())
        .expect("install should succeed on a supporting kernel");
    assert_eq!(policy.key_raw_ref.len(), KEY_IDENTIFIER_SIZE);

    let eviction = keyring
        .evict_key(&mount, &policy)
        .expect("evict should succeed right after install");
    assert_eq!(eviction, Eviction::Complete);
}

#[test]
fn v1_install_then_evict_round_trip() {
    let Some(mount) = test_mount() else { return };
    let config = KeysealConfig {
        probe_path: mount.clone(),
    };
    let keyring = SystemKeyring::new(&config);

    let policy = keyring
        .install_key(&mount, &EncryptionOptions::v1(), &fresh_key())
        .expect("install should succeed on a supporting kernel");
    assert_eq!(policy.key_raw_ref.len(), KEY_DESCRIPTOR_SIZE);

    let eviction = keyring
        .evict_key(&mount, &policy)
        .expect("evict should succeed right after install");
    assert_eq!(eviction, Eviction::Complete);
}
