//! Raw-file key storage.
//!
//! A [`KeyStorage`] implementation for deployments where key protection is
//! delegated to filesystem permissions. Encrypted-at-rest storage is an
//! external collaborator and implements the same trait elsewhere.

use crate::error::{KeysealError, KeysealResult};
use keyseal_provider::{KeyAuthentication, KeyBuffer, KeyStorage};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// File-backed key storage with write-to-temp-then-publish persistence and
/// 0o400 permissions on the published key file. The authentication token is
/// accepted for interface compatibility and not consulted.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFileKeyStorage;

impl RawFileKeyStorage {
    fn invalid(path: &Path, reason: impl Into<String>) -> KeysealError {
        KeysealError::InvalidKey {
            path: PathBuf::from(path),
            reason: reason.into(),
        }
    }
}

impl KeyStorage for RawFileKeyStorage {
    type Error = KeysealError;

    fn retrieve_key(
        &self,
        key_path: &Path,
        _auth: &KeyAuthentication,
    ) -> KeysealResult<KeyBuffer> {
        let bytes = fs::read(key_path)?;
        if bytes.is_empty() {
            return Err(Self::invalid(key_path, "file is empty"));
        }
        Ok(Zeroizing::new(bytes))
    }

    fn store_key_atomically(
        &self,
        key_path: &Path,
        tmp_path: &Path,
        _auth: &KeyAuthentication,
        key: &[u8],
    ) -> KeysealResult<()> {
        if key.is_empty() {
            return Err(Self::invalid(key_path, "refusing to store an empty key"));
        }

        let parent = key_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        if tmp_path.exists() {
            fs::remove_file(tmp_path)?;
        }

        let mut staged = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(tmp_path)?;
        staged.write_all(key)?;
        staged.flush()?;
        fs::set_permissions(tmp_path, fs::Permissions::from_mode(0o400))?;
        staged.sync_all()?;
        drop(staged);

        fs::rename(tmp_path, key_path)?;
        let _ = sync_dir(parent);
        Ok(())
    }
}

fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir).and_then(|file| file.sync_all())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn store_then_retrieve_round_trips() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join("key");
        let tmp_path = dir.path().join("key.tmp");
        let auth = KeyAuthentication::default();
        let storage = RawFileKeyStorage;

        storage
            .store_key_atomically(&key_path, &tmp_path, &auth, &[0x42u8; 64])
            .unwrap();
        assert!(!tmp_path.exists(), "staging file should be published");

        let key = storage.retrieve_key(&key_path, &auth).unwrap();
        assert_eq!(&key[..], &[0x42u8; 64][..]);
    }

    #[test]
    fn store_applies_restrictive_permissions() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join("key");
        let storage = RawFileKeyStorage;

        storage
            .store_key_atomically(
                &key_path,
                &dir.path().join("key.tmp"),
                &KeyAuthentication::default(),
                &[0x11u8; 32],
            )
            .unwrap();

        let mode = fs::metadata(&key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o400);
    }

    #[test]
    fn store_creates_missing_parent() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join("nested").join("key");
        let tmp_path = dir.path().join("nested").join("key.tmp");

        RawFileKeyStorage
            .store_key_atomically(&key_path, &tmp_path, &KeyAuthentication::default(), &[1u8])
            .unwrap();
        assert!(key_path.exists());
    }

    #[test]
    fn store_replaces_stale_staging_file() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join("key");
        let tmp_path = dir.path().join("key.tmp");
        fs::write(&tmp_path, b"stale").unwrap();

        RawFileKeyStorage
            .store_key_atomically(&key_path, &tmp_path, &KeyAuthentication::default(), &[2u8; 8])
            .unwrap();
        assert_eq!(fs::read(&key_path).unwrap(), vec![2u8; 8]);
    }

    #[test]
    fn retrieve_rejects_empty_file() {
        let dir = tempdir().unwrap();
        let key_path = dir.path().join("key");
        fs::write(&key_path, b"").unwrap();

        let err = RawFileKeyStorage
            .retrieve_key(&key_path, &KeyAuthentication::default())
            .unwrap_err();
        match err {
            KeysealError::InvalidKey { path, .. } => assert_eq!(path, key_path),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn retrieve_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = RawFileKeyStorage
            .retrieve_key(&dir.path().join("absent"), &KeyAuthentication::default())
            .unwrap_err();
        assert!(matches!(err, KeysealError::Io(_)));
    }
}
