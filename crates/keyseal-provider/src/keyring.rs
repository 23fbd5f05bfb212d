//! Keyring backend contract used by install/evict orchestration.
//!
//! Concrete implementations live in system crates such as `keyseal-fscrypt`.
//! The trait deliberately models the whole "hand a key to the kernel, take it
//! back later" lifecycle so callers never branch on which kernel ABI is in
//! play.

use crate::policy::{EncryptionOptions, EncryptionPolicy};
use std::error::Error;
use std::path::Path;

/// Result of an eviction that the kernel accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    /// The key is fully gone.
    Complete,
    /// The key was removed from the keyring but files opened under it are
    /// still busy; a detached cleanup task is retrying the removal.
    PendingBusyFiles,
}

/// Kernel-reported status of a key on a filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Absent,
    Present,
    IncompletelyRemoved,
    Unknown(u32),
}

/// Flags reported by the remove-key operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemovalFlags {
    /// Other users still hold the key. Should not occur when every operation
    /// runs as root; surfaced as an anomaly, not a failure.
    pub other_users: bool,
    /// Files opened under the key are still busy.
    pub files_busy: bool,
}

/// High-level keyring backend trait.
pub trait KeyringProvider {
    type Error: Error + Send + Sync + 'static;

    /// Install `key` for `mountpoint` and return the resulting policy. The
    /// policy's key reference is derived locally for v1 and computed by the
    /// kernel for v2.
    fn install_key(
        &self,
        mountpoint: &Path,
        options: &EncryptionOptions,
        key: &[u8],
    ) -> Result<EncryptionPolicy, Self::Error>;

    /// Evict the key named by `policy` from `mountpoint`.
    fn evict_key(
        &self,
        mountpoint: &Path,
        policy: &EncryptionPolicy,
    ) -> Result<Eviction, Self::Error>;

    /// Whether the kernel supports the modern per-filesystem key management
    /// operations.
    fn modern_supported(&self) -> bool;
}
