//! External collaborator contracts.
//!
//! Durable (encrypted) key storage and hardware-backed wrapped-key generation
//! are owned by other components; keyseal only depends on these seams.

use crate::KeyBuffer;
use std::error::Error;
use std::fmt;
use std::path::Path;
use zeroize::Zeroizing;

/// Opaque authentication token handed through to the storage collaborator.
#[derive(Clone, Default)]
pub struct KeyAuthentication {
    pub secret: Zeroizing<Vec<u8>>,
}

impl KeyAuthentication {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            secret: Zeroizing::new(secret),
        }
    }
}

impl fmt::Debug for KeyAuthentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAuthentication")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Durable key storage: serializes a raw key to, and back from, a protected
/// file addressed by path.
pub trait KeyStorage {
    type Error: Error + Send + Sync + 'static;

    /// Load the key stored at `key_path`.
    fn retrieve_key(
        &self,
        key_path: &Path,
        auth: &KeyAuthentication,
    ) -> Result<KeyBuffer, Self::Error>;

    /// Persist `key` at `key_path` with write-to-temp-then-publish semantics;
    /// `tmp_path` is the staging location the implementation may use.
    fn store_key_atomically(
        &self,
        key_path: &Path,
        tmp_path: &Path,
        auth: &KeyAuthentication,
        key: &[u8],
    ) -> Result<(), Self::Error>;
}

/// Secure-hardware collaborator producing opaque wrapped key blobs of the
/// fixed maximum key size.
pub trait WrappedKeySource {
    type Error: Error + Send + Sync + 'static;

    fn generate_wrapped_key(&self) -> Result<KeyBuffer, Self::Error>;
}
