//! Retrieve-or-generate orchestration.

use crate::error::{KeysealError, KeysealResult};
use crate::keygen::{generate_storage_key, KeyGeneration};
use keyseal_provider::{KeyAuthentication, KeyBuffer, KeyStorage, WrappedKeySource};
use log::{debug, info};
use std::path::Path;

/// Load the key at `key_path` if one exists, otherwise generate a fresh key
/// per `gen` and persist it atomically before returning it.
///
/// Any generation or persistence failure is fatal to the whole operation; no
/// partially-stored key is left referenced.
pub fn retrieve_or_generate_key<S, W>(
    storage: &S,
    key_path: &Path,
    tmp_path: &Path,
    auth: &KeyAuthentication,
    gen: &KeyGeneration,
    hw_source: &W,
) -> KeysealResult<KeyBuffer>
where
    S: KeyStorage<Error = KeysealError>,
    W: WrappedKeySource<Error = KeysealError>,
{
    if key_path.exists() {
        debug!("key exists, using: {}", key_path.display());
        return storage.retrieve_key(key_path, auth);
    }

    if !gen.allow_gen {
        return Err(KeysealError::KeyMissing(key_path.to_path_buf()));
    }

    info!("creating new key at {}", key_path.display());
    let key = generate_storage_key(gen, hw_source)?;
    storage.store_key_atomically(key_path, tmp_path, auth, &key)?;
    Ok(key)
}
