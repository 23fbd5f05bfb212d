#![forbid(unsafe_code)]

//! Contracts shared across keyseal.
//!
//! The rest of the workspace is free to define orchestration and operator
//! surfaces without depending on the concrete kernel integration.

pub mod collaborators;
pub mod keyring;
pub mod policy;

pub use collaborators::{KeyAuthentication, KeyStorage, WrappedKeySource};
pub use keyring::{Eviction, KeyStatus, KeyringProvider, RemovalFlags};
pub use policy::{
    EncryptionOptions, EncryptionPolicy, KeySpecifier, PolicyError, KEY_DESCRIPTOR_SIZE,
    KEY_IDENTIFIER_SIZE, MAX_KEY_SIZE,
};

use zeroize::Zeroizing;

/// Raw key material. The buffer is overwritten on every drop path, including
/// early error returns, so secrets never linger after release.
pub type KeyBuffer = Zeroizing<Vec<u8>>;
