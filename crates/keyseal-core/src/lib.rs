//! Core building blocks shared by keyseal crates and binaries.
//!
//! Key generation, reference derivation, storage orchestration, and the
//! ambient error/logging/configuration stack live here so the kernel-facing
//! crates can focus on the fscrypt interfaces themselves.

pub mod config;
pub mod error;
pub mod keygen;
pub mod keyref;
pub mod logging;
pub mod service;
pub mod storage;

pub use config::{KeysealConfig, DEFAULT_CONFIG_PATH, DEFAULT_PROBE_PATH};
pub use error::{KeysealError, KeysealResult};
pub use keygen::{generate_storage_key, KeyGeneration};
pub use keyref::{derive_key_reference, key_ref_display};
pub use service::retrieve_or_generate_key;
pub use storage::RawFileKeyStorage;

pub use keyseal_provider::{
    EncryptionOptions, EncryptionPolicy, Eviction, KeyAuthentication, KeyBuffer, KeySpecifier,
    KeyStatus, KeyStorage, KeyringProvider, PolicyError, RemovalFlags, WrappedKeySource,
    KEY_DESCRIPTOR_SIZE, KEY_IDENTIFIER_SIZE, MAX_KEY_SIZE,
};
