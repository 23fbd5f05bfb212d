//! Encryption policy model and the kernel-facing key specifier shape.
//!
//! A policy names a key: an 8-byte descriptor for v1 policies (derived in
//! userspace) or a 16-byte identifier for v2 policies (computed and returned
//! by the kernel, opaque here). The specifier is the wire form of that name
//! used by the key management ioctls.

use thiserror::Error;

/// Size of a v1 policy key descriptor.
pub const KEY_DESCRIPTOR_SIZE: usize = 8;
/// Size of a v2 policy key identifier.
pub const KEY_IDENTIFIER_SIZE: usize = 16;
/// Largest raw key the kernel accepts; also the exact size of a
/// hardware-wrapped key blob.
pub const MAX_KEY_SIZE: usize = 64;

/// Construction/translation failures for policies and specifiers. These are
/// programming or integrity errors and are never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid key reference size {got} for v{version} encryption policy")]
    InvalidReferenceSize { version: u32, got: usize },
    #[error("invalid encryption policy version: {0}")]
    UnsupportedVersion(u32),
}

/// Filesystem encryption settings, fixed once a policy is built from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionOptions {
    /// Policy version, 1 or 2.
    pub version: u32,
    /// Whether the raw key is a hardware-wrapped blob rather than plain key
    /// material.
    pub use_hw_wrapped_key: bool,
    /// Policy flag bits (padding size and similar) consumed by the policy
    /// layer when directories are bound to the key.
    pub flags: u8,
}

impl EncryptionOptions {
    pub fn v1() -> Self {
        Self {
            version: 1,
            use_hw_wrapped_key: false,
            flags: 0,
        }
    }

    pub fn v2() -> Self {
        Self {
            version: 2,
            use_hw_wrapped_key: false,
            flags: 0,
        }
    }

    /// Reference size the version calls for, or `UnsupportedVersion`.
    pub fn key_ref_size(&self) -> Result<usize, PolicyError> {
        match self.version {
            1 => Ok(KEY_DESCRIPTOR_SIZE),
            2 => Ok(KEY_IDENTIFIER_SIZE),
            other => Err(PolicyError::UnsupportedVersion(other)),
        }
    }
}

/// An installed (or installable) key identity: options plus the raw key
/// reference addressing the key in the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionPolicy {
    pub options: EncryptionOptions,
    pub key_raw_ref: Vec<u8>,
}

impl EncryptionPolicy {
    /// Build a policy, enforcing that the reference length matches the
    /// version exactly.
    pub fn new(options: EncryptionOptions, key_raw_ref: Vec<u8>) -> Result<Self, PolicyError> {
        let expected = options.key_ref_size()?;
        if key_raw_ref.len() != expected {
            return Err(PolicyError::InvalidReferenceSize {
                version: options.version,
                got: key_raw_ref.len(),
            });
        }
        Ok(Self {
            options,
            key_raw_ref,
        })
    }
}

/// Kernel-facing name of a key, in the exact shape the key management ioctls
/// expect. Derived from a policy on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpecifier {
    Descriptor([u8; KEY_DESCRIPTOR_SIZE]),
    Identifier([u8; KEY_IDENTIFIER_SIZE]),
}

impl KeySpecifier {
    /// Translate a policy's key reference into the specifier for its version.
    pub fn for_policy(policy: &EncryptionPolicy) -> Result<Self, PolicyError> {
        let raw = policy.key_raw_ref.as_slice();
        match policy.options.version {
            1 => raw
                .try_into()
                .map(KeySpecifier::Descriptor)
                .map_err(|_| PolicyError::InvalidReferenceSize {
                    version: 1,
                    got: raw.len(),
                }),
            2 => raw
                .try_into()
                .map(KeySpecifier::Identifier)
                .map_err(|_| PolicyError::InvalidReferenceSize {
                    version: 2,
                    got: raw.len(),
                }),
            other => Err(PolicyError::UnsupportedVersion(other)),
        }
    }

    /// The descriptor or identifier bytes.
    pub fn raw_bytes(&self) -> &[u8] {
        match self {
            KeySpecifier::Descriptor(bytes) => bytes,
            KeySpecifier::Identifier(bytes) => bytes,
        }
    }
}
