//! Error surface shared across the workspace.

use keyseal_provider::PolicyError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type KeysealResult<T> = Result<T, KeysealError>;

#[derive(Debug, Error)]
pub enum KeysealError {
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// A privileged kernel call (ioctl, add_key, keyctl) failed; carries the
    /// OS-reported error for diagnostics.
    #[error("{op} failed: {source}")]
    Kernel {
        op: String,
        #[source]
        source: io::Error,
    },

    #[error("generating a storage key is not allowed")]
    GenerationNotAllowed,

    #[error("cannot generate a hardware-wrapped key {got} bytes long")]
    WrappedKeySize { got: usize },

    #[error("no key found at {0} and generation is not allowed")]
    KeyMissing(PathBuf),

    #[error("random source failure: {0}")]
    RandomSource(#[source] rand::Error),

    #[error("legacy keyring requires a full-size key (got {got} bytes)")]
    LegacyKeySize { got: usize },

    /// Some legacy keyring aliases were unlinked and others were not. The
    /// inserted aliases stay in place; a stray alias is a harmless extra
    /// reference, while reporting success here would not be.
    #[error("failed to unlink legacy keyring alias(es): {}", .failed.join(", "))]
    LegacyEviction { failed: Vec<String> },

    #[error("invalid key material at {path}: {reason}")]
    InvalidKey { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl KeysealError {
    /// Shorthand for kernel-call failures.
    pub fn kernel(op: impl Into<String>, source: io::Error) -> Self {
        KeysealError::Kernel {
            op: op.into(),
            source,
        }
    }
}
