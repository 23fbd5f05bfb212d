//! System keyring backend built on the kernel fscrypt interfaces.
//!
//! Integrates with the host via:
//! - the per-filesystem key management ioctls (`FS_IOC_ADD_ENCRYPTION_KEY`
//!   and friends) on kernels that have them
//! - the legacy global session keyring (`add_key(2)`/`keyctl(2)`) otherwise
//!
//! [`SystemKeyring`] owns the mutex serializing every keyring-mutating kernel
//! call and picks the right path per install/evict.

pub mod abi;
mod keyctl;
mod legacy;
mod modern;
mod probe;
mod reaper;
mod system;

pub use probe::KeyringCapability;
pub use reaper::{ReaperOutcome, INITIAL_BACKOFF, MAX_BACKOFF};
pub use system::SystemKeyring;
