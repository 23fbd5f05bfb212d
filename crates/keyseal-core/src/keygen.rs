//! Storage key generation.

use crate::error::{KeysealError, KeysealResult};
use keyseal_provider::{KeyBuffer, WrappedKeySource, MAX_KEY_SIZE};
use log::debug;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// Caller intent for key generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGeneration {
    pub keysize: usize,
    pub allow_gen: bool,
    pub use_hw_wrapped_key: bool,
}

impl KeyGeneration {
    /// A request that forbids generation outright; used by callers that only
    /// ever retrieve existing keys.
    pub fn never() -> Self {
        Self {
            keysize: 0,
            allow_gen: false,
            use_hw_wrapped_key: false,
        }
    }
}

fn random_key(size: usize) -> KeysealResult<KeyBuffer> {
    let mut key = Zeroizing::new(vec![0u8; size]);
    OsRng
        .try_fill_bytes(&mut key)
        .map_err(KeysealError::RandomSource)?;
    Ok(key)
}

/// Produce a new raw key per `gen`, delegating to the secure-hardware
/// collaborator when a wrapped key is requested.
///
/// # Errors
/// `GenerationNotAllowed` when the request forbids generation;
/// `WrappedKeySize` when a wrapped key is requested at any size other than
/// [`MAX_KEY_SIZE`] (checked before the hardware is consulted);
/// `RandomSource` when the OS random source cannot fill the buffer.
pub fn generate_storage_key<W>(gen: &KeyGeneration, hw_source: &W) -> KeysealResult<KeyBuffer>
where
    W: WrappedKeySource<Error = KeysealError>,
{
    if !gen.allow_gen {
        return Err(KeysealError::GenerationNotAllowed);
    }
    if gen.use_hw_wrapped_key {
        if gen.keysize != MAX_KEY_SIZE {
            return Err(KeysealError::WrappedKeySize { got: gen.keysize });
        }
        debug!("generating wrapped storage key");
        hw_source.generate_wrapped_key()
    } else {
        debug!("generating standard storage key");
        random_key(gen.keysize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Wrapped-key source that records whether it was consulted.
    struct RecordingHwSource {
        called: AtomicBool,
    }

    impl RecordingHwSource {
        fn new() -> Self {
            Self {
                called: AtomicBool::new(false),
            }
        }
    }

    impl WrappedKeySource for RecordingHwSource {
        type Error = KeysealError;

        fn generate_wrapped_key(&self) -> KeysealResult<KeyBuffer> {
            self.called.store(true, Ordering::SeqCst);
            Ok(Zeroizing::new(vec![0x77u8; MAX_KEY_SIZE]))
        }
    }

    #[test]
    fn generation_disallowed_fails_regardless_of_other_fields() {
        let hw = RecordingHwSource::new();
        for use_hw in [false, true] {
            let gen = KeyGeneration {
                keysize: MAX_KEY_SIZE,
                allow_gen: false,
                use_hw_wrapped_key: use_hw,
            };
            let err = generate_storage_key(&gen, &hw).unwrap_err();
            assert!(matches!(err, KeysealError::GenerationNotAllowed));
        }
        assert!(!hw.called.load(Ordering::SeqCst));
    }

    #[test]
    fn never_forbids_generation() {
        let gen = KeyGeneration::never();
        assert!(!gen.allow_gen);
    }

    #[test]
    fn wrong_wrapped_size_fails_before_hardware_call() {
        let hw = RecordingHwSource::new();
        let gen = KeyGeneration {
            keysize: 32,
            allow_gen: true,
            use_hw_wrapped_key: true,
        };
        let err = generate_storage_key(&gen, &hw).unwrap_err();
        assert!(matches!(err, KeysealError::WrappedKeySize { got: 32 }));
        assert!(!hw.called.load(Ordering::SeqCst));
    }

    #[test]
    fn wrapped_generation_delegates_to_hardware() {
        let hw = RecordingHwSource::new();
        let gen = KeyGeneration {
            keysize: MAX_KEY_SIZE,
            allow_gen: true,
            use_hw_wrapped_key: true,
        };
        let key = generate_storage_key(&gen, &hw).unwrap();
        assert!(hw.called.load(Ordering::SeqCst));
        assert_eq!(&key[..], &[0x77u8; MAX_KEY_SIZE][..]);
    }

    #[test]
    fn standard_generation_fills_requested_size() {
        let hw = RecordingHwSource::new();
        let gen = KeyGeneration {
            keysize: MAX_KEY_SIZE,
            allow_gen: true,
            use_hw_wrapped_key: false,
        };
        let first = generate_storage_key(&gen, &hw).unwrap();
        let second = generate_storage_key(&gen, &hw).unwrap();
        assert_eq!(first.len(), MAX_KEY_SIZE);
        assert_eq!(second.len(), MAX_KEY_SIZE);
        assert_ne!(&first[..], &second[..], "two fresh keys should differ");
        assert!(!hw.called.load(Ordering::SeqCst));
    }
}
