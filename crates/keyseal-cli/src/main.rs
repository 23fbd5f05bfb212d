//! keyseal command-line interface for storage key lifecycle operations.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keyseal_core::{
    generate_storage_key, key_ref_display, logging, retrieve_or_generate_key, EncryptionOptions,
    EncryptionPolicy, Eviction, KeyAuthentication, KeyBuffer, KeyGeneration, KeyStorage,
    KeyringProvider, KeysealConfig, KeysealError, RawFileKeyStorage, WrappedKeySource,
    DEFAULT_CONFIG_PATH, MAX_KEY_SIZE,
};
use keyseal_fscrypt::SystemKeyring;
use log::{error, warn};
use std::path::{Path, PathBuf};

/// Top-level command-line options shared by every subcommand.
#[derive(Parser, Debug)]
#[command(
    name = "keyseal",
    version,
    about = "Filesystem encryption key management (fscrypt keyring install/evict)."
)]
struct Cli {
    /// Path to the keyseal configuration file.
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Report whether the kernel supports the modern key management ioctls.
    Supported,

    /// Generate a fresh storage key and write it to a raw key file.
    Generate {
        /// Destination key file.
        #[arg(long)]
        out: PathBuf,

        /// Key size in bytes.
        #[arg(long, default_value_t = MAX_KEY_SIZE)]
        size: usize,
    },

    /// Install a key into the keyring of a mounted filesystem.
    Install {
        /// Mountpoint of the target filesystem.
        #[arg(long)]
        mount: PathBuf,

        /// Key file to install; see --create for generating one on demand.
        #[arg(long)]
        key_file: PathBuf,

        /// Encryption policy version (1 or 2).
        #[arg(long, default_value_t = 2)]
        version: u32,

        /// Treat the key as a hardware-wrapped blob.
        #[arg(long)]
        hw_wrapped: bool,

        /// Generate and persist a key when the key file does not exist yet.
        #[arg(long)]
        create: bool,

        /// Key size used with --create.
        #[arg(long, default_value_t = MAX_KEY_SIZE)]
        size: usize,
    },

    /// Evict a previously installed key.
    Evict {
        /// Mountpoint of the target filesystem.
        #[arg(long)]
        mount: PathBuf,

        /// Hex key reference printed by install.
        #[arg(long)]
        key_ref: String,

        /// Encryption policy version the key was installed with.
        #[arg(long, default_value_t = 2)]
        version: u32,
    },
}

/// Stand-in for deployments without a secure-hardware collaborator.
struct NoHardwareKeySource;

impl WrappedKeySource for NoHardwareKeySource {
    type Error = KeysealError;

    fn generate_wrapped_key(&self) -> Result<KeyBuffer, KeysealError> {
        Err(KeysealError::InvalidConfig(
            "no hardware-wrapped key source is configured".to_string(),
        ))
    }
}

fn main() {
    logging::init("info");
    if let Err(err) = run() {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = KeysealConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    match cli.command {
        Commands::Supported => {
            let keyring = SystemKeyring::new(&config);
            if keyring.modern_supported() {
                println!("modern keyring ioctls: supported");
            } else {
                println!("modern keyring ioctls: unsupported (legacy session keyring in use)");
            }
        }

        Commands::Generate { out, size } => {
            let gen = KeyGeneration {
                keysize: size,
                allow_gen: true,
                use_hw_wrapped_key: false,
            };
            let key = generate_storage_key(&gen, &NoHardwareKeySource)?;
            RawFileKeyStorage.store_key_atomically(
                &out,
                &staging_path(&out),
                &KeyAuthentication::default(),
                &key,
            )?;
            println!("wrote {} byte key to {}", key.len(), out.display());
        }

        Commands::Install {
            mount,
            key_file,
            version,
            hw_wrapped,
            create,
            size,
        } => {
            let gen = KeyGeneration {
                keysize: size,
                allow_gen: create,
                use_hw_wrapped_key: hw_wrapped,
            };
            let key = retrieve_or_generate_key(
                &RawFileKeyStorage,
                &key_file,
                &staging_path(&key_file),
                &KeyAuthentication::default(),
                &gen,
                &NoHardwareKeySource,
            )
            .with_context(|| format!("failed to obtain key from {}", key_file.display()))?;

            let options = EncryptionOptions {
                version,
                use_hw_wrapped_key: hw_wrapped,
                flags: 0,
            };
            let keyring = SystemKeyring::new(&config);
            let policy = keyring
                .install_key(&mount, &options, &key)
                .with_context(|| format!("failed to install key to {}", mount.display()))?;
            println!("{}", key_ref_display(&policy.key_raw_ref));
        }

        Commands::Evict {
            mount,
            key_ref,
            version,
        } => {
            let raw_ref = hex::decode(key_ref.trim()).context("key reference is not valid hex")?;
            let options = EncryptionOptions {
                version,
                use_hw_wrapped_key: false,
                flags: 0,
            };
            let policy = EncryptionPolicy::new(options, raw_ref)
                .context("key reference does not match the policy version")?;

            let keyring = SystemKeyring::new(&config);
            match keyring
                .evict_key(&mount, &policy)
                .with_context(|| format!("failed to evict key from {}", mount.display()))?
            {
                Eviction::Complete => println!("key evicted"),
                Eviction::PendingBusyFiles => {
                    // The detached cleanup task dies with this process; a
                    // long-lived caller would let it finish.
                    warn!(
                        "key removed from the keyring, but files opened under it are still busy \
                         and stay readable until their holders exit"
                    );
                    println!("key evicted (busy files remain)");
                }
            }
        }
    }

    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut staged = path.as_os_str().to_os_string();
    staged.push(".tmp");
    PathBuf::from(staged)
}
