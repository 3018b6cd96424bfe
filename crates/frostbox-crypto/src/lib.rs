//! frostbox-crypto: vault format, key derivation, naming, streaming envelope
//!
//! Key hierarchy:
//! ```text
//! Password (user)
//!   └── Vault Key: Argon2id(password, vault salt)        — unseals the vault
//! Master Key (256-bit random, lives only inside the sealed vault)
//!   ├── Content Key (per object): Argon2id(master, object nonce)
//!   └── Filename seal: AES-256-GCM under the master key itself,
//!       with a widened 32-byte nonce (the same object nonce)
//! ```
//!
//! One Argon2id hardness profile is used everywhere; per-object keys are
//! re-derived on demand and never stored.

pub mod kdf;
pub mod naming;
pub mod stream;
pub mod vault;

pub use kdf::derive_key;
pub use naming::{decode, encode, restore_status, ObjectRecord, RemoteObject};
pub use stream::{
    encrypted_len, DecryptingWriter, EncryptingReader, EnvelopeState, OffsetSink,
};
pub use vault::VaultSecrets;

/// AEAD nonce size used for the vault body and envelope packages.
pub const AEAD_NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;
