//! frostbox-core: shared types, error taxonomy, and constants
//!
//! Everything here is consumed by both the crypto layer and the storage
//! collaborator, so this crate stays free of heavyweight dependencies.

pub mod error;
pub mod types;

pub use error::{FbError, FbResult};
pub use types::{RangeSink, RemoteObjectInfo, RestoreStatus};

/// Size of the master key and every derived content key, in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of the per-object nonce. It doubles as the KDF salt for the content
/// key and as the AEAD nonce for the sealed filename, so it is deliberately
/// wide: 32 random bytes drawn fresh per archived object.
pub const OBJECT_NONCE_SIZE: usize = 32;

/// Content-type marker identifying objects that belong to frostbox. Remote
/// buckets may hold unrelated objects; anything without this marker is
/// rejected as foreign.
pub const CONTENT_TYPE: &str = "application/x-frostbox";

/// User-metadata key carrying the per-object nonce as lowercase hex.
pub const METADATA_NONCE_KEY: &str = "nonce";

/// Maximum length of an encoded remote object key. S3 keys are capped at
/// 1024 characters.
pub const MAX_REMOTE_KEY_LEN: usize = 1024;
