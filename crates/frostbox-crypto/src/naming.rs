//! Object naming: sealed filenames and per-object content keys.
//!
//! Every uploaded object gets a fresh 32-byte nonce that drives both halves
//! of its identity:
//!
//! * the remote key is the filename sealed with AES-256-GCM under the master
//!   key, using the nonce directly (widened 32-byte nonce variant), then
//!   base64-encoded with `/` → `.` and `+` → `-` so the result never splits
//!   into pseudo-directories on S3 consoles;
//! * the content key is `Argon2id(master, nonce)`.
//!
//! The nonce itself travels as plaintext hex in the object's user metadata —
//! it is not a secret, only a uniqueness guarantee.

use std::fmt;

use aes::Aes256;
use aes_gcm::aead::consts::U32;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{AesGcm, Nonce};
use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::RngCore;

use frostbox_core::{
    FbError, FbResult, RemoteObjectInfo, RestoreStatus, CONTENT_TYPE, MAX_REMOTE_KEY_LEN,
    OBJECT_NONCE_SIZE,
};
use frostbox_secure::SecureBytes;

use crate::kdf::derive_key;

/// AES-256-GCM with a 32-byte nonce, so the object nonce is usable directly.
type NameCipher = AesGcm<Aes256, U32>;

/// Everything needed to upload one object.
pub struct ObjectRecord {
    pub nonce: [u8; OBJECT_NONCE_SIZE],
    pub remote_key: String,
    pub content_key: SecureBytes,
}

impl fmt::Debug for ObjectRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRecord")
            .field("nonce", &hex::encode(self.nonce))
            .field("remote_key", &self.remote_key)
            .field("content_key", &"[REDACTED]")
            .finish()
    }
}

/// A decoded remote object. `name`, `nonce` and `content_key` are only
/// populated when a master key was available to the decoder.
pub struct RemoteObject {
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub restore: RestoreStatus,
    pub storage_class: Option<String>,
    pub name: Option<String>,
    pub nonce: Option<[u8; OBJECT_NONCE_SIZE]>,
    pub content_key: Option<SecureBytes>,
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("size", &self.size)
            .field("restore", &self.restore)
            .field("name", &self.name)
            .field("content_key", &self.content_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Seal `filename` for upload: draw a nonce, produce the remote key and
/// derive the object's content key.
pub fn encode(master: &SecureBytes, filename: &str) -> FbResult<ObjectRecord> {
    let mut nonce = [0u8; OBJECT_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = name_cipher(master)?;
    let sealed = cipher
        .encrypt(Nonce::<U32>::from_slice(&nonce), filename.as_bytes())
        .map_err(|_| FbError::Format("filename too large to seal".into()))?;

    let mut remote_key = STANDARD_NO_PAD.encode(&sealed);
    // '/' would create pseudo-directories, '+' breaks URL contexts.
    remote_key = remote_key.replace('/', ".").replace('+', "-");
    if remote_key.len() > MAX_REMOTE_KEY_LEN {
        return Err(FbError::Format(format!(
            "encrypted filename is {} characters, limit is {MAX_REMOTE_KEY_LEN}",
            remote_key.len()
        )));
    }

    let content_key = {
        let view = master.expose()?;
        derive_key(&view, &nonce)?
    };

    Ok(ObjectRecord { nonce, remote_key, content_key })
}

/// Decode a stored object's metadata back into a [`RemoteObject`].
///
/// With `master` absent only the status fields are filled in (enough for a
/// listing of restore states). With it present the remote key is unsealed
/// back to the filename; `want_key` additionally re-derives the content key,
/// which costs a full Argon2id pass and is only worth it before a download.
pub fn decode(
    master: Option<&SecureBytes>,
    info: &RemoteObjectInfo,
    want_key: bool,
) -> FbResult<RemoteObject> {
    if info.content_type.as_deref() != Some(CONTENT_TYPE) {
        return Err(FbError::Foreign(info.key.clone()));
    }

    let mut object = RemoteObject {
        size: info.size,
        last_modified: info.last_modified,
        restore: restore_status(info.storage_class.as_deref(), info.restore.as_deref()),
        storage_class: info.storage_class.clone(),
        name: None,
        nonce: None,
        content_key: None,
    };
    let master = match master {
        Some(master) => master,
        None => return Ok(object),
    };

    let nonce_hex = info
        .nonce_hex
        .as_deref()
        .ok_or_else(|| FbError::Format(format!("object {} has no nonce metadata", info.key)))?;
    let nonce_bytes = hex::decode(nonce_hex)
        .map_err(|_| FbError::Format(format!("object {} has a malformed nonce", info.key)))?;
    let nonce: [u8; OBJECT_NONCE_SIZE] = nonce_bytes
        .try_into()
        .map_err(|_| FbError::Format(format!("object {} has a wrong-size nonce", info.key)))?;

    let sealed = STANDARD_NO_PAD
        .decode(info.key.replace('.', "/").replace('-', "+"))
        .map_err(|_| FbError::Format(format!("object key {} is not valid base64", info.key)))?;
    let cipher = name_cipher(master)?;
    let name_bytes = cipher
        .decrypt(Nonce::<U32>::from_slice(&nonce), sealed.as_slice())
        .map_err(|_| FbError::Auth)?;
    let name = String::from_utf8(name_bytes)
        .map_err(|_| FbError::Format(format!("object {} decodes to a non-UTF-8 name", info.key)))?;

    if want_key {
        let view = master.expose()?;
        object.content_key = Some(derive_key(&view, &nonce)?);
    }
    object.name = Some(name);
    object.nonce = Some(nonce);
    Ok(object)
}

/// Normalize the storage-class / restore-header pair into a single status.
///
/// Backends differ in what they surface here, so unrecognized combinations
/// degrade to `Unknown` rather than failing the whole listing.
pub fn restore_status(storage_class: Option<&str>, restore: Option<&str>) -> RestoreStatus {
    if let Some(restore) = restore {
        if restore.contains(r#"ongoing-request="true""#) {
            return RestoreStatus::Recovering;
        }
        if restore.contains(r#"ongoing-request="false""#) {
            return RestoreStatus::Ready;
        }
        return RestoreStatus::Unknown;
    }
    match storage_class {
        Some("DEEP_ARCHIVE") | Some("GLACIER") => RestoreStatus::Archived,
        Some(_) => RestoreStatus::Ready,
        None => RestoreStatus::Unknown,
    }
}

fn name_cipher(master: &SecureBytes) -> FbResult<NameCipher> {
    let view = master.expose()?;
    NameCipher::new_from_slice(&view)
        .map_err(|_| FbError::Format("master key must be 32 bytes".into()))
}
