//! The encrypted profile vault.
//!
//! On-disk layout:
//! ```text
//! magic(6) = "FBXVLT" || version(4, LE) || salt(32) || nonce(12) || ciphertext
//! ```
//! The ciphertext is AES-256-GCM over the packed secret bundle, keyed by
//! Argon2id(password, salt). The packed form is an explicit, versioned
//! schema: six 4-byte little-endian field lengths in declared order, then
//! the concatenated field bytes. New fields require a version bump and a
//! migration path — there is no forward-compatible best-effort parse.

use std::fmt;
use std::io::Write;
use std::path::Path;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;

use frostbox_core::{FbError, FbResult, KEY_SIZE};
use frostbox_secure::SecureBytes;

use crate::kdf::derive_key;
use crate::{AEAD_NONCE_SIZE, TAG_SIZE};

const MAGIC: [u8; 6] = *b"FBXVLT";
const VERSION: u32 = 1;
const SALT_SIZE: usize = 32;
const HEADER_LEN: usize = 6 + 4 + SALT_SIZE;

/// Packed-schema field count: master key, access key id, secret access key,
/// bucket, region, endpoint — in exactly that order.
const FIELD_COUNT: usize = 6;

/// The decrypted secret bundle.
///
/// Owned by whichever command invocation unlocked the vault; every secret
/// field must be destroyed before that invocation exits.
pub struct VaultSecrets {
    /// 32-byte master key; never leaves the process, never persisted
    /// outside the sealed vault body.
    pub master_key: SecureBytes,
    pub access_key_id: SecureBytes,
    pub secret_access_key: SecureBytes,
    pub bucket: String,
    pub region: String,
    pub endpoint: String,
}

impl fmt::Debug for VaultSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSecrets")
            .field("master_key", &"[REDACTED]")
            .field("access_key_id", &"[REDACTED]")
            .field("secret_access_key", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Fresh secret bundle with a random master key and empty credentials.
/// The caller fills in credentials and connection parameters before `lock`.
pub fn create() -> VaultSecrets {
    VaultSecrets {
        master_key: SecureBytes::random(KEY_SIZE),
        access_key_id: SecureBytes::alloc(0),
        secret_access_key: SecureBytes::alloc(0),
        bucket: String::new(),
        region: String::new(),
        endpoint: String::new(),
    }
}

/// Read and decrypt the vault at `path`.
///
/// Magic/version mismatch fails with `Format` before any key derivation.
/// An authentication failure — wrong password or corruption, by design
/// indistinguishable — fails with `Auth`.
pub fn unlock(path: &Path, password: &SecureBytes) -> FbResult<VaultSecrets> {
    let data = std::fs::read(path)?;
    if data.len() < HEADER_LEN + AEAD_NONCE_SIZE + TAG_SIZE {
        return Err(FbError::Format("vault file truncated".into()));
    }
    if data[..6] != MAGIC {
        return Err(FbError::Format("not a frostbox vault".into()));
    }
    let version = u32_le(&data[6..10]);
    if version != VERSION {
        return Err(FbError::Format(format!("unsupported vault version {version}")));
    }
    let salt = &data[10..HEADER_LEN];

    let vault_key = {
        let pwd = password.expose()?;
        derive_key(&pwd, salt)?
    };
    let plain = open(&vault_key, &data[HEADER_LEN..]);
    vault_key.destroy();
    let plain = plain?;

    let secrets = {
        let view = plain.expose()?;
        unpack(&view)
    };
    plain.destroy();
    secrets
}

/// Encrypt `secrets` under `password` and write the vault to `path`.
///
/// Draws a fresh salt and AEAD nonce on every save. The write is a direct,
/// non-atomic overwrite; callers that want a backup rename the old file
/// first. Consumes the bundle: its secret fields are destroyed once the
/// packed image exists.
pub fn lock(password: &SecureBytes, secrets: VaultSecrets, path: &Path) -> FbResult<()> {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);

    let vault_key = {
        let pwd = password.expose()?;
        derive_key(&pwd, &salt)?
    };

    let packed = pack(&secrets)?;
    // The packed image now duplicates the secret fields; release the originals.
    secrets.master_key.destroy();
    secrets.access_key_id.destroy();
    secrets.secret_access_key.destroy();

    let sealed = seal(&vault_key, &packed);
    vault_key.destroy();
    packed.destroy();
    let sealed = sealed?;

    let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&sealed);

    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(&out)?;
    Ok(())
}

// ── packed schema ──────────────────────────────────────────────────────────

fn pack(secrets: &VaultSecrets) -> FbResult<SecureBytes> {
    let master = secrets.master_key.expose()?;
    let key_id = secrets.access_key_id.expose()?;
    let key_secret = secrets.secret_access_key.expose()?;
    let fields: [&[u8]; FIELD_COUNT] = [
        &master[..],
        &key_id[..],
        &key_secret[..],
        secrets.bucket.as_bytes(),
        secrets.region.as_bytes(),
        secrets.endpoint.as_bytes(),
    ];

    let body_len: usize = fields.iter().map(|f| f.len()).sum();
    let mut packed = Vec::with_capacity(4 * FIELD_COUNT + body_len);
    for field in &fields {
        packed.extend_from_slice(&(field.len() as u32).to_le_bytes());
    }
    for field in &fields {
        packed.extend_from_slice(field);
    }
    Ok(SecureBytes::from_vec(packed))
}

fn unpack(plain: &[u8]) -> FbResult<VaultSecrets> {
    let lengths_end = 4 * FIELD_COUNT;
    if plain.len() < lengths_end {
        return Err(FbError::Format("vault payload truncated".into()));
    }

    let mut lens = [0usize; FIELD_COUNT];
    for (i, len) in lens.iter_mut().enumerate() {
        *len = u32_le(&plain[4 * i..4 * (i + 1)]) as usize;
        // Legitimate fields are never empty; a zero length means the
        // plaintext was mangled in a way the AEAD could not catch.
        if *len == 0 {
            return Err(FbError::Format("corrupted vault: empty field".into()));
        }
    }
    if lens.iter().sum::<usize>() + lengths_end != plain.len() {
        return Err(FbError::Format("corrupted vault: field lengths disagree".into()));
    }

    let mut offset = lengths_end;
    let mut next = |len: usize| {
        let slice = &plain[offset..offset + len];
        offset += len;
        slice
    };

    Ok(VaultSecrets {
        master_key: SecureBytes::from_vec(next(lens[0]).to_vec()),
        access_key_id: SecureBytes::from_vec(next(lens[1]).to_vec()),
        secret_access_key: SecureBytes::from_vec(next(lens[2]).to_vec()),
        bucket: utf8_field(next(lens[3]), "bucket")?,
        region: utf8_field(next(lens[4]), "region")?,
        endpoint: utf8_field(next(lens[5]), "endpoint")?,
    })
}

fn utf8_field(bytes: &[u8], name: &str) -> FbResult<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| FbError::Format(format!("corrupted vault: {name} is not UTF-8")))
}

fn u32_le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

// ── AEAD seal/open ─────────────────────────────────────────────────────────

fn vault_cipher(key: &SecureBytes) -> FbResult<Aes256Gcm> {
    let view = key.expose()?;
    Aes256Gcm::new_from_slice(&view)
        .map_err(|_| FbError::Format("vault key must be 32 bytes".into()))
}

/// Output: `nonce(12) || ciphertext || tag(16)`.
fn seal(key: &SecureBytes, plaintext: &SecureBytes) -> FbResult<Vec<u8>> {
    let cipher = vault_cipher(key)?;
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let view = plaintext.expose()?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), &view[..])
        .map_err(|_| FbError::Format("vault payload too large to seal".into()))?;

    let mut out = Vec::with_capacity(AEAD_NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open(key: &SecureBytes, body: &[u8]) -> FbResult<SecureBytes> {
    if body.len() < AEAD_NONCE_SIZE + TAG_SIZE {
        return Err(FbError::Format("vault body truncated".into()));
    }
    let cipher = vault_cipher(key)?;
    let (nonce, ciphertext) = body.split_at(AEAD_NONCE_SIZE);
    let plain = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| FbError::Auth)?;
    Ok(SecureBytes::from_vec(plain))
}
