//! Command implementations.
//!
//! Every command that touches the archive follows the same shape: prompt
//! for the vault password, unlock, build the storage client, do the work,
//! and destroy each secret as soon as its last use is behind it. `main`
//! wipes whatever survives, but not leaning on that keeps the window small.

use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use frostbox_core::{FbError, FbResult, RestoreStatus};
use frostbox_crypto::{
    decode, encode, encrypted_len, vault, DecryptingWriter, EncryptingReader, OffsetSink,
    RemoteObject,
};
use frostbox_secure::SecureBytes;
use frostbox_storage::{build_operator, StorageConfig, TransferClient};

use crate::progress::spawn_observer;
use crate::prompt;

// ── `frostbox init` ───────────────────────────────────────────────────────────

pub async fn cmd_init(vault_path: &Path, reinit: bool) -> FbResult<()> {
    if vault_path.exists() && !reinit {
        return Err(FbError::Format(format!(
            "vault already exists at {} (use --reinit to replace it)",
            vault_path.display()
        )));
    }

    let mut secrets = vault::create();

    if vault_path.exists() {
        // Re-key: fresh master key, but carry the connection parameters
        // over as prompt defaults. The old vault is kept — its master key
        // still guards every object uploaded under it.
        let old_password = prompt::password("Current vault password: ")?;
        let old = vault::unlock(vault_path, &old_password)?;
        old_password.destroy();

        secrets.bucket = old.bucket.clone();
        secrets.region = old.region.clone();
        secrets.endpoint = old.endpoint.clone();
        old.master_key.destroy();
        old.access_key_id.destroy();
        old.secret_access_key.destroy();

        let backup = vault_path.with_extension("bak");
        std::fs::rename(vault_path, &backup)?;
        println!(
            "Old vault moved to {} — keep it until nothing in the archive was \
             uploaded under its master key.",
            backup.display()
        );
    }

    secrets.endpoint = prompt::line("S3 endpoint", &secrets.endpoint)?;
    secrets.region = prompt::line("Region", &secrets.region)?;
    secrets.bucket = prompt::line("Bucket", &secrets.bucket)?;
    secrets.access_key_id = prompt::secret("Access key id")?;
    secrets.secret_access_key = prompt::secret("Secret access key")?;

    let password = prompt::new_password()?;
    vault::lock(&password, secrets, vault_path)?;
    password.destroy();

    println!("Vault written to {}", vault_path.display());
    Ok(())
}

// ── `frostbox put` ────────────────────────────────────────────────────────────

pub async fn cmd_put(vault_path: &Path, file: &Path) -> FbResult<()> {
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            FbError::Format(format!("{} has no usable file name", file.display()))
        })?
        .to_string();
    let meta = std::fs::metadata(file)?;
    if !meta.is_file() {
        return Err(FbError::Format(format!("{} is not a regular file", file.display())));
    }

    let password = prompt::password("Vault password: ")?;
    let secrets = vault::unlock(vault_path, &password)?;
    password.destroy();

    let client = client_from(&secrets)?;
    let record = encode(&secrets.master_key, &filename)?;
    destroy_secrets(&secrets);

    let total = encrypted_len(meta.len());
    let counter = Arc::new(AtomicU64::new(0));
    let observer = spawn_observer(counter.clone(), total, "put");

    let source = std::io::BufReader::new(std::fs::File::open(file)?);
    let body = EncryptingReader::new(&record.content_key, source)?;
    let outcome = client
        .upload(&record.remote_key, body, &hex::encode(record.nonce), &counter)
        .await;
    observer.finish().await;
    record.content_key.destroy();
    outcome?;

    println!("Uploaded {} ({} encrypted)", filename, fmt_bytes(total));
    println!("  storage id: {}", record.remote_key);
    Ok(())
}

// ── `frostbox get` ────────────────────────────────────────────────────────────

pub async fn cmd_get(
    vault_path: &Path,
    key: &str,
    dir: Option<&Path>,
    output: Option<&str>,
) -> FbResult<()> {
    let password = prompt::password("Vault password: ")?;
    let secrets = vault::unlock(vault_path, &password)?;
    password.destroy();

    let client = client_from(&secrets)?;
    let info = client.stat(key).await?;
    let object = decode(Some(&secrets.master_key), &info, true)?;
    destroy_secrets(&secrets);

    match object.restore {
        RestoreStatus::Archived => {
            return Err(FbError::Storage(format!(
                "{key} is in cold storage; initiate a restore with your storage \
                 provider and retry once it completes"
            )));
        }
        RestoreStatus::Recovering => {
            return Err(FbError::Storage(format!(
                "{key} is being restored from cold storage; retry later"
            )));
        }
        // Unknown means the backend did not say; the download will tell.
        RestoreStatus::Ready | RestoreStatus::Unknown => {}
    }

    let name = object.name.clone().unwrap_or_else(|| key.to_string());
    let dest = dir
        .unwrap_or_else(|| Path::new("."))
        .join(output.unwrap_or(&name));
    if dest.exists() {
        return Err(FbError::Format(format!(
            "{} already exists; pass -o to choose another destination",
            dest.display()
        )));
    }

    let result = download_to(&client, key, &object, info.size, &dest).await;
    if result.is_err() {
        let _ = std::fs::remove_file(&dest);
    }
    result?;

    println!("Restored {} → {}", name, dest.display());
    Ok(())
}

async fn download_to(
    client: &TransferClient,
    key: &str,
    object: &RemoteObject,
    encrypted_size: u64,
    dest: &Path,
) -> FbResult<()> {
    let content_key = object
        .content_key
        .as_ref()
        .ok_or_else(|| FbError::Format(format!("no content key derived for {key}")))?;

    let file = std::io::BufWriter::new(std::fs::File::create(dest)?);
    let writer = DecryptingWriter::new(content_key, file)?;
    content_key.destroy();
    let mut sink = OffsetSink::new(writer)?;

    let counter = Arc::new(AtomicU64::new(0));
    let observer = spawn_observer(counter.clone(), encrypted_size, "get");
    let outcome = client.download(key, encrypted_size, &mut sink, &counter).await;
    observer.finish().await;
    outcome?;

    let buffered = sink.into_inner().finish()?;
    let file = buffered.into_inner().map_err(|e| FbError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

// ── `frostbox list` ───────────────────────────────────────────────────────────

pub async fn cmd_list(vault_path: &Path) -> FbResult<()> {
    let password = prompt::password("Vault password: ")?;
    let secrets = vault::unlock(vault_path, &password)?;
    password.destroy();

    let client = client_from(&secrets)?;
    let keys = client.list().await?;

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    for key in keys {
        let info = client.stat(&key).await?;
        match decode(Some(&secrets.master_key), &info, false) {
            Ok(object) => entries.push((key, object)),
            Err(FbError::Foreign(_)) => {
                tracing::debug!(key = %key, "skipping object not created by frostbox");
                skipped += 1;
            }
            Err(err) => {
                tracing::warn!(key = %key, %err, "skipping undecodable object");
                skipped += 1;
            }
        }
    }
    destroy_secrets(&secrets);

    entries.sort_by(|a, b| a.1.name.cmp(&b.1.name));

    let id_width = entries.iter().map(|(k, _)| k.len()).max().unwrap_or(10);
    println!(
        "{:>10}  {:>16}  {:>10}  {:<id_width$}  FILENAME",
        "SIZE", "DATE", "STATUS", "STORAGE ID"
    );
    let mut total = 0u64;
    for (key, object) in &entries {
        println!(
            "{:>10}  {:>16}  {:>10}  {:<id_width$}  {}",
            fmt_bytes(object.size),
            fmt_date(object.last_modified),
            object.restore,
            key,
            object.name.as_deref().unwrap_or("?"),
        );
        total += object.size;
    }
    println!("{} objects, {} stored", entries.len(), fmt_bytes(total));
    if skipped > 0 {
        println!("({skipped} foreign or undecodable objects skipped)");
    }
    Ok(())
}

// ── `frostbox head` ───────────────────────────────────────────────────────────

/// Exit code 0 when the object is ready to download, 2 otherwise, so shell
/// scripts can poll a restore without parsing output. Status-only: the
/// master key never leaves the vault for this command.
pub async fn cmd_head(vault_path: &Path, key: &str) -> FbResult<i32> {
    let password = prompt::password("Vault password: ")?;
    let secrets = vault::unlock(vault_path, &password)?;
    password.destroy();

    let client = client_from(&secrets)?;
    destroy_secrets(&secrets);
    let info = client.stat(key).await?;
    let object = decode(None, &info, false)?;

    println!("Size:      {}", fmt_bytes(object.size));
    println!("Uploaded:  {}", fmt_date(object.last_modified));
    println!("Status:    {}", object.restore);
    if let Some(class) = &object.storage_class {
        println!("Class:     {class}");
    }

    Ok(if object.restore == RestoreStatus::Ready { 0 } else { 2 })
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn client_from(secrets: &vault::VaultSecrets) -> FbResult<TransferClient> {
    let cfg = StorageConfig {
        endpoint: secrets.endpoint.clone(),
        region: secrets.region.clone(),
        bucket: secrets.bucket.clone(),
        access_key_id: credential_string(&secrets.access_key_id, "access key id")?,
        secret_access_key: credential_string(&secrets.secret_access_key, "secret access key")?,
        storage_class: None,
    };
    let op = build_operator(&cfg)?;
    Ok(TransferClient::new(op))
}

fn credential_string(secret: &SecureBytes, label: &str) -> FbResult<String> {
    let view = secret.expose()?;
    String::from_utf8(view.to_vec())
        .map_err(|_| FbError::Format(format!("vault {label} is not UTF-8")))
}

fn destroy_secrets(secrets: &vault::VaultSecrets) {
    secrets.master_key.destroy();
    secrets.access_key_id.destroy();
    secrets.secret_access_key.destroy();
}

fn fmt_date(date: Option<chrono::DateTime<chrono::Utc>>) -> String {
    date.map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_bytes() {
        assert_eq!(fmt_bytes(512), "512 B");
        assert_eq!(fmt_bytes(2048), "2.0 KB");
        assert_eq!(fmt_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(fmt_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_fmt_date() {
        assert_eq!(fmt_date(None), "-");
        let date = chrono::DateTime::parse_from_rfc3339("2026-08-30T10:11:12Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(fmt_date(Some(date)), "2026-08-30 10:11");
    }

    #[test]
    fn test_credential_string_rejects_non_utf8() {
        let bad = SecureBytes::from_vec(vec![0xFF, 0xFE]);
        match credential_string(&bad, "access key id") {
            Err(FbError::Format(msg)) => assert!(msg.contains("access key id")),
            other => panic!("expected Format, got {other:?}"),
        }
    }
}
