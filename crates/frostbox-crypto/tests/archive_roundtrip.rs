//! End-to-end: vault → naming → envelope, the way a put/get pair uses them.

use std::io::Read;

use frostbox_core::{RemoteObjectInfo, CONTENT_TYPE};
use frostbox_crypto::{decode, encode, encrypted_len, vault, DecryptingWriter, EncryptingReader, OffsetSink};
use frostbox_core::RangeSink;
use frostbox_secure::SecureBytes;

#[test]
fn test_put_then_get_through_the_vault() {
    let dir = tempfile::tempdir().unwrap();
    let vault_path = dir.path().join("vault");
    let password = SecureBytes::from_vec(b"abc12345".to_vec());

    // init: fresh secrets, locked to disk.
    let mut secrets = vault::create();
    secrets.bucket = "backups".into();
    secrets.region = "us-east-1".into();
    secrets.endpoint = "https://s3.us-east-1.amazonaws.com".into();
    vault::lock(&password, secrets, &vault_path).unwrap();

    // put: unlock, seal the name, encrypt the content.
    let secrets = vault::unlock(&vault_path, &password).unwrap();
    let record = encode(&secrets.master_key, "photos-2026.tar").unwrap();

    let plain: Vec<u8> = (0..100_000u32).flat_map(|i| i.to_le_bytes()).collect();
    let mut reader = EncryptingReader::new(&record.content_key, plain.as_slice()).unwrap();
    let mut uploaded = Vec::new();
    reader.read_to_end(&mut uploaded).unwrap();
    assert_eq!(uploaded.len() as u64, encrypted_len(plain.len() as u64));

    // get: decode the listing entry back to name + content key.
    let info = RemoteObjectInfo {
        key: record.remote_key.clone(),
        size: uploaded.len() as u64,
        last_modified: None,
        content_type: Some(CONTENT_TYPE.to_string()),
        storage_class: Some("DEEP_ARCHIVE".into()),
        restore: Some(r#"ongoing-request="false""#.into()),
        nonce_hex: Some(hex::encode(record.nonce)),
    };
    let object = decode(Some(&secrets.master_key), &info, true).unwrap();
    assert_eq!(object.name.as_deref(), Some("photos-2026.tar"));
    let content_key = object.content_key.unwrap();

    // Ranged delivery through the positional adapter, as the download
    // transfer loop produces it.
    let writer = DecryptingWriter::new(&content_key, Vec::new()).unwrap();
    let mut sink = OffsetSink::new(writer).unwrap();
    let mut offset = 0u64;
    for chunk in uploaded.chunks(8 * 1024) {
        sink.write_at(offset, chunk).unwrap();
        offset += chunk.len() as u64;
    }
    let restored = sink.into_inner().finish().unwrap();
    assert_eq!(restored, plain);

    secrets.master_key.destroy();
    frostbox_secure::wipe_all();
}
