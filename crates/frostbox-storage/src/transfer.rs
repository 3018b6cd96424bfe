//! Upload and download loops over an OpenDAL operator.

use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};

use opendal::Operator;

use frostbox_core::{
    FbError, FbResult, RangeSink, RemoteObjectInfo, CONTENT_TYPE, METADATA_NONCE_KEY,
};

/// Bytes read from the body per upload part.
const UPLOAD_CHUNK: usize = 8 * 1024 * 1024;
/// Bytes fetched per download range request.
const DOWNLOAD_CHUNK: u64 = 8 * 1024 * 1024;

/// Archive bucket transfer client.
///
/// Thin and deliberately sequential: uploads stream one part at a time, and
/// downloads fetch ranges strictly in increasing offset order. The
/// envelope-stripping sink on the receiving end of a download depends on
/// exactly that delivery order, so the download loop must never go
/// concurrent.
pub struct TransferClient {
    op: Operator,
}

impl TransferClient {
    pub fn new(op: Operator) -> Self {
        Self { op }
    }

    /// Upload `body` to `key`, tagged with the frostbox content type and the
    /// object's nonce in user metadata. `counter` advances as encrypted
    /// bytes go out.
    pub async fn upload<R: Read>(
        &self,
        key: &str,
        mut body: R,
        nonce_hex: &str,
        counter: &AtomicU64,
    ) -> FbResult<()> {
        let mut meta = HashMap::new();
        meta.insert(METADATA_NONCE_KEY.to_string(), nonce_hex.to_string());
        let mut writer = self
            .op
            .writer_with(key)
            .content_type(CONTENT_TYPE)
            .user_metadata(meta)
            .await
            .map_err(to_storage)?;

        let mut buf = vec![0u8; UPLOAD_CHUNK];
        loop {
            let n = fill(&mut body, &mut buf)?;
            if n == 0 {
                break;
            }
            if let Err(e) = writer.write(buf[..n].to_vec()).await {
                // Leave no half-written object behind on a failed upload.
                let _ = writer.abort().await;
                return Err(to_storage(e));
            }
            counter.fetch_add(n as u64, Ordering::Relaxed);
        }
        writer.close().await.map_err(to_storage)?;
        tracing::debug!(key, "upload complete");
        Ok(())
    }

    /// Ranged download into `sink`, one range at a time, offsets strictly
    /// increasing from zero. Returns the byte count delivered.
    pub async fn download(
        &self,
        key: &str,
        size: u64,
        sink: &mut dyn RangeSink,
        counter: &AtomicU64,
    ) -> FbResult<u64> {
        let reader = self.op.reader(key).await.map_err(to_storage)?;
        let mut offset = 0u64;
        while offset < size {
            let end = size.min(offset + DOWNLOAD_CHUNK);
            let buffer = reader.read(offset..end).await.map_err(to_storage)?;
            let bytes = buffer.to_bytes();
            if bytes.is_empty() {
                return Err(FbError::Storage(format!(
                    "object {key} ended at {offset} bytes, expected {size}"
                )));
            }
            sink.write_at(offset, &bytes)?;
            counter.fetch_add(bytes.len() as u64, Ordering::Relaxed);
            offset += bytes.len() as u64;
        }
        Ok(offset)
    }

    /// Head one object.
    ///
    /// Storage class and restore text stay `None` when the backend client
    /// does not surface them; callers treat that as an unknown restore
    /// state rather than an error.
    pub async fn stat(&self, key: &str) -> FbResult<RemoteObjectInfo> {
        let meta = self.op.stat(key).await.map_err(to_storage)?;
        Ok(RemoteObjectInfo {
            key: key.to_string(),
            size: meta.content_length(),
            last_modified: meta.last_modified(),
            content_type: meta.content_type().map(str::to_string),
            storage_class: None,
            restore: None,
            nonce_hex: meta
                .user_metadata()
                .and_then(|m| m.get(METADATA_NONCE_KEY))
                .cloned(),
        })
    }

    /// All object keys in the bucket.
    pub async fn list(&self) -> FbResult<Vec<String>> {
        let entries = self.op.list("").await.map_err(to_storage)?;
        Ok(entries
            .into_iter()
            .filter(|e| e.metadata().mode().is_file())
            .map(|e| e.path().to_string())
            .collect())
    }
}

fn to_storage(err: opendal::Error) -> FbError {
    FbError::Storage(err.to_string())
}

fn fill<R: Read>(body: &mut R, buf: &mut [u8]) -> FbResult<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match body.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FbError::from_io(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opendal::Operator;

    fn memory_client() -> TransferClient {
        let op = Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        TransferClient::new(op)
    }

    struct Collector {
        data: Vec<u8>,
    }

    impl RangeSink for Collector {
        fn write_at(&mut self, offset: u64, buf: &[u8]) -> FbResult<usize> {
            // Ranges must arrive contiguous and in order.
            assert_eq!(offset as usize, self.data.len());
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }
    }

    #[tokio::test]
    async fn test_download_delivers_ordered_ranges() {
        let client = memory_client();
        let body: Vec<u8> = (0..(2 * DOWNLOAD_CHUNK + 5) as usize)
            .map(|i| (i % 241) as u8)
            .collect();
        client.op.write("obj", body.clone()).await.unwrap();

        let mut sink = Collector { data: Vec::new() };
        let counter = AtomicU64::new(0);
        let delivered = client
            .download("obj", body.len() as u64, &mut sink, &counter)
            .await
            .unwrap();

        assert_eq!(delivered, body.len() as u64);
        assert_eq!(counter.load(Ordering::Relaxed), body.len() as u64);
        assert_eq!(sink.data, body);
    }

    #[tokio::test]
    async fn test_stat_reports_size() {
        let client = memory_client();
        client.op.write("small", vec![1u8; 777]).await.unwrap();

        let info = client.stat("small").await.unwrap();
        assert_eq!(info.key, "small");
        assert_eq!(info.size, 777);
    }

    #[tokio::test]
    async fn test_stat_missing_object_is_storage_error() {
        let client = memory_client();
        match client.stat("nope").await {
            Err(FbError::Storage(_)) => {}
            other => panic!("expected Storage, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_returns_keys() {
        let client = memory_client();
        client.op.write("a", vec![0u8; 1]).await.unwrap();
        client.op.write("b", vec![0u8; 2]).await.unwrap();

        let mut keys = client.list().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);
    }
}
