//! OpenDAL Operator factory for the archive bucket

use anyhow::{Context, Result};
use opendal::Operator;

/// Storage tier for newly uploaded objects. Retrieval requires an explicit
/// restore and can take hours, which is the right trade for cold backups.
pub const DEFAULT_STORAGE_CLASS: &str = "DEEP_ARCHIVE";

/// Connection parameters for one archive bucket.
///
/// Credentials live here as plain strings only for the moment between vault
/// unlock and operator construction; the caller drops the config as soon as
/// the operator exists.
#[derive(Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Overrides [`DEFAULT_STORAGE_CLASS`] when set (useful against MinIO
    /// and other backends without archive tiers).
    pub storage_class: Option<String>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key_id", &"[REDACTED]")
            .field("secret_access_key", &"[REDACTED]")
            .field("storage_class", &self.storage_class)
            .finish()
    }
}

/// Build an OpenDAL Operator for any S3-compatible endpoint.
///
/// Uses path-style addressing (default in opendal 0.55), which is what
/// MinIO and most self-hosted endpoints require.
pub fn build_operator(cfg: &StorageConfig) -> Result<Operator> {
    // opendal 0.55: S3 builder uses consuming pattern (methods take `self`, return `Self`)
    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(&cfg.access_key_id)
        .secret_access_key(&cfg.secret_access_key)
        .default_storage_class(
            cfg.storage_class.as_deref().unwrap_or(DEFAULT_STORAGE_CLASS),
        );

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> StorageConfig {
        StorageConfig {
            endpoint: "http://localhost:9000".to_string(),
            region: "us-east-1".to_string(),
            bucket: "test-bucket".to_string(),
            access_key_id: "test-key".to_string(),
            secret_access_key: "test-secret".to_string(),
            storage_class: None,
        }
    }

    #[test]
    fn test_build_operator_valid() {
        let op = build_operator(&test_config());
        assert!(op.is_ok(), "operator construction should succeed");
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let text = format!("{:?}", test_config());
        assert!(!text.contains("test-secret"));
        assert!(!text.contains("test-key"));
        assert!(text.contains("[REDACTED]"));
    }
}
