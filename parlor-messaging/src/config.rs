use serde::Deserialize;

use parlor_shared::clients::minio::MinioSettings;

use crate::services::messages::DeletePolicy;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    Minio,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db")]
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub db_pool_size: u32,
    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: String,
    #[serde(default = "default_minio_endpoint")]
    pub minio_endpoint: String,
    #[serde(default = "default_minio_access_key")]
    pub minio_access_key: String,
    #[serde(default = "default_minio_secret_key")]
    pub minio_secret_key: String,
    #[serde(default = "default_minio_bucket")]
    pub minio_bucket: String,
    #[serde(default = "default_minio_public_url")]
    pub minio_public_url: String,
    #[serde(default)]
    pub enforce_message_ownership: bool,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_port() -> u16 { 3004 }
fn default_db() -> String { "parlor.db".into() }
fn default_pool_size() -> u32 { 8 }
fn default_storage_backend() -> StorageBackend { StorageBackend::Local }
fn default_uploads_dir() -> String { "uploads".into() }
fn default_minio_endpoint() -> String { "http://localhost:9000".into() }
fn default_minio_access_key() -> String { "minioadmin".into() }
fn default_minio_secret_key() -> String { "minioadmin".into() }
fn default_minio_bucket() -> String { "parlor-messages".into() }
fn default_minio_public_url() -> String { "http://localhost:9000".into() }
fn default_max_upload_bytes() -> usize { 10 * 1024 * 1024 }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            database_url: default_db(),
            db_pool_size: default_pool_size(),
            storage_backend: default_storage_backend(),
            uploads_dir: default_uploads_dir(),
            minio_endpoint: default_minio_endpoint(),
            minio_access_key: default_minio_access_key(),
            minio_secret_key: default_minio_secret_key(),
            minio_bucket: default_minio_bucket(),
            minio_public_url: default_minio_public_url(),
            enforce_message_ownership: false,
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PARLOR_MESSAGING").separator("__"))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        if self.enforce_message_ownership {
            DeletePolicy::SenderOnly
        } else {
            DeletePolicy::AnyMember
        }
    }

    pub fn minio_settings(&self) -> MinioSettings {
        MinioSettings {
            endpoint: self.minio_endpoint.clone(),
            access_key: self.minio_access_key.clone(),
            secret_key: self.minio_secret_key.clone(),
            bucket: self.minio_bucket.clone(),
            public_url: self.minio_public_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_defaults() {
        let config: AppConfig = config::Config::builder()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.port, 3004);
        assert_eq!(config.storage_backend, StorageBackend::Local);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.delete_policy(), DeletePolicy::AnyMember);
    }

    #[test]
    fn overrides_are_applied() {
        let config: AppConfig = config::Config::builder()
            .set_override("enforce_message_ownership", true)
            .unwrap()
            .set_override("storage_backend", "minio")
            .unwrap()
            .set_override("port", 8080)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.storage_backend, StorageBackend::Minio);
        assert_eq!(config.delete_policy(), DeletePolicy::SenderOnly);
        assert_eq!(config.minio_settings().bucket, "parlor-messages");
    }
}
