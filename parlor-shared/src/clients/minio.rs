use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::Client as S3Client;

/// Connection settings for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct MinioSettings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub public_url: String,
}

#[derive(Clone)]
pub struct MinioClient {
    client: S3Client,
    bucket: String,
    public_url: String,
}

impl MinioClient {
    pub async fn new(settings: &MinioSettings) -> Self {
        let credentials = Credentials::new(
            settings.access_key.as_str(),
            settings.secret_key.as_str(),
            None,
            None,
            "minio",
        );

        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(settings.endpoint.as_str())
            .region(Region::new("us-east-1"))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let client = S3Client::from_conf(config);

        // bucket may already exist; any real problem shows up on first upload
        if let Err(e) = client.create_bucket().bucket(&settings.bucket).send().await {
            tracing::debug!(bucket = %settings.bucket, error = %e, "create_bucket skipped");
        }

        tracing::info!(endpoint = %settings.endpoint, bucket = %settings.bucket, "MinIO client initialized");

        Self {
            client,
            bucket: settings.bucket.clone(),
            public_url: settings.public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Upload an object and return its public URL.
    pub async fn upload(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<String, String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body.into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| format!("upload failed: {e}"))?;

        Ok(self.public_url_for(key))
    }

    pub fn public_url_for(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket, key)
    }
}
