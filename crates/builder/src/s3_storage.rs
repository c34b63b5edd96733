use crate::{key_file_name, ObjectStore, StoreError};
use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client};
use slog::{error, info, Logger};
use std::path::{Path, PathBuf};

/// Object store backed by an S3 bucket (or any S3 compatible endpoint)
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    logger: Logger,
}

impl S3ObjectStore {
    pub async fn new(
        bucket: String,
        endpoint: Option<String>,
        logger: Logger,
    ) -> Result<Self, StoreError> {
        let mut config_loader = aws_config::from_env();

        if let Some(endpoint_url) = endpoint {
            info!(logger, "Using custom S3 endpoint: {}", endpoint_url);
            config_loader = config_loader.endpoint_url(endpoint_url);
        }

        let config = config_loader.load().await;
        let client = Client::new(&config);

        info!(logger, "S3 storage initialized for bucket: {}", bucket);

        Ok(Self {
            client,
            bucket,
            logger,
        })
    }

    async fn put_body(&self, key: &str, body: ByteStream) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type("text/csv")
            .send()
            .await
            .map_err(|e| {
                error!(self.logger, "Failed to upload to S3: {}", e);
                StoreError::Backend(format!("S3 upload failed: {}", e))
            })?;
        info!(
            self.logger,
            "Successfully uploaded to s3://{}/{}", self.bucket, key
        );
        Ok(())
    }
}

/// The part of a glob pattern before its first wildcard, used as the S3
/// listing prefix
fn literal_prefix(pattern: &str) -> &str {
    let end = pattern.find(&['*', '?', '['][..]).unwrap_or(pattern.len());
    &pattern[..end]
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let matcher = glob::Pattern::new(pattern)?;
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(literal_prefix(pattern))
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StoreError::Backend(format!("S3 list failed: {}", e)))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .filter(|key| matcher.matches(key))
                    .map(|key| key.to_owned()),
            );

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_owned()),
                None => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn download(&self, pattern: &str, dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
        let keys = self.list(pattern).await?;
        if keys.is_empty() {
            return Err(StoreError::NotFound(pattern.to_owned()));
        }
        tokio::fs::create_dir_all(dir).await?;

        let mut downloaded = Vec::with_capacity(keys.len());
        for key in keys {
            let object = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await
                .map_err(|e| StoreError::Backend(format!("S3 download failed: {}", e)))?;
            let bytes = object
                .body
                .collect()
                .await
                .map_err(|e| StoreError::Backend(format!("S3 download failed: {}", e)))?
                .into_bytes();

            let target = dir.join(key_file_name(&key));
            tokio::fs::write(&target, bytes).await?;
            info!(
                self.logger,
                "Downloaded s3://{}/{} to {}",
                self.bucket,
                key,
                target.display()
            );
            downloaded.push(target);
        }
        Ok(downloaded)
    }

    async fn upload(&self, local_path: &Path, key: &str) -> Result<(), StoreError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to read {}: {}", local_path.display(), e)))?;

        info!(
            self.logger,
            "Uploading {} to s3://{}/{}",
            local_path.display(),
            self.bucket,
            key
        );
        self.put_body(key, body).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        self.put_body(key, ByteStream::from(bytes)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_by_literal_prefix() {
        assert_eq!(literal_prefix("exports/june_*.csv"), "exports/june_");
        assert_eq!(literal_prefix("predict_dfs/a.csv"), "predict_dfs/a.csv");
    }
}
