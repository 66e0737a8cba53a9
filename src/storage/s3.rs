use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use tracing::debug;

use super::ObjectSource;
use crate::error::{AppError, Result};

/// S3-backed object source. Credentials and region come from the default
/// provider chain (env, profile, instance role).
pub struct S3Source {
    client: Client,
}

impl S3Source {
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self {
            client: Client::new(&config),
        }
    }
}

impl ObjectSource for S3Source {
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| {
                    AppError::SourceUnavailable(format!(
                        "listing s3://{bucket}/{prefix} failed: {}",
                        DisplayErrorContext(&e)
                    ))
                })?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            // A page is only followed when S3 says there is more and hands out a token.
            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    debug!("s3://{bucket}/{prefix}: {} keys so far, fetching next page", keys.len());
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::SourceUnavailable(format!(
                    "fetching s3://{bucket}/{key} failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        let body = resp.body.collect().await.map_err(|e| {
            AppError::SourceUnavailable(format!("reading body of s3://{bucket}/{key} failed: {e}"))
        })?;

        Ok(body.into_bytes().to_vec())
    }
}
