pub mod s3;

pub use s3::S3Source;

use crate::error::Result;

/// Read side of the object store holding processed files.
#[allow(async_fn_in_trait)]
pub trait ObjectSource {
    /// Every key under `prefix`, in listing order.
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;
}
