//! The object storage seam.

use std::path::Path;

use async_trait::async_trait;

use crate::StoreError;

/// Stores one local file at a key within a fixed container.
///
/// Implementations make a single attempt; retry lives in
/// [`Uploader`](crate::Uploader). Dropping the returned future must abort the
/// transfer.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Upload the file at `local_path` to `key`.
    async fn put_file(&self, local_path: &Path, key: &str) -> Result<(), StoreError>;

    /// Human-readable location of `key`, for logs.
    fn location(&self, key: &str) -> String {
        key.to_string()
    }
}
