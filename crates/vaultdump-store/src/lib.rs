//! Object storage upload for vaultdump.
//!
//! A [`RemoteStore`] puts one local file at one key. The [`Uploader`] wraps a
//! store with exponential backoff bounded by a total elapsed-time budget, and
//! aborts promptly when the shared cancellation token fires.

mod error;
mod retry;
mod s3;
mod store;

pub use error::{StoreError, UploadError};
pub use retry::{RetryPolicy, UploadReport, Uploader};
pub use s3::{S3Config, S3Store};
pub use store::RemoteStore;
