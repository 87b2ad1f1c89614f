//! Helpers for moving whole objects between s3 and the local filesystem.
//!
//! Start with [`client()`], then use the methods on [`ClientExt`].

mod client;
mod download;
mod list_prefix;
mod s3_uri;
mod upload;

pub use crate::client::{client, ClientExt};
pub use crate::s3_uri::{key_file_name, S3Uri, S3UriParseErr};
pub use crate::upload::PART_SIZE;

/// Whether to overwrite existing files or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingFileBehavior {
    /// If a file exists, overwrite it
    Overwrite,
    /// If a file exists, abort
    Abort,
}

/// Whether to overwrite an existing S3 object or error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingObjectBehavior {
    /// If an object exists, overwrite it
    Overwrite,
    /// If an object exists, abort
    Abort,
}
