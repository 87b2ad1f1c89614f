//! The per-item transfer capability, and its two s3 flavors.

use std::{fmt, future::Future};

use aws_sdk_s3::Client;
use bucketcp_s3_helpers::{
    key_file_name, ClientExt as _, ExistingFileBehavior, ExistingObjectBehavior, S3Uri,
};
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{
    eyre::{OptionExt as _, WrapErr as _},
    Result,
};
use tracing::debug;

/// Something that can move one work item to its destination.
///
/// Implementors carry all of the destination context (bucket, prefix, output
/// directory, overwrite policy), so the [`crate::Dispatcher`] only ever deals with
/// items.
pub trait Transferable: Send + Sync + 'static {
    /// One unit of work, e.g. an object key or a local path.
    type Item: Clone + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Fails if no transfer could possibly succeed, for example because the bucket is
    /// unreachable. Call this before doing any work.
    fn check_available(&self) -> impl Future<Output = Result<()>> + Send;

    /// Transfers a single item.
    fn transfer(&self, item: &Self::Item) -> impl Future<Output = Result<()>> + Send;

    /// Where `item` ends up, for display purposes.
    fn destination(&self, item: &Self::Item) -> String;
}

/// Downloads object keys from a bucket into a flat local directory.
#[derive(Debug, Clone)]
pub struct S3Download {
    client: Client,
    bucket: String,
    output_dir: Utf8PathBuf,
    existing_file_behavior: ExistingFileBehavior,
}

impl S3Download {
    pub fn new(
        client: Client,
        bucket: impl Into<String>,
        output_dir: impl Into<Utf8PathBuf>,
        existing_file_behavior: ExistingFileBehavior,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            output_dir: output_dir.into(),
            existing_file_behavior,
        }
    }
}

impl Transferable for S3Download {
    type Item = String;

    async fn check_available(&self) -> Result<()> {
        self.client.check_bucket(&self.bucket).await
    }

    async fn transfer(&self, key: &String) -> Result<()> {
        let out_path = download_path(&self.output_dir, key);
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .wrap_err_with(|| format!("failed to create {}", self.output_dir))?;
        let nbytes = self
            .client
            .download_object(
                &S3Uri::new(&self.bucket, key),
                &out_path,
                self.existing_file_behavior,
            )
            .await?;
        debug!(key, %out_path, nbytes, "downloaded object");

        Ok(())
    }

    fn destination(&self, key: &String) -> String {
        download_path(&self.output_dir, key).into_string()
    }
}

/// Uploads local files into a bucket, under an optional key prefix.
#[derive(Debug, Clone)]
pub struct S3Upload {
    client: Client,
    bucket: String,
    prefix: String,
    existing_object_behavior: ExistingObjectBehavior,
}

impl S3Upload {
    pub fn new(
        client: Client,
        bucket: impl Into<String>,
        prefix: &str,
        existing_object_behavior: ExistingObjectBehavior,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.trim_end_matches('/').to_owned(),
            existing_object_behavior,
        }
    }

    fn object_uri(&self, path: &Utf8Path) -> Result<S3Uri> {
        Ok(S3Uri::new(&self.bucket, upload_key(&self.prefix, path)?))
    }
}

impl Transferable for S3Upload {
    type Item = Utf8PathBuf;

    async fn check_available(&self) -> Result<()> {
        self.client.check_bucket(&self.bucket).await
    }

    async fn transfer(&self, path: &Utf8PathBuf) -> Result<()> {
        let object = self.object_uri(path)?;
        let nbytes = self
            .client
            .upload_object(&object, path, self.existing_object_behavior)
            .await?;
        debug!(%path, %object, nbytes, "uploaded file");

        Ok(())
    }

    fn destination(&self, path: &Utf8PathBuf) -> String {
        match self.object_uri(path) {
            Ok(uri) => uri.to_string(),
            Err(_) => format!("s3://{}/<invalid>", self.bucket),
        }
    }
}

/// Objects are saved under their file name only, nested keys are flattened.
pub fn download_path(output_dir: &Utf8Path, key: &str) -> Utf8PathBuf {
    output_dir.join(key_file_name(key))
}

/// `<prefix>/<file name>`, or just the file name when `prefix` is empty. `prefix`
/// must not end in a slash.
pub fn upload_key(prefix: &str, path: &Utf8Path) -> Result<String> {
    let file_name = path
        .file_name()
        .ok_or_eyre("path has no file name")
        .wrap_err_with(|| format!("can't derive an object key from {path}"))?;
    Ok(if prefix.is_empty() {
        file_name.to_owned()
    } else {
        format!("{prefix}/{file_name}")
    })
}
