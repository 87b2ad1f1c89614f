use std::future::Future;

use aws_config::{
    meta::region::RegionProviderChain, retry::RetryConfig,
    stalled_stream_protection::StalledStreamProtectionConfig, BehaviorVersion,
};
use aws_sdk_s3::{config::ProvideCredentials as _, types::Object};
use camino::Utf8Path;
use color_eyre::{
    eyre::{OptionExt as _, WrapErr as _},
    Result, Section as _,
};
use futures::TryStream;
use tracing::info;

use crate::{s3_uri::S3Uri, ExistingFileBehavior, ExistingObjectBehavior};

const TIMEOUT_RETRY_ATTEMPTS: u32 = 5;
const FALLBACK_REGION: &str = "us-east-1";

/// Sets up an s3 client, optionally using a named profile from the aws config files.
///
/// Credentials are resolved eagerly, so a missing or expired login is reported here
/// instead of on the first request.
pub async fn client(profile: Option<&str>) -> Result<aws_sdk_s3::Client> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(RegionProviderChain::default_provider().or_else(FALLBACK_REGION))
        .retry_config(RetryConfig::standard().with_max_attempts(TIMEOUT_RETRY_ATTEMPTS))
        .stalled_stream_protection(StalledStreamProtectionConfig::disabled());
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    let config = loader.load().await;
    info!("using aws region: {:?}", config.region());

    let credentials_provider = config
        .credentials_provider()
        .ok_or_eyre("no aws credentials provider is configured")?;
    let _creds = credentials_provider
        .provide_credentials()
        .await
        .wrap_err("failed to get aws credentials")
        .with_note(|| {
            format!(
                "profile was {profile:?}, AWS_PROFILE env var was {:?}",
                std::env::var("AWS_PROFILE")
            )
        })
        .with_suggestion(|| {
            "make sure that your aws credentials are set, either through the \
            environment or through ~/.aws/credentials"
        })
        .with_suggestion(|| {
            "try running `aws sso login --profile <profile>` to refresh your \
            credentials"
        })?;

    Ok(aws_sdk_s3::Client::new(&config))
}

/// Extension trait with several utility helper functions using the aws client.
pub trait ClientExt {
    /// Fails unless `bucket` exists and the current credentials can access it.
    fn check_bucket(&self, bucket: &str) -> impl Future<Output = Result<()>> + Send;

    /// Lists all s3 objects under some prefix.
    fn list_prefix(
        &self,
        s3_prefix: &S3Uri,
    ) -> impl TryStream<Ok = Object, Error = color_eyre::Report> + Send + Unpin;

    /// Downloads a single object to `out_path`. The parent directory must exist.
    fn download_object(
        &self,
        s3_uri: &S3Uri,
        out_path: &Utf8Path,
        existing_file_behavior: ExistingFileBehavior,
    ) -> impl Future<Output = Result<u64>> + Send + Unpin;

    /// Uploads the file at `in_path` to `s3_uri`, switching to a multipart upload
    /// for files larger than [`crate::PART_SIZE`].
    fn upload_object(
        &self,
        s3_uri: &S3Uri,
        in_path: &Utf8Path,
        existing_object_behavior: ExistingObjectBehavior,
    ) -> impl Future<Output = Result<u64>> + Send + Unpin;
}

impl ClientExt for aws_sdk_s3::Client {
    async fn check_bucket(&self, bucket: &str) -> Result<()> {
        self.head_bucket()
            .bucket(bucket)
            .send()
            .await
            .wrap_err_with(|| format!("bucket `{bucket}` is not accessible"))?;

        Ok(())
    }

    fn list_prefix(
        &self,
        s3_prefix: &S3Uri,
    ) -> impl TryStream<Ok = Object, Error = color_eyre::Report> + Send + Unpin {
        crate::list_prefix::list_prefix(self, s3_prefix)
    }

    fn download_object(
        &self,
        s3_uri: &S3Uri,
        out_path: &Utf8Path,
        existing_file_behavior: ExistingFileBehavior,
    ) -> impl Future<Output = Result<u64>> + Send + Unpin {
        // pinning ensures less pain for others
        Box::pin(crate::download::download_object(
            self,
            s3_uri,
            out_path,
            existing_file_behavior,
        ))
    }

    fn upload_object(
        &self,
        s3_uri: &S3Uri,
        in_path: &Utf8Path,
        existing_object_behavior: ExistingObjectBehavior,
    ) -> impl Future<Output = Result<u64>> + Send + Unpin {
        Box::pin(crate::upload::upload_object(
            self,
            s3_uri,
            in_path,
            existing_object_behavior,
        ))
    }
}
