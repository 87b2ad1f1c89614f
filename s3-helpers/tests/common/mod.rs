//! Helpers for tests.
#![allow(dead_code)]

use std::time::Duration;

use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion, Region};
use aws_sdk_s3::{self as s3, config::Credentials, primitives::ByteStream};
use bucketcp_s3_helpers::S3Uri;
use bytes::Bytes;
use color_eyre::{eyre::Context as _, Result};
use testcontainers::{runners::AsyncRunner as _, ContainerAsync};
use testcontainers_modules::minio::MinIO;
use tokio::net::ToSocketAddrs;

/// An s3 compatible server running in a container, plus a client pointed at it.
#[derive(Debug)]
pub struct TestCtx {
    client: s3::Client,
    _minio: ContainerAsync<MinIO>,
}

impl TestCtx {
    pub async fn new() -> Result<Self> {
        let container = MinIO::default().start().await?;

        let host_port = container.get_host_port_ipv4(9000).await?;
        let host_ip = container.get_host().await?;

        let addr = format!("{host_ip}:{host_port}");
        let creds = Credentials::new("minioadmin", "minioadmin", None, None, "test");

        let config = s3::config::Builder::default()
            .retry_config(RetryConfig::standard())
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(30))
                    .build(),
            )
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .credentials_provider(creds)
            .endpoint_url(format!("http://{addr}"))
            .force_path_style(true)
            .build();
        let client = s3::Client::from_conf(config);

        // avoids race condition where the tcp connection might be
        // refused
        wait_for_tcp(Duration::from_millis(1000), addr)
            .await
            .wrap_err("timed out waiting for tcp")?;

        client
            .list_buckets()
            .max_buckets(1)
            .send()
            .await
            .wrap_err("failed to list buckets as sanity check that minio is running")?;

        Ok(Self {
            client,
            _minio: container,
        })
    }

    pub fn client(&self) -> &s3::Client {
        &self.client
    }

    pub async fn mk_bucket(&self, name: &str) -> Result<S3Uri> {
        let uri = S3Uri::new(name, "");
        self.client
            .create_bucket()
            .bucket(name)
            .send()
            .await
            .wrap_err_with(|| format!("failed to create bucket at {uri}"))?;

        Ok(uri)
    }

    pub async fn mk_object(&self, bucket: &str, key: &str, contents: Bytes) -> Result<S3Uri> {
        let uri = S3Uri::new(bucket, key);
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(contents))
            .send()
            .await
            .wrap_err_with(|| format!("failed to create object at {uri}"))?;

        Ok(uri)
    }

    pub async fn get_object_bytes(&self, uri: &S3Uri) -> Result<Bytes> {
        let resp = self
            .client
            .get_object()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .send()
            .await
            .wrap_err_with(|| format!("failed to get {uri}"))?;
        let body = resp.body.collect().await?.into_bytes();

        Ok(body)
    }

    pub async fn object_exists(&self, uri: &S3Uri) -> bool {
        self.client
            .head_object()
            .bucket(&uri.bucket)
            .key(&uri.key)
            .send()
            .await
            .is_ok()
    }
}

async fn wait_for_tcp(timeout: Duration, addr: impl ToSocketAddrs) -> Result<()> {
    tokio::time::timeout(timeout, async {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            if tokio::net::TcpStream::connect(&addr).await.is_ok() {
                break;
            }
        }
    })
    .await
    .wrap_err("timed out")
}
