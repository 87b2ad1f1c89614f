mod common;

use std::time::Duration;

use async_tempfile::TempDir;
use bucketcp_s3_helpers::{ClientExt as _, ExistingFileBehavior, S3Uri};
use bytes::Bytes;
use camino::Utf8PathBuf;
use color_eyre::{eyre::WrapErr as _, Result};
use tokio::time::timeout;

use common::TestCtx;

const NEW_BUCKET: &str = "new-bucket";

fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::try_from(dir.dir_path().clone()).expect("tempdir is utf8")
}

async fn download(
    ctx: &TestCtx,
    uri: &S3Uri,
    out: &camino::Utf8Path,
    behavior: ExistingFileBehavior,
) -> Result<u64> {
    timeout(
        Duration::from_secs(30),
        ctx.client().download_object(uri, out, behavior),
    )
    .await
    .wrap_err("download timed out")?
}

#[test_with::executable(docker)]
#[tokio::test]
async fn test_download_and_overwrite_behavior() -> Result<()> {
    let _ = color_eyre::install();
    let ctx = TestCtx::new().await?;
    let tmpdir = TempDir::new().await?;
    let dir = utf8_dir(&tmpdir);

    // Arrange
    ctx.mk_bucket(NEW_BUCKET).await?;
    let a_content = Bytes::from(vec![b'a'; 69]);
    let a_uri = ctx.mk_object(NEW_BUCKET, "nested/A", a_content.clone()).await?;
    let a_path = dir.join("A");

    // Act + Assert: fresh download
    let n = download(&ctx, &a_uri, &a_path, ExistingFileBehavior::Abort).await?;
    assert_eq!(n, 69);
    assert_eq!(tokio::fs::read(&a_path).await?, a_content);

    // Act + Assert: refuses to clobber, and leaves the file alone
    tokio::fs::write(&a_path, b"local edits").await?;
    assert!(
        download(&ctx, &a_uri, &a_path, ExistingFileBehavior::Abort)
            .await
            .is_err(),
        "file exists and we asked to abort"
    );
    assert_eq!(tokio::fs::read(&a_path).await?, b"local edits");

    // Act + Assert: overwrite replaces it
    download(&ctx, &a_uri, &a_path, ExistingFileBehavior::Overwrite).await?;
    assert_eq!(tokio::fs::read(&a_path).await?, a_content);

    Ok(())
}

#[test_with::executable(docker)]
#[tokio::test]
async fn test_missing_object_leaves_no_file() -> Result<()> {
    let _ = color_eyre::install();
    let ctx = TestCtx::new().await?;
    let tmpdir = TempDir::new().await?;
    let dir = utf8_dir(&tmpdir);
    ctx.mk_bucket(NEW_BUCKET).await?;

    let missing = S3Uri::new(NEW_BUCKET, "missing");
    let out = dir.join("missing");
    assert!(
        download(&ctx, &missing, &out, ExistingFileBehavior::Overwrite)
            .await
            .is_err(),
        "object doesn't exist"
    );
    assert!(!out.exists(), "failed download must not create the file");

    let mut entries = tokio::fs::read_dir(&dir).await?;
    assert!(
        entries.next_entry().await?.is_none(),
        "no tempfiles should be left behind"
    );

    Ok(())
}

#[test_with::executable(docker)]
#[tokio::test]
async fn test_directory_uri_is_rejected() -> Result<()> {
    let _ = color_eyre::install();
    let ctx = TestCtx::new().await?;
    let tmpdir = TempDir::new().await?;
    let dir = utf8_dir(&tmpdir);

    let err = download(
        &ctx,
        &S3Uri::new(NEW_BUCKET, "some/dir/"),
        &dir.join("x"),
        ExistingFileBehavior::Overwrite,
    )
    .await
    .expect_err("directories can't be downloaded");
    assert!(err.to_string().contains("directories are not supported"));

    Ok(())
}
