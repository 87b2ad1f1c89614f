#[path = "../../s3-helpers/tests/common/mod.rs"]
mod common;

use async_tempfile::TempDir;
use bucketcp::{
    worklist::{list_keys, upload_work_list},
    DispatchConfig, Dispatcher, S3Download, S3Upload, Transferable as _,
};
use bucketcp_s3_helpers::{ExistingFileBehavior, ExistingObjectBehavior};
use bytes::Bytes;
use camino::Utf8PathBuf;
use color_eyre::Result;

use common::TestCtx;

const BUCKET: &str = "transfers";

async fn ctx_with_bucket() -> Result<TestCtx> {
    let ctx = TestCtx::new().await?;
    ctx.mk_bucket(BUCKET).await?;

    Ok(ctx)
}

fn utf8(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.dir_path().to_owned()).unwrap()
}

#[test_with::executable(docker)]
#[test_log::test(tokio::test)]
async fn test_upload_then_download() -> Result<()> {
    let ctx = ctx_with_bucket().await?;
    let client = ctx.client();
    let src_dir = TempDir::new().await?;
    let dst_dir = TempDir::new().await?;
    let (src, dst) = (utf8(&src_dir), utf8(&dst_dir));
    for name in ["a.csv", "b.csv", "notes.txt"] {
        tokio::fs::write(src.join(name), format!("contents of {name}")).await?;
    }

    // Upload everything under a prefix.
    let upload = S3Upload::new(
        client.clone(),
        BUCKET,
        "incoming/",
        ExistingObjectBehavior::Overwrite,
    );
    upload.check_available().await?;
    let work = upload_work_list(&[], Some(&src), "*", false)?;
    let result = Dispatcher::new(upload, DispatchConfig::default())
        .run(work, |_| {})
        .await?;
    assert_eq!((result.succeeded, result.failed), (3, 0));

    // A placeholder and an object outside the prefix must not be downloaded.
    ctx.mk_object(BUCKET, "incoming/empty-dir/", Bytes::new()).await?;
    ctx.mk_object(BUCKET, "elsewhere.csv", Bytes::from_static(b"x"))
        .await?;

    let mut keys = list_keys(client, BUCKET, "incoming", Some("*.csv")).await?;
    keys.sort();
    assert_eq!(keys, ["incoming/a.csv", "incoming/b.csv"]);

    let download = S3Download::new(
        client.clone(),
        BUCKET,
        dst.clone(),
        ExistingFileBehavior::Overwrite,
    );
    download.check_available().await?;
    let result = Dispatcher::new(download, DispatchConfig::default())
        .run(keys, |_| {})
        .await?;
    assert_eq!((result.succeeded, result.failed), (2, 0));
    assert_eq!(
        tokio::fs::read_to_string(dst.join("a.csv")).await?,
        "contents of a.csv"
    );
    assert!(!dst.join("notes.txt").exists());

    Ok(())
}

#[test_with::executable(docker)]
#[test_log::test(tokio::test)]
async fn test_missing_keys_fail_individually() -> Result<()> {
    let ctx = ctx_with_bucket().await?;
    let client = ctx.client();
    let dst_dir = TempDir::new().await?;
    let dst = utf8(&dst_dir);
    ctx.mk_object(BUCKET, "present.bin", Bytes::from_static(b"hello"))
        .await?;

    let download =
        S3Download::new(client.clone(), BUCKET, dst.clone(), ExistingFileBehavior::Overwrite);
    let result = Dispatcher::new(download, DispatchConfig::default())
        .run(vec!["present.bin".to_owned(), "absent.bin".to_owned()], |_| {})
        .await?;

    assert_eq!(result.succeeded, 1);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors[0].item, "absent.bin");
    assert!(!dst.join("absent.bin").exists());
    assert_eq!(tokio::fs::read(dst.join("present.bin")).await?, b"hello");

    Ok(())
}

#[test_with::executable(docker)]
#[test_log::test(tokio::test)]
async fn test_unknown_bucket_is_unavailable() -> Result<()> {
    let ctx = ctx_with_bucket().await?;
    let client = ctx.client();
    let upload = S3Upload::new(client.clone(), "no-such-bucket", "", ExistingObjectBehavior::Abort);
    assert!(upload.check_available().await.is_err());

    Ok(())
}
