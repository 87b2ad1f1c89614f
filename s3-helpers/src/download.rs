use aws_sdk_s3::Client;
use camino::Utf8Path;
use color_eyre::{
    eyre::{ensure, WrapErr as _},
    Result,
};
use tracing::debug;

use crate::{ExistingFileBehavior, S3Uri};

/// See [`crate::ClientExt::download_object`].
///
/// The body is streamed into a tempfile in the same directory as `out_path` and only
/// moved into place once it is complete and synced, so a failed download never leaves
/// a partial file behind.
pub(crate) async fn download_object(
    client: &Client,
    object: &S3Uri,
    out_path: &Utf8Path,
    existing_file_behavior: ExistingFileBehavior,
) -> Result<u64> {
    ensure!(
        !object.is_dir(),
        "directories are not supported, make sure the s3 uri doesn't end in a slash"
    );
    if existing_file_behavior == ExistingFileBehavior::Abort {
        ensure!(!out_path.exists(), "{out_path} already exists!");
    }
    let parent_dir = match out_path.parent() {
        Some(p) if !p.as_str().is_empty() => p.to_owned(),
        _ => Utf8Path::new(".").to_owned(),
    };
    ensure!(
        parent_dir.try_exists().unwrap_or(false),
        "parent directory {parent_dir} doesn't exist"
    );

    let resp = client
        .get_object()
        .bucket(&object.bucket)
        .key(&object.key)
        .send()
        .await
        .wrap_err("failed to make aws get_object request")?;
    let expected_len = resp.content_length().and_then(|len| u64::try_from(len).ok());

    let (tmp_file, tmp_path) = tokio::task::spawn_blocking(move || {
        let tmp_file = tempfile::NamedTempFile::new_in(&parent_dir)
            .wrap_err_with(|| format!("failed to create tempfile in {parent_dir}"))?;
        Ok::<_, color_eyre::Report>(tmp_file.into_parts())
    })
    .await
    .wrap_err("task panicked")??;

    let mut file = tokio::fs::File::from_std(tmp_file);
    let mut body = resp.body.into_async_read();
    let written = tokio::io::copy(&mut body, &mut file)
        .await
        .wrap_err_with(|| format!("failed to stream {object} to disk"))?;
    if let Some(expected_len) = expected_len {
        ensure!(
            written == expected_len,
            "downloaded {written} bytes but {object} is {expected_len} bytes"
        );
    }
    file.sync_all().await.wrap_err("failed to sync tempfile")?;
    drop(file);
    debug!(%object, written, "finished streaming object to tempfile");

    let out_path = out_path.to_owned();
    tokio::task::spawn_blocking(move || match existing_file_behavior {
        ExistingFileBehavior::Abort => tmp_path
            .persist_noclobber(&out_path)
            .wrap_err_with(|| format!("failed to persist temporary file to {out_path}")),
        ExistingFileBehavior::Overwrite => tmp_path
            .persist(&out_path)
            .wrap_err_with(|| format!("failed to persist temporary file to {out_path}")),
    })
    .await
    .wrap_err("task panicked")??;

    Ok(written)
}
