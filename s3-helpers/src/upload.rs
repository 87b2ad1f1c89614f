use std::time::Duration;

use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use aws_smithy_types::byte_stream::{ByteStream, Length};
use camino::Utf8Path;
use color_eyre::{
    eyre::{bail, ensure, eyre, WrapErr as _},
    Result,
};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::{ExistingObjectBehavior, S3Uri};

/// Files up to this size are sent with a single `PutObject`, larger ones are split
/// into parts of this size.
pub const PART_SIZE: u64 = 25 * 1024 * 1024; // 25 MiB
const PART_UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);
const PART_UPLOAD_NUM_RETRY: u8 = 5;

/// See [`crate::ClientExt::upload_object`].
pub(crate) async fn upload_object(
    client: &Client,
    object: &S3Uri,
    in_path: &Utf8Path,
    existing_object_behavior: ExistingObjectBehavior,
) -> Result<u64> {
    ensure!(
        !object.is_dir(),
        "directories are not supported, make sure the s3 uri doesn't end in a slash"
    );

    let metadata = tokio::fs::metadata(in_path)
        .await
        .wrap_err_with(|| format!("failed to stat {in_path}"))?;
    ensure!(metadata.is_file(), "{in_path} is not a regular file");
    let total_bytes = metadata.len();

    // Early check for object existence if we should abort.
    if existing_object_behavior == ExistingObjectBehavior::Abort {
        let head_res = client
            .head_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .send()
            .await;
        if head_res.is_ok() {
            bail!("object {object} already exists");
        }
    }

    if total_bytes <= PART_SIZE {
        let body = ByteStream::from_path(in_path)
            .await
            .wrap_err_with(|| format!("failed to read {in_path}"))?;
        let mut builder = client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .content_length(i64::try_from(total_bytes)?)
            .body(body);
        if existing_object_behavior == ExistingObjectBehavior::Abort {
            builder = builder.if_none_match("*");
        }
        builder.send().await.wrap_err("failed to upload object")?;

        return Ok(total_bytes);
    }

    let upload_id = client
        .create_multipart_upload()
        .bucket(&object.bucket)
        .key(&object.key)
        .send()
        .await
        .wrap_err("failed to create multipart upload")?
        .upload_id()
        .ok_or_else(|| eyre!("upload id missing"))?
        .to_owned();

    let parts = match upload_parts(client, object, in_path, &upload_id, total_bytes)
        .await
    {
        Ok(parts) => parts,
        Err(err) => {
            // Try to abort the multipart upload on failure
            let abort_res = client
                .abort_multipart_upload()
                .bucket(&object.bucket)
                .key(&object.key)
                .upload_id(&upload_id)
                .send()
                .await;
            if let Err(abort_err) = abort_res {
                warn!("failed to abort multipart upload {upload_id}: {abort_err}");
            }
            return Err(err);
        }
    };

    client
        .complete_multipart_upload()
        .bucket(&object.bucket)
        .key(&object.key)
        .upload_id(upload_id)
        .multipart_upload(
            CompletedMultipartUpload::builder()
                .set_parts(Some(parts))
                .build(),
        )
        .send()
        .await
        .wrap_err("failed to complete multipart upload")?;

    Ok(total_bytes)
}

/// Uploads the file part by part, in order.
async fn upload_parts(
    client: &Client,
    object: &S3Uri,
    in_path: &Utf8Path,
    upload_id: &str,
    total_bytes: u64,
) -> Result<Vec<CompletedPart>> {
    let step = usize::try_from(PART_SIZE)?;
    let mut parts = Vec::new();
    for (idx, start) in (0..total_bytes).step_by(step).enumerate() {
        let len = std::cmp::min(PART_SIZE, total_bytes - start);
        let part_number =
            i32::try_from(idx + 1).wrap_err("file has too many parts to upload")?;
        let e_tag = upload_part_retry_on_timeout(
            client,
            object,
            in_path,
            upload_id,
            PartRange {
                start,
                len,
                part_number,
            },
        )
        .await?;
        debug!(%object, part_number, len, "uploaded part");
        parts.push(
            CompletedPart::builder()
                .e_tag(e_tag)
                .part_number(part_number)
                .build(),
        );
    }

    Ok(parts)
}

#[derive(Debug, Clone, Copy)]
struct PartRange {
    start: u64,
    len: u64,
    part_number: i32,
}

async fn upload_part_retry_on_timeout(
    client: &Client,
    object: &S3Uri,
    in_path: &Utf8Path,
    upload_id: &str,
    range: PartRange,
) -> Result<String> {
    for _ in 0..PART_UPLOAD_NUM_RETRY {
        match timeout(
            PART_UPLOAD_TIMEOUT,
            upload_part(client, object, in_path, upload_id, range),
        )
        .await
        {
            Ok(result) => return result,
            Err(e) => warn!("put part timeout for part {}: {}", range.part_number, e),
        }
    }

    Err(eyre!(
        "exceeded maximum number of retries for {object} part {}",
        range.part_number
    ))
}

async fn upload_part(
    client: &Client,
    object: &S3Uri,
    in_path: &Utf8Path,
    upload_id: &str,
    range: PartRange,
) -> Result<String> {
    let body = ByteStream::read_from()
        .path(in_path)
        .offset(range.start)
        .length(Length::Exact(range.len))
        .build()
        .await
        .wrap_err_with(|| format!("failed to read part {} of {in_path}", range.part_number))?;
    let resp = client
        .upload_part()
        .bucket(&object.bucket)
        .key(&object.key)
        .upload_id(upload_id)
        .part_number(range.part_number)
        .body(body)
        .send()
        .await
        .wrap_err("failed to upload part")?;

    let e_tag = resp
        .e_tag()
        .ok_or_else(|| eyre!("etag missing in upload_part response"))?
        .to_owned();
    Ok(e_tag)
}
