use aws_sdk_s3::{types::Object, Client};
use color_eyre::eyre::WrapErr as _;
use futures::TryStream;
use tracing::debug;

use crate::s3_uri::S3Uri;

/// See [`crate::ClientExt::list_prefix`].
pub(crate) fn list_prefix(
    client: &Client,
    s3_prefix: &S3Uri,
) -> impl TryStream<Ok = Object, Error = color_eyre::Report> + Send + Unpin {
    let mut paginator = client
        .list_objects_v2()
        .bucket(&s3_prefix.bucket)
        .prefix(&s3_prefix.key)
        .into_paginator()
        .send();
    let s3_prefix = s3_prefix.clone();

    // Pin it here just to make people's lives easier elsewhere
    Box::pin(async_stream::try_stream! {
        let mut page_idx = 0usize;
        while let Some(page) = paginator.next().await {
            let page = page
                .wrap_err_with(|| format!("error while listing {s3_prefix}"))?;
            debug!(page_idx, n_objects = page.contents().len(), "listed page");
            page_idx += 1;
            for obj in page.contents() {
                yield obj.to_owned();
            }
        }
    })
}
