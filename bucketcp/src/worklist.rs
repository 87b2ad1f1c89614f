//! Resolving what to transfer: remote keys for downloads, local files for uploads.

use std::{collections::HashSet, hash::Hash};

use bucketcp_s3_helpers::{key_file_name, ClientExt, S3Uri};
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{eyre::WrapErr as _, Result};
use futures::TryStreamExt as _;
use globset::{Glob, GlobBuilder, GlobMatcher};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// `""` lists the whole bucket, anything else gets exactly one trailing slash.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}/")
    }
}

/// Compiles a shell style glob (`*`, `?`, `[..]`) matched against file names.
pub fn name_matcher(pattern: Option<&str>) -> Result<Option<GlobMatcher>> {
    pattern
        .map(|p| {
            Glob::new(p)
                .map(|g| g.compile_matcher())
                .wrap_err_with(|| format!("invalid pattern `{p}`"))
        })
        .transpose()
}

/// Drops directory placeholders, and keys whose last segment doesn't match.
/// Order is preserved.
pub fn filter_keys(
    keys: impl IntoIterator<Item = String>,
    matcher: Option<&GlobMatcher>,
) -> Vec<String> {
    keys.into_iter()
        .filter(|key| !key.ends_with('/'))
        .filter(|key| matcher.is_none_or(|m| m.is_match(key_file_name(key))))
        .collect()
}

/// Lists every object key under `prefix` in `bucket` that should be downloaded.
pub async fn list_keys(
    client: &impl ClientExt,
    bucket: &str,
    prefix: &str,
    pattern: Option<&str>,
) -> Result<Vec<String>> {
    let matcher = name_matcher(pattern)?;
    let uri = S3Uri::new(bucket, normalize_prefix(prefix));
    let keys: Vec<String> = client
        .list_prefix(&uri)
        .try_filter_map(|obj| async move { Ok(obj.key().map(str::to_owned)) })
        .try_collect()
        .await?;
    let n_listed = keys.len();
    let keys = filter_keys(keys, matcher.as_ref());
    debug!(%uri, n_listed, n_selected = keys.len(), "listed keys");

    Ok(keys)
}

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?'])
}

/// Expands globbed entries of `patterns`, plain paths are passed through untouched.
pub fn expand_file_patterns(patterns: &[String]) -> Result<Vec<Utf8PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        if !is_glob(pattern) {
            paths.push(Utf8PathBuf::from(pattern));
            continue;
        }
        let before = paths.len();
        let entries =
            glob::glob(pattern).wrap_err_with(|| format!("invalid pattern `{pattern}`"))?;
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(err) => {
                    warn!("skipping unreadable match of {pattern}: {err}");
                    continue;
                }
            };
            match Utf8PathBuf::from_path_buf(path) {
                Ok(path) => paths.push(path),
                Err(path) => warn!("skipping non utf-8 path {}", path.display()),
            }
        }
        if paths.len() == before {
            warn!("no files match pattern {pattern}");
        }
    }

    Ok(paths)
}

/// Regular files in `dir` matching `pattern`, sorted.
///
/// Patterns without a `/` are matched against file names. Patterns with one are
/// matched against the path relative to `dir`; when `recursive` they may match at
/// any depth. A missing directory yields no files.
pub fn files_in_directory(
    dir: &Utf8Path,
    pattern: &str,
    recursive: bool,
) -> Result<Vec<Utf8PathBuf>> {
    if !dir.is_dir() {
        warn!("{dir} is not a directory, skipping");
        return Ok(Vec::new());
    }

    let has_separator = pattern.contains('/');
    let glob = if recursive && has_separator && !pattern.starts_with("**/") {
        format!("**/{pattern}")
    } else {
        pattern.to_owned()
    };
    let matcher = GlobBuilder::new(&glob)
        .literal_separator(true)
        .build()
        .wrap_err_with(|| format!("invalid pattern `{pattern}`"))?
        .compile_matcher();
    let max_depth = match (recursive, has_separator) {
        (true, _) => usize::MAX,
        (false, false) => 1,
        (false, true) => pattern.split('/').filter(|s| !s.is_empty()).count(),
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable entry in {dir}: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = match Utf8PathBuf::from_path_buf(entry.into_path()) {
            Ok(path) => path,
            Err(path) => {
                warn!("skipping non utf-8 path {}", path.display());
                continue;
            }
        };
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let subject = if has_separator {
            Some(relative.as_str())
        } else {
            relative.file_name()
        };
        if subject.is_some_and(|s| matcher.is_match(s)) {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}

/// Removes later duplicates, keeping the first occurrence of each item in place.
pub fn dedup_preserving_order<T: Eq + Hash + Clone>(
    items: impl IntoIterator<Item = T>,
) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

/// Keeps only paths that are existing regular files.
pub fn retain_existing_files(paths: Vec<Utf8PathBuf>) -> Vec<Utf8PathBuf> {
    paths
        .into_iter()
        .filter(|path| {
            if path.is_file() {
                true
            } else if path.exists() {
                warn!("{path} is not a regular file, skipping");
                false
            } else {
                warn!("{path} does not exist, skipping");
                false
            }
        })
        .collect()
}

/// Builds the upload work list from explicit files/globs and an optional directory.
pub fn upload_work_list(
    files: &[String],
    directory: Option<&Utf8Path>,
    pattern: &str,
    recursive: bool,
) -> Result<Vec<Utf8PathBuf>> {
    let mut paths = expand_file_patterns(files)?;
    if let Some(dir) = directory {
        paths.extend(files_in_directory(dir, pattern, recursive)?);
    }

    Ok(retain_existing_files(dedup_preserving_order(paths)))
}
