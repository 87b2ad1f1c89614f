use std::{fmt::Display, str::FromStr};

/// A parsed s3 uri
#[derive(Debug, Eq, PartialEq, Clone, Hash)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum S3UriParseErr {
    #[error("must be a url that starts with `s3://`")]
    WrongScheme,
    #[error("expected s3://<bucket>/<key>")]
    MissingKeySeparator,
    #[error("bucket name must not be empty")]
    EmptyBucket,
}

impl S3Uri {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.key.ends_with('/') || self.key.is_empty()
    }

}

/// The final `/` delimited segment of an object key. Empty for directory keys.
pub fn key_file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

impl FromStr for S3Uri {
    type Err = S3UriParseErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bucket, key) = s
            .strip_prefix("s3://")
            .ok_or(S3UriParseErr::WrongScheme)?
            .split_once('/')
            .ok_or(S3UriParseErr::MissingKeySeparator)?;
        if bucket.is_empty() {
            return Err(S3UriParseErr::EmptyBucket);
        }

        Ok(Self::new(bucket, key))
    }
}

impl Display for S3Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}
