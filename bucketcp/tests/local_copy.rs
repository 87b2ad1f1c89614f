//! Drives the dispatcher end to end with a backend that copies between local
//! directories, so no s3 is needed.

use std::num::NonZeroUsize;

use async_tempfile::TempDir;
use bucketcp::{
    report::{exit_code, Direction, Summary},
    worklist::upload_work_list,
    DispatchConfig, Dispatcher, Transferable,
};
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{eyre::WrapErr as _, Result};

struct LocalCopy {
    dest: Utf8PathBuf,
}

impl Transferable for LocalCopy {
    type Item = Utf8PathBuf;

    async fn check_available(&self) -> Result<()> {
        tokio::fs::metadata(&self.dest)
            .await
            .wrap_err_with(|| format!("{} is missing", self.dest))?;
        Ok(())
    }

    async fn transfer(&self, path: &Utf8PathBuf) -> Result<()> {
        tokio::fs::copy(path, self.destination_path(path))
            .await
            .wrap_err_with(|| format!("failed to copy {path}"))?;
        Ok(())
    }

    fn destination(&self, path: &Utf8PathBuf) -> String {
        self.destination_path(path).into_string()
    }
}

impl LocalCopy {
    fn destination_path(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.dest.join(path.file_name().unwrap_or("unnamed"))
    }
}

fn utf8(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.dir_path().to_owned()).unwrap()
}

#[test_log::test(tokio::test)]
async fn test_copy_directory_with_one_vanished_file() -> Result<()> {
    let src_dir = TempDir::new().await?;
    let dst_dir = TempDir::new().await?;
    let (src, dst) = (utf8(&src_dir), utf8(&dst_dir));

    for name in ["a.txt", "b.txt", "c.txt", "d.txt", "skip.log"] {
        tokio::fs::write(src.join(name), name).await?;
    }
    let work = upload_work_list(&[], Some(&src), "*.txt", false)?;
    assert_eq!(work.len(), 4);
    // Disappears between listing and transfer.
    tokio::fs::remove_file(src.join("c.txt")).await?;

    let backend = LocalCopy { dest: dst.clone() };
    backend.check_available().await?;
    let dispatcher = Dispatcher::new(
        backend,
        DispatchConfig {
            max_workers: NonZeroUsize::new(2).unwrap(),
            ..Default::default()
        },
    );
    let mut lines = 0;
    let result = dispatcher.run(work, |_| lines += 1).await?;

    assert_eq!(lines, 4);
    assert_eq!(result.succeeded, 3);
    assert_eq!(result.failed, 1);
    assert_eq!(result.errors[0].item, src.join("c.txt"));
    assert!(result.errors[0].reason.contains("failed to copy"));
    for name in ["a.txt", "b.txt", "d.txt"] {
        assert_eq!(tokio::fs::read_to_string(dst.join(name)).await?, name);
    }
    assert!(!dst.join("skip.log").exists());

    let summary = Summary {
        direction: Direction::Upload,
        result: &result,
    }
    .to_string();
    assert!(summary.contains("Successful: 3"));
    assert!(summary.contains("Failed: 1"));
    assert_eq!(exit_code(&result), std::process::ExitCode::FAILURE);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_missing_destination_fails_precondition() -> Result<()> {
    let dir = TempDir::new().await?;
    let backend = LocalCopy {
        dest: utf8(&dir).join("nope"),
    };
    assert!(backend.check_available().await.is_err());

    Ok(())
}
