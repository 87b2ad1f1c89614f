#![forbid(unsafe_code)]

use std::{num::NonZeroUsize, process::ExitCode, time::Duration};

use bucketcp::{
    report::{exit_code, Direction, Header, ProgressReporter, Summary},
    worklist::{list_keys, normalize_prefix, upload_work_list},
    DispatchConfig, Dispatcher, S3Download, S3Upload, Transferable,
    DEFAULT_MAX_WORKERS,
};
use bucketcp_s3_helpers::{ExistingFileBehavior, ExistingObjectBehavior};
use bucketcp_telemetry::TelemetryConfig;
use camino::Utf8PathBuf;
use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand};
use color_eyre::{
    eyre::{eyre, WrapErr as _},
    Result,
};
use tracing::{debug, warn};

#[derive(Parser, Debug)]
#[command(about, author, version, styles = make_clap_v3_styles())]
struct Cli {
    /// Increases log verbosity, can be repeated.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download objects from a bucket into a local directory.
    Download(Download),
    /// Upload local files into a bucket.
    Upload(Upload),
}

impl Commands {
    async fn run(self) -> Result<ExitCode> {
        match self {
            Commands::Download(c) => c.run().await,
            Commands::Upload(c) => c.run().await,
        }
    }
}

/// Arguments shared by both directions.
#[derive(Debug, Args)]
struct Common {
    /// The bucket to transfer from or to.
    #[arg(short, long, env = "BUCKETCP_BUCKET")]
    bucket: String,
    /// Maximum number of concurrent transfers.
    #[arg(
        short,
        long,
        env = "BUCKETCP_WORKERS",
        default_value_t = DEFAULT_MAX_WORKERS
    )]
    workers: NonZeroUsize,
    /// Give up on a single file after this long, e.g. `30s` or `2h`.
    #[arg(
        long,
        env = "BUCKETCP_ITEM_TIMEOUT",
        default_value = "1h",
        value_parser = humantime::parse_duration,
    )]
    item_timeout: Duration,
    /// Named profile from the aws config files.
    #[arg(long, env = "AWS_PROFILE")]
    profile: Option<String>,
    /// Fail instead of replacing files or objects that already exist.
    #[arg(long)]
    no_overwrite: bool,
}

impl Common {
    fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_workers: self.workers,
            item_timeout: self.item_timeout,
        }
    }

    async fn client(&self) -> Result<aws_sdk_s3::Client> {
        bucketcp_s3_helpers::client(self.profile.as_deref())
            .await
            .wrap_err("failed to set up the s3 client")
    }
}

#[derive(Debug, Parser)]
struct Download {
    #[command(flatten)]
    common: Common,
    /// Directory to save files into. Created if missing.
    #[arg(long, short, default_value = "./downloads")]
    output: Utf8PathBuf,
    /// Only download objects under this key prefix.
    #[arg(long, default_value = "")]
    prefix: String,
    /// Only download objects whose file name matches this glob, e.g. `*.csv`.
    #[arg(long, short)]
    pattern: Option<String>,
}

impl Download {
    async fn run(self) -> Result<ExitCode> {
        let Self {
            common,
            output,
            prefix,
            pattern,
        } = self;
        tokio::fs::create_dir_all(&output)
            .await
            .wrap_err_with(|| format!("failed to create output directory {output}"))?;

        let client = common.client().await?;
        let existing_file_behavior = if common.no_overwrite {
            ExistingFileBehavior::Abort
        } else {
            ExistingFileBehavior::Overwrite
        };
        let backend = S3Download::new(
            client.clone(),
            &common.bucket,
            &output,
            existing_file_behavior,
        );
        backend.check_available().await?;

        let prefix = normalize_prefix(&prefix);
        println!("Listing files in s3://{}/{prefix}", common.bucket);
        let keys = list_keys(&client, &common.bucket, &prefix, pattern.as_deref())
            .await
            .wrap_err("failed to list objects")?;
        if keys.is_empty() {
            println!("No files found to download");
            return Ok(ExitCode::FAILURE);
        }

        let mut details = vec![("Output directory", output.to_string())];
        if !prefix.is_empty() {
            details.push(("S3 prefix", prefix));
        }
        if let Some(pattern) = pattern {
            details.push(("File pattern", pattern));
        }
        transfer_all(
            backend,
            Direction::Download,
            keys,
            common.dispatch_config(),
            details,
        )
        .await
    }
}

#[derive(Debug, Parser)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .multiple(true)
        .args(["files", "directory"]),
))]
struct Upload {
    #[command(flatten)]
    common: Common,
    /// Files to upload. Entries containing `*` or `?` are expanded as globs.
    #[arg(long, short, num_args = 1..)]
    files: Vec<String>,
    /// Upload the files in this directory.
    #[arg(long, short)]
    directory: Option<Utf8PathBuf>,
    /// Only upload files from `--directory` that match this glob.
    #[arg(long, short, default_value = "*")]
    pattern: String,
    /// Also descend into subdirectories of `--directory`.
    #[arg(long, short)]
    recursive: bool,
    /// Key prefix to upload under.
    #[arg(long, default_value = "")]
    prefix: String,
}

impl Upload {
    async fn run(self) -> Result<ExitCode> {
        let Self {
            common,
            files,
            directory,
            pattern,
            recursive,
            prefix,
        } = self;
        let work = upload_work_list(&files, directory.as_deref(), &pattern, recursive)
            .wrap_err("failed to resolve files to upload")?;
        if work.is_empty() {
            println!("No files found to upload");
            return Ok(ExitCode::FAILURE);
        }
        debug!(n_files = work.len(), "resolved upload work list");

        let client = common.client().await?;
        let existing_object_behavior = if common.no_overwrite {
            ExistingObjectBehavior::Abort
        } else {
            ExistingObjectBehavior::Overwrite
        };
        let backend =
            S3Upload::new(client, &common.bucket, &prefix, existing_object_behavior);
        backend.check_available().await?;

        let mut details = vec![("Bucket", common.bucket.clone())];
        let prefix = prefix.trim_end_matches('/');
        if !prefix.is_empty() {
            details.push(("S3 prefix", format!("{prefix}/")));
        }
        transfer_all(
            backend,
            Direction::Upload,
            work,
            common.dispatch_config(),
            details,
        )
        .await
    }
}

async fn transfer_all<T: Transferable>(
    backend: T,
    direction: Direction,
    items: Vec<T::Item>,
    config: DispatchConfig,
    details: Vec<(&'static str, String)>,
) -> Result<ExitCode> {
    let dispatcher = Dispatcher::new(backend, config);
    println!(
        "{}",
        Header {
            direction,
            count: items.len(),
            workers: dispatcher.config().max_workers.get(),
            details,
        }
    );

    let reporter = ProgressReporter::new(direction, items.len());
    let result = dispatcher
        .run(items, |completion| {
            reporter.report(completion, |item| dispatcher.backend().destination(item))
        })
        .await?;
    reporter.finish();

    println!("{}", Summary { direction, result: &result });
    if !result.is_success() {
        warn!(failed = result.failed, "not every file was transferred");
    }

    Ok(exit_code(&result))
}

fn make_clap_v3_styles() -> clap::builder::Styles {
    use clap::builder::styling::AnsiColor;
    clap::builder::Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Green.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let args = Cli::parse();
    let telemetry = TelemetryConfig::new().with_verbosity(args.verbose).init();

    let result = tokio::select! {
        result = args.command.run() => result,
        // Dropping the run future aborts every in-flight transfer.
        result = tokio::signal::ctrl_c() => result
            .wrap_err("failed to listen for ctrl-c")
            .and_then(|()| Err::<ExitCode, _>(eyre!("interrupted by user"))),
    };

    telemetry.flush().await;
    result
}
