//! Console output for a run: header, live progress lines and the final summary.

use std::{fmt, io::IsTerminal as _, process::ExitCode};

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::dispatch::{Completion, DispatchResult, TransferOutcome};

const RULE_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

impl Direction {
    fn noun(self) -> &'static str {
        match self {
            Self::Download => "download",
            Self::Upload => "upload",
        }
    }

    fn title(self) -> &'static str {
        match self {
            Self::Download => "Download",
            Self::Upload => "Upload",
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            Self::Download => "Downloaded",
            Self::Upload => "Uploaded",
        }
    }
}

/// Printed once the work list is known, before anything is transferred.
#[derive(Debug)]
pub struct Header {
    pub direction: Direction,
    pub count: usize,
    pub workers: usize,
    /// Extra `label: value` lines, e.g. the destination.
    pub details: Vec<(&'static str, String)>,
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Found {} files to {}", self.count, self.direction.noun())?;
        writeln!(f, "Using {} concurrent workers", self.workers)?;
        for (label, value) in &self.details {
            writeln!(f, "{label}: {value}")?;
        }
        write!(f, "{}", "-".repeat(RULE_WIDTH))
    }
}

/// One line per finished item.
pub fn progress_line<I: fmt::Display>(
    direction: Direction,
    completion: &Completion<I>,
    destination: impl FnOnce(&I) -> String,
) -> String {
    let progress = completion.progress;
    match &completion.outcome {
        TransferOutcome::Success { item } => format!(
            "✓ {progress} {}: {item} -> {}",
            direction.past_tense(),
            destination(item)
        ),
        TransferOutcome::Failure { item, reason } => {
            format!("✗ {progress} Failed: {item} - {reason}")
        }
    }
}

/// Shows completions either above an interactive progress bar, or as log lines when
/// stderr isn't a terminal.
#[derive(Debug)]
pub struct ProgressReporter {
    direction: Direction,
    bar: Option<ProgressBar>,
}

impl ProgressReporter {
    pub fn new(direction: Direction, total: usize) -> Self {
        let bar = std::io::stderr().is_terminal().then(|| {
            let style = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
            ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX)).with_style(style)
        });

        Self { direction, bar }
    }

    pub fn report<I: fmt::Display>(
        &self,
        completion: &Completion<I>,
        destination: impl FnOnce(&I) -> String,
    ) {
        let line = progress_line(self.direction, completion, destination);
        match &self.bar {
            Some(bar) => {
                bar.println(line);
                bar.inc(1);
            }
            None if completion.outcome.is_success() => info!("{line}"),
            None => warn!("{line}"),
        }
    }

    pub fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Printed after the run.
#[derive(Debug)]
pub struct Summary<'a, I> {
    pub direction: Direction,
    pub result: &'a DispatchResult<I>,
}

impl<I: fmt::Display> fmt::Display for Summary<'_, I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.result;
        let elapsed = result.elapsed.as_secs_f64();
        writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
        writeln!(f, "{} Summary:", self.direction.title())?;
        writeln!(f, "  Successful: {}", result.succeeded)?;
        writeln!(f, "  Failed: {}", result.failed)?;
        writeln!(f, "  Total time: {elapsed:.2} seconds")?;
        if result.succeeded > 0 {
            writeln!(
                f,
                "  Average time per file: {:.2} seconds",
                elapsed / result.succeeded as f64
            )?;
        }
        if !result.errors.is_empty() {
            writeln!(f, "Failures:")?;
            for err in &result.errors {
                writeln!(f, "  {} - {}", err.item, err.reason)?;
            }
        }
        if result.is_success() {
            write!(
                f,
                "All {} files {} successfully!",
                result.succeeded,
                self.direction.past_tense().to_lowercase()
            )
        } else {
            write!(
                f,
                "Some {}s failed. Check the errors above.",
                self.direction.noun()
            )
        }
    }
}

/// Success only when at least one item was transferred and none failed.
pub fn exit_code<I>(result: &DispatchResult<I>) -> ExitCode {
    if result.is_success() && result.total() > 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
