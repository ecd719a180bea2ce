use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use crate::cancel::{CancelFlag, Interrupted};
use crate::files::FileEntry;
use crate::logging::ChangeLog;
use crate::transcode::{ConversionOutcome, Transcoder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Done(ConversionOutcome),
    /// Anything that went wrong outside the conversion itself (I/O, permissions).
    Error(String),
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub status: FileStatus,
}

impl FileReport {
    pub fn label(&self) -> &'static str {
        match &self.status {
            FileStatus::Done(outcome) => outcome.label(),
            FileStatus::Error(_) => "ERROR",
        }
    }
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            FileStatus::Done(outcome) => write!(
                f,
                "{:<6} {} ({outcome})",
                self.label(),
                self.path.display()
            ),
            FileStatus::Error(message) => {
                write!(f, "{:<6} {}: {message}", self.label(), self.path.display())
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub skipped: usize,
    pub converted: usize,
    pub dry_run: usize,
    pub fallback: usize,
    pub failed: usize,
    pub errors: usize,
}

impl RunStats {
    fn add(&mut self, status: &FileStatus) {
        match status {
            FileStatus::Done(ConversionOutcome::Skipped { .. }) => self.skipped += 1,
            FileStatus::Done(ConversionOutcome::Converted { dry_run: true, .. }) => {
                self.dry_run += 1
            }
            FileStatus::Done(ConversionOutcome::Converted { .. }) => self.converted += 1,
            FileStatus::Done(ConversionOutcome::ConvertedFallback { .. }) => self.fallback += 1,
            FileStatus::Done(ConversionOutcome::Failed { .. }) => self.failed += 1,
            FileStatus::Error(_) => self.errors += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.skipped + self.converted + self.dry_run + self.fallback + self.failed + self.errors
    }

    pub fn print(&self) {
        if self.total() == 0 {
            return;
        }
        println!(
            "summary: ok={}, ok-dry={}, fallback={}, skipped={}, failed={}, errors={}",
            self.converted, self.dry_run, self.fallback, self.skipped, self.failed, self.errors
        );
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub reports: Vec<FileReport>,
    pub stats: RunStats,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    /// False when interrupted, or when every file errored out.
    pub fn succeeded(&self) -> bool {
        let all_errored = self.stats.total() > 0 && self.stats.errors == self.stats.total();
        !self.interrupted && !all_errored
    }

    /// Files an operator should look at: fallback decodes, failures, errors.
    pub fn needs_attention(&self) -> impl Iterator<Item = &FileReport> {
        self.reports.iter().filter(|report| {
            matches!(
                report.status,
                FileStatus::Error(_)
                    | FileStatus::Done(
                        ConversionOutcome::ConvertedFallback { .. }
                            | ConversionOutcome::Failed { .. }
                    )
            )
        })
    }

    pub fn print_attention(&self) {
        let flagged: Vec<&FileReport> = self.needs_attention().collect();
        if flagged.is_empty() {
            return;
        }
        println!("needs attention:");
        for report in flagged {
            println!("  {report}");
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.succeeded() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Processes `entries` one at a time, printing a progress line and exactly one
/// status line per file. A failing file never stops the run; cancellation does,
/// before the next file is touched.
pub fn run(
    transcoder: &Transcoder,
    entries: &[FileEntry],
    cancel: &CancelFlag,
    change_log: Option<&ChangeLog>,
) -> RunSummary {
    let start = Instant::now();
    let total = entries.len();
    let mut reports = Vec::with_capacity(total);
    let mut stats = RunStats::default();
    let mut interrupted = false;

    for (idx, entry) in entries.iter().enumerate() {
        if cancel.is_cancelled() {
            interrupted = true;
            break;
        }
        println!("[{}/{total}] {}", idx + 1, entry.path.display());

        let status = match transcoder.process(&entry.path, entry.kind) {
            Ok(outcome) => FileStatus::Done(outcome),
            Err(err) if err.downcast_ref::<Interrupted>().is_some() => {
                interrupted = true;
                break;
            }
            Err(err) => FileStatus::Error(format!("{err:#}")),
        };
        let report = FileReport {
            path: entry.path.clone(),
            status,
        };
        println!("  {report}");
        record_change(change_log, &report);
        stats.add(&report.status);
        reports.push(report);
    }

    if interrupted {
        println!("\nInterrupted by user.");
    }

    RunSummary {
        reports,
        stats,
        interrupted,
        elapsed: start.elapsed(),
    }
}

fn record_change(change_log: Option<&ChangeLog>, report: &FileReport) {
    let (Some(log), FileStatus::Done(outcome)) = (change_log, &report.status) else {
        return;
    };
    if !outcome.wrote_file() {
        return;
    }
    let source = outcome.source().map(|name| name.as_str());
    if let Err(err) = log.record(&report.path, outcome.label(), source) {
        println!("warning: unable to update change log: {err:#}");
    }
}
