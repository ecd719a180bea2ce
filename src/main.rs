use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, ValueHint};

mod cancel;
mod codepage;
mod config;
mod convert;
mod detect;
mod encoding;
mod files;
mod logging;
mod metadata;
mod process;
mod resolver;
mod runner;
mod transcode;

use cancel::CancelFlag;
use config::{Profile, Settings, load_profile};
use convert::{ConverterChoice, build_converter};
use detect::{DetectorChoice, build_detector};
use files::{FileEntry, collect_files};
use logging::{ChangeLog, DEFAULT_LOG_FILE};
use transcode::Transcoder;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let base = match &cli.config {
        Some(path) => load_profile(path)?,
        None => Profile::default(),
    };
    let settings = Settings::from_profile(base.overlay(cli.to_profile()))?;

    let root = std::fs::canonicalize(&settings.root).unwrap_or_else(|_| settings.root.clone());
    let entries = collect_files(&root, &settings.walk)?;
    print_run_summary(&settings, &root, &entries);

    let cancel = CancelFlag::new();
    cancel.install_ctrlc_handler()?;
    let change_log = settings
        .change_log
        .as_deref()
        .map(ChangeLog::open)
        .transpose()?;

    let transcoder = Transcoder::new(
        build_detector(settings.detector, &settings.detector_command),
        build_converter(settings.converter, &settings.converter_command),
        settings.transcode.clone(),
    )
    .with_cancel(cancel.clone());

    let summary = runner::run(&transcoder, &entries, &cancel, change_log.as_ref());
    summary.print_attention();
    summary.stats.print();
    println!("Done in {:.1}s.", summary.elapsed.as_secs_f64());
    Ok(summary.exit_code())
}

fn print_run_summary(settings: &Settings, root: &Path, entries: &[FileEntry]) {
    let extensions: Vec<&str> = settings
        .walk
        .extensions
        .iter()
        .map(String::as_str)
        .collect();
    println!(
        "Found {} files with extensions {:?} in {}",
        entries.len(),
        extensions,
        root.display()
    );
    let options = &settings.transcode;
    println!(
        "mode: {}",
        if options.dry_run { "dry-run" } else { "rewrite" }
    );
    println!(
        "detector: {}",
        match settings.detector {
            DetectorChoice::Chardetng => "chardetng".to_string(),
            DetectorChoice::Command => format!("command ({})", settings.detector_command),
            DetectorChoice::None => "none".to_string(),
        }
    );
    println!(
        "converter: {}",
        match settings.converter {
            ConverterChoice::Builtin => "builtin".to_string(),
            ConverterChoice::Command => format!("command ({})", settings.converter_command),
        }
    );
    println!(
        "timeout: {:.1}s per attempt, fallback: {}",
        options.timeout.as_secs_f64(),
        options.fallback
    );
    if !settings.walk.exclude.is_empty() {
        println!("exclude globs: {:?}", settings.walk.exclude);
    }
    if let Some(log) = &settings.change_log {
        println!("change log: {}", log.display());
    }
    println!("---");
}

/// Rewrites markup, style and script files under a directory tree as UTF-8.
#[derive(Debug, Parser)]
#[command(name = "to-utf8", version)]
struct Cli {
    /// Directory to walk.
    #[arg(long, value_name = "DIR", value_hint = ValueHint::DirPath)]
    root: Option<PathBuf>,
    /// Comma-separated extensions to include [default: html,htm,css,js].
    #[arg(long = "ext", value_name = "LIST")]
    ext: Option<String>,
    /// Only process .html and .htm files.
    #[arg(long = "only-html", action = ArgAction::SetTrue)]
    only_html: bool,
    /// Per-conversion timeout in seconds [default: 5].
    #[arg(long, value_name = "SECS")]
    timeout: Option<f64>,
    /// Report what would happen without modifying files.
    #[arg(long = "dry-run", action = ArgAction::SetTrue)]
    dry_run: bool,
    #[arg(long, value_enum)]
    detector: Option<DetectorChoice>,
    /// Program used by `--detector command` [default: uchardet].
    #[arg(long = "detector-command", value_name = "PROGRAM")]
    detector_command: Option<String>,
    #[arg(long, value_enum)]
    converter: Option<ConverterChoice>,
    /// iconv-compatible program used by `--converter command` [default: iconv].
    #[arg(long = "converter-command", value_name = "PROGRAM")]
    converter_command: Option<String>,
    /// Last-resort single-byte encoding [default: ISO-8859-1].
    #[arg(long = "fallback-encoding", value_name = "ENCODING")]
    fallback_encoding: Option<String>,
    #[arg(long = "include-hidden", action = ArgAction::SetTrue)]
    include_hidden: bool,
    /// Glob (relative to the root) of files to leave alone; repeatable.
    #[arg(long = "exclude", value_name = "GLOB")]
    exclude: Vec<String>,
    /// YAML or JSON profile; explicit flags override it.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,
    /// Append a JSON line per rewritten file.
    #[arg(
        long = "change-log",
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = DEFAULT_LOG_FILE,
        value_hint = ValueHint::FilePath
    )]
    change_log: Option<PathBuf>,
    /// Explain why candidate encodings were rejected.
    #[arg(long, short, action = ArgAction::SetTrue)]
    verbose: bool,
}

impl Cli {
    fn to_profile(&self) -> Profile {
        Profile {
            root: self.root.clone(),
            extensions: self.ext.as_ref().map(|list| vec![list.clone()]),
            only_html: self.only_html.then_some(true),
            timeout_secs: self.timeout,
            dry_run: self.dry_run.then_some(true),
            detector: self.detector,
            detector_command: self.detector_command.clone(),
            converter: self.converter,
            converter_command: self.converter_command.clone(),
            fallback_encoding: self.fallback_encoding.clone(),
            include_hidden: self.include_hidden.then_some(true),
            exclude: (!self.exclude.is_empty()).then(|| self.exclude.clone()),
            change_log: self.change_log.clone(),
            verbose: self.verbose.then_some(true),
        }
    }
}
