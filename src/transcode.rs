use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::cancel::CancelFlag;
use crate::convert::{ByteConverter, decode_strict};
use crate::detect::CharsetDetector;
use crate::encoding::{EncodingName, has_utf8_bom, names_utf8};
use crate::files::{FileKind, write_atomic};
use crate::metadata::normalize_metadata;
use crate::resolver::{Hints, declared_charset, resolve};

/// A file's path and the bytes read from it once, up front.
#[derive(Debug, Clone)]
pub struct FileTask {
    pub path: PathBuf,
    pub kind: FileKind,
    pub bytes: Vec<u8>,
}

impl FileTask {
    pub fn read(path: &Path, kind: FileKind) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            kind,
            bytes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// Already valid UTF-8. Markup may still have had its charset tag rewritten.
    Skipped { metadata_rewritten: bool },
    Converted { source: EncodingName, dry_run: bool },
    /// Decoded with the fallback encoding; the mapping may be wrong.
    ConvertedFallback { source: EncodingName, dry_run: bool },
    Failed {
        declared: Option<String>,
        detected: Option<String>,
    },
}

impl ConversionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ConversionOutcome::Skipped { .. } => "SKIP",
            ConversionOutcome::Converted { dry_run: false, .. } => "OK",
            ConversionOutcome::Converted { dry_run: true, .. } => "OK-DRY",
            ConversionOutcome::ConvertedFallback { .. } => "OK*",
            ConversionOutcome::Failed { .. } => "FAIL",
        }
    }

    /// Whether the file on disk was rewritten.
    pub fn wrote_file(&self) -> bool {
        match self {
            ConversionOutcome::Skipped { metadata_rewritten } => *metadata_rewritten,
            ConversionOutcome::Converted { dry_run, .. }
            | ConversionOutcome::ConvertedFallback { dry_run, .. } => !dry_run,
            ConversionOutcome::Failed { .. } => false,
        }
    }

    pub fn source(&self) -> Option<&EncodingName> {
        match self {
            ConversionOutcome::Converted { source, .. }
            | ConversionOutcome::ConvertedFallback { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for ConversionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionOutcome::Skipped { .. } => f.write_str("already UTF-8"),
            ConversionOutcome::Converted { source, .. } => write!(f, "source: {source}"),
            ConversionOutcome::ConvertedFallback { source, dry_run } => {
                write!(f, "fallback {source} - check visually")?;
                if *dry_run {
                    f.write_str(", not written")?;
                }
                Ok(())
            }
            ConversionOutcome::Failed { declared, detected } => write!(
                f,
                "declared={}; detected={}",
                declared.as_deref().unwrap_or("-"),
                detected.as_deref().unwrap_or("-")
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    /// Budget for each conversion attempt.
    pub timeout: Duration,
    pub dry_run: bool,
    pub fallback: EncodingName,
    pub verbose: bool,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            dry_run: false,
            fallback: EncodingName::latin1(),
            verbose: false,
        }
    }
}

pub struct Transcoder {
    detector: Box<dyn CharsetDetector>,
    converter: Box<dyn ByteConverter>,
    options: TranscodeOptions,
    cancel: CancelFlag,
}

impl Transcoder {
    pub fn new(
        detector: Box<dyn CharsetDetector>,
        converter: Box<dyn ByteConverter>,
        options: TranscodeOptions,
    ) -> Self {
        Self {
            detector,
            converter,
            options,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reads `path` and runs it through the pipeline.
    pub fn process(&self, path: &Path, kind: FileKind) -> Result<ConversionOutcome> {
        let task = FileTask::read(path, kind)?;
        self.transcode(&task)
    }

    pub fn transcode(&self, task: &FileTask) -> Result<ConversionOutcome> {
        let declared = declared_charset(&task.bytes);

        if let Ok(text) = std::str::from_utf8(&task.bytes) {
            if has_utf8_bom(&task.bytes) || declared.as_deref().is_none_or(names_utf8) {
                return self.keep_utf8(task, text);
            }
        }

        let hints = Hints {
            declared,
            detected: self.detector.detect(&task.path, &task.bytes),
        };
        let mut candidates = resolve(
            &task.bytes,
            hints.declared.as_deref(),
            hints.detected.as_deref(),
        );
        if std::str::from_utf8(&task.bytes).is_err() && candidates.remove_utf8() {
            self.note(task, "content is not valid UTF-8; ignoring UTF-8 hint");
        }
        if self.options.verbose {
            println!(
                "  candidates for {}: {}",
                task.path.display(),
                candidates.names().join(", ")
            );
        }

        for source in candidates.iter() {
            self.cancel.check()?;
            let converted = match self
                .converter
                .convert(source, &task.bytes, self.options.timeout)
            {
                Ok(bytes) => bytes,
                Err(err) => {
                    self.note(task, &format!("{source} rejected: {err}"));
                    continue;
                }
            };
            let text = match String::from_utf8(converted) {
                Ok(text) => text,
                Err(_) => {
                    self.note(task, &format!("{source} rejected: output is not UTF-8"));
                    continue;
                }
            };

            if !self.options.dry_run {
                self.persist(task, &text)?;
            }
            return Ok(ConversionOutcome::Converted {
                source: source.clone(),
                dry_run: self.options.dry_run,
            });
        }

        self.fall_back(task, hints)
    }

    fn keep_utf8(&self, task: &FileTask, text: &str) -> Result<ConversionOutcome> {
        if self.options.dry_run || !task.kind.is_markup() {
            return Ok(ConversionOutcome::Skipped {
                metadata_rewritten: false,
            });
        }

        let normalized = normalize_metadata(text);
        if normalized == text {
            return Ok(ConversionOutcome::Skipped {
                metadata_rewritten: false,
            });
        }
        self.cancel.check()?;
        write_atomic(&task.path, normalized.as_bytes())?;
        Ok(ConversionOutcome::Skipped {
            metadata_rewritten: true,
        })
    }

    fn fall_back(&self, task: &FileTask, hints: Hints) -> Result<ConversionOutcome> {
        self.cancel.check()?;
        let fallback = &self.options.fallback;
        let decoded = fallback
            .backend()
            .and_then(|backend| decode_strict(backend, &task.bytes));
        let Some(text) = decoded else {
            return Ok(ConversionOutcome::Failed {
                declared: hints.declared,
                detected: hints.detected,
            });
        };

        if !self.options.dry_run {
            self.persist(task, &text)?;
        }
        Ok(ConversionOutcome::ConvertedFallback {
            source: fallback.clone(),
            dry_run: self.options.dry_run,
        })
    }

    fn persist(&self, task: &FileTask, text: &str) -> Result<()> {
        let text = if task.kind.is_markup() {
            normalize_metadata(text)
        } else {
            text.into()
        };
        self.cancel.check()?;
        write_atomic(&task.path, text.as_bytes())
    }

    fn note(&self, task: &FileTask, message: &str) {
        if self.options.verbose {
            println!("  {}: {message}", task.path.display());
        }
    }
}
