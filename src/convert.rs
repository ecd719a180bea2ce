use std::ffi::OsStr;
use std::time::Duration;

use clap::ValueEnum;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoding::{Backend, EncodingName};
use crate::process::{ProcessError, run_bounded, run_command};

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("no decoder for {0}")]
    Unsupported(EncodingName),
    #[error("input is not valid {0}")]
    Unmappable(EncodingName),
    #[error("conversion timed out after {0:?}")]
    TimedOut(Duration),
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Converts bytes in `source` to UTF-8 within `timeout`.
///
/// Callers re-validate the returned bytes; a converter is not trusted to emit
/// well-formed UTF-8.
pub trait ByteConverter {
    fn convert(
        &self,
        source: &EncodingName,
        input: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ConversionError>;
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConverterChoice {
    #[default]
    Builtin,
    Command,
}

pub fn build_converter(choice: ConverterChoice, command: &str) -> Box<dyn ByteConverter> {
    match choice {
        ConverterChoice::Builtin => Box::new(BuiltinConverter),
        ConverterChoice::Command => Box::new(CommandConverter::new(command)),
    }
}

/// Decodes in-process with `encoding_rs` and the bundled code pages.
pub struct BuiltinConverter;

impl ByteConverter for BuiltinConverter {
    fn convert(
        &self,
        source: &EncodingName,
        input: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ConversionError> {
        let backend = source
            .backend()
            .ok_or_else(|| ConversionError::Unsupported(source.clone()))?;
        let owned = input.to_vec();
        match run_bounded(timeout, move || decode_strict(backend, &owned)) {
            Some(Some(text)) => Ok(text.into_bytes()),
            Some(None) => Err(ConversionError::Unmappable(source.clone())),
            None => Err(ConversionError::TimedOut(timeout)),
        }
    }
}

/// Decodes `bytes`, refusing input with bytes the encoding does not define.
///
/// `encoding_rs` follows the WHATWG tables, which map the holes of the Windows
/// code pages (0x81, 0x8D, ... in windows-1252) to C1 controls. Those are
/// treated as unmapped here, the way iconv treats them.
pub fn decode_strict(backend: Backend, bytes: &[u8]) -> Option<String> {
    match backend {
        Backend::Latin1 => Some(bytes.iter().map(|&byte| char::from(byte)).collect()),
        Backend::Table(page) => Some(page.decode(bytes)),
        Backend::Standard(encoding) => {
            let body = strip_utf16_bom(encoding, bytes);
            let text = encoding.decode_without_bom_handling_and_without_replacement(body)?;
            if encoding.name().starts_with("windows-") && text.chars().any(is_c1_control) {
                return None;
            }
            Some(text.into_owned())
        }
    }
}

fn strip_utf16_bom<'a>(encoding: &'static Encoding, bytes: &'a [u8]) -> &'a [u8] {
    if encoding == UTF_16LE && bytes.starts_with(&[0xFF, 0xFE]) {
        return &bytes[2..];
    }
    if encoding == UTF_16BE && bytes.starts_with(&[0xFE, 0xFF]) {
        return &bytes[2..];
    }
    bytes
}

fn is_c1_control(ch: char) -> bool {
    ('\u{80}'..='\u{9f}').contains(&ch)
}

/// Shells out to an iconv-compatible program: `PROG -f SRC -t UTF-8`, input on
/// stdin, output on stdout.
pub struct CommandConverter {
    program: String,
}

impl CommandConverter {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl ByteConverter for CommandConverter {
    fn convert(
        &self,
        source: &EncodingName,
        input: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ConversionError> {
        let args = [
            OsStr::new("-f"),
            OsStr::new(source.as_str()),
            OsStr::new("-t"),
            OsStr::new("UTF-8"),
        ];
        Ok(run_command(&self.program, &args, Some(input), timeout)?)
    }
}
