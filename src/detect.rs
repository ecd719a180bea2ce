use std::path::Path;
use std::time::Duration;

use chardetng::EncodingDetector;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::process::run_command;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(3);

/// Statistical guess at a file's encoding. An unavailable or failing detector
/// answers `None`; it never errors.
pub trait CharsetDetector {
    fn detect(&self, path: &Path, bytes: &[u8]) -> Option<String>;
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, ValueEnum, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectorChoice {
    #[default]
    Chardetng,
    Command,
    None,
}

pub fn build_detector(choice: DetectorChoice, command: &str) -> Box<dyn CharsetDetector> {
    match choice {
        DetectorChoice::Chardetng => Box::new(ChardetngDetector),
        DetectorChoice::Command => Box::new(CommandDetector::new(command)),
        DetectorChoice::None => Box::new(NoDetector),
    }
}

/// In-process detection with `chardetng`.
pub struct ChardetngDetector;

impl CharsetDetector for ChardetngDetector {
    fn detect(&self, _path: &Path, bytes: &[u8]) -> Option<String> {
        if bytes.is_empty() {
            return None;
        }
        let mut detector = EncodingDetector::new();
        detector.feed(bytes, true);
        Some(detector.guess(None, true).name().to_string())
    }
}

/// Runs an external detector such as `uchardet PATH` and reads the encoding
/// name from its stdout.
pub struct CommandDetector {
    program: String,
    timeout: Duration,
}

impl CommandDetector {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            timeout: COMMAND_TIMEOUT,
        }
    }
}

impl CharsetDetector for CommandDetector {
    fn detect(&self, path: &Path, _bytes: &[u8]) -> Option<String> {
        let stdout = run_command(&self.program, &[path.as_os_str()], None, self.timeout).ok()?;
        let guess = String::from_utf8_lossy(&stdout).trim().to_string();
        if guess.is_empty() || guess.eq_ignore_ascii_case("unknown") {
            return None;
        }
        Some(guess)
    }
}

pub struct NoDetector;

impl CharsetDetector for NoDetector {
    fn detect(&self, _path: &Path, _bytes: &[u8]) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chardetng_names_a_legacy_encoding() {
        let text = "Příliš žluťoučký kůň úpěl ďábelské ódy. ".repeat(20);
        let (bytes, _, _) = encoding_rs::WINDOWS_1250.encode(&text);
        let guess = ChardetngDetector.detect(Path::new("x.txt"), &bytes);
        assert!(guess.is_some());
        assert_ne!(guess.as_deref(), Some("UTF-8"));
    }

    #[test]
    fn chardetng_skips_empty_input() {
        assert!(ChardetngDetector.detect(Path::new("x.txt"), b"").is_none());
    }

    #[test]
    fn missing_detector_program_yields_no_hint() {
        let detector = CommandDetector::new("to-utf8-no-such-detector");
        assert!(detector.detect(Path::new("x.txt"), b"abc").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn detector_output_is_trimmed() {
        let detector = CommandDetector::new("echo");
        assert_eq!(
            detector.detect(Path::new("ISO-8859-2"), b"").as_deref(),
            Some("ISO-8859-2")
        );
    }
}
