use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use crate::convert::ConverterChoice;
use crate::detect::DetectorChoice;
use crate::encoding::EncodingName;
use crate::files::{DEFAULT_EXTENSIONS, MARKUP_EXTENSIONS, WalkOptions, parse_extensions};
use crate::transcode::TranscodeOptions;

const DEFAULT_TIMEOUT_SECS: f64 = 5.0;
const DEFAULT_DETECTOR_COMMAND: &str = "uchardet";
const DEFAULT_CONVERTER_COMMAND: &str = "iconv";

/// Settings as read from a profile file or gathered from the command line.
/// Every field is optional so layers can be stacked with [`Profile::overlay`].
#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    pub root: Option<PathBuf>,
    pub extensions: Option<Vec<String>>,
    pub only_html: Option<bool>,
    pub timeout_secs: Option<f64>,
    pub dry_run: Option<bool>,
    pub detector: Option<DetectorChoice>,
    pub detector_command: Option<String>,
    pub converter: Option<ConverterChoice>,
    pub converter_command: Option<String>,
    pub fallback_encoding: Option<String>,
    pub include_hidden: Option<bool>,
    pub exclude: Option<Vec<String>>,
    pub change_log: Option<PathBuf>,
    pub verbose: Option<bool>,
}

impl Profile {
    /// Values set in `overrides` win; unset ones keep this profile's value.
    pub fn overlay(self, overrides: Profile) -> Profile {
        Profile {
            root: overrides.root.or(self.root),
            extensions: overrides.extensions.or(self.extensions),
            only_html: overrides.only_html.or(self.only_html),
            timeout_secs: overrides.timeout_secs.or(self.timeout_secs),
            dry_run: overrides.dry_run.or(self.dry_run),
            detector: overrides.detector.or(self.detector),
            detector_command: overrides.detector_command.or(self.detector_command),
            converter: overrides.converter.or(self.converter),
            converter_command: overrides.converter_command.or(self.converter_command),
            fallback_encoding: overrides.fallback_encoding.or(self.fallback_encoding),
            include_hidden: overrides.include_hidden.or(self.include_hidden),
            exclude: overrides.exclude.or(self.exclude),
            change_log: overrides.change_log.or(self.change_log),
            verbose: overrides.verbose.or(self.verbose),
        }
    }
}

/// A YAML profile, or JSON when the file ends in `.json`.
pub fn load_profile(path: &Path) -> Result<Profile> {
    let data = fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let profile = if is_json {
        serde_json::from_slice(&data)
            .with_context(|| format!("parsing JSON config {}", path.display()))?
    } else {
        serde_yaml::from_slice(&data)
            .with_context(|| format!("parsing YAML config {}", path.display()))?
    };
    Ok(profile)
}

/// Fully resolved run settings with defaults applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub root: PathBuf,
    pub walk: WalkOptions,
    pub transcode: TranscodeOptions,
    pub detector: DetectorChoice,
    pub detector_command: String,
    pub converter: ConverterChoice,
    pub converter_command: String,
    pub change_log: Option<PathBuf>,
}

impl Settings {
    pub fn from_profile(profile: Profile) -> Result<Self> {
        let extensions: BTreeSet<String> = if profile.only_html.unwrap_or(false) {
            MARKUP_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
        } else {
            match &profile.extensions {
                Some(list) => parse_extensions(&list.join(",")),
                None => parse_extensions(DEFAULT_EXTENSIONS),
            }
        };
        if extensions.is_empty() {
            bail!("no file extensions selected");
        }

        let timeout_secs = profile.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            bail!("timeout must be a positive number of seconds, got {timeout_secs}");
        }
        let timeout = Duration::try_from_secs_f64(timeout_secs)
            .map_err(|err| anyhow!("timeout {timeout_secs} is out of range: {err}"))?;

        let fallback_label = profile.fallback_encoding.as_deref().unwrap_or("ISO-8859-1");
        let fallback = EncodingName::parse(fallback_label)
            .ok_or_else(|| anyhow!("fallback encoding must not be empty"))?;
        if fallback.backend().is_none() {
            bail!("unknown fallback encoding '{fallback_label}'");
        }

        Ok(Self {
            root: profile.root.unwrap_or_else(|| PathBuf::from(".")),
            walk: WalkOptions {
                extensions,
                include_hidden: profile.include_hidden.unwrap_or(false),
                exclude: profile.exclude.unwrap_or_default(),
            },
            transcode: TranscodeOptions {
                timeout,
                dry_run: profile.dry_run.unwrap_or(false),
                fallback,
                verbose: profile.verbose.unwrap_or(false),
            },
            detector: profile.detector.unwrap_or_default(),
            detector_command: profile
                .detector_command
                .unwrap_or_else(|| DEFAULT_DETECTOR_COMMAND.to_string()),
            converter: profile.converter.unwrap_or_default(),
            converter_command: profile
                .converter_command
                .unwrap_or_else(|| DEFAULT_CONVERTER_COMMAND.to_string()),
            change_log: profile.change_log,
        })
    }
}
