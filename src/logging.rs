use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::files::write_atomic;

pub const DEFAULT_LOG_FILE: &str = ".to-utf8/change_log.jsonl";
const MAX_ENTRIES: usize = 500;

#[derive(Debug, Serialize)]
pub struct ChangeLogEntry<'a> {
    pub timestamp: &'a str,
    pub path: &'a Path,
    pub status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'a str>,
}

/// JSONL record of rewritten files holding only the newest `MAX_ENTRIES` rows.
#[derive(Debug, Clone)]
pub struct ChangeLog {
    path: PathBuf,
}

impl ChangeLog {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {dir:?}"))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn record(&self, path: &Path, status: &str, source: Option<&str>) -> Result<()> {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".into());
        let row = serde_json::to_string(&ChangeLogEntry {
            timestamp: &timestamp,
            path,
            status,
            source,
        })?;

        let existing = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {:?}", self.path));
            }
        };
        let mut rows: Vec<&str> = existing.lines().filter(|line| !line.is_empty()).collect();
        rows.push(&row);
        let keep = &rows[rows.len().saturating_sub(MAX_ENTRIES)..];

        let mut out = keep.join("\n");
        out.push('\n');
        write_atomic(&self.path, out.as_bytes())
    }
}
