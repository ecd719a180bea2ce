use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use globset::{Glob, GlobSet, GlobSetBuilder};
use time::OffsetDateTime;
use walkdir::{DirEntry, WalkDir};

pub const DEFAULT_EXTENSIONS: &str = "html,htm,css,js";
pub const MARKUP_EXTENSIONS: [&str; 2] = ["html", "htm"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Markup,
    Style,
    Script,
    Other,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = extension_of(path).unwrap_or_default();
        match ext.as_str() {
            "html" | "htm" => FileKind::Markup,
            "css" => FileKind::Style,
            "js" => FileKind::Script,
            _ => FileKind::Other,
        }
    }

    pub fn is_markup(self) -> bool {
        self == FileKind::Markup
    }
}

#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub kind: FileKind,
}

impl FileEntry {
    pub fn new(path: PathBuf) -> Self {
        let kind = FileKind::from_path(&path);
        Self { path, kind }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WalkOptions {
    /// Lowercase, without the leading dot.
    pub extensions: BTreeSet<String>,
    pub include_hidden: bool,
    pub exclude: Vec<String>,
}

/// Parses `"html, .CSS,js"` into `{"css", "html", "js"}`.
pub fn parse_extensions(list: &str) -> BTreeSet<String> {
    list.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

/// Every file under `root` whose extension is selected, sorted by path.
///
/// Unreadable directories are reported and skipped rather than aborting the
/// walk.
pub fn collect_files(root: &Path, options: &WalkOptions) -> Result<Vec<FileEntry>> {
    let metadata =
        fs::metadata(root).with_context(|| format!("unable to read root {}", root.display()))?;
    if !metadata.is_dir() {
        bail!("root {} is not a directory", root.display());
    }
    let exclude = build_exclude_globs(&options.exclude)?;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0 || options.include_hidden || !is_hidden(entry)
        });

    let mut entries = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                println!("warning: skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        let selected = extension_of(&path)
            .map(|ext| options.extensions.contains(&ext))
            .unwrap_or(false);
        if !selected || is_excluded(root, &path, exclude.as_ref()) {
            continue;
        }
        entries.push(FileEntry::new(path));
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Replaces `path` with `data` through a temporary sibling and a rename, so
/// readers (and an interrupted run) see either the old or the new file.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let base_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let unique = format!(
        ".to-utf8-tmp-{}-{}",
        std::process::id(),
        OffsetDateTime::now_utc().unix_timestamp_nanos()
    );
    let temp_path = base_dir.join(unique);
    {
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("creating temp file {}", temp_path.display()))?;
        file.write_all(data)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("syncing temp file {}", temp_path.display()))?;
    }
    if let Ok(original) = fs::metadata(path) {
        let _ = fs::set_permissions(&temp_path, original.permissions());
    }
    fs::rename(&temp_path, path).or_else(|err| {
        let _ = fs::remove_file(&temp_path);
        Err(err).with_context(|| format!("replacing {}", path.display()))
    })?;
    Ok(())
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

fn is_excluded(root: &Path, path: &Path, exclude: Option<&GlobSet>) -> bool {
    let Some(set) = exclude else {
        return false;
    };
    let relative = path.strip_prefix(root).unwrap_or(path);
    set.is_match(normalize_slashes(relative).as_str())
}

fn normalize_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn build_exclude_globs(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob =
            Glob::new(pattern).map_err(|err| anyhow!("invalid exclude glob '{pattern}': {err}"))?;
        builder.add(glob);
    }

    builder
        .build()
        .map(Some)
        .map_err(|err| anyhow!("unable to build exclude globs: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(exts: &str) -> WalkOptions {
        WalkOptions {
            extensions: parse_extensions(exts),
            ..WalkOptions::default()
        }
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dir");
        }
        fs::write(path, "x").expect("write file");
    }

    fn names(root: &Path, entries: &[FileEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| normalize_slashes(e.path.strip_prefix(root).expect("under root")))
            .collect()
    }

    #[test]
    fn extension_list_is_normalized() {
        let exts = parse_extensions(" .HTML, css,,js ");
        assert_eq!(exts.into_iter().collect::<Vec<_>>(), vec!["css", "html", "js"]);
    }

    #[test]
    fn kinds_follow_extensions() {
        assert_eq!(FileKind::from_path(Path::new("a/INDEX.HTM")), FileKind::Markup);
        assert_eq!(FileKind::from_path(Path::new("site.css")), FileKind::Style);
        assert_eq!(FileKind::from_path(Path::new("app.js")), FileKind::Script);
        assert_eq!(FileKind::from_path(Path::new("notes.txt")), FileKind::Other);
    }

    #[test]
    fn collects_selected_extensions_sorted() {
        let temp = tempdir().expect("temp dir");
        let root = temp.path();
        touch(&root.join("b.css"));
        touch(&root.join("a.html"));
        touch(&root.join("sub/c.JS"));
        touch(&root.join("readme.md"));

        let entries = collect_files(root, &options(DEFAULT_EXTENSIONS)).expect("walk");
        assert_eq!(names(root, &entries), vec!["a.html", "b.css", "sub/c.JS"]);
    }

    #[test]
    fn hidden_directories_are_skipped_unless_requested() {
        let temp = tempdir().expect("temp dir");
        let root = temp.path();
        touch(&root.join(".cache/page.html"));
        touch(&root.join("page.html"));

        let entries = collect_files(root, &options("html")).expect("walk");
        assert_eq!(names(root, &entries), vec!["page.html"]);

        let mut opts = options("html");
        opts.include_hidden = true;
        let entries = collect_files(root, &opts).expect("walk");
        assert_eq!(names(root, &entries), vec![".cache/page.html", "page.html"]);
    }

    #[test]
    fn exclude_globs_match_relative_paths() {
        let temp = tempdir().expect("temp dir");
        let root = temp.path();
        touch(&root.join("vendor/lib.js"));
        touch(&root.join("app.js"));

        let mut opts = options("js");
        opts.exclude = vec!["vendor/**".to_string()];
        let entries = collect_files(root, &opts).expect("walk");
        assert_eq!(names(root, &entries), vec!["app.js"]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let temp = tempdir().expect("temp dir");
        assert!(collect_files(&temp.path().join("nope"), &options("html")).is_err());
    }

    #[test]
    fn atomic_write_replaces_content_without_leftovers() {
        let temp = tempdir().expect("temp dir");
        let target = temp.path().join("page.html");
        fs::write(&target, "old").expect("seed");
        write_atomic(&target, "new".as_bytes()).expect("write");
        assert_eq!(fs::read_to_string(&target).expect("read"), "new");
        let leftovers = fs::read_dir(temp.path()).expect("list").count();
        assert_eq!(leftovers, 1);
    }
}
