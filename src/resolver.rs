use std::sync::LazyLock;

use regex::bytes::Regex;

use crate::encoding::{EncodingName, detect_bom};
use crate::metadata::CHARSET_META_PATTERN;

/// Common legacy single-byte encodings tried after every hint, in this order.
pub const FALLBACK_ENCODINGS: [&str; 6] = [
    "CP1252",
    "ISO-8859-1",
    "CP1250",
    "ISO-8859-13",
    "CP865",
    "MAC-CENTRALEUROPE",
];

// Unicode mode off: the bytes are not decoded yet and `[^>]` has to step over
// arbitrary legacy bytes.
static DECLARED_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("(?is-u){CHARSET_META_PATTERN}")).expect("charset meta pattern compiles")
});

/// Raw hints about a file's encoding, kept verbatim for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hints {
    pub declared: Option<String>,
    pub detected: Option<String>,
}

/// Ordered, duplicate-free encodings to try; the first one that validates wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateList(Vec<EncodingName>);

impl CandidateList {
    fn push_label(&mut self, label: Option<&str>) {
        if let Some(name) = label.and_then(EncodingName::parse) {
            self.push(name);
        }
    }

    fn push(&mut self, name: EncodingName) {
        if !self.0.contains(&name) {
            self.0.push(name);
        }
    }

    /// Drops UTF-8; returns whether it was present.
    pub fn remove_utf8(&mut self) -> bool {
        let before = self.0.len();
        self.0.retain(|name| !name.is_utf8());
        self.0.len() != before
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncodingName> {
        self.0.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(EncodingName::as_str).collect()
    }
}

/// Builds the candidate list: byte-order mark, declared hint, detected hint,
/// then [`FALLBACK_ENCODINGS`]. Blank hints are skipped and repeats keep their
/// first position.
pub fn resolve(bytes: &[u8], declared: Option<&str>, detected: Option<&str>) -> CandidateList {
    let mut candidates = CandidateList::default();
    if let Some(bom) = detect_bom(bytes) {
        candidates.push(bom);
    }
    candidates.push_label(declared);
    candidates.push_label(detected);
    for fallback in FALLBACK_ENCODINGS {
        candidates.push_label(Some(fallback));
    }
    candidates
}

/// First charset declared by a `<meta>` tag in the raw bytes, if any.
pub fn declared_charset(bytes: &[u8]) -> Option<String> {
    DECLARED_CHARSET
        .captures(bytes)
        .and_then(|caps| caps.get(1))
        .map(|label| String::from_utf8_lossy(label.as_bytes()).into_owned())
}
