use std::fmt;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE};

use crate::codepage::{self, CodePage};

/// Alias spellings folded onto the canonical names used everywhere else.
/// Keys are already uppercased with whitespace removed.
const ALIASES: &[(&str, &str)] = &[
    ("UTF-8", "UTF-8"),
    ("UTF8", "UTF-8"),
    ("US-ASCII", "UTF-8"),
    ("ASCII", "UTF-8"),
    ("WINDOWS-1252", "CP1252"),
    ("CP-1252", "CP1252"),
    ("CP1252", "CP1252"),
    ("WINDOWS-1250", "CP1250"),
    ("CP-1250", "CP1250"),
    ("CP1250", "CP1250"),
    ("WINDOWS-1251", "CP1251"),
    ("CP-1251", "CP1251"),
    ("WINDOWS-1253", "CP1253"),
    ("CP-1253", "CP1253"),
    ("WINDOWS-1254", "CP1254"),
    ("CP-1254", "CP1254"),
    ("WINDOWS-1257", "CP1257"),
    ("CP-1257", "CP1257"),
    ("ISO-8859-1", "ISO-8859-1"),
    ("ISO8859-1", "ISO-8859-1"),
    ("ISO_8859-1", "ISO-8859-1"),
    ("LATIN1", "ISO-8859-1"),
    ("L1", "ISO-8859-1"),
    ("ISO-8859-2", "ISO-8859-2"),
    ("ISO8859-2", "ISO-8859-2"),
    ("ISO-8859-3", "ISO-8859-3"),
    ("ISO8859-3", "ISO-8859-3"),
    ("ISO-8859-9", "ISO-8859-9"),
    ("ISO8859-9", "ISO-8859-9"),
    ("ISO-8859-13", "ISO-8859-13"),
    ("ISO8859-13", "ISO-8859-13"),
    ("ISO-8859-15", "ISO-8859-15"),
    ("ISO8859-15", "ISO-8859-15"),
    ("IBM865", "CP865"),
    ("IBM-865", "CP865"),
    ("CP865", "CP865"),
    ("865", "CP865"),
    ("MAC-CENTRALEUROPE", "MAC-CENTRALEUROPE"),
    ("MACCENTRALEUROPE", "MAC-CENTRALEUROPE"),
    ("X-MAC-CE", "MAC-CENTRALEUROPE"),
];

const UTF8: &str = "UTF-8";
const LATIN1: &str = "ISO-8859-1";

/// Canonical, alias-normalized encoding name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodingName(String);

/// How bytes in a given encoding are turned into text.
#[derive(Debug, Clone, Copy)]
pub enum Backend {
    /// Every byte maps to the code point of the same value.
    Latin1,
    /// Single-byte code page that `encoding_rs` does not ship.
    Table(&'static CodePage),
    Standard(&'static Encoding),
}

impl EncodingName {
    /// Normalizes a label; blank input yields `None`. Unknown labels pass through
    /// uppercased, on the assumption that they are already canonical.
    pub fn parse(label: &str) -> Option<Self> {
        let compact: String = label
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        if compact.is_empty() {
            return None;
        }

        let canonical = ALIASES
            .iter()
            .find(|(alias, _)| *alias == compact)
            .map(|(_, canonical)| (*canonical).to_string())
            .unwrap_or(compact);
        Some(Self(canonical))
    }

    pub fn latin1() -> Self {
        Self(LATIN1.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_utf8(&self) -> bool {
        self.0 == UTF8
    }

    pub fn backend(&self) -> Option<Backend> {
        match self.0.as_str() {
            LATIN1 => Some(Backend::Latin1),
            "CP865" => Some(Backend::Table(&codepage::CP865)),
            "MAC-CENTRALEUROPE" => Some(Backend::Table(&codepage::MAC_CENTRAL_EUROPE)),
            other => Encoding::for_label(other.as_bytes()).map(Backend::Standard),
        }
    }
}

impl fmt::Display for EncodingName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// True when a hint is present and names UTF-8 (or plain ASCII).
pub fn names_utf8(label: &str) -> bool {
    EncodingName::parse(label).is_some_and(|name| name.is_utf8())
}

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// A UTF-8 byte-order mark on valid UTF-8 outranks any declared charset.
pub fn has_utf8_bom(bytes: &[u8]) -> bool {
    bytes.starts_with(&UTF8_BOM)
}

/// UTF-16 byte-order marks are authoritative candidates. The UTF-8 mark is
/// handled by [`has_utf8_bom`] before candidates are built.
pub fn detect_bom(bytes: &[u8]) -> Option<EncodingName> {
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return Some(EncodingName(UTF_16LE.name().to_ascii_uppercase()));
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return Some(EncodingName(UTF_16BE.name().to_ascii_uppercase()));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(label: &str) -> String {
        EncodingName::parse(label)
            .map(|name| name.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn aliases_fold_case_and_whitespace() {
        assert_eq!(canonical("windows-1252"), "CP1252");
        assert_eq!(canonical(" Windows - 1252 "), "CP1252");
        assert_eq!(canonical("iso8859-2"), "ISO-8859-2");
        assert_eq!(canonical("us-ascii"), "UTF-8");
        assert_eq!(canonical("MacCentralEurope"), "MAC-CENTRALEUROPE");
    }

    #[test]
    fn unknown_labels_pass_through_uppercased() {
        assert_eq!(canonical("Shift_JIS"), "SHIFT_JIS");
        assert_eq!(canonical("koi8-r"), "KOI8-R");
    }

    #[test]
    fn blank_labels_are_absent() {
        assert!(EncodingName::parse("").is_none());
        assert!(EncodingName::parse("  \t").is_none());
    }

    #[test]
    fn every_fallback_has_a_backend() {
        for label in [
            "CP1252",
            "ISO-8859-1",
            "CP1250",
            "ISO-8859-13",
            "CP865",
            "MAC-CENTRALEUROPE",
        ] {
            let name = EncodingName::parse(label).expect("label");
            assert!(name.backend().is_some(), "{label} has no backend");
        }
    }

    #[test]
    fn unknown_encoding_has_no_backend() {
        let name = EncodingName::parse("x-not-a-charset").expect("label");
        assert!(name.backend().is_none());
    }

    #[test]
    fn utf8_hints() {
        assert!(names_utf8("utf8"));
        assert!(names_utf8("ASCII"));
        assert!(!names_utf8("latin1"));
        assert!(!names_utf8(""));
    }

    #[test]
    fn bom_detection() {
        assert_eq!(
            detect_bom(&[0xFF, 0xFE, 0x61, 0x00]).map(|n| n.to_string()),
            Some("UTF-16LE".to_string())
        );
        assert_eq!(
            detect_bom(&[0xFE, 0xFF, 0x00, 0x61]).map(|n| n.to_string()),
            Some("UTF-16BE".to_string())
        );
        assert!(detect_bom(&[0xEF, 0xBB, 0xBF, b'a']).is_none());
        assert!(has_utf8_bom(&[0xEF, 0xBB, 0xBF, b'a']));
        assert!(!has_utf8_bom(&[0xEF, 0xBB]));
    }
}
