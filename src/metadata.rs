//! Charset declarations in markup.
//!
//! This is a best-effort single-pass regex transform over the raw text, not a
//! markup parse. It recognises `<meta charset=...>` (self-closing or not) and the
//! `http-equiv="Content-Type" content="text/html; charset=..."` form; both carry a
//! `charset=` token inside one `<meta>` tag, which is what the pattern keys on.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const CANONICAL_META: &str = r#"<meta charset="utf-8">"#;

/// Shared by the byte-level scan in the resolver and the text rewrite below.
/// Group 1 is the declared encoding label.
pub(crate) const CHARSET_META_PATTERN: &str =
    r#"<meta\b[^>]*?charset\s*=\s*["']?\s*([-A-Za-z0-9_:.]+)[^>]*>"#;

static CHARSET_META: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("(?is){CHARSET_META_PATTERN}")).expect("charset meta pattern compiles")
});

static HEAD_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<head(?:\s[^>]*)?>").expect("head pattern compiles"));

/// Rewrites markup so it carries exactly one `<meta charset="utf-8">`.
///
/// The first charset declaration (of either form) is replaced in place by the
/// canonical tag and any later ones are dropped. When the document declares
/// nothing, the tag is inserted on its own line right after the first `<head>`
/// opening tag. Documents without a head and without a declaration come back
/// untouched. Applying this twice yields the same text as applying it once.
pub fn normalize_metadata(text: &str) -> Cow<'_, str> {
    let mut replaced_any = false;
    let replaced = CHARSET_META.replace_all(text, |_: &Captures<'_>| {
        if replaced_any {
            ""
        } else {
            replaced_any = true;
            CANONICAL_META
        }
    });
    if replaced_any {
        return replaced;
    }

    let Some(head) = HEAD_OPEN.find(text) else {
        return Cow::Borrowed(text);
    };
    let mut out = String::with_capacity(text.len() + CANONICAL_META.len() + 1);
    out.push_str(&text[..head.end()]);
    out.push('\n');
    out.push_str(CANONICAL_META);
    out.push_str(&text[head.end()..]);
    Cow::Owned(out)
}

/// Declared labels of every charset meta tag, in document order.
#[cfg(test)]
pub fn declared_labels(text: &str) -> Vec<&str> {
    CHARSET_META
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_charset_attribute_whatever_its_value() {
        let html = "<html><head><meta charset='windows-1252' /><title>t</title></head></html>";
        let out = normalize_metadata(html);
        assert_eq!(
            out,
            "<html><head><meta charset=\"utf-8\"><title>t</title></head></html>"
        );
    }

    #[test]
    fn replaces_http_equiv_content_type() {
        let html = "<HEAD>\n<META HTTP-EQUIV=\"Content-Type\" CONTENT=\"text/html; charset=iso-8859-2\">\n</HEAD>";
        let out = normalize_metadata(html);
        assert_eq!(out, "<HEAD>\n<meta charset=\"utf-8\">\n</HEAD>");
    }

    #[test]
    fn inserts_after_head_when_undeclared() {
        let html = "<html>\n<head lang=\"en\">\n<title>x</title>\n</head>\n</html>";
        let out = normalize_metadata(html);
        assert_eq!(
            out,
            "<html>\n<head lang=\"en\">\n<meta charset=\"utf-8\">\n<title>x</title>\n</head>\n</html>"
        );
    }

    #[test]
    fn header_element_is_not_a_head() {
        let html = "<body><header>top</header></body>";
        assert!(matches!(normalize_metadata(html), Cow::Borrowed(_)));
    }

    #[test]
    fn duplicate_declarations_collapse_to_one() {
        let html = "<head><meta charset=\"latin1\"><meta http-equiv='content-type' content='text/html; charset=latin1'></head>";
        let out = normalize_metadata(html);
        assert_eq!(out.matches(CANONICAL_META).count(), 1);
        assert_eq!(declared_labels(&out), vec!["utf-8"]);
    }

    #[test]
    fn normalizing_is_idempotent() {
        let html = "<html><head><title>x</title></head><body>é</body></html>";
        let once = normalize_metadata(html).into_owned();
        let twice = normalize_metadata(&once);
        assert_eq!(once, twice);
    }
}
