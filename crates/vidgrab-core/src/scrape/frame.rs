//! Embedded player frame lookup and block-page detection.

use regex::Regex;
use std::sync::LazyLock;

static IFRAME_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?is)<iframe\b[^>]*>").unwrap());
static SRC_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s(data-src|src)\s*=\s*["']([^"']*)["']"#).unwrap()
});
static NAME_ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s(?:id|class|name)\s*=\s*["']([^"']*)["']"#).unwrap()
});
static FORBIDDEN_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)\b403\b.{0,40}\bforbidden\b|\bforbidden\b.{0,40}\b403\b|\baccess\s+forbidden\b")
        .unwrap()
});

/// Result of looking for a player frame in page markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameLookup {
    /// A marked frame with a usable source.
    Found(String),
    /// A marked frame exists but has no source.
    Empty,
    /// None of the identifiers is present.
    Missing,
}

/// Find the player frame for the first identifier (in the given order) that
/// marks an `<iframe>`. Identifier order decides precedence, not document order.
pub fn find_frame(html: &str, identifiers: &[String]) -> FrameLookup {
    let tags: Vec<&str> = IFRAME_TAG.find_iter(html).map(|m| m.as_str()).collect();
    for ident in identifiers {
        let Some(tag) = tags.iter().find(|tag| tag_has_identifier(tag, ident)) else {
            continue;
        };
        return match frame_source(tag) {
            Some(src) => FrameLookup::Found(src),
            None => FrameLookup::Empty,
        };
    }
    FrameLookup::Missing
}

fn tag_has_identifier(tag: &str, ident: &str) -> bool {
    NAME_ATTR
        .captures_iter(tag)
        .any(|c| c[1].split_whitespace().any(|token| token == ident))
}

fn frame_source(tag: &str) -> Option<String> {
    let mut src = None;
    let mut data_src = None;
    for c in SRC_ATTR.captures_iter(tag) {
        let value = c[2].trim();
        if value.is_empty() || value == "about:blank" {
            continue;
        }
        if c[1].eq_ignore_ascii_case("src") {
            src.get_or_insert_with(|| value.to_string());
        } else {
            data_src.get_or_insert_with(|| value.to_string());
        }
    }
    src.or(data_src)
}

/// True if the body carries one of the known block-page signatures.
pub fn is_blocked(body: &str, signatures: &[String]) -> bool {
    let lower = body.to_ascii_lowercase();
    signatures
        .iter()
        .any(|sig| !sig.is_empty() && lower.contains(&sig.to_ascii_lowercase()))
}

/// True if the body reports a forbidden response in text (served with HTTP 200).
pub fn is_forbidden(body: &str) -> bool {
    FORBIDDEN_TEXT.is_match(body)
}
