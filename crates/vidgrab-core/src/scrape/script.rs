//! Token scans over inline player script.

use crate::model::Quality;
use regex::Regex;
use std::sync::LazyLock;

use super::unescape_js;

static SOURCE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<source\b[^>]*\bsrc\s*=\s*["'](https?://[^"']+)["']"#).unwrap()
});
static JSON_SRC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""src"\s*:\s*"(http[^"]+)""#).unwrap());
static REDIRECTED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"getRedirectedUrl\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});
static JS_IDENT_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(?:\.[A-Za-z_$][A-Za-z0-9_$]*)*$").unwrap());
static NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b404\b.{0,20}\bnot\s+found\b|\berror\s*404\b|\bstatus\s*[:=]\s*404\b").unwrap()
});

/// True if the frame serves a segmented (manifest-based) stream.
pub fn is_manifest_frame(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains(".m3u8")
        || lower.contains("application/x-mpegurl")
        || lower.contains("getredirectedurl(")
}

/// Manifest URL from the frame, trying a direct `<source>` tag, then inline
/// JSON `"src":"http..."`, then a `getRedirectedUrl("...")` call.
pub fn extract_manifest_url(body: &str) -> Option<String> {
    [&*SOURCE_TAG, &*JSON_SRC, &*REDIRECTED_URL]
        .into_iter()
        .find_map(|re| re.captures(body).map(|c| unescape_js(&c[1])))
        .filter(|u| !u.is_empty())
}

/// Text strictly between the first `start` marker and the following `end` marker.
pub fn extract_between<'a>(body: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = body.find(start)? + start.len();
    let len = body[from..].find(end)?;
    Some(&body[from..from + len])
}

/// Name of the player callback function delimited by the two markers.
pub fn extract_callback(body: &str, start: &str, end: &str) -> Option<String> {
    let raw = extract_between(body, start, end)?.trim();
    JS_IDENT_PATH.is_match(raw).then(|| raw.to_string())
}

/// Script that asks the player to load `quality` via its callback.
pub fn callback_script(callback: &str, quality: Quality) -> String {
    format!("{}('{}');", callback, quality.as_str())
}

/// True if the surrounding script reports a transient link error or a 404.
pub fn has_link_error(body: &str) -> bool {
    body.to_ascii_lowercase().contains("link error") || NOT_FOUND.is_match(body)
}
