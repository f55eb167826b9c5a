//! Best-effort parsing of adversarial page markup, inline script and manifests.
//!
//! Everything that pattern-matches site-specific literals lives here so the
//! rest of the pipeline only sees typed results. Expect this layer to churn
//! whenever the origin changes its markup.

mod frame;
mod manifest;
mod script;

pub use frame::{find_frame, is_blocked, is_forbidden, FrameLookup};
pub use manifest::{parse_manifest, ManifestVariant};
pub use script::{
    callback_script, extract_between, extract_callback, extract_manifest_url, has_link_error,
    is_manifest_frame,
};

/// Undo the JSON/JS escaping commonly found around inline URLs.
pub(crate) fn unescape_js(s: &str) -> String {
    s.replace("\\/", "/")
        .replace("\\u0026", "&")
        .replace("\\u002F", "/")
        .replace("&amp;", "&")
}
