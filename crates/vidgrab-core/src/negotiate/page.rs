//! Page, frame and manifest reads with the simple-then-browser fallback.

use super::PageNegotiator;
use crate::browser::{Browser, BrowserError, BrowserResult};
use crate::error_code::{ErrorCode, NegotiationError};
use crate::model::{Quality, QualityCandidate};
use crate::scrape::{extract_manifest_url, is_blocked, parse_manifest};

/// Result of a simple-mode read.
#[derive(Debug)]
pub(super) enum SimpleRead {
    Body(String),
    /// Explicit 403 that is not an anti-bot page.
    Forbidden,
    /// Every attempt failed or hit a block page; `last` describes the final one.
    Failed { last: String },
}

/// Resolve `href` (absolute, protocol-relative or relative) against `base`.
pub(super) fn absolute_url(base: &str, href: &str) -> Option<String> {
    let base = url::Url::parse(base).ok()?;
    let joined = base.join(href.trim()).ok()?;
    matches!(joined.scheme(), "http" | "https").then(|| joined.to_string())
}

impl PageNegotiator {
    pub(super) fn with_browser<T>(
        &self,
        f: impl FnOnce(&mut dyn Browser) -> BrowserResult<T>,
    ) -> BrowserResult<T> {
        let mut guard = self
            .browser
            .lock()
            .map_err(|_| BrowserError::Unavailable)?;
        if !guard.is_available() {
            return Err(BrowserError::Unavailable);
        }
        f(&mut *guard)
    }

    pub(super) fn browser_available(&self) -> bool {
        self.browser.lock().map(|b| b.is_available()).unwrap_or(false)
    }

    /// Up to `page_policy.max_attempts` plain GETs with backoff.
    pub(super) fn read_simple(&self, url: &str, running: &dyn Fn() -> bool) -> SimpleRead {
        let mut last = String::from("not attempted");
        for attempt in 1..=self.page_policy.max_attempts {
            if attempt > 1 {
                if !running() {
                    break;
                }
                std::thread::sleep(self.page_policy.backoff(attempt - 1));
            }
            match self.transport.fetch(url) {
                Ok(page) => {
                    let body = page.text();
                    if is_blocked(&body, &self.site.block_signatures) {
                        last = format!("block page (HTTP {})", page.status);
                        tracing::debug!(url, attempt, "simple mode hit a block page");
                        continue;
                    }
                    if page.status == 403 {
                        return SimpleRead::Forbidden;
                    }
                    if page.is_success() {
                        return SimpleRead::Body(body);
                    }
                    last = format!("HTTP {}", page.status);
                }
                Err(e) => last = e.to_string(),
            }
            tracing::debug!(url, attempt, "simple mode read failed: {}", last);
        }
        SimpleRead::Failed { last }
    }

    pub(super) fn read_rendered(&self, url: &str) -> BrowserResult<String> {
        self.with_browser(|b| {
            b.navigate(url)?;
            b.rendered_source()
        })
    }

    /// Item page HTML. Logged-in sessions read through the browser directly.
    pub(super) fn read_page(
        &self,
        url: &str,
        premium: bool,
        running: &dyn Fn() -> bool,
    ) -> Result<String, NegotiationError> {
        if premium {
            return self
                .read_rendered(url)
                .map_err(|e| NegotiationError::with_detail(ErrorCode::PageReadFailed, e.to_string()));
        }
        let detail = match self.read_simple(url, running) {
            SimpleRead::Body(body) => return Ok(body),
            SimpleRead::Forbidden => "HTTP 403".to_string(),
            SimpleRead::Failed { last } => last,
        };
        if self.browser_available() {
            if let Ok(body) = self.read_rendered(url) {
                if !is_blocked(&body, &self.site.block_signatures) {
                    return Ok(body);
                }
            }
        }
        Err(NegotiationError::with_detail(ErrorCode::PageReadFailed, detail))
    }

    /// Frame content; falls back to the browser when simple mode is blocked or fails.
    pub(super) fn read_frame(
        &self,
        url: &str,
        running: &dyn Fn() -> bool,
    ) -> Result<String, NegotiationError> {
        let last = match self.read_simple(url, running) {
            SimpleRead::Body(body) => return Ok(body),
            SimpleRead::Forbidden => {
                return Err(NegotiationError::with_detail(ErrorCode::IframeForbidden, url))
            }
            SimpleRead::Failed { last } => last,
        };
        match self.read_rendered(url) {
            Ok(body) if is_blocked(&body, &self.site.block_signatures) => Err(
                NegotiationError::with_detail(ErrorCode::AntiBotBlock, url),
            ),
            Ok(body) => Ok(body),
            Err(e) => Err(NegotiationError::with_detail(
                ErrorCode::SimpleModeFailed,
                format!("{}; browser: {}", last, e),
            )),
        }
    }

    pub(super) fn manifest_candidates(
        &self,
        frame_body: &str,
        frame_url: &str,
        preferred: Quality,
        running: &dyn Fn() -> bool,
    ) -> Result<Vec<QualityCandidate>, NegotiationError> {
        let link_failed = |detail: String| NegotiationError::with_detail(ErrorCode::ManifestLinkFailed, detail);

        let href = extract_manifest_url(frame_body)
            .ok_or_else(|| link_failed("no manifest link in frame".to_string()))?;
        let manifest_url = absolute_url(frame_url, &href)
            .ok_or_else(|| link_failed(format!("bad manifest link {}", href)))?;

        let body = match self.read_simple(&manifest_url, running) {
            SimpleRead::Body(body) => body,
            SimpleRead::Forbidden => return Err(link_failed(format!("{}: HTTP 403", manifest_url))),
            SimpleRead::Failed { last } => return Err(link_failed(format!("{}: {}", manifest_url, last))),
        };
        let variants = parse_manifest(body.as_bytes(), &manifest_url, &self.table, preferred)
            .map_err(|e| link_failed(format!("{}: {}", manifest_url, e)))?;
        if variants.is_empty() {
            return Err(link_failed(format!("{}: no matching resolutions", manifest_url)));
        }
        Ok(variants
            .into_iter()
            .map(|v| QualityCandidate::manifest(v.quality, v.url, v.audio_url))
            .collect())
    }
}
