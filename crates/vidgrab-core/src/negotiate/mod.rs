//! Quality negotiation: item page -> player frame -> candidates.
//!
//! Pages are read in simple mode first (plain HTTP with browser-like headers)
//! and through the browser collaborator when that is blocked. Manifest frames
//! yield candidates from the master playlist; other frames are resolved tier
//! by tier by invoking the player callback in the browser.

mod page;
mod player;
mod select;

pub use select::select_candidate;

use crate::browser::SharedBrowser;
use crate::config::{GrabConfig, SiteConfig};
use crate::error_code::{ErrorCode, NegotiationError};
use crate::model::{DownloadItem, Quality, QualityCandidate, QualityTable};
use crate::retry::RetryPolicy;
use crate::scrape::{find_frame, is_forbidden, FrameLookup};
use crate::transport::Transport;

/// Parameters of one negotiation attempt.
#[derive(Debug, Clone, Copy)]
pub struct NegotiationRequest<'a> {
    pub item: &'a DownloadItem,
    pub preferred: Quality,
    /// Resolve the continuation frame as the primary video.
    pub continuation: bool,
    /// Read pages through the logged-in browser session.
    pub premium: bool,
}

/// Produces quality candidates for an item.
pub trait QualityNegotiator: Send + Sync {
    fn negotiate(
        &self,
        req: &NegotiationRequest<'_>,
        running: &dyn Fn() -> bool,
    ) -> Result<Vec<QualityCandidate>, NegotiationError>;

    /// True if premium credentials are configured.
    fn supports_premium(&self) -> bool {
        false
    }

    fn premium_login(&self) -> Result<(), NegotiationError> {
        Err(NegotiationError::new(ErrorCode::NoScriptEngine))
    }
}

/// Negotiator for the configured site.
pub struct PageNegotiator {
    transport: Transport,
    browser: SharedBrowser,
    site: SiteConfig,
    table: QualityTable,
    page_policy: RetryPolicy,
    script_attempts: u32,
}

impl PageNegotiator {
    pub fn new(cfg: &GrabConfig, transport: Transport, browser: SharedBrowser) -> Self {
        Self {
            transport,
            browser,
            site: cfg.site.clone(),
            table: cfg.quality_table.clone(),
            page_policy: cfg.retry.page_policy(),
            script_attempts: cfg.retry.script_attempts.max(1),
        }
    }

    /// Page URL for `item` from the episode or movie template.
    pub fn page_url(&self, item: &DownloadItem) -> String {
        let template = if item.is_movie() {
            &self.site.movie_path
        } else {
            &self.site.episode_path
        };
        let path = template
            .replace("{slug}", &item.slug)
            .replace("{id}", &item.id.to_string());
        format!("{}{}", self.site.base_url.trim_end_matches('/'), path)
    }

    fn resolve_frame(
        &self,
        frame_url: &str,
        preferred: Quality,
        running: &dyn Fn() -> bool,
    ) -> Result<Vec<QualityCandidate>, NegotiationError> {
        let body = self.read_frame(frame_url, running)?;
        if is_forbidden(&body) {
            return Err(NegotiationError::with_detail(ErrorCode::IframeForbidden, frame_url));
        }
        if crate::scrape::is_manifest_frame(&body) {
            return self.manifest_candidates(&body, frame_url, preferred, running);
        }
        match crate::scrape::extract_callback(
            &body,
            &self.site.callback_start,
            &self.site.callback_end,
        ) {
            Some(callback) => self.progressive_candidates(frame_url, &callback, running),
            None => Err(NegotiationError::with_detail(ErrorCode::NoFrame, frame_url)),
        }
    }

    fn continuation_frame(&self, html: &str, page_url: &str) -> Option<String> {
        let id = self.site.second_frame_id.as_ref()?;
        match find_frame(html, std::slice::from_ref(id)) {
            FrameLookup::Found(src) => page::absolute_url(page_url, &src),
            FrameLookup::Empty | FrameLookup::Missing => None,
        }
    }
}

impl QualityNegotiator for PageNegotiator {
    fn negotiate(
        &self,
        req: &NegotiationRequest<'_>,
        running: &dyn Fn() -> bool,
    ) -> Result<Vec<QualityCandidate>, NegotiationError> {
        let page_url = self.page_url(req.item);
        let html = self.read_page(&page_url, req.premium, running)?;

        if req.continuation {
            let frame = self
                .continuation_frame(&html, &page_url)
                .ok_or_else(|| NegotiationError::new(ErrorCode::SecondManifestEmptyFrame))?;
            return self.resolve_frame(&frame, req.preferred, running);
        }

        let frame = match find_frame(&html, &self.site.frame_ids) {
            FrameLookup::Found(src) => page::absolute_url(&page_url, &src)
                .ok_or_else(|| NegotiationError::with_detail(ErrorCode::EmptyFrame, src))?,
            FrameLookup::Empty => {
                return Err(NegotiationError::with_detail(
                    ErrorCode::EmptyFrame,
                    "player frame has no source",
                ))
            }
            FrameLookup::Missing => return Err(NegotiationError::new(ErrorCode::EmptyFrame)),
        };
        let mut candidates = self.resolve_frame(&frame, req.preferred, running)?;

        if let Some(second) = self.continuation_frame(&html, &page_url) {
            match self.resolve_frame(&second, req.preferred, running) {
                Ok(extra) => {
                    candidates.extend(extra.into_iter().map(QualityCandidate::into_secondary))
                }
                Err(e) => tracing::debug!(slug = %req.item.slug, "continuation frame unresolved: {}", e),
            }
        }
        Ok(candidates)
    }

    fn supports_premium(&self) -> bool {
        self.site.premium.is_some()
    }

    fn premium_login(&self) -> Result<(), NegotiationError> {
        match &self.site.premium {
            Some(premium) => self.login(premium),
            None => Err(NegotiationError::with_detail(
                ErrorCode::SimpleModeFailed,
                "no premium credentials configured",
            )),
        }
    }
}
