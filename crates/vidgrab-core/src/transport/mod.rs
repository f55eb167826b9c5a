//! HTTP transport over libcurl.
//!
//! Builds requests that look like a real browser navigation (fixed header set,
//! optional gzip, optional referer), probes remote sizes, fetches pages into
//! memory and streams media to disk with byte-range resume. Every call blocks
//! the current thread.

mod fetch;
mod headers;
mod probe;
mod stream;

pub use fetch::FetchedPage;
pub use stream::StreamOutcome;

use crate::retry::TransferError;
use std::time::Duration;

/// Copy chunk size for streamed downloads.
pub const CHUNK_SIZE: usize = 8 * 1024;

const BROWSER_HEADERS: &[&str] = &[
    "Accept: text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    "Accept-Language: en-US,en;q=0.9",
    "Sec-Fetch-Dest: document",
    "Sec-Fetch-Mode: navigate",
    "Sec-Fetch-Site: none",
    "Sec-Fetch-User: ?1",
    "Upgrade-Insecure-Requests: 1",
];

/// Connection settings shared by every request.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub user_agent: String,
    /// Used for both connect and read (stall) timeout.
    pub timeout: Duration,
    /// Referer to send; when unset the request URL's origin is used.
    pub referer: Option<String>,
    /// Minimum spacing between progress callbacks.
    pub progress_interval: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            user_agent: crate::config::DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
            referer: None,
            progress_interval: Duration::from_secs(1),
        }
    }
}

/// Blocking HTTP transport. Cheap to clone; each call opens its own handle.
#[derive(Debug, Clone, Default)]
pub struct Transport {
    opts: TransportOptions,
}

impl Transport {
    pub fn new(opts: TransportOptions) -> Self {
        Self { opts }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.opts
    }

    /// Configure a curl handle for `url`. No I/O happens until the handle is performed.
    pub fn build_request(
        &self,
        url: &str,
        user_agent: &str,
        accept_encoding: bool,
        add_referer: bool,
    ) -> Result<curl::easy::Easy, TransferError> {
        self.build_request_with(url, user_agent, accept_encoding, add_referer, &[])
    }

    pub(crate) fn build_request_with(
        &self,
        url: &str,
        user_agent: &str,
        accept_encoding: bool,
        add_referer: bool,
        extra_headers: &[&str],
    ) -> Result<curl::easy::Easy, TransferError> {
        let mut easy = curl::easy::Easy::new();
        easy.url(url)?;
        easy.useragent(user_agent)?;
        easy.follow_location(true)?;
        easy.max_redirections(10)?;
        easy.connect_timeout(self.opts.timeout)?;
        // No hard deadline; a transfer stalled for `timeout` is aborted instead.
        easy.low_speed_limit(1)?;
        easy.low_speed_time(self.opts.timeout)?;
        if accept_encoding {
            easy.accept_encoding("gzip")?;
        }

        let mut list = curl::easy::List::new();
        for h in BROWSER_HEADERS.iter().chain(extra_headers) {
            list.append(h)?;
        }
        if add_referer {
            if let Some(referer) = self.referer_for(url) {
                list.append(&format!("Referer: {}", referer))?;
            }
        }
        easy.http_headers(list)?;
        Ok(easy)
    }

    fn referer_for(&self, url: &str) -> Option<String> {
        if let Some(r) = &self.opts.referer {
            return Some(r.clone());
        }
        let parsed = url::Url::parse(url).ok()?;
        match parsed.origin() {
            url::Origin::Tuple(..) => Some(format!("{}/", parsed.origin().ascii_serialization())),
            url::Origin::Opaque(_) => None,
        }
    }
}
