//! Video acquisition pipeline: quality negotiation against an anti-automation
//! site, resumable progressive downloads and segmented (HLS) download-and-merge,
//! coordinated per item by a retry-aware session.

pub mod browser;
pub mod config;
pub mod control;
pub mod error_code;
pub mod hls;
pub mod host;
pub mod logging;
pub mod model;
pub mod naming;
pub mod negotiate;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod scrape;
pub mod session;
pub mod store;
pub mod transport;
