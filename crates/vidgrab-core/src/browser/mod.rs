//! Browser-automation collaborator.
//!
//! Used only when the lightweight HTTP path is blocked or when a quality has
//! to be resolved by running page script. Driver lifecycle is external: a
//! WebDriver server is expected to be running already.

mod webdriver;

pub use webdriver::WebDriverBrowser;

use std::sync::{Arc, Mutex};
use thiserror::Error;

pub type BrowserResult<T> = Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("no browser engine configured")]
    Unavailable,
    #[error("webdriver transport error: {0}")]
    Transport(#[from] curl::Error),
    #[error("webdriver returned HTTP {status}: {message}")]
    Protocol { status: u32, message: String },
    #[error("invalid webdriver response: {0}")]
    Json(#[from] serde_json::Error),
}

/// Minimal browser surface the negotiator needs.
pub trait Browser: Send {
    fn navigate(&mut self, url: &str) -> BrowserResult<()>;
    /// Run `script` in the current page; returns its JSON result.
    fn execute_script(&mut self, script: &str) -> BrowserResult<serde_json::Value>;
    fn rendered_source(&mut self) -> BrowserResult<String>;
    fn current_url(&mut self) -> BrowserResult<String>;

    fn is_available(&self) -> bool {
        true
    }
}

/// One browser shared by every worker; calls are serialized by the mutex.
pub type SharedBrowser = Arc<Mutex<dyn Browser>>;

pub fn shared(browser: impl Browser + 'static) -> SharedBrowser {
    Arc::new(Mutex::new(browser))
}

/// Stand-in when no WebDriver endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBrowser;

impl Browser for NoBrowser {
    fn navigate(&mut self, _url: &str) -> BrowserResult<()> {
        Err(BrowserError::Unavailable)
    }

    fn execute_script(&mut self, _script: &str) -> BrowserResult<serde_json::Value> {
        Err(BrowserError::Unavailable)
    }

    fn rendered_source(&mut self) -> BrowserResult<String> {
        Err(BrowserError::Unavailable)
    }

    fn current_url(&mut self) -> BrowserResult<String> {
        Err(BrowserError::Unavailable)
    }

    fn is_available(&self) -> bool {
        false
    }
}
