//! Browser-driven steps: per-tier player callbacks and premium login.

use serde_json::Value;

use super::PageNegotiator;
use crate::browser::{Browser, BrowserResult};
use crate::config::PremiumConfig;
use crate::error_code::{ErrorCode, NegotiationError};
use crate::model::QualityCandidate;
use crate::scrape::{callback_script, extract_manifest_url, has_link_error};

/// Outcome of one callback invocation.
enum TierAttempt {
    Url(String),
    /// Link error or 404 reported by the page; worth another try.
    LinkError,
    Nothing,
}

fn direct_url(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| s.starts_with("http://") || s.starts_with("https://"))
        .map(str::to_string)
}

fn try_tier(b: &mut dyn Browser, frame_url: &str, script: &str) -> BrowserResult<TierAttempt> {
    b.navigate(frame_url)?;
    let returned = b.execute_script(script)?;
    let source = b.rendered_source()?;
    if has_link_error(&source) {
        return Ok(TierAttempt::LinkError);
    }
    if let Some(url) = direct_url(&returned) {
        return Ok(TierAttempt::Url(url));
    }
    let current = b.current_url()?;
    if current != frame_url && (current.starts_with("http://") || current.starts_with("https://")) {
        return Ok(TierAttempt::Url(current));
    }
    Ok(extract_manifest_url(&source)
        .map(TierAttempt::Url)
        .unwrap_or(TierAttempt::Nothing))
}

impl PageNegotiator {
    /// One progressive candidate per tier the player callback resolves.
    pub(super) fn progressive_candidates(
        &self,
        frame_url: &str,
        callback: &str,
        running: &dyn Fn() -> bool,
    ) -> Result<Vec<QualityCandidate>, NegotiationError> {
        if !self.browser_available() {
            return Err(NegotiationError::new(ErrorCode::NoScriptEngine));
        }

        let mut out = Vec::new();
        for row in self.table.0.iter().rev() {
            let script = callback_script(callback, row.quality);
            for attempt in 1..=self.script_attempts {
                if !running() {
                    break;
                }
                match self.with_browser(|b| try_tier(b, frame_url, &script)) {
                    Ok(TierAttempt::Url(url)) => {
                        tracing::debug!(quality = %row.quality, "player resolved {}", url);
                        out.push(QualityCandidate::progressive(row.quality, url));
                        break;
                    }
                    Ok(TierAttempt::LinkError) => {
                        tracing::debug!(quality = %row.quality, attempt, "player reported a link error");
                    }
                    Ok(TierAttempt::Nothing) => break,
                    Err(e) => {
                        tracing::debug!(quality = %row.quality, attempt, "player script failed: {}", e);
                    }
                }
            }
        }

        if out.is_empty() {
            return Err(NegotiationError::with_detail(
                ErrorCode::FailedExtractResolutions,
                frame_url,
            ));
        }
        Ok(out)
    }

    /// Log in through the browser and confirm the marker on the landing page.
    pub(super) fn login(&self, premium: &PremiumConfig) -> Result<(), NegotiationError> {
        if !self.browser_available() {
            return Err(NegotiationError::new(ErrorCode::NoScriptEngine));
        }
        let script = login_script(premium);
        let home = format!("{}/", self.site.base_url.trim_end_matches('/'));
        let source = self
            .with_browser(|b| {
                b.navigate(&premium.login_url)?;
                b.execute_script(&script)?;
                b.navigate(&home)?;
                b.rendered_source()
            })
            .map_err(|e| NegotiationError::with_detail(ErrorCode::SimpleModeFailed, e.to_string()))?;
        if source.contains(&premium.logged_in_marker) {
            Ok(())
        } else {
            Err(NegotiationError::with_detail(
                ErrorCode::SimpleModeFailed,
                "premium login marker not found",
            ))
        }
    }
}

/// Fill the first username/password inputs and submit their form.
fn login_script(premium: &PremiumConfig) -> String {
    let user = Value::String(premium.username.clone());
    let pass = Value::String(premium.password.clone());
    format!(
        "const u = document.querySelector('input[type=email], input[name*=user], input[name*=login], input[type=text]');\
         const p = document.querySelector('input[type=password]');\
         if (!u || !p) {{ return false; }}\
         u.value = {}; p.value = {};\
         (p.form || document.forms[0]).submit();\
         return true;",
        user, pass
    )
}
