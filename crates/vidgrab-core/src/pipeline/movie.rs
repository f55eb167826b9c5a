//! Movie flow: optional premium login before negotiation.

use super::Pipeline;
use crate::session::Session;

impl Pipeline {
    /// Log in once per movie session when premium credentials exist.
    ///
    /// Returns true when the login failed and should be tried again on the
    /// next iteration. Once the premium ceiling is spent the movie continues
    /// through the regular flow.
    pub(super) fn premium_step(&self, session: &mut Session) -> bool {
        if !session.target().is_movie()
            || session.premium_active()
            || session.premium_login_exhausted()
            || !self.negotiator.supports_premium()
        {
            return false;
        }
        match self.negotiator.premium_login() {
            Ok(()) => {
                tracing::info!("premium login succeeded");
                session.premium_logged_in();
                false
            }
            Err(e) => {
                if session.premium_login_failed() {
                    tracing::warn!("premium login failed ({}), continuing without premium", e);
                    false
                } else {
                    tracing::debug!(attempts = session.counters().premium_login, "premium login failed: {}", e);
                    true
                }
            }
        }
    }
}
