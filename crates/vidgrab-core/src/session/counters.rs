//! Retry counters and their ceilings.

use crate::config::RetryConfig;

/// Snapshot of one session's retry counters. Only the session mutates them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryCounters {
    pub general: u32,
    pub quality_detection: u32,
    pub premium_login: u32,
    pub segmented: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ceilings {
    pub general: u32,
    pub quality_detection: u32,
    pub premium_login: u32,
    pub segmented: u32,
    pub file_size: u32,
}

impl From<&RetryConfig> for Ceilings {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            general: cfg.max_retries.max(1),
            quality_detection: cfg.quality_detection_retries.max(1),
            premium_login: cfg.premium_login_retries,
            segmented: cfg.segmented_retries.max(1),
            file_size: cfg.file_size_retries.max(1),
        }
    }
}

impl Default for Ceilings {
    fn default() -> Self {
        Ceilings::from(&RetryConfig::default())
    }
}

impl RetryCounters {
    pub(super) fn quality_detection_exhausted(&self, c: &Ceilings) -> bool {
        self.quality_detection >= c.quality_detection
    }

    pub(super) fn general_exhausted(&self, c: &Ceilings) -> bool {
        self.general >= c.general
    }

    pub(super) fn segmented_exhausted(&self, c: &Ceilings) -> bool {
        self.segmented >= c.segmented
    }

    pub(super) fn premium_exhausted(&self, c: &Ceilings) -> bool {
        self.premium_login >= c.premium_login
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceilings_from_config_clamp_zero() {
        let cfg = RetryConfig {
            max_retries: 0,
            segmented_retries: 0,
            premium_login_retries: 0,
            ..RetryConfig::default()
        };
        let c = Ceilings::from(&cfg);
        assert_eq!(c.general, 1);
        assert_eq!(c.segmented, 1);
        // Zero premium attempts means "never log in".
        assert_eq!(c.premium_login, 0);
        assert!(RetryCounters::default().premium_exhausted(&c));
    }
}
