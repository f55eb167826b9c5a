use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::{Quality, QualityTable};
use crate::retry::RetryPolicy;
use crate::transport::TransportOptions;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Retry ceilings and backoff (the `[retry]` section of config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// General retries per item before it is abandoned.
    pub max_retries: u32,
    /// Quality-detection (negotiation) retries per item.
    pub quality_detection_retries: u32,
    /// Premium login attempts before falling back to the regular flow.
    pub premium_login_retries: u32,
    /// Failed segmented downloads of one candidate before it is dropped.
    pub segmented_retries: u32,
    /// Size probes (alternating HEAD/GET) before a candidate is dropped.
    pub file_size_retries: u32,
    /// Lightweight page fetch attempts before falling back or giving up.
    pub page_fetch_attempts: u32,
    /// Player-script invocations per quality tier.
    pub script_attempts: u32,
    /// Attempts per HLS segment.
    pub segment_attempts: u32,
    /// Base backoff delay in seconds (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            quality_detection_retries: 3,
            premium_login_retries: 2,
            segmented_retries: 3,
            file_size_retries: 6,
            page_fetch_attempts: 4,
            script_attempts: 3,
            segment_attempts: 5,
            base_delay_secs: 0.5,
            max_delay_secs: 10,
        }
    }
}

impl RetryConfig {
    fn policy(&self, max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs_f64(self.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }

    /// Backoff for lightweight page fetches.
    pub fn page_policy(&self) -> RetryPolicy {
        self.policy(self.page_fetch_attempts)
    }

    /// Backoff for individual HLS segments.
    pub fn segment_policy(&self) -> RetryPolicy {
        self.policy(self.segment_attempts)
    }
}

/// Credentials for the optional premium login used by the movie flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremiumConfig {
    pub login_url: String,
    pub username: String,
    pub password: String,
    /// Text present in the rendered page once logged in.
    pub logged_in_marker: String,
}

/// Site layout: where item pages live and which literals the scraper looks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub base_url: String,
    /// Episode page path; `{slug}` and `{id}` are substituted.
    pub episode_path: String,
    /// Movie page path; `{slug}` and `{id}` are substituted.
    pub movie_path: String,
    /// Player frame identifiers (id/class/name tokens), highest precedence first.
    pub frame_ids: Vec<String>,
    /// Identifier of the continuation-video frame.
    pub second_frame_id: Option<String>,
    /// Literals that mark an anti-bot block page.
    pub block_signatures: Vec<String>,
    /// Markers around the player callback name in the frame script.
    pub callback_start: String,
    pub callback_end: String,
    pub premium: Option<PremiumConfig>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://example.org".to_string(),
            episode_path: "/episode/{slug}".to_string(),
            movie_path: "/movie/{slug}".to_string(),
            frame_ids: vec![
                "player-frame".to_string(),
                "video-frame".to_string(),
                "embed-frame".to_string(),
            ],
            second_frame_id: Some("player-frame-2".to_string()),
            block_signatures: vec![
                "Just a moment...".to_string(),
                "cf-browser-verification".to_string(),
                "challenge-platform".to_string(),
                "Access denied".to_string(),
            ],
            callback_start: "sourceCallback=\"".to_string(),
            callback_end: "\"".to_string(),
            premium: None,
        }
    }
}

/// Global configuration loaded from `~/.config/vidgrab/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabConfig {
    /// Worker pool size (one orchestrator per worker).
    pub download_threads: usize,
    /// Root download directory (None = current directory).
    pub download_dir: Option<PathBuf>,
    /// Connect and read timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
    pub preferred_quality: Quality,
    /// Downloads at or below this many bytes are treated as "size unknown".
    pub min_plausible_size: u64,
    /// Progress sampling period in milliseconds.
    pub progress_interval_millis: u64,
    /// Parallel segment fetches per HLS track.
    pub segment_connections: usize,
    /// Merge tool; `ffmpeg` on PATH when unset.
    pub ffmpeg_path: Option<PathBuf>,
    /// WebDriver endpoint for the browser fallback (disabled when unset).
    pub webdriver_url: Option<String>,
    pub retry: RetryConfig,
    pub quality_table: QualityTable,
    pub site: SiteConfig,
}

impl Default for GrabConfig {
    fn default() -> Self {
        Self {
            download_threads: 1,
            download_dir: None,
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            preferred_quality: Quality::P1080,
            min_plausible_size: 5 * 1024,
            progress_interval_millis: 1000,
            segment_connections: 4,
            ffmpeg_path: None,
            webdriver_url: None,
            retry: RetryConfig::default(),
            quality_table: QualityTable::default(),
            site: SiteConfig::default(),
        }
    }
}

impl GrabConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_millis.max(1))
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.timeout_secs.max(1)),
            referer: Some(format!("{}/", self.site.base_url.trim_end_matches('/'))),
            progress_interval: self.progress_interval(),
        }
    }

    pub fn ffmpeg_program(&self) -> PathBuf {
        self.ffmpeg_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("ffmpeg"))
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("vidgrab")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<GrabConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = GrabConfig::default();
        let toml = default_cfg.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

pub fn load_from_path(path: &Path) -> Result<GrabConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let cfg: GrabConfig =
        toml::from_str(&data).with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = GrabConfig::default();
        assert_eq!(cfg.download_threads, 1);
        assert_eq!(cfg.preferred_quality, Quality::P1080);
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.min_plausible_size, 5 * 1024);
        assert_eq!(cfg.site.frame_ids[0], "player-frame");
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = GrabConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: GrabConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml = r#"
            download_threads = 3
            preferred_quality = "p720"
            webdriver_url = "http://127.0.0.1:4444"

            [retry]
            max_retries = 2
            base_delay_secs = 0.1

            [site]
            base_url = "https://videos.example"
            frame_ids = ["main-player"]
        "#;
        let cfg: GrabConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.download_threads, 3);
        assert_eq!(cfg.preferred_quality, Quality::P720);
        assert_eq!(cfg.retry.max_retries, 2);
        assert_eq!(cfg.retry.segmented_retries, 3);
        assert_eq!(cfg.site.frame_ids, vec!["main-player".to_string()]);
        assert_eq!(cfg.site.movie_path, "/movie/{slug}");
        assert!(cfg.site.premium.is_none());
        assert_eq!(cfg.webdriver_url.as_deref(), Some("http://127.0.0.1:4444"));
    }

    #[test]
    fn custom_quality_table() {
        let toml = r#"
            [[quality_table]]
            quality = "p720"
            height = 718

            [[quality_table]]
            quality = "p1080"
            height = 1080
        "#;
        let cfg: GrabConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.quality_table.tier_for_height(718), Some(Quality::P720));
        assert_eq!(cfg.quality_table.tier_for_height(720), None);
    }

    #[test]
    fn transport_options_follow_config() {
        let mut cfg = GrabConfig::default();
        cfg.timeout_secs = 12;
        cfg.site.base_url = "https://videos.example/".to_string();
        let opts = cfg.transport_options();
        assert_eq!(opts.timeout, Duration::from_secs(12));
        assert_eq!(opts.referer.as_deref(), Some("https://videos.example/"));
    }

    #[test]
    fn retry_policies_use_attempt_counts() {
        let r = RetryConfig::default();
        assert_eq!(r.page_policy().max_attempts, 4);
        assert_eq!(r.segment_policy().max_attempts, 5);
        assert_eq!(r.page_policy().base_delay, Duration::from_millis(500));
    }
}
