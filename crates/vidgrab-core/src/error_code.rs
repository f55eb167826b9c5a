//! Closed taxonomy of negotiation failures and the retry action each one maps to.
//!
//! Codes are control signals, not log messages: every scraping step returns
//! exactly one code plus an optional diagnostic string, and the session turns
//! that into a counter update via [`action_for`].

use std::fmt;

/// Named failure category produced by page-scraping and negotiation steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoFrame,
    IframeForbidden,
    FailedExtractResolutions,
    NoScriptEngine,
    AntiBotBlock,
    SimpleModeFailed,
    ManifestLinkFailed,
    EmptyFrame,
    PageReadFailed,
    ExternalMergeToolMissing,
    SecondManifestEmptyFrame,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NoFrame => "no_frame",
            ErrorCode::IframeForbidden => "iframe_forbidden",
            ErrorCode::FailedExtractResolutions => "failed_extract_resolutions",
            ErrorCode::NoScriptEngine => "no_script_engine",
            ErrorCode::AntiBotBlock => "anti_bot_block",
            ErrorCode::SimpleModeFailed => "simple_mode_failed",
            ErrorCode::ManifestLinkFailed => "manifest_link_failed",
            ErrorCode::EmptyFrame => "empty_frame",
            ErrorCode::PageReadFailed => "page_read_failed",
            ErrorCode::ExternalMergeToolMissing => "external_merge_tool_missing",
            ErrorCode::SecondManifestEmptyFrame => "second_manifest_empty_frame",
        }
    }

    /// One-line status text shown for this code.
    pub fn status_line(self) -> &'static str {
        match self {
            ErrorCode::NoFrame => "player frame did not load, retrying",
            ErrorCode::IframeForbidden => "player frame is forbidden for this item",
            ErrorCode::FailedExtractResolutions => "could not extract any resolution",
            ErrorCode::NoScriptEngine => "no browser available to run the player script",
            ErrorCode::AntiBotBlock => "blocked by anti-bot page, will retry",
            ErrorCode::SimpleModeFailed => "lightweight fetch failed and no fallback succeeded",
            ErrorCode::ManifestLinkFailed => "manifest link could not be resolved",
            ErrorCode::EmptyFrame => "page has no player frame",
            ErrorCode::PageReadFailed => "item page could not be read",
            ErrorCode::ExternalMergeToolMissing => "merge tool (ffmpeg) not found",
            ErrorCode::SecondManifestEmptyFrame => "continuation frame is empty, using main manifest",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified negotiation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct NegotiationError {
    pub code: ErrorCode,
    pub detail: Option<String>,
}

impl NegotiationError {
    pub fn new(code: ErrorCode) -> Self {
        Self { code, detail: None }
    }

    pub fn with_detail(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            detail: Some(detail.into()),
        }
    }
}

impl From<ErrorCode> for NegotiationError {
    fn from(code: ErrorCode) -> Self {
        NegotiationError::new(code)
    }
}

/// What the session does with a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Increment quality-detection retries and retry.
    CountQualityDetection,
    /// Drop the continuation-video target and fall back to the regular manifest.
    ResetContinuation,
    /// Transient; retry without touching any ceiling.
    Transient,
    /// Stop negotiating for this item (quality-detection ceiling forced to exhausted).
    ExhaustQualityDetection,
    /// Increment general retries.
    CountGeneral,
    /// Finish the item now, no retry.
    Terminal,
}

/// Total mapping from a failure (or an unclassified one, `None`) to its action.
pub fn action_for(code: Option<ErrorCode>) -> RetryAction {
    match code {
        Some(ErrorCode::NoFrame) => RetryAction::CountQualityDetection,
        Some(ErrorCode::SecondManifestEmptyFrame) => RetryAction::ResetContinuation,
        Some(ErrorCode::AntiBotBlock) => RetryAction::Transient,
        Some(
            ErrorCode::IframeForbidden
            | ErrorCode::EmptyFrame
            | ErrorCode::FailedExtractResolutions
            | ErrorCode::NoScriptEngine,
        ) => RetryAction::ExhaustQualityDetection,
        Some(ErrorCode::ManifestLinkFailed | ErrorCode::PageReadFailed) => {
            RetryAction::CountGeneral
        }
        Some(ErrorCode::ExternalMergeToolMissing) => RetryAction::Terminal,
        Some(ErrorCode::SimpleModeFailed) | None => RetryAction::CountGeneral,
    }
}
