//! Item and quality types shared by every stage of the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality tier. Declaration order is the total ordering used for selection
/// (`P360 < P480 < P720 < P1080`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    P360,
    P480,
    P720,
    #[default]
    P1080,
}

impl Quality {
    /// All tiers, lowest first.
    pub const ALL: [Quality; 4] = [Quality::P360, Quality::P480, Quality::P720, Quality::P1080];

    pub fn as_str(self) -> &'static str {
        match self {
            Quality::P360 => "360p",
            Quality::P480 => "480p",
            Quality::P720 => "720p",
            Quality::P1080 => "1080p",
        }
    }

    /// Nominal vertical resolution of the tier.
    pub fn default_height(self) -> u64 {
        match self {
            Quality::P360 => 360,
            Quality::P480 => 480,
            Quality::P720 => 720,
            Quality::P1080 => 1080,
        }
    }

    /// Accepts `720p`, `p720` and `720`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        let digits = s.trim_start_matches('p').trim_end_matches('p');
        Quality::ALL
            .into_iter()
            .find(|q| q.default_height().to_string() == digits)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the quality table: manifests declaring `RESOLUTION=WxH` with
/// this height map to `quality`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityRow {
    pub quality: Quality,
    pub height: u64,
}

/// Table matching declared resolutions to quality tiers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityTable(pub Vec<QualityRow>);

impl Default for QualityTable {
    fn default() -> Self {
        QualityTable(
            Quality::ALL
                .into_iter()
                .map(|quality| QualityRow {
                    quality,
                    height: quality.default_height(),
                })
                .collect(),
        )
    }
}

impl QualityTable {
    /// Tier for an exact declared height, if the table has one.
    pub fn tier_for_height(&self, height: u64) -> Option<Quality> {
        self.0
            .iter()
            .find(|row| row.height == height)
            .map(|row| row.quality)
    }
}

/// Episode vs. movie; movies use the alternate navigation flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[default]
    Episode,
    Movie,
}

/// An episode or movie supplied by the catalog. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadItem {
    #[serde(default)]
    pub id: i64,
    pub slug: String,
    #[serde(default)]
    pub series: String,
    pub name: String,
    #[serde(default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub season: Option<u32>,
    #[serde(default)]
    pub episode: Option<u32>,
}

impl DownloadItem {
    pub fn is_movie(&self) -> bool {
        self.kind == ItemKind::Movie
    }

    /// Display name used for the continuation video of this item.
    pub fn continuation_name(&self) -> String {
        format!("{} (Part 2)", self.name)
    }
}

/// How a candidate is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Single file, byte-range resumable.
    Progressive,
    /// HLS manifest; segments are fetched and concatenated.
    Manifest,
}

/// A (quality, locator) pair discovered by negotiation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualityCandidate {
    pub quality: Quality,
    pub url: String,
    pub delivery: Delivery,
    /// Belongs to the secondary/continuation video.
    pub secondary: bool,
    /// Separate audio track that must be merged with the video track.
    pub audio_url: Option<String>,
}

impl QualityCandidate {
    pub fn progressive(quality: Quality, url: impl Into<String>) -> Self {
        Self {
            quality,
            url: url.into(),
            delivery: Delivery::Progressive,
            secondary: false,
            audio_url: None,
        }
    }

    pub fn manifest(quality: Quality, url: impl Into<String>, audio_url: Option<String>) -> Self {
        Self {
            quality,
            url: url.into(),
            delivery: Delivery::Manifest,
            secondary: false,
            audio_url,
        }
    }

    /// Same candidate tagged as belonging to the continuation video.
    pub fn into_secondary(mut self) -> Self {
        self.secondary = true;
        self
    }

    pub fn needs_merge(&self) -> bool {
        self.audio_url.is_some()
    }
}
