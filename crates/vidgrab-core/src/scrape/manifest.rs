//! Master playlist parsing into quality variants.

use crate::model::{Quality, QualityTable};
use m3u8_rs::{AlternativeMediaType, MasterPlaylist, Playlist};
use std::collections::{HashMap, HashSet};
use url::Url;

/// One playable variant of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestVariant {
    pub quality: Quality,
    pub url: String,
    /// English audio rendition that must be merged with this variant.
    pub audio_url: Option<String>,
}

/// Parse a manifest fetched from `manifest_url`.
///
/// Variants whose declared height is not in `table` are skipped; each tier
/// appears at most once per track type (plain video vs. audio-paired video).
/// A media playlist (no variants) yields a single variant tagged `fallback`.
pub fn parse_manifest(
    body: &[u8],
    manifest_url: &str,
    table: &QualityTable,
    fallback: Quality,
) -> Result<Vec<ManifestVariant>, String> {
    let base = Url::parse(manifest_url).map_err(|e| e.to_string())?;
    match m3u8_rs::parse_playlist_res(body) {
        Ok(Playlist::MasterPlaylist(pl)) => Ok(variants_from_master(&pl, &base, table)),
        Ok(Playlist::MediaPlaylist(_)) => Ok(vec![ManifestVariant {
            quality: fallback,
            url: manifest_url.to_string(),
            audio_url: None,
        }]),
        Err(e) => Err(e.to_string()),
    }
}

fn variants_from_master(pl: &MasterPlaylist, base: &Url, table: &QualityTable) -> Vec<ManifestVariant> {
    let english_audio: HashMap<&str, Url> = pl
        .alternatives
        .iter()
        .filter(|alt| matches!(alt.media_type, AlternativeMediaType::Audio))
        .filter(|alt| is_english(alt.language.as_deref(), &alt.name))
        .filter_map(|alt| {
            let uri = alt.uri.as_deref()?;
            Some((alt.group_id.as_str(), base.join(uri).ok()?))
        })
        .collect();

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for variant in pl.variants.iter().filter(|v| !v.is_i_frame) {
        let Some(res) = &variant.resolution else {
            continue;
        };
        let Some(quality) = table.tier_for_height(res.height) else {
            tracing::trace!(height = res.height, "resolution not in quality table");
            continue;
        };
        let Ok(url) = base.join(&variant.uri) else {
            continue;
        };
        let audio_url = variant
            .audio
            .as_deref()
            .and_then(|group| english_audio.get(group))
            .map(Url::to_string);
        if seen.insert((quality, audio_url.is_some())) {
            out.push(ManifestVariant {
                quality,
                url: url.to_string(),
                audio_url,
            });
        }
    }
    out
}

fn is_english(language: Option<&str>, name: &str) -> bool {
    let lang_match = language.is_some_and(|l| {
        let l = l.trim().to_ascii_lowercase();
        l == "en" || l.starts_with("en-") || l == "eng" || l == "english"
    });
    lang_match || name.to_ascii_lowercase().contains("english")
}
