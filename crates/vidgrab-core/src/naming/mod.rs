//! Destination paths for downloaded items.

mod sanitize;

pub use sanitize::sanitize_component;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::model::{Delivery, DownloadItem, Quality};

const MEDIA_EXTENSION: &str = "mp4";

/// Suffix of in-progress work files; the final name only ever appears by rename.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Work file for a transfer of `dest` at `quality`, e.g. `Ep.mp4.1080p.part`
/// (progressive) or `Ep.mp4.1080p.hls.part` (segmented). Keyed by quality and
/// delivery so bytes of one candidate are never resumed by another.
pub fn partial_path(dest: &Path, quality: Quality, delivery: Delivery) -> PathBuf {
    let mut name: OsString = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(quality.as_str());
    if delivery == Delivery::Manifest {
        name.push(".hls");
    }
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// Naming/foldering collaborator.
pub trait PathNamer: Send + Sync {
    /// Final file for `item`; `secondary` selects the continuation video.
    fn destination(&self, item: &DownloadItem, secondary: bool) -> PathBuf;
}

/// `<root>/<Series>/Season NN/<name>.mp4` for episodes and
/// `<root>/Movies/<name>.mp4` for movies.
#[derive(Debug, Clone)]
pub struct SeriesNamer {
    root: PathBuf,
}

impl SeriesNamer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn component_or(name: &str, fallback: &str) -> String {
    let s = sanitize_component(name);
    if s.is_empty() {
        sanitize_component(fallback)
    } else {
        s
    }
}

impl PathNamer for SeriesNamer {
    fn destination(&self, item: &DownloadItem, secondary: bool) -> PathBuf {
        let name = if secondary {
            item.continuation_name()
        } else {
            item.name.clone()
        };
        let file = format!("{}.{}", component_or(&name, &item.slug), MEDIA_EXTENSION);

        if item.is_movie() {
            return self.root.join("Movies").join(file);
        }
        let mut dir = self.root.join(component_or(&item.series, &item.slug));
        if let Some(season) = item.season {
            dir.push(format!("Season {:02}", season));
        }
        dir.join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemKind;

    fn episode() -> DownloadItem {
        DownloadItem {
            id: 1,
            slug: "show-s02e03".to_string(),
            series: "The Show".to_string(),
            name: "The Show S02E03".to_string(),
            kind: ItemKind::Episode,
            season: Some(2),
            episode: Some(3),
        }
    }

    #[test]
    fn episode_goes_into_season_folder() {
        let namer = SeriesNamer::new("/media");
        assert_eq!(
            namer.destination(&episode(), false),
            PathBuf::from("/media/The Show/Season 02/The Show S02E03.mp4")
        );
    }

    #[test]
    fn continuation_uses_part_two_name() {
        let namer = SeriesNamer::new("/media");
        assert_eq!(
            namer.destination(&episode(), true),
            PathBuf::from("/media/The Show/Season 02/The Show S02E03 (Part 2).mp4")
        );
    }

    #[test]
    fn movie_goes_into_movies_folder() {
        let item = DownloadItem {
            kind: ItemKind::Movie,
            name: "Film: The Return".to_string(),
            season: None,
            ..episode()
        };
        assert_eq!(
            SeriesNamer::new("/media").destination(&item, false),
            PathBuf::from("/media/Movies/Film_ The Return.mp4")
        );
    }

    #[test]
    fn partial_paths_are_keyed_by_quality_and_delivery() {
        let dest = Path::new("/m/Show/Ep.mp4");
        assert_eq!(
            partial_path(dest, Quality::P1080, Delivery::Progressive),
            PathBuf::from("/m/Show/Ep.mp4.1080p.part")
        );
        assert_eq!(
            partial_path(dest, Quality::P720, Delivery::Progressive),
            PathBuf::from("/m/Show/Ep.mp4.720p.part")
        );
        assert_eq!(
            partial_path(dest, Quality::P1080, Delivery::Manifest),
            PathBuf::from("/m/Show/Ep.mp4.1080p.hls.part")
        );
    }

    #[test]
    fn empty_names_fall_back_to_slug() {
        let item = DownloadItem {
            series: "..".to_string(),
            name: " ".to_string(),
            season: None,
            ..episode()
        };
        assert_eq!(
            SeriesNamer::new("/m").destination(&item, false),
            PathBuf::from("/m/show-s02e03/show-s02e03.mp4")
        );
    }
}
