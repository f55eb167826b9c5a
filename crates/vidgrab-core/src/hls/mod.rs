//! Segmented (HLS) downloads: segment engine, container merge, and the
//! two-track download/merge/cleanup rules around them.

mod merge;
mod native;
mod segmented;

pub use merge::{FfmpegMuxer, MergeError, Muxer};
pub use native::NativeSegmentEngine;
pub use segmented::{SegmentedDownloader, SegmentedResult};

use std::path::{Path, PathBuf};

/// Callbacks from a segment download. Every handler defaults to a no-op.
pub trait SegmentListener {
    fn on_start(&mut self) {}
    fn on_progress(&mut self, _percent: f64, _eta_secs: Option<u64>) {}
    fn on_size_known(&mut self, _bytes: u64) {}
    fn on_finished(&mut self, _success: bool) {}
    fn on_merge_start(&mut self) {}
    fn on_merge_finished(&mut self, _error: Option<&MergeError>) {}
}

/// Listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl SegmentListener for NoopListener {}

/// How one track download ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineOutcome {
    Finished,
    /// Running flag turned false; partial segments are kept.
    Stopped,
    Failed(String),
}

/// Fetches every segment of a media playlist and concatenates them into `dest`.
pub trait SegmentEngine: Send + Sync {
    fn download(
        &self,
        manifest_url: &str,
        dest: &Path,
        listener: &mut dyn SegmentListener,
        running: &(dyn Fn() -> bool + Sync),
    ) -> EngineOutcome;
}

/// Directory holding the downloaded segments of `dest` until concatenation.
pub fn parts_dir(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".parts");
    dest.with_file_name(name)
}
