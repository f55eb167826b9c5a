//! One manifest candidate end to end: optional audio track, merge, cleanup.
//!
//! Tracks and the merged output are written next to the destination under
//! names keyed by quality (see [`partial_path`]); the destination itself only
//! appears through a final rename.

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{parts_dir, EngineOutcome, MergeError, Muxer, SegmentEngine, SegmentListener};
use crate::model::{Delivery, QualityCandidate};
use crate::naming::partial_path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentedResult {
    /// Destination already present at a plausible size; nothing downloaded.
    /// Only a finished transfer renames onto the destination.
    AlreadyComplete { size: u64 },
    Completed { size: u64 },
    /// Stopped by the operator; partial artifacts kept.
    Stopped,
    /// All artifacts were deleted.
    Failed(String),
    MergeToolMissing,
}

pub struct SegmentedDownloader<'a> {
    engine: &'a dyn SegmentEngine,
    muxer: &'a dyn Muxer,
    min_plausible_size: u64,
}

/// Forwards one track's events, scaled into its share of the overall
/// progress. Completion and size are held back until the merge is done.
struct TrackListener<'l> {
    inner: &'l mut dyn SegmentListener,
    offset: f64,
    share: f64,
}

impl SegmentListener for TrackListener<'_> {
    fn on_progress(&mut self, percent: f64, eta_secs: Option<u64>) {
        self.inner
            .on_progress(self.offset + percent * self.share, eta_secs);
    }
}

fn track_path(dest: &Path, track: &str) -> PathBuf {
    let mut name = dest.file_stem().unwrap_or_default().to_os_string();
    name.push(format!(".{}.ts", track));
    dest.with_file_name(name)
}

/// Merge output keeps the destination's extension so the muxer can infer the
/// container: `ep.mp4.720p.hls.part.mp4`.
fn merged_path(work: &Path, dest: &Path) -> PathBuf {
    let mut name = work.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(dest.extension().unwrap_or_else(|| OsStr::new("mp4")));
    work.with_file_name(name)
}

fn remove_quietly(path: &Path) {
    let res = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    if let Err(e) = res {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!("failed to remove {}: {}", path.display(), e);
        }
    }
}

impl<'a> SegmentedDownloader<'a> {
    pub fn new(engine: &'a dyn SegmentEngine, muxer: &'a dyn Muxer, min_plausible_size: u64) -> Self {
        Self {
            engine,
            muxer,
            min_plausible_size,
        }
    }

    fn cleanup(&self, files: &[&Path]) {
        for f in files {
            remove_quietly(f);
            remove_quietly(&parts_dir(f));
        }
    }

    /// Work files a transfer of `candidate` into `dest` would resume from.
    fn work_files(candidate: &QualityCandidate, dest: &Path) -> Vec<PathBuf> {
        let work = partial_path(dest, candidate.quality, Delivery::Manifest);
        vec![
            track_path(&work, "video"),
            track_path(&work, "audio"),
            merged_path(&work, dest),
            work,
        ]
    }

    /// Delete whatever an earlier transfer of `candidate` left behind, so the
    /// next run starts from zero.
    pub fn discard_partials(&self, candidate: &QualityCandidate, dest: &Path) {
        let files = Self::work_files(candidate, dest);
        let refs: Vec<&Path> = files.iter().map(PathBuf::as_path).collect();
        self.cleanup(&refs);
    }

    /// Move a finished work file onto the destination. Output below the
    /// plausible minimum is discarded instead.
    fn promote(&self, work: &Path, dest: &Path) -> SegmentedResult {
        let size = fs::metadata(work).map(|m| m.len()).unwrap_or(0);
        if size < self.min_plausible_size {
            self.cleanup(&[work]);
            return SegmentedResult::Failed(format!("implausible output size {}", size));
        }
        if let Err(e) = fs::rename(work, dest) {
            self.cleanup(&[work]);
            return SegmentedResult::Failed(format!("rename to {}: {}", dest.display(), e));
        }
        SegmentedResult::Completed { size }
    }

    pub fn run(
        &self,
        candidate: &QualityCandidate,
        dest: &Path,
        listener: &mut dyn SegmentListener,
        running: &(dyn Fn() -> bool + Sync),
    ) -> SegmentedResult {
        if let Ok(meta) = fs::metadata(dest) {
            if meta.is_file() && meta.len() >= self.min_plausible_size {
                return SegmentedResult::AlreadyComplete { size: meta.len() };
            }
        }
        if let Some(parent) = dest.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                return SegmentedResult::Failed(format!("create {}: {}", parent.display(), e));
            }
        }
        let work = partial_path(dest, candidate.quality, Delivery::Manifest);
        match &candidate.audio_url {
            None => self.single_track(&candidate.url, &work, dest, listener, running),
            Some(audio) => self.two_tracks(&candidate.url, audio, &work, dest, listener, running),
        }
    }

    fn single_track(
        &self,
        url: &str,
        work: &Path,
        dest: &Path,
        listener: &mut dyn SegmentListener,
        running: &(dyn Fn() -> bool + Sync),
    ) -> SegmentedResult {
        match self.engine.download(url, work, listener, running) {
            EngineOutcome::Finished => self.promote(work, dest),
            EngineOutcome::Stopped => SegmentedResult::Stopped,
            EngineOutcome::Failed(e) => {
                self.cleanup(&[work]);
                SegmentedResult::Failed(e)
            }
        }
    }

    fn two_tracks(
        &self,
        video_url: &str,
        audio_url: &str,
        work: &Path,
        dest: &Path,
        listener: &mut dyn SegmentListener,
        running: &(dyn Fn() -> bool + Sync),
    ) -> SegmentedResult {
        if !self.muxer.is_available() {
            return SegmentedResult::MergeToolMissing;
        }
        let video = track_path(work, "video");
        let audio = track_path(work, "audio");
        let merged = merged_path(work, dest);
        let all: [&Path; 3] = [&video, &audio, &merged];

        let tracks = [(video_url, &video, 0.0, 0.8), (audio_url, &audio, 80.0, 0.2)];
        for (url, path, offset, share) in tracks {
            let mut track = TrackListener {
                inner: &mut *listener,
                offset,
                share,
            };
            match self.engine.download(url, path, &mut track, running) {
                EngineOutcome::Finished => {}
                EngineOutcome::Stopped => return SegmentedResult::Stopped,
                EngineOutcome::Failed(e) => {
                    self.cleanup(&all);
                    listener.on_finished(false);
                    return SegmentedResult::Failed(e);
                }
            }
        }

        listener.on_merge_start();
        match self.muxer.merge(&video, &audio, &merged) {
            Ok(()) => {
                listener.on_merge_finished(None);
                self.cleanup(&[&video, &audio]);
                let result = self.promote(&merged, dest);
                match result {
                    SegmentedResult::Completed { size } => {
                        listener.on_size_known(size);
                        listener.on_finished(true);
                    }
                    _ => listener.on_finished(false),
                }
                result
            }
            Err(e) => {
                listener.on_merge_finished(Some(&e));
                self.cleanup(&all);
                listener.on_finished(false);
                match e {
                    MergeError::ToolMissing(_) => SegmentedResult::MergeToolMissing,
                    other => SegmentedResult::Failed(other.to_string()),
                }
            }
        }
    }
}
