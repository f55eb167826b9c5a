//! Built-in segment engine: m3u8-rs playlist parsing, curl segment fetches
//! on a small scoped worker pool, in-order concatenation.

use m3u8_rs::{KeyMethod, MediaPlaylist, Playlist};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use url::Url;

use super::{parts_dir, EngineOutcome, SegmentEngine, SegmentListener};
use crate::retry::{run_with_retry, RetryPolicy, TransferError};
use crate::transport::Transport;

pub struct NativeSegmentEngine {
    transport: Transport,
    policy: RetryPolicy,
    workers: usize,
    progress_interval: Duration,
}

impl NativeSegmentEngine {
    pub fn new(transport: Transport, policy: RetryPolicy, workers: usize) -> Self {
        let progress_interval = transport.options().progress_interval;
        Self {
            transport,
            policy,
            workers: workers.max(1),
            progress_interval,
        }
    }

    fn fetch(&self, url: &str, running: &dyn Fn() -> bool) -> Result<Vec<u8>, TransferError> {
        run_with_retry(&self.policy, running, || {
            self.transport.fetch_ok(url).map(|p| p.body)
        })
    }

    /// Ordered segment URLs (init section first) of the media playlist behind `url`.
    /// A master playlist is followed to its highest-bandwidth variant.
    fn segment_urls(&self, url: &str, running: &dyn Fn() -> bool) -> Result<Vec<String>, String> {
        let mut url = url.to_string();
        for _ in 0..2 {
            let body = self.fetch(&url, running).map_err(|e| format!("playlist {}: {}", url, e))?;
            let base = Url::parse(&url).map_err(|e| e.to_string())?;
            match m3u8_rs::parse_playlist_res(&body) {
                Ok(Playlist::MediaPlaylist(pl)) => return media_segment_urls(&pl, &base),
                Ok(Playlist::MasterPlaylist(pl)) => {
                    let best = pl
                        .variants
                        .iter()
                        .filter(|v| !v.is_i_frame)
                        .max_by_key(|v| v.bandwidth)
                        .ok_or_else(|| "master playlist has no variants".to_string())?;
                    url = base.join(&best.uri).map_err(|e| e.to_string())?.to_string();
                }
                Err(e) => return Err(format!("playlist {}: {}", url, e)),
            }
        }
        Err("nested master playlists".to_string())
    }

    fn fetch_segment(&self, url: &str, part: &Path, running: &dyn Fn() -> bool) -> Result<u64, TransferError> {
        if let Ok(meta) = fs::metadata(part) {
            if meta.len() > 0 {
                return Ok(meta.len());
            }
        }
        let body = self.fetch(url, running)?;
        let tmp = part.with_extension("tmp");
        let mut f = File::create(&tmp)?;
        f.write_all(&body)?;
        f.sync_all()?;
        fs::rename(&tmp, part)?;
        Ok(body.len() as u64)
    }
}

fn media_segment_urls(pl: &MediaPlaylist, base: &Url) -> Result<Vec<String>, String> {
    let mut urls = Vec::with_capacity(pl.segments.len() + 1);
    if let Some(map) = pl.segments.first().and_then(|s| s.map.as_ref()) {
        urls.push(base.join(&map.uri).map_err(|e| e.to_string())?.to_string());
    }
    for seg in &pl.segments {
        if let Some(key) = &seg.key {
            if !matches!(key.method, KeyMethod::None) {
                return Err("encrypted segments are not supported".to_string());
            }
        }
        urls.push(base.join(&seg.uri).map_err(|e| e.to_string())?.to_string());
    }
    if urls.is_empty() {
        return Err("playlist has no segments".to_string());
    }
    Ok(urls)
}

fn part_path(dir: &Path, index: usize) -> PathBuf {
    dir.join(format!("{:06}.seg", index))
}

fn concatenate(dir: &Path, count: usize, dest: &Path) -> io::Result<u64> {
    let mut out = File::create(dest)?;
    let mut total = 0;
    for i in 0..count {
        let mut part = File::open(part_path(dir, i))?;
        total += io::copy(&mut part, &mut out)?;
    }
    out.sync_all()?;
    Ok(total)
}

impl SegmentEngine for NativeSegmentEngine {
    fn download(
        &self,
        manifest_url: &str,
        dest: &Path,
        listener: &mut dyn SegmentListener,
        running: &(dyn Fn() -> bool + Sync),
    ) -> EngineOutcome {
        let urls = match self.segment_urls(manifest_url, running) {
            Ok(urls) => urls,
            Err(_) if !running() => return EngineOutcome::Stopped,
            Err(e) => {
                listener.on_finished(false);
                return EngineOutcome::Failed(e);
            }
        };
        let dir = parts_dir(dest);
        if let Err(e) = fs::create_dir_all(&dir) {
            listener.on_finished(false);
            return EngineOutcome::Failed(format!("create {}: {}", dir.display(), e));
        }
        listener.on_start();

        let total = urls.len();
        let next = AtomicUsize::new(0);
        let failed = AtomicBool::new(false);
        let started = Instant::now();
        let mut first_error: Option<String> = None;
        let mut done = 0usize;
        let mut last_report = started;

        std::thread::scope(|s| {
            let (tx, rx) = mpsc::channel::<(usize, Result<u64, TransferError>)>();
            for _ in 0..self.workers.min(total) {
                let tx = tx.clone();
                let (urls, dir, next, failed) = (&urls, &dir, &next, &failed);
                s.spawn(move || loop {
                    if failed.load(Ordering::Relaxed) || !running() {
                        break;
                    }
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    if i >= total {
                        break;
                    }
                    let res = self.fetch_segment(&urls[i], &part_path(dir, i), running);
                    if tx.send((i, res)).is_err() {
                        break;
                    }
                });
            }
            drop(tx);

            for (i, res) in rx {
                match res {
                    Ok(_) => {
                        done += 1;
                        let now = Instant::now();
                        if now.duration_since(last_report) >= self.progress_interval || done == total {
                            last_report = now;
                            let elapsed = now.duration_since(started).as_secs_f64();
                            let remaining = (total - done) as f64;
                            let eta = (elapsed / done as f64 * remaining).ceil() as u64;
                            listener.on_progress(done as f64 / total as f64 * 100.0, Some(eta));
                        }
                    }
                    Err(e) => {
                        failed.store(true, Ordering::Relaxed);
                        first_error.get_or_insert_with(|| format!("segment {}: {}", i, e));
                    }
                }
            }
        });

        if let Some(e) = first_error {
            if !running() {
                return EngineOutcome::Stopped;
            }
            listener.on_finished(false);
            return EngineOutcome::Failed(e);
        }
        if done < total {
            return EngineOutcome::Stopped;
        }

        match concatenate(&dir, total, dest) {
            Ok(size) => {
                let _ = fs::remove_dir_all(&dir);
                listener.on_size_known(size);
                listener.on_finished(true);
                EngineOutcome::Finished
            }
            Err(e) => {
                listener.on_finished(false);
                EngineOutcome::Failed(format!("concatenate into {}: {}", dest.display(), e))
            }
        }
    }
}
