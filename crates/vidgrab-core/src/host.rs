//! Orchestration host: item supply, the running flag, in-flight counters and
//! fire-and-forget progress reporting.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::control::RunFlag;
use crate::model::{DownloadItem, Quality};

/// Observable status of one item, sent at most once per sampling period.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub slug: String,
    pub quality: Option<Quality>,
    /// Progress line or classified failure status.
    pub text: String,
    pub percent: Option<f64>,
    pub eta_secs: Option<u64>,
}

impl ProgressUpdate {
    pub fn status(slug: &str, quality: Option<Quality>, text: impl Into<String>) -> Self {
        Self {
            slug: slug.to_string(),
            quality,
            text: text.into(),
            percent: None,
            eta_secs: None,
        }
    }
}

/// Catalog/queue supplier plus the host-owned counters.
///
/// Each call to `next_item` hands the item to exactly one worker.
pub trait Host: Send + Sync {
    fn next_item(&self) -> Option<DownloadItem>;
    fn is_running(&self) -> bool;
    fn increment_in_progress(&self);
    fn decrement_in_progress(&self);
    fn increment_finished(&self);
    /// Must not block; dropping the update is acceptable.
    fn report(&self, update: ProgressUpdate);
}

/// In-process FIFO host used by the CLI.
pub struct QueueHost {
    items: Mutex<VecDeque<DownloadItem>>,
    running: RunFlag,
    in_progress: AtomicUsize,
    finished: AtomicUsize,
    progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
}

impl QueueHost {
    pub fn new(items: Vec<DownloadItem>, running: RunFlag) -> Self {
        Self {
            items: Mutex::new(items.into()),
            running,
            in_progress: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
            progress_tx: None,
        }
    }

    /// Send progress to `tx`; updates are dropped when the channel is full.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn in_progress(&self) -> usize {
        self.in_progress.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.items.lock().map(|q| q.len()).unwrap_or(0)
    }
}

impl Host for QueueHost {
    fn next_item(&self) -> Option<DownloadItem> {
        self.items.lock().ok()?.pop_front()
    }

    fn is_running(&self) -> bool {
        self.running.is_running()
    }

    fn increment_in_progress(&self) {
        self.in_progress.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_in_progress(&self) {
        let _ = self
            .in_progress
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn increment_finished(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn report(&self, update: ProgressUpdate) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.try_send(update);
        }
    }
}

#[derive(Deserialize)]
struct ItemsFile {
    #[serde(default, rename = "item")]
    items: Vec<DownloadItem>,
}

/// Load `[[item]]` tables from a TOML items file. Missing ids are numbered
/// from 1 in file order.
pub fn load_items(path: &Path) -> Result<Vec<DownloadItem>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read items file {}", path.display()))?;
    parse_items(&data).with_context(|| format!("invalid items file {}", path.display()))
}

pub fn parse_items(data: &str) -> Result<Vec<DownloadItem>> {
    let file: ItemsFile = toml::from_str(data)?;
    let mut items = file.items;
    for (i, item) in items.iter_mut().enumerate() {
        if item.id == 0 {
            item.id = i as i64 + 1;
        }
        if item.series.is_empty() && !item.is_movie() {
            item.series = item.name.clone();
        }
    }
    Ok(items)
}
