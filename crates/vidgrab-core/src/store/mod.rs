//! Durable download records.
//!
//! One record per (slug, quality). The owning session creates it on first
//! success and flips its status flags; nothing else writes to it while the
//! session is active.

mod memory;
mod sqlite;


pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use anyhow::Result;
use std::path::PathBuf;

use crate::model::Quality;

pub type RecordId = i64;

/// Persisted state of one download.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadRecord {
    pub id: RecordId,
    pub slug: String,
    pub name: String,
    pub quality: Quality,
    pub path: PathBuf,
    /// Expected total size in bytes (0 if not yet known).
    pub size: u64,
    pub queued: bool,
    pub downloading: bool,
    pub merging: bool,
    pub progress_text: String,
    /// Last reported ETA in seconds.
    pub progress_secs: u64,
    pub completed: bool,
}

/// Fields needed to create a record; it starts out queued.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub slug: String,
    pub name: String,
    pub quality: Quality,
    pub path: PathBuf,
}

impl DownloadRecord {
    /// Human-readable status for `vidgrab status`.
    pub fn state_label(&self) -> &'static str {
        if self.completed {
            "completed"
        } else if self.merging {
            "merging"
        } else if self.downloading {
            "downloading"
        } else if self.queued {
            "queued"
        } else {
            "idle"
        }
    }
}

/// Persistence collaborator. Implementations are shared by every worker.
pub trait RecordStore: Send + Sync {
    fn find_by_slug(&self, slug: &str, quality: Quality) -> Result<Option<DownloadRecord>>;

    fn find_by_name(&self, name: &str, quality: Quality) -> Result<Option<DownloadRecord>>;

    /// Insert a new queued record. Fails if (slug, quality) already exists.
    fn create(&self, new: &NewRecord) -> Result<DownloadRecord>;

    /// Persist every mutable field of `record` (matched by id).
    fn update(&self, record: &DownloadRecord) -> Result<()>;

    /// Returns true if a record was deleted.
    fn remove(&self, id: RecordId) -> Result<bool>;

    /// All records, oldest first.
    fn list(&self) -> Result<Vec<DownloadRecord>>;
}
