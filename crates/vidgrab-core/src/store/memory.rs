//! In-process record store for dry runs and tests.

use anyhow::{bail, Result};
use std::sync::Mutex;

use super::{DownloadRecord, NewRecord, RecordId, RecordStore};
use crate::model::Quality;

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: RecordId,
    records: Vec<DownloadRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing records (ids are kept as given).
    pub fn with_records(records: Vec<DownloadRecord>) -> Self {
        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0);
        Self {
            inner: Mutex::new(Inner { next_id, records }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("record store lock poisoned"))
    }
}

impl RecordStore for MemoryRecordStore {
    fn find_by_slug(&self, slug: &str, quality: Quality) -> Result<Option<DownloadRecord>> {
        Ok(self
            .lock()?
            .records
            .iter()
            .find(|r| r.slug == slug && r.quality == quality)
            .cloned())
    }

    fn find_by_name(&self, name: &str, quality: Quality) -> Result<Option<DownloadRecord>> {
        Ok(self
            .lock()?
            .records
            .iter()
            .find(|r| r.name == name && r.quality == quality)
            .cloned())
    }

    fn create(&self, new: &NewRecord) -> Result<DownloadRecord> {
        let mut inner = self.lock()?;
        if inner
            .records
            .iter()
            .any(|r| r.slug == new.slug && r.quality == new.quality)
        {
            bail!("record {} {} already exists", new.slug, new.quality);
        }
        inner.next_id += 1;
        let record = DownloadRecord {
            id: inner.next_id,
            slug: new.slug.clone(),
            name: new.name.clone(),
            quality: new.quality,
            path: new.path.clone(),
            size: 0,
            queued: true,
            downloading: false,
            merging: false,
            progress_text: String::new(),
            progress_secs: 0,
            completed: false,
        };
        inner.records.push(record.clone());
        Ok(record)
    }

    fn update(&self, record: &DownloadRecord) -> Result<()> {
        let mut inner = self.lock()?;
        match inner.records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => bail!("record {} not found", record.id),
        }
    }

    fn remove(&self, id: RecordId) -> Result<bool> {
        let mut inner = self.lock()?;
        let before = inner.records.len();
        inner.records.retain(|r| r.id != id);
        Ok(inner.records.len() != before)
    }

    fn list(&self) -> Result<Vec<DownloadRecord>> {
        Ok(self.lock()?.records.clone())
    }
}
