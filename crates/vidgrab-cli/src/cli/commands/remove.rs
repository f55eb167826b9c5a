//! `vidgrab remove <slug> <quality>` – drop a record; `--delete-file` also
//! removes the downloaded file and any unfinished work file.

use anyhow::Result;
use vidgrab_core::model::{Delivery, Quality};
use vidgrab_core::naming::partial_path;
use vidgrab_core::store::{RecordStore, SqliteRecordStore};

pub fn run_remove(slug: &str, quality: Quality, delete_file: bool) -> Result<()> {
    let store = SqliteRecordStore::open_default()?;
    let Some(record) = store.find_by_slug(slug, quality)? else {
        println!("No record for {} at {}.", slug, quality);
        return Ok(());
    };

    if delete_file {
        let files = [
            record.path.clone(),
            partial_path(&record.path, quality, Delivery::Progressive),
            partial_path(&record.path, quality, Delivery::Manifest),
        ];
        for path in &files {
            match std::fs::remove_file(path) {
                Ok(()) => tracing::debug!(path = %path.display(), "deleted file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), "could not delete file: {}", e),
            }
        }
    }

    store.remove(record.id)?;
    println!("Removed {} ({})", record.name, quality);
    Ok(())
}
