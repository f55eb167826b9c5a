//! `vidgrab status` – list persisted download records.

use anyhow::Result;
use vidgrab_core::store::{RecordStore, SqliteRecordStore};

pub fn run_status() -> Result<()> {
    let store = SqliteRecordStore::open_default()?;
    let records = store.list()?;
    if records.is_empty() {
        println!("No download records.");
        return Ok(());
    }
    println!(
        "{:<6} {:<12} {:<7} {:<10} {:<24} {}",
        "ID", "STATE", "QUALITY", "SIZE", "PROGRESS", "NAME"
    );
    for r in records {
        let size = if r.size > 0 {
            format!("{:.1}M", r.size as f64 / 1_048_576.0)
        } else {
            "-".to_string()
        };
        println!(
            "{:<6} {:<12} {:<7} {:<10} {:<24} {}",
            r.id,
            r.state_label(),
            r.quality,
            size,
            r.progress_text,
            r.name
        );
    }
    Ok(())
}
