//! SQLite-backed record store (sqlx), driven synchronously from worker threads.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

use super::{DownloadRecord, NewRecord, RecordId, RecordStore};
use crate::model::Quality;

/// Percent-encode a path for use in a sqlite:// URI so spaces and special chars don't break parsing.
fn path_to_sqlite_uri(path: &Path) -> String {
    let s = path.to_string_lossy();
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' => out.push_str("%25"),
            ' ' => out.push_str("%20"),
            '#' => out.push_str("%23"),
            '?' => out.push_str("%3F"),
            '&' => out.push_str("%26"),
            c => out.push(c),
        }
    }
    format!("sqlite://{}", out)
}

/// Record database at `~/.local/state/vidgrab/records.db`.
///
/// Owns a small tokio runtime so callers on plain threads can use the async
/// pool; never call it from inside another runtime.
pub struct SqliteRecordStore {
    rt: Runtime,
    pool: Pool<Sqlite>,
}

impl SqliteRecordStore {
    pub fn default_path() -> Result<PathBuf> {
        Ok(crate::logging::state_dir()?.join("records.db"))
    }

    /// Open (or create) the default record database and run migrations.
    pub fn open_default() -> Result<Self> {
        Self::open_at(Self::default_path()?)
    }

    /// Open (or create) the database at a specific path. Creates parent dirs if needed.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let uri = path_to_sqlite_uri(path) + "?mode=rwc";
        Self::connect(&uri, 4).with_context(|| format!("open record db {}", path.display()))
    }

    /// In-memory database (single connection so every query sees the same data).
    pub fn open_memory() -> Result<Self> {
        Self::connect("sqlite::memory:", 1)
    }

    fn connect(uri: &str, max_connections: u32) -> Result<Self> {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()?;
        let pool = rt.block_on(
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect(uri),
        )?;
        let store = SqliteRecordStore { rt, pool };
        store.block_on(store.migrate())?;
        Ok(store)
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.rt.block_on(fut)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                slug TEXT NOT NULL,
                name TEXT NOT NULL,
                quality TEXT NOT NULL,
                path TEXT NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                queued INTEGER NOT NULL DEFAULT 1,
                downloading INTEGER NOT NULL DEFAULT 0,
                merging INTEGER NOT NULL DEFAULT 0,
                progress_text TEXT NOT NULL DEFAULT '',
                progress_secs INTEGER NOT NULL DEFAULT 0,
                completed INTEGER NOT NULL DEFAULT 0,
                UNIQUE (slug, quality)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reset records left `downloading` by an interrupted run back to queued.
    /// Returns the number of records reset.
    pub fn recover_interrupted(&self) -> Result<u64> {
        self.block_on(async {
            let r = sqlx::query(
                r#"
                UPDATE records
                SET downloading = 0, merging = 0, queued = 1
                WHERE downloading = 1 OR merging = 1
                "#,
            )
            .execute(&self.pool)
            .await?;
            Ok(r.rows_affected())
        })
    }

    async fn find_where(&self, column: &str, value: &str, quality: Quality) -> Result<Option<DownloadRecord>> {
        let sql = format!(
            "SELECT id, slug, name, quality, path, size, queued, downloading, merging, \
             progress_text, progress_secs, completed FROM records \
             WHERE {} = ?1 AND quality = ?2 ORDER BY id ASC LIMIT 1",
            column
        );
        let row = sqlx::query(&sql)
            .bind(value)
            .bind(quality.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(record_from_row))
    }
}

fn record_from_row(row: &SqliteRow) -> DownloadRecord {
    let quality: String = row.get("quality");
    let path: String = row.get("path");
    let size: i64 = row.get("size");
    let progress_secs: i64 = row.get("progress_secs");
    DownloadRecord {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        quality: Quality::parse(&quality).unwrap_or_default(),
        path: PathBuf::from(path),
        size: size.max(0) as u64,
        queued: row.get("queued"),
        downloading: row.get("downloading"),
        merging: row.get("merging"),
        progress_text: row.get("progress_text"),
        progress_secs: progress_secs.max(0) as u64,
        completed: row.get("completed"),
    }
}

impl RecordStore for SqliteRecordStore {
    fn find_by_slug(&self, slug: &str, quality: Quality) -> Result<Option<DownloadRecord>> {
        self.block_on(self.find_where("slug", slug, quality))
    }

    fn find_by_name(&self, name: &str, quality: Quality) -> Result<Option<DownloadRecord>> {
        self.block_on(self.find_where("name", name, quality))
    }

    fn create(&self, new: &NewRecord) -> Result<DownloadRecord> {
        let path = new.path.to_string_lossy().into_owned();
        let id = self.block_on(async {
            sqlx::query(
                r#"
                INSERT INTO records (slug, name, quality, path, queued)
                VALUES (?1, ?2, ?3, ?4, 1)
                "#,
            )
            .bind(&new.slug)
            .bind(&new.name)
            .bind(new.quality.as_str())
            .bind(&path)
            .execute(&self.pool)
            .await
            .map(|r| r.last_insert_rowid())
        })
        .with_context(|| format!("create record {} {}", new.slug, new.quality))?;

        Ok(DownloadRecord {
            id,
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
        })
    }

    fn update(&self, record: &DownloadRecord) -> Result<()> {
        let path = record.path.to_string_lossy().into_owned();
        self.block_on(async {
            sqlx::query(
                r#"
                UPDATE records
                SET name = ?1,
                    path = ?2,
                    size = ?3,
                    queued = ?4,
                    downloading = ?5,
                    merging = ?6,
                    progress_text = ?7,
                    progress_secs = ?8,
                    completed = ?9
                WHERE id = ?10
                "#,
            )
            .bind(&record.name)
            .bind(&path)
            .bind(record.size as i64)
            .bind(record.queued)
            .bind(record.downloading)
            .bind(record.merging)
            .bind(&record.progress_text)
            .bind(record.progress_secs as i64)
            .bind(record.completed)
            .bind(record.id)
            .execute(&self.pool)
            .await
        })?;
        Ok(())
    }

    fn remove(&self, id: RecordId) -> Result<bool> {
        let r = self.block_on(
            sqlx::query("DELETE FROM records WHERE id = ?1")
                .bind(id)
                .execute(&self.pool),
        )?;
        Ok(r.rows_affected() > 0)
    }

    fn list(&self) -> Result<Vec<DownloadRecord>> {
        let rows = self.block_on(
            sqlx::query(
                r#"
                SELECT id, slug, name, quality, path, size, queued, downloading, merging,
                       progress_text, progress_secs, completed
                FROM records
                ORDER BY id ASC
                "#,
            )
            .fetch_all(&self.pool),
        )?;
        Ok(rows.iter().map(record_from_row).collect())
    }
}
