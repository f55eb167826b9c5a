//! `vidgrab run` – process every item of an items file.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use vidgrab_core::browser::{shared, NoBrowser, SharedBrowser, WebDriverBrowser};
use vidgrab_core::config::GrabConfig;
use vidgrab_core::control::RunFlag;
use vidgrab_core::host::{load_items, ProgressUpdate, QueueHost};
use vidgrab_core::model::Quality;
use vidgrab_core::pipeline::{run_workers, Pipeline};
use vidgrab_core::store::SqliteRecordStore;

const PROGRESS_CHANNEL: usize = 64;

#[derive(Debug)]
pub struct RunArgs {
    pub items: PathBuf,
    pub threads: Option<usize>,
    pub quality: Option<Quality>,
    pub dir: Option<PathBuf>,
}

fn browser_for(cfg: &GrabConfig) -> SharedBrowser {
    match &cfg.webdriver_url {
        Some(url) => {
            tracing::debug!(endpoint = %url, "browser fallback via WebDriver");
            shared(WebDriverBrowser::new(
                url.clone(),
                Duration::from_secs(cfg.timeout_secs.max(1)),
            ))
        }
        None => shared(NoBrowser),
    }
}

/// Flip `flag` on the first Ctrl-C. The watcher thread lives until exit.
fn spawn_ctrl_c_watcher(flag: RunFlag) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build signal runtime")?;
    std::thread::Builder::new()
        .name("ctrl-c".to_string())
        .spawn(move || {
            rt.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nstopping after the current chunk...");
                    tracing::info!("interrupt received, stopping workers");
                    flag.stop();
                }
            })
        })
        .context("spawn signal thread")?;
    Ok(())
}

fn print_progress(mut rx: mpsc::Receiver<ProgressUpdate>) {
    while let Some(update) = rx.blocking_recv() {
        let quality = update
            .quality
            .map(|q| format!(" [{}]", q))
            .unwrap_or_default();
        println!("{}{}  {}", update.slug, quality, update.text);
    }
}

pub fn run_pipeline(cfg: &GrabConfig, args: RunArgs) -> Result<()> {
    let items = load_items(&args.items)?;
    if items.is_empty() {
        println!("No items in {}.", args.items.display());
        return Ok(());
    }
    let total = items.len();

    let store = SqliteRecordStore::open_default()?;
    let recovered = store.recover_interrupted()?;
    if recovered > 0 {
        tracing::info!("recovered {} interrupted record(s) from previous run", recovered);
    }

    let running = RunFlag::new();
    spawn_ctrl_c_watcher(running.clone())?;

    let (progress_tx, progress_rx) = mpsc::channel::<ProgressUpdate>(PROGRESS_CHANNEL);
    let printer = std::thread::spawn(move || print_progress(progress_rx));
    let host = Arc::new(QueueHost::new(items, running.clone()).with_progress(progress_tx));

    let download_dir = match args.dir.or_else(|| cfg.download_dir.clone()) {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let threads = args.threads.unwrap_or(cfg.download_threads).max(1);
    tracing::info!(
        total,
        threads,
        dir = %download_dir.display(),
        quality = ?args.quality,
        "starting run"
    );

    let pipeline = Pipeline::from_config(
        cfg,
        args.quality,
        download_dir,
        Arc::new(store),
        host.clone(),
        browser_for(cfg),
    );
    let summary = run_workers(&pipeline, threads);

    // Dropping the last host handle closes the progress channel.
    drop(pipeline);
    let left = host.remaining();
    drop(host);
    let _ = printer.join();

    println!(
        "{} of {} item(s) processed: {} done, {} abandoned{}",
        summary.processed,
        total,
        summary.done,
        summary.abandoned,
        if running.is_running() {
            String::new()
        } else {
            format!(" (stopped, {} not started)", left)
        }
    );
    Ok(())
}
