//! Acquisition pipeline: the per-item orchestrator and the worker pool that
//! runs one orchestrator per worker against the host's item supply.

mod movie;
mod pool;
mod worker;

pub use pool::{run_workers, RunSummary};

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::browser::SharedBrowser;
use crate::config::GrabConfig;
use crate::hls::{FfmpegMuxer, Muxer, NativeSegmentEngine, SegmentEngine};
use crate::host::Host;
use crate::model::Quality;
use crate::naming::{PathNamer, SeriesNamer};
use crate::negotiate::{PageNegotiator, QualityNegotiator};
use crate::progress::TransferProgress;
use crate::retry::{RetryPolicy, TransferError};
use crate::session::Ceilings;
use crate::store::RecordStore;
use crate::transport::{StreamOutcome, Transport};

/// Single-file source: size probes and resumable streaming.
pub trait ProgressiveSource: Send + Sync {
    fn probe_size(&self, url: &str, use_head: bool) -> u64;

    fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        resume_offset: u64,
        running: &dyn Fn() -> bool,
        on_progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<StreamOutcome, TransferError>;
}

impl ProgressiveSource for Transport {
    fn probe_size(&self, url: &str, use_head: bool) -> u64 {
        Transport::probe_size(self, url, use_head)
    }

    fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        resume_offset: u64,
        running: &dyn Fn() -> bool,
        on_progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<StreamOutcome, TransferError> {
        Transport::stream_to_file(self, url, dest, resume_offset, running, on_progress)
    }
}

/// Values every session of a run shares.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub preferred: Quality,
    /// Forces one tier for the whole run and enables the quick skip.
    pub quality_override: Option<Quality>,
    pub ceilings: Ceilings,
    pub min_plausible_size: u64,
    /// Pause between attempts after an anti-bot page.
    pub transient_backoff: RetryPolicy,
}

impl PipelineSettings {
    pub fn from_config(cfg: &GrabConfig, quality_override: Option<Quality>) -> Self {
        Self {
            preferred: cfg.preferred_quality,
            quality_override,
            ceilings: Ceilings::from(&cfg.retry),
            min_plausible_size: cfg.min_plausible_size,
            transient_backoff: cfg.retry.page_policy(),
        }
    }
}

/// Collaborators of one run. Shared read-only by every worker.
pub struct Pipeline {
    pub store: Arc<dyn RecordStore>,
    pub host: Arc<dyn Host>,
    pub negotiator: Box<dyn QualityNegotiator>,
    pub source: Box<dyn ProgressiveSource>,
    pub engine: Box<dyn SegmentEngine>,
    pub muxer: Box<dyn Muxer>,
    pub namer: Box<dyn PathNamer>,
    pub settings: PipelineSettings,
}

impl Pipeline {
    /// Default collaborators for `cfg`: curl transport, page negotiator, native
    /// HLS engine, ffmpeg muxer and series foldering under `download_dir`.
    pub fn from_config(
        cfg: &GrabConfig,
        quality_override: Option<Quality>,
        download_dir: PathBuf,
        store: Arc<dyn RecordStore>,
        host: Arc<dyn Host>,
        browser: SharedBrowser,
    ) -> Self {
        let transport = Transport::new(cfg.transport_options());
        Self {
            store,
            host,
            negotiator: Box::new(PageNegotiator::new(cfg, transport.clone(), browser)),
            engine: Box::new(NativeSegmentEngine::new(
                transport.clone(),
                cfg.retry.segment_policy(),
                cfg.segment_connections,
            )),
            source: Box::new(transport),
            muxer: Box::new(FfmpegMuxer::new(cfg.ffmpeg_program())),
            namer: Box::new(SeriesNamer::new(download_dir)),
            settings: PipelineSettings::from_config(cfg, quality_override),
        }
    }

    fn running(&self) -> bool {
        self.host.is_running()
    }

    /// Sleep for `total`, waking early once the run is stopped.
    fn pause(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while self.running() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(100)));
        }
    }
}

#[cfg(test)]
mod tests;
