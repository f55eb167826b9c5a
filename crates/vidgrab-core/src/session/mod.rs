//! Per-item session: current target, candidates, retry counters and the
//! persisted record handle.
//!
//! The orchestrator drives every transition through the methods here; the
//! counters and record are never touched from outside.

mod counters;
mod state;

pub use counters::{Ceilings, RetryCounters};
pub use state::{AbandonReason, IllegalTransition, SessionState};

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;

use crate::error_code::{action_for, ErrorCode, NegotiationError, RetryAction};
use crate::host::{Host, ProgressUpdate};
use crate::model::{DownloadItem, Quality, QualityCandidate};
use crate::negotiate::select_candidate;
use crate::progress::TransferProgress;
use crate::store::{DownloadRecord, NewRecord, RecordStore};

pub struct Session {
    target: DownloadItem,
    quality_override: Option<Quality>,
    preferred: Quality,
    candidates: Vec<QualityCandidate>,
    counters: RetryCounters,
    ceilings: Ceilings,
    continuation: bool,
    premium_active: bool,
    record: Option<DownloadRecord>,
    state: SessionState,
    primary_complete: bool,
    /// Partial bytes on disk belong to the record now held.
    resume_partial: bool,
    counted_finished: bool,
    in_flight: bool,
    store: Arc<dyn RecordStore>,
    host: Arc<dyn Host>,
}

impl Session {
    /// Start a session for `target` and count it as in flight on the host.
    pub fn begin(
        target: DownloadItem,
        quality_override: Option<Quality>,
        preferred: Quality,
        ceilings: Ceilings,
        store: Arc<dyn RecordStore>,
        host: Arc<dyn Host>,
    ) -> Self {
        host.increment_in_progress();
        Self {
            target,
            quality_override,
            preferred,
            candidates: Vec::new(),
            counters: RetryCounters::default(),
            ceilings,
            continuation: false,
            premium_active: false,
            record: None,
            state: SessionState::Idle,
            primary_complete: false,
            resume_partial: false,
            counted_finished: false,
            in_flight: true,
            store,
            host,
        }
    }

    pub fn target(&self) -> &DownloadItem {
        &self.target
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn counters(&self) -> RetryCounters {
        self.counters
    }

    pub fn ceilings(&self) -> &Ceilings {
        &self.ceilings
    }

    pub fn candidates(&self) -> &[QualityCandidate] {
        &self.candidates
    }

    pub fn continuation(&self) -> bool {
        self.continuation
    }

    pub fn premium_active(&self) -> bool {
        self.premium_active
    }

    pub fn record(&self) -> Option<&DownloadRecord> {
        self.record.as_ref()
    }

    pub fn primary_complete(&self) -> bool {
        self.primary_complete
    }

    /// True when the held record was already in progress for the same file,
    /// so its work file may be resumed. A fresh record starts from zero.
    pub fn resumes_partial(&self) -> bool {
        self.resume_partial
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Caller-forced quality, else the configured preference.
    pub fn quality(&self) -> Quality {
        self.quality_override.unwrap_or(self.preferred)
    }

    fn enter(&mut self, to: SessionState) {
        match self.state.transition(to) {
            Ok(next) => self.state = next,
            Err(e) => tracing::warn!(slug = %self.target.slug, "{}", e),
        }
    }

    fn persist(&self) {
        if let Some(rec) = &self.record {
            if let Err(e) = self.store.update(rec) {
                tracing::warn!(slug = %self.target.slug, "failed to persist record {}: {:#}", rec.id, e);
            }
        }
    }

    /// One status line per classified failure, to the log and the host.
    fn status(&self, code: ErrorCode, detail: Option<&str>) {
        tracing::warn!(
            slug = %self.target.slug,
            code = %code,
            general = self.counters.general,
            quality_detection = self.counters.quality_detection,
            "{}{}",
            code.status_line(),
            detail.map(|d| format!(" ({})", d)).unwrap_or_default()
        );
        self.host.report(ProgressUpdate::status(
            &self.target.slug,
            Some(self.quality()),
            code.status_line(),
        ));
    }

    /// With a caller-forced quality, finish immediately if that record is
    /// already complete. Never touches the network.
    pub fn quick_skip_if_already_complete(&mut self) -> Result<bool> {
        let Some(quality) = self.quality_override else {
            return Ok(false);
        };
        match self.store.find_by_slug(&self.target.slug, quality)? {
            Some(rec) if rec.completed => {
                tracing::info!(slug = %self.target.slug, %quality, "already complete, skipping");
                self.record = Some(rec);
                self.finalize();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// True when the item must be abandoned. A spent segmented counter is
    /// folded into the general counter first.
    pub fn reached_retry_ceiling(&mut self) -> bool {
        if self.counters.segmented_exhausted(&self.ceilings) {
            self.counters.general += 1;
            self.counters.segmented = 0;
        }
        self.counters.general_exhausted(&self.ceilings)
            || self.counters.quality_detection_exhausted(&self.ceilings)
    }

    /// Abandon reason matching the exhausted ceiling.
    pub fn exhausted_reason(&self) -> AbandonReason {
        if self.counters.general_exhausted(&self.ceilings) {
            AbandonReason::RetryCeiling
        } else {
            AbandonReason::QualityDetectionExhausted
        }
    }

    pub fn begin_negotiation(&mut self) {
        self.enter(SessionState::Negotiating);
    }

    pub fn set_candidates(&mut self, candidates: Vec<QualityCandidate>) {
        tracing::debug!(
            slug = %self.target.slug,
            count = candidates.len(),
            "negotiated candidates"
        );
        self.candidates = candidates;
    }

    pub fn has_primary_candidates(&self) -> bool {
        self.candidates.iter().any(|c| !c.secondary)
    }

    pub fn has_secondary_candidates(&self) -> bool {
        self.candidates.iter().any(|c| c.secondary)
    }

    /// Candidate to download next: the primary until it completes, then the
    /// continuation video if one was found.
    pub fn select(&self) -> Option<QualityCandidate> {
        select_candidate(&self.candidates, self.quality(), self.primary_complete).cloned()
    }

    /// Map a classified failure onto counters and return the action taken.
    pub fn apply(&mut self, err: &NegotiationError) -> RetryAction {
        let action = action_for(Some(err.code));
        self.status(err.code, err.detail.as_deref());
        match action {
            RetryAction::CountQualityDetection => self.counters.quality_detection += 1,
            RetryAction::ResetContinuation => {
                self.continuation = false;
                self.candidates.clear();
            }
            RetryAction::Transient => {}
            RetryAction::ExhaustQualityDetection => {
                self.counters.quality_detection = self.ceilings.quality_detection
            }
            RetryAction::CountGeneral => self.counters.general += 1,
            RetryAction::Terminal => self.abandon(AbandonReason::Terminal(err.code)),
        }
        action
    }

    /// Unclassified failure: one more general retry.
    pub fn count_general_retry(&mut self) {
        self.counters.general += 1;
    }

    pub fn drop_candidate(&mut self, candidate: &QualityCandidate) {
        self.candidates.retain(|c| c != candidate);
    }

    /// Size probes exhausted for `candidate`: drop it and count one general retry.
    pub fn size_probe_failed(&mut self, candidate: &QualityCandidate) {
        tracing::warn!(slug = %self.target.slug, quality = %candidate.quality, "size unknown after probing, dropping candidate");
        self.drop_candidate(candidate);
        self.counters.general += 1;
        self.enter(SessionState::Negotiating);
    }

    /// A segmented download of `candidate` failed (not stopped).
    ///
    /// At the segmented ceiling the candidate is dropped; once no primary
    /// candidate is left, the next negotiation targets the continuation frame.
    pub fn segmented_failed(&mut self, candidate: &QualityCandidate) {
        self.counters.segmented += 1;
        if !self.counters.segmented_exhausted(&self.ceilings) {
            return;
        }
        self.drop_candidate(candidate);
        if !candidate.secondary && !self.has_primary_candidates() {
            tracing::info!(slug = %self.target.slug, "no manifest candidates left, switching to continuation frame");
            self.candidates.clear();
            self.continuation = true;
        }
    }

    /// Returns true once premium login attempts are exhausted.
    pub fn premium_login_failed(&mut self) -> bool {
        self.counters.premium_login += 1;
        self.premium_login_exhausted()
    }

    pub fn premium_login_exhausted(&self) -> bool {
        self.counters.premium_exhausted(&self.ceilings)
    }

    pub fn premium_logged_in(&mut self) {
        self.premium_active = true;
    }

    fn record_names(&self, secondary: bool) -> (String, String) {
        if secondary {
            (
                format!("{}#part2", self.target.slug),
                self.target.continuation_name(),
            )
        } else {
            (self.target.slug.clone(), self.target.name.clone())
        }
    }

    /// Look up (slug, quality) or (name, quality) for the continuation video.
    ///
    /// Complete: finalize and return false. Incomplete: mark queued. Absent:
    /// create. Returns true iff the caller should transfer. Calling it again
    /// for the record already held is a no-op. See [`Session::resumes_partial`].
    pub fn create_or_resume_record(&mut self, quality: Quality, path: &Path, secondary: bool) -> Result<bool> {
        let (slug, name) = self.record_names(secondary);
        if let Some(rec) = &self.record {
            if rec.slug == slug && rec.quality == quality {
                self.resume_partial = !rec.completed && rec.path == path;
                return Ok(!rec.completed);
            }
            self.release_record();
        }

        let existing = if secondary {
            self.store.find_by_name(&name, quality)?
        } else {
            self.store.find_by_slug(&slug, quality)?
        };
        match existing {
            Some(rec) if rec.completed => {
                tracing::info!(slug = %slug, %quality, "record already complete");
                self.record = Some(rec);
                self.finalize();
                Ok(false)
            }
            Some(mut rec) => {
                self.resume_partial = rec.path == path;
                rec.queued = true;
                rec.downloading = false;
                rec.path = path.to_path_buf();
                self.record = Some(rec);
                self.persist();
                Ok(true)
            }
            None => {
                self.resume_partial = false;
                let rec = self.store.create(&NewRecord {
                    slug,
                    name,
                    quality,
                    path: path.to_path_buf(),
                })?;
                self.record = Some(rec);
                Ok(true)
            }
        }
    }

    pub fn await_size_probe(&mut self) {
        self.enter(SessionState::AwaitingSizeProbe);
    }

    /// Transfer starting; `size` is the expected total (0 if unknown).
    pub fn mark_downloading(&mut self, size: u64) {
        if let Some(rec) = &mut self.record {
            rec.queued = false;
            rec.downloading = true;
            if size > 0 {
                rec.size = size;
            }
        }
        self.persist();
        self.enter(SessionState::Transferring);
    }

    pub fn update_progress(&mut self, p: &TransferProgress) {
        if let Some(rec) = &mut self.record {
            rec.progress_text = p.status_line();
            rec.progress_secs = p.eta_secs().unwrap_or(0);
            if p.total > 0 {
                rec.size = p.total;
            }
        }
        self.persist();
        self.host.report(ProgressUpdate {
            slug: self.target.slug.clone(),
            quality: Some(self.quality()),
            text: p.status_line(),
            percent: Some(p.percent()),
            eta_secs: p.eta_secs(),
        });
    }

    pub fn update_percent(&mut self, percent: f64, eta_secs: Option<u64>) {
        let eta = eta_secs
            .map(crate::progress::format_eta)
            .unwrap_or_else(|| "?".to_string());
        let text = format!("{:.1}% ETA {}", percent, eta);
        if let Some(rec) = &mut self.record {
            rec.progress_text = text.clone();
            rec.progress_secs = eta_secs.unwrap_or(0);
        }
        self.persist();
        self.host.report(ProgressUpdate {
            slug: self.target.slug.clone(),
            quality: Some(self.quality()),
            text,
            percent: Some(percent),
            eta_secs,
        });
    }

    pub fn set_size(&mut self, size: u64) {
        if let Some(rec) = &mut self.record {
            rec.size = size;
        }
        self.persist();
    }

    pub fn set_merging(&mut self, merging: bool) {
        if let Some(rec) = &mut self.record {
            rec.merging = merging;
        }
        self.persist();
    }

    /// Mark the held record complete. The first completion counts the item
    /// as finished on the host.
    pub fn complete(&mut self, size: u64) {
        if let Some(rec) = &mut self.record {
            rec.completed = true;
            rec.queued = false;
            rec.downloading = false;
            rec.merging = false;
            rec.progress_text = "100.0%".to_string();
            rec.progress_secs = 0;
            if size > 0 {
                rec.size = size;
            }
        }
        self.persist();
        self.primary_complete = true;
        if !self.counted_finished {
            self.counted_finished = true;
            self.host.increment_finished();
        }
    }

    /// Transfer failed or stopped: back to queued (not downloading).
    pub fn revert_to_queued(&mut self) {
        if let Some(rec) = &mut self.record {
            rec.queued = true;
            rec.downloading = false;
            rec.merging = false;
        }
        self.persist();
        self.enter(SessionState::Negotiating);
    }

    /// Clear flags on the held record, persist, and drop the handle.
    pub fn release_record(&mut self) {
        if let Some(rec) = &mut self.record {
            rec.queued = false;
            rec.downloading = false;
            rec.merging = false;
        }
        self.persist();
        self.record = None;
    }

    /// Release the record and leave the host's in-flight count. Idempotent.
    pub fn finalize(&mut self) {
        self.release_record();
        if self.in_flight {
            self.in_flight = false;
            self.host.decrement_in_progress();
        }
        if !self.state.is_terminal() {
            self.enter(SessionState::Finalizing);
            self.enter(SessionState::Done);
        }
    }

    pub fn abandon(&mut self, reason: AbandonReason) {
        tracing::warn!(
            slug = %self.target.slug,
            general = self.counters.general,
            quality_detection = self.counters.quality_detection,
            "abandoning item: {}",
            reason
        );
        self.host.report(ProgressUpdate::status(
            &self.target.slug,
            Some(self.quality()),
            format!("abandoned: {}", reason),
        ));
        self.enter(SessionState::Abandoned(reason));
        self.finalize();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.in_flight {
            self.finalize();
        }
    }
}
