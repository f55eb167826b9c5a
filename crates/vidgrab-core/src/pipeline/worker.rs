//! One item from start to finish.

use std::fs;
use std::io;
use std::path::Path;

use super::Pipeline;
use crate::error_code::{ErrorCode, NegotiationError, RetryAction};
use crate::hls::{MergeError, SegmentListener, SegmentedDownloader, SegmentedResult};
use crate::model::{Delivery, DownloadItem, QualityCandidate};
use crate::naming::partial_path;
use crate::negotiate::NegotiationRequest;
use crate::progress::TransferProgress;
use crate::retry::{is_connection_reset, TransferError};
use crate::session::{Session, SessionState};
use crate::transport::StreamOutcome;

/// How one transfer attempt ended.
enum Transfer {
    Complete { size: u64 },
    Stopped,
    /// Counters were updated; go round the loop again.
    Retry,
}

/// Persists segment engine events on the session record.
struct SessionListener<'s> {
    session: &'s mut Session,
}

impl SegmentListener for SessionListener<'_> {
    fn on_start(&mut self) {
        tracing::debug!(slug = %self.session.target().slug, "segment download started");
    }

    fn on_progress(&mut self, percent: f64, eta_secs: Option<u64>) {
        self.session.update_percent(percent, eta_secs);
    }

    fn on_size_known(&mut self, bytes: u64) {
        self.session.set_size(bytes);
    }

    fn on_merge_start(&mut self) {
        self.session.set_merging(true);
    }

    fn on_merge_finished(&mut self, error: Option<&MergeError>) {
        self.session.set_merging(false);
        if let Some(e) = error {
            tracing::warn!(slug = %self.session.target().slug, "merge failed: {}", e);
        }
    }
}

impl Pipeline {
    /// Run the orchestrator loop for `item` and return the final session state.
    pub fn process(&self, item: DownloadItem) -> SessionState {
        let s = &self.settings;
        let mut session = Session::begin(
            item,
            s.quality_override,
            s.preferred,
            s.ceilings,
            self.store.clone(),
            self.host.clone(),
        );
        let span = tracing::info_span!("item", slug = %session.target().slug);
        let _guard = span.enter();
        tracing::info!(name = %session.target().name, "processing");

        let mut transient = 0u32;
        while !session.is_finished() {
            if !self.running() {
                tracing::info!("run stopped, leaving item for the next run");
                session.finalize();
                break;
            }
            if session.reached_retry_ceiling() {
                let reason = session.exhausted_reason();
                session.abandon(reason);
                break;
            }
            let skip = if session.primary_complete() {
                Ok(false)
            } else {
                session.quick_skip_if_already_complete()
            };
            match skip {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("record lookup failed: {:#}", e);
                    session.count_general_retry();
                    continue;
                }
            }
            self.step(&mut session, &mut transient);
        }

        tracing::info!(state = ?session.state(), counters = ?session.counters(), "item finished");
        session.state()
    }

    /// One iteration: premium login, negotiation, selection, transfer.
    fn step(&self, session: &mut Session, transient: &mut u32) {
        if self.premium_step(session) {
            return;
        }

        if !session.primary_complete() && !session.has_primary_candidates() {
            session.begin_negotiation();
            let req = NegotiationRequest {
                item: session.target(),
                preferred: session.quality(),
                continuation: session.continuation(),
                premium: session.premium_active(),
            };
            let result = self.negotiator.negotiate(&req, &|| self.running());
            match result {
                Ok(candidates) if !candidates.is_empty() => session.set_candidates(candidates),
                Ok(_) => {
                    session.apply(&NegotiationError::with_detail(
                        ErrorCode::ManifestLinkFailed,
                        "no candidates",
                    ));
                    return;
                }
                Err(e) => {
                    if session.apply(&e) == RetryAction::Transient {
                        *transient += 1;
                        self.pause(self.settings.transient_backoff.backoff(*transient));
                    }
                    return;
                }
            }
        }

        let Some(candidate) = session.select() else {
            if session.primary_complete() {
                session.finalize();
            } else {
                session.count_general_retry();
            }
            return;
        };

        if candidate.needs_merge() && !self.muxer.is_available() {
            session.apply(&NegotiationError::new(ErrorCode::ExternalMergeToolMissing));
            return;
        }

        let dest = self.namer.destination(session.target(), candidate.secondary);
        match session.create_or_resume_record(candidate.quality, &dest, candidate.secondary) {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                tracing::warn!("record create failed: {:#}", e);
                session.count_general_retry();
                return;
            }
        }
        tracing::info!(
            quality = %candidate.quality,
            secondary = candidate.secondary,
            delivery = ?candidate.delivery,
            "downloading to {}",
            dest.display()
        );

        let outcome = match candidate.delivery {
            Delivery::Progressive => self.progressive(session, &candidate, &dest),
            Delivery::Manifest => self.segmented(session, &candidate, &dest),
        };
        match outcome {
            Transfer::Complete { size } => {
                session.complete(size);
                if !candidate.secondary && session.has_secondary_candidates() {
                    tracing::info!("continuation video found, downloading it next");
                } else {
                    session.finalize();
                }
            }
            Transfer::Stopped => {
                session.revert_to_queued();
                session.finalize();
            }
            Transfer::Retry => {}
        }
    }

    /// Declared size after up to `file_size` probes alternating HEAD and GET;
    /// 0 when none was plausible.
    fn probe(&self, url: &str) -> u64 {
        let min = self.settings.min_plausible_size;
        for attempt in 0..self.settings.ceilings.file_size {
            if !self.running() {
                break;
            }
            let use_head = attempt % 2 == 0;
            let size = self.source.probe_size(url, use_head);
            if size > min {
                return size;
            }
            tracing::debug!(attempt, use_head, size, "implausible size, probing again");
        }
        0
    }

    fn progressive(&self, session: &mut Session, candidate: &QualityCandidate, dest: &Path) -> Transfer {
        session.await_size_probe();
        let size = self.probe(&candidate.url);
        if size == 0 {
            if !self.running() {
                return Transfer::Stopped;
            }
            session.size_probe_failed(candidate);
            return Transfer::Retry;
        }

        if file_len(dest) == size {
            tracing::info!(bytes = size, "destination already complete");
            return Transfer::Complete { size };
        }

        let part = partial_path(dest, candidate.quality, Delivery::Progressive);
        if !session.resumes_partial() {
            discard(&part);
        }
        let mut offset = file_len(&part);
        if offset > size {
            tracing::info!(offset, size, "partial file larger than source, starting over");
            discard(&part);
            offset = 0;
        } else if offset > 0 {
            tracing::info!(offset, size, "resuming partial download");
        }

        let result = if offset == size {
            Ok(StreamOutcome::Completed { bytes: size })
        } else {
            session.mark_downloading(size);
            let running = || self.running();
            self.source.stream_to_file(
                &candidate.url,
                &part,
                offset,
                &running,
                &mut |p: &TransferProgress| session.update_progress(p),
            )
        };
        match result {
            Ok(StreamOutcome::Completed { bytes }) => match fs::rename(&part, dest) {
                Ok(()) => Transfer::Complete { size: bytes },
                Err(e) => {
                    self.transfer_failed(session, &TransferError::Storage(e));
                    Transfer::Retry
                }
            },
            Ok(StreamOutcome::Stopped { bytes }) => {
                tracing::info!(bytes, "transfer stopped, partial file kept");
                Transfer::Stopped
            }
            Err(e) => {
                self.transfer_failed(session, &e);
                Transfer::Retry
            }
        }
    }

    /// Unclassified transfer failure: back to queued, one general retry.
    /// Connection resets are expected and only logged at debug.
    fn transfer_failed(&self, session: &mut Session, e: &TransferError) {
        session.revert_to_queued();
        if is_connection_reset(e) {
            tracing::debug!("connection reset: {}", e);
        } else {
            tracing::warn!("transfer failed: {}", e);
        }
        session.count_general_retry();
    }

    fn segmented(&self, session: &mut Session, candidate: &QualityCandidate, dest: &Path) -> Transfer {
        session.mark_downloading(0);
        let downloader = SegmentedDownloader::new(
            self.engine.as_ref(),
            self.muxer.as_ref(),
            self.settings.min_plausible_size,
        );
        if !session.resumes_partial() {
            downloader.discard_partials(candidate, dest);
        }
        let running = || self.running();
        let result = {
            let mut listener = SessionListener { session: &mut *session };
            downloader.run(candidate, dest, &mut listener, &running)
        };
        match result {
            SegmentedResult::AlreadyComplete { size } => {
                tracing::info!(bytes = size, "destination already complete");
                Transfer::Complete { size }
            }
            SegmentedResult::Completed { size } => Transfer::Complete { size },
            SegmentedResult::Stopped => Transfer::Stopped,
            SegmentedResult::Failed(e) => {
                tracing::warn!(quality = %candidate.quality, "segmented download failed: {}", e);
                session.revert_to_queued();
                session.segmented_failed(candidate);
                Transfer::Retry
            }
            SegmentedResult::MergeToolMissing => {
                session.apply(&NegotiationError::new(ErrorCode::ExternalMergeToolMissing));
                Transfer::Retry
            }
        }
    }
}

fn file_len(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Remove a work file left by a transfer this record does not own.
fn discard(part: &Path) {
    match fs::remove_file(part) {
        Ok(()) => tracing::debug!("discarded stale partial {}", part.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("failed to remove {}: {}", part.display(), e),
    }
}
