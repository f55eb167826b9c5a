//! Ranged GET streamed to disk in fixed-size chunks.

use super::headers::parse_status_line;
use super::{Transport, CHUNK_SIZE};
use crate::progress::{ProgressSampler, TransferProgress};
use crate::retry::TransferError;
use std::cell::Cell;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// How a streamed transfer ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Server finished the body; `bytes` is the file size on disk.
    Completed { bytes: u64 },
    /// The running flag turned false; partial file kept for resume.
    Stopped { bytes: u64 },
}

impl Transport {
    /// Stream `url` into `dest`, appending from `resume_offset`.
    ///
    /// Sends `Range: bytes=<resume_offset>-` when resuming. `running` is polled
    /// before every chunk write; when it turns false the transfer stops, the
    /// file is flushed and [`StreamOutcome::Stopped`] is returned. `on_progress`
    /// fires at most once per configured interval. If the server ignores the
    /// range and answers 200, the file is truncated and rewritten from zero.
    pub fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        resume_offset: u64,
        running: &dyn Fn() -> bool,
        on_progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<StreamOutcome, TransferError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(dest)?;

        let mut easy = self.build_request(url, &self.options().user_agent, false, true)?;
        easy.buffer_size(CHUNK_SIZE)?;
        if resume_offset > 0 {
            easy.range(&format!("{}-", resume_offset))?;
        }

        let interval = self.options().progress_interval;
        let status = Cell::new(0u32);
        let declared = Cell::new(None::<u64>);
        let stopped = Cell::new(false);
        let mut storage_error: Option<std::io::Error> = None;
        let mut sampler = ProgressSampler::new(interval, resume_offset, 0);
        let mut base = resume_offset;
        let mut started = false;

        let perform_result = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(line) = std::str::from_utf8(data) {
                    let line = line.trim();
                    if let Some(code) = parse_status_line(line) {
                        status.set(code);
                        declared.set(None);
                    } else if let Some((name, value)) = line.split_once(':') {
                        if name.trim().eq_ignore_ascii_case("content-length") {
                            declared.set(value.trim().parse().ok());
                        }
                    }
                }
                true
            })?;
            transfer.write_function(|data| {
                if !running() {
                    stopped.set(true);
                    return Ok(0);
                }
                let code = status.get();
                if !(200..300).contains(&code) {
                    // Error body; discarded, the status is reported after perform.
                    return Ok(data.len());
                }
                if !started {
                    started = true;
                    if resume_offset > 0 && code == 200 {
                        tracing::debug!(url, "range ignored by server, restarting from zero");
                        if let Err(e) = file.set_len(0) {
                            storage_error = Some(e);
                            return Ok(0);
                        }
                        base = 0;
                        sampler = ProgressSampler::new(interval, 0, 0);
                    }
                    sampler.set_total(declared.get().map(|n| n + base).unwrap_or(0));
                }
                if let Err(e) = file.write_all(data) {
                    storage_error = Some(e);
                    return Ok(0);
                }
                if let Some(p) = sampler.record(data.len() as u64) {
                    on_progress(&p);
                }
                Ok(data.len())
            })?;
            transfer.perform()
        };

        let flushed = file.flush();
        if let Err(e) = perform_result {
            if e.is_write_error() {
                if stopped.get() {
                    flushed?;
                    let bytes = file.metadata()?.len();
                    tracing::debug!(url, bytes, "transfer stopped by caller");
                    return Ok(StreamOutcome::Stopped { bytes });
                }
                if let Some(io) = storage_error {
                    return Err(TransferError::Storage(io));
                }
            }
            return Err(TransferError::Curl(e));
        }
        flushed?;

        let code = easy.response_code()?;
        if code == 416 && resume_offset > 0 {
            // Nothing left past the offset: the partial file is already whole.
            return Ok(StreamOutcome::Completed {
                bytes: resume_offset,
            });
        }
        if !(200..300).contains(&code) {
            return Err(TransferError::Http(code));
        }

        let received = sampler.transferred() - base;
        if let Some(expected) = declared.get() {
            if received < expected {
                return Err(TransferError::PartialTransfer { expected, received });
            }
        }
        on_progress(&sampler.snapshot());
        Ok(StreamOutcome::Completed {
            bytes: file.metadata()?.len(),
        })
    }
}
