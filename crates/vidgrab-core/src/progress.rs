//! Transfer progress (bytes, speed, ETA) and the 1-second sampler that produces it.
//!
//! Progress is ephemeral: it is recomputed continuously during a transfer and
//! only flushed into the persisted record when the sampler emits a snapshot.

use std::time::{Duration, Instant};

/// Snapshot of one transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferProgress {
    /// Bytes on disk so far, including any resumed prefix.
    pub transferred: u64,
    /// Total expected bytes (0 if unknown).
    pub total: u64,
    /// Bytes per second over the last sampling window.
    pub speed: f64,
}

impl TransferProgress {
    /// Estimated seconds remaining (None if speed or total is unknown).
    pub fn eta_secs(&self) -> Option<u64> {
        if self.total == 0 {
            return None;
        }
        let remaining = self.total.saturating_sub(self.transferred);
        if remaining == 0 {
            return Some(0);
        }
        if self.speed <= 0.0 {
            return None;
        }
        Some((remaining as f64 / self.speed).ceil() as u64)
    }

    /// Percent complete in [0.0, 100.0].
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.transferred as f64 / self.total as f64 * 100.0).min(100.0)
    }

    /// Human-readable line stored in the record's progress text.
    pub fn status_line(&self) -> String {
        let eta = self
            .eta_secs()
            .map(format_eta)
            .unwrap_or_else(|| "?".to_string());
        format!(
            "{:.1}% {:.2} MiB/s ETA {}",
            self.percent(),
            self.speed / 1_048_576.0,
            eta
        )
    }
}

/// `65` -> `1m05s`, `3700` -> `1h01m40s`.
pub fn format_eta(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{}h{:02}m{:02}s", h, m, s)
    } else if m > 0 {
        format!("{}m{:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// Accumulates written chunks and emits a [`TransferProgress`] at most once per
/// interval. Speed is measured over the window that just closed.
#[derive(Debug)]
pub struct ProgressSampler {
    interval: Duration,
    window_start: Instant,
    window_bytes: u64,
    transferred: u64,
    total: u64,
    last_speed: f64,
}

impl ProgressSampler {
    pub fn new(interval: Duration, already: u64, total: u64) -> Self {
        Self::starting_at(interval, already, total, Instant::now())
    }

    pub fn starting_at(interval: Duration, already: u64, total: u64, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            window_bytes: 0,
            transferred: already,
            total,
            last_speed: 0.0,
        }
    }

    pub fn set_total(&mut self, total: u64) {
        self.total = total;
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// Record `n` freshly written bytes; returns a snapshot on a window boundary.
    pub fn record(&mut self, n: u64) -> Option<TransferProgress> {
        self.record_at(n, Instant::now())
    }

    pub fn record_at(&mut self, n: u64, now: Instant) -> Option<TransferProgress> {
        self.transferred += n;
        self.window_bytes += n;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }
        self.last_speed = self.window_bytes as f64 / elapsed.as_secs_f64();
        self.window_start = now;
        self.window_bytes = 0;
        Some(self.snapshot())
    }

    /// Current state regardless of window boundaries (used for the final report).
    pub fn snapshot(&self) -> TransferProgress {
        TransferProgress {
            transferred: self.transferred,
            total: self.total,
            speed: self.last_speed,
        }
    }
}
