//! Fixed-size worker pool: each worker pulls items from the host until the
//! supply is empty or the run is stopped.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::Pipeline;
use crate::session::SessionState;

/// Per-run totals across all workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Items taken from the host.
    pub processed: usize,
    pub done: usize,
    pub abandoned: usize,
}

#[derive(Default)]
struct Tally {
    processed: AtomicUsize,
    done: AtomicUsize,
    abandoned: AtomicUsize,
}

impl Tally {
    fn record(&self, state: SessionState) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        match state {
            SessionState::Done => self.done.fetch_add(1, Ordering::Relaxed),
            SessionState::Abandoned(_) => self.abandoned.fetch_add(1, Ordering::Relaxed),
            _ => 0,
        };
    }

    fn summary(&self) -> RunSummary {
        RunSummary {
            processed: self.processed.load(Ordering::Relaxed),
            done: self.done.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

fn worker_loop(pipeline: &Pipeline, tally: &Tally, worker: usize) {
    tracing::debug!(worker, "worker started");
    while pipeline.running() {
        let Some(item) = pipeline.host.next_item() else {
            break;
        };
        tally.record(pipeline.process(item));
    }
    tracing::debug!(worker, "worker exiting");
}

/// Run `threads` workers against `pipeline` and block until all have exited.
pub fn run_workers(pipeline: &Pipeline, threads: usize) -> RunSummary {
    let threads = threads.max(1);
    let tally = Tally::default();
    std::thread::scope(|s| {
        for worker in 0..threads {
            let tally = &tally;
            s.spawn(move || worker_loop(pipeline, tally, worker));
        }
    });
    let summary = tally.summary();
    tracing::info!(
        processed = summary.processed,
        done = summary.done,
        abandoned = summary.abandoned,
        "run finished"
    );
    summary
}
