//! Bounded-parallel execution of block writes with progress reporting.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use rayon::prelude::*;

use crate::{Error, Result};

/// Default cadence of progress reports.
pub const POLL_INTERVAL: Duration = Duration::from_millis(333);

/// Receives the completed fraction of a dataset write, in `[0, 1]`.
pub trait ProgressObserver: Send + Sync {
    fn report(&self, fraction: f64);
}

impl<F: Fn(f64) + Send + Sync> ProgressObserver for F {
    fn report(&self, fraction: f64) {
        self(fraction)
    }
}

/// Observer which ignores every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn report(&self, _fraction: f64) {}
}

/// Runs one task per block on a pool of exactly `threads` workers.
pub struct ChunkWriter<'a> {
    threads: usize,
    observer: &'a dyn ProgressObserver,
    poll_interval: Duration,
}

impl<'a> ChunkWriter<'a> {
    pub fn new(threads: usize, observer: &'a dyn ProgressObserver) -> Self {
        Self {
            threads: threads.max(1),
            observer,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run `task` for every item and wait for all of them.
    ///
    /// The first error is returned once in-flight tasks have finished;
    /// tasks not yet started are dropped. The observer always gets a final `1.0`.
    pub fn run<T, F>(&self, items: Vec<T>, task: F) -> Result<usize>
    where
        T: Send,
        F: Fn(T) -> Result<()> + Sync,
    {
        let total = items.len();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|i| format!("n5-export-{i}"))
            .build()
            .map_err(Error::wrap)?;
        let completed = AtomicUsize::new(0);
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let result = std::thread::scope(|s| {
            let completed = &completed;
            let observer = self.observer;
            let poll_interval = self.poll_interval;
            s.spawn(move || monitor(completed, total, done_rx, observer, poll_interval));

            let result = pool.install(|| {
                items.into_par_iter().try_for_each(|item| {
                    task(item)?;
                    completed.fetch_add(1, Ordering::Relaxed);
                    Ok(())
                })
            });
            drop(done_tx);
            result
        });

        self.observer.report(1.0);
        log::debug!(
            "{} of {total} tasks completed on {} threads",
            completed.load(Ordering::Relaxed),
            self.threads
        );
        result.map(|()| total)
    }
}

fn monitor(
    completed: &AtomicUsize,
    total: usize,
    done: Receiver<()>,
    observer: &dyn ProgressObserver,
    poll_interval: Duration,
) {
    loop {
        match done.recv_timeout(poll_interval) {
            Err(RecvTimeoutError::Timeout) => {}
            // the pool has drained
            _ => return,
        }
        let n = completed.load(Ordering::Relaxed);
        if n >= total {
            return;
        }
        observer.report(n as f64 / total as f64);
    }
}
