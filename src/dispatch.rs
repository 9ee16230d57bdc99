//! Bounded parallel execution of per-region OCR work.
//!
//! Units run on a rayon pool sized to `max_threads`; without a limit they go to
//! the global pool. The call returns only once every unit has finished, so a
//! cycle never partially completes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Worker pool settings for dispatch cycles.
#[derive(Clone, Debug, Default)]
pub struct Dispatcher {
    /// `None` = global rayon pool
    max_threads: Option<usize>,
    pool: Option<Arc<ThreadPool>>,
}

impl Dispatcher {
    /// `Some(0)` is treated like `None` (unbounded).
    pub fn new(max_threads: Option<usize>) -> Self {
        let max_threads = max_threads.filter(|&n| n > 0);
        let pool = max_threads.and_then(|limit| {
            match ThreadPoolBuilder::new()
                .num_threads(limit)
                .thread_name(|i| format!("ocr-dispatch-{}", i))
                .build()
            {
                Ok(pool) => Some(Arc::new(pool)),
                Err(e) => {
                    log::error!("Failed to build a {}-thread OCR pool, using the global pool: {}", limit, e);
                    None
                }
            }
        });
        Self { max_threads, pool }
    }

    /// Changes the worker limit. Applies to cycles started afterwards.
    pub fn set_max_threads(&mut self, max_threads: Option<usize>) {
        if max_threads.filter(|&n| n > 0) != self.max_threads {
            *self = Self::new(max_threads);
        }
    }

    pub fn max_threads(&self) -> Option<usize> {
        self.max_threads
    }

    /// Number of workers used for `units` units of work.
    pub fn worker_count(&self, units: usize) -> usize {
        match self.max_threads {
            Some(limit) => limit.min(units),
            None => units.min(rayon::current_num_threads()),
        }
    }

    /// Runs `work` on every unit and returns results in unit order.
    ///
    /// A unit that panics yields `None`; the others are unaffected.
    pub fn run<J, R, F>(&self, units: &[J], work: F) -> Vec<Option<R>>
    where
        J: Sync,
        R: Send,
        F: Fn(&J) -> R + Sync,
    {
        if units.is_empty() {
            return Vec::new();
        }

        let job = || {
            units
                .par_iter()
                .enumerate()
                .map(|(idx, unit)| match panic::catch_unwind(AssertUnwindSafe(|| work(unit))) {
                    Ok(result) => Some(result),
                    Err(_) => {
                        log::error!("Dispatch unit {} panicked, recording no value", idx);
                        None
                    }
                })
                .collect::<Vec<Option<R>>>()
        };

        match &self.pool {
            Some(pool) => pool.install(job),
            None => job(),
        }
    }
}
