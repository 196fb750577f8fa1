use crossbeam::channel;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::libs::config::StoreConfig;
use crate::libs::error::{HicError, Result};
use crate::libs::matrix::Block;

pub type LoadJob = Box<dyn FnOnce() -> Result<Arc<Block>> + Send + 'static>;

/// One unit of work: decode (and possibly remap) a single block
pub struct LoadTask {
    /// Number of the empty block substituted when the job fails
    pub block_number: i64,
    pub job: LoadJob,
}

impl LoadTask {
    pub fn new<F>(block_number: i64, job: F) -> Self
    where
        F: FnOnce() -> Result<Arc<Block>> + Send + 'static,
    {
        LoadTask {
            block_number,
            job: Box::new(job),
        }
    }
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// One block per task, in completion order
    pub blocks: Vec<Arc<Block>>,
    pub failures: usize,
    pub timed_out: usize,
}

/// Bounded worker pool with join-all semantics.
///
/// Failed or abandoned tasks are replaced by empty blocks; the caller always
/// gets one block per task.
pub struct BlockLoader {
    pool: rayon::ThreadPool,
    timeout: Option<Duration>,
    max_reported_errors: usize,
}

impl BlockLoader {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.loader_threads)
            .thread_name(|i| format!("hicmx-loader-{}", i))
            .build()
            .map_err(|e| HicError::config(format!("Failed to create thread pool: {}", e)))?;
        Ok(BlockLoader {
            pool,
            timeout: config.fetch_timeout,
            max_reported_errors: config.max_reported_errors,
        })
    }

    pub fn load_all(&self, tasks: Vec<LoadTask>) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();
        if tasks.is_empty() {
            return outcome;
        }

        let numbers: Vec<i64> = tasks.iter().map(|t| t.block_number).collect();
        let (snd, rcv) = channel::unbounded();
        for (slot, task) in tasks.into_iter().enumerate() {
            let snd = snd.clone();
            let number = task.block_number;
            let job = task.job;
            self.pool.spawn(move || {
                // a panicking job still reports, as a failure
                let res = panic::catch_unwind(AssertUnwindSafe(job))
                    .unwrap_or_else(|_| Err(HicError::decode(number, "block load panicked")));
                // the receiver is gone once the caller gave up waiting
                let _ = snd.send((slot, res));
            });
        }
        drop(snd);

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut joined = vec![false; numbers.len()];
        let mut received = 0;
        while received < numbers.len() {
            let msg = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match rcv.recv_timeout(remaining) {
                        Ok(msg) => msg,
                        Err(_) => break,
                    }
                }
                None => match rcv.recv() {
                    Ok(msg) => msg,
                    Err(_) => break,
                },
            };

            let (slot, res) = msg;
            joined[slot] = true;
            received += 1;
            match res {
                Ok(block) => outcome.blocks.push(block),
                Err(e) => {
                    outcome.failures += 1;
                    if outcome.failures <= self.max_reported_errors {
                        log::warn!("Block {} failed to load: {}", numbers[slot], e);
                    }
                    outcome.blocks.push(Arc::new(Block::empty(numbers[slot])));
                }
            }
        }

        for (slot, done) in joined.iter().enumerate() {
            if !done {
                outcome.timed_out += 1;
                outcome.blocks.push(Arc::new(Block::empty(numbers[slot])));
            }
        }

        if outcome.failures > 0 {
            log::warn!("{} errors while reading blocks", outcome.failures);
        }
        if outcome.timed_out > 0 {
            log::warn!(
                "{} block loads abandoned after the fetch timeout",
                outcome.timed_out
            );
        }
        outcome
    }
}
