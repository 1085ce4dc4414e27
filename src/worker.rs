/// Executors that run background loads
///
/// The coordinator never spawns work itself; it hands jobs to a `LoadExecutor`
/// chosen by the caller. Tests use the inline or deferred executors to run
/// loads deterministically.
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::error::{LoadError, Result};

pub type LoadJob = Box<dyn FnOnce() + Send + 'static>;

pub trait LoadExecutor: Send + Sync {
    /// Hand `job` off for execution. An error means the job was dropped
    /// without running.
    fn submit(&self, name: &str, job: LoadJob) -> Result<()>;
}

/// Runs the job on the calling thread before `submit` returns
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl LoadExecutor for InlineExecutor {
    fn submit(&self, _name: &str, job: LoadJob) -> Result<()> {
        job();
        Ok(())
    }
}

/// Queues jobs until `run_pending` is called
#[derive(Default, Clone)]
pub struct DeferredExecutor {
    queue: Arc<Mutex<Vec<LoadJob>>>,
}

impl DeferredExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Run every queued job (including jobs queued while running); returns
    /// how many ran
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let jobs: Vec<LoadJob> = {
                let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *queue)
            };
            if jobs.is_empty() {
                return ran;
            }
            for job in jobs {
                job();
                ran += 1;
            }
        }
    }
}

impl LoadExecutor for DeferredExecutor {
    fn submit(&self, _name: &str, job: LoadJob) -> Result<()> {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job);
        Ok(())
    }
}

/// One named OS thread per job
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl LoadExecutor for ThreadExecutor {
    fn submit(&self, name: &str, job: LoadJob) -> Result<()> {
        thread::Builder::new()
            .name(name.to_string())
            .spawn(job)
            .map(|_| ())
            .map_err(|e| LoadError::ScheduleFailed {
                message: format!("thread {name}: {e}"),
            })
    }
}

/// Bounded rayon pool; one pool may serve many coordinators
#[derive(Clone)]
pub struct PoolExecutor {
    pool: Arc<rayon::ThreadPool>,
}

impl PoolExecutor {
    pub fn new(threads: usize) -> std::result::Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("alignment-loader-{i}"))
            .build()?;
        Ok(PoolExecutor { pool: Arc::new(pool) })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl LoadExecutor for PoolExecutor {
    fn submit(&self, _name: &str, job: LoadJob) -> Result<()> {
        self.pool.spawn(job);
        Ok(())
    }
}
