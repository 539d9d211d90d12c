///! Index-parallel work distribution

use rayon::prelude::*;

use crate::error::Error;

/// Worker pool, used for the lighting stages
pub struct ThreadPool {
    /// Underlying rayon pool
    pool: rayon::ThreadPool,
}

impl ThreadPool {
    /// Create pool. `threads == 0` means one thread per core.
    pub fn new(threads: usize) -> Result<Self, Error> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("wbspc-worker-{}", index))
            .build()
            .map_err(|err| Error::InvalidArgument(format!("can't start worker threads: {}", err)))?;

        log::debug!("{} worker threads", pool.current_num_threads());

        Ok(Self { pool })
    }

    /// Count of worker threads
    pub fn thread_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `work` for every index in `0..count`, results are placed by index
    pub fn run_on_indices<T, F>(&self, count: usize, work: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        self.pool.install(|| (0..count).into_par_iter().map(&work).collect())
    }

    /// Fallible version of `run_on_indices`, first error (by index) wins
    pub fn try_run_on_indices<T, F>(&self, count: usize, work: F) -> Result<Vec<T>, Error>
    where
        T: Send,
        F: Fn(usize) -> Result<T, Error> + Sync + Send,
    {
        self.run_on_indices(count, work).into_iter().collect()
    }
}


// threads.rs
