//! Worker pool for per-level micronode processing
//!
//! Each level fans out one task per micronode onto a dedicated rayon pool
//! and blocks until all of them have finished. Level 0's parallel sorts and
//! refinement scoring run inside the same pool.

use lodcrate_core::{Error, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

pub const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Thread pool configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPoolConfig {
    /// Number of threads to use (None = logical CPU count)
    pub num_threads: Option<usize>,
    /// Thread stack size in bytes
    pub stack_size: Option<usize>,
    /// Thread name prefix
    pub thread_name_prefix: String,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            stack_size: Some(DEFAULT_STACK_SIZE),
            thread_name_prefix: "lodcrate-level".to_string(),
        }
    }
}

impl ThreadPoolConfig {
    /// Set number of threads
    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set stack size
    pub fn with_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }
}

/// A fixed-size pool owned by one build
#[derive(Debug)]
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(config: &ThreadPoolConfig) -> Result<Self> {
        let mut builder =
            ThreadPoolBuilder::new().num_threads(config.num_threads.unwrap_or_else(num_cpus::get));

        if let Some(stack_size) = config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        if !config.thread_name_prefix.is_empty() {
            let prefix = config.thread_name_prefix.clone();
            builder = builder.thread_name(move |index| format!("{}-{}", prefix, index));
        }

        let pool = builder
            .build()
            .map_err(|e| Error::Collaborator(format!("Failed to create thread pool: {}", e)))?;
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `op` inside the pool so nested rayon work uses its threads.
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Runs `task(i)` for every `i in 0..count` and waits for all of them.
    ///
    /// Results come back in index order whatever order the tasks finished
    /// in. The first error observed aborts the batch.
    pub fn fan_out<T, F>(&self, count: usize, task: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync + Send,
    {
        self.pool
            .install(|| (0..count).into_par_iter().map(&task).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lodcrate_core::ErrorKind;

    #[test]
    fn test_thread_pool_config() {
        let config = ThreadPoolConfig::default()
            .with_threads(4)
            .with_stack_size(16 * 1024 * 1024)
            .with_thread_name_prefix("test-pool");

        assert_eq!(config.num_threads, Some(4));
        assert_eq!(config.stack_size, Some(16 * 1024 * 1024));
        assert_eq!(config.thread_name_prefix, "test-pool");
    }

    #[test]
    fn test_pool_size() -> Result<()> {
        let pool = WorkerPool::new(&ThreadPoolConfig::default().with_threads(3))?;
        assert_eq!(pool.num_threads(), 3);
        Ok(())
    }

    #[test]
    fn test_threads_are_named() -> Result<()> {
        let pool = WorkerPool::new(&ThreadPoolConfig::default().with_threads(2))?;
        let names = pool.fan_out(4, |_| {
            Ok(std::thread::current().name().map(str::to_string))
        })?;
        for name in names {
            let name = name.unwrap_or_default();
            assert!(name.starts_with("lodcrate-level-"), "{}", name);
        }
        Ok(())
    }

    #[test]
    fn test_fan_out_keeps_order() -> Result<()> {
        let pool = WorkerPool::new(&ThreadPoolConfig::default().with_threads(4))?;
        let squares = pool.fan_out(100, |i| Ok(i * i))?;
        assert_eq!(squares, (0..100).map(|i| i * i).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_fan_out_propagates_errors() -> Result<()> {
        let pool = WorkerPool::new(&ThreadPoolConfig::default().with_threads(2))?;
        let result: Result<Vec<usize>> = pool.fan_out(10, |i| {
            if i == 7 {
                Err(Error::IntegrityViolation("task 7".to_string()))
            } else {
                Ok(i)
            }
        });
        assert_eq!(result.unwrap_err().kind(), ErrorKind::IntegrityViolation);
        Ok(())
    }
}
