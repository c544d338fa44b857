//! Parallel processing configuration and management
//!
//! This module provides abstractions for configuring Rayon's global thread pool,
//! which every lane reduction and the per-feature spatial loop run on.

use crate::errors::{ClimAggError, Result};
use rayon::ThreadPoolBuilder;
use std::fmt;

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelConfig {
    pub num_threads: Option<usize>,
}

impl ParallelConfig {
    /// Create a new parallel configuration
    #[must_use]
    pub fn new(num_threads: Option<usize>) -> Self {
        Self { num_threads }
    }

    /// Configuration that leaves Rayon's default pool untouched
    #[must_use]
    pub fn new_default() -> Self {
        Self { num_threads: None }
    }

    /// Create a configuration that uses all available CPU cores
    #[must_use]
    pub fn all_cores() -> Self {
        Self {
            num_threads: Some(num_cpus::get()),
        }
    }

    /// Create a configuration that uses a specific number of threads
    #[must_use]
    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            num_threads: Some(num_threads),
        }
    }

    /// Set up the global Rayon thread pool with the specified configuration
    ///
    /// # Errors
    ///
    /// Returns [`ClimAggError::ThreadPoolError`] for a zero thread count or if
    /// the global pool was already initialised.
    pub fn setup_global_pool(&self) -> Result<()> {
        match self.num_threads {
            Some(0) => Err(ClimAggError::ThreadPoolError(
                "Thread count must be at least 1".to_string(),
            )),
            Some(num_threads) => {
                ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build_global()
                    .map_err(|e| {
                        ClimAggError::ThreadPoolError(format!(
                            "Failed to initialize thread pool with {num_threads} threads: {e}"
                        ))
                    })?;
                tracing::info!(threads = num_threads, "configured parallel processing");
                Ok(())
            }
            None => {
                tracing::info!(threads = rayon::current_num_threads(), "using default thread pool");
                Ok(())
            }
        }
    }

    /// Get the current number of threads being used
    #[must_use]
    pub fn current_threads(&self) -> usize {
        rayon::current_num_threads()
    }
}

/// Get information about the current parallel configuration
#[must_use]
pub fn get_parallel_info() -> ParallelInfo {
    ParallelInfo {
        current_threads: rayon::current_num_threads(),
        available_cores: num_cpus::get(),
        available_parallelism: std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1),
    }
}

/// Information about the parallel processing environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelInfo {
    pub current_threads: usize,
    pub available_cores: usize,
    pub available_parallelism: usize,
}

impl fmt::Display for ParallelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Parallel Processing Information:")?;
        writeln!(f, "   Current threads: {}", self.current_threads)?;
        writeln!(f, "   Available CPU cores: {}", self.available_cores)?;
        write!(f, "   Available parallelism: {}", self.available_parallelism)
    }
}
