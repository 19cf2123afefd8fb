//! Tokio runtime executor configuration
//!
//! Separate I/O and compute runtimes keep image decoding and resizing from
//! stalling the tasks that move batches between pipeline stages.

use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Handle, Runtime};

use crate::error::{PipelineError, Result};

/// Configuration for the pipeline runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Worker threads driving the stage tasks
    pub io_threads: usize,
    /// Worker threads of the compute runtime
    pub compute_threads: usize,
    /// Upper bound on blocking threads for element transforms
    pub max_blocking_threads: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let cpus = num_cpus::get();
        Self {
            io_threads: (cpus / 4).max(2),
            compute_threads: (cpus / 2).max(2),
            max_blocking_threads: cpus.max(4),
        }
    }
}

impl RuntimeConfig {
    /// Small runtime for tests and examples
    pub fn minimal() -> Self {
        Self {
            io_threads: 1,
            compute_threads: 1,
            max_blocking_threads: 2,
        }
    }
}

/// Dual-runtime executor
pub struct PipelineRuntime {
    /// Stage tasks: producer loop, device stage
    io_runtime: Runtime,
    /// Blocking pool for per-element transforms
    compute_runtime: Runtime,
    config: RuntimeConfig,
}

impl PipelineRuntime {
    /// Create a new runtime with the given configuration
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let io_runtime = Builder::new_multi_thread()
            .worker_threads(config.io_threads.max(1))
            .thread_name("petsr-io")
            .enable_all()
            .build()
            .map_err(|e| PipelineError::Internal {
                message: format!("Failed to create I/O runtime: {}", e),
            })?;

        let compute_runtime = Builder::new_multi_thread()
            .worker_threads(config.compute_threads.max(1))
            .max_blocking_threads(config.max_blocking_threads.max(1))
            .thread_name("petsr-compute")
            .enable_all()
            .build()
            .map_err(|e| PipelineError::Internal {
                message: format!("Failed to create compute runtime: {}", e),
            })?;

        Ok(Self {
            io_runtime,
            compute_runtime,
            config,
        })
    }

    /// Spawn a stage task
    pub fn spawn_io<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.io_runtime.spawn(future)
    }

    /// Run a future on the I/O runtime, blocking until complete
    pub fn block_on_io<F: std::future::Future>(&self, future: F) -> F::Output {
        self.io_runtime.block_on(future)
    }

    /// Handle of the compute runtime; element transforms go to its
    /// blocking pool
    pub fn compute_handle(&self) -> Handle {
        self.compute_runtime.handle().clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Shut down both runtimes without waiting for blocking work
    pub fn shutdown(self) {
        self.compute_runtime.shutdown_background();
        self.io_runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    }
}
