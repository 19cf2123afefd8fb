//! Async runtime management
//!
//! Dual Tokio runtimes: one drives the pipeline stages, the other runs
//! decoding and augmentation on its blocking pool.

pub mod executor;
pub mod shutdown;

pub use executor::{PipelineRuntime, RuntimeConfig};
pub use shutdown::ShutdownSignal;
