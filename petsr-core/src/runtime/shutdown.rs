//! Graceful shutdown handling
//!
//! Broadcast-based shutdown signaling for the pipeline stage tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Shutdown signal broadcaster
///
/// Stage tasks hold a receiver from [`ShutdownSignal::subscribe`] and stop
/// at their next await point once the signal fires.
pub struct ShutdownSignal {
    sender: Arc<broadcast::Sender<()>>,
    fired: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender: Arc::new(sender),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Trigger shutdown; later calls are no-ops
    pub fn shutdown(&self) {
        if !self.fired.swap(true, Ordering::AcqRel) {
            let _ = self.sender.send(());
        }
    }

    /// Whether shutdown has been triggered
    pub fn is_shutdown(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Create a new receiver for this signal
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Check if any receivers exist
    pub fn has_receivers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for ShutdownSignal {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            fired: self.fired.clone(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal() {
        let signal = ShutdownSignal::new();
        let mut receiver = signal.subscribe();
        
        // Spawn task waiting for shutdown
        let handle = tokio::spawn(async move {
            let _ = receiver.recv().await;
            42
        });
        
        // Trigger shutdown
        signal.shutdown();
        
        // Task should complete
        let result = handle.await.unwrap();
        assert_eq!(result, 42);
        assert!(signal.is_shutdown());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let signal = ShutdownSignal::new();
        let clone = signal.clone();
        let mut receiver = signal.subscribe();

        signal.shutdown();
        clone.shutdown();

        assert!(receiver.recv().await.is_ok());
        assert!(receiver.try_recv().is_err());
        assert!(clone.is_shutdown());
    }
}
