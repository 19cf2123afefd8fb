//! Batch loader
//!
//! Consumer-facing end of a pipeline: owns the stage tasks and hands out
//! device-placed batches.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

use super::batch::{Batch, Collate};
use super::dataset::{PetRecord, Split};
use super::device::{Device, DeviceTransfer};
use super::prefetcher::{ElementMapper, Prefetcher, PrefetcherConfig, Regroup};
use crate::error::{PipelineError, Result};
use crate::metrics::standard;
use crate::runtime::{PipelineRuntime, ShutdownSignal};

/// Configuration for the data loader
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Producer configuration
    pub prefetch: PrefetcherConfig,
    /// Host prefetch buffer in batches
    pub host_buffer: usize,
    /// Buffer after the device stage in batches
    pub device_buffer: usize,
}

/// Async batch loader
///
/// Batches arrive through two bounded buffers: the host prefetch buffer
/// filled by the producer, and the device buffer filled by the device stage.
pub struct DataLoader<B: Batch> {
    /// Device-placed batches
    receiver: mpsc::Receiver<Result<B>>,
    /// Elements per pass over the split as seen by the consumer
    element_count: usize,
    batch_size: usize,
    split: Split,
    device: Device,
    /// Total batches handed out
    batches_loaded: u64,
    /// Set once the stream ended or failed
    finished: bool,
    shutdown: ShutdownSignal,
    handles: Vec<JoinHandle<()>>,
}

impl<B: Batch> DataLoader<B> {
    /// Spawn the producer and device stage for `records`
    #[allow(clippy::too_many_arguments)]
    pub fn spawn<M, R>(
        runtime: &PipelineRuntime,
        records: Vec<PetRecord>,
        mapper: M,
        regroup: R,
        device: Arc<dyn DeviceTransfer<B>>,
        split: Split,
        element_count: usize,
        config: DataLoaderConfig,
    ) -> Self
    where
        M: ElementMapper,
        R: Regroup<M::Output>,
        R::Item: Collate<Output = B>,
    {
        let shutdown = ShutdownSignal::new();
        let (host_tx, host_rx) = mpsc::channel(config.host_buffer.max(1));
        let (device_tx, device_rx) = mpsc::channel(config.device_buffer.max(1));
        let batch_size = config.prefetch.batch_size;
        let target = device.device();

        let prefetcher = Prefetcher::new(
            Arc::new(records),
            Arc::new(mapper),
            regroup,
            host_tx,
            runtime.compute_handle(),
            shutdown.subscribe(),
            config.prefetch,
        );

        let producer = runtime.spawn_io(prefetcher.run());
        let placer = runtime.spawn_io(run_device_stage(host_rx, device_tx, device, shutdown.subscribe()));

        debug!(
            "DataLoader started for split {} ({} elements, host buffer {}, device {})",
            split, element_count, config.host_buffer, target
        );

        Self {
            receiver: device_rx,
            element_count,
            batch_size,
            split,
            device: target,
            batches_loaded: 0,
            finished: false,
            shutdown,
            handles: vec![producer, placer],
        }
    }

    /// Get the next batch
    ///
    /// A pipeline error is returned once; afterwards the loader reports
    /// [`PipelineError::DataExhausted`].
    pub async fn next_batch(&mut self) -> Result<B> {
        if self.finished {
            return Err(PipelineError::DataExhausted);
        }
        let item = self.receiver.recv().await;
        self.accept(item)
    }

    /// Try to get a batch without waiting
    pub fn try_next_batch(&mut self) -> Option<Result<B>> {
        if self.finished {
            return None;
        }
        match self.receiver.try_recv() {
            Ok(item) => Some(self.accept(Some(item))),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(self.accept(None)),
        }
    }

    fn accept(&mut self, item: Option<Result<B>>) -> Result<B> {
        match item {
            Some(Ok(batch)) => {
                self.batches_loaded += 1;
                Ok(batch)
            }
            Some(Err(e)) => {
                self.finished = true;
                Err(e)
            }
            None => {
                self.finished = true;
                Err(PipelineError::DataExhausted)
            }
        }
    }

    /// Elements per pass over the split
    pub fn element_count(&self) -> usize {
        self.element_count
    }

    /// Batches needed to cover one pass over the split
    pub fn steps_per_epoch(&self) -> usize {
        self.element_count.div_ceil(self.batch_size.max(1))
    }

    /// Get total batches loaded
    pub fn batches_loaded(&self) -> u64 {
        self.batches_loaded
    }

    pub fn split(&self) -> Split {
        self.split
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Get loader state for checkpointing
    pub fn state_dict(&self) -> DataLoaderState {
        DataLoaderState {
            split: self.split,
            element_count: self.element_count,
            batch_size: self.batch_size,
            batches_loaded: self.batches_loaded,
        }
    }

    /// Stop the stage tasks and wait for them
    pub async fn shutdown(mut self) {
        self.shutdown.shutdown();
        self.receiver.close();

        for handle in std::mem::take(&mut self.handles) {
            let _ = handle.await;
        }

        debug!("DataLoader shutdown complete, loaded {} batches", self.batches_loaded);
    }
}

impl<B: Batch> Drop for DataLoader<B> {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

/// Serializable state for checkpointing
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DataLoaderState {
    pub split: Split,
    pub element_count: usize,
    pub batch_size: usize,
    pub batches_loaded: u64,
}

/// Device stage: moves host batches through `device` into the final buffer
async fn run_device_stage<B: Batch>(
    mut input: mpsc::Receiver<Result<B>>,
    output: mpsc::Sender<Result<B>>,
    device: Arc<dyn DeviceTransfer<B>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let item = tokio::select! {
            _ = shutdown.recv() => break,
            item = input.recv() => item,
        };

        let placed = match item {
            Some(Ok(batch)) => {
                standard::HOST_BUFFER_DEPTH.dec();
                place(device.as_ref(), batch)
            }
            Some(Err(e)) => Err(e),
            None => break,
        };

        let failed = placed.is_err();
        let delivered = tokio::select! {
            _ = shutdown.recv() => false,
            result = output.send(placed) => result.is_ok(),
        };
        if failed || !delivered {
            break;
        }
    }

    let discarded = discard_pending(&mut input);
    debug!("Device stage for {} stopped, discarded {} host batches", device.device(), discarded);
}

/// Transfer one batch; the transfer must keep every element
fn place<B: Batch>(device: &dyn DeviceTransfer<B>, batch: B) -> Result<B> {
    let expected = batch.len();
    let placed = device.transfer(batch)?;
    if placed.len() != expected {
        return Err(PipelineError::DeviceTransfer {
            device: device.device().to_string(),
            reason: format!("batch of {} elements came back with {}", expected, placed.len()),
        });
    }
    Ok(placed)
}

/// Close the host buffer and drop what is still queued in it
fn discard_pending<B: Batch>(input: &mut mpsc::Receiver<Result<B>>) -> usize {
    input.close();
    let mut discarded = 0;
    while let Ok(item) = input.try_recv() {
        if item.is_ok() {
            standard::HOST_BUFFER_DEPTH.dec();
            discarded += 1;
        }
    }
    discarded
}
