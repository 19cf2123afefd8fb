//! Producer task
//!
//! Runs on the I/O runtime: walks the split in order (cycling when repeat is
//! on), keeps up to `num_parallel_calls` element transforms in flight on the
//! compute runtime, regroups and batches the results in record order, and
//! pushes batches into the bounded host prefetch buffer.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::batch::{Batcher, Collate};
use super::dataset::PetRecord;
use super::interleave::PairSampler;
use crate::error::{PipelineError, Result};
use crate::metrics::standard;

/// Per-element work: load and transform one record
pub trait ElementMapper: Send + Sync + 'static {
    type Output: Send + 'static;

    fn map(&self, record: &PetRecord, rng: &mut StdRng) -> Result<Self::Output>;
}

/// Turns mapped outputs into batchable elements
pub trait Regroup<In>: Send + 'static {
    type Item: Collate;

    /// Accept one mapped output, appending whatever is ready to `out`
    fn push(&mut self, input: In, out: &mut Vec<Self::Item>);

    /// Upstream ended; append everything still held
    fn drain(&mut self, out: &mut Vec<Self::Item>);
}

/// One mapped output is one element
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl<T: Collate> Regroup<T> for PassThrough {
    type Item = T;

    fn push(&mut self, input: T, out: &mut Vec<T>) {
        out.push(input);
    }

    fn drain(&mut self, _out: &mut Vec<T>) {}
}

impl<T: Collate> Regroup<(T, T)> for PairSampler<T> {
    type Item = T;

    fn push(&mut self, (left, right): (T, T), out: &mut Vec<T>) {
        PairSampler::push(self, left, right);
        while let Some(item) = self.next_ready() {
            out.push(item);
        }
    }

    fn drain(&mut self, out: &mut Vec<T>) {
        while let Some(item) = self.finish() {
            out.push(item);
        }
    }
}

/// Configuration for the producer
#[derive(Debug, Clone)]
pub struct PrefetcherConfig {
    /// Elements per batch
    pub batch_size: usize,
    /// Element transforms in flight
    pub num_parallel_calls: usize,
    /// Cycle the records indefinitely
    pub repeat: bool,
    /// Reshuffle record order each epoch
    pub shuffle: bool,
    /// Base seed for all randomness
    pub seed: u64,
}

/// Derive the RNG seed of one element so results do not depend on which
/// blocking thread runs it.
pub fn element_seed(seed: u64, epoch: u64, position: usize) -> u64 {
    seed ^ epoch.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ (position as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
}

/// Producer that feeds the host prefetch buffer
pub struct Prefetcher<M, R>
where
    M: ElementMapper,
    R: Regroup<M::Output>,
{
    records: Arc<Vec<PetRecord>>,
    mapper: Arc<M>,
    regroup: R,
    batcher: Batcher<R::Item>,
    sender: mpsc::Sender<Result<<R::Item as Collate>::Output>>,
    compute: Handle,
    shutdown: broadcast::Receiver<()>,
    config: PrefetcherConfig,
}

impl<M, R> Prefetcher<M, R>
where
    M: ElementMapper,
    R: Regroup<M::Output>,
{
    pub fn new(
        records: Arc<Vec<PetRecord>>,
        mapper: Arc<M>,
        regroup: R,
        sender: mpsc::Sender<Result<<R::Item as Collate>::Output>>,
        compute: Handle,
        shutdown: broadcast::Receiver<()>,
        config: PrefetcherConfig,
    ) -> Self {
        Self {
            records,
            mapper,
            regroup,
            batcher: Batcher::new(config.batch_size),
            sender,
            compute,
            shutdown,
            config,
        }
    }

    /// Run the producer loop until the stream ends, fails, or is cancelled
    pub async fn run(mut self) {
        debug!(
            "Prefetcher starting with {} records, {} parallel calls",
            self.records.len(),
            self.config.num_parallel_calls
        );

        match self.produce().await {
            Ok(true) => debug!("Prefetcher completed"),
            Ok(false) => debug!("Prefetcher stopped"),
            Err(e) => {
                error!("Pipeline failed: {}", e);
                // Best effort: the consumer may already be gone.
                let _ = self.sender.send(Err(e)).await;
            }
        }
    }

    /// Returns `Ok(true)` when the stream ran to completion, `Ok(false)`
    /// when the consumer went away or shutdown fired.
    ///
    /// The window of in-flight elements keeps filling across epoch
    /// boundaries. Regrouping is drained at every boundary, so no element
    /// of one epoch is emitted after an element of the next.
    async fn produce(&mut self) -> Result<bool> {
        if self.records.is_empty() {
            return Err(PipelineError::DatasetNotFound {
                path: Default::default(),
                reason: "split has no records".into(),
            });
        }

        let mut order: Vec<usize> = (0..self.records.len()).collect();
        let mut shuffle_rng = StdRng::seed_from_u64(self.config.seed);
        if self.config.shuffle {
            order.shuffle(&mut shuffle_rng);
        }

        let mut in_flight: VecDeque<(u64, JoinHandle<Result<M::Output>>)> = VecDeque::new();
        let mut ready = Vec::new();
        // Epoch and position of the next element to spawn
        let mut spawn_epoch = 0u64;
        let mut next = 0usize;
        // Epoch of the elements currently being regrouped
        let mut epoch = 0u64;

        loop {
            while in_flight.len() < self.config.num_parallel_calls.max(1) {
                if next == order.len() {
                    if !self.config.repeat {
                        break;
                    }
                    spawn_epoch += 1;
                    next = 0;
                    if self.config.shuffle {
                        order.shuffle(&mut shuffle_rng);
                    }
                }
                let handle = self.spawn_element(order[next], spawn_epoch, next);
                in_flight.push_back((spawn_epoch, handle));
                next += 1;
            }

            let Some((element_epoch, handle)) = in_flight.pop_front() else {
                break;
            };

            if element_epoch != epoch {
                if !self.finish_epoch(&mut ready, epoch).await? {
                    return Ok(false);
                }
                epoch = element_epoch;
            }

            let joined = tokio::select! {
                _ = self.shutdown.recv() => return Ok(false),
                joined = handle => joined,
            };
            let output = joined.map_err(|e| PipelineError::Internal {
                message: format!("element task failed: {}", e),
            })??;

            self.regroup.push(output, &mut ready);
            if !self.emit_ready(&mut ready, epoch).await? {
                return Ok(false);
            }
        }

        if !self.finish_epoch(&mut ready, epoch).await? {
            return Ok(false);
        }
        if let Some(batch) = self.batcher.flush(epoch)? {
            if !self.send(batch).await {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Emit everything regrouping still holds for `epoch`
    async fn finish_epoch(&mut self, ready: &mut Vec<R::Item>, epoch: u64) -> Result<bool> {
        self.regroup.drain(ready);
        if !self.emit_ready(ready, epoch).await? {
            return Ok(false);
        }
        standard::EPOCHS_COMPLETED.inc();
        info!("Epoch {} complete ({} records)", epoch, self.records.len());
        Ok(true)
    }

    fn spawn_element(&self, index: usize, epoch: u64, position: usize) -> JoinHandle<Result<M::Output>> {
        let records = self.records.clone();
        let mapper = self.mapper.clone();
        let seed = element_seed(self.config.seed, epoch, position);

        self.compute.spawn_blocking(move || {
            let start = Instant::now();
            let mut rng = StdRng::seed_from_u64(seed);
            let output = mapper.map(&records[index], &mut rng);
            standard::ELEMENTS_MAPPED.inc();
            standard::ELEMENT_DURATION.observe(start.elapsed().as_secs_f64());
            output
        })
    }

    async fn emit_ready(&mut self, ready: &mut Vec<R::Item>, epoch: u64) -> Result<bool> {
        for item in ready.drain(..) {
            if let Some(batch) = self.batcher.push(item, epoch)? {
                if !self.send(batch).await {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    async fn send(&mut self, batch: <R::Item as Collate>::Output) -> bool {
        standard::BATCHES_PRODUCED.inc();
        standard::HOST_BUFFER_DEPTH.inc();
        let sent = tokio::select! {
            _ = self.shutdown.recv() => false,
            result = self.sender.send(Ok(batch)) => result.is_ok(),
        };
        if !sent {
            standard::HOST_BUFFER_DEPTH.dec();
            debug!("Prefetcher: consumer dropped, stopping");
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_seed_varies() {
        let a = element_seed(42, 0, 0);
        let b = element_seed(42, 0, 1);
        let c = element_seed(42, 1, 0);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_eq!(element_seed(42, 3, 9), element_seed(42, 3, 9));
    }

    #[test]
    fn test_pair_sampler_regroup_drains_everything() {
        use super::super::batch::{Label, LabeledImage};
        use crate::transform::FloatImage;
        use rand::SeedableRng;

        let mut sampler = PairSampler::new(StdRng::seed_from_u64(4));
        let mut out = Vec::new();
        let image = || FloatImage::new(2, 2);
        for _ in 0..5 {
            Regroup::push(
                &mut sampler,
                (
                    LabeledImage { image: image(), label: Label::Real },
                    LabeledImage { image: image(), label: Label::Bicubic },
                ),
                &mut out,
            );
        }
        Regroup::<(LabeledImage, LabeledImage)>::drain(&mut sampler, &mut out);

        assert_eq!(out.len(), 10);
        let real = out.iter().filter(|e| e.label == Label::Real).count();
        assert_eq!(real, 5);
    }

    struct SlowMapper {
        active: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
    }

    impl ElementMapper for SlowMapper {
        type Output = super::super::batch::SrPair;

        fn map(&self, _record: &PetRecord, _rng: &mut StdRng) -> Result<Self::Output> {
            use std::sync::atomic::Ordering;
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            self.active.fetch_sub(1, Ordering::SeqCst);
            let image = crate::transform::FloatImage::new(2, 2);
            Ok(super::super::batch::SrPair {
                lr: image.clone(),
                hr: image,
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_window_spans_epochs() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let record = PetRecord::parse_line("Bengal_1 6 1 2", std::path::Path::new("images"))
            .unwrap()
            .unwrap();
        let mapper = Arc::new(SlowMapper {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let (tx, mut rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let prefetcher = Prefetcher::new(
            Arc::new(vec![record]),
            mapper.clone(),
            PassThrough,
            tx,
            Handle::current(),
            shutdown_rx,
            PrefetcherConfig {
                batch_size: 1,
                num_parallel_calls: 4,
                repeat: true,
                shuffle: false,
                seed: 0,
            },
        );
        let task = tokio::spawn(prefetcher.run());

        // One record per epoch: only a window that runs ahead into later
        // epochs can have more than one element in flight.
        for epoch in 0..8u64 {
            let batch = rx.recv().await.unwrap().unwrap();
            assert_eq!(batch.epoch, epoch);
        }
        assert!(mapper.peak.load(Ordering::SeqCst) > 1);

        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
