//! Pipeline driver binary
//!
//! Builds one of the Oxford-IIIT Pet pipelines from environment
//! configuration, pulls batches as a training loop would, and reports
//! throughput and metrics.

use ndarray::Axis;
use petsr_core::data::batch::{array_to_image, Batch};
use petsr_core::runtime::RuntimeConfig;
use petsr_core::transform::to_rgb8;
use petsr_core::{
    oxford_iiit_pet_dataset, oxford_iiit_pet_dataset_d, DataLoader, DiscriminatorBatch, PipelineConfig,
    PipelineRuntime, SrBatch,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting petsr pipeline");

    // Load configuration: optional JSON file, then environment overrides
    let base = match std::env::var("PETSR_CONFIG") {
        Ok(path) => PipelineConfig::from_json_file(path)?,
        Err(_) => PipelineConfig::default(),
    };
    let config = base.with_env()?;
    let mode = std::env::var("PETSR_MODE").unwrap_or_else(|_| "sr".into());
    let steps: Option<u64> = std::env::var("PETSR_STEPS").ok().and_then(|v| v.parse().ok());
    let dump_dir = std::env::var("PETSR_DUMP_DIR").ok().map(PathBuf::from);

    info!("Reading dataset from {}", config.data_dir.display());

    let runtime = PipelineRuntime::new(RuntimeConfig::default())?;
    let outcome = runtime.block_on_io(async {
        match mode.as_str() {
            "sr" => {
                let (loader, count) = oxford_iiit_pet_dataset(&runtime, &config)?;
                drive(loader, count, steps, dump_dir.as_deref(), dump_sr).await
            }
            "discriminator" | "d" => {
                let (loader, count) = oxford_iiit_pet_dataset_d(&runtime, &config)?;
                drive(loader, count, steps, dump_dir.as_deref(), dump_discriminator).await
            }
            other => Err(petsr_core::PipelineError::InvalidConfig {
                reason: format!("unknown PETSR_MODE '{}', expected sr or discriminator", other),
            }),
        }
    });
    runtime.shutdown();

    if let Err(e) = outcome {
        error!("Pipeline failed: {}", e);
        return Err(e.into());
    }

    println!("{}", petsr_core::metrics::gather_pipeline_metrics());
    Ok(())
}

async fn drive<B, F>(
    mut loader: DataLoader<B>,
    count: usize,
    steps: Option<u64>,
    dump_dir: Option<&Path>,
    dump: F,
) -> petsr_core::Result<()>
where
    B: Batch,
    F: Fn(&B, &Path) -> petsr_core::Result<()>,
{
    let steps = steps.unwrap_or(loader.steps_per_epoch() as u64);
    info!("{} elements per epoch, pulling {} batches", count, steps);

    let start = Instant::now();
    let mut elements = 0usize;
    for step in 0..steps {
        let batch = loader.next_batch().await?;
        elements += batch.len();

        if step == 0 {
            info!("First batch after {:?}", start.elapsed());
            if let Some(dir) = dump_dir {
                std::fs::create_dir_all(dir).map_err(|e| petsr_core::PipelineError::ImageWrite {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                })?;
                dump(&batch, dir)?;
                info!("Wrote first batch to {}", dir.display());
            }
        }
        if (step + 1) % 50 == 0 {
            info!("Step {}/{}", step + 1, steps);
        }
    }

    let elapsed = start.elapsed();
    info!(
        "Pulled {} batches ({} elements) in {:?}: {:.1} elements/s",
        loader.batches_loaded(),
        elements,
        elapsed,
        elements as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    loader.shutdown().await;
    Ok(())
}

fn save(batch: ndarray::ArrayView4<'_, f32>, index: usize, path: PathBuf) -> petsr_core::Result<()> {
    let image = to_rgb8(&array_to_image(batch.index_axis(Axis(0), index))?);
    image.save(&path).map_err(|e| petsr_core::PipelineError::ImageWrite {
        path,
        reason: e.to_string(),
    })
}

fn dump_sr(batch: &SrBatch, dir: &Path) -> petsr_core::Result<()> {
    for i in 0..batch.len() {
        save(batch.lr.view(), i, dir.join(format!("{:03}_lr.png", i)))?;
        save(batch.hr.view(), i, dir.join(format!("{:03}_hr.png", i)))?;
    }
    Ok(())
}

fn dump_discriminator(batch: &DiscriminatorBatch, dir: &Path) -> petsr_core::Result<()> {
    for (i, label) in batch.labels.iter().enumerate() {
        save(batch.images.view(), i, dir.join(format!("{:03}_label{}.png", i, label)))?;
    }
    Ok(())
}
