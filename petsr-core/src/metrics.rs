//! Pipeline metrics
//!
//! Counters, gauges and histograms rendered in Prometheus text format.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Anything that renders itself in Prometheus text format
pub trait Metric: Send + Sync {
    fn to_prometheus(&self) -> String;
}

fn header(name: &str, help: &str, kind: &str) -> String {
    format!("# HELP {} {}\n# TYPE {} {}\n", name, help, name, kind)
}

/// Counter metric (monotonically increasing)
pub struct Counter {
    value: AtomicU64,
    name: String,
    help: String,
}

impl Counter {
    /// Create a new counter
    pub fn new(name: &str, help: &str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Increment by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by delta
    pub fn inc_by(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Metric for Counter {
    fn to_prometheus(&self) -> String {
        header(&self.name, &self.help, "counter") + &format!("{} {}\n", self.name, self.get())
    }
}

/// Gauge metric (can go up or down)
pub struct Gauge {
    value: AtomicI64,
    name: String,
    help: String,
}

impl Gauge {
    /// Create a new gauge
    pub fn new(name: &str, help: &str) -> Self {
        Self {
            value: AtomicI64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Increment by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement by 1
    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Metric for Gauge {
    fn to_prometheus(&self) -> String {
        header(&self.name, &self.help, "gauge") + &format!("{} {}\n", self.name, self.get())
    }
}

/// Latency buckets in seconds; decode and transform times sit in the low
/// milliseconds, full-size JPEGs reach tenths of a second
const LATENCY_BUCKETS: &[f64] = &[0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0];

/// Histogram for latency measurements
///
/// Buckets are cumulative; the sum is kept in microseconds.
pub struct Histogram {
    buckets: Vec<(f64, AtomicU64)>,
    sum_micros: AtomicU64,
    count: AtomicU64,
    name: String,
    help: String,
}

impl Histogram {
    /// Histogram over the default latency buckets
    pub fn new(name: &str, help: &str) -> Self {
        Self::with_buckets(name, help, LATENCY_BUCKETS)
    }

    pub fn with_buckets(name: &str, help: &str, bounds: &[f64]) -> Self {
        Self {
            buckets: bounds.iter().map(|b| (*b, AtomicU64::new(0))).collect(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Record one value in seconds
    pub fn observe(&self, seconds: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add((seconds * 1_000_000.0) as u64, Ordering::Relaxed);
        for (_, count) in self.buckets.iter().filter(|(bound, _)| seconds <= *bound) {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Number of observations so far
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Metric for Histogram {
    fn to_prometheus(&self) -> String {
        let mut output = header(&self.name, &self.help, "histogram");
        for (bound, count) in &self.buckets {
            output.push_str(&format!(
                "{}_bucket{{le=\"{}\"}} {}\n",
                self.name,
                bound,
                count.load(Ordering::Relaxed)
            ));
        }
        // Cumulative +Inf bucket equals the total count
        output.push_str(&format!("{}_bucket{{le=\"+Inf\"}} {}\n", self.name, self.count()));

        let sum_secs = self.sum_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        output.push_str(&format!("{}_sum {}\n", self.name, sum_secs));
        output.push_str(&format!("{}_count {}\n", self.name, self.count()));
        output
    }
}

/// Standard pipeline metrics
pub mod standard {
    use super::*;
    use std::sync::LazyLock;

    pub static IMAGES_DECODED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("petsr_images_decoded_total", "Total number of images decoded")
    });

    pub static BYTES_READ: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("petsr_bytes_read_total", "Total encoded image bytes read from disk")
    });

    pub static ELEMENTS_MAPPED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("petsr_elements_mapped_total", "Elements through the per-element transforms")
    });

    pub static BATCHES_PRODUCED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("petsr_batches_produced_total", "Batches assembled by the producer")
    });

    pub static EPOCHS_COMPLETED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("petsr_epochs_completed_total", "Passes over the split")
    });

    pub static HOST_BUFFER_DEPTH: LazyLock<Gauge> = LazyLock::new(|| {
        Gauge::new("petsr_host_buffer_depth", "Batches waiting in the host prefetch buffer")
    });

    pub static DECODE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
        Histogram::new("petsr_decode_duration_seconds", "Image decode latency")
    });

    pub static ELEMENT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
        Histogram::new("petsr_element_duration_seconds", "Load plus transform latency per element")
    });
}

/// Render all standard metrics
pub fn gather_pipeline_metrics() -> String {
    let metrics: [&dyn Metric; 8] = [
        &*standard::IMAGES_DECODED,
        &*standard::BYTES_READ,
        &*standard::ELEMENTS_MAPPED,
        &*standard::BATCHES_PRODUCED,
        &*standard::EPOCHS_COMPLETED,
        &*standard::HOST_BUFFER_DEPTH,
        &*standard::DECODE_DURATION,
        &*standard::ELEMENT_DURATION,
    ];
    metrics.iter().map(|m| m.to_prometheus()).collect()
}
