use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics collector for the application.
///
/// Tracks inference and writer call counts, per-item latencies, and batch
/// outcomes. Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    inference_calls_total: AtomicUsize,
    inference_calls_failed: AtomicUsize,
    writer_calls_total: AtomicUsize,
    writer_calls_failed: AtomicUsize,

    images_processed: AtomicUsize,
    items_failed: AtomicUsize,
    items_skipped: AtomicUsize,

    batches_started: AtomicUsize,
    batches_completed: AtomicUsize,
    batches_cancelled: AtomicUsize,
    batches_interrupted: AtomicUsize,

    item_latency_ms: RwLock<Vec<u64>>,

    start_time: Instant,
}

/// Point-in-time view of the collected metrics.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub inference_calls_total: usize,
    pub inference_calls_failed: usize,
    pub writer_calls_total: usize,
    pub writer_calls_failed: usize,
    pub images_processed: usize,
    pub items_failed: usize,
    pub items_skipped: usize,
    pub batches_started: usize,
    pub batches_completed: usize,
    pub batches_cancelled: usize,
    pub batches_interrupted: usize,
    pub avg_item_latency_ms: f64,
    pub uptime_seconds: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                inference_calls_total: AtomicUsize::new(0),
                inference_calls_failed: AtomicUsize::new(0),
                writer_calls_total: AtomicUsize::new(0),
                writer_calls_failed: AtomicUsize::new(0),
                images_processed: AtomicUsize::new(0),
                items_failed: AtomicUsize::new(0),
                items_skipped: AtomicUsize::new(0),
                batches_started: AtomicUsize::new(0),
                batches_completed: AtomicUsize::new(0),
                batches_cancelled: AtomicUsize::new(0),
                batches_interrupted: AtomicUsize::new(0),
                item_latency_ms: RwLock::new(Vec::new()),
                start_time: Instant::now(),
            }),
        }
    }

    pub fn record_inference_call(&self, success: bool) {
        self.inner.inference_calls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.inference_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_writer_call(&self, success: bool) {
        self.inner.writer_calls_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.inner.writer_calls_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_item_processed(&self, duration: Duration) {
        self.inner.images_processed.fetch_add(1, Ordering::Relaxed);
        self.inner
            .item_latency_ms
            .write()
            .push(duration.as_millis() as u64);
    }

    pub fn record_item_failed(&self) {
        self.inner.items_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_item_skipped(&self) {
        self.inner.items_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_started(&self) {
        self.inner.batches_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_completed(&self) {
        self.inner.batches_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_cancelled(&self) {
        self.inner.batches_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_batch_interrupted(&self) {
        self.inner.batches_interrupted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let latencies = self.inner.item_latency_ms.read();
        let avg_item_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().sum::<u64>() as f64 / latencies.len() as f64
        };

        MetricsSnapshot {
            inference_calls_total: self.inner.inference_calls_total.load(Ordering::Relaxed),
            inference_calls_failed: self.inner.inference_calls_failed.load(Ordering::Relaxed),
            writer_calls_total: self.inner.writer_calls_total.load(Ordering::Relaxed),
            writer_calls_failed: self.inner.writer_calls_failed.load(Ordering::Relaxed),
            images_processed: self.inner.images_processed.load(Ordering::Relaxed),
            items_failed: self.inner.items_failed.load(Ordering::Relaxed),
            items_skipped: self.inner.items_skipped.load(Ordering::Relaxed),
            batches_started: self.inner.batches_started.load(Ordering::Relaxed),
            batches_completed: self.inner.batches_completed.load(Ordering::Relaxed),
            batches_cancelled: self.inner.batches_cancelled.load(Ordering::Relaxed),
            batches_interrupted: self.inner.batches_interrupted.load(Ordering::Relaxed),
            avg_item_latency_ms,
            uptime_seconds: self.inner.start_time.elapsed().as_secs(),
        }
    }

    /// Render the counters in Prometheus text exposition format.
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut out = String::new();

        let counters = [
            ("inference_calls_total", s.inference_calls_total),
            ("inference_calls_failed", s.inference_calls_failed),
            ("writer_calls_total", s.writer_calls_total),
            ("writer_calls_failed", s.writer_calls_failed),
            ("images_processed_total", s.images_processed),
            ("items_failed_total", s.items_failed),
            ("items_skipped_total", s.items_skipped),
            ("batches_started_total", s.batches_started),
            ("batches_completed_total", s.batches_completed),
            ("batches_cancelled_total", s.batches_cancelled),
            ("batches_interrupted_total", s.batches_interrupted),
        ];
        for (name, value) in counters {
            out.push_str(&format!("batch_lens_{name} {value}\n"));
        }
        out.push_str(&format!(
            "batch_lens_avg_item_latency_ms {:.2}\n",
            s.avg_item_latency_ms
        ));
        out.push_str(&format!("batch_lens_uptime_seconds {}\n", s.uptime_seconds));
        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
