// Batch orchestrator: drives the per-image annotation pipeline
//
// One logical worker per run. Images are processed strictly sequentially —
// the local inference service is easy to overwhelm — and cancellation is
// cooperative: observed between items, forwarded into the in-flight
// generate call, never into a spawned writer process.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::core::errors::{BatchError, GenerateError, ProcessResult};
use crate::core::types::{BatchSnapshot, BatchStatus, Description};
use crate::services::metadata::MetadataWriter;
use crate::services::ollama::OllamaClient;
use crate::utils::Metrics;

/// Mutable state of the current (or last) batch run.
///
/// Owned by the orchestrator: the sequential run loop is the only writer,
/// the lock exists so the presentation layer can take read snapshots.
struct BatchState {
    status: BatchStatus,
    model: Option<String>,
    images: Vec<PathBuf>,
    results: HashMap<PathBuf, Description>,
    processed: usize,
    cancel: CancellationToken,
    log: Vec<String>,
}

impl BatchState {
    fn new() -> Self {
        Self {
            status: BatchStatus::Idle,
            model: None,
            images: Vec::new(),
            results: HashMap::new(),
            processed: 0,
            cancel: CancellationToken::new(),
            log: Vec::new(),
        }
    }

    fn push_log(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
    }
}

/// Main batch orchestrator
pub struct BatchOrchestrator {
    ollama: Arc<OllamaClient>,
    writer: Arc<MetadataWriter>,
    metrics: Metrics,
    state: Arc<RwLock<BatchState>>,
}

impl BatchOrchestrator {
    pub fn new(ollama: Arc<OllamaClient>, writer: Arc<MetadataWriter>, metrics: Metrics) -> Self {
        Self {
            ollama,
            writer,
            metrics,
            state: Arc::new(RwLock::new(BatchState::new())),
        }
    }

    /// Read-only view of the batch state for the presentation layer.
    pub fn snapshot(&self) -> BatchSnapshot {
        let state = self.state.read();
        BatchSnapshot {
            status: state.status,
            model: state.model.clone(),
            total: state.images.len(),
            processed: state.processed,
            results: state
                .results
                .iter()
                .map(|(path, desc)| (path.display().to_string(), desc.clone()))
                .collect(),
            log: state.log.clone(),
        }
    }

    /// Request cooperative cancellation of the active run.
    ///
    /// Returns false when no run is active. Takes effect at the next item
    /// boundary; the in-flight generate call is aborted through the token.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.write();
        if state.status != BatchStatus::Running {
            return false;
        }
        state.cancel.cancel();
        state.push_log("Cancelling batch...");
        info!("batch cancellation requested");
        true
    }

    /// Start a batch run over `images` with the selected `model`.
    ///
    /// Resets the processed count, installs a fresh cancellation token, and
    /// spawns the sequential run loop. Results recorded by earlier runs are
    /// retained, so previously annotated images are skipped.
    pub fn start_batch(
        self: &Arc<Self>,
        images: Vec<PathBuf>,
        model: String,
    ) -> Result<(), BatchError> {
        let cancel = {
            let mut state = self.state.write();
            if state.status == BatchStatus::Running {
                return Err(BatchError::AlreadyRunning);
            }
            let cancel = CancellationToken::new();
            state.status = BatchStatus::Running;
            state.model = Some(model.clone());
            state.images = images.clone();
            state.processed = 0;
            state.cancel = cancel.clone();
            state.push_log("Starting batch...");
            cancel
        };

        self.metrics.record_batch_started();
        info!("batch started: {} image(s), model {}", images.len(), model);

        let orchestrator = Arc::clone(self);
        let handle =
            tokio::spawn(async move { orchestrator.run_batch(images, model, cancel).await });

        // Supervisor: a panicking run loop is an orchestration-level failure,
        // surfaced as Interrupted rather than a clean terminal state
        let supervisor_state = Arc::clone(&self.state);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            if let Err(join_err) = handle.await {
                let err = BatchError::Interrupted(join_err.to_string());
                error!(kind = err.kind(), "{err}");
                let mut state = supervisor_state.write();
                state.status = BatchStatus::Interrupted;
                state.push_log("Batch interrupted.");
                metrics.record_batch_interrupted();
            }
        });

        Ok(())
    }

    /// Sequential run loop: skip-if-done → generate → write, per image.
    #[instrument(skip_all, fields(total = images.len(), model = %model))]
    async fn run_batch(&self, images: Vec<PathBuf>, model: String, cancel: CancellationToken) {
        for path in &images {
            // Idempotent skip: counted as done, not re-logged
            let already_done = {
                let mut state = self.state.write();
                if state.results.contains_key(path) {
                    state.processed += 1;
                    true
                } else {
                    false
                }
            };
            if already_done {
                self.metrics.record_item_skipped();
                continue;
            }

            if cancel.is_cancelled() {
                break;
            }

            let name = display_name(path);
            self.state.write().push_log(format!("Processing: {name}"));

            let started = Instant::now();
            match self.process_item(path, &model, &cancel).await {
                Ok(description) => {
                    let mut state = self.state.write();
                    state.results.insert(path.clone(), description);
                    state.processed += 1;
                    drop(state);
                    self.metrics.record_item_processed(started.elapsed());
                }
                Err(err) if err.is_cancelled() => {
                    // The post-loop check turns the run into Cancelled; the
                    // aborted item is logged as cancelled, not failed
                    self.state.write().push_log(format!("Cancelled: {name}"));
                    info!("cancelled in flight: {}", path.display());
                }
                Err(err) => {
                    warn!(kind = err.kind(), "item failed: {}: {err}", path.display());
                    self.state
                        .write()
                        .push_log(format!("Failed: {} - {}: {err}", path.display(), err.kind()));
                    self.metrics.record_item_failed();
                }
            }
        }

        let mut state = self.state.write();
        if cancel.is_cancelled() {
            state.status = BatchStatus::Cancelled;
            state.push_log("Batch cancelled.");
            drop(state);
            self.metrics.record_batch_cancelled();
            info!("batch cancelled");
        } else {
            state.status = BatchStatus::Completed;
            state.push_log("Batch complete.");
            drop(state);
            self.metrics.record_batch_completed();
            info!("batch complete");
        }
    }

    /// Process a single image outside of a batch run.
    ///
    /// Used by the presentation layer's "process one image" request. The
    /// result is recorded in the shared results mapping, so a later batch
    /// run skips the image.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn process_image(&self, path: &Path, model: &str) -> ProcessResult<Description> {
        let cancel = CancellationToken::new();
        let started = Instant::now();
        match self.process_item(path, model, &cancel).await {
            Ok(description) => {
                self.state
                    .write()
                    .results
                    .insert(path.to_path_buf(), description.clone());
                self.metrics.record_item_processed(started.elapsed());
                Ok(description)
            }
            Err(err) => {
                self.metrics.record_item_failed();
                Err(err)
            }
        }
    }

    /// One item through the pipeline: generate, then write.
    async fn process_item(
        &self,
        path: &Path,
        model: &str,
        cancel: &CancellationToken,
    ) -> ProcessResult<Description> {
        let generated = match self.ollama.generate_description(path, model, cancel).await {
            Ok(generated) => {
                self.metrics.record_inference_call(true);
                generated
            }
            Err(err) => {
                // File-validation errors never reached the service
                if matches!(
                    err,
                    GenerateError::ModelError { .. } | GenerateError::InferenceFailed(_)
                ) {
                    self.metrics.record_inference_call(false);
                }
                return Err(err.into());
            }
        };

        match self
            .writer
            .write_description(path, &generated.description.text)
            .await
        {
            Ok(()) => {
                self.metrics.record_writer_call(true);
                Ok(generated.description)
            }
            Err(err) => {
                self.metrics.record_writer_call(false);
                Err(err.into())
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
