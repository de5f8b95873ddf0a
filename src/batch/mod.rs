//! Batch processing of many waveform files
//!
//! Each file is read, run through the [`PsdEngine`] and stored on tokio's
//! blocking pool; a semaphore bounds how many files are in flight. Progress
//! is published as [`BatchEvent`]s on a broadcast channel. A failing file is
//! recorded in the report and never stops the run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Semaphore};

use crate::config::BatchConfig;
use crate::error::{log_psd_error, log_store_error};
use crate::psd::PsdEngine;
use crate::store::{PsdStore, StoredPsd};
use crate::waveform::ReaderRegistry;

pub mod events;

pub use events::{drain_blocking, BatchEvent, FailureStage, FileFailure, FileSuccess};

/// Capacity of the progress channel; slow subscribers see `Lagged`
const EVENT_BUFFER: usize = 256;

/// Outcome of a batch run, in input order
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub succeeded: Vec<FileSuccess>,
    pub failed: Vec<FileFailure>,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Shared, read-only pieces every file task needs
struct Pipeline {
    registry: ReaderRegistry,
    engine: PsdEngine,
    store: PsdStore,
}

impl Pipeline {
    fn process(&self, path: &Path) -> Result<PathBuf, FileFailure> {
        let context = path.display().to_string();
        let segment = self.registry.read(path).map_err(|err| {
            log_store_error(&err, &context);
            FileFailure::read(path.to_path_buf(), &err)
        })?;
        let result = self.engine.compute(&segment).map_err(|err| {
            log_psd_error(&err, &context);
            FileFailure::compute(path.to_path_buf(), &err)
        })?;
        let stored = StoredPsd {
            channel: segment.channel().clone(),
            start_time: segment.start_time(),
            duration_s: segment.duration_s(),
            source: Some(path.to_path_buf()),
            result,
        };
        self.store.save(path, &stored).map_err(|err| {
            log_store_error(&err, &context);
            FileFailure::store(path.to_path_buf(), &err)
        })
    }
}

pub struct BatchRunner {
    pipeline: Arc<Pipeline>,
    max_parallel: usize,
    events: broadcast::Sender<BatchEvent>,
}

impl BatchRunner {
    pub fn new(registry: ReaderRegistry, engine: PsdEngine, store: PsdStore, config: &BatchConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            pipeline: Arc::new(Pipeline {
                registry,
                engine,
                store,
            }),
            max_parallel: config.max_parallel.max(1),
            events,
        }
    }

    /// Receive progress events of subsequent runs
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: BatchEvent) {
        // no subscriber is fine
        let _ = self.events.send(event);
    }

    /// Process `files`; per-file errors end up in the report
    pub async fn run(&self, files: Vec<PathBuf>) -> BatchReport {
        let started = Instant::now();
        let total = files.len();
        log::info!(
            "Batch started: {} files, up to {} in parallel",
            total,
            self.max_parallel
        );
        self.publish(BatchEvent::Started { total });

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = Vec::with_capacity(total);

        for path in files {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    tasks.push((path, None, Some(err.to_string())));
                    continue;
                }
            };
            let pipeline = Arc::clone(&self.pipeline);
            let events = self.events.clone();
            let completed = Arc::clone(&completed);
            let task_path = path.clone();

            let handle = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                let outcome = pipeline.process(&task_path);
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                let event = match &outcome {
                    Ok(output) => BatchEvent::FileCompleted {
                        source: task_path.clone(),
                        output: output.clone(),
                        completed: done,
                        total,
                    },
                    Err(failure) => BatchEvent::FileFailed {
                        failure: failure.clone(),
                        completed: done,
                        total,
                    },
                };
                let _ = events.send(event);
                outcome
            });
            tasks.push((path, Some(handle), None));
        }

        let mut report = BatchReport::default();
        for (path, handle, setup_error) in tasks {
            let outcome = match (handle, setup_error) {
                (Some(handle), _) => match handle.await {
                    Ok(outcome) => outcome,
                    Err(err) => Err(FileFailure::task(path.clone(), err.to_string())),
                },
                (None, reason) => Err(FileFailure::task(
                    path.clone(),
                    reason.unwrap_or_else(|| "not scheduled".to_string()),
                )),
            };
            match outcome {
                Ok(output) => report.succeeded.push(FileSuccess {
                    source: path,
                    output,
                }),
                Err(failure) => report.failed.push(failure),
            }
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "Batch finished: {} succeeded, {} failed in {} ms",
            report.succeeded.len(),
            report.failed.len(),
            report.elapsed_ms
        );
        self.publish(BatchEvent::Finished {
            succeeded: report.succeeded.len(),
            failed: report.failed.len(),
            elapsed_ms: report.elapsed_ms,
        });
        report
    }

    /// Run on a dedicated multi-threaded runtime
    pub fn run_blocking(&self, files: Vec<PathBuf>) -> anyhow::Result<BatchReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .max_blocking_threads(self.max_parallel)
            .enable_all()
            .build()
            .context("building batch runtime")?;
        Ok(runtime.block_on(self.run(files)))
    }
}
