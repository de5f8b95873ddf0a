//! Batch progress events published to subscribers and returned in reports.

use std::path::PathBuf;

use log::warn;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::error::{ErrorCode, PsdError, StoreError};

/// Stage of the per-file pipeline that failed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Read,
    Compute,
    Store,
    Task,
}

/// One file that could not be processed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileFailure {
    pub path: PathBuf,
    pub stage: FailureStage,
    /// Numeric error code, 0 when the task itself failed
    pub code: i32,
    pub message: String,
}

impl FileFailure {
    pub fn read(path: PathBuf, err: &StoreError) -> Self {
        Self::from_code(path, FailureStage::Read, err)
    }

    pub fn compute(path: PathBuf, err: &PsdError) -> Self {
        Self::from_code(path, FailureStage::Compute, err)
    }

    pub fn store(path: PathBuf, err: &StoreError) -> Self {
        Self::from_code(path, FailureStage::Store, err)
    }

    pub fn task(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            path,
            stage: FailureStage::Task,
            code: 0,
            message: reason.into(),
        }
    }

    fn from_code(path: PathBuf, stage: FailureStage, err: &dyn ErrorCode) -> Self {
        Self {
            path,
            stage,
            code: err.code(),
            message: err.message(),
        }
    }
}

/// One successfully processed file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSuccess {
    pub source: PathBuf,
    pub output: PathBuf,
}

/// Progress notifications of a batch run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum BatchEvent {
    Started {
        total: usize,
    },
    FileCompleted {
        source: PathBuf,
        output: PathBuf,
        completed: usize,
        total: usize,
    },
    FileFailed {
        failure: FileFailure,
        completed: usize,
        total: usize,
    },
    Finished {
        succeeded: usize,
        failed: usize,
        elapsed_ms: u64,
    },
}

/// Hand every event to `sink` until `Finished` arrives or the channel closes
///
/// Blocks the calling thread, so it must not run on a runtime worker. A
/// subscriber that falls behind skips the overwritten events and keeps
/// reading. Returns how many events were skipped.
pub fn drain_blocking<F>(mut rx: broadcast::Receiver<BatchEvent>, mut sink: F) -> u64
where
    F: FnMut(&BatchEvent),
{
    let mut skipped = 0;
    loop {
        match rx.blocking_recv() {
            Ok(event) => {
                sink(&event);
                if matches!(event, BatchEvent::Finished { .. }) {
                    break;
                }
            }
            Err(RecvError::Lagged(count)) => {
                warn!("Progress subscriber lagged, {} events skipped", count);
                skipped += count;
            }
            Err(RecvError::Closed) => break,
        }
    }
    skipped
}
