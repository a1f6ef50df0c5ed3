//! Batch dispatch from the corpus source into a sink.

use std::sync::Arc;

use ingestion_corpus::Artifact;
use ingestion_scheduling::Batch;
use storage_sink::{Sink, SinkContent, SinkError, SinkReceipt};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Which side of a transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Source,
    Sink,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub identity: String,
    pub stage: TransferStage,
    pub reason: String,
}

/// Per-batch tally. A batch counts as failed when `succeeded < total`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub succeeded: usize,
    pub total: usize,
    pub bytes_transferred: u64,
    pub failures: Vec<TransferFailure>,
}

impl DispatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total
    }

    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("sink unavailable for batch {sequence}: {source}")]
    SinkUnavailable {
        sequence: u64,
        #[source]
        source: SinkError,
    },
}

enum TransferError {
    Artifact(TransferFailure),
    SinkDown(SinkError),
}

#[derive(Debug)]
pub struct Dispatcher<S: Sink + ?Sized> {
    sink: Arc<S>,
}

impl<S: Sink + ?Sized> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S> Dispatcher<S>
where
    S: Sink + ?Sized,
{
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink }
    }

    /// Transfer every artifact of `batch` in order. Per-artifact failures are
    /// recorded in the outcome. The batch aborts when the sink is unreachable:
    /// a failed probe, a write reporting `SinkError::Unavailable`, or every
    /// artifact of the batch rejected by the sink.
    pub async fn dispatch(&self, batch: &Batch<'_>) -> Result<DispatchOutcome, DispatchError> {
        let sequence = batch.sequence();
        let unavailable = |source| DispatchError::SinkUnavailable { sequence, source };
        self.sink.probe().await.map_err(unavailable)?;

        let tick = batch
            .timestamp()
            .map(|ts| ts.format("%Y%m%d-%H").to_string())
            .unwrap_or_default();
        info!(
            batch = batch.sequence(),
            cycle = batch.cycle(),
            index = batch.index_in_cycle(),
            tick = %tick,
            artifacts = batch.len(),
            "dispatching batch"
        );
        if !batch.is_aligned() {
            warn!(
                batch = batch.sequence(),
                tick = %tick,
                "batch spans several timestamps; shard count may not match the corpus"
            );
        }

        let mut outcome = DispatchOutcome {
            total: batch.len(),
            ..DispatchOutcome::default()
        };
        for artifact in batch.artifacts() {
            match self.transfer(artifact).await {
                Ok(receipt) => {
                    debug!(identity = %receipt.identity, bytes = receipt.bytes, "copied");
                    outcome.succeeded += 1;
                    outcome.bytes_transferred += receipt.bytes;
                }
                Err(TransferError::SinkDown(source)) => {
                    error!(
                        identity = %artifact.identity(),
                        error = %source,
                        "sink went down mid-batch"
                    );
                    return Err(unavailable(source));
                }
                Err(TransferError::Artifact(failure)) => {
                    error!(
                        identity = %failure.identity,
                        stage = ?failure.stage,
                        reason = %failure.reason,
                        "failed to copy artifact"
                    );
                    outcome.failures.push(failure);
                }
            }
        }

        let sink_rejected = outcome
            .failures
            .iter()
            .filter(|failure| failure.stage == TransferStage::Sink)
            .count();
        if outcome.total > 0 && sink_rejected == outcome.total {
            let last = outcome
                .failures
                .last()
                .map(|failure| failure.reason.as_str())
                .unwrap_or_default();
            return Err(unavailable(SinkError::Unavailable(format!(
                "all {} writes rejected, last: {last}",
                outcome.total
            ))));
        }

        info!(
            batch = batch.sequence(),
            succeeded = outcome.succeeded,
            total = outcome.total,
            "batch completed: {}/{} files copied",
            outcome.succeeded,
            outcome.total
        );
        Ok(outcome)
    }

    async fn transfer(&self, artifact: &Artifact) -> Result<SinkReceipt, TransferError> {
        let identity = artifact.identity();
        let failure = |stage, reason: String| {
            TransferError::Artifact(TransferFailure {
                identity: identity.to_string(),
                stage,
                reason,
            })
        };
        let bytes = tokio::fs::read(&artifact.path).await.map_err(|err| {
            failure(
                TransferStage::Source,
                format!("{}: {err}", artifact.path.display()),
            )
        })?;
        let mut content = SinkContent::new(bytes);
        if let Ok(modified) = tokio::fs::metadata(&artifact.path)
            .await
            .and_then(|meta| meta.modified())
        {
            content = content.with_modified(modified);
        }
        self.sink
            .write(identity, &content)
            .await
            .map_err(|err| match err {
                SinkError::Unavailable(_) => TransferError::SinkDown(err),
                other => failure(TransferStage::Sink, other.to_string()),
            })
    }
}
