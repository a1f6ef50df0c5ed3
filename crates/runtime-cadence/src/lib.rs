//! Cadence driver that paces replay batches on a timer.

use std::time::Duration;

use ingestion_dispatch::{DispatchError, DispatchOutcome, Dispatcher};
use ingestion_scheduling::{BatchScheduler, SchedulerError, Transition};
use storage_sink::Sink;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

mod config;

pub use config::{ConfigError, ReplayConfig, RunMode};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    SingleShot,
}

/// Result of one scheduler + dispatcher round.
#[derive(Debug)]
struct TickReport {
    sequence: u64,
    wrapped: bool,
    outcome: DispatchOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    pub complete_ticks: u64,
    pub partial_ticks: u64,
    pub artifacts_transferred: u64,
    pub artifacts_failed: u64,
    pub wraps: u64,
    pub stop_reason: Option<StopReason>,
}

impl RunSummary {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        if report.outcome.is_complete() {
            self.complete_ticks += 1;
        } else {
            self.partial_ticks += 1;
        }
        if report.wrapped {
            self.wraps += 1;
        }
        self.artifacts_transferred += report.outcome.succeeded as u64;
        self.artifacts_failed += report.outcome.failed() as u64;
    }
}

/// Drives a scheduler and dispatcher either once or on a fixed interval.
///
/// All events are emitted inside the driver's `replay` span, tagged with a
/// per-run `run_id`.
#[derive(Debug)]
pub struct CadenceDriver<S: Sink + ?Sized> {
    scheduler: BatchScheduler,
    dispatcher: Dispatcher<S>,
    interval: Duration,
    run_id: Uuid,
    span: Span,
}

impl<S> CadenceDriver<S>
where
    S: Sink + ?Sized,
{
    pub fn new(scheduler: BatchScheduler, dispatcher: Dispatcher<S>, interval: Duration) -> Self {
        let run_id = Uuid::new_v4();
        let span = info_span!("replay", run_id = %run_id);
        Self {
            scheduler,
            dispatcher,
            interval,
            run_id,
            span,
        }
    }

    #[must_use]
    pub const fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run(
        &mut self,
        mode: RunMode,
        cancel: CancellationToken,
    ) -> Result<RunSummary, DriverError> {
        match mode {
            RunMode::Continuous => self.run_continuous(cancel).await,
            RunMode::SingleShot => {
                let report = self.run_once_report().await?;
                let mut summary = RunSummary::default();
                summary.record(&report);
                summary.stop_reason = Some(StopReason::SingleShot);
                Ok(summary)
            }
        }
    }

    /// Dispatch exactly one batch, without any waiting.
    pub async fn run_once(&mut self) -> Result<DispatchOutcome, DriverError> {
        self.run_once_report().await.map(|report| report.outcome)
    }

    async fn run_once_report(&mut self) -> Result<TickReport, DriverError> {
        let span = self.span.clone();
        async {
            info!("starting single-shot batch copy");
            let report = self.tick().await.inspect_err(|err| {
                error!(error = %err, "single-shot replay failed");
            })?;
            if report.outcome.is_complete() {
                info!(batch = report.sequence, "batch copy succeeded");
            } else {
                warn!(
                    batch = report.sequence,
                    failed = report.outcome.failed(),
                    "batch copy failed"
                );
            }
            Ok::<_, DriverError>(report)
        }
        .instrument(span)
        .await
    }

    /// Dispatch a batch, wait `interval`, repeat until `cancel` fires.
    ///
    /// Cancellation is only observed between ticks: a batch that has started
    /// always runs to completion. Scheduler or sink-level errors end the loop
    /// and are returned.
    pub async fn run_continuous(
        &mut self,
        cancel: CancellationToken,
    ) -> Result<RunSummary, DriverError> {
        let span = self.span.clone();
        async {
            info!(
                shards = self.scheduler.shard_count(),
                interval = %humantime::format_duration(self.interval),
                "starting continuous replay"
            );
            let mut summary = RunSummary::default();
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                info!(tick = summary.ticks + 1, "starting tick");
                match self.tick().await {
                    Ok(report) => summary.record(&report),
                    Err(err) => {
                        error!(
                            error = %err,
                            ticks = summary.ticks,
                            "replay stopped by fatal error"
                        );
                        return Err(err);
                    }
                }

                debug!(
                    interval = %humantime::format_duration(self.interval),
                    "waiting for next tick"
                );
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }

            summary.stop_reason = Some(StopReason::Cancelled);
            info!(
                ticks = summary.ticks,
                complete = summary.complete_ticks,
                partial = summary.partial_ticks,
                transferred = summary.artifacts_transferred,
                failed = summary.artifacts_failed,
                wraps = summary.wraps,
                "replay stopped by cancellation"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn tick(&mut self) -> Result<TickReport, DriverError> {
        let batch = self.scheduler.next_batch()?;
        let sequence = batch.sequence();
        let wrapped = matches!(batch.transition(), Transition::Wrapped { .. });
        let outcome = self.dispatcher.dispatch(&batch).await?;
        Ok(TickReport {
            sequence,
            wrapped,
            outcome,
        })
    }
}
