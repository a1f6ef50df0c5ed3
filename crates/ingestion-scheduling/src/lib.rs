//! Tick scheduling over an indexed corpus.
//!
//! The scheduler owns the corpus and a replay cursor. Each call to
//! [`BatchScheduler::next_batch`] hands out exactly `shard_count` consecutive
//! artifacts. Once the remaining tail is too short for a full tick the cursor
//! enters [`CursorState::Wrapped`] and the next batch restarts the corpus;
//! the short tail is not replayed on that pass.

use chrono::NaiveDateTime;
use ingestion_corpus::{Artifact, Corpus};
use thiserror::Error;
use tracing::{info, warn};

/// Replay cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// The next batch starts at `offset`.
    Advancing { offset: usize },
    /// The pass is exhausted; `dropped_tail` artifacts were left behind and
    /// the next batch restarts at the beginning of the corpus.
    Wrapped { dropped_tail: usize },
}

/// How a batch was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Advanced,
    Wrapped { dropped_tail: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    #[error("invalid configuration: shard count must be positive")]
    InvalidConfiguration,
    #[error("corpus is empty, nothing to replay")]
    EmptyCorpus,
    #[error("corpus holds {available} artifacts, fewer than one tick of {shard_count}")]
    InsufficientCorpus {
        available: usize,
        shard_count: usize,
    },
}

/// One tick worth of artifacts borrowed from the scheduler's corpus.
#[derive(Debug, Clone, Copy)]
pub struct Batch<'a> {
    sequence: u64,
    cycle: u64,
    index_in_cycle: usize,
    transition: Transition,
    artifacts: &'a [Artifact],
}

impl<'a> Batch<'a> {
    pub fn artifacts(&self) -> &'a [Artifact] {
        self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// 1-based count of batches issued by the scheduler so far.
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    /// 0-based pass over the corpus.
    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    /// 1-based position of this tick within the current pass.
    #[must_use]
    pub const fn index_in_cycle(&self) -> usize {
        self.index_in_cycle
    }

    #[must_use]
    pub const fn transition(&self) -> Transition {
        self.transition
    }

    /// Timestamp of the first artifact in the batch.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.artifacts.first().map(|artifact| artifact.timestamp)
    }

    /// True when every artifact shares the first artifact's timestamp.
    pub fn is_aligned(&self) -> bool {
        match self.timestamp() {
            Some(ts) => self.artifacts.iter().all(|artifact| artifact.timestamp == ts),
            None => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchScheduler {
    corpus: Corpus,
    shard_count: usize,
    state: CursorState,
    cycle: u64,
    issued: u64,
}

impl BatchScheduler {
    #[must_use]
    pub const fn new(corpus: Corpus, shard_count: usize) -> Self {
        Self {
            corpus,
            shard_count,
            state: CursorState::Advancing { offset: 0 },
            cycle: 0,
            issued: 0,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    #[must_use]
    pub const fn shard_count(&self) -> usize {
        self.shard_count
    }

    #[must_use]
    pub const fn state(&self) -> CursorState {
        self.state
    }

    /// Flat offset of the cursor into the corpus.
    pub fn cursor(&self) -> usize {
        match self.state {
            CursorState::Advancing { offset } => offset,
            CursorState::Wrapped { dropped_tail } => self.corpus.len() - dropped_tail,
        }
    }

    #[must_use]
    pub const fn cycle(&self) -> u64 {
        self.cycle
    }

    #[must_use]
    pub const fn issued(&self) -> u64 {
        self.issued
    }

    pub fn ticks_per_cycle(&self) -> usize {
        self.corpus.complete_ticks(self.shard_count)
    }

    pub fn dropped_per_cycle(&self) -> usize {
        self.corpus.remainder(self.shard_count)
    }

    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.shard_count == 0 {
            return Err(SchedulerError::InvalidConfiguration);
        }
        if self.corpus.is_empty() {
            return Err(SchedulerError::EmptyCorpus);
        }
        if self.corpus.len() < self.shard_count {
            return Err(SchedulerError::InsufficientCorpus {
                available: self.corpus.len(),
                shard_count: self.shard_count,
            });
        }
        Ok(())
    }

    pub fn next_batch(&mut self) -> Result<Batch<'_>, SchedulerError> {
        self.validate()?;
        let total = self.corpus.len();
        let n = self.shard_count;

        let (start, transition) = match self.state {
            CursorState::Advancing { offset } => (offset, Transition::Advanced),
            CursorState::Wrapped { dropped_tail } => {
                self.cycle += 1;
                info!(
                    cycle = self.cycle,
                    dropped_tail, "reached end of corpus, restarting from beginning"
                );
                if dropped_tail > 0 {
                    warn!(
                        dropped_tail,
                        shard_count = n,
                        "incomplete trailing tick skipped on this cycle"
                    );
                }
                (0, Transition::Wrapped { dropped_tail })
            }
        };

        let end = start + n;
        self.state = if end + n <= total {
            CursorState::Advancing { offset: end }
        } else {
            CursorState::Wrapped {
                dropped_tail: total - end,
            }
        };
        self.issued += 1;

        Ok(Batch {
            sequence: self.issued,
            cycle: self.cycle,
            index_in_cycle: end / n,
            transition,
            artifacts: &self.corpus.artifacts()[start..end],
        })
    }
}
