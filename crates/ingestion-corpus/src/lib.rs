//! Corpus indexing for shard extracts replayed by the feed simulator.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

mod naming;

pub use naming::{parse_artifact_name, NameError, NamingTemplate, ParsedName};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerConfig {
    #[serde(default)]
    pub naming: NamingTemplate,
}

/// Sort key for the timeline: timestamp first, shard second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArtifactKey {
    pub timestamp: NaiveDateTime,
    pub shard_id: u32,
}

/// One shard extract for one hour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub shard_id: u32,
    pub timestamp: NaiveDateTime,
    pub file_name: String,
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(shard_id: u32, timestamp: NaiveDateTime, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            shard_id,
            timestamp,
            file_name,
            path,
        }
    }

    #[must_use]
    pub const fn key(&self) -> ArtifactKey {
        ArtifactKey {
            timestamp: self.timestamp,
            shard_id: self.shard_id,
        }
    }

    /// Identity used when the artifact is written to a sink.
    pub fn identity(&self) -> &str {
        &self.file_name
    }
}

/// Immutable, time-ordered view of every artifact found at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    artifacts: Vec<Artifact>,
}

impl Corpus {
    /// Build a corpus, stable-sorting by `(timestamp, shard_id)`. Duplicates are kept.
    pub fn from_artifacts(mut artifacts: Vec<Artifact>) -> Self {
        artifacts.sort_by_key(Artifact::key);
        Self { artifacts }
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Number of complete ticks for `shard_count` shards; zero when `shard_count` is zero.
    pub fn complete_ticks(&self, shard_count: usize) -> usize {
        self.artifacts.len().checked_div(shard_count).unwrap_or(0)
    }

    /// Artifacts left over after the last complete tick.
    pub fn remainder(&self, shard_count: usize) -> usize {
        self.artifacts.len().checked_rem(shard_count).unwrap_or(0)
    }

    pub fn first_timestamp(&self) -> Option<NaiveDateTime> {
        self.artifacts.first().map(|artifact| artifact.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.artifacts.last().map(|artifact| artifact.timestamp)
    }

    pub fn distinct_timestamps(&self) -> usize {
        let mut count = 0;
        let mut previous = None;
        for artifact in &self.artifacts {
            if previous != Some(artifact.timestamp) {
                count += 1;
                previous = Some(artifact.timestamp);
            }
        }
        count
    }
}

/// Counts gathered during one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub indexed: usize,
    pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("corpus source {path} unavailable: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct CorpusIndexer {
    config: IndexerConfig,
}

impl CorpusIndexer {
    pub fn new(config: IndexerConfig) -> Self {
        Self { config }
    }

    pub fn index(&self, source: &Path) -> Result<Corpus, IndexError> {
        self.index_with_report(source).map(|(corpus, _)| corpus)
    }

    /// Scan `source` (non-recursively). Malformed names are logged and skipped;
    /// only an unreadable source directory is an error.
    pub fn index_with_report(&self, source: &Path) -> Result<(Corpus, IndexReport), IndexError> {
        let unavailable = |reason: String| IndexError::SourceUnavailable {
            path: source.to_path_buf(),
            reason,
        };
        let metadata = fs::metadata(source).map_err(|err| unavailable(err.to_string()))?;
        if !metadata.is_dir() {
            return Err(unavailable("not a directory".into()));
        }
        let entries = fs::read_dir(source).map_err(|err| unavailable(err.to_string()))?;

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(
                        source = %source.display(),
                        error = %err,
                        "skipping unreadable directory entry"
                    );
                    continue;
                }
            };
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !self.config.naming.is_candidate(&file_name) {
                debug!(file = %file_name, "ignoring non-artifact entry");
                continue;
            }
            // fs::metadata follows symlinks, DirEntry::metadata does not.
            match fs::metadata(entry.path()) {
                Ok(meta) if meta.is_file() => candidates.push((file_name, entry.path())),
                Ok(_) => debug!(file = %file_name, "ignoring non-file entry"),
                Err(err) => {
                    warn!(
                        file = %file_name,
                        error = %err,
                        "skipping artifact with unreadable metadata"
                    );
                }
            }
        }
        candidates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut report = IndexReport::default();
        let mut artifacts = Vec::with_capacity(candidates.len());
        for (file_name, path) in candidates {
            match parse_artifact_name(&file_name, &self.config.naming) {
                Ok(parsed) => {
                    artifacts.push(Artifact {
                        shard_id: parsed.shard_id,
                        timestamp: parsed.timestamp,
                        file_name,
                        path,
                    });
                    report.indexed += 1;
                }
                Err(reason) => {
                    warn!(file = %file_name, %reason, "skipping invalid artifact name");
                    report.skipped += 1;
                }
            }
        }

        let corpus = Corpus::from_artifacts(artifacts);
        info!(
            source = %source.display(),
            artifacts = corpus.len(),
            skipped = report.skipped,
            ticks = corpus.distinct_timestamps(),
            first = ?corpus.first_timestamp(),
            last = ?corpus.last_timestamp(),
            "corpus indexed"
        );
        Ok((corpus, report))
    }
}
