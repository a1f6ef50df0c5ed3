//! Destination sinks for replayed artifacts.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;

use async_trait::async_trait;
use tracing::debug;

mod error;
pub mod fs;

pub use error::SinkError;

/// Payload handed to a sink: the raw bytes plus metadata worth preserving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkContent {
    pub bytes: Vec<u8>,
    pub modified: Option<SystemTime>,
}

impl SinkContent {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            modified: None,
        }
    }

    #[must_use]
    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }
}

/// Acknowledgement for a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkReceipt {
    pub identity: String,
    pub bytes: u64,
    /// blake3 hex digest of the stored bytes.
    pub checksum: String,
}

impl SinkReceipt {
    fn for_content(identity: &str, bytes: &[u8]) -> Self {
        Self {
            identity: identity.to_string(),
            bytes: bytes.len() as u64,
            checksum: blake3::hash(bytes).to_hex().to_string(),
        }
    }
}

/// Write-side abstraction over the replay destination.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Store `content` under `identity`, replacing any previous copy.
    async fn write(
        &self,
        identity: &str,
        content: &SinkContent,
    ) -> Result<SinkReceipt, SinkError>;
    /// Fetch the stored bytes for `identity`.
    async fn read(&self, identity: &str) -> Result<Option<Vec<u8>>, SinkError>;
    /// Check that the sink can accept writes at all.
    async fn probe(&self) -> Result<(), SinkError>;
}

/// Directory-backed sink. Writes go through a staging file and a rename, so
/// readers scanning the directory never observe partial artifacts.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    /// Open `root`, creating it if absent.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|err| SinkError::Unavailable(format!("{}: {err}", root.display())))?;
        fs::ensure_writable_dir(&root)?;
        Ok(Self { root })
    }
}

async fn blocking<T, F>(task: F) -> Result<T, SinkError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SinkError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| SinkError::Io(format!("blocking task failed: {err}")))?
}

#[async_trait]
impl Sink for FsSink {
    async fn write(
        &self,
        identity: &str,
        content: &SinkContent,
    ) -> Result<SinkReceipt, SinkError> {
        let root = self.root.clone();
        let key = identity.to_string();
        let bytes = content.bytes.clone();
        let modified = content.modified;
        let receipt = SinkReceipt::for_content(identity, &content.bytes);
        let path = blocking(move || fs::atomic_write_bytes(&root, &key, &bytes, modified)).await?;
        debug!(identity, path = %path.display(), bytes = receipt.bytes, "artifact written");
        Ok(receipt)
    }

    async fn read(&self, identity: &str) -> Result<Option<Vec<u8>>, SinkError> {
        let root = self.root.clone();
        let key = identity.to_string();
        blocking(move || fs::read_bytes(&root, &key)).await
    }

    async fn probe(&self) -> Result<(), SinkError> {
        let root = self.root.clone();
        blocking(move || fs::ensure_writable_dir(&root)).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub modified: Option<SystemTime>,
}

/// In-memory sink for tests and dry runs, with hooks to script failures.
#[derive(Debug)]
pub struct MemorySink {
    inner: Mutex<HashMap<String, StoredObject>>,
    failing: Mutex<HashSet<String>>,
    available: AtomicBool,
    writes: AtomicUsize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// Toggle whole-sink availability; an unavailable sink fails probes and writes.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every write of `identity` fail until cleared.
    pub fn fail_identity(&self, identity: impl Into<String>) {
        if let Ok(mut guard) = self.failing.lock() {
            guard.insert(identity.into());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut guard) = self.failing.lock() {
            guard.clear();
        }
    }

    /// Number of write attempts, successful or not.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> HashMap<String, StoredObject> {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|guard| guard.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), SinkError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SinkError::Unavailable("memory sink offline".into()))
        }
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(
        &self,
        identity: &str,
        content: &SinkContent,
    ) -> Result<SinkReceipt, SinkError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let scripted_failure = self
            .failing
            .lock()
            .map_err(|e| SinkError::Io(e.to_string()))?
            .contains(identity);
        if scripted_failure {
            return Err(SinkError::Io(format!("scripted failure for {identity}")));
        }
        let mut guard = self.inner.lock().map_err(|e| SinkError::Io(e.to_string()))?;
        guard.insert(
            identity.to_string(),
            StoredObject {
                bytes: content.bytes.clone(),
                modified: content.modified,
            },
        );
        Ok(SinkReceipt::for_content(identity, &content.bytes))
    }

    async fn read(&self, identity: &str) -> Result<Option<Vec<u8>>, SinkError> {
        let guard = self.inner.lock().map_err(|e| SinkError::Io(e.to_string()))?;
        Ok(guard.get(identity).map(|object| object.bytes.clone()))
    }

    async fn probe(&self) -> Result<(), SinkError> {
        self.check_available()
    }
}
