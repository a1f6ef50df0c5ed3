use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::SinkError;

fn encode_component(s: &str) -> String {
    // simple percent-encoding for path safety
    s.bytes()
        .flat_map(|b| match b {
            b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'-' | b'_' | b'.' => vec![b],
            _ => format!("%{:02X}", b).into_bytes(),
        })
        .map(|b| b as char)
        .collect()
}

/// Destination path for `identity`; always a direct child of `root`.
pub fn make_path(root: &Path, identity: &str) -> Result<PathBuf, SinkError> {
    if identity.is_empty() || identity == "." || identity == ".." {
        return Err(SinkError::InvalidIdentity(identity.to_string()));
    }
    Ok(root.join(encode_component(identity)))
}

// Leading dot keeps in-flight files out of downstream directory scans.
fn staging_path(root: &Path, identity: &str) -> PathBuf {
    root.join(format!(".{}.tmp", encode_component(identity)))
}

pub fn atomic_write_bytes(
    root: &Path,
    identity: &str,
    bytes: &[u8],
    modified: Option<SystemTime>,
) -> Result<PathBuf, SinkError> {
    let path = make_path(root, identity)?;
    let tmp = staging_path(root, identity);
    let staged = write_staging(&tmp, bytes, modified).and_then(|()| fs::rename(&tmp, &path));
    if let Err(err) = staged {
        // Staging file may or may not exist depending on where the write failed.
        let _ = fs::remove_file(&tmp);
        return Err(SinkError::Io(format!("{}: {err}", path.display())));
    }
    Ok(path)
}

fn write_staging(tmp: &Path, bytes: &[u8], modified: Option<SystemTime>) -> io::Result<()> {
    let mut f = File::create(tmp)?;
    f.write_all(bytes)?;
    if let Some(modified) = modified {
        f.set_modified(modified)?;
    }
    f.sync_all()
}

pub fn read_bytes(root: &Path, identity: &str) -> Result<Option<Vec<u8>>, SinkError> {
    let path = make_path(root, identity)?;
    let mut f = match File::open(&path) {
        Ok(f) => f,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(SinkError::Io(err.to_string())),
    };
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)
        .map_err(|err| SinkError::Io(err.to_string()))?;
    Ok(Some(buf))
}

/// Fails unless `root` is a directory that accepts a new file right now.
/// Mode bits alone miss read-only mounts and directories owned by someone else.
pub fn ensure_writable_dir(root: &Path) -> Result<(), SinkError> {
    let unavailable =
        |reason: String| SinkError::Unavailable(format!("{}: {reason}", root.display()));
    let metadata = fs::metadata(root).map_err(|err| unavailable(err.to_string()))?;
    if !metadata.is_dir() {
        return Err(unavailable("not a directory".into()));
    }
    if metadata.permissions().readonly() {
        return Err(unavailable("directory is read-only".into()));
    }
    let probe = root.join(format!(".sink-probe-{}.tmp", std::process::id()));
    File::create(&probe)
        .and_then(|mut f| f.write_all(b"probe"))
        .map_err(|err| {
            let _ = fs::remove_file(&probe);
            unavailable(format!("write test failed: {err}"))
        })?;
    fs::remove_file(&probe).map_err(|err| unavailable(format!("write test cleanup failed: {err}")))
}
