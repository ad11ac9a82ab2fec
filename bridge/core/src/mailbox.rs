use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Errors raised by mailbox storage.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// Filesystem access failed for a reason other than the slot being empty.
    #[error("mailbox I/O failed at {}: {source}", path.display())]
    Io {
        /// File the operation targeted.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The record could not be serialized.
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl MailboxError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Single-slot byte mailbox shared by one producer and one consumer.
///
/// `put` replaces the slot contents atomically from a reader's point of view.
/// Readers may still observe bytes that do not decode (for example when a
/// foreign writer does not rename into place) and must treat that as "not
/// ready yet".
pub trait Mailbox: Send + Sync {
    /// Store `bytes` in the slot, replacing anything already there.
    fn put(&self, bytes: &[u8]) -> Result<(), MailboxError>;
    /// Read the slot without consuming it.
    fn peek(&self) -> Result<Option<Vec<u8>>, MailboxError>;
    /// Empty the slot. Returns whether anything was removed.
    fn clear(&self) -> Result<bool, MailboxError>;
    /// Whether the slot currently holds anything.
    fn is_occupied(&self) -> Result<bool, MailboxError> {
        Ok(self.peek()?.is_some())
    }
    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Mailbox backed by a single file.
#[derive(Debug, Clone)]
pub struct FileMailbox {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl FileMailbox {
    /// Mailbox stored at `path`; writes stage through `<path>.tmp`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        Self {
            path,
            tmp_path: PathBuf::from(tmp),
        }
    }

    /// Mailbox stored as `name` inside `dir`.
    pub fn in_dir(dir: &Path, name: &str) -> Self {
        Self::new(dir.join(name))
    }

    /// Location of the slot file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Mailbox for FileMailbox {
    fn put(&self, bytes: &[u8]) -> Result<(), MailboxError> {
        let mut tmp =
            File::create(&self.tmp_path).map_err(|e| MailboxError::io(&self.tmp_path, e))?;
        tmp.write_all(bytes)
            .and_then(|()| tmp.flush())
            .and_then(|()| tmp.sync_all())
            .map_err(|e| MailboxError::io(&self.tmp_path, e))?;
        drop(tmp);
        fs::rename(&self.tmp_path, &self.path).map_err(|e| MailboxError::io(&self.path, e))?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "mailbox written");
        Ok(())
    }

    fn peek(&self) -> Result<Option<Vec<u8>>, MailboxError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(MailboxError::io(&self.path, err)),
        }
    }

    fn clear(&self) -> Result<bool, MailboxError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "mailbox cleared");
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(MailboxError::io(&self.path, err)),
        }
    }

    fn is_occupied(&self) -> Result<bool, MailboxError> {
        self.path
            .try_exists()
            .map_err(|e| MailboxError::io(&self.path, e))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process mailbox for tests and single-process embeddings.
///
/// Clones share the same slot.
#[derive(Debug, Clone)]
pub struct MemoryMailbox {
    label: Arc<str>,
    inner: Arc<Mutex<MemorySlot>>,
}

#[derive(Debug, Default)]
struct MemorySlot {
    bytes: Option<Vec<u8>>,
    writes: usize,
}

impl MemoryMailbox {
    /// Create an empty mailbox labelled for logs.
    pub fn new(label: &str) -> Self {
        Self {
            label: Arc::from(label),
            inner: Arc::default(),
        }
    }

    /// Number of mutations (puts and successful clears) seen so far.
    pub fn writes(&self) -> usize {
        self.inner.lock().writes
    }
}

impl Mailbox for MemoryMailbox {
    fn put(&self, bytes: &[u8]) -> Result<(), MailboxError> {
        let mut slot = self.inner.lock();
        slot.bytes = Some(bytes.to_vec());
        slot.writes += 1;
        Ok(())
    }

    fn peek(&self) -> Result<Option<Vec<u8>>, MailboxError> {
        Ok(self.inner.lock().bytes.clone())
    }

    fn clear(&self) -> Result<bool, MailboxError> {
        let mut slot = self.inner.lock();
        let removed = slot.bytes.take().is_some();
        if removed {
            slot.writes += 1;
        }
        Ok(removed)
    }

    fn describe(&self) -> String {
        format!("memory:{}", self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn file_mailbox_put_peek_clear() {
        let dir = TempDir::new().unwrap();
        let mailbox = FileMailbox::in_dir(dir.path(), "command.json");
        assert_eq!(mailbox.peek().unwrap(), None);
        assert!(!mailbox.is_occupied().unwrap());

        mailbox.put(b"{\"a\":1}").unwrap();
        assert!(mailbox.is_occupied().unwrap());
        assert_eq!(mailbox.peek().unwrap().as_deref(), Some(&b"{\"a\":1}"[..]));
        assert!(!dir.path().join("command.json.tmp").exists());

        mailbox.put(b"{\"a\":2}").unwrap();
        assert_eq!(mailbox.peek().unwrap().as_deref(), Some(&b"{\"a\":2}"[..]));

        assert!(mailbox.clear().unwrap());
        assert!(!mailbox.clear().unwrap());
        assert!(!mailbox.path().exists());
    }

    #[test]
    fn file_mailbox_put_fails_without_directory() {
        let dir = TempDir::new().unwrap();
        let mailbox = FileMailbox::in_dir(&dir.path().join("missing"), "response.json");
        let err = mailbox.put(b"{}").unwrap_err();
        assert!(matches!(err, MailboxError::Io { .. }));
    }

    #[test]
    fn memory_mailbox_counts_mutations() {
        let mailbox = MemoryMailbox::new("responses");
        let handle = mailbox.clone();
        assert!(!mailbox.clear().unwrap());
        assert_eq!(mailbox.writes(), 0);
        mailbox.put(b"x").unwrap();
        assert!(handle.is_occupied().unwrap());
        assert!(handle.clear().unwrap());
        assert_eq!(mailbox.writes(), 2);
        assert_eq!(mailbox.describe(), "memory:responses");
    }
}
