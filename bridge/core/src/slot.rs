use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use bridge_spec::{Command, DecodeError, Record, Response};
use tracing::debug;

use crate::mailbox::{FileMailbox, Mailbox, MailboxError};

/// Result of reading a typed slot.
#[derive(Debug)]
pub enum SlotRead<T> {
    /// Nothing is stored.
    Empty,
    /// A complete, valid record is stored.
    Ready(T),
    /// Bytes are stored but do not decode; treat as a write still in progress.
    Undecodable(DecodeError),
}

/// Typed view over a mailbox carrying records of type `T`.
pub struct Slot<T> {
    mailbox: Arc<dyn Mailbox>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            mailbox: Arc::clone(&self.mailbox),
            _record: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slot")
            .field("mailbox", &self.mailbox.describe())
            .finish()
    }
}

impl<T: Record> Slot<T> {
    /// Wrap a mailbox.
    pub fn new(mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            mailbox,
            _record: PhantomData,
        }
    }

    /// Slot backed by the record's channel file inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(Arc::new(FileMailbox::in_dir(dir, T::CHANNEL)))
    }

    /// Encode and store `record`, replacing the slot contents.
    pub fn put(&self, record: &T) -> Result<(), MailboxError> {
        let bytes = record.encode()?;
        self.mailbox.put(&bytes)
    }

    /// Decode the slot contents without consuming them.
    pub fn peek(&self) -> Result<SlotRead<T>, MailboxError> {
        let Some(bytes) = self.mailbox.peek()? else {
            return Ok(SlotRead::Empty);
        };
        Ok(match T::decode(&bytes) {
            Ok(record) => SlotRead::Ready(record),
            Err(err) => SlotRead::Undecodable(err),
        })
    }

    /// Decode the slot and clear it only if a valid record was found.
    pub fn try_take(&self) -> Result<SlotRead<T>, MailboxError> {
        let read = self.peek()?;
        if let SlotRead::Ready(_) = read {
            self.mailbox.clear()?;
            debug!(slot = %self.mailbox.describe(), "record taken");
        }
        Ok(read)
    }

    /// Empty the slot. Returns whether anything was removed.
    pub fn clear(&self) -> Result<bool, MailboxError> {
        self.mailbox.clear()
    }

    /// Whether the slot holds anything, decodable or not.
    pub fn is_occupied(&self) -> Result<bool, MailboxError> {
        self.mailbox.is_occupied()
    }
}

/// Occupancy snapshot of both channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ChannelStatus {
    /// A command is waiting for the executor.
    pub command_pending: bool,
    /// A response is waiting for the controller.
    pub response_pending: bool,
}

/// The two channels that make up a bridge.
#[derive(Debug, Clone)]
pub struct ChannelPair {
    /// Controller → executor.
    pub commands: Slot<Command>,
    /// Executor → controller.
    pub responses: Slot<Response>,
}

impl ChannelPair {
    /// Open the file-backed channels inside `base_dir`, creating the directory.
    ///
    /// Failing here is the one unrecoverable condition: without a writable
    /// directory no exchange can take place.
    pub fn open(base_dir: &Path) -> Result<Self, MailboxError> {
        std::fs::create_dir_all(base_dir).map_err(|source| MailboxError::Io {
            path: base_dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            commands: Slot::in_dir(base_dir),
            responses: Slot::in_dir(base_dir),
        })
    }

    /// Build a pair from arbitrary mailboxes.
    pub fn from_mailboxes(commands: Arc<dyn Mailbox>, responses: Arc<dyn Mailbox>) -> Self {
        Self {
            commands: Slot::new(commands),
            responses: Slot::new(responses),
        }
    }

    /// Occupancy of both channels.
    pub fn status(&self) -> Result<ChannelStatus, MailboxError> {
        Ok(ChannelStatus {
            command_pending: self.commands.is_occupied()?,
            response_pending: self.responses.is_occupied()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailbox::MemoryMailbox;
    use tempfile::TempDir;

    #[test]
    fn try_take_leaves_undecodable_bytes() {
        let mailbox = MemoryMailbox::new("responses");
        let slot: Slot<Response> = Slot::new(Arc::new(mailbox.clone()));
        mailbox.put(br#"{"status":"succ"#).unwrap();

        assert!(matches!(slot.try_take().unwrap(), SlotRead::Undecodable(_)));
        assert!(mailbox.is_occupied().unwrap());

        slot.put(&Response::success("done")).unwrap();
        match slot.try_take().unwrap() {
            SlotRead::Ready(response) => assert_eq!(response, Response::success("done")),
            other => panic!("expected ready response, got {other:?}"),
        }
        assert!(!mailbox.is_occupied().unwrap());
        assert!(matches!(slot.try_take().unwrap(), SlotRead::Empty));
    }

    #[test]
    fn peek_does_not_consume() {
        let slot: Slot<Command> = Slot::new(Arc::new(MemoryMailbox::new("commands")));
        slot.put(&Command::read("get_project_info")).unwrap();
        assert!(matches!(slot.peek().unwrap(), SlotRead::Ready(_)));
        assert!(slot.is_occupied().unwrap());
    }

    #[test]
    fn open_uses_well_known_file_names() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("bridge");
        let channels = ChannelPair::open(&base).unwrap();
        channels.commands.put(&Command::execute("noop")).unwrap();
        channels.responses.put(&Response::success("ok")).unwrap();
        assert!(base.join("command.json").is_file());
        assert!(base.join("response.json").is_file());
        assert_eq!(
            channels.status().unwrap(),
            ChannelStatus {
                command_pending: true,
                response_pending: true
            }
        );
    }
}
