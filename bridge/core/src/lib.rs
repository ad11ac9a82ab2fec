//! Bridge core: single-slot mailboxes, typed channel slots, and shared settings.
//!
//! Each side of the bridge owns one channel. The controller writes commands
//! and the executor deletes them; the executor writes responses and the
//! controller deletes them. Both channels are plain files in one directory, so
//! every write goes through a temporary file and a rename.
#![deny(missing_docs)]

/// Shared configuration for both sides of the bridge.
pub mod config;
/// Subscriber setup shared by the bridge binaries.
pub mod logging;
/// Byte-level mailbox storage.
pub mod mailbox;
/// Typed slots and the command/response channel pair.
pub mod slot;

pub use config::{default_base_dir, BridgeConfig};
pub use logging::init_tracing;
pub use mailbox::{FileMailbox, Mailbox, MailboxError, MemoryMailbox};
pub use slot::{ChannelPair, ChannelStatus, Slot, SlotRead};
