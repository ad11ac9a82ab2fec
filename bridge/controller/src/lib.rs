//! Controller side of the file bridge.
//!
//! [`ControllerClient::submit`] writes one command and waits, polling, for the
//! executor's response. Every outcome the protocol can produce (success,
//! dispatch failure, timeout, busy channel) comes back as a [`Response`]; only
//! local storage failures surface as [`ControllerError`].
#![deny(missing_docs)]

use std::time::Duration;

use bridge_core::{BridgeConfig, ChannelPair, ChannelStatus, MailboxError, SlotRead};
use bridge_spec::{Command, Response};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn, Instrument};

/// Agent-facing tool surface.
pub mod tools;

pub use tools::{BridgeTools, ToolSurface};

/// Data of the response returned when an earlier command is still pending.
pub const BUSY_MESSAGE: &str =
    "A previous command is still pending; the executor has not consumed it yet.";

/// Errors that prevent an exchange from taking place at all.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Reading or writing a channel failed.
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}

/// Polling cadence and wait budget for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Pause between checks of the response channel.
    pub poll_interval: Duration,
    /// Total wait budget.
    pub timeout: Duration,
    /// Pause between seeing a response and decoding it.
    pub grace: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
            grace: Duration::from_millis(500),
        }
    }
}

impl From<&BridgeConfig> for WaitPolicy {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
            grace: config.grace(),
        }
    }
}

/// Timeout description carried by the synthetic error response.
pub fn timeout_message(timeout: Duration) -> String {
    format!(
        "Timed out after {:.1}s waiting for the executor. Is the host bridge running?",
        timeout.as_secs_f64()
    )
}

/// Submits commands and waits for their responses.
#[derive(Debug, Clone)]
pub struct ControllerClient {
    channels: ChannelPair,
    policy: WaitPolicy,
}

impl ControllerClient {
    /// Client over `channels` with the given wait policy.
    pub fn new(channels: ChannelPair, policy: WaitPolicy) -> Self {
        Self { channels, policy }
    }

    /// Client over the file channels described by `config`.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, ControllerError> {
        let channels = ChannelPair::open(&config.base_dir)?;
        Ok(Self::new(channels, WaitPolicy::from(config)))
    }

    /// Occupancy of both channels.
    pub fn status(&self) -> Result<ChannelStatus, ControllerError> {
        Ok(self.channels.status()?)
    }

    /// Remove both channel files. Returns which ones existed.
    pub fn reset(&self) -> Result<ChannelStatus, ControllerError> {
        Ok(ChannelStatus {
            command_pending: self.channels.commands.clear()?,
            response_pending: self.channels.responses.clear()?,
        })
    }

    /// Write `command` and wait for its response.
    ///
    /// A response left behind by an abandoned exchange is discarded first. If
    /// the command channel is still occupied nothing is written and a busy
    /// error response is returned. On timeout no file is touched, so a late
    /// response is discarded by the next call.
    pub async fn submit(&self, command: Command) -> Result<Response, ControllerError> {
        let span = tracing::info_span!("submit", command = %command.summary());
        async move {
            self.discard_stale_response()?;
            if self.channels.commands.is_occupied()? {
                warn!("command channel still occupied; refusing to overwrite");
                return Ok(Response::error(BUSY_MESSAGE));
            }
            self.channels.commands.put(&command)?;
            debug!("command written");
            self.wait_for_response().await
        }
        .instrument(span)
        .await
    }

    fn discard_stale_response(&self) -> Result<(), ControllerError> {
        match self.channels.responses.peek()? {
            SlotRead::Empty => return Ok(()),
            SlotRead::Ready(stale) => {
                warn!(status = %stale.status, data = %stale.data, "discarding stale response");
            }
            SlotRead::Undecodable(err) => {
                warn!(%err, "discarding unreadable leftover response");
            }
        }
        self.channels.responses.clear()?;
        Ok(())
    }

    async fn wait_for_response(&self) -> Result<Response, ControllerError> {
        let started = Instant::now();
        let deadline = started + self.policy.timeout;
        loop {
            if self.channels.responses.is_occupied()? {
                sleep(self.policy.grace).await;
                match self.channels.responses.try_take()? {
                    SlotRead::Ready(response) => {
                        info!(
                            status = %response.status,
                            elapsed = ?started.elapsed(),
                            "response received"
                        );
                        return Ok(response);
                    }
                    SlotRead::Undecodable(err) => {
                        debug!(%err, "response not decodable yet; still waiting");
                    }
                    SlotRead::Empty => {}
                }
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.policy.poll_interval.min(deadline - now)).await;
        }
        warn!(timeout = ?self.policy.timeout, "no response before the deadline");
        Ok(Response::error(timeout_message(self.policy.timeout)))
    }
}
