//! Host-side executor for the file bridge.
//!
//! The executor does not schedule itself. The host calls
//! [`ExecutorLoop::poll_once`] from its own cycle; each call checks the command
//! channel, answers at most one command, and returns. `bridged watch` wraps
//! the same pass in a timer for hosts without a cycle of their own.
#![deny(missing_docs)]

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use bridge_core::{ChannelPair, MailboxError, SlotRead};
use bridge_spec::{Command, Response, Status, EXECUTED_MARKER};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Executor capability traits and the composed host capability.
pub mod capability;
pub mod host;
/// Action runners.
pub mod runner;

pub use capability::{ExecutorCapability, HostCapability, QueryRegistry, QueryResolution};
pub use runner::{ActionRunner, ShellActionRunner};

/// Errors that stop a pass. Command content never produces one.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Reading or writing a channel failed.
    #[error(transparent)]
    Mailbox(#[from] MailboxError),
    /// The blocking pass task could not be joined.
    #[error("executor pass aborted: {0}")]
    Aborted(String),
}

/// What a single pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// No command was pending.
    Idle,
    /// A command file exists but does not decode yet; left in place.
    Deferred,
    /// A command file holds complete JSON that will never decode. It is left
    /// in place and blocks the channel until cleared with `bridgectl reset`.
    Rejected,
    /// A command was answered with a response of this status.
    Responded(Status),
}

/// Checks the command channel and answers pending commands.
#[derive(Clone)]
pub struct ExecutorLoop {
    channels: ChannelPair,
    capability: Arc<dyn ExecutorCapability>,
}

impl ExecutorLoop {
    /// Bind a capability to a channel pair.
    pub fn new(channels: ChannelPair, capability: Arc<dyn ExecutorCapability>) -> Self {
        Self {
            channels,
            capability,
        }
    }

    /// Run one complete check-and-maybe-respond pass.
    ///
    /// The response is written before the command is deleted. A crash between
    /// the two leaves the command in place and it is answered again on the
    /// next pass.
    pub fn poll_once(&self) -> Result<PassOutcome, ExecutorError> {
        let command = match self.channels.commands.peek()? {
            SlotRead::Empty => return Ok(PassOutcome::Idle),
            SlotRead::Undecodable(err) if err.is_permanent() => {
                error!(
                    %err,
                    "pending command can never be dispatched; \
                     clear it with `bridgectl reset --yes`"
                );
                return Ok(PassOutcome::Rejected);
            }
            SlotRead::Undecodable(err) => {
                warn!(%err, "pending command does not decode; leaving it for a later pass");
                return Ok(PassOutcome::Deferred);
            }
            SlotRead::Ready(command) => command,
        };

        let span = tracing::info_span!("executor_pass", command = %command.summary());
        let _guard = span.enter();

        let response = self.dispatch(&command);
        self.channels.responses.put(&response)?;
        self.channels.commands.clear()?;
        info!(status = %response.status, "command processed");
        Ok(PassOutcome::Responded(response.status))
    }

    /// Invoke `poll_once` every `interval` until `shutdown` resolves.
    ///
    /// Passes run on the blocking pool since actions may block. A failed pass
    /// is logged and retried on the next tick.
    pub async fn run_until<F>(self, interval: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        info!(?interval, "executor loop started");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    match self.pass_blocking().await {
                        Ok(PassOutcome::Idle) => {}
                        Ok(outcome) => debug!(?outcome, "pass finished"),
                        Err(err) => error!(%err, "executor pass failed"),
                    }
                }
            }
        }
        info!("executor loop stopped");
    }

    async fn pass_blocking(&self) -> Result<PassOutcome, ExecutorError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.poll_once())
            .await
            .map_err(|err| ExecutorError::Aborted(err.to_string()))?
    }

    fn dispatch(&self, command: &Command) -> Response {
        let capability = self.capability.as_ref();
        match panic::catch_unwind(AssertUnwindSafe(|| dispatch_to(capability, command))) {
            Ok(response) => response,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(%message, "capability panicked");
                Response::error(format!("executor capability panicked: {message}"))
            }
        }
    }
}

fn dispatch_to(capability: &dyn ExecutorCapability, command: &Command) -> Response {
    match command {
        Command::ExecuteCode { code } => match capability.execute(code) {
            Ok(Some(output)) => Response::success(output),
            Ok(None) => Response::success(EXECUTED_MARKER),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "action failed");
                Response::error(format!("{err:#}"))
            }
        },
        Command::ReadData { query, params } => {
            match capability.resolve_query(query, params.as_ref()) {
                Ok(QueryResolution::Found(data)) => Response::success(data),
                Ok(QueryResolution::Unrecognized) => {
                    debug!(%query, "unrecognized query");
                    Response::success(format!("Unknown query: {query}"))
                }
                Err(err) => {
                    warn!(%query, error = %format!("{err:#}"), "query failed");
                    Response::error(format!("{err:#}"))
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
