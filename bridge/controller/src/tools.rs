use async_trait::async_trait;
use bridge_spec::{Command, QueryParams, Response};

use crate::{ControllerClient, ControllerError};

/// The two tools an agent calls. Results are the response rendered as JSON
/// text, whatever its status.
#[async_trait]
pub trait ToolSurface: Send + Sync {
    /// Run an action on the host.
    async fn run_action(&self, code: &str) -> Result<String, ControllerError>;
    /// Ask the host a named question.
    async fn run_query(&self, query: &str) -> Result<String, ControllerError>;
}

/// [`ToolSurface`] backed by a [`ControllerClient`].
#[derive(Debug, Clone)]
pub struct BridgeTools {
    client: ControllerClient,
}

impl BridgeTools {
    /// Tools submitting through `client`.
    pub fn new(client: ControllerClient) -> Self {
        Self { client }
    }

    /// Underlying client.
    pub fn client(&self) -> &ControllerClient {
        &self.client
    }

    /// Query with parameters, returning the structured response.
    pub async fn run_query_with(
        &self,
        query: &str,
        params: QueryParams,
    ) -> Result<Response, ControllerError> {
        let command = if params.is_empty() {
            Command::read(query)
        } else {
            Command::read_with(query, params)
        };
        self.client.submit(command).await
    }
}

#[async_trait]
impl ToolSurface for BridgeTools {
    async fn run_action(&self, code: &str) -> Result<String, ControllerError> {
        let response = self.client.submit(Command::execute(code)).await?;
        Ok(response.to_string())
    }

    async fn run_query(&self, query: &str) -> Result<String, ControllerError> {
        let response = self.client.submit(Command::read(query)).await?;
        Ok(response.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WaitPolicy;
    use bridge_core::{ChannelPair, Mailbox, MemoryMailbox};
    use bridge_spec::Record;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn results_are_rendered_as_json_text() {
        let commands = MemoryMailbox::new("commands");
        let responses = MemoryMailbox::new("responses");
        let channels =
            ChannelPair::from_mailboxes(Arc::new(commands.clone()), Arc::new(responses.clone()));
        let tools = BridgeTools::new(ControllerClient::new(
            channels,
            WaitPolicy {
                poll_interval: Duration::from_millis(5),
                timeout: Duration::from_secs(5),
                grace: Duration::from_millis(1),
            },
        ));

        let responder = tokio::spawn(async move {
            loop {
                if let Some(bytes) = commands.peek().unwrap() {
                    let command = Command::decode(&bytes).unwrap();
                    let data = format!("Unknown query: {}", command.summary());
                    responses
                        .put(&Response::success(data).encode().unwrap())
                        .unwrap();
                    commands.clear().unwrap();
                    return;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        });

        let text = tools.run_query("nonexistent").await.unwrap();
        responder.await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["status"], "success");
        assert!(parsed["data"].as_str().unwrap().starts_with("Unknown query"));
    }
}
