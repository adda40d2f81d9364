use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::CredentialsProvider;
use crate::client::ProtocolClient;
use crate::error::Result;
use crate::message::Command;

/// Anything that can answer commands. The uploader only talks to the server
/// through this, so tests can script the server in-process.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    async fn send_command(&self, command: Command) -> Result<Value>;

    async fn close(&self) -> Result<()>;

    /// `true` once the channel can no longer carry commands.
    fn is_closed(&self) -> bool;
}

#[async_trait]
impl CommandChannel for ProtocolClient {
    async fn send_command(&self, command: Command) -> Result<Value> {
        ProtocolClient::send_command(self, command).await
    }

    async fn close(&self) -> Result<()> {
        ProtocolClient::close(self).await
    }

    fn is_closed(&self) -> bool {
        ProtocolClient::is_closed(self)
    }
}

/// Opens new [`CommandChannel`]s.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn CommandChannel>>;
}

pub struct WebSocketConnector {
    address: String,
    credentials: Arc<dyn CredentialsProvider>,
}

impl WebSocketConnector {
    pub fn new(address: impl Into<String>, credentials: Arc<dyn CredentialsProvider>) -> Self {
        Self {
            address: address.into(),
            credentials,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Arc<dyn CommandChannel>> {
        let client = ProtocolClient::connect(&self.address, self.credentials.as_ref()).await?;
        Ok(Arc::new(client))
    }
}
