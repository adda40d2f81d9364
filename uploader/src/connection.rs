use std::sync::Arc;

use replay_protocol_client::ClientError;
use replay_protocol_client::CommandChannel;
use replay_protocol_client::Connector;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

/// One server connection shared by every upload of an [`crate::Uploader`].
///
/// Opened on first use and reopened if it has dropped since; closed only by
/// [`SharedConnection::close`].
pub struct SharedConnection {
    connector: Arc<dyn Connector>,
    channel: Mutex<Option<Arc<dyn CommandChannel>>>,
}

impl SharedConnection {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            channel: Mutex::new(None),
        }
    }

    pub async fn get(&self) -> Result<Arc<dyn CommandChannel>, ClientError> {
        let mut guard = self.channel.lock().await;
        if let Some(channel) = guard.as_ref()
            && !channel.is_closed()
        {
            return Ok(Arc::clone(channel));
        }
        if guard.is_some() {
            debug!("server connection dropped, reconnecting");
        }
        let channel = self.connector.connect().await?;
        *guard = Some(Arc::clone(&channel));
        Ok(channel)
    }

    pub async fn close(&self) {
        let channel = self.channel.lock().await.take();
        if let Some(channel) = channel
            && let Err(err) = channel.close().await
        {
            warn!("failed to close server connection: {err}");
        }
    }
}
