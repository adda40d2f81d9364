use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use replay_utils_rustls_provider::ensure_rustls_crypto_provider;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::error::ClientError;
use crate::error::Result;
use crate::message::Command;
use crate::message::IncomingMessage;
use crate::message::OutgoingFrame;
use crate::message::parse_incoming;
use crate::ws::InboundReceiver;
use crate::ws::WsStream;

pub const SET_ACCESS_TOKEN_METHOD: &str = "Authentication.setAccessToken";

/// Supplies the access token sent right after the socket opens. Returning
/// `None` skips authentication.
pub trait CredentialsProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Callback invoked for a server-initiated `{method, params}` event.
pub type EventCallback = Arc<dyn Fn(Value) + Send + Sync>;

type PendingSender = oneshot::Sender<Result<Value>>;
type PendingMap = Arc<Mutex<HashMap<i64, PendingSender>>>;
type ListenerMap = Arc<Mutex<HashMap<String, EventCallback>>>;

/// A request/response client over one websocket.
///
/// Every command gets a fresh id and a pending entry; replies are routed by
/// id alone, so they may arrive in any order. When the socket goes away, for
/// whatever reason, every outstanding call is rejected.
pub struct ProtocolClient {
    address: String,

    stream: Arc<WsStream>,

    /// `id -> oneshot::Sender` for calls that have not been answered yet.
    pending: PendingMap,

    listeners: ListenerMap,

    id_counter: AtomicI64,

    is_closed: Arc<AtomicBool>,

    reader_task: tokio::task::JoinHandle<()>,
}

impl ProtocolClient {
    /// Opens a websocket to `address` and, when `credentials` has a token,
    /// authenticates before returning.
    pub async fn connect(address: &str, credentials: &dyn CredentialsProvider) -> Result<Self> {
        ensure_rustls_crypto_provider();

        let request = address
            .into_client_request()
            .map_err(|err| ClientError::Connect {
                address: address.to_string(),
                message: format!("invalid address: {err}"),
            })?;

        info!("connecting protocol websocket: {address}");
        let (stream, _) =
            tokio_tungstenite::connect_async_with_config(request, Some(websocket_config()), false)
                .await
                .map_err(|err| ClientError::Connect {
                    address: address.to_string(),
                    message: err.to_string(),
                })?;

        let client = Self::from_stream(address, stream);
        if let Some(token) = credentials.access_token()
            && let Err(err) = client.authenticate(&token).await
        {
            let _ = client.close().await;
            return Err(err);
        }
        Ok(client)
    }

    fn from_stream(address: &str, stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        let (stream, rx_message) = WsStream::new(stream);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let listeners: ListenerMap = Arc::new(Mutex::new(HashMap::new()));
        let is_closed = Arc::new(AtomicBool::new(false));

        let reader_task = tokio::spawn(read_loop(
            rx_message,
            Arc::clone(&pending),
            Arc::clone(&listeners),
            Arc::clone(&is_closed),
        ));

        Self {
            address: address.to_string(),
            stream: Arc::new(stream),
            pending,
            listeners,
            id_counter: AtomicI64::new(1),
            is_closed,
            reader_task,
        }
    }

    async fn authenticate(&self, token: &str) -> Result<()> {
        let result = self
            .send_command(Command::new(
                SET_ACCESS_TOKEN_METHOD,
                json!({ "accessToken": token }),
            ))
            .await?;
        if !result.is_object() {
            return Err(ClientError::MalformedAuthResponse(result));
        }
        debug!("authenticated protocol connection");
        Ok(())
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed.load(Ordering::SeqCst)
    }

    /// Number of commands still waiting for a reply.
    pub fn pending_commands(&self) -> usize {
        lock_pending(&self.pending).len()
    }

    /// Sends `command` and waits for the matching reply.
    ///
    /// There is no timeout here; callers race this against their own. Dropping
    /// the returned future before it resolves forgets the pending entry, so a
    /// late reply is discarded.
    pub async fn send_command(&self, command: Command) -> Result<Value> {
        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        let payload = serde_json::to_string(&OutgoingFrame::new(id, &command))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut guard = lock_pending(&self.pending);
            // Checked under the lock: the reader flips the flag before it
            // drains the map, so an entry inserted here is always drained.
            if self.is_closed.load(Ordering::SeqCst) {
                return Err(ClientError::Closed);
            }
            guard.insert(id, tx);
        }
        let _pending = PendingEntry {
            pending: &self.pending,
            id,
        };

        debug!(
            id,
            method = %command.method,
            binary = command.binary.is_some(),
            "protocol command to server"
        );
        trace!("protocol frame to server: {payload}");

        let mut messages = vec![Message::Text(payload.into())];
        if let Some(data) = command.binary {
            messages.push(Message::Binary(data.into()));
        }
        if let Err(err) = self.stream.send_all(messages).await {
            warn!(id, "failed to send protocol command: {err}");
            return Err(ClientError::Transport(err.to_string()));
        }

        rx.await.unwrap_or(Err(ClientError::Closed))
    }

    /// Routes every event named `method` to `callback`. Registering again for
    /// the same method replaces the previous callback.
    pub fn set_event_listener<F>(&self, method: impl Into<String>, callback: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let mut guard = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.insert(method.into(), Arc::new(callback));
    }

    /// Closes the socket and rejects everything still pending. Calling this
    /// more than once is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.is_closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("closing protocol websocket: {}", self.address);
        let result = self.stream.close().await;
        reject_all(&self.pending, None);
        match result {
            Err(err) if !matches!(err, WsError::ConnectionClosed | WsError::AlreadyClosed) => Err(
                ClientError::Transport(format!("failed to close websocket: {err}")),
            ),
            _ => Ok(()),
        }
    }

    fn dispatch_event(listeners: &ListenerMap, method: String, params: Value) {
        let callback = listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&method)
            .cloned();
        match callback {
            Some(callback) => callback(params),
            None => debug!(method, "no listener for protocol event"),
        }
    }

    fn dispatch_response(id: i64, result: Result<Value>, pending: &PendingMap) {
        let tx_opt = lock_pending(pending).remove(&id);
        if let Some(tx) = tx_opt {
            // The caller may have given up waiting.
            let _ = tx.send(result);
        } else {
            debug!(id, "no pending command found for response");
        }
    }
}

impl Drop for ProtocolClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Removes its command from the pending table when dropped, whether the
/// reply arrived, the send failed, or the caller stopped waiting.
struct PendingEntry<'a> {
    pending: &'a PendingMap,
    id: i64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        lock_pending(self.pending).remove(&self.id);
    }
}

fn lock_pending(pending: &PendingMap) -> std::sync::MutexGuard<'_, HashMap<i64, PendingSender>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

fn websocket_config() -> WebSocketConfig {
    WebSocketConfig::default()
}

async fn read_loop(
    mut rx_message: InboundReceiver,
    pending: PendingMap,
    listeners: ListenerMap,
    is_closed: Arc<AtomicBool>,
) {
    let failure = loop {
        match rx_message.recv().await {
            Some(Ok(Message::Text(text))) => {
                trace!("protocol frame from server: {}", text.as_str());
                match parse_incoming(text.as_str()) {
                    Ok(IncomingMessage::Response { id, result }) => {
                        ProtocolClient::dispatch_response(id, Ok(result), &pending);
                    }
                    Ok(IncomingMessage::Error { id, error }) => {
                        ProtocolClient::dispatch_response(id, Err(error.into()), &pending);
                    }
                    Ok(IncomingMessage::Event { method, params }) => {
                        ProtocolClient::dispatch_event(&listeners, method, params);
                    }
                    Err(err) => warn!("dropping malformed protocol frame: {err}"),
                }
            }
            Some(Ok(Message::Close(frame))) => {
                info!("protocol websocket closed by server: {frame:?}");
                break None;
            }
            Some(Ok(Message::Binary(data))) => {
                warn!(len = data.len(), "dropping unexpected binary frame");
            }
            Some(Ok(Message::Frame(_) | Message::Ping(_) | Message::Pong(_))) => {}
            Some(Err(err)) => break Some(err.to_string()),
            None => break None,
        }
    };

    is_closed.store(true, Ordering::SeqCst);
    reject_all(&pending, failure);
}

/// Fails every pending call: with `Transport(reason)` when the socket broke,
/// otherwise with `Closed`.
fn reject_all(pending: &PendingMap, reason: Option<String>) {
    let drained: Vec<(i64, PendingSender)> = lock_pending(pending).drain().collect();
    if !drained.is_empty() {
        debug!(count = drained.len(), "rejecting pending protocol commands");
    }
    for (_, tx) in drained {
        let err = match &reason {
            Some(reason) => ClientError::Transport(reason.clone()),
            None => ClientError::Closed,
        };
        let _ = tx.send(Err(err));
    }
}
