use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deploy_proto::Channel;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::dispatch::Shared;
use crate::{
    ConnectionState, Connector, Endpoint, Listener, SessionLink, TransportError,
};

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Opens [`WsSession`]s with a bounded connect time.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &Endpoint) -> Result<Arc<dyn SessionLink>, TransportError> {
        let session = WsSession::connect(endpoint, self.connect_timeout).await?;
        Ok(Arc::new(session))
    }
}

/// WebSocket session with one writer task and one reader task.
pub struct WsSession {
    channel: Channel,
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<Message>,
    close_frame: Option<String>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl WsSession {
    /// Connects, writes the handshake frame, and only then returns.
    pub async fn connect(
        endpoint: &Endpoint,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let target = endpoint.redacted();
        let channel = endpoint.channel;
        debug!(target = "session.transport", url = %target, "opening websocket");

        let (ws_stream, _) = match timeout(connect_timeout, connect_async(endpoint.url.as_str()))
            .await
        {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => {
                warn!(target = "session.transport", url = %target, error = %err, "websocket connect failed");
                return Err(TransportError::Connection(format!("{target}: {err}")));
            }
            Err(_) => {
                warn!(
                    target = "session.transport",
                    url = %target,
                    timeout_secs = connect_timeout.as_secs(),
                    "websocket connect timed out"
                );
                return Err(TransportError::Connection(format!(
                    "{target}: no answer within {}s",
                    connect_timeout.as_secs()
                )));
            }
        };
        let (mut ws_write, mut ws_read) = ws_stream.split();

        ws_write
            .send(Message::Text(endpoint.handshake.init.clone()))
            .await
            .map_err(|err| TransportError::Connection(format!("{target}: handshake failed: {err}")))?;

        let shared = Arc::new(Shared::open());
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

        let writer_shared = shared.clone();
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(err) = ws_write.send(message).await {
                    warn!(target = "session.transport", channel = channel.label(), error = %err, "websocket write failed");
                    writer_shared.end(ConnectionState::Failed);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader_shared = shared.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = ws_read.next().await {
                match message {
                    Ok(Message::Text(text)) => reader_shared.frame(text),
                    // Undecodable bytes still go to the listener; the codec reports them.
                    Ok(Message::Binary(bytes)) => {
                        reader_shared.frame(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Ok(Message::Close(frame)) => {
                        debug!(target = "session.transport", channel = channel.label(), reason = ?frame, "peer closed session");
                        reader_shared.end(ConnectionState::Closed);
                        return;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(target = "session.transport", channel = channel.label(), error = %err, "websocket read failed");
                        reader_shared.end(ConnectionState::Failed);
                        return;
                    }
                }
            }
            reader_shared.end(ConnectionState::Closed);
        });

        info!(target = "session.transport", url = %target, "session open");
        Ok(Self {
            channel,
            shared,
            outbound,
            close_frame: endpoint.handshake.close.clone(),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
        })
    }
}

#[async_trait]
impl SessionLink for WsSession {
    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn send(&self, text: String) -> Result<(), TransportError> {
        if !self.shared.state().is_open() {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(Message::Text(text))
            .map_err(|_| TransportError::NotConnected)
    }

    fn on_message(&self, listener: Listener) {
        self.shared.replace_listener(listener);
    }

    async fn close(&self) {
        if !self.shared.end(ConnectionState::Closed) {
            debug!(target = "session.transport", channel = self.channel.label(), "close on ended session ignored");
            return;
        }

        if let Some(frame) = &self.close_frame {
            let _ = self.outbound.send(Message::Text(frame.clone()));
        }
        let _ = self.outbound.send(Message::Close(None));

        let writer = self.writer.lock().take();
        if let Some(mut writer) = writer {
            if timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await.is_err() {
                debug!(target = "session.transport", channel = self.channel.label(), "writer did not flush before close deadline");
                writer.abort();
            }
        }
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }
        info!(target = "session.transport", channel = self.channel.label(), "session closed");
    }
}

impl Drop for WsSession {
    fn drop(&mut self) {
        if let Some(task) = self.writer.get_mut().take() {
            task.abort();
        }
        if let Some(task) = self.reader.get_mut().take() {
            task.abort();
        }
    }
}
