//! Persistent bidirectional transport to a telemetry endpoint
//!
//! A [`Connector`] opens one link per call. The link is a pair of channels
//! bridged to the socket by background tasks, so the pipeline actor can select
//! on it alongside its commands and timers.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::Message;

const INBOUND_CAPACITY: usize = 256;
const OUTBOUND_CAPACITY: usize = 32;
const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Something that happened on an open link
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One text frame
    Frame(String),
    /// The peer closed the link, with its reason if it gave one
    Closed(Option<String>),
    /// The link failed
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// An open link. Dropping it tears the link down.
#[derive(Debug)]
pub struct TransportLink {
    inbound: mpsc::Receiver<TransportEvent>,
    outbound: mpsc::Sender<OutboundFrame>,
    reader: Option<AbortHandle>,
}

impl TransportLink {
    pub fn new(
        inbound: mpsc::Receiver<TransportEvent>,
        outbound: mpsc::Sender<OutboundFrame>,
    ) -> Self {
        Self {
            inbound,
            outbound,
            reader: None,
        }
    }

    fn with_reader(mut self, reader: AbortHandle) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Next event; a link whose reader went away reports `Closed(None)`
    pub async fn recv(&mut self) -> TransportEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or(TransportEvent::Closed(None))
    }

    /// Queue a text frame without waiting. Returns false if it could not be queued.
    pub fn send_text(&self, text: String) -> bool {
        self.outbound.try_send(OutboundFrame::Text(text)).is_ok()
    }

    /// Ask the writer to send a close frame, then drop the link
    pub fn close(self) {
        let _ = self.outbound.try_send(OutboundFrame::Close);
    }
}

impl Drop for TransportLink {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Opens transport links to one endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Human-readable target, used in logs
    fn target(&self) -> &str;

    async fn open(&self) -> Result<TransportLink, ConnectionError>;
}

/// WebSocket connector (`ws://` or `wss://`)
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    open_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }

    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    fn target(&self) -> &str {
        &self.url
    }

    async fn open(&self) -> Result<TransportLink, ConnectionError> {
        let (stream, _response) =
            tokio::time::timeout(self.open_timeout, tokio_tungstenite::connect_async(&self.url))
                .await
                .map_err(|_| {
                    ConnectionError::Transport(format!("open timed out after {:?}", self.open_timeout))
                })?
                .map_err(|e| ConnectionError::Transport(e.to_string()))?;

        let (mut write, mut read) = stream.split();
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);
        let (outbound_tx, mut outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);

        let reader = tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => TransportEvent::Frame(text),
                    Ok(Message::Binary(bytes)) => {
                        TransportEvent::Frame(String::from_utf8_lossy(&bytes).into_owned())
                    }
                    Ok(Message::Close(frame)) => {
                        let reason = frame
                            .map(|f| f.reason.into_owned())
                            .filter(|r| !r.is_empty());
                        let _ = inbound_tx.send(TransportEvent::Closed(reason)).await;
                        return;
                    }
                    // Ping/pong is answered by tungstenite
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_tx.send(TransportEvent::Error(e.to_string())).await;
                        return;
                    }
                };
                if inbound_tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = inbound_tx.send(TransportEvent::Closed(None)).await;
        });

        tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let result = match frame {
                    OutboundFrame::Text(text) => write.send(Message::Text(text)).await,
                    OutboundFrame::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                };
                if let Err(e) = result {
                    tracing::debug!(error = %e, "WebSocket write failed");
                    break;
                }
            }
            let _ = write.close().await;
        });

        Ok(TransportLink::new(inbound_rx, outbound_tx).with_reader(reader.abort_handle()))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConnectionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed: {}", .0.as_deref().unwrap_or("no reason given"))]
    Closed(Option<String>),

    #[error("Reconnect budget exhausted after {0} attempts")]
    Exhausted(u32),
}

impl From<TransportEvent> for ConnectionError {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::Closed(reason) => ConnectionError::Closed(reason),
            TransportEvent::Error(e) => ConnectionError::Transport(e),
            TransportEvent::Frame(_) => ConnectionError::Transport("unexpected frame".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_link_reports_closed_when_reader_gone() {
        let (tx, rx) = mpsc::channel(1);
        let (out_tx, _out_rx) = mpsc::channel(1);
        let mut link = TransportLink::new(rx, out_tx);

        tx.send(TransportEvent::Frame("hi".into())).await.unwrap();
        drop(tx);

        assert_eq!(link.recv().await, TransportEvent::Frame("hi".into()));
        assert_eq!(link.recv().await, TransportEvent::Closed(None));
    }

    #[tokio::test]
    async fn test_websocket_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            ws.send(Message::Text(r#"{"type":"heartbeat"}"#.into()))
                .await
                .unwrap();
            let echoed = ws.next().await.unwrap().unwrap();
            ws.close(None).await.ok();
            echoed
        });

        let connector = WebSocketConnector::new(format!("ws://{}", addr));
        let mut link = connector.open().await.unwrap();

        assert_eq!(
            link.recv().await,
            TransportEvent::Frame(r#"{"type":"heartbeat"}"#.into())
        );
        assert!(link.send_text("pong".into()));

        let echoed = server.await.unwrap();
        assert_eq!(echoed, Message::Text("pong".into()));
        assert!(matches!(link.recv().await, TransportEvent::Closed(_)));
    }

    #[test]
    fn test_connection_error_display() {
        assert_eq!(
            ConnectionError::Closed(None).to_string(),
            "Connection closed: no reason given"
        );
        assert_eq!(
            ConnectionError::from(TransportEvent::Closed(Some("going away".into()))).to_string(),
            "Connection closed: going away"
        );
    }

    #[tokio::test]
    async fn test_open_fails_without_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = WebSocketConnector::new(format!("ws://{}", addr));
        assert!(matches!(connector.open().await, Err(ConnectionError::Transport(_))));
    }
}
