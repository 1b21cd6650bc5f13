//! Live endpoint abstraction
//!
//! [`LiveEndpoint`] is the seam between the session transport and the actual
//! network service: the production implementation speaks JSON over a
//! WebSocket, tests substitute scripted endpoints.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use futures::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::live::protocol::{ClientMessage, ServerMessage, Setup};
use crate::{Error, Result};

/// Write half of an open live connection
#[async_trait]
pub trait LiveSender: Send {
    /// Send one message to the endpoint
    async fn send(&mut self, msg: ClientMessage) -> Result<()>;

    /// Close the connection; errors during close are not interesting
    async fn close(&mut self);
}

/// Read half of an open live connection
#[async_trait]
pub trait LiveReceiver: Send {
    /// Next inbound message, or `None` once the connection is closed
    async fn next(&mut self) -> Option<Result<ServerMessage>>;
}

/// Opens live connections for a given session setup
#[async_trait]
pub trait LiveEndpoint: Send + Sync {
    /// Open a connection, deliver the setup, and wait for the server to
    /// accept it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportRejected`] when the server refuses the
    /// requested session configuration, and connection-level errors otherwise.
    async fn connect(&self, setup: Setup) -> Result<(Box<dyn LiveSender>, Box<dyn LiveReceiver>)>;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// WebSocket implementation of the live endpoint
pub struct WsEndpoint {
    url: Url,
    api_key: String,
}

impl WsEndpoint {
    /// Create an endpoint for the given service URL
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL does not parse or the key is empty.
    pub fn new(url: &str, api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("live endpoint API key required".to_string()));
        }
        let url = Url::parse(url).map_err(|e| Error::Config(format!("invalid live URL: {e}")))?;
        Ok(Self { url, api_key })
    }
}

#[async_trait]
impl LiveEndpoint for WsEndpoint {
    async fn connect(&self, setup: Setup) -> Result<(Box<dyn LiveSender>, Box<dyn LiveReceiver>)> {
        let mut url = self.url.clone();
        url.query_pairs_mut().append_pair("key", &self.api_key);

        tracing::debug!(model = %setup.model, grounding = setup.grounding, "opening live connection");

        let (ws, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut source) = ws.split();

        let setup_json = serde_json::to_string(&ClientMessage::Setup(setup))?;
        sink.send(Message::Text(setup_json.into())).await?;

        // The server answers the setup with an acceptance or a rejection
        // before any session traffic.
        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => {
                    let msg: ServerMessage = serde_json::from_str(&text)?;
                    if msg.session_rejected {
                        let reason = msg
                            .error
                            .unwrap_or_else(|| "session configuration refused".to_string());
                        let _ = sink.close().await;
                        return Err(Error::TransportRejected(reason));
                    }
                    if let Some(error) = msg.error {
                        let _ = sink.close().await;
                        return Err(Error::TransportFatal(error));
                    }
                    break;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                Some(Ok(_)) | None => {
                    return Err(Error::TransportFatal(
                        "connection closed during setup".to_string(),
                    ));
                }
                Some(Err(e)) => return Err(e.into()),
            }
        }

        tracing::info!("live connection established");
        Ok((
            Box::new(WsLiveSender { sink }),
            Box::new(WsLiveReceiver { source }),
        ))
    }
}

struct WsLiveSender {
    sink: WsSink,
}

#[async_trait]
impl LiveSender for WsLiveSender {
    async fn send(&mut self, msg: ClientMessage) -> Result<()> {
        let json = serde_json::to_string(&msg)?;
        self.sink.send(Message::Text(json.into())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            tracing::debug!(error = %e, "live connection close");
        }
    }
}

struct WsLiveReceiver {
    source: WsSource,
}

#[async_trait]
impl LiveReceiver for WsLiveReceiver {
    async fn next(&mut self) -> Option<Result<ServerMessage>> {
        loop {
            match self.source.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).map_err(Error::from));
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}
