//! Session transport
//!
//! Owns the connection lifecycle for a live session: two-tier capability
//! negotiation with fallback, a background reader that turns inbound traffic
//! into an ordered event stream, and fire-and-forget outbound send for audio
//! and video frames.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::live::endpoint::{LiveEndpoint, LiveReceiver, LiveSender};
use crate::live::protocol::{CapabilityTier, ClientMessage, ToolCall, build_setup};
use crate::navigation::Location;
use crate::{Error, Result};

/// Connection state of the transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
}

/// One event from the live session, delivered in receipt order
pub enum SessionEvent {
    /// A chunk of assistant audio in wire PCM format
    Audio(Vec<u8>),
    /// The user spoke over the assistant; already-delivered audio for the
    /// current response should be silenced
    Interrupted,
    /// The assistant invoked a tool. The reader blocks until `respond`
    /// receives the result, then echoes it back correlated by id.
    ToolCall {
        call: ToolCall,
        respond: oneshot::Sender<serde_json::Value>,
    },
    /// The connection ended, cleanly or not
    Closed,
}

type SharedSender = Arc<Mutex<Option<Box<dyn LiveSender>>>>;

/// Manages the live session connection
pub struct SessionTransport {
    endpoint: Arc<dyn LiveEndpoint>,
    model: String,
    state: TransportState,
    sender: SharedSender,
    reader: Option<JoinHandle<()>>,
    tier: Option<CapabilityTier>,
}

impl SessionTransport {
    /// Create a transport over the given endpoint
    pub fn new(endpoint: Arc<dyn LiveEndpoint>, model: String) -> Self {
        Self {
            endpoint,
            model,
            state: TransportState::Disconnected,
            sender: Arc::new(Mutex::new(None)),
            reader: None,
            tier: None,
        }
    }

    /// Current connection state
    #[must_use]
    pub const fn state(&self) -> TransportState {
        self.state
    }

    /// Capability tier of the established session, if connected
    #[must_use]
    pub const fn tier(&self) -> Option<CapabilityTier> {
        self.tier
    }

    /// Connect, trying the extended capability tier first and falling back
    /// to the minimal tier if the extended configuration is refused before
    /// the connection is established.
    ///
    /// On success returns the ordered session event stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportFatal`] when both tiers fail.
    pub async fn connect(
        &mut self,
        location: Option<Location>,
    ) -> Result<mpsc::Receiver<SessionEvent>> {
        self.disconnect().await;
        self.state = TransportState::Connecting;

        let mut tier = CapabilityTier::Extended;
        let (live_sender, live_receiver) = loop {
            let setup = build_setup(&self.model, tier, location.as_ref());
            match self.endpoint.connect(setup).await {
                Ok(halves) => break halves,
                Err(e) => {
                    if let Some(next) = tier.fallback() {
                        tracing::warn!(
                            error = %e,
                            ?tier,
                            "session tier failed, retrying with reduced capabilities"
                        );
                        tier = next;
                    } else {
                        self.state = TransportState::Disconnected;
                        tracing::error!(error = %e, "all session tiers failed");
                        return Err(match e {
                            Error::TransportFatal(_) => e,
                            other => Error::TransportFatal(other.to_string()),
                        });
                    }
                }
            }
        };

        let (events_tx, events_rx) = mpsc::channel(64);
        {
            let mut guard = self.sender.lock().await;
            *guard = Some(live_sender);
        }
        self.reader = Some(tokio::spawn(read_loop(
            live_receiver,
            Arc::clone(&self.sender),
            events_tx,
        )));

        self.state = TransportState::Connected;
        self.tier = Some(tier);
        tracing::info!(?tier, "session connected");
        Ok(events_rx)
    }

    /// Send one microphone frame; silently dropped when not connected
    pub async fn send_audio(&self, pcm: &[u8]) {
        self.send_best_effort(ClientMessage::audio(pcm)).await;
    }

    /// Send one video frame; silently dropped when not connected
    pub async fn send_video(&self, jpeg: &[u8]) {
        self.send_best_effort(ClientMessage::video(jpeg)).await;
    }

    async fn send_best_effort(&self, msg: ClientMessage) {
        let mut guard = self.sender.lock().await;
        if let Some(sender) = guard.as_mut() {
            if let Err(e) = sender.send(msg).await {
                tracing::debug!(error = %e, "outbound frame dropped");
            }
        }
    }

    /// Tear the session down. Safe to call from any state, repeatedly.
    pub async fn disconnect(&mut self) {
        let taken = {
            let mut guard = self.sender.lock().await;
            guard.take()
        };
        if let Some(mut sender) = taken {
            sender.close().await;
            tracing::debug!("session disconnected");
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.state = TransportState::Disconnected;
        self.tier = None;
    }
}

/// Background reader: one inbound message fully processed before the next.
///
/// Tool calls block here until the orchestrator supplies a result, so the
/// correlated response is written back before any later message is read.
async fn read_loop(
    mut receiver: Box<dyn LiveReceiver>,
    sender: SharedSender,
    events: mpsc::Sender<SessionEvent>,
) {
    while let Some(result) = receiver.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(error = %e, "session read error");
                break;
            }
        };

        if msg.interrupted {
            // The interrupt supersedes any audio carried in the same message.
            if events.send(SessionEvent::Interrupted).await.is_err() {
                return;
            }
        } else if let Some(audio) = msg.decode_audio() {
            if events.send(SessionEvent::Audio(audio)).await.is_err() {
                return;
            }
        }

        for call in msg.tool_calls {
            let (respond, acknowledged) = oneshot::channel();
            let id = call.id.clone();
            let name = call.name.clone();
            if events
                .send(SessionEvent::ToolCall { call, respond })
                .await
                .is_err()
            {
                return;
            }
            let response = acknowledged.await.unwrap_or(serde_json::Value::Null);

            let mut guard = sender.lock().await;
            if let Some(live) = guard.as_mut() {
                if let Err(e) = live
                    .send(ClientMessage::ToolResponse { id, name, response })
                    .await
                {
                    tracing::warn!(error = %e, "tool response dropped");
                }
            }
        }
    }

    let _ = events.send(SessionEvent::Closed).await;
}
