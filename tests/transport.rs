//! Session transport integration tests
//!
//! Exercises the connect/fallback state machine and event ordering against a
//! scripted endpoint, without any network.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::mpsc;

use lumen_gateway::live::endpoint::{LiveEndpoint, LiveReceiver, LiveSender};
use lumen_gateway::live::protocol::{ClientMessage, ServerMessage, Setup, ToolCall};
use lumen_gateway::live::{SessionEvent, SessionTransport, TransportState};
use lumen_gateway::{Error, Result};

/// Endpoint with scripted accept/reject behavior and captured traffic
struct ScriptedEndpoint {
    reject_extended: bool,
    fail_all: bool,
    inbound: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<ServerMessage>>>,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    setups: Arc<Mutex<Vec<Setup>>>,
}

struct ScriptHandle {
    messages: mpsc::UnboundedSender<ServerMessage>,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    setups: Arc<Mutex<Vec<Setup>>>,
}

impl ScriptedEndpoint {
    fn new(reject_extended: bool, fail_all: bool) -> (Arc<Self>, ScriptHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(Mutex::new(Vec::new()));
        let setups = Arc::new(Mutex::new(Vec::new()));
        let endpoint = Arc::new(Self {
            reject_extended,
            fail_all,
            inbound: tokio::sync::Mutex::new(Some(rx)),
            sent: Arc::clone(&sent),
            setups: Arc::clone(&setups),
        });
        (
            endpoint,
            ScriptHandle {
                messages: tx,
                sent,
                setups,
            },
        )
    }
}

#[async_trait]
impl LiveEndpoint for ScriptedEndpoint {
    async fn connect(&self, setup: Setup) -> Result<(Box<dyn LiveSender>, Box<dyn LiveReceiver>)> {
        self.setups.lock().unwrap().push(setup.clone());

        if self.fail_all {
            return Err(Error::TransportFatal("endpoint down".to_string()));
        }
        if setup.grounding && self.reject_extended {
            return Err(Error::TransportRejected(
                "grounding not permitted".to_string(),
            ));
        }

        let inbound = self
            .inbound
            .lock()
            .await
            .take()
            .expect("endpoint connected twice with the same script");

        Ok((
            Box::new(ScriptedSender {
                sent: Arc::clone(&self.sent),
            }),
            Box::new(ScriptedReceiver { inbound }),
        ))
    }
}

struct ScriptedSender {
    sent: Arc<Mutex<Vec<ClientMessage>>>,
}

#[async_trait]
impl LiveSender for ScriptedSender {
    async fn send(&mut self, msg: ClientMessage) -> Result<()> {
        self.sent.lock().unwrap().push(msg);
        Ok(())
    }

    async fn close(&mut self) {}
}

struct ScriptedReceiver {
    inbound: mpsc::UnboundedReceiver<ServerMessage>,
}

#[async_trait]
impl LiveReceiver for ScriptedReceiver {
    async fn next(&mut self) -> Option<Result<ServerMessage>> {
        self.inbound.recv().await.map(Ok)
    }
}

fn audio_message(pcm: &[u8]) -> ServerMessage {
    ServerMessage {
        audio: Some(BASE64.encode(pcm)),
        ..ServerMessage::default()
    }
}

#[tokio::test]
async fn extended_rejection_falls_back_to_minimal() {
    let (endpoint, handle) = ScriptedEndpoint::new(true, false);
    let mut transport = SessionTransport::new(endpoint, "test-model".to_string());

    let _events = transport.connect(None).await.unwrap();

    assert_eq!(transport.state(), TransportState::Connected);
    let setups = handle.setups.lock().unwrap();
    assert_eq!(setups.len(), 2);
    assert!(setups[0].grounding, "first attempt requests grounding");
    assert!(!setups[1].grounding, "retry drops grounding");
}

#[tokio::test]
async fn both_tiers_failing_is_fatal() {
    let (endpoint, handle) = ScriptedEndpoint::new(false, true);
    let mut transport = SessionTransport::new(endpoint, "test-model".to_string());

    let err = transport.connect(None).await.unwrap_err();
    assert!(matches!(err, Error::TransportFatal(_)));
    assert_eq!(transport.state(), TransportState::Disconnected);
    assert_eq!(handle.setups.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn interrupt_suppresses_audio_in_the_same_message() {
    let (endpoint, handle) = ScriptedEndpoint::new(false, false);
    let mut transport = SessionTransport::new(endpoint, "test-model".to_string());
    let mut events = transport.connect(None).await.unwrap();

    // One message carrying both an interrupt and audio: only the interrupt
    // may come through.
    let mut msg = audio_message(&[1, 2, 3, 4]);
    msg.interrupted = true;
    handle.messages.send(msg).unwrap();
    handle.messages.send(audio_message(&[5, 6])).unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Interrupted
    ));
    match events.recv().await.unwrap() {
        SessionEvent::Audio(pcm) => assert_eq!(pcm, vec![5, 6]),
        other => panic!("expected audio, got {}", event_name(&other)),
    }
}

#[tokio::test]
async fn audio_events_preserve_receipt_order() {
    let (endpoint, handle) = ScriptedEndpoint::new(false, false);
    let mut transport = SessionTransport::new(endpoint, "test-model".to_string());
    let mut events = transport.connect(None).await.unwrap();

    for chunk in [&[1u8, 0][..], &[2, 0], &[3, 0]] {
        handle.messages.send(audio_message(chunk)).unwrap();
    }

    for expected in [vec![1u8, 0], vec![2, 0], vec![3, 0]] {
        match events.recv().await.unwrap() {
            SessionEvent::Audio(pcm) => assert_eq!(pcm, expected),
            other => panic!("expected audio, got {}", event_name(&other)),
        }
    }
}

#[tokio::test]
async fn tool_call_blocks_until_acknowledged() {
    let (endpoint, handle) = ScriptedEndpoint::new(false, false);
    let mut transport = SessionTransport::new(endpoint, "test-model".to_string());
    let mut events = transport.connect(None).await.unwrap();

    handle
        .messages
        .send(ServerMessage {
            tool_calls: vec![ToolCall {
                id: "call-7".to_string(),
                name: "change_mode".to_string(),
                args: serde_json::json!({ "mode": "navigate" }),
            }],
            ..ServerMessage::default()
        })
        .unwrap();
    handle.messages.send(audio_message(&[9, 9])).unwrap();

    let SessionEvent::ToolCall { call, respond } = events.recv().await.unwrap() else {
        panic!("expected tool call");
    };
    assert_eq!(call.id, "call-7");

    // The reader must not advance to the audio message before the ack.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(events.try_recv().is_err());
    assert!(
        !handle
            .sent
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, ClientMessage::ToolResponse { .. }))
    );

    respond
        .send(serde_json::json!({ "result": "Switched to navigate mode." }))
        .unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Audio(_)
    ));

    // And the correlated response went back out.
    let sent = handle.sent.lock().unwrap();
    let response = sent
        .iter()
        .find_map(|m| match m {
            ClientMessage::ToolResponse { id, name, .. } => Some((id.clone(), name.clone())),
            _ => None,
        })
        .expect("tool response sent");
    assert_eq!(response, ("call-7".to_string(), "change_mode".to_string()));
}

#[tokio::test]
async fn acknowledgment_flushes_before_deferred_teardown() {
    let (endpoint, handle) = ScriptedEndpoint::new(false, false);
    let mut transport = SessionTransport::new(endpoint, "test-model".to_string());
    let mut events = transport.connect(None).await.unwrap();

    handle
        .messages
        .send(ServerMessage {
            tool_calls: vec![ToolCall {
                id: "end-1".to_string(),
                name: "end_session".to_string(),
                args: serde_json::Value::Null,
            }],
            ..ServerMessage::default()
        })
        .unwrap();

    let SessionEvent::ToolCall { respond, .. } = events.recv().await.unwrap() else {
        panic!("expected tool call");
    };
    respond
        .send(serde_json::json!({ "result": "Session ending." }))
        .unwrap();

    // Teardown of an acknowledged session waits one pump interval; by then
    // the reader must have written the correlated response.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    transport.disconnect().await;

    assert!(
        handle
            .sent
            .lock()
            .unwrap()
            .iter()
            .any(|m| matches!(m, ClientMessage::ToolResponse { id, .. } if id == "end-1"))
    );
}

#[tokio::test]
async fn outbound_frames_dropped_while_disconnected() {
    let (endpoint, handle) = ScriptedEndpoint::new(false, false);
    let transport = SessionTransport::new(endpoint, "test-model".to_string());

    // Never connected: sends are silent no-ops.
    transport.send_audio(&[1, 2]).await;
    transport.send_video(&[3, 4]).await;
    assert!(handle.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn outbound_frames_flow_while_connected() {
    let (endpoint, handle) = ScriptedEndpoint::new(false, false);
    let mut transport = SessionTransport::new(endpoint, "test-model".to_string());
    let _events = transport.connect(None).await.unwrap();

    transport.send_audio(&[1, 2]).await;
    transport.send_video(&[3, 4]).await;

    let sent = handle.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert!(matches!(&sent[0], ClientMessage::RealtimeInput { mime_type, .. }
        if mime_type == "audio/pcm;rate=16000"));
    assert!(matches!(&sent[1], ClientMessage::RealtimeInput { mime_type, .. }
        if mime_type == "image/jpeg"));
}

#[tokio::test]
async fn disconnect_is_idempotent() {
    let (endpoint, _handle) = ScriptedEndpoint::new(false, false);
    let mut transport = SessionTransport::new(endpoint, "test-model".to_string());

    // Safe before ever connecting.
    transport.disconnect().await;
    assert_eq!(transport.state(), TransportState::Disconnected);

    let _events = transport.connect(None).await.unwrap();
    assert_eq!(transport.state(), TransportState::Connected);

    transport.disconnect().await;
    transport.disconnect().await;
    assert_eq!(transport.state(), TransportState::Disconnected);
    assert!(transport.tier().is_none());
}

#[tokio::test]
async fn remote_close_emits_closed_event() {
    let (endpoint, handle) = ScriptedEndpoint::new(false, false);
    let mut transport = SessionTransport::new(endpoint, "test-model".to_string());
    let mut events = transport.connect(None).await.unwrap();

    drop(handle.messages);
    assert!(matches!(
        events.recv().await.unwrap(),
        SessionEvent::Closed
    ));
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Audio(_) => "Audio",
        SessionEvent::Interrupted => "Interrupted",
        SessionEvent::ToolCall { .. } => "ToolCall",
        SessionEvent::Closed => "Closed",
    }
}
