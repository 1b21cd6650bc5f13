//! Live session wire protocol
//!
//! JSON message types exchanged with the multimodal live endpoint, the tool
//! declarations the assistant may invoke, and the system preamble that shapes
//! its behavior. Payloads (PCM audio, JPEG frames) travel base64-encoded
//! inside text frames.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::navigation::Location;

/// Mime type for outbound microphone audio
pub const AUDIO_MIME: &str = "audio/pcm;rate=16000";

/// Mime type for outbound video frames
pub const VIDEO_MIME: &str = "image/jpeg";

/// Capability tier requested at session setup.
///
/// `Extended` asks for search and map grounding; some backends reject that
/// configuration, in which case the transport falls back to `Minimal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapabilityTier {
    Extended,
    Minimal,
}

impl CapabilityTier {
    /// The tier to retry with after a pre-connect rejection, if any
    #[must_use]
    pub const fn fallback(self) -> Option<Self> {
        match self {
            Self::Extended => Some(Self::Minimal),
            Self::Minimal => None,
        }
    }
}

/// A function the assistant may call during the session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Session setup sent as the first message after the socket opens
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Setup {
    pub model: String,
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub grounding: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_location: Option<Location>,
}

/// Messages sent to the endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput {
        mime_type: String,
        data: String,
    },
    ToolResponse {
        id: String,
        name: String,
        response: serde_json::Value,
    },
}

impl ClientMessage {
    /// Wrap a PCM frame for transmission
    #[must_use]
    pub fn audio(pcm: &[u8]) -> Self {
        Self::RealtimeInput {
            mime_type: AUDIO_MIME.to_string(),
            data: BASE64.encode(pcm),
        }
    }

    /// Wrap a JPEG frame for transmission
    #[must_use]
    pub fn video(jpeg: &[u8]) -> Self {
        Self::RealtimeInput {
            mime_type: VIDEO_MIME.to_string(),
            data: BASE64.encode(jpeg),
        }
    }
}

/// A tool invocation requested by the assistant
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// One inbound message from the endpoint.
///
/// A single message may carry any combination of an interruption signal,
/// an audio chunk, and tool calls.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub session_rejected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerMessage {
    /// Decode the base64 audio payload, if present
    #[must_use]
    pub fn decode_audio(&self) -> Option<Vec<u8>> {
        let data = self.audio.as_ref()?;
        match BASE64.decode(data) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::warn!(error = %e, "discarding undecodable audio payload");
                None
            }
        }
    }
}

/// Tool declarations available in every session
#[must_use]
pub fn core_tools() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration {
            name: "change_mode".to_string(),
            description: "Switch the assistant's operating mode. Valid modes: \
                          describe, navigate, read, guardian."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "mode": { "type": "string", "enum": ["describe", "navigate", "read", "guardian"] }
                },
                "required": ["mode"]
            }),
        },
        ToolDeclaration {
            name: "set_guardian_state".to_string(),
            description: "Activate or deactivate guardian hazard monitoring.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "active": { "type": "boolean" }
                },
                "required": ["active"]
            }),
        },
        ToolDeclaration {
            name: "end_session".to_string(),
            description: "End the live session when the user says goodbye or asks to stop."
                .to_string(),
            parameters: serde_json::json!({ "type": "object", "properties": {} }),
        },
    ]
}

/// System preamble sent with session setup.
///
/// When a location fix is available it is appended as explicit system data so
/// navigation answers can reference where the user actually is.
#[must_use]
pub fn system_instruction(location: Option<&Location>) -> String {
    let mut instruction = String::from(
        "You are Lumen, a digital visual cortex for a visually impaired user. \
         You see through their camera and speak what matters: obstacles, text, \
         people, and the layout of the space ahead. Be concise, calm, and \
         concrete. Distances in steps or meters. Never describe what you \
         cannot see. When the user asks to change how you help (describe, \
         navigate, read, guardian), call change_mode. When they ask for \
         hazard watching, call set_guardian_state. When they say goodbye, \
         call end_session.",
    );

    if let Some(loc) = location {
        instruction.push_str(&format!(
            "\n\n[SYSTEM DATA] USER LOCATION: latitude {:.6}, longitude {:.6}",
            loc.latitude, loc.longitude
        ));
    }

    instruction
}

/// Build the setup message for a capability tier.
///
/// The minimal tier drops the location preamble along with the grounding
/// tools: it exists because the backend refused the location-grounded
/// configuration, so the retry carries no location at all.
#[must_use]
pub fn build_setup(model: &str, tier: CapabilityTier, location: Option<&Location>) -> Setup {
    let extended = tier == CapabilityTier::Extended;
    let location = if extended { location } else { None };
    Setup {
        model: model.to_string(),
        system_instruction: system_instruction(location),
        tools: core_tools(),
        grounding: extended,
        retrieval_location: location.copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_message_uses_pcm_mime() {
        let msg = ClientMessage::audio(&[0x01, 0x02]);
        let ClientMessage::RealtimeInput { mime_type, data } = msg else {
            panic!("expected realtime input");
        };
        assert_eq!(mime_type, AUDIO_MIME);
        assert_eq!(BASE64.decode(data).unwrap(), vec![0x01, 0x02]);
    }

    #[test]
    fn server_message_round_trips() {
        let json = r#"{"interrupted":true,"audio":"AAA=","tool_calls":[{"id":"7","name":"end_session","args":{}}]}"#;
        let msg: ServerMessage = serde_json::from_str(json).unwrap();
        assert!(msg.interrupted);
        assert!(msg.decode_audio().is_some());
        assert_eq!(msg.tool_calls[0].name, "end_session");
    }

    #[test]
    fn missing_fields_default() {
        let msg: ServerMessage = serde_json::from_str("{}").unwrap();
        assert!(!msg.interrupted);
        assert!(msg.audio.is_none());
        assert!(msg.tool_calls.is_empty());
    }

    #[test]
    fn extended_setup_carries_grounding_and_location() {
        let loc = Location {
            latitude: 51.5,
            longitude: -0.12,
        };
        let setup = build_setup("lumen-live-1", CapabilityTier::Extended, Some(&loc));
        assert!(setup.grounding);
        assert!(setup.retrieval_location.is_some());
        assert!(setup.system_instruction.contains("[SYSTEM DATA] USER LOCATION"));
        assert!(setup.system_instruction.contains("51.5"));
    }

    #[test]
    fn minimal_setup_omits_grounding() {
        let setup = build_setup("lumen-live-1", CapabilityTier::Minimal, None);
        assert!(!setup.grounding);
        assert!(setup.retrieval_location.is_none());
        assert!(!setup.system_instruction.contains("[SYSTEM DATA]"));
    }

    #[test]
    fn minimal_setup_drops_location_preamble() {
        let loc = Location {
            latitude: 51.5,
            longitude: -0.12,
        };
        let setup = build_setup("lumen-live-1", CapabilityTier::Minimal, Some(&loc));
        assert!(!setup.grounding);
        assert!(setup.retrieval_location.is_none());
        assert!(!setup.system_instruction.contains("[SYSTEM DATA]"));
    }

    #[test]
    fn minimal_tier_has_no_further_fallback() {
        assert_eq!(
            CapabilityTier::Extended.fallback(),
            Some(CapabilityTier::Minimal)
        );
        assert_eq!(CapabilityTier::Minimal.fallback(), None);
    }
}
