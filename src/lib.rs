//! Lumen Gateway - realtime session core for an assistive vision gateway
//!
//! Lumen acts as a digital visual cortex for visually-impaired users: it
//! streams camera and microphone data to a multimodal live endpoint, plays
//! the assistant's spoken replies gaplessly with instant barge-in, listens
//! for local voice commands between sessions, and watches for motion hazards
//! with audible sonification.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Orchestrator                        │
//! │   mode / session / guardian state, event loop        │
//! └──────┬──────────┬───────────┬──────────┬────────────┘
//!        │          │           │          │
//! ┌──────▼───┐ ┌────▼─────┐ ┌───▼─────┐ ┌──▼─────────┐
//! │  audio   │ │   live   │ │ speech  │ │  guardian  │
//! │ capture  │ │ transport│ │ commands│ │   hazard   │
//! │ playback │ │ protocol │ │ STT/TTS │ │ sonifier   │
//! └──────────┘ └──────────┘ └─────────┘ └────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod guardian;
pub mod live;
pub mod navigation;
pub mod orchestrator;
pub mod speech;

pub use config::Config;
pub use error::{Error, Result};
pub use guardian::{HazardMonitor, HazardTier};
pub use live::{SessionEvent, SessionTransport, TransportState};
pub use navigation::{Location, LocationProvider};
pub use orchestrator::{FrameSource, Mode, Orchestrator};
