//! Live session layer: wire protocol, endpoint abstraction, the session
//! transport state machine, and the single-shot text reader.

pub mod endpoint;
pub mod ocr;
pub mod protocol;
pub mod transport;

pub use endpoint::{LiveEndpoint, LiveReceiver, LiveSender, WsEndpoint};
pub use ocr::TextReader;
pub use protocol::{CapabilityTier, ServerMessage, ToolCall};
pub use transport::{SessionEvent, SessionTransport, TransportState};
