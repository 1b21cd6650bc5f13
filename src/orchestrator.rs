//! Session orchestrator
//!
//! Root component: owns the operating mode, the session and guardian flags,
//! and every media component, and runs the main event loop. While no session
//! is active the command recognizer holds the microphone; the instant a
//! session starts the recognizer is released and the capture pipeline takes
//! over. The two never listen at once.

use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tokio::sync::{mpsc, watch};

use crate::audio::{AudioCapture, PlaybackScheduler};
use crate::guardian::{HazardMonitor, HazardTier, TICK_INTERVAL};
use crate::live::endpoint::LiveEndpoint;
use crate::live::protocol::ToolCall;
use crate::live::{SessionEvent, SessionTransport, TextReader};
use crate::navigation::LocationProvider;
use crate::speech::{CommandAction, CommandRecognizer, FeedbackVoice, SpeechToText, parse_transcript};
use crate::{Config, Error, Result};

/// Delay between a recognized session-start intent and the actual start, so
/// mode and guardian updates land before the session setup reads them
const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Cadence of outbound video frames during an active session
const VIDEO_INTERVAL: Duration = Duration::from_secs(1);

/// Cadence of the recognizer poll while no session is active
const RECOGNIZER_POLL: Duration = Duration::from_millis(100);

/// Cadence of the session event pump
const PUMP_INTERVAL: Duration = Duration::from_millis(20);

const SPOKEN_ONLINE: &str = "Lumen online.";
const SPOKEN_SESSION_ENDED: &str = "Session ended.";
const SPOKEN_MIC_MISSING: &str = "Microphone not found. Please check your device.";
const SPOKEN_MODEL_UNAVAILABLE: &str = "Model not available. Please check your configuration.";
const SPOKEN_CONNECT_FAILED: &str = "Connection failed. Please try again.";
const SPOKEN_CAMERA_MISSING: &str = "Camera not available.";
const SPOKEN_CAPTURING: &str = "Capturing. Scanning text.";
const SPOKEN_GUARDIAN_OFF: &str = "Guardian deactivated.";
const SPOKEN_READ_MODE: &str = "Read mode active. Say capture to scan.";

/// Operating mode. Exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Describe,
    Guardian,
    Read,
    Navigate,
}

impl Mode {
    /// Parse a mode name, case-insensitively
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "describe" => Some(Self::Describe),
            "guardian" => Some(Self::Guardian),
            "read" => Some(Self::Read),
            "navigate" => Some(Self::Navigate),
            _ => None,
        }
    }

    /// Spoken name of the mode
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Describe => "describe",
            Self::Guardian => "guardian",
            Self::Read => "read",
            Self::Navigate => "navigate",
        }
    }

    /// Whether live video frames are streamed to the session in this mode
    #[must_use]
    pub const fn streams_video(self) -> bool {
        matches!(self, Self::Describe | Self::Navigate | Self::Guardian)
    }
}

/// Camera seam: the orchestrator only needs one frame at a time
pub trait FrameSource: Send {
    /// Grab the current camera frame at full resolution
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceUnavailable`] when the camera is missing or
    /// cannot deliver a frame.
    fn capture_frame(&mut self) -> Result<DynamicImage>;
}

/// A pending READ-mode capture and its transcription
struct CapturedFrame {
    jpeg: Vec<u8>,
    text: Option<String>,
}

impl CapturedFrame {
    fn image(&self) -> &[u8] {
        &self.jpeg
    }

    fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

/// Composes the audio pipeline, session transport, recognizer, and hazard
/// monitor into the running gateway
pub struct Orchestrator {
    config: Config,
    mode: Mode,
    guardian_active: bool,
    session_active: bool,
    pending_end: bool,

    playback: PlaybackScheduler,
    feedback: FeedbackVoice,
    transport: SessionTransport,
    text_reader: TextReader,
    stt: Arc<SpeechToText>,
    location_provider: Box<dyn LocationProvider>,
    frame_source: Option<Box<dyn FrameSource>>,

    recognizer: Option<CommandRecognizer>,
    capture: Option<AudioCapture>,
    mic_rx: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
    events: Option<mpsc::Receiver<SessionEvent>>,

    hazard: HazardMonitor,
    hazard_tier: watch::Receiver<HazardTier>,
    captured: Option<CapturedFrame>,
}

impl Orchestrator {
    /// Build the orchestrator and all owned components.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is incomplete or the output device
    /// cannot be opened; the gateway cannot run without a speaker.
    pub fn new(config: Config, endpoint: Arc<dyn LiveEndpoint>) -> Result<Self> {
        let playback = PlaybackScheduler::new()?;
        let feedback = FeedbackVoice::new(config.feedback_tts()?);
        let transport = SessionTransport::new(endpoint, config.live.model.clone());
        let text_reader = config.text_reader()?;
        let stt = Arc::new(config.speech_to_text()?);
        let location_provider: Box<dyn LocationProvider> = Box::new(config.location_provider());
        let (hazard, hazard_tier) = HazardMonitor::new();

        Ok(Self {
            config,
            mode: Mode::default(),
            guardian_active: false,
            session_active: false,
            pending_end: false,
            playback,
            feedback,
            transport,
            text_reader,
            stt,
            location_provider,
            frame_source: None,
            recognizer: None,
            capture: None,
            mic_rx: None,
            events: None,
            hazard,
            hazard_tier,
            captured: None,
        })
    }

    /// Attach a camera
    #[must_use]
    pub fn with_frame_source(mut self, source: Box<dyn FrameSource>) -> Self {
        self.frame_source = Some(source);
        self
    }

    /// Current operating mode
    #[must_use]
    pub const fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether a live session is active
    #[must_use]
    pub const fn session_active(&self) -> bool {
        self.session_active
    }

    /// Whether the guardian safety system is on
    #[must_use]
    pub const fn guardian_active(&self) -> bool {
        self.guardian_active
    }

    /// Latest hazard tier, for an alert surface
    #[must_use]
    pub fn hazard_tier(&self) -> HazardTier {
        *self.hazard_tier.borrow()
    }

    /// Run until shutdown is requested
    ///
    /// # Errors
    ///
    /// Returns an error only on unrecoverable initialization failures;
    /// runtime failures surface as spoken feedback.
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self, shutdown_rx: &mut mpsc::Receiver<()>) -> Result<()> {
        self.start_recognizer();
        tracing::info!("orchestrator running");

        let mut pump = tokio::time::interval(PUMP_INTERVAL);
        let mut poll = tokio::time::interval(RECOGNIZER_POLL);
        let mut video = tokio::time::interval(VIDEO_INTERVAL);
        let mut hazard = tokio::time::interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("shutdown requested");
                    break;
                }
                _ = pump.tick() => self.pump_session().await,
                _ = poll.tick() => self.poll_recognizer().await,
                _ = video.tick() => self.send_video_frame().await,
                _ = hazard.tick() => self.hazard_tick(),
            }
        }

        self.stop_session(false).await;
        if let Some(mut recognizer) = self.recognizer.take() {
            recognizer.stop();
        }
        self.playback.close();
        tracing::info!("orchestrator stopped");
        Ok(())
    }

    /// Forward microphone frames and apply pending session events, in order
    async fn pump_session(&mut self) {
        if !self.session_active {
            return;
        }

        // Teardown requested by a tool call waits until the next tick, so
        // the reader has a full pump interval to write the correlated
        // acknowledgment before the connection goes away.
        if self.pending_end {
            self.pending_end = false;
            self.stop_session(true).await;
            return;
        }

        while let Some(frame) = self.mic_rx.as_mut().and_then(|rx| rx.try_recv().ok()) {
            self.transport.send_audio(&frame).await;
        }

        let mut closed = false;
        loop {
            let event = match self.events.as_mut().map(mpsc::Receiver::try_recv) {
                Some(Ok(event)) => event,
                Some(Err(mpsc::error::TryRecvError::Disconnected)) => {
                    closed = true;
                    break;
                }
                _ => break,
            };

            match event {
                SessionEvent::Audio(pcm) => self.playback.play_audio_data(&pcm),
                SessionEvent::Interrupted => {
                    tracing::debug!("barge-in, silencing playback");
                    self.feedback.interrupt(&self.playback);
                }
                SessionEvent::ToolCall { call, respond } => {
                    let response = self.dispatch_tool_call(&call);
                    let _ = respond.send(response);
                }
                SessionEvent::Closed => {
                    closed = true;
                    break;
                }
            }
        }

        if closed {
            tracing::info!("session closed by remote");
            self.stop_session(true).await;
        }
    }

    /// Apply one remote tool call and produce its acknowledgment
    fn dispatch_tool_call(&mut self, call: &ToolCall) -> serde_json::Value {
        tracing::info!(id = %call.id, name = %call.name, "tool call");

        let effect = tool_effect(call);
        if let Some(mode) = effect.mode {
            self.mode = mode;
        }
        if let Some(active) = effect.guardian {
            self.set_guardian(active);
        }
        if effect.end_session {
            self.pending_end = true;
        }
        effect.ack
    }

    /// Evaluate any finished utterance from the command recognizer
    #[allow(clippy::future_not_send)]
    async fn poll_recognizer(&mut self) {
        if self.session_active {
            return;
        }
        let Some(recognizer) = self.recognizer.as_mut() else {
            return;
        };
        let Some(transcript) = recognizer.poll().await else {
            return;
        };

        let outcome = parse_transcript(&transcript, self.mode);
        tracing::info!(transcript = %transcript, ?outcome, "voice command");

        if outcome.interrupt_speech {
            self.feedback.interrupt(&self.playback);
        }

        match outcome.action {
            CommandAction::None => {}
            CommandAction::Silence => {
                self.feedback.interrupt(&self.playback);
                // A pure silence command also dismisses a pending capture.
                self.captured = None;
            }
            CommandAction::Capture => {
                self.read_capture().await;
            }
            CommandAction::DeactivateGuardian => {
                self.set_guardian(false);
                self.feedback.speak(&self.playback, SPOKEN_GUARDIAN_OFF).await;
            }
            CommandAction::StartSession {
                mode,
                activate_guardian,
            } => {
                if let Some(mode) = mode {
                    self.mode = mode;
                }
                if activate_guardian {
                    self.set_guardian(true);
                }

                if self.mode == Mode::Read {
                    // Read mode is session-free.
                    self.feedback.speak(&self.playback, SPOKEN_READ_MODE).await;
                } else {
                    tokio::time::sleep(SETTLE_DELAY).await;
                    self.start_session().await;
                }
            }
        }
    }

    /// Start a live session: release the recognizer, take the microphone,
    /// connect with capability fallback. All failures are spoken.
    #[allow(clippy::future_not_send)]
    async fn start_session(&mut self) {
        if self.session_active {
            return;
        }

        if let Some(mut recognizer) = self.recognizer.take() {
            recognizer.stop();
        }

        let location = match tokio::time::timeout(
            Duration::from_secs(5),
            self.location_provider.locate(),
        )
        .await
        {
            Ok(Ok(location)) => Some(location),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "proceeding without location");
                None
            }
            Err(_) => {
                tracing::warn!("location timed out, proceeding without");
                None
            }
        };

        let (mic_tx, mic_rx) = mpsc::unbounded_channel();
        let capture = match AudioCapture::open(move |frame| {
            let _ = mic_tx.send(frame);
        }) {
            Ok(capture) => capture,
            Err(e) => {
                tracing::error!(error = %e, "microphone unavailable");
                self.feedback.speak(&self.playback, SPOKEN_MIC_MISSING).await;
                self.start_recognizer();
                return;
            }
        };

        match self.transport.connect(location).await {
            Ok(events) => {
                self.capture = Some(capture);
                self.mic_rx = Some(mic_rx);
                self.events = Some(events);
                self.session_active = true;
                tracing::info!(mode = %self.mode.name(), "session started");
                self.feedback.speak(&self.playback, SPOKEN_ONLINE).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "session start failed");
                drop(capture);
                let spoken = match &e {
                    Error::TransportFatal(msg) if msg.to_lowercase().contains("model") => {
                        SPOKEN_MODEL_UNAVAILABLE
                    }
                    _ => SPOKEN_CONNECT_FAILED,
                };
                self.feedback.speak(&self.playback, spoken).await;
                self.start_recognizer();
            }
        }
    }

    /// Tear the session down and give the microphone back to the recognizer.
    /// Safe to call from any state.
    #[allow(clippy::future_not_send)]
    async fn stop_session(&mut self, announce: bool) {
        let was_active = self.session_active;
        self.session_active = false;
        self.pending_end = false;

        self.transport.disconnect().await;
        if let Some(mut capture) = self.capture.take() {
            capture.close();
        }
        self.mic_rx = None;
        self.events = None;
        self.playback.stop_all();

        if was_active {
            tracing::info!("session stopped");
            if announce {
                self.feedback.speak(&self.playback, SPOKEN_SESSION_ENDED).await;
            }
        }
        self.start_recognizer();
    }

    /// Start the recognizer if nothing else holds the microphone
    fn start_recognizer(&mut self) {
        if self.session_active || self.recognizer.is_some() {
            return;
        }
        match CommandRecognizer::start(Arc::clone(&self.stt)) {
            Ok(recognizer) => self.recognizer = Some(recognizer),
            Err(e) => {
                tracing::warn!(error = %e, "voice commands unavailable");
            }
        }
    }

    /// READ-mode capture: one full-resolution frame, transcribed and spoken
    #[allow(clippy::future_not_send)]
    async fn read_capture(&mut self) {
        // The recognizer is paused so it does not transcribe our own speech.
        let recognizer = self.recognizer.take();

        self.feedback.speak(&self.playback, SPOKEN_CAPTURING).await;

        let frame = match self.frame_source.as_mut().map(|s| s.capture_frame()) {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                tracing::error!(error = %e, "frame capture failed");
                self.feedback.speak(&self.playback, SPOKEN_CAMERA_MISSING).await;
                self.restore_recognizer(recognizer);
                return;
            }
            None => {
                self.feedback.speak(&self.playback, SPOKEN_CAMERA_MISSING).await;
                self.restore_recognizer(recognizer);
                return;
            }
        };

        let result = match encode_jpeg(&frame, 90) {
            Ok(jpeg) => {
                let text = self.text_reader.read_image(&jpeg).await;
                self.captured = Some(CapturedFrame {
                    jpeg,
                    text: Some(text.clone()),
                });
                text
            }
            Err(e) => {
                tracing::error!(error = %e, "frame encode failed");
                crate::live::ocr::READ_FAILED.to_string()
            }
        };

        // The user may have said stop while the OCR was in flight.
        if self.feedback.is_interrupted() {
            tracing::debug!("read result dropped, interrupted");
            self.captured = None;
            self.restore_recognizer(recognizer);
            return;
        }

        self.feedback.speak_and_wait(&self.playback, &result).await;
        self.captured = None;
        self.restore_recognizer(recognizer);
    }

    fn restore_recognizer(&mut self, recognizer: Option<CommandRecognizer>) {
        self.recognizer = recognizer;
        self.start_recognizer();
    }

    /// Stream one frame to the session, in video-streaming modes only
    #[allow(clippy::future_not_send)]
    async fn send_video_frame(&mut self) {
        if !self.session_active || !self.mode.streams_video() {
            return;
        }
        let Some(source) = self.frame_source.as_mut() else {
            return;
        };

        match source.capture_frame().and_then(|f| encode_jpeg(&f, 70)) {
            Ok(jpeg) => self.transport.send_video(&jpeg).await,
            Err(e) => tracing::debug!(error = %e, "video frame skipped"),
        }
    }

    /// One hazard-monitor sample; runs whenever the guardian is on,
    /// session or not
    fn hazard_tick(&mut self) {
        if !self.guardian_active {
            return;
        }
        let Some(source) = self.frame_source.as_mut() else {
            return;
        };

        match source.capture_frame() {
            Ok(frame) => {
                self.hazard.tick(&frame);
            }
            Err(e) => tracing::debug!(error = %e, "hazard sample skipped"),
        }
    }

    fn set_guardian(&mut self, active: bool) {
        if self.guardian_active == active {
            return;
        }
        self.guardian_active = active;
        tracing::info!(active, "guardian state changed");
        if !active {
            self.hazard.reset();
        }
    }

    /// Read the pending capture's transcription, if any (for a UI surface)
    #[must_use]
    pub fn captured_text(&self) -> Option<&str> {
        self.captured.as_ref().and_then(CapturedFrame::text)
    }

    /// Read the pending capture's image, if any (for a UI surface)
    #[must_use]
    pub fn captured_image(&self) -> Option<&[u8]> {
        self.captured.as_ref().map(CapturedFrame::image)
    }

    /// Reference to the shared config
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }
}

/// State changes requested by one remote tool call.
///
/// Separated from the orchestrator so the dispatch table is testable without
/// audio hardware; [`Orchestrator::dispatch_tool_call`] applies the deltas.
#[derive(Debug, Default, PartialEq)]
struct ToolEffect {
    mode: Option<Mode>,
    guardian: Option<bool>,
    end_session: bool,
    ack: serde_json::Value,
}

/// Map a tool call onto the state deltas and acknowledgment it produces.
/// Unknown names and malformed arguments are null no-ops.
fn tool_effect(call: &ToolCall) -> ToolEffect {
    match call.name.as_str() {
        "change_mode" => {
            let target = call.args["mode"]
                .as_str()
                .or_else(|| call.args["targetMode"].as_str())
                .and_then(Mode::from_name);

            target.map_or_else(ToolEffect::default, |mode| {
                if mode == Mode::Read {
                    // Read works session-free; the session that issued this
                    // call ends once the acknowledgment is out.
                    ToolEffect {
                        mode: Some(mode),
                        end_session: true,
                        ack: serde_json::json!({ "result": SPOKEN_READ_MODE }),
                        ..ToolEffect::default()
                    }
                } else {
                    ToolEffect {
                        mode: Some(mode),
                        ack: serde_json::json!({
                            "result": format!("Switched to {} mode.", mode.name())
                        }),
                        ..ToolEffect::default()
                    }
                }
            })
        }
        "set_guardian_state" => {
            let active = match &call.args["active"] {
                serde_json::Value::Bool(b) => Some(*b),
                serde_json::Value::String(s) => match s.as_str() {
                    "true" => Some(true),
                    "false" => Some(false),
                    _ => None,
                },
                _ => None,
            };

            active.map_or_else(ToolEffect::default, |active| ToolEffect {
                guardian: Some(active),
                ack: serde_json::json!({
                    "result": if active {
                        "Guardian system activated."
                    } else {
                        "Guardian system deactivated."
                    }
                }),
                ..ToolEffect::default()
            })
        }
        "end_session" => ToolEffect {
            end_session: true,
            ack: serde_json::json!({ "result": "Session ending." }),
            ..ToolEffect::default()
        },
        other => {
            tracing::warn!(name = other, "unknown tool call ignored");
            ToolEffect::default()
        }
    }
}

/// Encode a frame as JPEG at the given quality
fn encode_jpeg(frame: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, quality);
    frame
        .write_with_encoder(encoder)
        .map_err(|e| Error::Frame(e.to_string()))?;
    Ok(out)
}
