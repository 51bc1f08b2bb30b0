//! Speech backends
//!
//! A backend owns the actual synthesis device. It reports utterance
//! lifecycle events over a channel because the platform delivers them on
//! its own threads, and delivery is not guaranteed - the engine's safety
//! timeout covers backends (and platforms) that never fire a terminal
//! event for an utterance.

// Native TTS backend using the tts crate (cross-platform)
pub mod native;

use crate::speech::engine::UtteranceRequest;
use crate::speech::voices::Voice;
use crate::Result;
use crossbeam_channel::Sender;
use log::info;

/// Utterance lifecycle event, tagged with the engine-assigned sequence
/// number so stale events from superseded utterances can be dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEvent {
    pub seq: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Playback started
    Started,
    /// Natural completion
    Ended,
    /// Stopped by a cancellation
    Stopped,
    /// Platform error; the engine decides whether it is benign
    Errored(String),
}

impl BackendEvent {
    pub fn new(seq: u64, kind: EventKind) -> Self {
        Self { seq, kind }
    }
}

/// Speech backend trait
///
/// The engine serializes all access; exactly one utterance is live at a
/// time, and `speak` is only called after any previous utterance has been
/// stopped.
pub trait SpeechBackend: Send {
    /// Enumerate the currently available voices
    ///
    /// May legitimately return an empty list shortly after startup; the
    /// voice catalog retries.
    fn voices(&mut self) -> Result<Vec<Voice>>;

    /// Submit an utterance for playback
    ///
    /// Lifecycle events for it must carry `seq`.
    fn speak(&mut self, seq: u64, request: &UtteranceRequest) -> Result<()>;

    /// Stop the current utterance, if any
    fn stop(&mut self) -> Result<()>;
}

/// Create the platform speech backend
///
/// Initialization failure means the platform has no synthesis capability
/// at all; callers surface this once and disable playback controls.
pub fn create_backend(events: Sender<BackendEvent>) -> Result<Box<dyn SpeechBackend>> {
    let backend = native::NativeBackend::new(events)?;
    info!("Speech backend initialized");
    Ok(Box::new(backend))
}
