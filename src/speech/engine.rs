//! Speech engine: single owner of the synthesis device
//!
//! The platform speech primitive is global, stateful and unreliable about
//! firing completion callbacks. The engine imposes a two-state machine
//! over it (Idle / Speaking) and guarantees that every submitted utterance
//! resolves to exactly one terminal outcome: natural completion, benign
//! interruption, a genuine error, or a forced timeout when the platform
//! never reports back.

use crate::speech::backends::{BackendEvent, EventKind, SpeechBackend};
use crate::speech::language;
use crate::speech::voices::{Voice, VoiceCatalog};
use crate::{DrillError, Result};
use crossbeam_channel::Receiver;
use log::{debug, warn};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// One text-to-speech playback request
///
/// Value object, constructed fresh per speak call and never mutated after
/// submission.
#[derive(Debug, Clone)]
pub struct UtteranceRequest {
    /// Non-empty, trimmed text
    pub text: String,
    /// BCP 47 language tag, detected from the text unless overridden
    pub language: String,
    /// Rate multiplier, 1.0 = platform normal
    pub rate: f32,
    /// Pitch multiplier, 1.0 = platform normal
    pub pitch: f32,
    /// Volume fraction, 0.0..=1.0
    pub volume: f32,
    /// Explicit voice override; `None` lets the engine pick
    pub voice: Option<Voice>,
}

impl UtteranceRequest {
    /// Build a request, rejecting empty input before it can reach the
    /// synthesis device
    pub fn new(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(DrillError::EmptyInput);
        }
        Ok(Self {
            language: language::detect(trimmed).to_string(),
            text: trimmed.to_string(),
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            voice: None,
        })
    }

    pub fn with_rate(mut self, rate: f32) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.pitch = pitch;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }
}

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wait after cancelling before submitting the next utterance, so the
    /// platform actually clears its queue
    pub settle_delay: Duration,
    /// Force-resolve a speak this long after submission if no terminal
    /// event has arrived
    pub safety_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(50),
            safety_timeout: Duration::from_secs(5),
        }
    }
}

/// Playback state; Cancelling is folded into the transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackState {
    Idle,
    Speaking { seq: u64, deadline: Instant },
}

/// Terminal outcome of one speak request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Natural completion
    Completed,
    /// Cancelled or superseded; not a failure
    Interrupted,
    /// No terminal event arrived before the safety deadline
    TimedOut,
    /// Genuine synthesis error
    Failed(String),
}

impl SpeakOutcome {
    /// Outcomes after which the word counts as spoken
    pub fn is_success(&self) -> bool {
        matches!(self, SpeakOutcome::Completed | SpeakOutcome::TimedOut)
    }
}

/// What a speak call produced
#[derive(Debug)]
pub struct SpeakSubmission {
    /// Sequence number terminal events will carry
    pub seq: u64,
    /// False when the backend rejected the submission; no terminal event
    /// will arrive for it
    pub submitted: bool,
    /// Non-fatal notice for the user (vanished voice override, transient
    /// backend error)
    pub notice: Option<String>,
}

/// The engine itself; all speech flows through here
pub struct SpeechEngine {
    backend: Box<dyn SpeechBackend>,
    catalog: VoiceCatalog,
    events: Receiver<BackendEvent>,
    config: EngineConfig,
    state: PlaybackState,
    next_seq: u64,
    last_error: Option<String>,
    /// User voice preference per 2-letter language prefix
    overrides: HashMap<String, String>,
}

impl SpeechEngine {
    pub fn new(
        backend: Box<dyn SpeechBackend>,
        catalog: VoiceCatalog,
        events: Receiver<BackendEvent>,
        config: EngineConfig,
    ) -> Self {
        Self {
            backend,
            catalog,
            events,
            config,
            state: PlaybackState::Idle,
            next_seq: 0,
            last_error: None,
            overrides: HashMap::new(),
        }
    }

    /// Install user voice preferences (language prefix -> voice id)
    pub fn set_voice_overrides(&mut self, overrides: HashMap<String, String>) {
        self.overrides = overrides;
    }

    /// A clone of the backend event receiver, for select loops
    pub fn event_receiver(&self) -> Receiver<BackendEvent> {
        self.events.clone()
    }

    pub fn catalog(&self) -> &VoiceCatalog {
        &self.catalog
    }

    /// Kick off voice discovery; `tick` drives the retries
    pub fn refresh_voices(&mut self, now: Instant) {
        self.catalog.begin_refresh(now);
    }

    pub fn is_speaking(&self) -> bool {
        matches!(self.state, PlaybackState::Speaking { .. })
    }

    /// Sequence number of the live utterance, if any
    pub fn current_seq(&self) -> Option<u64> {
        match self.state {
            PlaybackState::Speaking { seq, .. } => Some(seq),
            PlaybackState::Idle => None,
        }
    }

    /// Last genuine synthesis error, for diagnostics
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Submit an utterance, superseding any live one
    ///
    /// Cancels the previous utterance, waits out the settle delay, drains
    /// stale events, resolves the voice and submits. The terminal outcome
    /// arrives later through `note_event` or `tick`.
    pub fn speak(&mut self, mut request: UtteranceRequest, now: Instant) -> Result<SpeakSubmission> {
        self.cancel();

        if !self.config.settle_delay.is_zero() {
            std::thread::sleep(self.config.settle_delay);
        }
        // Anything still queued belongs to a superseded utterance
        while self.events.try_recv().is_ok() {}

        let mut notice = None;
        if request.voice.is_none() {
            let prefix = crate::speech::voices::language_prefix(&request.language);
            let override_id = self.overrides.get(&prefix).map(String::as_str);
            let outcome = self.catalog.pick_with_override(&request.language, override_id);
            if outcome.override_missing {
                notice = Some(format!(
                    "Selected {} voice is no longer available, using default",
                    prefix
                ));
            }
            request.voice = outcome.voice.cloned();
        }

        self.next_seq += 1;
        let seq = self.next_seq;

        if let Err(e) = self.backend.speak(seq, &request) {
            // A transient submission failure must not halt the dictation
            // flow; the word just stalls until the user retries.
            warn!("Utterance {} submission failed: {}", seq, e);
            self.last_error = Some(e.to_string());
            self.state = PlaybackState::Idle;
            return Ok(SpeakSubmission {
                seq,
                submitted: false,
                notice: Some(format!("Speech failed: {}", e)),
            });
        }

        self.state = PlaybackState::Speaking {
            seq,
            deadline: now + self.config.safety_timeout,
        };
        Ok(SpeakSubmission {
            seq,
            submitted: true,
            notice,
        })
    }

    /// Stop the live utterance; always safe, idempotent from Idle
    ///
    /// State flips to Idle synchronously even though the platform
    /// cancellation is asynchronous; any late events for the cancelled
    /// utterance are dropped as stale.
    pub fn cancel(&mut self) {
        if let PlaybackState::Speaking { seq, .. } = self.state {
            debug!("Cancelling utterance {}", seq);
            if let Err(e) = self.backend.stop() {
                warn!("Backend stop failed: {}", e);
            }
            self.state = PlaybackState::Idle;
        }
    }

    /// Feed a backend event in; returns the terminal outcome when this
    /// event resolves the live utterance
    ///
    /// Events for superseded utterances (wrong seq, or anything while
    /// Idle) are dropped.
    pub fn note_event(&mut self, event: BackendEvent) -> Option<SpeakOutcome> {
        let PlaybackState::Speaking { seq, .. } = self.state else {
            debug!("Dropping stale backend event {:?}", event);
            return None;
        };
        if event.seq != seq {
            debug!("Dropping event for superseded utterance {:?}", event);
            return None;
        }

        match event.kind {
            EventKind::Started => None,
            EventKind::Ended => {
                self.state = PlaybackState::Idle;
                Some(SpeakOutcome::Completed)
            }
            EventKind::Stopped => {
                self.state = PlaybackState::Idle;
                Some(SpeakOutcome::Interrupted)
            }
            EventKind::Errored(message) => {
                self.state = PlaybackState::Idle;
                if is_benign_interruption(&message) {
                    Some(SpeakOutcome::Interrupted)
                } else {
                    self.last_error = Some(message.clone());
                    Some(SpeakOutcome::Failed(message))
                }
            }
        }
    }

    /// Fire the safety timeout if the deadline has passed
    pub fn tick(&mut self, now: Instant) -> Option<SpeakOutcome> {
        // Drive voice discovery retries alongside the timeout check
        if let Err(e) = self.catalog.poll(self.backend.as_mut(), now) {
            warn!("Voice refresh poll failed: {}", e);
        }

        if let PlaybackState::Speaking { seq, deadline } = self.state {
            if now >= deadline {
                warn!("Utterance {} never reported completion, force-resolving", seq);
                self.state = PlaybackState::Idle;
                return Some(SpeakOutcome::TimedOut);
            }
        }
        None
    }

    /// Earliest instant at which `tick` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        let safety = match self.state {
            PlaybackState::Speaking { deadline, .. } => Some(deadline),
            PlaybackState::Idle => None,
        };
        earliest(safety, self.catalog.next_poll_at())
    }
}

/// Earliest of two optional instants
pub fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Cancellation-class platform errors are not failures
fn is_benign_interruption(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("cancel") || lower.contains("interrupt")
}
