//! Dictation playback state machine
//!
//! Drives test-mode playback: the current word is spoken up to
//! `max_repetitions` times with a pause between repetitions, and the user
//! can skip, go back, pause, mute or switch modes at any point, including
//! mid-utterance. All session fields are mutated only by the transition
//! methods here; pending continuations re-check live state when they fire,
//! so a stale timer can never resurrect cancelled playback.

use crate::speech::engine::{SpeakOutcome, SpeakSubmission, SpeechEngine, UtteranceRequest};
use crate::speech::{earliest, BackendEvent};
use crate::{DrillError, Result};
use crossbeam_channel::Sender;
use log::{debug, warn};
use std::time::{Duration, Instant};

/// Practice shows the word and speaks on demand; test hides it and
/// auto-repeats for dictation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PracticeMode {
    Practice,
    Test,
}

/// Playback run state; muted is tracked separately so un-muting does not
/// auto-resume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Stopped,
    Playing,
    Paused,
}

/// Events observed by the UI and the session progress tracker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DictationEvent {
    /// A repetition of the current word started speaking
    RepetitionBegan { index: usize, repetition: u32 },
    /// The current word changed (next/previous)
    WordAdvanced { index: usize },
    /// The user marked the current word as mastered
    WordCompleted { index: usize },
    /// The repetition cap was reached; no further auto-repeat
    WordExhausted { index: usize },
    Paused,
    Resumed,
    Muted,
    Unmuted,
    ModeChanged(PracticeMode),
    /// Forced pause from a terminal suspend/interrupt
    Suspended,
    /// Non-fatal user-facing notice
    Notice(String),
}

/// Playback tuning, derived from settings and app config
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Repetitions per word in test mode, >= 1
    pub max_repetitions: u32,
    /// Pause between repetitions
    pub repetition_pause: Duration,
    /// Delay before auto-play when entering test mode
    pub start_delay: Duration,
    /// Whether the pause control is active; a forced suspend pauses
    /// regardless
    pub pause_enabled: bool,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_repetitions: 2,
            repetition_pause: Duration::from_millis(1500),
            start_delay: Duration::from_millis(500),
            pause_enabled: true,
            rate: 0.8,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

/// What a pending continuation will do when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContinuationKind {
    /// Speak the same word again at the stored repetition number
    Repetition,
    /// Auto-play after entering test mode, starting at repetition 1
    AutoPlay,
}

/// A scheduled delayed continuation
///
/// Captures the word it was scheduled for; at fire time the controller
/// compares against its *current* state and drops the continuation if
/// anything has changed.
#[derive(Debug, Clone, Copy)]
struct Continuation {
    kind: ContinuationKind,
    index: usize,
    repetition: u32,
    due: Instant,
}

/// The dictation controller: one per active session
pub struct DictationController {
    words: Vec<String>,
    index: usize,
    repetition: u32,
    run_state: RunState,
    muted: bool,
    mode: PracticeMode,
    engine: SpeechEngine,
    pending: Option<Continuation>,
    config: ControllerConfig,
    events: Sender<DictationEvent>,
}

impl DictationController {
    pub fn new(
        words: Vec<String>,
        engine: SpeechEngine,
        config: ControllerConfig,
        events: Sender<DictationEvent>,
    ) -> Result<Self> {
        if words.is_empty() {
            return Err(DrillError::Config("word list is empty".into()));
        }
        if config.max_repetitions == 0 {
            return Err(DrillError::Config("max_repetitions must be >= 1".into()));
        }
        Ok(Self {
            words,
            index: 0,
            repetition: 1,
            run_state: RunState::Stopped,
            muted: false,
            mode: PracticeMode::Practice,
            engine,
            pending: None,
            config,
            events,
        })
    }

    // ========== Accessors ==========

    pub fn current_word(&self) -> &str {
        &self.words[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn repetition(&self) -> u32 {
        self.repetition
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn mode(&self) -> PracticeMode {
        self.mode
    }

    pub fn engine(&self) -> &SpeechEngine {
        &self.engine
    }

    // ========== Transitions ==========
    // The only mutation path for index/repetition/run state.

    /// Begin dictation from the first word
    pub fn start(&mut self, now: Instant) -> Result<()> {
        self.clear_pending();
        self.index = 0;
        self.repetition = 1;
        self.run_state = RunState::Playing;
        if !self.muted {
            self.speak_current(now)?;
        }
        Ok(())
    }

    /// Speak the current word (play button)
    ///
    /// From Paused this resumes; otherwise it replays the current word at
    /// the current repetition. Muted playback is a no-op.
    pub fn play(&mut self, now: Instant) -> Result<()> {
        if self.muted {
            debug!("Play ignored while muted");
            return Ok(());
        }
        if self.run_state == RunState::Paused {
            return self.resume(now);
        }
        self.run_state = RunState::Playing;
        self.speak_current(now)
    }

    /// Advance to the next word, if any
    ///
    /// Cancels speech and any pending continuation immediately; never
    /// auto-speaks. Playing/Paused is preserved.
    pub fn next(&mut self, now: Instant) -> Result<()> {
        let _ = now;
        self.engine.cancel();
        self.clear_pending();
        if self.index + 1 < self.words.len() {
            self.index += 1;
            self.repetition = 1;
            self.emit(DictationEvent::WordAdvanced { index: self.index });
        }
        Ok(())
    }

    /// Go back to the previous word, if not at the first
    pub fn previous(&mut self, now: Instant) -> Result<()> {
        let _ = now;
        self.engine.cancel();
        self.clear_pending();
        if self.index > 0 {
            self.index -= 1;
            self.repetition = 1;
            self.emit(DictationEvent::WordAdvanced { index: self.index });
        }
        Ok(())
    }

    /// Pause or resume playback
    ///
    /// Pausing cancels speech and pending continuations but keeps the
    /// position. Resuming re-speaks the current word from repetition 1;
    /// platform mid-utterance resume is not relied upon.
    pub fn toggle_pause(&mut self, now: Instant) -> Result<()> {
        if !self.config.pause_enabled {
            debug!("Pause control disabled in settings, ignoring");
            return Ok(());
        }
        match self.run_state {
            RunState::Playing => {
                self.engine.cancel();
                self.clear_pending();
                self.run_state = RunState::Paused;
                self.emit(DictationEvent::Paused);
                Ok(())
            }
            RunState::Paused => self.resume(now),
            RunState::Stopped => {
                debug!("Pause toggled while stopped, ignoring");
                Ok(())
            }
        }
    }

    /// Resume from Paused, restarting the word at repetition 1
    fn resume(&mut self, now: Instant) -> Result<()> {
        self.run_state = RunState::Playing;
        self.repetition = 1;
        self.emit(DictationEvent::Resumed);
        if self.muted {
            Ok(())
        } else {
            self.speak_current(now)
        }
    }

    /// Mute or unmute
    ///
    /// Muting cancels playback like a pause; un-muting never auto-resumes,
    /// an explicit play is required.
    pub fn toggle_mute(&mut self, _now: Instant) -> Result<()> {
        if self.muted {
            self.muted = false;
            self.emit(DictationEvent::Unmuted);
        } else {
            self.muted = true;
            self.engine.cancel();
            self.clear_pending();
            self.emit(DictationEvent::Muted);
        }
        Ok(())
    }

    /// Switch between practice and test mode: full playback reset
    ///
    /// Entering test mode schedules auto-play of the current word after a
    /// short start delay, revalidated at fire time like any continuation.
    pub fn switch_mode(&mut self, mode: PracticeMode, now: Instant) -> Result<()> {
        self.engine.cancel();
        self.clear_pending();
        self.repetition = 1;
        self.mode = mode;
        self.emit(DictationEvent::ModeChanged(mode));
        match mode {
            PracticeMode::Test => {
                self.run_state = RunState::Playing;
                self.pending = Some(Continuation {
                    kind: ContinuationKind::AutoPlay,
                    index: self.index,
                    repetition: 1,
                    due: now + self.config.start_delay,
                });
            }
            PracticeMode::Practice => {
                self.run_state = RunState::Stopped;
            }
        }
        Ok(())
    }

    /// Mark the current word as mastered
    pub fn mark_completed(&mut self, _now: Instant) {
        self.emit(DictationEvent::WordCompleted { index: self.index });
    }

    /// Unconditional halt: terminal going away, SIGINT, etc.
    ///
    /// Equivalent to a forced pause so nothing keeps speaking after the
    /// user is gone.
    pub fn suspend(&mut self, _now: Instant) {
        self.engine.cancel();
        self.clear_pending();
        if self.run_state == RunState::Playing {
            self.run_state = RunState::Paused;
        }
        self.emit(DictationEvent::Suspended);
    }

    // ========== Event and timer plumbing ==========

    /// Feed a backend utterance event through the engine
    pub fn handle_backend_event(&mut self, event: BackendEvent, now: Instant) -> Result<()> {
        if let Some(outcome) = self.engine.note_event(event) {
            self.handle_outcome(outcome, now)?;
        }
        Ok(())
    }

    /// Run due timers: engine safety timeout, then pending continuations
    pub fn tick(&mut self, now: Instant) -> Result<()> {
        if let Some(outcome) = self.engine.tick(now) {
            self.handle_outcome(outcome, now)?;
        }
        self.fire_pending(now)
    }

    /// Earliest instant at which `tick` has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        earliest(self.engine.next_deadline(), self.pending.map(|p| p.due))
    }

    /// React to the terminal outcome of a speak request
    fn handle_outcome(&mut self, outcome: SpeakOutcome, now: Instant) -> Result<()> {
        match outcome {
            SpeakOutcome::Interrupted => Ok(()),
            SpeakOutcome::Failed(message) => {
                // Auto-repetition halts for this word; the session and the
                // current index are untouched and the user can replay.
                warn!("Synthesis failed, halting auto-repeat: {}", message);
                self.emit(DictationEvent::Notice(format!("Speech failed: {}", message)));
                Ok(())
            }
            outcome if outcome.is_success() => {
                if self.run_state != RunState::Playing
                    || self.muted
                    || self.mode != PracticeMode::Test
                {
                    return Ok(());
                }
                if self.repetition < self.config.max_repetitions {
                    self.pending = Some(Continuation {
                        kind: ContinuationKind::Repetition,
                        index: self.index,
                        repetition: self.repetition + 1,
                        due: now + self.config.repetition_pause,
                    });
                } else {
                    self.emit(DictationEvent::WordExhausted { index: self.index });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Fire a due continuation if it is still valid
    ///
    /// Validity is checked against *current* state, not the state captured
    /// at scheduling time: still playing, not muted, same word. Anything
    /// else makes the continuation a no-op.
    fn fire_pending(&mut self, now: Instant) -> Result<()> {
        let Some(pending) = self.pending else {
            return Ok(());
        };
        if now < pending.due {
            return Ok(());
        }
        self.pending = None;

        if self.run_state != RunState::Playing || self.muted || pending.index != self.index {
            debug!("Dropping stale continuation {:?}", pending.kind);
            return Ok(());
        }

        match pending.kind {
            ContinuationKind::Repetition => {
                self.repetition = pending.repetition;
            }
            ContinuationKind::AutoPlay => {
                self.repetition = 1;
            }
        }
        self.speak_current(now)
    }

    fn speak_current(&mut self, now: Instant) -> Result<()> {
        let request = UtteranceRequest::new(&self.words[self.index])?
            .with_rate(self.config.rate)
            .with_pitch(self.config.pitch)
            .with_volume(self.config.volume);
        let SpeakSubmission { notice, submitted, .. } = self.engine.speak(request, now)?;
        if let Some(notice) = notice {
            self.emit(DictationEvent::Notice(notice));
        }
        if submitted {
            self.emit(DictationEvent::RepetitionBegan {
                index: self.index,
                repetition: self.repetition,
            });
        }
        Ok(())
    }

    fn clear_pending(&mut self) {
        self.pending = None;
    }

    fn emit(&self, event: DictationEvent) {
        // Receiver gone means the UI has shut down; nothing to do
        let _ = self.events.send(event);
    }
}
