//! Shared test fixture: a scripted speech backend with a fabricated clock
//!
//! Playback tests never touch the real synthesis device or real timers;
//! the backend records submissions and the tests feed lifecycle events and
//! advance time explicitly.

use crossbeam_channel::{unbounded, Receiver, Sender};
use spelldrill::dictation::{ControllerConfig, DictationController, DictationEvent};
use spelldrill::speech::{
    BackendEvent, EngineConfig, EventKind, SpeechBackend, SpeechEngine, UtteranceRequest, Voice,
    VoiceCatalog,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Everything the scripted backend records
#[derive(Default)]
pub struct BackendLog {
    /// (seq, text) per accepted speak call
    pub spoken: Vec<(u64, String)>,
    pub stops: usize,
    /// Next speak call fails with this message
    pub fail_next_speak: Option<String>,
}

pub struct ScriptedBackend {
    log: Arc<Mutex<BackendLog>>,
    voices: Vec<Voice>,
}

impl SpeechBackend for ScriptedBackend {
    fn voices(&mut self) -> spelldrill::Result<Vec<Voice>> {
        Ok(self.voices.clone())
    }

    fn speak(&mut self, seq: u64, request: &UtteranceRequest) -> spelldrill::Result<()> {
        let mut log = self.log.lock().unwrap();
        if let Some(message) = log.fail_next_speak.take() {
            return Err(spelldrill::DrillError::Speech(message));
        }
        log.spoken.push((seq, request.text.clone()));
        Ok(())
    }

    fn stop(&mut self) -> spelldrill::Result<()> {
        self.log.lock().unwrap().stops += 1;
        Ok(())
    }
}

pub struct Fixture {
    pub controller: DictationController,
    pub events: Receiver<DictationEvent>,
    pub log: Arc<Mutex<BackendLog>>,
    /// Keeps the backend event channel open for the engine's drain
    _backend_tx: Sender<BackendEvent>,
}

impl Fixture {
    /// Texts of all accepted speak calls, in submission order
    pub fn spoken(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .spoken
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn speak_count(&self) -> usize {
        self.log.lock().unwrap().spoken.len()
    }

    /// Resolve the live utterance with the given lifecycle event
    pub fn resolve(&mut self, kind: EventKind, now: Instant) {
        let seq = self
            .controller
            .engine()
            .current_seq()
            .expect("no live utterance to resolve");
        self.controller
            .handle_backend_event(BackendEvent::new(seq, kind), now)
            .unwrap();
    }

    /// Natural completion of the live utterance
    pub fn complete(&mut self, now: Instant) {
        self.resolve(EventKind::Ended, now);
    }

    /// Drain all events emitted so far
    pub fn drain_events(&self) -> Vec<DictationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Build a controller over a scripted backend; settle delay is zeroed so
/// tests never sleep
pub fn fixture(words: &[&str], config: ControllerConfig) -> Fixture {
    let log = Arc::new(Mutex::new(BackendLog::default()));
    let backend = ScriptedBackend {
        log: log.clone(),
        voices: Vec::new(),
    };
    // The real channel is unused; tests feed events directly
    let (backend_tx, backend_rx) = unbounded::<BackendEvent>();

    let engine = SpeechEngine::new(
        Box::new(backend),
        VoiceCatalog::new(None),
        backend_rx,
        EngineConfig {
            settle_delay: Duration::ZERO,
            safety_timeout: Duration::from_secs(5),
        },
    );

    let (event_tx, event_rx) = unbounded();
    let controller = DictationController::new(
        words.iter().map(|w| w.to_string()).collect(),
        engine,
        config,
        event_tx,
    )
    .unwrap();

    Fixture {
        controller,
        events: event_rx,
        log,
        _backend_tx: backend_tx,
    }
}

/// Config used by most playback tests
pub fn test_config(max_repetitions: u32, pause_ms: u64) -> ControllerConfig {
    ControllerConfig {
        max_repetitions,
        repetition_pause: Duration::from_millis(pause_ms),
        start_delay: Duration::from_millis(500),
        ..Default::default()
    }
}
