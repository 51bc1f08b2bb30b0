//! Speech synthesis system

pub mod backends;
pub mod engine;
pub mod language;
pub mod voices;

pub use backends::{create_backend, BackendEvent, EventKind, SpeechBackend};
pub use engine::{earliest, EngineConfig, SpeakOutcome, SpeechEngine, UtteranceRequest};
pub use voices::{Voice, VoiceCatalog};
