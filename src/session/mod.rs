//! Sessions: persistence and progress tracking

pub mod progress;
pub mod store;

pub use progress::SessionProgressTracker;
pub use store::{
    JsonFileStore, MemoryStore, Session, SessionPatch, SessionStatus, SessionStore, Settings,
    SettingsPatch,
};
