//! Dictation playback: controller state machine and worker thread

pub mod controller;
pub mod service;

pub use controller::{
    ControllerConfig, DictationController, DictationEvent, PracticeMode, RunState,
};
pub use service::{Command, DictationService};
