//! spelldrill - spoken-word spelling practice
//!
//! A terminal spelling-practice tool with a dictation test mode: each word
//! is spoken N times with pauses between repetitions, through the platform
//! text-to-speech device.

pub mod config;
pub mod dictation;
pub mod error;
pub mod session;
pub mod speech;
pub mod words;

pub use error::{DrillError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "spelldrill";
