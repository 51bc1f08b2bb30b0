//! Native TTS backend using the tts crate
//!
//! The `tts` crate provides a unified interface to Speech Dispatcher on
//! Linux, AVFoundation on macOS and SAPI on Windows. Utterance callbacks
//! are wired through to the backend event channel where the platform
//! supports them; where it does not, no terminal event ever arrives and
//! the engine's safety timeout is the completion signal.

use crate::speech::backends::{BackendEvent, EventKind, SpeechBackend};
use crate::speech::engine::UtteranceRequest;
use crate::speech::voices::Voice;
use crate::{DrillError, Result};
use crossbeam_channel::Sender;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tts::{Tts, UtteranceId};

/// Upper bound on remembered utterance id mappings; entries for utterances
/// that never report a terminal event would otherwise accumulate
const MAX_TRACKED_UTTERANCES: usize = 8;

/// Shared utterance id -> sequence number map, written by `speak` and read
/// by the platform callbacks
type UtteranceMap = Arc<Mutex<Vec<(UtteranceId, u64)>>>;

/// Native TTS backend
pub struct NativeBackend {
    tts: Tts,

    /// Maps platform utterance ids to engine sequence numbers, so a late
    /// callback for a cancelled utterance is attributed to that utterance
    /// and never to whichever one is live now
    utterances: UtteranceMap,

    /// tts-crate voice handles by identifier, cached from the last
    /// enumeration so `speak` can apply a voice override
    voice_handles: HashMap<String, tts::Voice>,
}

impl NativeBackend {
    /// Create the backend and register utterance callbacks
    pub fn new(events: Sender<BackendEvent>) -> Result<Self> {
        debug!("Creating native TTS backend");

        let mut tts = Tts::default()
            .map_err(|e| DrillError::SpeechUnsupported(format!("TTS init failed: {}", e)))?;

        let utterances: UtteranceMap = Arc::new(Mutex::new(Vec::new()));

        let features = tts.supported_features();
        if features.utterance_callbacks {
            let map = Arc::clone(&utterances);
            let tx = events.clone();
            tts.on_utterance_begin(Some(Box::new(move |id: UtteranceId| {
                if let Some(seq) = peek_seq(&map, &id) {
                    let _ = tx.send(BackendEvent::new(seq, EventKind::Started));
                }
            })))
            .map_err(|e| DrillError::Speech(format!("callback registration failed: {}", e)))?;

            let map = Arc::clone(&utterances);
            let tx = events.clone();
            tts.on_utterance_end(Some(Box::new(move |id: UtteranceId| {
                if let Some(seq) = take_seq(&map, &id) {
                    let _ = tx.send(BackendEvent::new(seq, EventKind::Ended));
                }
            })))
            .map_err(|e| DrillError::Speech(format!("callback registration failed: {}", e)))?;

            let map = Arc::clone(&utterances);
            let tx = events;
            tts.on_utterance_stop(Some(Box::new(move |id: UtteranceId| {
                if let Some(seq) = take_seq(&map, &id) {
                    let _ = tx.send(BackendEvent::new(seq, EventKind::Stopped));
                }
            })))
            .map_err(|e| DrillError::Speech(format!("callback registration failed: {}", e)))?;
        } else {
            warn!("Platform does not deliver utterance callbacks; relying on safety timeout");
        }

        Ok(Self {
            tts,
            utterances,
            voice_handles: HashMap::new(),
        })
    }

    /// Map a 0.0..=1.0 fraction into the platform range for a parameter
    fn scale_to_range(fraction: f32, min: f32, max: f32) -> f32 {
        (min + fraction.clamp(0.0, 1.0) * (max - min)).clamp(min, max)
    }

    /// Map a multiplier (1.0 = normal) into the platform range, keeping
    /// the platform's normal value as the fixed point
    fn scale_around_normal(multiplier: f32, min: f32, normal: f32, max: f32) -> f32 {
        let scaled = if multiplier >= 1.0 {
            normal + (multiplier - 1.0) * (max - normal)
        } else {
            min + multiplier.max(0.0) * (normal - min)
        };
        scaled.clamp(min, max)
    }

    fn apply_parameters(&mut self, request: &UtteranceRequest) {
        let features = self.tts.supported_features();

        if features.rate {
            let rate = Self::scale_around_normal(
                request.rate,
                self.tts.min_rate(),
                self.tts.normal_rate(),
                self.tts.max_rate(),
            );
            if let Err(e) = self.tts.set_rate(rate) {
                warn!("Failed to set rate: {}", e);
            }
        }

        if features.pitch {
            let pitch = Self::scale_around_normal(
                request.pitch,
                self.tts.min_pitch(),
                self.tts.normal_pitch(),
                self.tts.max_pitch(),
            );
            if let Err(e) = self.tts.set_pitch(pitch) {
                warn!("Failed to set pitch: {}", e);
            }
        }

        if features.volume {
            let volume = Self::scale_to_range(
                request.volume,
                self.tts.min_volume(),
                self.tts.max_volume(),
            );
            if let Err(e) = self.tts.set_volume(volume) {
                warn!("Failed to set volume: {}", e);
            }
        }
    }

    fn apply_voice(&mut self, voice: &Voice) {
        if !self.tts.supported_features().voice {
            return;
        }
        if self.voice_handles.is_empty() {
            let _ = self.voices();
        }
        match self.voice_handles.get(&voice.id) {
            Some(handle) => {
                if let Err(e) = self.tts.set_voice(handle) {
                    warn!("Failed to set voice {:?}: {}", voice.id, e);
                }
            }
            None => warn!("Voice {:?} has no platform handle, using default", voice.id),
        }
    }
}

/// Record an utterance id mapping, evicting the oldest entry past the cap
fn record_seq<I: PartialEq>(entries: &Mutex<Vec<(I, u64)>>, id: I, seq: u64) {
    let mut entries = entries.lock().unwrap_or_else(|e| e.into_inner());
    entries.retain(|(existing, _)| *existing != id);
    entries.push((id, seq));
    if entries.len() > MAX_TRACKED_UTTERANCES {
        entries.remove(0);
    }
}

/// Sequence number for an utterance id, keeping the entry
fn peek_seq<I: PartialEq>(entries: &Mutex<Vec<(I, u64)>>, id: &I) -> Option<u64> {
    let entries = entries.lock().unwrap_or_else(|e| e.into_inner());
    entries
        .iter()
        .find(|(existing, _)| existing == id)
        .map(|(_, seq)| *seq)
}

/// Sequence number for an utterance id, removing the entry; terminal
/// events are delivered at most once per utterance
fn take_seq<I: PartialEq>(entries: &Mutex<Vec<(I, u64)>>, id: &I) -> Option<u64> {
    let mut entries = entries.lock().unwrap_or_else(|e| e.into_inner());
    let pos = entries.iter().position(|(existing, _)| existing == id)?;
    Some(entries.remove(pos).1)
}

impl SpeechBackend for NativeBackend {
    fn voices(&mut self) -> Result<Vec<Voice>> {
        let platform_voices = self
            .tts
            .voices()
            .map_err(|e| DrillError::Speech(format!("voice enumeration failed: {}", e)))?;

        self.voice_handles = platform_voices
            .iter()
            .map(|v| (v.id(), v.clone()))
            .collect();

        // The tts crate does not expose local/default flags, so platform
        // voices are treated as on-device and ranked by name markers.
        Ok(platform_voices
            .into_iter()
            .map(|v| Voice {
                id: v.id(),
                name: v.name(),
                language: v.language().to_string(),
                is_local: true,
                is_default: false,
            })
            .collect())
    }

    fn speak(&mut self, seq: u64, request: &UtteranceRequest) -> Result<()> {
        self.apply_parameters(request);
        if let Some(voice) = &request.voice {
            self.apply_voice(voice);
        }

        debug!("Speaking utterance {}: {:?}", seq, request.text);

        // The engine has already stopped any previous utterance and waited
        // out the settle delay, so no interrupt here.
        let utterance = self
            .tts
            .speak(&request.text, false)
            .map_err(|e| DrillError::Speech(format!("speak failed: {}", e)))?;

        match utterance {
            Some(id) => record_seq(&self.utterances, id, seq),
            // No id means no attributable callbacks; the engine's safety
            // timeout resolves the utterance.
            None => debug!("Platform returned no utterance id for {}", seq),
        }

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        debug!("Stopping speech");
        self.tts
            .stop()
            .map_err(|e| DrillError::Speech(format!("stop failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_around_normal() {
        // 1.0 is the platform normal, extremes clamp to the range
        assert_eq!(NativeBackend::scale_around_normal(1.0, 0.0, 1.0, 2.0), 1.0);
        assert_eq!(NativeBackend::scale_around_normal(0.0, 0.0, 1.0, 2.0), 0.0);
        assert_eq!(NativeBackend::scale_around_normal(2.0, 0.0, 1.0, 2.0), 2.0);
        assert_eq!(NativeBackend::scale_around_normal(99.0, 0.0, 1.0, 2.0), 2.0);
        assert_eq!(NativeBackend::scale_around_normal(0.5, 0.0, 1.0, 2.0), 0.5);
    }

    #[test]
    fn test_scale_to_range() {
        assert_eq!(NativeBackend::scale_to_range(0.0, 0.0, 1.0), 0.0);
        assert_eq!(NativeBackend::scale_to_range(0.5, 0.0, 1.0), 0.5);
        assert_eq!(NativeBackend::scale_to_range(1.0, 0.0, 1.0), 1.0);
        assert_eq!(NativeBackend::scale_to_range(2.0, 0.0, 1.0), 1.0);
    }

    #[test]
    fn test_late_callback_keeps_its_own_utterance() {
        // A stop callback for a cancelled utterance arriving after the
        // next one was submitted must carry the old sequence number, not
        // whichever utterance is live now.
        let entries: Mutex<Vec<(u64, u64)>> = Mutex::new(Vec::new());
        record_seq(&entries, 100, 1);
        record_seq(&entries, 200, 2);

        assert_eq!(take_seq(&entries, &100), Some(1));
        assert_eq!(peek_seq(&entries, &200), Some(2));

        // Terminal events are one-shot per utterance
        assert_eq!(take_seq(&entries, &100), None);
        assert_eq!(take_seq(&entries, &200), Some(2));
    }

    #[test]
    fn test_unknown_utterance_id_is_unattributable() {
        let entries: Mutex<Vec<(u64, u64)>> = Mutex::new(Vec::new());
        record_seq(&entries, 100, 1);
        assert_eq!(peek_seq(&entries, &999), None);
        assert_eq!(take_seq(&entries, &999), None);
    }

    #[test]
    fn test_tracked_utterances_are_capped() {
        let entries: Mutex<Vec<(u64, u64)>> = Mutex::new(Vec::new());
        for i in 0..20u64 {
            record_seq(&entries, i, i);
        }
        let len = entries.lock().unwrap().len();
        assert_eq!(len, MAX_TRACKED_UTTERANCES);
        // Oldest entries were evicted, newest survive
        assert_eq!(peek_seq(&entries, &0), None);
        assert_eq!(peek_seq(&entries, &19), Some(19));
    }

    #[test]
    fn test_create_backend() {
        // May fail in CI without speech-dispatcher; that is acceptable
        let (tx, _rx) = crossbeam_channel::unbounded();
        match NativeBackend::new(tx) {
            Ok(_) => println!("native TTS backend initialized"),
            Err(e) => println!("TTS initialization failed (may be expected in CI): {}", e),
        }
    }
}
