//! Voice discovery, ranking and selection
//!
//! The platform voice list loads asynchronously and is often empty right
//! after startup, so the catalog retries on a short interval, seeds itself
//! from a persisted cache for instant first use, and replaces the whole
//! voice generation on every successful refresh.

use crate::speech::backends::SpeechBackend;
use crate::Result;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// Retry interval while the platform voice list is still empty
const REFRESH_RETRY: Duration = Duration::from_millis(300);

/// Total budget before giving up and reporting ready with zero voices
const REFRESH_BUDGET: Duration = Duration::from_secs(3);

/// Cached voice lists older than this are treated as absent
const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Markers in voice display names that adjust the quality score
///
/// Vendors flag their premium synthesis tiers in the name ("Enhanced",
/// "Neural", ...); deliberately degraded variants carry markers like
/// "Compact". Matched case-insensitively as substrings.
static NAME_MARKERS: Lazy<HashMap<&'static str, i32>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("premium", 8);
    m.insert("enhanced", 8);
    m.insert("neural", 8);
    m.insert("natural", 8);
    m.insert("wavenet", 8);
    m.insert("siri", 8);
    m.insert("compact", -8);
    m.insert("eloquence", -8);
    m
});

/// A synthesis voice as enumerated from the platform
///
/// Immutable once enumerated; a refresh replaces the whole generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    /// Opaque identifier, stable for the lifetime of the platform session
    pub id: String,
    /// Human-readable display name
    pub name: String,
    /// BCP 47 language tag, e.g. "en-US"
    pub language: String,
    /// On-device voice (as opposed to a network-backed one)
    #[serde(default)]
    pub is_local: bool,
    /// Flagged by the platform as the default for its language
    #[serde(default)]
    pub is_default: bool,
}

impl Voice {
    /// Lowercased 2-letter language prefix ("en-US" -> "en")
    pub fn language_prefix(&self) -> String {
        language_prefix(&self.language)
    }

    /// Quality score used for best-first ranking within a language
    fn quality_score(&self) -> i32 {
        let mut score = 0;
        if self.is_local {
            score += 2;
        }
        if self.is_default {
            score += 4;
        }
        let name = self.name.to_lowercase();
        for (marker, weight) in NAME_MARKERS.iter() {
            if name.contains(marker) {
                score += weight;
            }
        }
        score
    }
}

/// Lowercased 2-letter prefix of a language tag
pub fn language_prefix(tag: &str) -> String {
    tag.chars().take(2).collect::<String>().to_lowercase()
}

/// Result of a voice pick, including whether a user override was ignored
/// because the voice has disappeared from the catalog
#[derive(Debug)]
pub struct PickOutcome<'a> {
    pub voice: Option<&'a Voice>,
    pub override_missing: bool,
}

/// In-flight refresh attempt
struct RefreshAttempt {
    started: Instant,
    next_poll: Instant,
}

/// Catalog of available synthesis voices, ranked best-first per language
pub struct VoiceCatalog {
    /// Voices grouped by 2-letter language prefix, ranked best-first
    by_prefix: HashMap<String, Vec<Voice>>,
    /// Total voice count across all prefixes
    count: usize,
    /// True once a refresh has concluded (possibly with zero voices)
    ready: bool,
    last_refreshed: Option<SystemTime>,
    refresh: Option<RefreshAttempt>,
    cache_path: Option<PathBuf>,
}

/// On-disk cache shape: last observed generation plus its timestamp
#[derive(Serialize, Deserialize)]
struct VoiceCache {
    timestamp: u64,
    voices: Vec<Voice>,
}

impl VoiceCatalog {
    /// Create an empty catalog, seeded from the cache file when it holds a
    /// fresh enough generation
    pub fn new(cache_path: Option<PathBuf>) -> Self {
        let mut catalog = Self {
            by_prefix: HashMap::new(),
            count: 0,
            ready: false,
            last_refreshed: None,
            refresh: None,
            cache_path,
        };

        if let Some(path) = catalog.cache_path.clone() {
            if let Some(voices) = load_cache(&path, SystemTime::now()) {
                info!("Seeded voice catalog from cache: {} voices", voices.len());
                catalog.install(voices, None);
                // Stale-but-usable: callers may pick immediately while a
                // live refresh reconciles in the background.
                catalog.ready = true;
            }
        }

        catalog
    }

    /// Begin a refresh; `poll` drives it to completion
    pub fn begin_refresh(&mut self, now: Instant) {
        debug!("Voice refresh started");
        self.refresh = Some(RefreshAttempt {
            started: now,
            next_poll: now,
        });
    }

    /// When the next refresh poll is due, if a refresh is in flight
    pub fn next_poll_at(&self) -> Option<Instant> {
        self.refresh.as_ref().map(|r| r.next_poll)
    }

    /// Drive an in-flight refresh
    ///
    /// Queries the backend once the poll interval has elapsed. An empty
    /// voice list schedules a retry until the budget runs out, after which
    /// the catalog reports ready with whatever it has (possibly nothing);
    /// callers must tolerate no-voice operation by omitting the voice
    /// override and letting the platform default apply.
    pub fn poll(&mut self, backend: &mut dyn SpeechBackend, now: Instant) -> Result<()> {
        let Some(attempt) = self.refresh.as_ref() else {
            return Ok(());
        };
        if now < attempt.next_poll {
            return Ok(());
        }

        let voices = backend.voices().unwrap_or_else(|e| {
            warn!("Voice enumeration failed: {}", e);
            Vec::new()
        });

        if !voices.is_empty() {
            info!("Voice refresh observed {} voices", voices.len());
            self.install(voices, Some(SystemTime::now()));
            self.ready = true;
            self.refresh = None;
            self.persist();
        } else if now.duration_since(attempt.started) >= REFRESH_BUDGET {
            warn!("Voice refresh timed out with an empty voice list");
            self.ready = true;
            self.refresh = None;
        } else if let Some(attempt) = self.refresh.as_mut() {
            attempt.next_poll = now + REFRESH_RETRY;
        }

        Ok(())
    }

    /// Replace the catalog contents with a new voice generation
    ///
    /// Ranking is deterministic: stable sort on quality score, ties keep
    /// the original enumeration order.
    pub fn install(&mut self, voices: Vec<Voice>, refreshed_at: Option<SystemTime>) {
        let mut by_prefix: HashMap<String, Vec<Voice>> = HashMap::new();
        let count = voices.len();
        for voice in voices {
            by_prefix.entry(voice.language_prefix()).or_default().push(voice);
        }
        for ranked in by_prefix.values_mut() {
            ranked.sort_by_key(|v| std::cmp::Reverse(v.quality_score()));
        }
        self.by_prefix = by_prefix;
        self.count = count;
        if refreshed_at.is_some() {
            self.last_refreshed = refreshed_at;
        }
    }

    /// True once a refresh (or cache seed) has concluded
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Ranked voices for a 2-letter language prefix
    pub fn voices_for(&self, prefix: &str) -> &[Voice] {
        self.by_prefix
            .get(&prefix.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Select the best voice for a language tag
    ///
    /// Tiers: exact case-insensitive tag match, then any voice sharing the
    /// 2-letter prefix (which also covers the zh-CN/zh-TW/zh-HK spread for
    /// Chinese), then `None` so the caller lets the platform default apply.
    pub fn pick(&self, language_tag: &str) -> Option<&Voice> {
        let ranked = self.voices_for(&language_prefix(language_tag));
        ranked
            .iter()
            .find(|v| v.language.eq_ignore_ascii_case(language_tag))
            .or_else(|| ranked.first())
    }

    /// Select a voice honoring a user override identifier
    ///
    /// A vanished override falls back to the ranked pick and reports it so
    /// the caller can surface a non-fatal notice.
    pub fn pick_with_override(
        &self,
        language_tag: &str,
        override_id: Option<&str>,
    ) -> PickOutcome<'_> {
        if let Some(id) = override_id {
            let ranked = self.voices_for(&language_prefix(language_tag));
            if let Some(voice) = ranked.iter().find(|v| v.id == id) {
                return PickOutcome {
                    voice: Some(voice),
                    override_missing: false,
                };
            }
            debug!("Voice override {:?} not in catalog, using ranked pick", id);
            return PickOutcome {
                voice: self.pick(language_tag),
                override_missing: true,
            };
        }
        PickOutcome {
            voice: self.pick(language_tag),
            override_missing: false,
        }
    }

    /// Write the current generation to the cache file
    fn persist(&self) {
        let Some(path) = self.cache_path.as_ref() else {
            return;
        };
        let voices: Vec<Voice> = self
            .by_prefix
            .values()
            .flat_map(|v| v.iter().cloned())
            .collect();
        if let Err(e) = save_cache(path, &voices, SystemTime::now()) {
            warn!("Failed to write voice cache {:?}: {}", path, e);
        }
    }
}

/// Load a cached voice generation if it is fresher than the TTL
fn load_cache(path: &Path, now: SystemTime) -> Option<Vec<Voice>> {
    let raw = fs::read_to_string(path).ok()?;
    let cache: VoiceCache = serde_json::from_str(&raw).ok()?;
    let age = now
        .duration_since(SystemTime::UNIX_EPOCH)
        .ok()?
        .as_secs()
        .saturating_sub(cache.timestamp);
    if Duration::from_secs(age) > CACHE_TTL {
        debug!("Voice cache at {:?} is stale, ignoring", path);
        return None;
    }
    if cache.voices.is_empty() {
        return None;
    }
    Some(cache.voices)
}

/// Persist a voice generation with the current timestamp
fn save_cache(path: &Path, voices: &[Voice], now: SystemTime) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let timestamp = now
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let cache = VoiceCache {
        timestamp,
        voices: voices.to_vec(),
    };
    fs::write(path, serde_json::to_string(&cache)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(id: &str, name: &str, lang: &str, local: bool, default: bool) -> Voice {
        Voice {
            id: id.to_string(),
            name: name.to_string(),
            language: lang.to_string(),
            is_local: local,
            is_default: default,
        }
    }

    fn catalog_with(voices: Vec<Voice>) -> VoiceCatalog {
        let mut catalog = VoiceCatalog::new(None);
        catalog.install(voices, Some(SystemTime::now()));
        catalog.ready = true;
        catalog
    }

    #[test]
    fn test_exact_tag_beats_prefix() {
        let catalog = catalog_with(vec![
            voice("a", "Karen", "en-AU", true, false),
            voice("b", "Daniel", "en-GB", true, false),
            voice("c", "Samantha", "en-US", true, false),
        ]);
        assert_eq!(catalog.pick("en-US").unwrap().id, "c");
        assert_eq!(catalog.pick("EN-us").unwrap().id, "c");
    }

    #[test]
    fn test_prefix_fallback() {
        let catalog = catalog_with(vec![voice("a", "Daniel", "en-GB", true, false)]);
        // No exact en-US voice, but an English one exists
        assert_eq!(catalog.pick("en-US").unwrap().id, "a");
    }

    #[test]
    fn test_chinese_variant_spread() {
        // A zh voice is found regardless of its regional tag or position
        let catalog = catalog_with(vec![
            voice("a", "Samantha", "en-US", true, false),
            voice("b", "Sin-ji", "zh-HK", true, false),
        ]);
        assert_eq!(catalog.pick("zh-CN").unwrap().id, "b");
    }

    #[test]
    fn test_no_prefix_match_is_none() {
        let catalog = catalog_with(vec![voice("a", "Samantha", "en-US", true, false)]);
        assert!(catalog.pick("fr-FR").is_none());
    }

    #[test]
    fn test_quality_ranking() {
        let catalog = catalog_with(vec![
            voice("compact", "Fred Compact", "en-US", true, false),
            voice("plain", "Samantha", "en-US", true, false),
            voice("premium", "Ava Enhanced", "en-US", true, false),
        ]);
        let ranked = catalog.voices_for("en");
        assert_eq!(ranked[0].id, "premium");
        assert_eq!(ranked[1].id, "plain");
        assert_eq!(ranked[2].id, "compact");
    }

    #[test]
    fn test_local_beats_network_and_ties_keep_order() {
        let catalog = catalog_with(vec![
            voice("net1", "Cloud A", "en-US", false, false),
            voice("loc1", "Device A", "en-US", true, false),
            voice("loc2", "Device B", "en-US", true, false),
        ]);
        let ranked = catalog.voices_for("en");
        assert_eq!(ranked[0].id, "loc1");
        assert_eq!(ranked[1].id, "loc2");
        assert_eq!(ranked[2].id, "net1");
    }

    #[test]
    fn test_override_honored_and_fallback_when_gone() {
        let catalog = catalog_with(vec![
            voice("good", "Ava Enhanced", "en-US", true, false),
            voice("chosen", "Fred", "en-US", true, false),
        ]);

        let outcome = catalog.pick_with_override("en-US", Some("chosen"));
        assert_eq!(outcome.voice.unwrap().id, "chosen");
        assert!(!outcome.override_missing);

        let outcome = catalog.pick_with_override("en-US", Some("vanished"));
        assert_eq!(outcome.voice.unwrap().id, "good");
        assert!(outcome.override_missing);
    }

    #[test]
    fn test_cache_round_trip_and_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voices.json");
        let voices = vec![voice("a", "Samantha", "en-US", true, true)];

        save_cache(&path, &voices, SystemTime::now()).unwrap();
        let loaded = load_cache(&path, SystemTime::now()).unwrap();
        assert_eq!(loaded, voices);

        // A read 25 hours in the future sees the cache as absent
        let future = SystemTime::now() + Duration::from_secs(25 * 60 * 60);
        assert!(load_cache(&path, future).is_none());
    }
}
