//! Session and settings persistence
//!
//! The playback core only consumes this through the `SessionStore` trait;
//! the JSON file implementation keeps everything under ~/.spelldrill/.

use crate::{DrillError, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Session lifecycle status, derived from progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    New,
    InProgress,
    Completed,
}

/// A practice session: a titled, ordered word list with progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub title: String,
    /// Immutable for the lifetime of the session
    pub words: Vec<String>,
    pub status: SessionStatus,
    pub word_count: usize,
    /// Number of distinct words marked completed
    pub progress: usize,
    /// Seconds spent practicing
    pub time_spent: u64,
    /// Unix epoch seconds
    pub created_at: u64,
    pub updated_at: u64,
}

/// Partial session update
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub progress: Option<usize>,
    pub time_spent: Option<u64>,
    pub status: Option<SessionStatus>,
}

/// User settings consumed by playback; unknown concerns (notifications,
/// theme, sync) pass through untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Times each word is spoken in test mode, >= 1
    pub word_repetitions: u32,
    /// Pause between repetitions, milliseconds
    pub pause_between_words: u64,
    pub enable_pause_button: bool,
    pub notifications: bool,
    pub dark_mode: bool,
    pub data_sync: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            word_repetitions: 2,
            pause_between_words: 1500,
            enable_pause_button: true,
            notifications: true,
            dark_mode: false,
            data_sync: false,
        }
    }
}

/// Partial settings update
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub word_repetitions: Option<u32>,
    pub pause_between_words: Option<u64>,
    pub enable_pause_button: Option<bool>,
    pub notifications: Option<bool>,
    pub dark_mode: Option<bool>,
    pub data_sync: Option<bool>,
}

/// Persistence collaborator for sessions and settings
pub trait SessionStore: Send {
    fn list_sessions(&self) -> Result<Vec<Session>>;
    fn get_session(&self, id: &str) -> Result<Option<Session>>;
    fn create_session(&mut self, title: &str, words: Vec<String>) -> Result<Session>;
    fn update_session(&mut self, id: &str, patch: SessionPatch) -> Result<Option<Session>>;
    fn delete_session(&mut self, id: &str) -> Result<bool>;
    fn get_settings(&self) -> Result<Settings>;
    fn update_settings(&mut self, patch: SettingsPatch) -> Result<Settings>;
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn apply_session_patch(session: &mut Session, patch: SessionPatch) {
    if let Some(progress) = patch.progress {
        session.progress = progress;
    }
    if let Some(time_spent) = patch.time_spent {
        session.time_spent = time_spent;
    }
    if let Some(status) = patch.status {
        session.status = status;
    }
    session.updated_at = epoch_seconds();
}

fn apply_settings_patch(settings: &mut Settings, patch: SettingsPatch) {
    if let Some(reps) = patch.word_repetitions {
        settings.word_repetitions = reps.max(1);
    }
    if let Some(pause) = patch.pause_between_words {
        settings.pause_between_words = pause;
    }
    if let Some(v) = patch.enable_pause_button {
        settings.enable_pause_button = v;
    }
    if let Some(v) = patch.notifications {
        settings.notifications = v;
    }
    if let Some(v) = patch.dark_mode {
        settings.dark_mode = v;
    }
    if let Some(v) = patch.data_sync {
        settings.data_sync = v;
    }
}

fn new_session(id: String, title: &str, words: Vec<String>) -> Session {
    let now = epoch_seconds();
    Session {
        id,
        title: title.to_string(),
        word_count: words.len(),
        words,
        status: SessionStatus::New,
        progress: 0,
        time_spent: 0,
        created_at: now,
        updated_at: now,
    }
}

/// In-memory store, used by tests and one-shot runs
#[derive(Default)]
pub struct MemoryStore {
    sessions: Vec<Session>,
    settings: Settings,
    next_id: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemoryStore {
    fn list_sessions(&self) -> Result<Vec<Session>> {
        Ok(self.sessions.clone())
    }

    fn get_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.iter().find(|s| s.id == id).cloned())
    }

    fn create_session(&mut self, title: &str, words: Vec<String>) -> Result<Session> {
        self.next_id += 1;
        let session = new_session(format!("s{}", self.next_id), title, words);
        self.sessions.push(session.clone());
        Ok(session)
    }

    fn update_session(&mut self, id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        let Some(session) = self.sessions.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        apply_session_patch(session, patch);
        Ok(Some(session.clone()))
    }

    fn delete_session(&mut self, id: &str) -> Result<bool> {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        Ok(self.sessions.len() < before)
    }

    fn get_settings(&self) -> Result<Settings> {
        Ok(self.settings.clone())
    }

    fn update_settings(&mut self, patch: SettingsPatch) -> Result<Settings> {
        apply_settings_patch(&mut self.settings, patch);
        Ok(self.settings.clone())
    }
}

/// Everything persisted in one JSON document
#[derive(Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    sessions: Vec<Session>,
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    next_id: u64,
}

/// JSON-file-backed store under the user's home directory
pub struct JsonFileStore {
    path: PathBuf,
    data: StoreData,
}

impl JsonFileStore {
    /// Open or create the store at the default location
    /// (~/.spelldrill/store.json)
    pub fn open_default() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| DrillError::Store("could not find home directory".into()))?;
        Self::open(home.join(".spelldrill").join("store.json"))
    }

    /// Open or create a store at an explicit path
    pub fn open(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            debug!("Loading session store from {:?}", path);
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            info!("Session store not found, starting empty");
            StoreData::default()
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.data)?)?;
        Ok(())
    }
}

impl SessionStore for JsonFileStore {
    fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions = self.data.sessions.clone();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    fn get_session(&self, id: &str) -> Result<Option<Session>> {
        Ok(self.data.sessions.iter().find(|s| s.id == id).cloned())
    }

    fn create_session(&mut self, title: &str, words: Vec<String>) -> Result<Session> {
        self.data.next_id += 1;
        let id = format!("s{:x}-{:x}", epoch_seconds(), self.data.next_id);
        let session = new_session(id, title, words);
        self.data.sessions.push(session.clone());
        self.save()?;
        Ok(session)
    }

    fn update_session(&mut self, id: &str, patch: SessionPatch) -> Result<Option<Session>> {
        let Some(session) = self.data.sessions.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        apply_session_patch(session, patch);
        let updated = session.clone();
        self.save()?;
        Ok(Some(updated))
    }

    fn delete_session(&mut self, id: &str) -> Result<bool> {
        let before = self.data.sessions.len();
        self.data.sessions.retain(|s| s.id != id);
        let removed = self.data.sessions.len() < before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    fn get_settings(&self) -> Result<Settings> {
        Ok(self.data.settings.clone())
    }

    fn update_settings(&mut self, patch: SettingsPatch) -> Result<Settings> {
        apply_settings_patch(&mut self.data.settings, patch);
        self.save()?;
        Ok(self.data.settings.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.word_repetitions, 2);
        assert_eq!(settings.pause_between_words, 1500);
        assert!(settings.enable_pause_button);
        assert!(!settings.dark_mode);
    }

    #[test]
    fn test_repetitions_clamped_to_one() {
        let mut store = MemoryStore::new();
        let settings = store
            .update_settings(SettingsPatch {
                word_repetitions: Some(0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(settings.word_repetitions, 1);
    }

    #[test]
    fn test_memory_store_crud() {
        let mut store = MemoryStore::new();
        let session = store
            .create_session("Week 1", vec!["cat".into(), "dog".into()])
            .unwrap();
        assert_eq!(session.status, SessionStatus::New);
        assert_eq!(session.word_count, 2);

        let updated = store
            .update_session(
                &session.id,
                SessionPatch {
                    progress: Some(1),
                    status: Some(SessionStatus::InProgress),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.progress, 1);
        assert_eq!(updated.status, SessionStatus::InProgress);

        assert!(store.delete_session(&session.id).unwrap());
        assert!(store.get_session(&session.id).unwrap().is_none());
    }

    #[test]
    fn test_json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let id = {
            let mut store = JsonFileStore::open(path.clone()).unwrap();
            let session = store
                .create_session("OCR import", vec!["apple".into()])
                .unwrap();
            store
                .update_session(
                    &session.id,
                    SessionPatch {
                        time_spent: Some(42),
                        ..Default::default()
                    },
                )
                .unwrap();
            session.id
        };

        let store = JsonFileStore::open(path).unwrap();
        let session = store.get_session(&id).unwrap().unwrap();
        assert_eq!(session.title, "OCR import");
        assert_eq!(session.time_spent, 42);
    }

    #[test]
    fn test_unknown_patch_fields_pass_through() {
        let mut store = MemoryStore::new();
        store
            .update_settings(SettingsPatch {
                dark_mode: Some(true),
                data_sync: Some(true),
                ..Default::default()
            })
            .unwrap();
        let settings = store.get_settings().unwrap();
        assert!(settings.dark_mode);
        assert!(settings.data_sync);
        // Untouched fields keep their values
        assert_eq!(settings.word_repetitions, 2);
    }
}
