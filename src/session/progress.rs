//! Session progress tracking
//!
//! Maps dictation events to progress/status updates on the session store,
//! debounced so the per-second elapsed-time tick does not turn into a
//! write per tick.

use crate::dictation::DictationEvent;
use crate::session::store::{SessionPatch, SessionStatus, SessionStore};
use crate::Result;
use log::debug;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Minimum interval between store writes
const FLUSH_DEBOUNCE: Duration = Duration::from_secs(2);

/// Observes dictation events for one session and pushes progress updates
pub struct SessionProgressTracker {
    session_id: String,
    total_words: usize,
    completed: HashSet<usize>,
    started: Instant,
    last_flush: Option<Instant>,
    dirty: bool,
}

impl SessionProgressTracker {
    pub fn new(session_id: String, total_words: usize, now: Instant) -> Self {
        Self {
            session_id,
            total_words,
            completed: HashSet::new(),
            started: now,
            last_flush: None,
            dirty: false,
        }
    }

    /// Number of distinct completed word indices
    pub fn progress(&self) -> usize {
        self.completed.len()
    }

    pub fn status(&self) -> SessionStatus {
        if self.total_words > 0 && self.completed.len() == self.total_words {
            SessionStatus::Completed
        } else if self.completed.is_empty() {
            SessionStatus::New
        } else {
            SessionStatus::InProgress
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status() == SessionStatus::Completed
    }

    /// Consume one dictation event
    pub fn observe(&mut self, event: &DictationEvent) {
        if let DictationEvent::WordCompleted { index } = event {
            if self.completed.insert(*index) {
                debug!(
                    "Word {} completed ({}/{})",
                    index,
                    self.completed.len(),
                    self.total_words
                );
                self.dirty = true;
            }
        }
    }

    /// When the next flush is due
    ///
    /// Completion changes flush as soon as the debounce window allows;
    /// elapsed time alone flushes once per debounce interval.
    pub fn next_flush_at(&self) -> Option<Instant> {
        match self.last_flush {
            Some(last) => Some(last + FLUSH_DEBOUNCE),
            None if self.dirty => Some(self.started),
            None => Some(self.started + FLUSH_DEBOUNCE),
        }
    }

    /// Flush if due; no-op inside the debounce window
    pub fn tick(&mut self, store: &mut dyn SessionStore, now: Instant) -> Result<()> {
        if let Some(due) = self.next_flush_at() {
            if now >= due {
                self.flush(store, now)?;
            }
        }
        Ok(())
    }

    /// Unconditional flush (shutdown path)
    pub fn flush(&mut self, store: &mut dyn SessionStore, now: Instant) -> Result<()> {
        let patch = SessionPatch {
            progress: Some(self.completed.len()),
            time_spent: Some(now.duration_since(self.started).as_secs()),
            status: Some(self.status()),
        };
        store.update_session(&self.session_id, patch)?;
        self.last_flush = Some(now);
        self.dirty = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::store::MemoryStore;

    fn tracker_with_store() -> (SessionProgressTracker, MemoryStore, String, Instant) {
        let mut store = MemoryStore::new();
        let session = store
            .create_session("t", vec!["cat".into(), "dog".into()])
            .unwrap();
        let now = Instant::now();
        let tracker = SessionProgressTracker::new(session.id.clone(), 2, now);
        (tracker, store, session.id, now)
    }

    #[test]
    fn test_status_progression() {
        let (mut tracker, _store, _id, _now) = tracker_with_store();
        assert_eq!(tracker.status(), SessionStatus::New);

        tracker.observe(&DictationEvent::WordCompleted { index: 0 });
        assert_eq!(tracker.status(), SessionStatus::InProgress);

        // Duplicate completion is not double-counted
        tracker.observe(&DictationEvent::WordCompleted { index: 0 });
        assert_eq!(tracker.progress(), 1);

        tracker.observe(&DictationEvent::WordCompleted { index: 1 });
        assert_eq!(tracker.status(), SessionStatus::Completed);
        assert!(tracker.is_completed());
    }

    #[test]
    fn test_flush_writes_patch() {
        let (mut tracker, mut store, id, now) = tracker_with_store();
        tracker.observe(&DictationEvent::WordCompleted { index: 0 });
        tracker
            .flush(&mut store, now + Duration::from_secs(30))
            .unwrap();

        let session = store.get_session(&id).unwrap().unwrap();
        assert_eq!(session.progress, 1);
        assert_eq!(session.time_spent, 30);
        assert_eq!(session.status, SessionStatus::InProgress);
    }

    #[test]
    fn test_debounce_suppresses_back_to_back_writes() {
        let (mut tracker, mut store, id, now) = tracker_with_store();
        tracker.observe(&DictationEvent::WordCompleted { index: 0 });
        tracker.tick(&mut store, now).unwrap();
        let first = store.get_session(&id).unwrap().unwrap();

        // A second completion inside the debounce window does not write
        tracker.observe(&DictationEvent::WordCompleted { index: 1 });
        tracker
            .tick(&mut store, now + Duration::from_millis(100))
            .unwrap();
        assert_eq!(store.get_session(&id).unwrap().unwrap().progress, first.progress);

        // Past the window it flushes
        tracker
            .tick(&mut store, now + Duration::from_secs(3))
            .unwrap();
        assert_eq!(store.get_session(&id).unwrap().unwrap().progress, 2);
    }

    #[test]
    fn test_non_completion_events_do_not_dirty() {
        let (mut tracker, _store, _id, _now) = tracker_with_store();
        tracker.observe(&DictationEvent::Paused);
        tracker.observe(&DictationEvent::WordAdvanced { index: 1 });
        assert_eq!(tracker.progress(), 0);
        assert_eq!(tracker.status(), SessionStatus::New);
    }
}
