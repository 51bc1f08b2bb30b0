//! Dictation worker thread
//!
//! Owns the controller, the progress tracker and the session store, and
//! multiplexes user commands, backend utterance events and due timers on
//! one crossbeam select loop. The UI talks to it only through channels.

use crate::dictation::controller::{DictationController, DictationEvent, PracticeMode};
use crate::session::{SessionProgressTracker, SessionStore};
use crate::speech::earliest;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use log::{debug, error, info};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Select loop wakes at least this often even with no due deadline
const POLL_CAP: Duration = Duration::from_millis(100);

/// User commands accepted by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Play,
    Next,
    Previous,
    TogglePause,
    ToggleMute,
    SwitchMode(PracticeMode),
    MarkCompleted,
    Suspend,
    Shutdown,
}

/// Handle to a running dictation worker
pub struct DictationService {
    commands: Sender<Command>,
    events: Receiver<DictationEvent>,
    worker: Option<JoinHandle<()>>,
}

impl DictationService {
    /// Spawn the worker thread
    ///
    /// `controller` must have been built with `internal_events` as its
    /// event sender; the worker drains that channel, feeds the tracker and
    /// forwards every event to the receiver returned by `events()`.
    pub fn spawn(
        mut controller: DictationController,
        internal_events: Receiver<DictationEvent>,
        mut tracker: SessionProgressTracker,
        mut store: Box<dyn SessionStore>,
    ) -> Self {
        let (command_tx, command_rx) = bounded::<Command>(16);
        let (event_tx, event_rx) = bounded::<DictationEvent>(64);

        let worker = thread::spawn(move || {
            let backend_events = controller.engine().event_receiver();
            info!("Dictation worker started");
            loop {
                let now = Instant::now();
                let deadline = earliest(controller.next_deadline(), tracker.next_flush_at());
                let timeout = deadline
                    .map(|d| d.saturating_duration_since(now))
                    .unwrap_or(POLL_CAP)
                    .min(POLL_CAP);

                select! {
                    recv(command_rx) -> command => {
                        let now = Instant::now();
                        match command {
                            Ok(Command::Shutdown) | Err(_) => break,
                            Ok(command) => {
                                if let Err(e) = apply(&mut controller, command, now) {
                                    error!("Command {:?} failed: {}", command, e);
                                }
                            }
                        }
                    }
                    recv(backend_events) -> event => {
                        if let Ok(event) = event {
                            let now = Instant::now();
                            if let Err(e) = controller.handle_backend_event(event, now) {
                                error!("Backend event handling failed: {}", e);
                            }
                        }
                    }
                    default(timeout) => {}
                }

                let now = Instant::now();
                if let Err(e) = controller.tick(now) {
                    error!("Timer tick failed: {}", e);
                }
                forward(&internal_events, &mut tracker, &event_tx);
                if let Err(e) = tracker.tick(store.as_mut(), now) {
                    error!("Progress flush failed: {}", e);
                }
            }

            // Halt playback and persist before the thread goes away
            let now = Instant::now();
            controller.suspend(now);
            forward(&internal_events, &mut tracker, &event_tx);
            if let Err(e) = tracker.flush(store.as_mut(), now) {
                error!("Final progress flush failed: {}", e);
            }
            info!("Dictation worker stopped");
        });

        Self {
            commands: command_tx,
            events: event_rx,
            worker: Some(worker),
        }
    }

    pub fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Dictation worker gone, dropping {:?}", command);
        }
    }

    /// Events for the UI, in emission order
    pub fn events(&self) -> &Receiver<DictationEvent> {
        &self.events
    }

    /// Stop the worker and wait for its final flush
    pub fn shutdown(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for DictationService {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn apply(
    controller: &mut DictationController,
    command: Command,
    now: Instant,
) -> crate::Result<()> {
    match command {
        Command::Start => controller.start(now),
        Command::Play => controller.play(now),
        Command::Next => controller.next(now),
        Command::Previous => controller.previous(now),
        Command::TogglePause => controller.toggle_pause(now),
        Command::ToggleMute => controller.toggle_mute(now),
        Command::SwitchMode(mode) => controller.switch_mode(mode, now),
        Command::MarkCompleted => {
            controller.mark_completed(now);
            Ok(())
        }
        Command::Suspend => {
            controller.suspend(now);
            Ok(())
        }
        Command::Shutdown => Ok(()),
    }
}

/// Drain controller events: tracker first, then the UI
fn forward(
    internal: &Receiver<DictationEvent>,
    tracker: &mut SessionProgressTracker,
    out: &Sender<DictationEvent>,
) {
    while let Ok(event) = internal.try_recv() {
        tracker.observe(&event);
        let _ = out.send(event);
    }
}
