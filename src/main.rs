//! Spelldrill main entry point
//!
//! Wires the pieces together: config and session store, speech backend
//! and engine, the dictation worker, and a line-oriented command loop on
//! stdin. Playback itself runs on the worker thread; the main thread only
//! relays commands and prints events.

use anyhow::Context;
use crossbeam_channel::bounded;
use log::{debug, error, info};
use nix::libc;
use nix::sys::signal::{self, SigHandler, Signal};
use spelldrill::config::Config;
use spelldrill::dictation::{
    Command, ControllerConfig, DictationController, DictationEvent, DictationService, PracticeMode,
};
use spelldrill::session::{JsonFileStore, SessionStore};
use spelldrill::speech::{create_backend, EngineConfig, SpeechEngine, VoiceCatalog};
use spelldrill::words;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Global flag set by SIGINT/SIGTERM handlers
static SHUTDOWN_PENDING: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_shutdown_signal(_: libc::c_int) {
    SHUTDOWN_PENDING.store(true, Ordering::Relaxed);
}

fn main() {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let debug_mode = args.iter().any(|arg| arg == "--debug" || arg == "-d");

    // Initialize logger
    if debug_mode {
        // Debug mode: write to spelldrill.log file
        use std::fs::OpenOptions;
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open("spelldrill.log")
        {
            Ok(log_file) => {
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Debug)
                    .target(env_logger::Target::Pipe(Box::new(log_file)))
                    .init();
            }
            Err(e) => {
                eprintln!(
                    "Warning: Failed to open spelldrill.log for debug logging: {}",
                    e
                );
                eprintln!("Continuing without file logging...");
                env_logger::Builder::new()
                    .filter_level(log::LevelFilter::Warn)
                    .init();
            }
        }

        info!(
            "Spelldrill version {} starting (debug mode, logging to spelldrill.log)",
            spelldrill::VERSION
        );
    } else {
        // Normal mode: minimal logging to stderr, only errors
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Error)
            .init();
    }

    if let Err(e) = run() {
        error!("Fatal error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    debug!("Initializing spelldrill");

    // Interrupts halt playback cleanly instead of leaving speech running
    unsafe {
        signal::signal(Signal::SIGINT, SigHandler::Handler(handle_shutdown_signal))
            .context("installing SIGINT handler")?;
        signal::signal(Signal::SIGTERM, SigHandler::Handler(handle_shutdown_signal))
            .context("installing SIGTERM handler")?;
    }

    let config = Config::load().context("loading configuration")?;
    info!("Config loaded from {:?}", config.path());

    let mut store = JsonFileStore::open_default().context("opening session store")?;
    let settings = store.get_settings()?;

    // Word list from a file argument or the words themselves
    let args: Vec<String> = std::env::args()
        .skip(1)
        .filter(|arg| arg != "--debug" && arg != "-d")
        .collect();
    let word_list = load_words(&args)?;
    if word_list.is_empty() {
        eprintln!("Usage: spelldrill [--debug] <wordlist-file | word...>");
        process::exit(1);
    }
    info!("Word list loaded: {} words", word_list.len());

    // Speech stack: backend, voice catalog, engine
    let (backend_tx, backend_rx) = bounded(64);
    let backend = create_backend(backend_tx).context("initializing speech synthesis")?;
    let catalog = VoiceCatalog::new(voice_cache_path());
    let mut engine = SpeechEngine::new(backend, catalog, backend_rx, EngineConfig::default());
    engine.set_voice_overrides(config.voice_overrides());
    engine.refresh_voices(Instant::now());

    let controller_config = ControllerConfig {
        max_repetitions: settings.word_repetitions,
        repetition_pause: Duration::from_millis(settings.pause_between_words),
        start_delay: config.start_delay(),
        pause_enabled: settings.enable_pause_button,
        rate: config.rate(),
        pitch: config.pitch(),
        volume: config.volume(),
    };

    let session = store.create_session(&session_title(&args), word_list.clone())?;
    info!("Session {} created", session.id);

    let (event_tx, event_rx) = bounded::<DictationEvent>(64);
    let controller =
        DictationController::new(word_list.clone(), engine, controller_config, event_tx)?;
    let tracker = spelldrill::session::SessionProgressTracker::new(
        session.id.clone(),
        word_list.len(),
        Instant::now(),
    );
    let service = DictationService::spawn(controller, event_rx, tracker, Box::new(store));

    // Event printer; the main thread blocks on stdin
    let ui_events = service.events().clone();
    let words_for_display = word_list.clone();
    let printer = std::thread::spawn(move || {
        let mut mode = PracticeMode::Practice;
        for event in ui_events.iter() {
            print_event(&event, &mut mode, &words_for_display);
        }
    });

    println!("Spelldrill {} ready - {} words", spelldrill::VERSION, word_list.len());
    println!("Commands: p=play  <enter>=pause/resume  n=next  b=back");
    println!("          m=mute  t=test mode  r=practice mode  c=mark done  q=quit");
    print!("> ");
    io::stdout().flush()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        if SHUTDOWN_PENDING.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        let quit = match line.trim() {
            "q" => true,
            "" => {
                service.send(Command::TogglePause);
                false
            }
            "s" => {
                service.send(Command::Start);
                false
            }
            "p" => {
                service.send(Command::Play);
                false
            }
            "n" => {
                service.send(Command::Next);
                false
            }
            "b" => {
                service.send(Command::Previous);
                false
            }
            "m" => {
                service.send(Command::ToggleMute);
                false
            }
            "t" => {
                service.send(Command::SwitchMode(PracticeMode::Test));
                false
            }
            "r" => {
                service.send(Command::SwitchMode(PracticeMode::Practice));
                false
            }
            "c" => {
                service.send(Command::MarkCompleted);
                false
            }
            other => {
                println!("Unknown command: {}", other);
                false
            }
        };
        if quit || SHUTDOWN_PENDING.load(Ordering::Relaxed) {
            break;
        }
        print!("> ");
        io::stdout().flush()?;
    }

    info!("Shutting down");
    service.shutdown();
    let _ = printer.join();
    Ok(())
}

/// A single argument naming a readable file is a word list file; anything
/// else is the words themselves
fn load_words(args: &[String]) -> anyhow::Result<Vec<String>> {
    if args.is_empty() {
        return Ok(Vec::new());
    }
    if args.len() == 1 {
        let path = PathBuf::from(&args[0]);
        if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            return Ok(words::tokenize(&raw));
        }
    }
    Ok(words::tokenize(&args.join(" ")))
}

fn session_title(args: &[String]) -> String {
    match args.first() {
        Some(first) if args.len() == 1 && PathBuf::from(first).is_file() => first.clone(),
        _ => "ad hoc".to_string(),
    }
}

fn voice_cache_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".spelldrill").join("voices.json"))
}

/// Print one playback event; test mode hides the word behind stars
fn print_event(event: &DictationEvent, mode: &mut PracticeMode, words: &[String]) {
    match event {
        DictationEvent::ModeChanged(new_mode) => {
            *mode = *new_mode;
            match new_mode {
                PracticeMode::Test => println!("[test mode: words hidden]"),
                PracticeMode::Practice => println!("[practice mode]"),
            }
        }
        DictationEvent::RepetitionBegan { index, repetition } => match mode {
            PracticeMode::Practice => {
                println!("[{}/{}] {}", index + 1, words.len(), words[*index])
            }
            PracticeMode::Test => {
                println!(
                    "[{}/{}] {}  (repetition {})",
                    index + 1,
                    words.len(),
                    "*".repeat(words[*index].chars().count()),
                    repetition
                )
            }
        },
        DictationEvent::WordAdvanced { index } => match mode {
            PracticeMode::Practice => {
                println!("[{}/{}] {}", index + 1, words.len(), words[*index])
            }
            PracticeMode::Test => println!("[{}/{}]", index + 1, words.len()),
        },
        DictationEvent::WordCompleted { index } => {
            println!("[{}/{}] marked done", index + 1, words.len())
        }
        DictationEvent::WordExhausted { .. } => {
            println!("(repetitions done; n for next word)")
        }
        DictationEvent::Paused => println!("[paused]"),
        DictationEvent::Resumed => println!("[resumed]"),
        DictationEvent::Muted => println!("[muted]"),
        DictationEvent::Unmuted => println!("[unmuted; p to play]"),
        DictationEvent::Suspended => println!("[suspended]"),
        DictationEvent::Notice(message) => println!("! {}", message),
    }
}
