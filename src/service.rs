//! Service loop: feeds platform events, the toggle key and console input to
//! the navigator and acts on its notifications.
//!
//! The navigator is single-threaded, so everything runs on the current task;
//! backends and timers only ever talk to it through channels.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use voice_nav::content::{ContentItem, JsonFileProvider};
use voice_nav::speech::Voice;
use voice_nav::{Config, EngineEvent, Notification, ToggleSource, TokioScheduler, VoiceNavigator};

use crate::console::{self, ConsoleInput, ConsoleRecognizer, ConsoleSynthesizer};
use crate::hotkey::{HotkeyEvent, HotkeyMonitor};
use crate::notifier::Notifier;

pub struct ServiceOptions {
    pub page: Option<PathBuf>,
    pub items: Option<PathBuf>,
    pub hotkey: bool,
    /// Start listening immediately instead of waiting for a toggle.
    pub listen: bool,
}

pub struct VoiceService {
    config: Config,
    options: ServiceOptions,
    notifier: Notifier,
}

impl VoiceService {
    pub fn new(config: Config, options: ServiceOptions) -> Self {
        let notifier = Notifier::new(config.feedback.notifications);
        Self {
            config,
            options,
            notifier,
        }
    }

    pub async fn run(self) -> voice_nav::Result<()> {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<EngineEvent>();
        let (note_tx, mut note_rx) = mpsc::unbounded_channel::<Notification>();
        let (input_tx, mut input_rx) = mpsc::unbounded_channel::<ConsoleInput>();
        let (hotkey_tx, mut hotkey_rx) = mpsc::channel::<HotkeyEvent>(16);

        let recognizer = ConsoleRecognizer::new();
        console::spawn_stdin_reader(recognizer.listening_flag(), event_tx.clone(), input_tx);

        let voices = vec![Voice::new("console", self.config.speech.default_locale.clone())];
        let synthesizer = ConsoleSynthesizer::new(voices, event_tx.clone());
        let scheduler = Rc::new(TokioScheduler::new(event_tx));

        let mut navigator = VoiceNavigator::new(
            recognizer,
            synthesizer,
            scheduler,
            self.config.clone(),
            note_tx,
        );

        if let Some(path) = &self.options.page {
            info!("Page content from {}", path.display());
            navigator.set_content_provider(Box::new(JsonFileProvider::new(path)));
        }
        if let Some(path) = &self.options.items {
            navigator.register_items(load_items(path)?);
        }

        if self.options.hotkey {
            let monitor = HotkeyMonitor::new(&self.config.hotkey, hotkey_tx);
            tokio::spawn(monitor.run());
        } else {
            drop(hotkey_tx);
        }

        if self.options.listen {
            navigator.toggle();
        }

        info!("Service ready, type !toggle or press the toggle key to start listening");

        loop {
            tokio::select! {
                Some(event) = event_rx.recv() => navigator.handle(event),
                Some(HotkeyEvent::Pressed) = hotkey_rx.recv() => {
                    navigator.handle(EngineEvent::Toggle(ToggleSource::Key { focus_in_text_input: false }));
                }
                input = input_rx.recv() => match input {
                    Some(ConsoleInput::Event(event)) => navigator.handle(event),
                    Some(ConsoleInput::ReadHeadings) => navigator.read_headings(),
                    Some(ConsoleInput::PauseReading) => navigator.pause_reading(),
                    Some(ConsoleInput::ResumeReading) => navigator.resume_reading(),
                    Some(ConsoleInput::StopReading) => navigator.stop_reading(),
                    Some(ConsoleInput::Speech(_)) => {}
                    Some(ConsoleInput::Quit) | None => break,
                },
                Some(note) = note_rx.recv() => self.present(note),
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted");
                    break;
                }
            }
        }

        if navigator.session().is_active() {
            navigator.toggle();
        }
        while let Ok(note) = note_rx.try_recv() {
            self.present(note);
        }
        info!("Service stopped");
        Ok(())
    }

    /// Stand-in for the host page: print what it would do.
    fn present(&self, note: Notification) {
        match note {
            Notification::Feedback(text) => println!("💬 {text}"),
            Notification::Alert { title, message } => {
                eprintln!("⚠  {title}\n{message}");
                self.notifier.alert(&title, &message);
            }
            Notification::ListeningChanged { active, wake_word } => {
                let (summary, body) = match (active, wake_word) {
                    (false, _) => ("Voice commands off", "Press the toggle key to start listening"),
                    (true, false) => ("Voice commands on", "Listening for commands"),
                    (true, true) => ("Voice commands paused", "Say \"enable voice\" to resume"),
                };
                info!("{summary}");
                self.notifier.status(summary, body);
            }
            Notification::Navigate { name, route } => println!("→ navigate to {route} ({name})"),
            Notification::OpenContentItem { kind, number, index } => match index {
                Some(index) => println!("→ open {kind} {number} (index {index})"),
                None => println!("→ open {kind} {number}"),
            },
            Notification::Search { query } => println!("→ search for \"{query}\""),
            Notification::Scroll(direction) => println!("→ scroll {direction:?}"),
            Notification::GoBack => println!("→ back"),
            Notification::CloseOverlay => println!("→ close overlay"),
            Notification::ReadHeadings | Notification::ReadPage | Notification::ReadRegion { .. } => {
                warn!("No page loaded, cannot handle {note:?} (start with --page)");
            }
        }
    }
}

fn load_items(path: &Path) -> voice_nav::Result<Vec<ContentItem>> {
    let json = std::fs::read_to_string(path)?;
    let items: Vec<ContentItem> =
        serde_json::from_str(&json).map_err(|e| voice_nav::NavError::Page(e.to_string()))?;
    info!("Loaded {} item(s) from {}", items.len(), path.display());
    Ok(items)
}
