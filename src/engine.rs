//! The voice navigation engine.
//!
//! [`VoiceNavigator`] owns the recognition session, speech output, command
//! matcher and reader, and is driven entirely by [`EngineEvent`]s: platform
//! callbacks, user toggles and fired timers. Behaviour the engine does not
//! implement itself (routing, scrolling, closing overlays) goes out to the
//! host as [`Notification`]s.
//!
//! Listening and audible speech are mutually exclusive: every utterance
//! suspends the session first, and the session resumes only after the last
//! utterance of a sequence has ended plus a settling delay.

use std::rc::Rc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::commands::{CommandMatcher, Intent, ItemKind, MatchResult, ScrollDirection};
use crate::config::{Config, FeedbackConfig};
use crate::content::{self, ContentItem, ContentNode, PageContentProvider};
use crate::error::{NavError, Result};
use crate::reader::Reader;
use crate::recognition::{ErrorOutcome, RecognitionErrorKind, RecognitionSession, Recognizer, SessionState};
use crate::scheduler::{Scheduler, Timer, TimerKind};
use crate::speech::{SpeakOptions, SpeechCoordinator, Synthesizer, UtteranceId};

const UNSUPPORTED_MESSAGE: &str = "Speech recognition is not available on this system.\n\
    Install or enable a speech recognition service, then try again.\n\
    The keyboard and on-screen controls keep working without voice commands.";

const PERMISSION_MESSAGE: &str = "Voice commands need access to the microphone.\n\
    Allow microphone access for this application in your system settings,\n\
    then turn voice commands on again.";

/// Where a toggle request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleSource {
    /// An on-screen control.
    Control,
    /// The dedicated toggle key. Ignored while the user is typing.
    Key { focus_in_text_input: bool },
}

/// Everything that can drive the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Toggle(ToggleSource),
    Transcript { text: String, is_final: bool },
    /// The recognizer stopped, whether asked to or not.
    RecognitionEnded,
    RecognitionError(RecognitionErrorKind),
    /// Utterance finished playing, failed, or was cancelled by the platform.
    SpeechEnded(UtteranceId),
    VoicesChanged,
    Timer(Timer),
}

/// Outbound, fire-and-forget messages to the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Every feedback line, spoken or not, for visual display.
    Feedback(String),
    /// A blocking explanation the user must see.
    Alert { title: String, message: String },
    ListeningChanged { active: bool, wake_word: bool },
    /// No page provider is registered; the host should read headings itself.
    ReadHeadings,
    ReadRegion { name: String },
    ReadPage,
    OpenContentItem {
        kind: ItemKind,
        /// As spoken, 1-based.
        number: u32,
        /// Host index of the registered item, if one matched.
        index: Option<usize>,
    },
    Navigate { name: String, route: String },
    GoBack,
    Scroll(ScrollDirection),
    CloseOverlay,
    Search { query: String },
}

pub struct VoiceNavigator<R, S> {
    session: RecognitionSession<R>,
    speech: SpeechCoordinator<S>,
    matcher: CommandMatcher,
    reader: Reader,
    /// Applied at the next activation.
    config: Config,
    /// Snapshot taken at activation.
    feedback: FeedbackConfig,
    provider: Option<Box<dyn PageContentProvider>>,
    items: Vec<ContentItem>,
    notifications: mpsc::UnboundedSender<Notification>,
    permission_alerted: bool,
    reported: (bool, bool),
}

impl<R: Recognizer, S: Synthesizer> VoiceNavigator<R, S> {
    pub fn new(
        recognizer: R,
        synthesizer: S,
        scheduler: Rc<dyn Scheduler>,
        config: Config,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> Self {
        let session = RecognitionSession::new(recognizer, scheduler.clone(), config.recognition.clone());
        let speech = SpeechCoordinator::new(
            synthesizer,
            scheduler,
            config.speech.clone(),
            config.recognition.voice_catalog_timeout(),
        );
        let matcher = CommandMatcher::with_defaults(
            &config.navigation.routes,
            &config.recognition.activation_phrases,
        );

        Self {
            session,
            speech,
            matcher,
            reader: Reader::new(config.reading.max_chunk_chars),
            feedback: config.feedback.clone(),
            config,
            provider: None,
            items: Vec::new(),
            notifications,
            permission_alerted: false,
            reported: (false, false),
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &RecognitionSession<R> {
        &self.session
    }

    pub fn speech(&self) -> &SpeechCoordinator<S> {
        &self.speech
    }

    pub fn speech_mut(&mut self) -> &mut SpeechCoordinator<S> {
        &mut self.speech
    }

    pub fn reader(&self) -> &Reader {
        &self.reader
    }

    pub fn matcher(&self) -> &CommandMatcher {
        &self.matcher
    }

    /// True if the recognizer is running while speech is audible. Never true
    /// after any event has been handled.
    pub fn listening_while_speaking(&self) -> bool {
        self.session.is_running() && self.speech.is_audible()
    }

    pub fn handle(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Toggle(ToggleSource::Key {
                focus_in_text_input: true,
            }) => debug!("Toggle key ignored while typing"),
            EngineEvent::Toggle(_) => self.toggle_listening(),
            EngineEvent::Transcript { text, is_final } => self.on_transcript(&text, is_final),
            EngineEvent::RecognitionEnded => self.session.on_end(),
            EngineEvent::RecognitionError(kind) => self.on_recognition_error(&kind),
            EngineEvent::SpeechEnded(id) => self.on_speech_ended(id),
            EngineEvent::VoicesChanged => {
                if let Some(failed) = self.speech.on_voices_changed(&mut self.session) {
                    self.on_speech_failed(failed);
                }
            }
            EngineEvent::Timer(timer) => self.on_timer(timer),
        }
        self.sync();
    }

    /// IDLE → LISTENING, or any active state → IDLE.
    pub fn toggle(&mut self) {
        self.toggle_listening();
        self.sync();
    }

    pub fn read_headings(&mut self) {
        self.read_headings_now();
        self.sync();
    }

    pub fn read_region(&mut self, name: &str) {
        self.read_region_now(name);
        self.sync();
    }

    pub fn read_page(&mut self) {
        self.read_page_now();
        self.sync();
    }

    pub fn list_items(&mut self) {
        self.list_items_now();
        self.sync();
    }

    pub fn stop_reading(&mut self) {
        self.stop_reading_now();
        self.sync();
    }

    pub fn pause_reading(&mut self) {
        self.pause_reading_now();
        self.sync();
    }

    pub fn resume_reading(&mut self) {
        self.resume_reading_now();
        self.sync();
    }

    /// Items of the current page for "open item N" and "list items".
    pub fn register_items(&mut self, items: Vec<ContentItem>) {
        debug!("Registered {} content item(s)", items.len());
        self.items = items;
    }

    pub fn clear_items(&mut self) {
        self.items.clear();
    }

    pub fn set_content_provider(&mut self, provider: Box<dyn PageContentProvider>) {
        self.provider = Some(provider);
    }

    pub fn set_page(&mut self, page: ContentNode) {
        self.provider = Some(Box::new(page));
    }

    pub fn clear_page(&mut self) {
        self.provider = None;
    }

    /// Takes effect at the next activation.
    pub fn update_config(&mut self, config: Config) {
        if self.session.is_active() {
            info!("Configuration updated, applies when voice commands are next turned on");
        }
        self.config = config;
    }

    fn apply_config(&mut self) {
        let config = &self.config;
        self.session.configure(config.recognition.clone());
        self.speech
            .configure(config.speech.clone(), config.recognition.voice_catalog_timeout());
        self.reader.configure(config.reading.max_chunk_chars);
        self.matcher =
            CommandMatcher::with_defaults(&config.navigation.routes, &config.recognition.activation_phrases);
        self.feedback = config.feedback.clone();
    }

    fn toggle_listening(&mut self) {
        if self.session.is_active() {
            self.stop_listening();
        } else {
            self.start_listening();
        }
    }

    fn start_listening(&mut self) {
        self.apply_config();
        self.reader.stop();
        self.speech.stop(&mut self.session);

        match self.session.activate() {
            Ok(()) => {
                info!("Voice commands on");
                self.say("Voice commands on. Say what can I say for help.");
            }
            Err(NavError::Unsupported) => {
                self.alert("Voice commands unavailable", UNSUPPORTED_MESSAGE);
            }
            Err(e) => self.on_start_error(e),
        }
    }

    fn stop_listening(&mut self) {
        self.session.deactivate();
        self.reader.stop();
        self.speech.stop(&mut self.session);
        info!("Voice commands off");
        self.say("Voice commands off.");
    }

    fn on_transcript(&mut self, text: &str, is_final: bool) {
        let Some(mode) = self.session.on_result(text, is_final) else {
            return;
        };

        match self.matcher.match_transcript(text, mode) {
            MatchResult::Matched { intent, transcript } => {
                info!("Command: '{transcript}'");
                self.execute(intent);
            }
            MatchResult::Unmatched { transcript, .. } if transcript.is_empty() => {}
            MatchResult::Unmatched {
                transcript,
                suggestion: Some(suggestion),
            } => {
                info!("Unrecognized: '{transcript}', suggesting '{suggestion}'");
                self.say(&format!("Did you mean: {suggestion}?"));
            }
            MatchResult::Unmatched {
                transcript,
                suggestion: None,
            } => {
                info!("Unrecognized: '{transcript}'");
                self.say(&format!(
                    "Sorry, I didn't recognize \"{}\". Say what can I say for a list of commands.",
                    text.trim()
                ));
            }
            MatchResult::Ignored => {}
        }
    }

    fn execute(&mut self, intent: Intent) {
        match intent {
            Intent::StopListening => self.stop_listening(),
            Intent::DisableCommands => {
                if self.session.enter_wake_word() {
                    self.reader.stop();
                    self.say("Voice commands paused. Say enable voice to turn them back on.");
                }
            }
            Intent::EnableCommands => {
                if self.session.wake() {
                    self.say("Voice commands enabled.");
                }
            }
            Intent::StopReading => self.stop_reading_now(),
            Intent::PauseReading => self.pause_reading_now(),
            Intent::ResumeReading => self.resume_reading_now(),
            Intent::Help => {
                let help = self.help_text();
                self.read_text(&help);
            }
            Intent::ReadHeadings => self.read_headings_now(),
            Intent::ReadPage => self.read_page_now(),
            Intent::ReadRegion(name) => self.read_region_now(&name),
            Intent::ListItems => self.list_items_now(),
            Intent::OpenItem { kind, number } => self.open_item(kind, number),
            Intent::Search(query) => {
                self.say(&format!("Searching for {query}."));
                self.notify(Notification::Search { query });
            }
            Intent::CloseOverlay => {
                self.notify(Notification::CloseOverlay);
                self.say("Closed.");
            }
            Intent::GoBack => {
                self.notify(Notification::GoBack);
                self.say("Going back.");
            }
            Intent::Scroll(direction) => {
                self.notify(Notification::Scroll(direction));
                let phrase = match direction {
                    ScrollDirection::Up => "Scrolling up.",
                    ScrollDirection::Down => "Scrolling down.",
                    ScrollDirection::Top => "Top of page.",
                    ScrollDirection::Bottom => "Bottom of page.",
                };
                self.say(phrase);
            }
            Intent::Navigate { name, route } => {
                self.say(&format!("Opening {name}."));
                self.notify(Notification::Navigate { name, route });
            }
            Intent::Clarify(question) => self.say(&question),
        }
    }

    fn help_text(&self) -> String {
        let commands: Vec<String> = self
            .matcher
            .specs()
            .iter()
            .map(|spec| format!("{}.", spec.description))
            .collect();
        format!("You can say: {}", commands.join(" "))
    }

    fn page(&self) -> Option<Result<ContentNode>> {
        self.provider.as_ref().map(|p| p.snapshot())
    }

    /// The page tree, or `None` after reporting why it is unavailable.
    fn page_or_report(&mut self, fallback: Notification) -> Option<ContentNode> {
        match self.page() {
            Some(Ok(page)) => Some(page),
            Some(Err(e)) => {
                warn!("Page content unavailable: {e}");
                self.say("Sorry, I couldn't read this page.");
                None
            }
            None => {
                debug!("No page provider, delegating {fallback:?} to host");
                self.notify(fallback);
                None
            }
        }
    }

    fn read_headings_now(&mut self) {
        let Some(page) = self.page_or_report(Notification::ReadHeadings) else {
            return;
        };
        let headings = content::extract_headings(&page);
        debug!("Found {} heading(s)", headings.len());
        self.read_text(&content::narrate_headings(&headings));
    }

    fn read_region_now(&mut self, name: &str) {
        let fallback = Notification::ReadRegion { name: name.to_string() };
        let Some(page) = self.page_or_report(fallback) else {
            return;
        };

        let Some(region) = content::resolve_region(&page, name) else {
            info!("Region '{name}' not found");
            self.say(&format!("Sorry, I couldn't find the {name} section on this page."));
            return;
        };

        let text = content::narrate(region);
        if text.is_empty() {
            self.say(&format!("The {name} section is empty."));
        } else {
            self.read_text(&text);
        }
    }

    fn read_page_now(&mut self) {
        let Some(page) = self.page_or_report(Notification::ReadPage) else {
            return;
        };
        let text = content::narrate(&page);
        if text.is_empty() {
            self.say("There is nothing to read on this page.");
        } else {
            self.read_text(&text);
        }
    }

    fn list_items_now(&mut self) {
        if self.items.is_empty() {
            self.say("There are no items on this page.");
            return;
        }
        let noun = if self.items.len() == 1 { "item" } else { "items" };
        let listing: Vec<String> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| format!("Item {}: {}.", i + 1, item.title.trim_end_matches('.')))
            .collect();
        let text = format!("There are {} {noun}. {}", self.items.len(), listing.join(" "));
        self.read_text(&text);
    }

    fn open_item(&mut self, kind: ItemKind, number: u32) {
        let item = (number as usize)
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
            .cloned();

        if item.is_none() && (number == 0 || !self.items.is_empty()) {
            self.say(&format!("There is no {kind} {number} on this page."));
            return;
        }

        match &item {
            Some(item) => self.say(&format!("Opening {}.", item.title.trim_end_matches('.'))),
            None => self.say(&format!("Opening {kind} {number}.")),
        }
        self.notify(Notification::OpenContentItem {
            kind,
            number,
            index: item.map(|i| i.index),
        });
    }

    fn stop_reading_now(&mut self) {
        if self.reader.stop() {
            self.speech.stop(&mut self.session);
            info!("Reading stopped");
            self.notify(Notification::Feedback("Stopped reading.".into()));
        } else {
            self.say("I'm not reading anything.");
        }
    }

    fn pause_reading_now(&mut self) {
        if !self.reader.is_reading() {
            self.say("I'm not reading anything.");
            return;
        }
        if !self.reader.is_paused() && self.speech.pause(&mut self.session) {
            self.reader.set_paused(true);
            info!("Reading paused");
            self.notify(Notification::Feedback("Reading paused. Say resume reading to continue.".into()));
        }
    }

    fn resume_reading_now(&mut self) {
        if !self.reader.is_paused() {
            if !self.reader.is_reading() {
                self.say("There is nothing to resume.");
            }
            return;
        }
        if self.speech.resume(&mut self.session) {
            self.reader.set_paused(false);
            info!("Reading resumed");
            self.notify(Notification::Feedback("Resuming.".into()));
        }
    }

    /// Start a reading job for `text`, replacing any current one.
    fn read_text(&mut self, text: &str) {
        match self.reader.start(text) {
            Some(first) => self.play_chunk(&first),
            None => self.say("There is nothing to read."),
        }
    }

    fn play_chunk(&mut self, chunk: &str) {
        match self.speech.speak(chunk, SpeakOptions::default(), &mut self.session) {
            Some(id) => self.reader.playing(id),
            None => {
                warn!("Could not speak chunk, abandoning reading");
                self.reader.stop();
            }
        }
    }

    /// Spoken feedback. Always surfaced as a notification; spoken only if enabled.
    /// Speaking supersedes any reading in progress.
    fn say(&mut self, text: &str) {
        self.notify(Notification::Feedback(text.to_string()));
        if !self.feedback.spoken {
            return;
        }
        if self.reader.stop() {
            debug!("Reading interrupted by feedback");
        }
        self.speech.speak(text, SpeakOptions::default(), &mut self.session);
    }

    fn on_speech_ended(&mut self, id: UtteranceId) {
        if !self.speech.on_end(id) {
            return;
        }

        if self.reader.owns(id) {
            if let Some(next) = self.reader.advance() {
                self.play_chunk(&next);
                return;
            }
        }

        self.speech.release_listening(&mut self.session);
    }

    /// The synthesizer refused utterance `id`; listening has already been released.
    fn on_speech_failed(&mut self, id: UtteranceId) {
        if self.reader.owns(id) {
            warn!("Reading abandoned, speech output failed");
            self.reader.stop();
        }
    }

    fn on_timer(&mut self, timer: Timer) {
        if timer.kind == TimerKind::VoiceCatalog {
            if let Some(failed) = self.speech.on_catalog_timeout(timer, &mut self.session) {
                self.on_speech_failed(failed);
            }
            return;
        }

        if let Err(e) = self.session.on_timer(timer) {
            self.on_start_error(e);
        }
    }

    fn on_recognition_error(&mut self, kind: &RecognitionErrorKind) {
        match self.session.on_error(kind) {
            ErrorOutcome::Retrying | ErrorOutcome::Ignored | ErrorOutcome::Stopped => {}
            ErrorOutcome::PermissionDenied => self.permission_denied(),
            ErrorOutcome::Fatal(code) => {
                self.reader.stop();
                self.alert(
                    "Voice commands stopped",
                    &format!("The speech recognizer stopped with an error ({code}).\nTurn voice commands on again to retry."),
                );
            }
        }
    }

    fn on_start_error(&mut self, e: NavError) {
        match e {
            NavError::PermissionDenied => self.permission_denied(),
            other => {
                error!("Could not start recognition: {other}");
                self.alert(
                    "Voice commands stopped",
                    &format!("The speech recognizer could not be started: {other}.\nTurn voice commands on again to retry."),
                );
            }
        }
    }

    fn permission_denied(&mut self) {
        self.reader.stop();
        self.speech.stop(&mut self.session);
        if self.permission_alerted {
            return;
        }
        self.permission_alerted = true;
        self.alert("Microphone access denied", PERMISSION_MESSAGE);
    }

    fn alert(&mut self, title: &str, message: &str) {
        warn!("{title}: {}", message.replace('\n', " "));
        self.notify(Notification::Alert {
            title: title.to_string(),
            message: message.to_string(),
        });
    }

    fn notify(&self, notification: Notification) {
        // Receiver gone means the host is shutting down.
        let _ = self.notifications.send(notification);
    }

    /// Report listening changes and check the exclusivity invariant.
    fn sync(&mut self) {
        let now = (self.session.is_active(), self.session.is_wake_word());
        if now != self.reported {
            self.reported = now;
            self.notify(Notification::ListeningChanged {
                active: now.0,
                wake_word: now.1,
            });
        }

        if self.listening_while_speaking() {
            error!("Recognizer running while speech is audible");
        }
        debug_assert!(!self.listening_while_speaking());
    }
}
