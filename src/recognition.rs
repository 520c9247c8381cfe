//! Recognition session lifecycle as an explicit state machine.
//!
//! IDLE → LISTENING ⇄ WAKE-WORD, with SUSPENDED entered from either active
//! state while speech output plays. A single long-lived [`Recognizer`] is
//! started and stopped underneath; `running` tracks whether it is actually
//! started and is never true while SUSPENDED or IDLE.

use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::RecognitionConfig;
use crate::error::{NavError, Result};
use crate::scheduler::{Scheduler, Timer, TimerKind};

/// Consecutive failed starts tolerated before giving up.
const MAX_START_FAILURES: u32 = 5;

/// Which transcripts an active session acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningMode {
    /// Every final transcript goes to the command matcher.
    Commands,
    /// Only activation phrases are acted upon.
    WakeWord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    WakeWord,
    /// Stopped while speech output plays; `resume` is the state to return to.
    Suspended { resume: ListeningMode },
}

impl SessionState {
    fn from_mode(mode: ListeningMode) -> Self {
        match mode {
            ListeningMode::Commands => Self::Listening,
            ListeningMode::WakeWord => Self::WakeWord,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Listening => write!(f, "LISTENING"),
            Self::WakeWord => write!(f, "WAKE-WORD"),
            Self::Suspended { .. } => write!(f, "SUSPENDED"),
        }
    }
}

/// Failure reported synchronously by [`Recognizer::start`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognizerError {
    #[error("recognizer already started")]
    AlreadyStarted,
    #[error("microphone access not allowed")]
    NotAllowed,
    #[error("{0}")]
    Failed(String),
}

/// Platform speech-to-text capability.
///
/// Transcripts, end-of-session and error callbacks are delivered to the
/// engine as events; this trait only covers the calls the engine makes.
pub trait Recognizer {
    fn is_supported(&self) -> bool;
    fn start(&mut self, locale: &str) -> std::result::Result<(), RecognizerError>;
    fn stop(&mut self);
}

/// Error codes reported asynchronously by the recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    Aborted,
    NotAllowed,
    ServiceNotAllowed,
    AudioCapture,
    Network,
    LanguageNotSupported,
    Other(String),
}

impl FromStr for RecognitionErrorKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim() {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "audio-capture" => Self::AudioCapture,
            "network" => Self::Network,
            "language-not-supported" => Self::LanguageNotSupported,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "no-speech"),
            Self::Aborted => write!(f, "aborted"),
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::ServiceNotAllowed => write!(f, "service-not-allowed"),
            Self::AudioCapture => write!(f, "audio-capture"),
            Self::Network => write!(f, "network"),
            Self::LanguageNotSupported => write!(f, "language-not-supported"),
            Self::Other(code) => write!(f, "{code}"),
        }
    }
}

/// What the session did with an asynchronous recognizer error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorOutcome {
    /// Transient; a restart is scheduled.
    Retrying,
    /// Treated as an explicit stop. The session is now idle.
    Stopped,
    /// Microphone access denied. The session is now idle.
    PermissionDenied,
    /// Unrecoverable for this session. The session is now idle.
    Fatal(String),
    /// Arrived while not listening, e.g. the echo of our own stop.
    Ignored,
}

pub struct RecognitionSession<R> {
    recognizer: R,
    scheduler: Rc<dyn Scheduler>,
    settings: RecognitionConfig,
    state: SessionState,
    running: bool,
    epoch: u64,
    restart_pending: bool,
    start_failures: u32,
}

impl<R: Recognizer> RecognitionSession<R> {
    pub fn new(recognizer: R, scheduler: Rc<dyn Scheduler>, settings: RecognitionConfig) -> Self {
        Self {
            recognizer,
            scheduler,
            settings,
            state: SessionState::Idle,
            running: false,
            epoch: 0,
            restart_pending: false,
            start_failures: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The user's listening intent: true in every state except IDLE.
    pub fn is_active(&self) -> bool {
        self.state != SessionState::Idle
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_wake_word(&self) -> bool {
        matches!(
            self.state,
            SessionState::WakeWord
                | SessionState::Suspended {
                    resume: ListeningMode::WakeWord
                }
        )
    }

    pub fn settings(&self) -> &RecognitionConfig {
        &self.settings
    }

    /// Replace the settings. Ignored unless idle; settings are fixed per session.
    pub fn configure(&mut self, settings: RecognitionConfig) {
        if self.is_active() {
            debug!("Session active, keeping current recognition settings");
            return;
        }
        self.settings = settings;
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    pub fn recognizer_mut(&mut self) -> &mut R {
        &mut self.recognizer
    }

    /// IDLE → LISTENING. Support is checked here rather than at construction.
    pub fn activate(&mut self) -> Result<()> {
        if !self.recognizer.is_supported() {
            warn!("Speech recognition unsupported on this platform");
            return Err(NavError::Unsupported);
        }
        if self.is_active() {
            debug!("Activate ignored, already {}", self.state);
            return Ok(());
        }

        self.transition(SessionState::Listening);
        self.start_failures = 0;
        self.start_recognizer()
    }

    /// Any state → IDLE. Returns false if already idle.
    pub fn deactivate(&mut self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.transition(SessionState::Idle);
        self.stop_recognizer();
        true
    }

    /// Stop listening for the duration of speech output.
    ///
    /// Returns true if the session is now suspended and needs
    /// [`schedule_resume`](Self::schedule_resume) once speech ends. A resume
    /// still pending from earlier speech is cancelled.
    pub fn suspend_for_speech(&mut self) -> bool {
        let resume = match self.state {
            SessionState::Idle => return false,
            SessionState::Suspended { .. } => {
                debug!("Already suspended, dropping pending resume");
                self.transition(self.state);
                return true;
            }
            SessionState::Listening => ListeningMode::Commands,
            SessionState::WakeWord => ListeningMode::WakeWord,
        };
        self.stop_recognizer();
        self.transition(SessionState::Suspended { resume });
        true
    }

    /// Arm the settling delay after speech ends. No-op unless suspended.
    pub fn schedule_resume(&mut self) {
        if !matches!(self.state, SessionState::Suspended { .. }) {
            debug!("Not suspended ({}), nothing to resume", self.state);
            return;
        }
        self.scheduler.schedule(
            self.settings.resume_after_speech(),
            Timer {
                kind: TimerKind::ResumeAfterSpeech,
                epoch: self.epoch,
            },
        );
    }

    /// LISTENING → WAKE-WORD. The recognizer keeps running.
    pub fn enter_wake_word(&mut self) -> bool {
        match self.state {
            SessionState::Listening => self.transition(SessionState::WakeWord),
            SessionState::Suspended {
                resume: ListeningMode::Commands,
            } => {
                self.state = SessionState::Suspended {
                    resume: ListeningMode::WakeWord,
                };
                info!("Will resume in WAKE-WORD mode");
            }
            _ => return false,
        }
        true
    }

    /// WAKE-WORD → LISTENING.
    pub fn wake(&mut self) -> bool {
        match self.state {
            SessionState::WakeWord => self.transition(SessionState::Listening),
            SessionState::Suspended {
                resume: ListeningMode::WakeWord,
            } => {
                self.state = SessionState::Suspended {
                    resume: ListeningMode::Commands,
                };
                info!("Will resume in LISTENING mode");
            }
            _ => return false,
        }
        true
    }

    /// Accept a transcript if the session is listening. Interim results and
    /// anything heard while suspended or idle are dropped.
    pub fn on_result(&self, transcript: &str, is_final: bool) -> Option<ListeningMode> {
        if !is_final {
            debug!("Interim transcript: '{transcript}'");
            return None;
        }
        match self.state {
            SessionState::Listening => Some(ListeningMode::Commands),
            SessionState::WakeWord => Some(ListeningMode::WakeWord),
            state => {
                debug!("Discarding transcript while {state}: '{transcript}'");
                None
            }
        }
    }

    /// The recognizer stopped by itself (silence timeout, error, platform limit).
    pub fn on_end(&mut self) {
        self.running = false;
        match self.state {
            SessionState::Listening | SessionState::WakeWord => {
                debug!("Recognizer ended while {}, restarting", self.state);
                self.schedule_restart(self.settings.restart_delay());
            }
            state => debug!("Recognizer ended while {state}"),
        }
    }

    pub fn on_error(&mut self, kind: &RecognitionErrorKind) -> ErrorOutcome {
        if !matches!(self.state, SessionState::Listening | SessionState::WakeWord) {
            debug!("Ignoring recognizer error '{kind}' while {}", self.state);
            return ErrorOutcome::Ignored;
        }

        match kind {
            RecognitionErrorKind::NoSpeech => {
                debug!("No speech detected, retrying");
                self.schedule_restart(self.settings.no_speech_retry());
                ErrorOutcome::Retrying
            }
            RecognitionErrorKind::Aborted => {
                info!("Recognition aborted, not restarting");
                self.running = false;
                self.transition(SessionState::Idle);
                ErrorOutcome::Stopped
            }
            RecognitionErrorKind::NotAllowed | RecognitionErrorKind::ServiceNotAllowed => {
                error!("Microphone permission denied ({kind})");
                self.running = false;
                self.transition(SessionState::Idle);
                ErrorOutcome::PermissionDenied
            }
            RecognitionErrorKind::AudioCapture | RecognitionErrorKind::LanguageNotSupported => {
                error!("Recognition failed: {kind}");
                self.running = false;
                self.transition(SessionState::Idle);
                ErrorOutcome::Fatal(kind.to_string())
            }
            RecognitionErrorKind::Network | RecognitionErrorKind::Other(_) => {
                warn!("Transient recognition error: {kind}");
                self.schedule_restart(self.settings.restart_delay());
                ErrorOutcome::Retrying
            }
        }
    }

    /// Route a fired timer. Stale timers (armed before the last transition) are no-ops.
    pub fn on_timer(&mut self, timer: Timer) -> Result<()> {
        if timer.epoch != self.epoch {
            debug!("Stale {:?} timer (epoch {} != {})", timer.kind, timer.epoch, self.epoch);
            return Ok(());
        }

        match timer.kind {
            TimerKind::RestartRecognition => {
                self.restart_pending = false;
                if matches!(self.state, SessionState::Listening | SessionState::WakeWord) {
                    self.start_recognizer()?;
                }
            }
            TimerKind::ResumeAfterSpeech => {
                if let SessionState::Suspended { resume } = self.state {
                    self.transition(SessionState::from_mode(resume));
                    self.start_recognizer()?;
                }
            }
            TimerKind::VoiceCatalog => {}
        }
        Ok(())
    }

    fn schedule_restart(&mut self, delay: Duration) {
        if self.restart_pending {
            return;
        }
        self.restart_pending = true;
        self.scheduler.schedule(
            delay,
            Timer {
                kind: TimerKind::RestartRecognition,
                epoch: self.epoch,
            },
        );
    }

    fn start_recognizer(&mut self) -> Result<()> {
        if self.running {
            debug!("Recognizer already running");
            return Ok(());
        }
        if !matches!(self.state, SessionState::Listening | SessionState::WakeWord) {
            debug!("Not starting recognizer while {}", self.state);
            return Ok(());
        }

        match self.recognizer.start(&self.settings.locale) {
            Ok(()) | Err(RecognizerError::AlreadyStarted) => {
                self.running = true;
                self.start_failures = 0;
                debug!("Recognizer started ({})", self.settings.locale);
                Ok(())
            }
            Err(RecognizerError::NotAllowed) => {
                error!("Microphone permission denied on start");
                self.transition(SessionState::Idle);
                Err(NavError::PermissionDenied)
            }
            Err(RecognizerError::Failed(msg)) => {
                self.start_failures += 1;
                if self.start_failures >= MAX_START_FAILURES {
                    error!("Recognizer failed to start {} times: {msg}", self.start_failures);
                    self.transition(SessionState::Idle);
                    return Err(NavError::Recognizer(msg));
                }
                warn!("Recognizer failed to start: {msg}, retrying");
                self.schedule_restart(self.settings.restart_delay());
                Ok(())
            }
        }
    }

    fn stop_recognizer(&mut self) {
        if !self.running {
            return;
        }
        self.recognizer.stop();
        self.running = false;
        debug!("Recognizer stopped");
    }

    /// Every state change bumps the epoch, invalidating armed timers.
    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            info!("State: {} → {}", self.state, next);
        }
        self.state = next;
        self.epoch += 1;
        self.restart_pending = false;
    }
}
