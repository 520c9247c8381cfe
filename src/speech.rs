//! Speech output coordinator.
//!
//! Every utterance goes through here. The newest request always wins: the
//! in-flight utterance is cancelled, nothing is queued. Before audio starts the
//! recognition session is suspended so the engine never transcribes its own
//! voice, and listening resumes only after the utterance has fully ended plus a
//! settling delay.

use std::rc::Rc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::SpeechConfig;
use crate::error::Result;
use crate::recognition::{RecognitionSession, Recognizer};
use crate::scheduler::{Scheduler, Timer, TimerKind};

pub type UtteranceId = u64;

/// A voice offered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    pub name: String,
    /// BCP 47 tag, e.g. `en-GB`.
    pub lang: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// One utterance as handed to the synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub id: UtteranceId,
    pub text: String,
    pub rate: f32,
    pub volume: f32,
    /// Resolved voice name; `None` means the platform default.
    pub voice: Option<String>,
}

/// Per-call overrides of the configured speech settings.
#[derive(Debug, Clone, Default)]
pub struct SpeakOptions {
    pub rate: Option<f32>,
    pub volume: Option<f32>,
    pub voice: Option<String>,
}

/// Platform text-to-speech capability.
///
/// Completion of an utterance is delivered to the engine as
/// `EngineEvent::SpeechEnded(id)`; a changed voice catalog as
/// `EngineEvent::VoicesChanged`.
pub trait Synthesizer {
    /// Currently loaded voices. Empty until the platform catalog is ready.
    fn voices(&self) -> Vec<Voice>;
    fn speak(&mut self, request: &SpeechRequest) -> Result<()>;
    fn cancel(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
}

/// Pick a voice: the preferred name, else the first voice in `locale`, else the first voice.
pub fn select_voice<'a>(voices: &'a [Voice], preferred: Option<&str>, locale: &str) -> Option<&'a Voice> {
    if let Some(name) = preferred {
        if let Some(voice) = voices.iter().find(|v| v.name.eq_ignore_ascii_case(name)) {
            return Some(voice);
        }
        debug!("Preferred voice '{name}' not available");
    }

    let locale = normalize_lang(locale);
    voices
        .iter()
        .find(|v| normalize_lang(&v.lang) == locale)
        .or_else(|| voices.first())
}

fn normalize_lang(lang: &str) -> String {
    lang.trim().replace('_', "-").to_ascii_lowercase()
}

pub struct SpeechCoordinator<S> {
    synth: S,
    scheduler: Rc<dyn Scheduler>,
    settings: SpeechConfig,
    catalog_timeout: Duration,
    current: Option<UtteranceId>,
    paused: bool,
    deferred: Option<SpeechRequest>,
    /// Set when this coordinator suspended the recognition session.
    suspended_listening: bool,
    next_id: UtteranceId,
}

impl<S: Synthesizer> SpeechCoordinator<S> {
    pub fn new(
        synth: S,
        scheduler: Rc<dyn Scheduler>,
        settings: SpeechConfig,
        catalog_timeout: Duration,
    ) -> Self {
        Self {
            synth,
            scheduler,
            settings,
            catalog_timeout,
            current: None,
            paused: false,
            deferred: None,
            suspended_listening: false,
            next_id: 1,
        }
    }

    pub fn configure(&mut self, settings: SpeechConfig, catalog_timeout: Duration) {
        self.settings = settings;
        self.catalog_timeout = catalog_timeout;
    }

    pub fn synthesizer(&self) -> &S {
        &self.synth
    }

    pub fn synthesizer_mut(&mut self) -> &mut S {
        &mut self.synth
    }

    /// An utterance is playing, paused, or waiting for the voice catalog.
    pub fn is_speaking(&self) -> bool {
        self.current.is_some() || self.deferred.is_some()
    }

    /// Audio is actually coming out of the speaker.
    pub fn is_audible(&self) -> bool {
        self.current.is_some() && !self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn current(&self) -> Option<UtteranceId> {
        self.current.or(self.deferred.as_ref().map(|r| r.id))
    }

    /// Speak `text`, superseding anything in flight.
    ///
    /// Returns the utterance id, or `None` if nothing will play (empty text
    /// or the synthesizer refused the request).
    pub fn speak<R: Recognizer>(
        &mut self,
        text: &str,
        options: SpeakOptions,
        listening: &mut RecognitionSession<R>,
    ) -> Option<UtteranceId> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        self.cancel_current();

        let id = self.next_id;
        self.next_id += 1;
        let request = SpeechRequest {
            id,
            text: text.to_string(),
            rate: options.rate.unwrap_or(self.settings.rate),
            volume: options.volume.unwrap_or(self.settings.volume),
            voice: options.voice,
        };

        if listening.suspend_for_speech() {
            self.suspended_listening = true;
        }

        if self.synth.voices().is_empty() {
            debug!("Voice catalog not loaded, deferring utterance {id}");
            self.deferred = Some(request);
            self.scheduler.schedule(
                self.catalog_timeout,
                Timer {
                    kind: TimerKind::VoiceCatalog,
                    epoch: id,
                },
            );
            return Some(id);
        }

        self.emit(request, listening).ok()
    }

    /// The platform voice catalog became available: retry the deferred utterance once.
    ///
    /// Returns the id of a deferred utterance the synthesizer then refused.
    pub fn on_voices_changed<R: Recognizer>(
        &mut self,
        listening: &mut RecognitionSession<R>,
    ) -> Option<UtteranceId> {
        let request = self.deferred.take()?;
        debug!("Voice catalog ready, speaking deferred utterance {}", request.id);
        self.emit(request, listening).err()
    }

    /// The catalog never arrived: speak the deferred utterance with whatever is there.
    pub fn on_catalog_timeout<R: Recognizer>(
        &mut self,
        timer: Timer,
        listening: &mut RecognitionSession<R>,
    ) -> Option<UtteranceId> {
        if self.deferred.as_ref().map(|r| r.id) != Some(timer.epoch) {
            return None;
        }
        let request = self.deferred.take()?;
        warn!("Voice catalog not ready after {}ms, using default voice", self.catalog_timeout.as_millis());
        self.emit(request, listening).err()
    }

    /// The synthesizer finished (or failed) utterance `id`.
    ///
    /// Returns false for utterances that were already superseded or cancelled.
    /// Listening is not resumed here; call [`release_listening`](Self::release_listening)
    /// once no follow-up utterance will be spoken.
    pub fn on_end(&mut self, id: UtteranceId) -> bool {
        if self.current != Some(id) {
            debug!("Ignoring end of superseded utterance {id}");
            return false;
        }
        self.current = None;
        self.paused = false;
        true
    }

    /// Resume listening after a settling delay if this coordinator suspended it
    /// and nothing is speaking anymore.
    pub fn release_listening<R: Recognizer>(&mut self, listening: &mut RecognitionSession<R>) {
        if !self.suspended_listening || self.is_speaking() {
            return;
        }
        self.suspended_listening = false;
        listening.schedule_resume();
    }

    /// Cancel all speech and hand the microphone back.
    pub fn stop<R: Recognizer>(&mut self, listening: &mut RecognitionSession<R>) {
        if self.cancel_current() {
            info!("Speech stopped");
        }
        self.release_listening(listening);
    }

    /// Pause mid-utterance using the platform's native pause. A paused
    /// utterance is silent, so the microphone is handed back meanwhile.
    pub fn pause<R: Recognizer>(&mut self, listening: &mut RecognitionSession<R>) -> bool {
        if self.current.is_none() || self.paused {
            return false;
        }
        self.synth.pause();
        self.paused = true;
        if self.suspended_listening {
            self.suspended_listening = false;
            listening.schedule_resume();
        }
        true
    }

    pub fn resume<R: Recognizer>(&mut self, listening: &mut RecognitionSession<R>) -> bool {
        if self.current.is_none() || !self.paused {
            return false;
        }
        if listening.suspend_for_speech() {
            self.suspended_listening = true;
        }
        self.synth.resume();
        self.paused = false;
        true
    }

    fn emit<R: Recognizer>(
        &mut self,
        mut request: SpeechRequest,
        listening: &mut RecognitionSession<R>,
    ) -> std::result::Result<UtteranceId, UtteranceId> {
        let voices = self.synth.voices();
        let preferred = request.voice.as_deref().or(self.settings.voice.as_deref());
        request.voice = select_voice(&voices, preferred, &self.settings.default_locale)
            .map(|v| v.name.clone());

        let id = request.id;
        match self.synth.speak(&request) {
            Ok(()) => {
                debug!("Speaking utterance {id} ({} chars, voice {:?})", request.text.len(), request.voice);
                self.current = Some(id);
                self.paused = false;
                Ok(id)
            }
            Err(e) => {
                warn!("Speech synthesis failed: {e}");
                self.release_listening(listening);
                Err(id)
            }
        }
    }

    fn cancel_current(&mut self) -> bool {
        let had_speech = self.is_speaking();
        self.deferred = None;
        if self.current.take().is_some() {
            self.synth.cancel();
        }
        self.paused = false;
        had_speech
    }
}
