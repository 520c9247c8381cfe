//! Terminal backends.
//!
//! Typed lines stand in for recognized speech and spoken output is printed.
//! Lines starting with `!` are control commands that simulate platform
//! callbacks (`!end`, `!error no-speech`) or host actions (`!pause`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use voice_nav::speech::{SpeechRequest, Synthesizer, UtteranceId, Voice};
use voice_nav::{EngineEvent, NavError, RecognitionErrorKind, Recognizer, RecognizerError, ToggleSource};

/// Simulated speaking speed.
const CHARS_PER_SECOND: f32 = 15.0;
const PLAYBACK_TICK: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    /// What the user "said".
    Speech(String),
    Event(EngineEvent),
    ReadHeadings,
    PauseReading,
    ResumeReading,
    StopReading,
    Quit,
}

pub fn parse_line(line: &str) -> Option<ConsoleInput> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(command) = line.strip_prefix('!') else {
        return Some(ConsoleInput::Speech(line.to_string()));
    };

    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map(|(n, a)| (n, a.trim()))
        .unwrap_or((command, ""));

    let input = match name {
        "toggle" => ConsoleInput::Event(EngineEvent::Toggle(ToggleSource::Control)),
        "end" => ConsoleInput::Event(EngineEvent::RecognitionEnded),
        "error" if !arg.is_empty() => match arg.parse::<RecognitionErrorKind>() {
            Ok(kind) => ConsoleInput::Event(EngineEvent::RecognitionError(kind)),
            Err(never) => match never {},
        },
        "voices" => ConsoleInput::Event(EngineEvent::VoicesChanged),
        "headings" => ConsoleInput::ReadHeadings,
        "pause" => ConsoleInput::PauseReading,
        "resume" => ConsoleInput::ResumeReading,
        "stop" => ConsoleInput::StopReading,
        "quit" | "exit" => ConsoleInput::Quit,
        _ => {
            warn!("Unknown console command: !{name}");
            return None;
        }
    };
    Some(input)
}

/// Read stdin until EOF. Speech lines become transcripts only while the
/// recognizer is started, like a real microphone.
pub fn spawn_stdin_reader(
    listening: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<EngineEvent>,
    inputs: mpsc::UnboundedSender<ConsoleInput>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to read stdin: {e}");
                    break;
                }
            };

            match parse_line(&line) {
                Some(ConsoleInput::Speech(text)) => {
                    if listening.load(Ordering::SeqCst) {
                        let _ = events.send(EngineEvent::Transcript { text, is_final: true });
                    } else {
                        println!("(microphone off, not heard)");
                    }
                }
                Some(input) => {
                    let _ = inputs.send(input);
                }
                None => {}
            }
        }
        let _ = inputs.send(ConsoleInput::Quit);
    });
}

#[derive(Default)]
pub struct ConsoleRecognizer {
    listening: Arc<AtomicBool>,
}

impl ConsoleRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listening_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.listening)
    }
}

impl Recognizer for ConsoleRecognizer {
    fn is_supported(&self) -> bool {
        true
    }

    fn start(&mut self, locale: &str) -> Result<(), RecognizerError> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(RecognizerError::AlreadyStarted);
        }
        println!("🎤 listening ({locale})");
        Ok(())
    }

    fn stop(&mut self) {
        if self.listening.swap(false, Ordering::SeqCst) {
            println!("🎤 off");
        }
    }
}

#[derive(Default)]
struct Playback {
    current: Option<UtteranceId>,
    paused: bool,
}

/// Prints utterances and reports them finished after a duration estimated from their length.
pub struct ConsoleSynthesizer {
    voices: Vec<Voice>,
    playback: Arc<Mutex<Playback>>,
    events: mpsc::UnboundedSender<EngineEvent>,
}

impl ConsoleSynthesizer {
    pub fn new(voices: Vec<Voice>, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self {
            voices,
            playback: Arc::default(),
            events,
        }
    }

    fn update(&self, f: impl FnOnce(&mut Playback)) {
        match self.playback.lock() {
            Ok(mut playback) => f(&mut playback),
            Err(e) => warn!("Playback state poisoned: {e}"),
        }
    }
}

impl Synthesizer for ConsoleSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(&mut self, request: &SpeechRequest) -> voice_nav::Result<()> {
        let mut playback = self
            .playback
            .lock()
            .map_err(|e| NavError::Synthesizer(e.to_string()))?;
        playback.current = Some(request.id);
        playback.paused = false;
        drop(playback);

        let voice = request.voice.as_deref().unwrap_or("default");
        println!("🔊 [{voice}] {}", request.text);

        let secs = request.text.chars().count() as f32 / (CHARS_PER_SECOND * request.rate.max(0.1));
        let duration = Duration::from_secs_f32(secs);
        let id = request.id;
        let playback = Arc::clone(&self.playback);
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut remaining = duration;
            loop {
                tokio::time::sleep(PLAYBACK_TICK).await;
                let Ok(mut state) = playback.lock() else {
                    return;
                };
                if state.current != Some(id) {
                    debug!("Utterance {id} cancelled");
                    return;
                }
                if state.paused {
                    continue;
                }
                remaining = remaining.saturating_sub(PLAYBACK_TICK);
                if remaining.is_zero() {
                    state.current = None;
                    drop(state);
                    let _ = events.send(EngineEvent::SpeechEnded(id));
                    return;
                }
            }
        });
        Ok(())
    }

    fn cancel(&mut self) {
        self.update(|p| {
            p.current = None;
            p.paused = false;
        });
    }

    fn pause(&mut self) {
        self.update(|p| p.paused = true);
        println!("⏸  paused");
    }

    fn resume(&mut self) {
        self.update(|p| p.paused = false);
        println!("▶  resumed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_lines_are_speech() {
        assert_eq!(
            parse_line("  go to grades "),
            Some(ConsoleInput::Speech("go to grades".into()))
        );
        assert_eq!(parse_line("   "), None);
    }

    #[test]
    fn control_lines() {
        assert_eq!(
            parse_line("!error no-speech"),
            Some(ConsoleInput::Event(EngineEvent::RecognitionError(
                RecognitionErrorKind::NoSpeech
            )))
        );
        assert_eq!(
            parse_line("!toggle"),
            Some(ConsoleInput::Event(EngineEvent::Toggle(ToggleSource::Control)))
        );
        assert_eq!(parse_line("!pause"), Some(ConsoleInput::PauseReading));
        assert_eq!(parse_line("!quit"), Some(ConsoleInput::Quit));
        assert_eq!(parse_line("!error"), None);
        assert_eq!(parse_line("!bogus"), None);
    }

    #[test]
    fn recognizer_reports_double_start() {
        let mut recognizer = ConsoleRecognizer::new();
        let flag = recognizer.listening_flag();
        assert!(recognizer.start("en-US").is_ok());
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(recognizer.start("en-US"), Err(RecognizerError::AlreadyStarted));
        recognizer.stop();
        assert!(!flag.load(Ordering::SeqCst));
    }
}
