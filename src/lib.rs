//! voice-nav: hands-free voice command navigation.
//!
//! Continuous speech recognition drives a command grammar; spoken feedback
//! and chunked page narration go out through speech synthesis, with the
//! microphone always released before the engine speaks. Recognition and
//! synthesis are capabilities ([`Recognizer`], [`Synthesizer`]) supplied by
//! the host.

pub mod commands;
pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod reader;
pub mod recognition;
pub mod scheduler;
pub mod speech;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use commands::{CommandMatcher, CommandSpec, Intent, MatchResult};
pub use config::Config;
pub use content::{ContentItem, ContentNode, PageContentProvider};
pub use engine::{EngineEvent, Notification, ToggleSource, VoiceNavigator};
pub use error::{NavError, Result};
pub use recognition::{RecognitionErrorKind, Recognizer, RecognizerError, SessionState};
pub use scheduler::{Scheduler, Timer, TimerKind, TokioScheduler};
pub use speech::{SpeechRequest, Synthesizer, UtteranceId, Voice};
