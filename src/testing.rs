//! In-memory backends for tests and headless hosts.
//!
//! [`FakeRecognizer`] and [`FakeSynthesizer`] append every call they receive
//! to a shared [`CallLog`], so a test can assert the exact interleaving of
//! recognizer and synthesizer operations. [`ManualScheduler`] collects timers
//! instead of sleeping; the test decides when they fire.
//!
//! Built only for unit tests or with the `testing` feature.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::error::{NavError, Result};
use crate::recognition::{Recognizer, RecognizerError};
use crate::scheduler::{Scheduler, Timer};
use crate::speech::{SpeechRequest, Synthesizer, UtteranceId, Voice};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    RecognizerStart,
    RecognizerStop,
    Speak {
        id: UtteranceId,
        text: String,
        voice: Option<String>,
    },
    Cancel,
    Pause,
    Resume,
}

#[derive(Debug, Clone, Default)]
pub struct CallLog(Rc<RefCell<Vec<Call>>>);

impl CallLog {
    pub fn push(&self, call: Call) {
        self.0.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.borrow().clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.0.borrow().iter().filter(|c| *c == call).count()
    }

    pub fn count_speaks(&self) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|c| matches!(c, Call::Speak { .. }))
            .count()
    }

    /// Texts of every utterance handed to the synthesizer, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter_map(|c| match c {
                Call::Speak { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_spoken(&self) -> Option<String> {
        self.spoken().pop()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

pub struct FakeRecognizer {
    log: CallLog,
    pub supported: bool,
    start_errors: VecDeque<RecognizerError>,
}

impl FakeRecognizer {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            supported: true,
            start_errors: VecDeque::new(),
        }
    }

    /// Make the next `start` call fail with `error`. Queued errors are used in order.
    pub fn fail_next_start(&mut self, error: RecognizerError) {
        self.start_errors.push_back(error);
    }
}

impl Recognizer for FakeRecognizer {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn start(&mut self, _locale: &str) -> std::result::Result<(), RecognizerError> {
        if let Some(error) = self.start_errors.pop_front() {
            return Err(error);
        }
        self.log.push(Call::RecognizerStart);
        Ok(())
    }

    fn stop(&mut self) {
        self.log.push(Call::RecognizerStop);
    }
}

pub struct FakeSynthesizer {
    log: CallLog,
    voices: Vec<Voice>,
    fail_next: bool,
}

impl FakeSynthesizer {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            voices: vec![Voice::new("Alex", "en-US"), Voice::new("Daniel", "en-GB")],
            fail_next: false,
        }
    }

    pub fn set_voices(&mut self, voices: Vec<Voice>) {
        self.voices = voices;
    }

    pub fn fail_next_speak(&mut self) {
        self.fail_next = true;
    }
}

impl Synthesizer for FakeSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    fn speak(&mut self, request: &SpeechRequest) -> Result<()> {
        if std::mem::take(&mut self.fail_next) {
            return Err(NavError::Synthesizer("synthesis unavailable".into()));
        }
        self.log.push(Call::Speak {
            id: request.id,
            text: request.text.clone(),
            voice: request.voice.clone(),
        });
        Ok(())
    }

    fn cancel(&mut self) {
        self.log.push(Call::Cancel);
    }

    fn pause(&mut self) {
        self.log.push(Call::Pause);
    }

    fn resume(&mut self) {
        self.log.push(Call::Resume);
    }
}

#[derive(Debug, Default)]
pub struct ManualScheduler {
    pending: RefCell<Vec<(Duration, Timer)>>,
}

impl ManualScheduler {
    /// Drain every armed timer in the order it was armed.
    pub fn take(&self) -> Vec<(Duration, Timer)> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    /// Drain exactly one armed timer; panics if there is not exactly one.
    pub fn take_one(&self) -> (Duration, Timer) {
        let mut pending = self.take();
        assert_eq!(pending.len(), 1, "expected one armed timer, got {pending:?}");
        pending.remove(0)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, timer: Timer) {
        self.pending.borrow_mut().push((delay, timer));
    }
}
