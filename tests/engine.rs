use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;
use voice_nav::commands::ItemKind;
use voice_nav::testing::{Call, CallLog, FakeRecognizer, FakeSynthesizer, ManualScheduler};
use voice_nav::{
    Config, ContentItem, ContentNode, EngineEvent, Notification, RecognitionErrorKind, RecognizerError,
    SessionState, ToggleSource, VoiceNavigator,
};

struct Harness {
    nav: VoiceNavigator<FakeRecognizer, FakeSynthesizer>,
    log: CallLog,
    scheduler: Rc<ManualScheduler>,
    notes: mpsc::UnboundedReceiver<Notification>,
}

fn harness() -> Harness {
    build(Config::default(), FakeRecognizer::new)
}

fn build(config: Config, recognizer: impl FnOnce(CallLog) -> FakeRecognizer) -> Harness {
    let log = CallLog::default();
    let scheduler = Rc::new(ManualScheduler::default());
    let (tx, notes) = mpsc::unbounded_channel();
    let nav = VoiceNavigator::new(
        recognizer(log.clone()),
        FakeSynthesizer::new(log.clone()),
        scheduler.clone(),
        config,
        tx,
    );
    Harness {
        nav,
        log,
        scheduler,
        notes,
    }
}

impl Harness {
    fn send(&mut self, event: EngineEvent) {
        self.nav.handle(event);
        assert!(!self.nav.listening_while_speaking(), "recognizer ran during speech");
    }

    fn toggle(&mut self) {
        self.send(EngineEvent::Toggle(ToggleSource::Control));
    }

    fn hear(&mut self, text: &str) {
        self.send(EngineEvent::Transcript {
            text: text.into(),
            is_final: true,
        });
    }

    fn finish_speech(&mut self) {
        let id = self.nav.speech().current().expect("nothing is speaking");
        self.send(EngineEvent::SpeechEnded(id));
    }

    fn fire_timers(&mut self) -> usize {
        let timers = self.scheduler.take();
        let fired = timers.len();
        for (_, timer) in timers {
            self.send(EngineEvent::Timer(timer));
        }
        fired
    }

    /// Let all speech play out and all timers fire.
    fn settle(&mut self) {
        for _ in 0..100 {
            let mut progressed = false;
            if self.nav.speech().is_audible() {
                self.finish_speech();
                progressed = true;
            }
            progressed |= self.fire_timers() > 0;
            if !progressed {
                return;
            }
        }
        panic!("engine did not settle");
    }

    fn activate(&mut self) {
        self.toggle();
        self.settle();
        assert_eq!(self.nav.state(), SessionState::Listening);
        assert!(self.nav.session().is_running());
        self.log.clear();
        self.notes();
    }

    /// Hear a command and let its feedback play out.
    fn command(&mut self, text: &str) -> Vec<Notification> {
        self.hear(text);
        let notes = self.notes();
        self.settle();
        notes
    }

    fn notes(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(note) = self.notes.try_recv() {
            out.push(note);
        }
        out
    }
}

fn feedback(notes: &[Notification]) -> Vec<String> {
    notes
        .iter()
        .filter_map(|n| match n {
            Notification::Feedback(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn quiet_config() -> Config {
    let mut config = Config::default();
    config.feedback.spoken = false;
    config
}

fn long_page() -> ContentNode {
    (1..=30).fold(ContentNode::new("main"), |page, i| {
        page.child(ContentNode::new("p").with_text(&format!(
            "Paragraph {i} explains one topic of the course in plain words."
        )))
    })
}

#[test]
fn toggle_twice_starts_and_stops_once() {
    let mut h = harness();
    h.toggle();
    h.toggle();

    assert_eq!(h.nav.state(), SessionState::Idle);
    assert_eq!(h.log.count(&Call::RecognizerStart), 1);
    assert_eq!(h.log.count(&Call::RecognizerStop), 1);

    h.settle();
    assert_eq!(h.log.count(&Call::RecognizerStart), 1);
}

#[test]
fn toggle_twice_without_spoken_feedback() {
    let mut h = build(quiet_config(), FakeRecognizer::new);
    h.toggle();
    assert!(h.nav.session().is_running());
    h.toggle();

    assert_eq!(h.nav.state(), SessionState::Idle);
    assert_eq!(h.log.calls(), vec![Call::RecognizerStart, Call::RecognizerStop]);
    assert_eq!(h.log.count_speaks(), 0);
}

#[test]
fn toggle_key_ignored_while_typing() {
    let mut h = harness();
    h.send(EngineEvent::Toggle(ToggleSource::Key {
        focus_in_text_input: true,
    }));
    assert_eq!(h.nav.state(), SessionState::Idle);
    assert!(h.log.calls().is_empty());

    h.send(EngineEvent::Toggle(ToggleSource::Key {
        focus_in_text_input: false,
    }));
    assert!(h.nav.session().is_active());
}

#[test]
fn recognizer_restarts_only_after_speech_ends() {
    let mut h = harness();
    h.toggle();

    let calls = h.log.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], Call::RecognizerStart);
    assert_eq!(calls[1], Call::RecognizerStop);
    assert!(matches!(&calls[2], Call::Speak { voice: Some(v), .. } if v == "Daniel"));
    assert!(h.scheduler.take().is_empty(), "nothing may be armed while speaking");

    h.finish_speech();
    assert!(!h.nav.session().is_running());
    let (delay, timer) = h.scheduler.take_one();
    assert_eq!(delay, Duration::from_millis(300));

    h.send(EngineEvent::Timer(timer));
    assert!(h.nav.session().is_running());
    assert_eq!(h.log.calls().last(), Some(&Call::RecognizerStart));
}

#[test]
fn listening_and_speaking_never_overlap() {
    let mut h = harness();
    h.nav.set_page(long_page());
    h.nav.register_items(vec![ContentItem {
        title: "Physics".into(),
        index: 0,
    }]);

    h.toggle();
    h.hear("go to grades");
    h.settle();
    h.hear("read this page");
    h.finish_speech();
    h.send(EngineEvent::RecognitionEnded);
    h.fire_timers();
    h.nav.pause_reading();
    h.fire_timers();
    h.hear("resume reading");
    h.send(EngineEvent::RecognitionError(RecognitionErrorKind::NoSpeech));
    h.fire_timers();
    h.hear("open item one");
    h.settle();
    h.hear("disable voice");
    h.settle();
    h.hear("enable voice");
    h.toggle();
    h.settle();

    assert_eq!(h.nav.state(), SessionState::Idle);
    assert!(!h.nav.session().is_running());
}

#[test]
fn navigation_command_notifies_host() {
    let mut h = harness();
    h.activate();

    let notes = h.command("go to dashboard");
    assert!(notes.contains(&Notification::Navigate {
        name: "dashboard".into(),
        route: "/dashboard".into(),
    }));
    assert_eq!(h.log.spoken(), vec!["Opening dashboard."]);
    assert!(h.nav.session().is_running());
}

#[test]
fn interim_transcripts_do_nothing() {
    let mut h = harness();
    h.activate();
    h.send(EngineEvent::Transcript {
        text: "go to grades".into(),
        is_final: false,
    });
    assert!(h.notes().is_empty());
    assert!(h.log.calls().is_empty());
}

#[test]
fn typo_gets_a_suggestion() {
    let mut h = harness();
    h.activate();

    h.command("go dashboad");
    assert_eq!(h.log.spoken(), vec!["Did you mean: go to dashboard?"]);
}

#[test]
fn unknown_command_repeats_transcript() {
    let mut h = harness();
    h.activate();

    h.command("tell me a joke");
    let spoken = h.log.last_spoken().unwrap();
    assert!(spoken.contains("\"tell me a joke\""), "{spoken}");
}

#[test]
fn unknown_command_keeps_transcript_as_heard() {
    let mut h = harness();
    h.activate();

    h.command("  Tell me a JOKE! ");
    let spoken = h.log.last_spoken().unwrap();
    assert!(spoken.contains("\"Tell me a JOKE!\""), "{spoken}");
}

#[test]
fn missing_region_says_so_once() {
    let mut h = harness();
    h.nav.set_page(long_page());
    h.activate();

    h.nav.read_region("nonexistent-widget");

    assert_eq!(h.log.count_speaks(), 1);
    assert!(h.log.last_spoken().unwrap().contains("couldn't find the nonexistent-widget"));
    assert!(h.nav.reader().job().is_none());
    assert_eq!(feedback(&h.notes()).len(), 1);
}

#[test]
fn region_is_read_by_name() {
    let mut h = harness();
    h.nav.set_page(
        ContentNode::new("body").child(
            ContentNode::new("aside")
                .child(ContentNode::new("a").with_text("Courses"))
                .child(ContentNode::new("button").with_text("Log out")),
        ),
    );
    h.activate();

    h.command("read the sidebar");
    assert_eq!(h.log.spoken(), vec!["Link: Courses. Button: Log out."]);
    assert!(h.nav.reader().job().is_none());
}

#[test]
fn reading_plays_chunks_back_to_back() {
    let mut h = harness();
    h.nav.set_page(long_page());
    h.activate();

    h.hear("read this page");
    let total = h.nav.reader().job().unwrap().total_chunks;
    assert!(total >= 3);

    for i in 1..total {
        assert_eq!(h.log.count_speaks(), i);
        h.finish_speech();
        assert!(h.scheduler.take().is_empty(), "listening resumed between chunks");
        assert!(!h.nav.session().is_running());
    }
    assert_eq!(h.log.count_speaks(), total);
    assert!(h.log.spoken().iter().all(|chunk| chunk.chars().count() <= 500));

    h.finish_speech();
    assert!(h.nav.reader().job().is_none());
    h.fire_timers();
    assert!(h.nav.session().is_running());
    assert_eq!(h.log.count(&Call::Cancel), 0);
    assert_eq!(h.log.count(&Call::RecognizerStop), 1);
}

#[test]
fn paused_reading_listens_for_resume() {
    let mut h = harness();
    h.nav.set_page(long_page());
    h.activate();

    h.hear("read this page");
    h.nav.pause_reading();
    assert!(h.nav.reader().is_paused());
    assert_eq!(h.log.count(&Call::Pause), 1);

    h.fire_timers();
    assert_eq!(h.nav.state(), SessionState::Listening);
    assert!(h.nav.session().is_running());

    h.hear("resume reading");
    assert_eq!(h.log.count(&Call::Resume), 1);
    assert!(!h.nav.reader().is_paused());
    assert!(!h.nav.session().is_running());
    assert!(h.nav.speech().is_audible());
}

#[test]
fn host_read_during_settling_delay_keeps_microphone_off() {
    let mut h = harness();
    h.nav.set_page(long_page());
    h.toggle();
    h.finish_speech();
    let armed = h.scheduler.take();
    assert_eq!(armed.len(), 1);

    h.nav.read_page();
    assert!(h.nav.speech().is_audible());
    for (_, timer) in armed {
        h.send(EngineEvent::Timer(timer));
    }

    assert!(!h.nav.session().is_running());
    assert_eq!(h.log.count(&Call::RecognizerStart), 1);
    h.settle();
    assert!(h.nav.session().is_running());
}

#[test]
fn quick_pause_and_resume_keeps_microphone_off() {
    let mut h = harness();
    h.nav.set_page(long_page());
    h.activate();

    h.hear("read this page");
    h.nav.pause_reading();
    let armed = h.scheduler.take();
    assert_eq!(armed.len(), 1);

    h.nav.resume_reading();
    for (_, timer) in armed {
        h.send(EngineEvent::Timer(timer));
    }

    assert!(h.nav.speech().is_audible());
    assert!(!h.nav.session().is_running());
    assert_eq!(h.log.count(&Call::RecognizerStart), 0);
}

#[test]
fn stop_reading_drops_the_job() {
    let mut h = harness();
    h.nav.set_page(long_page());
    h.activate();

    h.hear("read this page");
    h.nav.stop_reading();

    assert!(h.nav.reader().job().is_none());
    assert_eq!(h.log.count(&Call::Cancel), 1);
    h.fire_timers();
    assert!(h.nav.session().is_running());
}

#[test]
fn headings_without_page_are_delegated() {
    let mut h = harness();
    h.activate();

    let notes = h.command("read page headings");
    assert!(notes.contains(&Notification::ReadHeadings));
    assert_eq!(h.log.count_speaks(), 0);
}

#[test]
fn headings_are_counted_and_listed() {
    let mut h = harness();
    h.nav.set_page(
        ContentNode::new("main")
            .child(ContentNode::new("h1").with_text("My Courses"))
            .child(ContentNode::new("h2").with_text("Archived").hidden())
            .child(ContentNode::new("div").with_class("card-title").with_text("Algebra")),
    );
    h.activate();

    h.command("read headings");
    assert_eq!(
        h.log.spoken(),
        vec!["This page has 2 headings. My Courses. Algebra."]
    );
}

#[test]
fn wake_word_mode_ignores_commands() {
    let mut h = harness();
    h.activate();

    let notes = h.command("disable voice");
    assert!(notes.contains(&Notification::ListeningChanged {
        active: true,
        wake_word: true,
    }));
    assert_eq!(h.nav.state(), SessionState::WakeWord);
    assert!(h.nav.session().is_running());

    h.log.clear();
    let notes = h.command("go to grades");
    assert!(notes.is_empty());
    assert_eq!(h.log.count_speaks(), 0);

    h.command("OK enable voice");
    assert_eq!(h.nav.state(), SessionState::Listening);
    assert_eq!(h.log.spoken(), vec!["Voice commands enabled."]);
}

#[test]
fn open_item_uses_registered_items() {
    let mut h = harness();
    h.nav.register_items(vec![
        ContentItem {
            title: "Linear Algebra".into(),
            index: 4,
        },
        ContentItem {
            title: "Physics".into(),
            index: 7,
        },
    ]);
    h.activate();

    let notes = h.command("open item two");
    assert!(notes.contains(&Notification::OpenContentItem {
        kind: ItemKind::Item,
        number: 2,
        index: Some(7),
    }));
    assert_eq!(h.log.last_spoken().as_deref(), Some("Opening Physics."));

    let notes = h.command("open item 5");
    assert!(!notes.iter().any(|n| matches!(n, Notification::OpenContentItem { .. })));
    assert_eq!(h.log.last_spoken().as_deref(), Some("There is no item 5 on this page."));

    h.log.clear();
    h.command("list items");
    assert_eq!(
        h.log.spoken(),
        vec!["There are 2 items. Item 1: Linear Algebra. Item 2: Physics."]
    );
}

#[test]
fn open_item_without_number_asks() {
    let mut h = harness();
    h.activate();

    let notes = h.command("open video");
    assert!(!notes.iter().any(|n| matches!(n, Notification::OpenContentItem { .. })));
    assert!(h.log.last_spoken().unwrap().starts_with("Which video number?"));
}

#[test]
fn unsupported_platform_alerts_and_stays_idle() {
    let mut h = build(Config::default(), |log| {
        let mut recognizer = FakeRecognizer::new(log);
        recognizer.supported = false;
        recognizer
    });

    h.toggle();
    h.toggle();

    assert_eq!(h.nav.state(), SessionState::Idle);
    assert_eq!(h.log.count(&Call::RecognizerStart), 0);
    let alerts: Vec<_> = h
        .notes()
        .into_iter()
        .filter_map(|n| match n {
            Notification::Alert { message, .. } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(alerts.len(), 2);
    assert!(alerts[0].lines().count() > 1);
}

#[test]
fn permission_denied_alerts_once() {
    let mut h = harness();
    h.activate();

    h.send(EngineEvent::RecognitionError(RecognitionErrorKind::NotAllowed));
    assert_eq!(h.nav.state(), SessionState::Idle);

    h.toggle();
    h.settle();
    h.send(EngineEvent::RecognitionError(RecognitionErrorKind::ServiceNotAllowed));

    let alerts = h
        .notes()
        .into_iter()
        .filter(|n| matches!(n, Notification::Alert { .. }))
        .count();
    assert_eq!(alerts, 1);
    h.fire_timers();
    assert_eq!(h.nav.state(), SessionState::Idle);
}

#[test]
fn permission_denied_at_start() {
    let mut h = build(Config::default(), |log| {
        let mut recognizer = FakeRecognizer::new(log);
        recognizer.fail_next_start(RecognizerError::NotAllowed);
        recognizer
    });

    h.toggle();
    assert_eq!(h.nav.state(), SessionState::Idle);
    assert!(h
        .notes()
        .iter()
        .any(|n| matches!(n, Notification::Alert { title, .. } if title.contains("Microphone"))));
}

#[test]
fn aborted_is_not_restarted() {
    let mut h = harness();
    h.activate();

    h.send(EngineEvent::RecognitionError(RecognitionErrorKind::Aborted));
    h.send(EngineEvent::RecognitionEnded);
    h.fire_timers();

    assert_eq!(h.nav.state(), SessionState::Idle);
    assert_eq!(h.log.count(&Call::RecognizerStart), 0);
    assert!(h.notes().contains(&Notification::ListeningChanged {
        active: false,
        wake_word: false,
    }));
}

#[test]
fn stale_restart_after_toggle_off_is_ignored() {
    let mut h = harness();
    h.activate();

    h.send(EngineEvent::RecognitionEnded);
    h.toggle();
    h.settle();

    assert_eq!(h.nav.state(), SessionState::Idle);
    assert_eq!(h.log.count(&Call::RecognizerStart), 0);
}

#[test]
fn config_changes_apply_at_next_activation() {
    let mut h = harness();
    h.activate();

    h.nav.update_config(quiet_config());
    h.command("go back");
    assert_eq!(h.log.count_speaks(), 1);

    h.toggle();
    h.settle();
    h.activate();
    let notes = h.command("go back");
    assert_eq!(h.log.count_speaks(), 0);
    assert_eq!(feedback(&notes), vec!["Going back."]);
    assert!(notes.contains(&Notification::GoBack));
}

#[test]
fn first_utterance_waits_for_voice_catalog() {
    let mut h = harness();
    h.nav.speech_mut().synthesizer_mut().set_voices(vec![]);

    h.toggle();
    assert_eq!(h.log.count_speaks(), 0);
    assert!(!h.nav.session().is_running());

    h.nav
        .speech_mut()
        .synthesizer_mut()
        .set_voices(vec![voice_nav::Voice::new("Daniel", "en-GB")]);
    h.send(EngineEvent::VoicesChanged);
    assert_eq!(h.log.count_speaks(), 1);

    h.settle();
    assert!(h.nav.session().is_running());
}

#[test]
fn help_lists_commands() {
    let mut h = harness();
    h.activate();

    h.hear("what can I say?");
    assert!(h.log.last_spoken().unwrap().starts_with("You can say: stop listening."));
    assert!(h.nav.reader().is_reading());
}
