//! Command grammar and transcript matching.
//!
//! Commands are an ordered list of [`CommandSpec`]s. A spec matches when the
//! normalized transcript contains any of its trigger phrases, and the first
//! matching spec wins, so declaration order decides between overlapping
//! phrases ("stop listening" must come before "stop").
//!
//! When nothing matches, the transcript is compared word by word against a
//! small fixed list of canonical commands; one sharing at least two words is
//! offered back as a suggestion.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use strsim::normalized_levenshtein;
use tracing::debug;

use crate::config::RouteConfig;
use crate::recognition::ListeningMode;

/// Words needed in common with a canonical command to suggest it.
const MIN_SHARED_WORDS: usize = 2;

/// Per-word similarity at which two words count as the same (tolerates one
/// or two misrecognized letters in longer words).
const WORD_SIMILARITY: f64 = 0.7;

const CANONICAL_COMMANDS: &[&str] = &[
    "go to dashboard",
    "go to courses",
    "go to assignments",
    "go to grades",
    "read page headings",
    "read this page",
    "stop reading",
    "open item one",
    "search for",
    "go back",
    "scroll down",
    "scroll up",
    "stop listening",
    "what can i say",
];

const NUMBER_WORDS: [(&str, u32); 20] = [
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
    ("ten", 10),
    ("eleven", 11),
    ("twelve", 12),
    ("thirteen", 13),
    ("fourteen", 14),
    ("fifteen", 15),
    ("sixteen", 16),
    ("seventeen", 17),
    ("eighteen", 18),
    ("nineteen", 19),
    ("twenty", 20),
];

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(\d+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)\b",
    )
    .expect("number pattern is valid")
});

static REGION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\bread\s+(?:the\s+)?(?:(?:section|region|area)\s+)?(?:(?:called|named)\s+)?(.+?)(?:\s+(?:section|region|area|panel))?$",
    )
    .expect("region pattern is valid")
});

static SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:search for|search|look up|find)\s+(.+)$").expect("search pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Item,
    Video,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Item => write!(f, "item"),
            Self::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Top,
    Bottom,
}

/// What a matched command asks the engine to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    StopListening,
    /// Enter wake-word mode.
    DisableCommands,
    /// Leave wake-word mode.
    EnableCommands,
    StopReading,
    PauseReading,
    ResumeReading,
    Help,
    ReadHeadings,
    ReadPage,
    ReadRegion(String),
    /// `number` is as spoken, 1-based.
    OpenItem { kind: ItemKind, number: u32 },
    ListItems,
    Search(String),
    CloseOverlay,
    GoBack,
    Scroll(ScrollDirection),
    Navigate { name: String, route: String },
    /// The command was recognized but is missing a parameter; ask for it.
    Clarify(String),
}

pub type Action = Box<dyn Fn(&str) -> Intent>;

/// A declarative rule mapping trigger phrases to an action on the transcript.
pub struct CommandSpec {
    pub patterns: Vec<String>,
    pub description: String,
    action: Action,
}

impl CommandSpec {
    pub fn new<F>(patterns: &[&str], description: &str, action: F) -> Self
    where
        F: Fn(&str) -> Intent + 'static,
    {
        Self {
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
            description: description.into(),
            action: Box::new(action),
        }
    }

    fn constant(patterns: &[&str], description: &str, intent: Intent) -> Self {
        Self::new(patterns, description, move |_| intent.clone())
    }

    pub fn matches(&self, transcript: &str) -> bool {
        self.patterns.iter().any(|p| transcript.contains(p.as_str()))
    }

    pub fn resolve(&self, transcript: &str) -> Intent {
        (self.action)(transcript)
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("patterns", &self.patterns)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Matched { intent: Intent, transcript: String },
    Unmatched { transcript: String, suggestion: Option<String> },
    /// Dormant (wake-word mode) and not an activation phrase.
    Ignored,
}

#[derive(Debug)]
pub struct CommandMatcher {
    specs: Vec<CommandSpec>,
    activation_phrases: Vec<String>,
}

impl CommandMatcher {
    pub fn new(specs: Vec<CommandSpec>, activation_phrases: &[String]) -> Self {
        Self {
            specs,
            activation_phrases: activation_phrases.iter().map(|p| normalize(p)).collect(),
        }
    }

    /// The built-in grammar plus one navigation command per route.
    pub fn with_defaults(routes: &[RouteConfig], activation_phrases: &[String]) -> Self {
        Self::new(default_commands(routes), activation_phrases)
    }

    pub fn specs(&self) -> &[CommandSpec] {
        &self.specs
    }

    pub fn match_transcript(&self, transcript: &str, mode: ListeningMode) -> MatchResult {
        let normalized = normalize(transcript);

        if mode == ListeningMode::WakeWord {
            if self
                .activation_phrases
                .iter()
                .any(|p| normalized.contains(p.as_str()))
            {
                return MatchResult::Matched {
                    intent: Intent::EnableCommands,
                    transcript: normalized,
                };
            }
            debug!("Dormant, ignoring '{normalized}'");
            return MatchResult::Ignored;
        }

        if normalized.is_empty() {
            return MatchResult::Unmatched {
                transcript: normalized,
                suggestion: None,
            };
        }

        if let Some(spec) = self.specs.iter().find(|s| s.matches(&normalized)) {
            let intent = spec.resolve(&normalized);
            debug!("'{normalized}' matched '{}' → {intent:?}", spec.description);
            return MatchResult::Matched {
                intent,
                transcript: normalized,
            };
        }

        let suggestion = suggest(&normalized).map(String::from);
        debug!("'{normalized}' unmatched, suggestion: {suggestion:?}");
        MatchResult::Unmatched {
            transcript: normalized,
            suggestion,
        }
    }
}

/// Lower-case, trim, and drop trailing sentence punctuation some recognizers add.
pub fn normalize(transcript: &str) -> String {
    transcript
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .trim()
        .to_lowercase()
}

/// The trailing quantity in a transcript, as digits or a number word up to twenty.
pub fn parse_number(transcript: &str) -> Option<u32> {
    let token = NUMBER_RE.find_iter(transcript).last()?.as_str();
    if let Some(&(_, n)) = NUMBER_WORDS.iter().find(|(word, _)| *word == token) {
        return Some(n);
    }
    token.parse().ok()
}

/// The region name in "read the X section" style transcripts.
pub fn parse_region(transcript: &str) -> Option<String> {
    let name = REGION_RE.captures(transcript)?.get(1)?.as_str().trim();
    (!name.is_empty()).then(|| name.to_string())
}

pub fn parse_search(transcript: &str) -> Option<String> {
    let query = SEARCH_RE.captures(transcript)?.get(1)?.as_str().trim();
    (!query.is_empty()).then(|| query.to_string())
}

/// The canonical command sharing the most words with `transcript`, if it shares at least two.
pub fn suggest(transcript: &str) -> Option<&'static str> {
    let heard: Vec<&str> = transcript.split_whitespace().collect();
    let mut best: Option<(&'static str, usize)> = None;

    for &command in CANONICAL_COMMANDS {
        let shared = command
            .split_whitespace()
            .filter(|word| heard.iter().any(|h| same_word(h, word)))
            .count();
        if shared >= MIN_SHARED_WORDS && best.map_or(true, |(_, n)| shared > n) {
            best = Some((command, shared));
        }
    }

    best.map(|(command, _)| command)
}

fn same_word(a: &str, b: &str) -> bool {
    a == b || normalized_levenshtein(a, b) >= WORD_SIMILARITY
}

fn open_item(kind: ItemKind) -> impl Fn(&str) -> Intent {
    move |transcript| match parse_number(transcript) {
        Some(number) => Intent::OpenItem { kind, number },
        None => Intent::Clarify(format!(
            "Which {kind} number? For example, say open {kind} 2."
        )),
    }
}

fn default_commands(routes: &[RouteConfig]) -> Vec<CommandSpec> {
    let mut specs = vec![
        CommandSpec::constant(
            &["stop listening", "turn off voice", "voice off", "turn off microphone"],
            "stop listening",
            Intent::StopListening,
        ),
        CommandSpec::constant(
            &["disable voice", "disable commands", "go to sleep", "sleep mode"],
            "disable voice commands until you say enable voice",
            Intent::DisableCommands,
        ),
        CommandSpec::constant(
            &["stop reading", "stop speaking", "be quiet", "stop"],
            "stop reading",
            Intent::StopReading,
        ),
        CommandSpec::constant(&["pause reading", "pause"], "pause reading", Intent::PauseReading),
        CommandSpec::constant(
            &["resume reading", "continue reading", "resume", "continue"],
            "resume reading",
            Intent::ResumeReading,
        ),
        CommandSpec::constant(
            &["what can i say", "list commands", "help"],
            "help",
            Intent::Help,
        ),
        CommandSpec::constant(
            &[
                "read headings",
                "read the headings",
                "read page headings",
                "list headings",
                "what's on this page",
                "what is on this page",
            ],
            "read headings",
            Intent::ReadHeadings,
        ),
        CommandSpec::constant(
            &["read page", "read the page", "read this page", "read everything", "read all", "read aloud"],
            "read this page",
            Intent::ReadPage,
        ),
        CommandSpec::constant(
            &["list items", "read items", "read the items", "list courses", "what items"],
            "list items",
            Intent::ListItems,
        ),
        CommandSpec::new(
            &["open video", "play video", "watch video", "video number"],
            "open video, followed by a number",
            open_item(ItemKind::Video),
        ),
        CommandSpec::new(
            &["open item", "select item", "open number", "select number", "item number", "open result"],
            "open item, followed by a number",
            open_item(ItemKind::Item),
        ),
        CommandSpec::new(
            &["search for", "search", "look up", "find"],
            "search for, followed by what to find",
            |t| match parse_search(t) {
                Some(query) => Intent::Search(query),
                None => Intent::Clarify("What would you like to search for?".into()),
            },
        ),
        CommandSpec::new(
            &["read section", "read region", "read the "],
            "read the section called, followed by a name",
            |t| match parse_region(t) {
                Some(name) => Intent::ReadRegion(name),
                None => Intent::Clarify("Which section should I read?".into()),
            },
        ),
        CommandSpec::constant(&["close", "dismiss", "exit"], "close", Intent::CloseOverlay),
        CommandSpec::constant(&["go back", "previous page", "back"], "go back", Intent::GoBack),
        CommandSpec::constant(
            &["scroll to top", "go to top", "top of page"],
            "scroll to top",
            Intent::Scroll(ScrollDirection::Top),
        ),
        CommandSpec::constant(
            &["scroll to bottom", "go to bottom", "bottom of page"],
            "scroll to bottom",
            Intent::Scroll(ScrollDirection::Bottom),
        ),
        CommandSpec::constant(
            &["scroll down", "page down", "move down"],
            "scroll down",
            Intent::Scroll(ScrollDirection::Down),
        ),
        CommandSpec::constant(
            &["scroll up", "page up", "move up"],
            "scroll up",
            Intent::Scroll(ScrollDirection::Up),
        ),
    ];

    for route in routes {
        let name = route.name.to_lowercase();
        let mut patterns = vec![
            format!("go to {name}"),
            format!("go to the {name}"),
            format!("open {name}"),
            format!("show {name}"),
            format!("navigate to {name}"),
            format!("{name} page"),
        ];
        for alias in &route.aliases {
            let alias = alias.to_lowercase();
            patterns.push(format!("go to {alias}"));
            patterns.push(format!("open {alias}"));
            patterns.push(alias);
        }
        let patterns: Vec<&str> = patterns.iter().map(String::as_str).collect();
        let intent = Intent::Navigate {
            name: route.name.clone(),
            route: route.path.clone(),
        };
        specs.push(CommandSpec::constant(&patterns, &format!("go to {name}"), intent));
    }

    specs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavigationConfig;

    fn matcher() -> CommandMatcher {
        CommandMatcher::with_defaults(
            &NavigationConfig::default().routes,
            &["enable voice".to_string(), "wake up".to_string()],
        )
    }

    fn intent(transcript: &str) -> Intent {
        match matcher().match_transcript(transcript, ListeningMode::Commands) {
            MatchResult::Matched { intent, .. } => intent,
            other => panic!("'{transcript}' did not match: {other:?}"),
        }
    }

    #[test]
    fn first_declared_spec_wins() {
        let matcher = CommandMatcher::new(
            vec![
                CommandSpec::constant(&["open"], "open anything", Intent::CloseOverlay),
                CommandSpec::constant(&["open settings"], "open settings", Intent::GoBack),
            ],
            &[],
        );
        assert_eq!(
            matcher.match_transcript("please open settings", ListeningMode::Commands),
            MatchResult::Matched {
                intent: Intent::CloseOverlay,
                transcript: "please open settings".into(),
            }
        );
    }

    #[test]
    fn stop_listening_precedes_stop_reading() {
        assert_eq!(intent("Stop listening"), Intent::StopListening);
        assert_eq!(intent("stop"), Intent::StopReading);
    }

    #[test]
    fn spelled_and_digit_numbers_agree() {
        let expected = Intent::OpenItem {
            kind: ItemKind::Item,
            number: 3,
        };
        assert_eq!(intent("open item three"), expected);
        assert_eq!(intent("open item 3"), expected);
        assert_eq!(
            intent("play video twelve"),
            Intent::OpenItem {
                kind: ItemKind::Video,
                number: 12,
            }
        );
    }

    #[test]
    fn parse_number_takes_the_trailing_quantity() {
        assert_eq!(parse_number("open item seventeen"), Some(17));
        assert_eq!(parse_number("open item 2 of 14"), Some(14));
        assert_eq!(parse_number("open the first item"), None);
        assert_eq!(parse_number("someone"), None);
    }

    #[test]
    fn missing_number_asks_for_clarification() {
        assert!(matches!(intent("open item"), Intent::Clarify(q) if q.contains("item number")));
    }

    #[test]
    fn region_names_are_extracted() {
        assert_eq!(intent("read the sidebar"), Intent::ReadRegion("sidebar".into()));
        assert_eq!(
            intent("read the announcements section"),
            Intent::ReadRegion("announcements".into())
        );
        assert_eq!(
            intent("read section called main content"),
            Intent::ReadRegion("main content".into())
        );
        assert_eq!(intent("read the page"), Intent::ReadPage);
        assert_eq!(intent("read the headings"), Intent::ReadHeadings);
    }

    #[test]
    fn read_inside_other_commands_is_not_a_region() {
        assert_eq!(
            intent("search for read the news"),
            Intent::Search("read the news".into())
        );
        assert!(matches!(
            matcher().match_transcript("go to the thread list", ListeningMode::Commands),
            MatchResult::Unmatched { .. }
        ));
    }

    #[test]
    fn search_query_is_extracted() {
        assert_eq!(intent("search for linear algebra"), Intent::Search("linear algebra".into()));
        assert!(matches!(intent("search"), Intent::Clarify(_)));
    }

    #[test]
    fn navigation_routes() {
        assert_eq!(
            intent("go to dashboard."),
            Intent::Navigate {
                name: "dashboard".into(),
                route: "/dashboard".into(),
            }
        );
        assert_eq!(
            intent("open my courses"),
            Intent::Navigate {
                name: "courses".into(),
                route: "/courses".into(),
            }
        );
        assert_eq!(
            intent("homework please"),
            Intent::Navigate {
                name: "assignments".into(),
                route: "/assignments".into(),
            }
        );
    }

    #[test]
    fn fuzzy_fallback_suggests_close_command() {
        assert_eq!(
            matcher().match_transcript("go dashboad", ListeningMode::Commands),
            MatchResult::Unmatched {
                transcript: "go dashboad".into(),
                suggestion: Some("go to dashboard".into()),
            }
        );
    }

    #[test]
    fn fuzzy_fallback_needs_two_shared_words() {
        assert_eq!(suggest("banana dashboard"), None);
        assert_eq!(suggest("tell me a joke"), None);
        assert_eq!(suggest("scrol dawn"), Some("scroll down"));
    }

    #[test]
    fn wake_word_mode_only_hears_activation_phrases() {
        let matcher = matcher();
        assert_eq!(
            matcher.match_transcript("go to dashboard", ListeningMode::WakeWord),
            MatchResult::Ignored
        );
        assert_eq!(
            matcher.match_transcript("OK, enable voice", ListeningMode::WakeWord),
            MatchResult::Matched {
                intent: Intent::EnableCommands,
                transcript: "ok, enable voice".into(),
            }
        );
    }

    #[test]
    fn every_spec_has_a_description() {
        assert!(matcher().specs().iter().all(|s| !s.description.is_empty()));
    }
}
