//! Chunked narration.
//!
//! Text is split at sentence ends and packed greedily into chunks of at most
//! `max_chunk_chars`, never breaking a sentence unless the sentence alone is
//! over the limit. Chunks are played strictly one after another: the next one
//! is handed out only when the previous utterance has ended, so a stop or
//! pause between chunks needs no queue flush.

use tracing::{debug, info};

use crate::speech::UtteranceId;

/// Split on `.`, `!` or `?` followed by whitespace. Returns trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let bytes = text.as_bytes();

    for (i, &b) in bytes.iter().enumerate() {
        if (b == b'.' || b == b'!' || b == b'?')
            && i + 1 < bytes.len()
            && bytes[i + 1].is_ascii_whitespace()
        {
            let end = i + 1;
            let s = text[start..end].trim();
            if !s.is_empty() {
                sentences.push(s);
            }
            start = end;
        }
    }

    let s = text[start..].trim();
    if !s.is_empty() {
        sentences.push(s);
    }

    sentences
}

/// Pack sentences into chunks of at most `max_chars` characters.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(text) {
        for piece in split_oversized(sentence, max_chars) {
            let len = piece.chars().count();
            if current_len > 0 && current_len + 1 + len > max_chars {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(&piece);
            current_len += len;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// A sentence longer than a chunk is broken at word boundaries, and a single
/// word longer than a chunk at character boundaries.
fn split_oversized(sentence: &str, max_chars: usize) -> Vec<String> {
    if sentence.chars().count() <= max_chars {
        return vec![sentence.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in sentence.split_whitespace() {
        let chars: Vec<char> = word.chars().collect();
        for part in chars.chunks(max_chars) {
            let len = part.len();
            if current_len > 0 && current_len + 1 + len > max_chars {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.extend(part);
            current_len += len;
        }
    }

    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// In-progress narration. At most one exists at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingJob {
    pub chunks: Vec<String>,
    pub current_index: usize,
    pub total_chunks: usize,
    pub paused: bool,
    /// Utterance playing the current chunk, once handed to speech output.
    pub utterance: Option<UtteranceId>,
}

impl ReadingJob {
    pub fn current_chunk(&self) -> Option<&str> {
        self.chunks.get(self.current_index).map(String::as_str)
    }
}

#[derive(Debug)]
pub struct Reader {
    max_chunk_chars: usize,
    job: Option<ReadingJob>,
}

impl Reader {
    pub fn new(max_chunk_chars: usize) -> Self {
        Self {
            max_chunk_chars,
            job: None,
        }
    }

    pub fn configure(&mut self, max_chunk_chars: usize) {
        self.max_chunk_chars = max_chunk_chars;
    }

    pub fn job(&self) -> Option<&ReadingJob> {
        self.job.as_ref()
    }

    pub fn is_reading(&self) -> bool {
        self.job.is_some()
    }

    /// Replace any current job with one for `text` and return its first chunk.
    /// Returns `None` (and leaves no job) when there is nothing to read.
    pub fn start(&mut self, text: &str) -> Option<String> {
        if self.job.take().is_some() {
            debug!("Superseding previous reading job");
        }

        let chunks = chunk_text(text, self.max_chunk_chars);
        if chunks.is_empty() {
            return None;
        }

        info!("Reading {} chunk(s)", chunks.len());
        let first = chunks[0].clone();
        self.job = Some(ReadingJob {
            total_chunks: chunks.len(),
            chunks,
            current_index: 0,
            paused: false,
            utterance: None,
        });
        Some(first)
    }

    /// Record which utterance is playing the current chunk.
    pub fn playing(&mut self, id: UtteranceId) {
        if let Some(job) = self.job.as_mut() {
            job.utterance = Some(id);
        }
    }

    /// Whether `id` is the utterance of the current chunk.
    pub fn owns(&self, id: UtteranceId) -> bool {
        self.job.as_ref().is_some_and(|j| j.utterance == Some(id))
    }

    /// The current chunk finished. Returns the next chunk, or `None` when the
    /// job is complete (the job is then dropped).
    pub fn advance(&mut self) -> Option<String> {
        let job = self.job.as_mut()?;
        job.current_index += 1;
        job.utterance = None;

        match job.current_chunk() {
            Some(chunk) => {
                debug!("Reading chunk {}/{}", job.current_index + 1, job.total_chunks);
                Some(chunk.to_string())
            }
            None => {
                info!("Finished reading");
                self.job = None;
                None
            }
        }
    }

    /// Drop the job. Returns false if nothing was being read.
    pub fn stop(&mut self) -> bool {
        self.job.take().is_some()
    }

    pub fn set_paused(&mut self, paused: bool) -> bool {
        match self.job.as_mut() {
            Some(job) if job.paused != paused => {
                job.paused = paused;
                true
            }
            _ => false,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.job.as_ref().is_some_and(|j| j.paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn narration(min_len: usize) -> String {
        let mut sentences = Vec::new();
        let mut i = 0;
        while sentences.iter().map(|s: &String| s.len() + 1).sum::<usize>() < min_len {
            i += 1;
            sentences.push(format!("Sentence {i} describes one part of the course page in detail."));
        }
        sentences.join(" ")
    }

    #[test]
    fn split_keeps_punctuation() {
        assert_eq!(
            split_sentences("Hello there. How are you?  Fine! trailing"),
            vec!["Hello there.", "How are you?", "Fine!", "trailing"]
        );
        assert_eq!(split_sentences("Version 1.5 is out."), vec!["Version 1.5 is out."]);
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn chunks_respect_limit_and_sentence_boundaries() {
        let text = narration(1400);
        assert!(text.len() >= 1400);

        let chunks = chunk_text(&text, 500);
        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 500, "chunk too long: {}", chunk.len());
            assert!(chunk.ends_with('.'), "chunk ends mid-sentence: {chunk}");
        }
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn chunks_are_filled_greedily() {
        let chunks = chunk_text("One. Two. Three.", 10);
        assert_eq!(chunks, vec!["One. Two.", "Three."]);
    }

    #[test]
    fn oversized_sentence_splits_at_words() {
        let sentence = format!("{} end.", "word ".repeat(30).trim());
        let chunks = chunk_text(&sentence, 40);
        assert!(chunks.iter().all(|c| c.chars().count() <= 40));
        assert_eq!(chunks.join(" "), sentence);

        let chunks = chunk_text("abcdefghij", 4);
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn sequential_playback() {
        let mut reader = Reader::new(10);
        assert_eq!(reader.start("One. Two. Three.").as_deref(), Some("One. Two."));
        reader.playing(1);
        assert!(reader.owns(1));
        assert!(!reader.owns(2));

        assert_eq!(reader.advance().as_deref(), Some("Three."));
        assert_eq!(reader.job().unwrap().current_index, 1);
        assert!(!reader.owns(1));
        reader.playing(2);

        assert_eq!(reader.advance(), None);
        assert!(!reader.is_reading());
    }

    #[test]
    fn new_job_supersedes_old() {
        let mut reader = Reader::new(500);
        reader.start("First text.");
        reader.playing(1);
        reader.start("Second text.");
        assert!(!reader.owns(1));
        assert_eq!(reader.job().unwrap().chunks, vec!["Second text."]);
    }

    #[test]
    fn empty_text_starts_nothing() {
        let mut reader = Reader::new(500);
        reader.start("Something.");
        assert_eq!(reader.start("  "), None);
        assert!(reader.job().is_none());
    }

    #[test]
    fn pause_flag() {
        let mut reader = Reader::new(500);
        assert!(!reader.set_paused(true));
        reader.start("Text.");
        assert!(reader.set_paused(true));
        assert!(!reader.set_paused(true));
        assert!(reader.is_paused());
        assert!(reader.stop());
        assert!(!reader.stop());
    }
}
