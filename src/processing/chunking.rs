//! Sentence-aligned chunking under a token budget.
//!
//! Text is normalized first: characters outside letters, digits, whitespace, and the
//! punctuation set `.!?,;:-()"'` are dropped, then whitespace runs collapse to one space.
//! The normalized text is split after `.`, `!`, or `?` followed by whitespace, and the
//! sentences are packed greedily into chunks whose estimated token count stays within the
//! budget. A sentence larger than the budget becomes a chunk of its own instead of being
//! dropped. Chunks of ten characters or fewer are discarded as noise.

use crate::index::estimate_tokens;

const MIN_CHUNK_CHARS: usize = 10;
const KEPT_PUNCTUATION: &[char] = &['.', '!', '?', ',', ';', ':', '-', '(', ')', '"', '\''];
const SENTENCE_TERMINALS: &[char] = &['.', '!', '?'];

/// Splits documents into bounded, sentence-aligned chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    token_budget: usize,
}

impl Chunker {
    /// Chunker packing up to `token_budget` estimated tokens per chunk (at least one).
    pub fn new(token_budget: usize) -> Self {
        Self {
            token_budget: token_budget.max(1),
        }
    }

    /// Configured token budget.
    pub fn token_budget(&self) -> usize {
        self.token_budget
    }

    /// Chunk `text`; an empty result means the document had no usable content.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let normalized = normalize(text);
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_tokens = 0usize;

        for sentence in split_sentences(&normalized) {
            let sentence_tokens = estimate_tokens(sentence);
            if current_tokens + sentence_tokens > self.token_budget && !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_tokens = 0;
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(sentence);
            current_tokens += sentence_tokens;
        }
        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| chunk.chars().count() > MIN_CHUNK_CHARS)
            .collect()
    }
}

/// Chunk `text` with a one-off [`Chunker`].
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<String> {
    Chunker::new(max_tokens).chunk(text)
}

/// Strip disallowed characters, collapse whitespace runs to one space, and trim.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = true;
        } else if is_allowed(ch) {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        }
    }
    out
}

fn is_allowed(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || KEPT_PUNCTUATION.contains(&ch)
}

/// Split normalized text after sentence-terminal punctuation followed by a space.
fn split_sentences(normalized: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut previous: Option<char> = None;

    for (position, ch) in normalized.char_indices() {
        if ch == ' ' && previous.is_some_and(|prev| SENTENCE_TERMINALS.contains(&prev)) {
            if position > start {
                sentences.push(&normalized[start..position]);
            }
            start = position + ch.len_utf8();
        }
        previous = Some(ch);
    }
    if start < normalized.len() {
        sentences.push(&normalized[start..]);
    }
    sentences
}
