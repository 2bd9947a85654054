//! Deterministic text chunking
//!
//! Text is cut into chunks of at most `max_chunk_chars` chars. Within the
//! lookback window at the end of each candidate chunk the cut goes after the
//! last sentence terminator, else after the last whitespace, else at the hard
//! limit. Chunks borrow from the input and concatenate back to it exactly.

use crate::config::ChunkPolicy;

/// Characters that end a sentence (Latin and Arabic script)
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '\u{061F}', '\u{06D4}', '\u{2026}', '\n'];

/// A contiguous slice of a file's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Position in the file's chunk sequence
    pub index: usize,
    /// Byte offset of the first byte
    pub start: usize,
    /// Byte offset one past the last byte
    pub end: usize,
    /// Length in chars
    pub char_count: usize,
    /// The chunk text
    pub text: &'a str,
}

impl Chunk<'_> {
    /// Returns the byte length of this chunk
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Returns true if this chunk is empty
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Lazy iterator over the chunks of a text
///
/// Cloning the iterator restarts nothing; it forks the sequence at the current
/// position. Call [`split`] again to start over.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    policy: ChunkPolicy,
    pos: usize,
    index: usize,
}

/// Split `text` into chunks according to `policy`
pub fn split(text: &str, policy: ChunkPolicy) -> Chunks<'_> {
    Chunks {
        text,
        policy,
        pos: 0,
        index: 0,
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.text.len() || self.policy.max_chunk_chars == 0 {
            return None;
        }

        let rest = &self.text[self.pos..];
        let cut = find_cut(rest, &self.policy);
        let piece = &rest[..cut];

        let chunk = Chunk {
            index: self.index,
            start: self.pos,
            end: self.pos + cut,
            char_count: piece.chars().count(),
            text: piece,
        };

        self.pos += cut;
        self.index += 1;
        Some(chunk)
    }
}

impl std::iter::FusedIterator for Chunks<'_> {}

/// Byte length of the next chunk taken from the front of `rest`
fn find_cut(rest: &str, policy: &ChunkPolicy) -> usize {
    let max = policy.max_chunk_chars;
    let limit = match rest.char_indices().nth(max) {
        Some((byte, _)) => byte,
        None => return rest.len(),
    };

    let candidate = &rest[..limit];
    let window_chars = policy.lookback_chars().min(max);
    let window_start = candidate
        .char_indices()
        .nth(max - window_chars)
        .map_or(0, |(byte, _)| byte);
    let window = &candidate[window_start..];

    last_cut_after(window, is_sentence_terminator)
        .or_else(|| last_cut_after(window, char::is_whitespace))
        .map_or(limit, |offset| window_start + offset)
}

/// Byte offset just past the last char in `window` matching `pred`
fn last_cut_after(window: &str, pred: impl Fn(char) -> bool) -> Option<usize> {
    window
        .char_indices()
        .rev()
        .find(|&(_, ch)| pred(ch))
        .map(|(i, ch)| i + ch.len_utf8())
}

fn is_sentence_terminator(ch: char) -> bool {
    SENTENCE_TERMINATORS.contains(&ch)
}
