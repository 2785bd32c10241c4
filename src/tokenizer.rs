//! Subword tokenizers with byte-offset tracking.
//!
//! Two schemes are provided:
//!
//! | Module | Scheme | Marker |
//! |--------|--------|--------|
//! | [`wordpiece`] | BERT WordPiece, greedy longest-match-first | continuation pieces start with `##` |
//! | [`sentencepiece`] | SentencePiece unigram | word-initial pieces start with `▁` |
//!
//! Both implement [`Tokenizer`]. Special tokens are never produced by
//! `tokenize`; tasks inject them through [`TokenizedInput`].

pub mod sentencepiece;
pub mod spm_model;
pub mod wordpiece;

pub use sentencepiece::SentencePieceTokenizer;
pub use wordpiece::WordPieceTokenizer;

use crate::error::Result;
use crate::vocabulary::Vocabulary;
use std::borrow::Cow;

/// One token of a tokenized sequence.
///
/// `start..end` is a byte range into the text that was tokenized. Injected
/// special tokens are zero-width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub is_special: bool,
}

impl Token {
    pub fn new(text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            is_special: false,
        }
    }

    /// A zero-width special token positioned at `at`.
    pub fn special(text: impl Into<String>, at: usize) -> Self {
        Self {
            text: text.into(),
            start: at,
            end: at,
            is_special: true,
        }
    }
}

/// The subword tokenizer contract shared by every scheme.
pub trait Tokenizer: Send + Sync {
    /// Split `text` into subword tokens carrying byte offsets into `text`.
    fn tokenize(&self, text: &str) -> Vec<Token>;

    /// Reassemble token strings into text.
    fn detokenize(&self, pieces: &[String]) -> String;

    /// The vocabulary backing id conversion.
    fn vocabulary(&self) -> &Vocabulary;

    /// Map tokens to ids, substituting the unknown id for absent strings.
    fn ids_of(&self, tokens: &[Token]) -> Result<Vec<u32>> {
        self.vocabulary()
            .ids_of(tokens.iter().map(|t| t.text.as_str()))
    }

    /// Map ids back to token strings. Fails for ids outside the vocabulary.
    fn strings_of(&self, ids: &[u32]) -> Result<Vec<String>> {
        self.vocabulary().strings_of(ids)
    }
}

/// A request-scoped token sequence with its derived ids and segment ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizedInput {
    pub tokens: Vec<Token>,
    pub ids: Vec<u32>,
    pub type_ids: Vec<u32>,
}

impl TokenizedInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an injected special token belonging to `segment`.
    pub fn push_special(&mut self, vocab: &Vocabulary, text: &str, at: usize, segment: u32) -> Result<()> {
        self.ids.push(vocab.id_or_unk(text)?);
        self.type_ids.push(segment);
        self.tokens.push(Token::special(text, at));
        Ok(())
    }

    /// Append regular tokens belonging to `segment`.
    pub fn extend(&mut self, vocab: &Vocabulary, tokens: Vec<Token>, segment: u32) -> Result<()> {
        self.ids
            .extend(vocab.ids_of(tokens.iter().map(|t| t.text.as_str()))?);
        self.type_ids
            .extend(std::iter::repeat_n(segment, tokens.len()));
        self.tokens.extend(tokens);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Lower-case `text` without moving byte offsets.
///
/// Characters whose lower-case form has a different UTF-8 length (or expands
/// to several characters) are kept as-is, so offsets computed on the result
/// index the original text directly.
pub fn lower_case_preserving_offsets(text: &str) -> Cow<'_, str> {
    if !text.chars().any(char::is_uppercase) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let mut lower = c.to_lowercase();
        match (lower.next(), lower.next()) {
            (Some(l), None) if l.len_utf8() == c.len_utf8() => out.push(l),
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Forward scanner that aligns token surfaces with the source text.
///
/// Each call to [`advance`](Self::advance) skips leading whitespace and
/// control characters, then consumes exactly as many characters as the
/// surface has. The resulting ranges are non-decreasing and non-overlapping
/// whatever the tokenizer's internal splitting state was.
pub(crate) struct OffsetScanner<'a> {
    text: &'a str,
    cursor: usize,
}

impl<'a> OffsetScanner<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self { text, cursor: 0 }
    }

    /// Return the byte range covered by a token whose surface is
    /// `surface_chars` characters long.
    pub(crate) fn advance(&mut self, surface_chars: usize) -> (usize, usize) {
        let rest = &self.text[self.cursor..];
        let skipped = rest
            .char_indices()
            .find(|&(_, c)| !is_ignorable(c))
            .map_or(rest.len(), |(i, _)| i);
        let start = self.cursor + skipped;
        let body = &self.text[start..];
        let len = body
            .char_indices()
            .nth(surface_chars)
            .map_or(body.len(), |(i, _)| i);
        self.cursor = start + len;
        (start, self.cursor)
    }

    pub(crate) fn position(&self) -> usize {
        self.cursor
    }
}

/// Whitespace and control characters never belong to a token surface.
pub(crate) fn is_ignorable(c: char) -> bool {
    c.is_whitespace() || c.is_control() || c == '\u{fffd}'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scanner_skips_whitespace_and_counts_chars() {
        let mut s = OffsetScanner::new("  héllo world");
        assert_eq!(s.advance(3), (2, 6));
        assert_eq!(s.advance(2), (6, 8));
        assert_eq!(s.advance(5), (9, 14));
        assert_eq!(s.advance(1), (14, 14));
    }

    #[test]
    fn lower_case_keeps_byte_length() {
        let text = "Hello İstanbul";
        let lowered = lower_case_preserving_offsets(text);
        assert_eq!(lowered.len(), text.len());
        assert!(lowered.starts_with("hello"));
    }

    #[test]
    fn lower_case_borrows_when_unchanged() {
        assert!(matches!(
            lower_case_preserving_offsets("already lower"),
            Cow::Borrowed(_)
        ));
    }
}
