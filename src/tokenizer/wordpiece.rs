use super::{OffsetScanner, Token, Tokenizer, is_ignorable};
use crate::error::Result;
use crate::vocabulary::Vocabulary;
use std::path::Path;

pub const DEFAULT_UNK_TOKEN: &str = "[UNK]";
pub const DEFAULT_CLASS_TOKEN: &str = "[CLS]";
pub const DEFAULT_SEQUENCE_SEPARATOR: &str = "[SEP]";
pub const DEFAULT_MASK_TOKEN: &str = "[MASK]";
pub const DEFAULT_PAD_TOKEN: &str = "[PAD]";
/// Prefix marking a piece that continues the previous word.
pub const DEFAULT_SPLIT_PREFIX: &str = "##";

const DEFAULT_MAX_INPUT_CHARS_PER_WORD: usize = 100;

/// BERT-style WordPiece tokenizer.
///
/// Text is pre-split on whitespace, punctuation, and CJK ideographs; each
/// word is then split greedily, longest match first. Pieces after the first
/// in a word carry the [`DEFAULT_SPLIT_PREFIX`]. A word that cannot be fully
/// covered becomes a single unknown token spanning the whole word.
#[derive(Debug, Clone)]
pub struct WordPieceTokenizer {
    vocab: Vocabulary,
    unk_token: String,
    split_prefix: String,
    max_input_chars_per_word: usize,
}

impl WordPieceTokenizer {
    pub fn new(vocab: Vocabulary) -> Self {
        Self {
            vocab,
            unk_token: DEFAULT_UNK_TOKEN.to_string(),
            split_prefix: DEFAULT_SPLIT_PREFIX.to_string(),
            max_input_chars_per_word: DEFAULT_MAX_INPUT_CHARS_PER_WORD,
        }
    }

    /// Load `vocab.txt` and build a tokenizer over it.
    pub fn from_vocab_file(path: impl AsRef<Path>) -> Result<Self> {
        let vocab = Vocabulary::from_txt_file(path, DEFAULT_UNK_TOKEN)?;
        Ok(Self::new(vocab))
    }

    pub fn with_max_input_chars_per_word(mut self, max: usize) -> Self {
        self.max_input_chars_per_word = max;
        self
    }

    /// Whether `piece` continues the previous word.
    pub fn is_continuation(piece: &str) -> bool {
        piece.starts_with(DEFAULT_SPLIT_PREFIX)
    }

    /// Split one word into `(piece, surface_chars)` pairs.
    fn split_word(&self, word: &str) -> Vec<(String, usize)> {
        let chars: Vec<char> = word.chars().collect();
        if chars.len() > self.max_input_chars_per_word {
            return vec![(self.unk_token.clone(), chars.len())];
        }

        let mut pieces = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let mut end = chars.len();
            let mut found = None;
            while start < end {
                let body: String = chars[start..end].iter().collect();
                let candidate = if start > 0 {
                    format!("{}{}", self.split_prefix, body)
                } else {
                    body
                };
                if self.vocab.contains(&candidate) {
                    found = Some(candidate);
                    break;
                }
                end -= 1;
            }
            match found {
                Some(piece) => {
                    pieces.push((piece, end - start));
                    start = end;
                }
                None => return vec![(self.unk_token.clone(), chars.len())],
            }
        }
        pieces
    }
}

impl Tokenizer for WordPieceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let mut scanner = OffsetScanner::new(text);
        let mut tokens = Vec::new();
        for word in pre_tokenize(text) {
            for (piece, surface_chars) in self.split_word(word) {
                let (start, end) = scanner.advance(surface_chars);
                tokens.push(Token::new(piece, start, end));
            }
        }
        tokens
    }

    fn detokenize(&self, pieces: &[String]) -> String {
        let mut out = String::new();
        for piece in pieces {
            match piece.strip_prefix(self.split_prefix.as_str()) {
                Some(rest) if !out.is_empty() => out.push_str(rest),
                _ => {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(piece);
                }
            }
        }
        out
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }
}

/// Split on whitespace/control characters and isolate punctuation and CJK
/// ideographs as single-character words.
fn pre_tokenize(text: &str) -> Vec<&str> {
    let mut words = Vec::new();
    let mut word_start: Option<usize> = None;
    for (i, c) in text.char_indices() {
        if is_ignorable(c) {
            if let Some(s) = word_start.take() {
                words.push(&text[s..i]);
            }
        } else if is_punctuation(c) || is_cjk(c) {
            if let Some(s) = word_start.take() {
                words.push(&text[s..i]);
            }
            words.push(&text[i..i + c.len_utf8()]);
        } else if word_start.is_none() {
            word_start = Some(i);
        }
    }
    if let Some(s) = word_start {
        words.push(&text[s..]);
    }
    words
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(c,
            '\u{2010}'..='\u{2027}'
            | '\u{2030}'..='\u{205E}'
            | '\u{3001}'..='\u{3003}'
            | '\u{3008}'..='\u{3011}'
            | '\u{FF01}'..='\u{FF0F}'
            | '\u{00A1}' | '\u{00A7}' | '\u{00AB}' | '\u{00B6}' | '\u{00B7}' | '\u{00BB}' | '\u{00BF}')
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{20000}'..='\u{2A6DF}'
        | '\u{2A700}'..='\u{2CEAF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{2F800}'..='\u{2FA1F}')
}
