use super::spm_model::{ModelProto, PieceType, SentencePiece};
use super::{OffsetScanner, Token, Tokenizer, is_ignorable, lower_case_preserving_offsets};
use crate::error::{Result, TaskError};
use crate::vocabulary::Vocabulary;
use std::collections::{HashMap, HashSet};
use std::path::Path;

pub const DEFAULT_UNK_TOKEN: &str = "<unk>";
pub const DEFAULT_EOS_TOKEN: &str = "</s>";
pub const DEFAULT_PAD_TOKEN: &str = "<pad>";
/// Marks a piece that starts a new word.
pub const WORD_SEPARATOR: char = '▁';

pub const VOCAB_JSON_FILE: &str = "vocab.json";
pub const SOURCE_SPM_FILE: &str = "source.spm";
pub const SPIECE_MODEL_FILE: &str = "spiece.model";

/// Penalty (relative to the lowest piece score) for covering one character
/// with the unknown piece.
const UNK_PENALTY: f32 = 10.0;

/// SentencePiece unigram tokenizer.
///
/// Segmentation picks, per whitespace-delimited word, the sequence of pieces
/// with the highest total log-probability (Viterbi). The first piece of a
/// word carries [`WORD_SEPARATOR`].
#[derive(Debug, Clone)]
pub struct SentencePieceTokenizer {
    vocab: Vocabulary,
    scores: HashMap<String, f32>,
    specials: HashSet<String>,
    max_piece_chars: usize,
    unk_score: f32,
    lowercase: bool,
}

impl SentencePieceTokenizer {
    /// Build a tokenizer from a vocabulary and the scored pieces usable for
    /// segmentation.
    pub fn new(vocab: Vocabulary, pieces: &[SentencePiece], lowercase: bool) -> Self {
        let mut scores = HashMap::with_capacity(pieces.len());
        let mut specials: HashSet<String> = [DEFAULT_UNK_TOKEN, DEFAULT_EOS_TOKEN, DEFAULT_PAD_TOKEN, "<s>"]
            .into_iter()
            .map(str::to_string)
            .collect();
        for p in pieces {
            match p.kind {
                PieceType::Normal | PieceType::UserDefined => {
                    scores.insert(p.piece.clone(), p.score);
                }
                PieceType::Control | PieceType::Unknown => {
                    specials.insert(p.piece.clone());
                }
                PieceType::Unused | PieceType::Byte => {}
            }
        }
        let min_score = scores.values().copied().fold(0.0_f32, f32::min);
        let max_piece_chars = scores.keys().map(|k| k.chars().count()).max().unwrap_or(1);
        Self {
            vocab,
            scores,
            specials,
            max_piece_chars,
            unk_score: min_score - UNK_PENALTY,
            lowercase,
        }
    }

    /// Load from a model directory.
    ///
    /// `vocab.json` + `source.spm` is preferred when `vocab.json` exists;
    /// otherwise a packed `spiece.model` is read and ids follow piece order.
    pub fn from_model_dir(dir: impl AsRef<Path>, lowercase: bool) -> Result<Self> {
        let dir = dir.as_ref();
        let vocab_path = dir.join(VOCAB_JSON_FILE);
        if vocab_path.exists() {
            let vocab = Vocabulary::from_json_file(&vocab_path, DEFAULT_UNK_TOKEN)?;
            let model = ModelProto::from_file(dir.join(SOURCE_SPM_FILE))?;
            tracing::debug!(
                pieces = model.pieces.len(),
                vocab = vocab.len(),
                "Loaded SentencePiece model with JSON vocabulary"
            );
            return Ok(Self::new(vocab, &model.pieces, lowercase));
        }

        let spm_path = dir.join(SPIECE_MODEL_FILE);
        if !spm_path.exists() {
            return Err(TaskError::Config(format!(
                "No SentencePiece files in '{}': expected {} + {} or {}",
                dir.display(),
                VOCAB_JSON_FILE,
                SOURCE_SPM_FILE,
                SPIECE_MODEL_FILE
            )));
        }
        let model = ModelProto::from_file(&spm_path)?;
        let vocab = Vocabulary::from_tokens(
            model.pieces.iter().map(|p| p.piece.clone()),
            DEFAULT_UNK_TOKEN,
        )?;
        tracing::debug!(pieces = model.pieces.len(), "Loaded packed SentencePiece model");
        Ok(Self::new(vocab, &model.pieces, lowercase))
    }

    /// Whether `piece` is a control/unknown piece that never surfaces in
    /// decoded text.
    pub fn is_special_piece(&self, piece: &str) -> bool {
        self.specials.contains(piece)
    }

    /// Best segmentation of one separator-prefixed word as
    /// `(piece, surface_chars)` pairs.
    fn segment(&self, word: &str) -> Vec<(String, usize)> {
        let chars: Vec<char> = std::iter::once(WORD_SEPARATOR).chain(word.chars()).collect();
        let n = chars.len();
        // best[i] = (score of best segmentation of chars[..i], start of last piece)
        let mut best: Vec<Option<(f32, usize)>> = vec![None; n + 1];
        best[0] = Some((0.0, 0));
        for i in 0..n {
            let Some((base, _)) = best[i] else { continue };
            let limit = n.min(i + self.max_piece_chars);
            let mut covered = false;
            for j in i + 1..=limit {
                let candidate: String = chars[i..j].iter().collect();
                if let Some(&score) = self.scores.get(&candidate) {
                    covered |= j == i + 1;
                    relax(&mut best[j], base + score, i);
                }
            }
            if !covered {
                relax(&mut best[i + 1], base + self.unk_score, i);
            }
        }

        let mut pieces = Vec::new();
        let mut end = n;
        while end > 0 {
            let Some((_, start)) = best[end] else { break };
            let piece: String = chars[start..end].iter().collect();
            let surface = if start == 0 { end - 1 } else { end - start };
            pieces.push((piece, surface));
            end = start;
        }
        pieces.reverse();
        pieces
    }
}

fn relax(slot: &mut Option<(f32, usize)>, score: f32, start: usize) {
    match slot {
        Some((best, _)) if *best >= score => {}
        _ => *slot = Some((score, start)),
    }
}

impl Tokenizer for SentencePieceTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let text = if self.lowercase {
            lower_case_preserving_offsets(text)
        } else {
            std::borrow::Cow::Borrowed(text)
        };
        let mut scanner = OffsetScanner::new(&text);
        let mut tokens = Vec::new();
        for word in text.split(is_ignorable).filter(|w| !w.is_empty()) {
            for (piece, surface_chars) in self.segment(word) {
                let (start, end) = scanner.advance(surface_chars);
                tokens.push(Token::new(piece, start, end));
            }
        }
        tokens
    }

    fn detokenize(&self, pieces: &[String]) -> String {
        let mut out = String::new();
        for (i, piece) in pieces.iter().enumerate() {
            match piece.strip_prefix(WORD_SEPARATOR) {
                Some(rest) => {
                    if i > 0 {
                        out.push(' ');
                    }
                    out.push_str(rest);
                }
                None => out.push_str(piece),
            }
        }
        out
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocab
    }
}
