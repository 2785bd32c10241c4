//! Concrete task implementations.
//!
//! Each task owns a tokenizer and a backend handle and implements one
//! capability trait from [`traits`](crate::traits): tokenize, run the
//! backend, decode.

pub mod question_answering;
pub mod text_classification;
pub mod text_encoding;
pub mod text_generation;
pub mod token_classification;
pub mod zero_shot;

pub use question_answering::BertQuestionAnswering;
pub use text_classification::BertTextClassification;
pub use text_encoding::BertTextEncoding;
pub use text_generation::SentencePieceTextGeneration;
pub use token_classification::BertTokenClassification;
pub use zero_shot::BertZeroShotClassification;

use crate::error::{Result, TaskError};
use crate::model_dir::{ModelDirectory, VOCAB_TXT_FILE};
use crate::tokenizer::{WordPieceTokenizer, lower_case_preserving_offsets};
use std::borrow::Cow;

/// Reject sequences longer than the model's position table.
pub(crate) fn check_length(length: usize, max: usize) -> Result<()> {
    if length > max {
        return Err(TaskError::InputTooLong { length, max });
    }
    Ok(())
}

/// Load the WordPiece tokenizer shared by BERT-family tasks.
pub(crate) fn load_wordpiece(dir: &ModelDirectory) -> Result<WordPieceTokenizer> {
    WordPieceTokenizer::from_vocab_file(dir.require_file(VOCAB_TXT_FILE)?)
}

/// Apply the model's lower-casing flag without moving offsets.
pub(crate) fn normalize(text: &str, do_lower_case: bool) -> Cow<'_, str> {
    if do_lower_case {
        lower_case_preserving_offsets(text)
    } else {
        Cow::Borrowed(text)
    }
}
