//! Model directories written to temporary folders.

use serde_json::{Value, json};
use std::path::Path;
use tempfile::TempDir;
use uni_tasks::tokenizer::spm_model::{ModelProto, PieceType, SentencePiece};

pub const HIDDEN_SIZE: usize = 4;
pub const MAX_POSITIONS: usize = 32;

pub const WORDPIECE_VOCAB: &[&str] = &[
    "[PAD]", "[UNK]", "[CLS]", "[SEP]", "[MASK]", "play", "##ing", "##s", "the", "game", "is",
    "this", "example", "about", "sports", "cooking", "who", "wrote", "book", "was", "written",
    "by", "jane", "austen", "?", ".", ",",
];

pub const TAGGER_LABELS: &[&str] = &["O", "B-VERB", "I-VERB"];
pub const NLI_LABELS: &[&str] = &["contradiction", "neutral", "entailment"];
pub const TOPIC_LABELS: &[&str] = &["cooking", "other", "sports"];

fn write_json(path: impl AsRef<Path>, value: Value) {
    std::fs::write(path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
}

fn id2label(labels: &[&str]) -> Value {
    labels
        .iter()
        .enumerate()
        .map(|(i, l)| (i.to_string(), json!(l)))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

/// A lower-casing BERT directory with `labels` as its classification head.
pub fn bert_model_dir(labels: &[&str]) -> TempDir {
    bert_model_dir_of_type("bert", labels)
}

pub fn bert_model_dir_of_type(model_type: &str, labels: &[&str]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_json(
        dir.path().join("config.json"),
        json!({
            "model_type": model_type,
            "hidden_size": HIDDEN_SIZE,
            "max_position_embeddings": MAX_POSITIONS,
            "id2label": id2label(labels),
        }),
    );
    write_json(
        dir.path().join("tokenizer_config.json"),
        json!({ "do_lower_case": true }),
    );
    std::fs::write(dir.path().join("vocab.txt"), WORDPIECE_VOCAB.join("\n")).unwrap();
    dir
}

pub fn sentencepiece_pieces() -> Vec<SentencePiece> {
    vec![
        SentencePiece::new("<pad>", 0.0, PieceType::Control),
        SentencePiece::new("</s>", 0.0, PieceType::Control),
        SentencePiece::new("<unk>", 0.0, PieceType::Unknown),
        SentencePiece::new("\u{2581}", -3.0, PieceType::Normal),
        SentencePiece::new("\u{2581}hello", -1.0, PieceType::Normal),
        SentencePiece::new("\u{2581}world", -1.0, PieceType::Normal),
        SentencePiece::new("\u{2581}the", -1.0, PieceType::Normal),
        SentencePiece::new("\u{2581}game", -1.5, PieceType::Normal),
        SentencePiece::new("s", -2.0, PieceType::Normal),
    ]
}

fn write_generation_config(dir: &Path, model_type: &str) {
    write_json(
        dir.join("config.json"),
        json!({
            "model_type": model_type,
            "max_position_embeddings": MAX_POSITIONS,
            "pad_token_id": 0,
            "eos_token_id": 1,
            "decoder_start_token_id": 0,
        }),
    );
    write_json(dir.join("tokenizer_config.json"), json!({}));
}

/// A Marian-style directory: `vocab.json` + `source.spm`.
pub fn marian_model_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_generation_config(dir.path(), "marian");
    let pieces = sentencepiece_pieces();
    let vocab: serde_json::Map<String, Value> = pieces
        .iter()
        .enumerate()
        .map(|(i, p)| (p.piece.clone(), json!(i)))
        .collect();
    write_json(dir.path().join("vocab.json"), Value::Object(vocab));
    let model = ModelProto { pieces };
    std::fs::write(dir.path().join("source.spm"), model.encode()).unwrap();
    dir
}

/// A Pegasus-style directory with a packed `spiece.model` only.
pub fn pegasus_model_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_generation_config(dir.path(), "pegasus");
    let model = ModelProto {
        pieces: sentencepiece_pieces(),
    };
    std::fs::write(dir.path().join("spiece.model"), model.encode()).unwrap();
    dir
}
