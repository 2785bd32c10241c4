//! Task-level NLP serving: subword tokenization with offsets, task loading,
//! and the decode/aggregation logic that turns per-token model outputs into
//! entities, answer spans, label scores, and pooled vectors.
//!
//! # Key concepts
//!
//! - **[`TaskRegistry`](registry::TaskRegistry)**: the explicit
//!   `(model_type, TaskKind)` constructor table. It opens a model directory
//!   and returns a [`LoadedTask`](registry::LoadedTask) or a typed capability
//!   handle.
//! - **Capability traits**: [`TextEncoding`](traits::TextEncoding),
//!   [`TokenClassification`](traits::TokenClassification),
//!   [`TextClassification`](traits::TextClassification),
//!   [`QuestionAnswering`](traits::QuestionAnswering),
//!   [`ZeroShotClassification`](traits::ZeroShotClassification) and
//!   [`TextGeneration`](traits::TextGeneration). Loaded tasks and the remote
//!   [`client`] stubs implement the same traits.
//! - **Tokenizers**: [`WordPieceTokenizer`](tokenizer::WordPieceTokenizer) and
//!   [`SentencePieceTokenizer`](tokenizer::SentencePieceTokenizer), both
//!   reporting byte offsets into the original text.
//! - **Backends**: the model forward pass sits behind
//!   [`BackendLoader`](backend::BackendLoader); the default loader runs
//!   candle (`backend-candle` feature).
//! - **Protocol front**: one [`RequestHandler`](server::RequestHandler) per
//!   loaded task, served over length-delimited JSON RPC and an HTTP/JSON
//!   gateway.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use uni_tasks::api::{QuestionAnsweringOptions, TaskDescriptor, TaskKind};
//! use uni_tasks::registry::TaskRegistry;
//! use uni_tasks::traits::QuestionAnswering;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = TaskRegistry::builder().with_defaults().build();
//! let descriptor = TaskDescriptor::new(
//!     TaskKind::QuestionAnswering,
//!     "models/deepset/bert-base-cased-squad2",
//! );
//! let qa = registry.load::<dyn QuestionAnswering>(&descriptor)?;
//!
//! let response = qa
//!     .answer(
//!         "Who wrote it?",
//!         "The book was written by Jane Austen.",
//!         &QuestionAnsweringOptions::default(),
//!     )
//!     .await?;
//! for answer in response.answers {
//!     println!("{} ({:.3})", answer.text, answer.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregation;
pub mod api;
pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
#[cfg(feature = "hub")]
pub mod hub;
pub mod model_dir;
mod options_validation;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod tasks;
pub mod telemetry;
pub mod tokenizer;
pub mod traits;
pub mod vocabulary;

#[cfg(test)]
mod mock;
