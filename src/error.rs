//! Error types for task loading, tokenization, decoding, and transport.

use crate::protocol::Code;
use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TaskError>;

/// Unified error type covering configuration, per-request, vocabulary, and
/// transport failures.
///
/// Variants are grouped so that callers can match on the *category* of a
/// failure: load-time ([`Config`](Self::Config),
/// [`CapabilityMismatch`](Self::CapabilityMismatch)), per-request and
/// recoverable ([`InputTooLong`](Self::InputTooLong),
/// [`InvalidArgument`](Self::InvalidArgument)), internal contract violations
/// ([`VocabularyInvariant`](Self::VocabularyInvariant)), or transport
/// ([`Transport`](Self::Transport), [`Timeout`](Self::Timeout),
/// [`Cancelled`](Self::Cancelled)).
#[derive(Debug, Error)]
pub enum TaskError {
    /// Unsupported or malformed model/tokenizer configuration, missing files.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The model family resolved from a directory cannot serve the requested
    /// task capability.
    #[error("Capability mismatch: {0}")]
    CapabilityMismatch(String),

    /// The tokenized input exceeds the model's maximum sequence length.
    #[error("Input sequence too long: {length} > {max}")]
    InputTooLong { length: usize, max: usize },

    /// Request options or inputs failed validation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An id or token string required to exist is missing from the
    /// vocabulary (including the unknown-token fallback).
    #[error("Vocabulary invariant violated: {0}")]
    VocabularyInvariant(String),

    /// The model-forward backend failed or returned malformed output.
    #[error("Inference error: {0}")]
    Inference(String),

    /// The operation is not served by this server instance.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Dial, read, or write failure on the wire.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The per-call deadline expired.
    #[error("Deadline exceeded")]
    Timeout,

    /// The call was cancelled before completion.
    #[error("Cancelled")]
    Cancelled,

    /// A remote endpoint reported a failure status.
    #[error("Remote error ({code}): {message}")]
    Status { code: Code, message: String },
}

impl TaskError {
    /// Returns `true` for errors that only concern the request at hand and
    /// that the caller may fix and resend (e.g. by truncating the input).
    pub fn is_request_scoped(&self) -> bool {
        matches!(
            self,
            Self::InputTooLong { .. } | Self::InvalidArgument(_) | Self::Unsupported(_)
        )
    }

    /// Returns `true` for transport-level failures. These are never retried
    /// by this crate.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout | Self::Cancelled)
    }
}
