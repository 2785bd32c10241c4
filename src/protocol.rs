//! Wire protocol shared by the RPC and HTTP fronts: status codes, the RPC
//! envelope, and the per-task request messages.

use crate::api::{
    GenerationOptions, PoolingStrategy, QuestionAnsweringOptions, TextClassificationParameters,
    TokenClassificationParameters, ZeroShotParameters,
};
use crate::error::{Result, TaskError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio_util::codec::LengthDelimitedCodec;

/// Per-call deadline applied by the client stubs.
pub const DEFAULT_CLIENT_DEADLINE: Duration = Duration::from_secs(30);

/// HTTP header carrying the caller's remaining deadline in milliseconds.
pub const DEADLINE_HEADER: &str = "x-request-timeout-ms";

/// Largest accepted RPC frame.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// Transport-level status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Code {
    Ok,
    Cancelled,
    InvalidArgument,
    DeadlineExceeded,
    FailedPrecondition,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
}

impl Code {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Cancelled => "CANCELLED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::OutOfRange => "OUT_OF_RANGE",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
            Self::Unavailable => "UNAVAILABLE",
        }
    }

    /// HTTP status used by the JSON gateway.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::InvalidArgument | Self::OutOfRange | Self::FailedPrecondition => 400,
            Self::Cancelled => 499,
            Self::Internal => 500,
            Self::Unimplemented => 501,
            Self::Unavailable => 503,
            Self::DeadlineExceeded => 504,
        }
    }
}

impl std::fmt::Display for Code {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&TaskError> for Code {
    fn from(err: &TaskError) -> Self {
        match err {
            TaskError::Config(_) | TaskError::CapabilityMismatch(_) => Self::FailedPrecondition,
            TaskError::InputTooLong { .. } => Self::OutOfRange,
            TaskError::InvalidArgument(_) => Self::InvalidArgument,
            TaskError::VocabularyInvariant(_) | TaskError::Inference(_) => Self::Internal,
            TaskError::Unsupported(_) => Self::Unimplemented,
            TaskError::Transport(_) => Self::Unavailable,
            TaskError::Timeout => Self::DeadlineExceeded,
            TaskError::Cancelled => Self::Cancelled,
            TaskError::Status { code, .. } => *code,
        }
    }
}

/// One RPC call: the target service and method plus the JSON request message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub service: String,
    pub method: String,
    /// Remaining caller deadline; the server abandons the call after it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
    #[serde(default)]
    pub payload: Value,
}

impl RpcRequest {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

/// Reply to an [`RpcRequest`]. `payload` is the response message when
/// `code` is [`Code::Ok`] and `null` otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub code: Code,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub payload: Value,
}

impl RpcResponse {
    pub fn ok(payload: Value) -> Self {
        Self {
            code: Code::Ok,
            message: String::new(),
            payload,
        }
    }

    pub fn error(err: &TaskError) -> Self {
        let message = match err {
            TaskError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            code: Code::from(err),
            message,
            payload: Value::Null,
        }
    }

    /// Turn the response back into a typed message or a
    /// [`TaskError::Status`].
    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        if self.code != Code::Ok {
            return Err(TaskError::Status {
                code: self.code,
                message: self.message,
            });
        }
        serde_json::from_value(self.payload)
            .map_err(|e| TaskError::Transport(format!("Malformed response payload: {}", e)))
    }
}

/// Frame codec for the RPC transport: a 4-byte big-endian length prefix per
/// JSON message.
pub fn frame_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

/// Serialize a message into an RPC payload.
pub fn to_payload<T: Serialize>(message: &T) -> Result<Value> {
    serde_json::to_value(message)
        .map_err(|e| TaskError::Inference(format!("Failed to serialize message: {}", e)))
}

/// Parse an incoming request payload.
pub fn from_payload<T: DeserializeOwned>(payload: Value) -> Result<T> {
    serde_json::from_value(payload)
        .map_err(|e| TaskError::InvalidArgument(format!("Malformed request: {}", e)))
}

/// `TextEncodingService.Encode`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeRequest {
    pub input: String,
    #[serde(default)]
    pub pooling_strategy: PoolingStrategy,
}

/// `TokenClassificationService.Classify`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub input: String,
    #[serde(default)]
    pub parameters: TokenClassificationParameters,
}

/// `TextClassificationService.Classify`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextClassifyRequest {
    pub input: String,
    #[serde(default)]
    pub parameters: TextClassificationParameters,
}

/// `QuestionAnsweringService.Answer`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub question: String,
    pub passage: String,
    #[serde(default)]
    pub options: QuestionAnsweringOptions,
}

/// `ZeroShotClassificationService.Classify`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroShotRequest {
    pub input: String,
    pub parameters: ZeroShotParameters,
}

/// `TextGenerationService.Generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub input: String,
    #[serde(default)]
    pub options: GenerationOptions,
}
