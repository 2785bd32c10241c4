//! Remote client stubs.
//!
//! Each stub implements the same capability trait as the in-process task, so
//! callers can swap a remote server in for a local
//! [`LoadedTask`](crate::registry::LoadedTask). Every call dials a fresh
//! connection and one deadline bounds the dial, the write and the read.
//! Nothing is retried.

use crate::api::{
    AnswerResponse, EncodingVector, GenerationOptions, GenerationResponse, PoolingStrategy,
    QuestionAnsweringOptions, TaskKind, TextClassificationParameters, TextClassificationResponse,
    TokenClassificationParameters, TokenClassificationResponse, ZeroShotParameters,
    ZeroShotResponse,
};
use crate::error::{Result, TaskError};
use crate::protocol::{
    AnswerRequest, ClassifyRequest, DEFAULT_CLIENT_DEADLINE, EncodeRequest, GenerateRequest,
    RpcRequest, RpcResponse, TextClassifyRequest, ZeroShotRequest, frame_codec, to_payload,
};
use crate::traits::{
    QuestionAnswering, TextClassification, TextEncoding, TextGeneration, TokenClassification,
    ZeroShotClassification,
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::bytes::Bytes;
use tokio_util::codec::Framed;

/// Address and deadline shared by the stubs.
#[derive(Debug, Clone)]
pub struct RpcChannel {
    address: String,
    deadline: Duration,
}

impl RpcChannel {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            deadline: DEFAULT_CLIENT_DEADLINE,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Call `kind`'s primary method with `message`.
    pub async fn call<Req, Resp>(&self, kind: TaskKind, message: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let request = RpcRequest {
            service: kind.service_name().to_string(),
            method: kind.method().to_string(),
            deadline_ms: Some(self.deadline.as_millis() as u64),
            payload: to_payload(message)?,
        };
        let response = tokio::time::timeout(self.deadline, self.round_trip(&request))
            .await
            .map_err(|_| TaskError::Timeout)??;
        response.into_result()
    }

    async fn round_trip(&self, request: &RpcRequest) -> Result<RpcResponse> {
        let stream = TcpStream::connect(&self.address).await.map_err(|e| {
            TaskError::Transport(format!("Failed to dial '{}': {}", self.address, e))
        })?;
        let mut framed = Framed::new(stream, frame_codec());

        let bytes = serde_json::to_vec(request)
            .map_err(|e| TaskError::Transport(format!("Failed to encode request: {}", e)))?;
        framed
            .send(Bytes::from(bytes))
            .await
            .map_err(|e| TaskError::Transport(e.to_string()))?;

        let frame = framed
            .next()
            .await
            .ok_or_else(|| TaskError::Transport("Connection closed before response".to_string()))?
            .map_err(|e| TaskError::Transport(e.to_string()))?;
        serde_json::from_slice(&frame)
            .map_err(|e| TaskError::Transport(format!("Malformed response frame: {}", e)))
    }
}

pub struct TextEncodingClient {
    channel: RpcChannel,
}

impl TextEncodingClient {
    pub fn new(channel: RpcChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl TextEncoding for TextEncodingClient {
    async fn encode(&self, text: &str, pooling: PoolingStrategy) -> Result<EncodingVector> {
        let request = EncodeRequest {
            input: text.to_string(),
            pooling_strategy: pooling,
        };
        self.channel.call(TaskKind::TextEncoding, &request).await
    }
}

pub struct TokenClassificationClient {
    channel: RpcChannel,
}

impl TokenClassificationClient {
    pub fn new(channel: RpcChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl TokenClassification for TokenClassificationClient {
    async fn classify(
        &self,
        text: &str,
        parameters: &TokenClassificationParameters,
    ) -> Result<TokenClassificationResponse> {
        let request = ClassifyRequest {
            input: text.to_string(),
            parameters: *parameters,
        };
        self.channel
            .call(TaskKind::TokenClassification, &request)
            .await
    }
}

pub struct TextClassificationClient {
    channel: RpcChannel,
}

impl TextClassificationClient {
    pub fn new(channel: RpcChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl TextClassification for TextClassificationClient {
    async fn classify(
        &self,
        text: &str,
        parameters: &TextClassificationParameters,
    ) -> Result<TextClassificationResponse> {
        let request = TextClassifyRequest {
            input: text.to_string(),
            parameters: *parameters,
        };
        self.channel
            .call(TaskKind::TextClassification, &request)
            .await
    }
}

pub struct QuestionAnsweringClient {
    channel: RpcChannel,
}

impl QuestionAnsweringClient {
    pub fn new(channel: RpcChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl QuestionAnswering for QuestionAnsweringClient {
    async fn answer(
        &self,
        question: &str,
        passage: &str,
        options: &QuestionAnsweringOptions,
    ) -> Result<AnswerResponse> {
        let request = AnswerRequest {
            question: question.to_string(),
            passage: passage.to_string(),
            options: *options,
        };
        self.channel
            .call(TaskKind::QuestionAnswering, &request)
            .await
    }
}

pub struct ZeroShotClassificationClient {
    channel: RpcChannel,
}

impl ZeroShotClassificationClient {
    pub fn new(channel: RpcChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl ZeroShotClassification for ZeroShotClassificationClient {
    async fn classify(
        &self,
        text: &str,
        parameters: &ZeroShotParameters,
    ) -> Result<ZeroShotResponse> {
        let request = ZeroShotRequest {
            input: text.to_string(),
            parameters: parameters.clone(),
        };
        self.channel
            .call(TaskKind::ZeroShotClassification, &request)
            .await
    }
}

pub struct TextGenerationClient {
    channel: RpcChannel,
}

impl TextGenerationClient {
    pub fn new(channel: RpcChannel) -> Self {
        Self { channel }
    }
}

#[async_trait]
impl TextGeneration for TextGenerationClient {
    async fn generate(
        &self,
        text: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse> {
        let request = GenerateRequest {
            input: text.to_string(),
            options: options.clone(),
        };
        self.channel.call(TaskKind::TextGeneration, &request).await
    }
}
