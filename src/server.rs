//! Server composition: one request handler bound to the loaded task, shared
//! by the RPC and HTTP transports.

pub mod http;
pub mod rpc;

use crate::api::TaskKind;
use crate::error::{Result, TaskError};
use crate::protocol::{
    AnswerRequest, ClassifyRequest, Code, EncodeRequest, GenerateRequest, RpcRequest,
    RpcResponse, TextClassifyRequest, ZeroShotRequest, from_payload, to_payload,
};
use crate::registry::LoadedTask;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use http::{router, serve_http};
pub use rpc::serve_rpc;

/// Dispatches requests to the single service matching the loaded task.
///
/// Calls for any other service answer [`Code::Unimplemented`].
pub struct RequestHandler {
    task: LoadedTask,
}

/// Register the service matching `task` and nothing else.
pub fn resolve_request_handler(task: LoadedTask) -> Arc<RequestHandler> {
    tracing::info!(
        service = task.kind().service_name(),
        method = task.kind().method(),
        "Registered service"
    );
    Arc::new(RequestHandler { task })
}

impl RequestHandler {
    pub fn kind(&self) -> TaskKind {
        self.task.kind()
    }

    /// The loaded task, for in-process calls that skip serialization.
    pub fn task(&self) -> &LoadedTask {
        &self.task
    }

    /// Run one call to completion, enforcing its deadline and recording
    /// request metrics. Never fails: errors become status responses.
    pub async fn dispatch(&self, request: RpcRequest) -> RpcResponse {
        let start = Instant::now();
        let deadline = request.deadline();
        let RpcRequest {
            service,
            method,
            payload,
            ..
        } = request;

        let result = with_deadline(deadline, self.route(&service, &method, payload)).await;
        let response = match result {
            Ok(payload) => RpcResponse::ok(payload),
            Err(e) => {
                if matches!(Code::from(&e), Code::Internal) {
                    tracing::error!(service = %service, method = %method, error = %e, "Request failed");
                } else {
                    tracing::debug!(service = %service, method = %method, error = %e, "Request rejected");
                }
                RpcResponse::error(&e)
            }
        };

        let (service_label, method_label) = metric_labels(&service, &method);
        metrics::histogram!(
            "task_request.duration_seconds",
            "service" => service_label,
            "method" => method_label
        )
        .record(start.elapsed().as_secs_f64());
        metrics::counter!(
            "task_request.total",
            "service" => service_label,
            "method" => method_label,
            "code" => response.code.as_str()
        )
        .increment(1);

        response
    }

    async fn route(&self, service: &str, method: &str, payload: Value) -> Result<Value> {
        let Some(kind) = TaskKind::from_service_name(service) else {
            return Err(TaskError::Unsupported(format!("Unknown service '{}'", service)));
        };
        if kind != self.kind() {
            return Err(TaskError::Unsupported(format!(
                "{} is unsupported for this server instance",
                service
            )));
        }
        if method != kind.method() {
            return Err(TaskError::Unsupported(format!(
                "Method '{}' is not defined on {}",
                method, service
            )));
        }

        match &self.task {
            LoadedTask::TextEncoding(task) => {
                let request: EncodeRequest = from_payload(payload)?;
                to_payload(&task.encode(&request.input, request.pooling_strategy).await?)
            }
            LoadedTask::TokenClassification(task) => {
                let request: ClassifyRequest = from_payload(payload)?;
                to_payload(&task.classify(&request.input, &request.parameters).await?)
            }
            LoadedTask::TextClassification(task) => {
                let request: TextClassifyRequest = from_payload(payload)?;
                to_payload(&task.classify(&request.input, &request.parameters).await?)
            }
            LoadedTask::QuestionAnswering(task) => {
                let request: AnswerRequest = from_payload(payload)?;
                to_payload(
                    &task
                        .answer(&request.question, &request.passage, &request.options)
                        .await?,
                )
            }
            LoadedTask::ZeroShotClassification(task) => {
                let request: ZeroShotRequest = from_payload(payload)?;
                to_payload(&task.classify(&request.input, &request.parameters).await?)
            }
            LoadedTask::TextGeneration(task) => {
                let request: GenerateRequest = from_payload(payload)?;
                to_payload(&task.generate(&request.input, &request.options).await?)
            }
        }
    }
}

/// Label value for names outside the service table.
pub const UNKNOWN_LABEL: &str = "unknown";

/// Canonical `(service, method)` metric labels. Names that do not resolve
/// collapse to [`UNKNOWN_LABEL`] so client input cannot grow the series set.
pub(crate) fn metric_labels(service: &str, method: &str) -> (&'static str, &'static str) {
    match TaskKind::from_service_name(service) {
        Some(kind) if kind.method() == method => (kind.service_name(), kind.method()),
        Some(kind) => (kind.service_name(), UNKNOWN_LABEL),
        None => (UNKNOWN_LABEL, UNKNOWN_LABEL),
    }
}

/// Await `fut`, dropping it with [`TaskError::Timeout`] once `deadline`
/// elapses.
pub(crate) async fn with_deadline<T>(
    deadline: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout(deadline, fut)
            .await
            .unwrap_or(Err(TaskError::Timeout)),
        None => fut.await,
    }
}
