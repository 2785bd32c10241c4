//! HTTP/JSON gateway: `POST /v1/{package}/{method}` routed through the same
//! dispatcher as the RPC transport.

use super::RequestHandler;
use crate::api::TaskKind;
use crate::error::{Result, TaskError};
use crate::protocol::{Code, DEADLINE_HEADER, RpcRequest, RpcResponse};
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub fn router(handler: Arc<RequestHandler>) -> Router {
    Router::new()
        .route("/v1/{package}/{method}", post(call))
        .with_state(handler)
}

/// Serve the gateway until `shutdown` is cancelled, then drain open requests.
pub async fn serve_http(
    listener: TcpListener,
    handler: Arc<RequestHandler>,
    shutdown: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|e| TaskError::Transport(e.to_string()))?;
    tracing::info!(
        address = %local,
        path = %handler.kind().http_path(),
        "HTTP gateway listening"
    );
    axum::serve(listener, router(handler))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| TaskError::Transport(e.to_string()))
}

async fn call(
    State(handler): State<Arc<RequestHandler>>,
    Path((package, method)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match to_rpc_request(&package, &method, &headers, &body) {
        Ok(request) => request,
        Err(e) => return into_http(RpcResponse::error(&e)),
    };
    into_http(handler.dispatch(request).await)
}

/// Map the path segments onto the service table. Unknown packages keep
/// their raw name so the dispatcher reports them.
fn to_rpc_request(
    package: &str,
    method: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<RpcRequest> {
    let (service, method) = match TaskKind::from_package(package) {
        Some(kind) if kind.method().eq_ignore_ascii_case(method) => {
            (kind.service_name().to_string(), kind.method().to_string())
        }
        Some(kind) => (kind.service_name().to_string(), method.to_string()),
        None => (package.to_string(), method.to_string()),
    };

    let deadline_ms = match headers.get(DEADLINE_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<u64>().ok())
                .ok_or_else(|| {
                    TaskError::InvalidArgument(format!("Invalid {} header", DEADLINE_HEADER))
                })?,
        ),
        None => None,
    };

    let payload: Value = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(body)
            .map_err(|e| TaskError::InvalidArgument(format!("Malformed JSON body: {}", e)))?
    };

    Ok(RpcRequest {
        service,
        method,
        deadline_ms,
        payload,
    })
}

fn into_http(response: RpcResponse) -> Response {
    let status =
        StatusCode::from_u16(response.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if response.code == Code::Ok {
        (status, Json(response.payload)).into_response()
    } else {
        (
            status,
            Json(json!({ "code": response.code, "message": response.message })),
        )
            .into_response()
    }
}
