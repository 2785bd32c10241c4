//! RPC transport: TCP connections carrying length-delimited JSON frames.
//!
//! Every connection runs on its own task and may carry any number of
//! sequential request/response pairs.

use super::{RequestHandler, metric_labels};
use crate::error::{Result, TaskError};
use crate::protocol::{Code, RpcRequest, RpcResponse, frame_codec};
use futures::{Sink, SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

/// Accept connections until `shutdown` is cancelled.
///
/// Open connections close on shutdown. A call still in flight is dropped
/// when shutdown fires or the peer closes its side; frames pipelined behind
/// it are served in order afterwards.
pub async fn serve_rpc(
    listener: TcpListener,
    handler: Arc<RequestHandler>,
    shutdown: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|e| TaskError::Transport(e.to_string()))?;
    tracing::info!(address = %local, service = handler.kind().service_name(), "RPC server listening");

    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::info!("RPC server: shutdown signal received");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let handler = handler.clone();
                    let shutdown = shutdown.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, peer, handler, shutdown).await {
                            tracing::debug!(peer = %peer, error = %e, "RPC connection closed with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept RPC connection");
                }
            }
        }
    }
    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<RequestHandler>,
    shutdown: CancellationToken,
) -> Result<()> {
    tracing::debug!(peer = %peer, "RPC connection opened");
    let (mut sink, mut frames) = Framed::new(stream, frame_codec()).split();
    let mut pending: Option<BytesMut> = None;

    loop {
        let frame = match pending.take() {
            Some(frame) => frame,
            None => {
                let next = tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    next = frames.next() => next,
                };
                match next {
                    Some(frame) => frame.map_err(|e| TaskError::Transport(e.to_string()))?,
                    None => break,
                }
            }
        };

        let request = match serde_json::from_slice::<RpcRequest>(&frame) {
            Ok(request) => request,
            Err(e) => {
                let response = RpcResponse::error(&TaskError::InvalidArgument(format!(
                    "Malformed RPC frame: {}",
                    e
                )));
                send_response(&mut sink, &response).await?;
                continue;
            }
        };

        let (service, method) = metric_labels(&request.service, &request.method);
        let call = handler.dispatch(request);
        tokio::pin!(call);
        let response = loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    record_abandoned(service, method);
                    tracing::debug!(peer = %peer, service, "Shutdown abandoned in-flight call");
                    return Ok(());
                }
                response = &mut call => break response,
                next = frames.next(), if pending.is_none() => match next {
                    Some(Ok(frame)) => pending = Some(frame),
                    Some(Err(_)) | None => {
                        record_abandoned(service, method);
                        tracing::debug!(peer = %peer, service, "Peer closed, abandoned in-flight call");
                        return Ok(());
                    }
                },
            }
        };
        send_response(&mut sink, &response).await?;
    }

    tracing::debug!(peer = %peer, "RPC connection closed");
    Ok(())
}

async fn send_response<S>(sink: &mut S, response: &RpcResponse) -> Result<()>
where
    S: Sink<Bytes, Error = std::io::Error> + Unpin,
{
    let bytes = serde_json::to_vec(response)
        .map_err(|e| TaskError::Transport(format!("Failed to encode response: {}", e)))?;
    sink.send(Bytes::from(bytes))
        .await
        .map_err(|e| TaskError::Transport(e.to_string()))
}

fn record_abandoned(service: &'static str, method: &'static str) {
    metrics::counter!(
        "task_request.total",
        "service" => service,
        "method" => method,
        "code" => Code::Cancelled.as_str()
    )
    .increment(1);
}
