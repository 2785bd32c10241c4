//! Shared fixtures for the integration tests.
#![allow(dead_code)]

pub mod fixtures;
pub mod scripted;

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use uni_tasks::registry::{LoadedTask, TaskRegistry};
use uni_tasks::server::{RequestHandler, resolve_request_handler, serve_http, serve_rpc};

/// A registry whose backends come from [`scripted::ScriptedBackend`].
pub fn scripted_registry(backend: scripted::ScriptedBackend) -> TaskRegistry {
    TaskRegistry::builder()
        .with_defaults()
        .backend(Arc::new(backend))
        .build()
}

/// A running server bound to an ephemeral local port.
pub struct RunningServer {
    pub address: SocketAddr,
    pub handler: Arc<RequestHandler>,
    shutdown: CancellationToken,
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub async fn start_rpc(task: LoadedTask) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let handler = resolve_request_handler(task);
    let shutdown = CancellationToken::new();
    tokio::spawn(serve_rpc(listener, handler.clone(), shutdown.clone()));
    RunningServer {
        address,
        handler,
        shutdown,
    }
}

pub async fn start_http(task: LoadedTask) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    let handler = resolve_request_handler(task);
    let shutdown = CancellationToken::new();
    tokio::spawn(serve_http(listener, handler.clone(), shutdown.clone()));
    RunningServer {
        address,
        handler,
        shutdown,
    }
}
