//! # gRPC Service Implementation
//!
//! This module defines the gRPC server and its implementation of the `ChainCursor` service.
//!
//! Its sole responsibility is to stream chain cursors to clients.
//!
//! ### Architecture
//!
//! - **One subscription**: a single [`Notifier`] owns the long-lived subscription to the
//!   configured [`CursorSource`]. Every client connection shares it.
//!
//! - **Per-connection delivery**: each `Cursors` call spawns its own
//!   [`StreamProtocol::deliver`] loop writing into a bounded channel, which is forwarded as
//!   the response stream. A client that reconnects with its last processed cursor as the
//!   start value resumes without gaps.
//!
//! - **Shutdown**: all tasks hang off one `CancellationToken`. Cancelling it stops the
//!   notifier, ends every open stream cleanly and shuts the server down. A failing source
//!   cancels it too.

mod conversions;

use anyhow::{Context, Result};
use chain_cursor_connector::{
    CursorSequencer, CursorSource, Notifier, StreamProtocol, SyncError,
};
use std::{net::SocketAddr, pin::Pin, sync::Arc};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tonic::{transport::Server, Request, Response, Status};

use crate::{config::GatewayConfig, error::GatewayError};
use proto::chain_cursor_server::{ChainCursor, ChainCursorServer};

/// Generated protobuf code.
pub mod proto {
    tonic::include_proto!("chain_cursor.v1");
}

/// The gRPC server implementation for the `ChainCursor` service.
pub struct CursorServer {
    protocol: StreamProtocol,
    shutdown: CancellationToken,
    output_stream_capacity: usize,
}

impl CursorServer {
    pub fn new(
        protocol: StreamProtocol,
        shutdown: CancellationToken,
        output_stream_capacity: usize,
    ) -> Self {
        Self {
            protocol,
            shutdown,
            output_stream_capacity: output_stream_capacity.max(1),
        }
    }
}

#[tonic::async_trait]
impl ChainCursor for CursorServer {
    type CursorsStream = Pin<Box<dyn Stream<Item = Result<proto::Cursor, Status>> + Send>>;

    /// Opens a server-side stream of consecutive cursors.
    ///
    /// Without a start value the first cursor is the chain's latest one. With a start
    /// value every cursor from it up to the latest is replayed first.
    async fn cursors(
        &self,
        request: Request<proto::StartCursor>,
    ) -> Result<Response<Self::CursorsStream>, Status> {
        let peer = request.remote_addr();
        let req = request.into_inner();
        let start = StreamProtocol::parse_start(req.value.as_deref()).map_err(GatewayError::from)?;
        tracing::info!(?peer, ?start, "Received Cursors request");

        let (tx, rx) = mpsc::channel(self.output_stream_capacity);
        let protocol = self.protocol.clone();
        let cancel = self.shutdown.child_token();

        tokio::spawn(async move {
            match protocol.deliver(start, &tx, &cancel).await {
                Ok(()) => tracing::info!(?peer, "Cursor stream closed on shutdown."),
                Err(SyncError::Transport(_)) => tracing::info!(?peer, "Client disconnected."),
                Err(e) => {
                    tracing::warn!(?peer, error = %e, "Cursor stream ended with an error.");
                    let _ = tx.send(Err(e)).await;
                }
            }
        });

        let stream = ReceiverStream::new(rx).map(|delivery| {
            delivery
                .map(proto::Cursor::from)
                .map_err(|e| Status::from(GatewayError::from(e)))
        });
        Ok(Response::new(Box::pin(stream) as Self::CursorsStream))
    }
}

/// Handles to the background tasks of a running gateway.
pub struct GatewayHandle {
    shutdown: CancellationToken,
    notifier: Arc<Notifier>,
    notifier_task: JoinHandle<Result<(), SyncError>>,
    server: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl GatewayHandle {
    /// The notifier shared by every connection.
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    /// Resolves once the gateway starts shutting down, whether through
    /// [`GatewayHandle::stop`] or because the source or the server failed.
    pub async fn stopping(&self) {
        self.shutdown.cancelled().await
    }

    /// Cancels every task and waits for them to finish.
    ///
    /// Returns the source's error if the notifier ended with one.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.cancel();
        let notifier = self.notifier_task.await.context("Notifier task panicked")?;
        self.server
            .await
            .context("gRPC server task panicked")?
            .context("gRPC server failed")?;
        notifier.context("Cursor source subscription failed")?;
        Ok(())
    }
}

/// The main entry point to initialize and start the gRPC server and the notifier.
///
/// Everything started here stops when `shutdown` is cancelled.
pub async fn start(
    config: &GatewayConfig,
    source: Arc<dyn CursorSource>,
    shutdown: CancellationToken,
) -> Result<GatewayHandle> {
    // --- 1. Initialize dependencies ---
    let addr: SocketAddr = config
        .gateway
        .grpc
        .addr()
        .parse()
        .with_context(|| format!("Invalid gRPC address '{}'", config.gateway.grpc.addr()))?;
    let source_name = source.name().to_string();
    let notifier = Arc::new(Notifier::new(source));
    let sequencer = Arc::new(CursorSequencer::new(
        notifier.clone(),
        config.connector.sequencer.advance_policy,
    ));

    // --- 2. Spawn the notifier ---
    let notifier_task = tokio::spawn({
        let notifier = notifier.clone();
        let shutdown = shutdown.clone();
        async move {
            let result = notifier.run(shutdown.child_token()).await;
            match &result {
                Ok(()) if !shutdown.is_cancelled() => {
                    tracing::warn!("Cursor source completed, shutting the gateway down.")
                }
                Ok(()) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Cursor source failed, shutting the gateway down.")
                }
            }
            shutdown.cancel();
            result
        }
    });

    // --- 3. Set up the gRPC server ---
    let cursor_server = CursorServer::new(
        StreamProtocol::new(sequencer),
        shutdown.clone(),
        config.gateway.streaming.output_stream_capacity,
    );
    let grpc_server = Server::builder().add_service(ChainCursorServer::new(cursor_server));

    tracing::info!(source = %source_name, "Chain cursor gRPC gateway listening on {}", addr);

    let server_task = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            let signal = shutdown.clone();
            let result = grpc_server
                .serve_with_shutdown(addr, async move { signal.cancelled().await })
                .await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "gRPC server failed.");
                shutdown.cancel();
            }
            result
        }
    });

    Ok(GatewayHandle {
        shutdown,
        notifier,
        notifier_task,
        server: server_task,
    })
}
