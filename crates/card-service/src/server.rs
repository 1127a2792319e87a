//! gRPC server setup with health check.

use std::net::SocketAddr;
use std::sync::Arc;

use card_matcher::Recognizer;
use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tracing::info;

use crate::pb::card_service_server::CardServiceServer;
use crate::service::CardServiceImpl;

/// Run the gRPC server until the process exits.
pub async fn run_server(
    addr: SocketAddr,
    recognizer: Arc<Recognizer>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    run_server_with_shutdown(addr, recognizer, std::future::pending()).await
}

/// Run the gRPC server with graceful shutdown support.
///
/// The server accepts requests as soon as it is bound. Until the
/// recognizer's extractor and catalog are installed, Identify answers
/// `UNAVAILABLE`.
pub async fn run_server_with_shutdown<F>(
    addr: SocketAddr,
    recognizer: Arc<Recognizer>,
    shutdown_signal: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    info!("Starting gRPC server on {}", addr);

    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<CardServiceServer<CardServiceImpl>>()
        .await;

    let card_service = CardServiceImpl::new(recognizer);

    info!("gRPC server ready on {}", addr);

    Server::builder()
        .add_service(health_service)
        .add_service(CardServiceServer::new(card_service))
        .serve_with_shutdown(addr, shutdown_signal)
        .await?;

    info!("gRPC server shutdown complete");
    Ok(())
}
