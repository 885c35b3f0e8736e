//! HTTP server exposing queue statistics.
//!
//! Serves the registry's aggregate snapshot on /stats for operators and
//! higher-level controllers watching queue depth, plus a /health liveness
//! probe. The endpoint is read-only; it never mutates scheduler state.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::scheduler::SchedulerRegistry;

#[derive(Debug, Error)]
pub enum StatsServerError {
    #[error("failed to bind statistics endpoint: {0}")]
    Bind(std::io::Error),
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),
}

fn response(status: StatusCode, content_type: &str, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from(""))))
}

async fn handle_request(
    req: Request<Incoming>,
    registry: Arc<SchedulerRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/stats") => {
            let snapshot = registry.aggregate();
            match serde_json::to_string(&snapshot) {
                Ok(body) => Ok(response(StatusCode::OK, "application/json", body)),
                Err(e) => {
                    error!("Failed to serialize statistics snapshot: {}", e);
                    Ok(response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "application/json",
                        json!({ "error": e.to_string() }).to_string(),
                    ))
                }
            }
        }
        (&Method::GET, "/health") => {
            let health = json!({
                "status": if registry.is_shut_down() { "stopping" } else { "healthy" },
                "service": "work_scheduler",
                "timestamp": chrono::Utc::now().to_rfc3339(),
            });
            Ok(response(
                StatusCode::OK,
                "application/json",
                health.to_string(),
            ))
        }
        _ => Ok(response(
            StatusCode::NOT_FOUND,
            "text/plain",
            "Not Found".to_string(),
        )),
    }
}

/// Serve statistics until the registry's shutdown signal fires
pub async fn start_stats_server(
    port: u16,
    registry: Arc<SchedulerRegistry>,
) -> Result<(), StatsServerError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(StatsServerError::Bind)?;
    let mut shutdown = registry.shutdown_signal();

    info!("🚀 Statistics server listening on http://{}", addr);
    info!("📊 Queue statistics available at http://{}/stats", addr);
    info!("💚 Health check available at http://{}/health", addr);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!("🛑 Statistics server stopping");
                break;
            }
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(StatsServerError::Accept)?;
                let io = TokioIo::new(stream);
                let registry = Arc::clone(&registry);
                tokio::task::spawn(async move {
                    if let Err(err) = http1::Builder::new()
                        .serve_connection(
                            io,
                            service_fn(move |req| handle_request(req, Arc::clone(&registry))),
                        )
                        .await
                    {
                        error!("Error serving statistics connection: {:?}", err);
                    }
                });
            }
        }
    }
    Ok(())
}
